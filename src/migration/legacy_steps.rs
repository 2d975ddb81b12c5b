//-
// Copyright (c) 2026, Mailstore Upgrade Developers
//
// This file is part of mailstore-upgrade.
//
// mailstore-upgrade is free software: you can redistribute it and/or modify it
// under the terms of the GNU General Public License as published by the Free
// Software Foundation, either version 3 of the License, or (at your option)
// any later version.
//
// mailstore-upgrade is distributed in the hope that it will be useful, but
// WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or
// FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for
// more details.
//
// You should have received a copy of the GNU General Public License along with
// mailstore-upgrade. If not, see <http://www.gnu.org/licenses/>.

//! Steps up to version 50, which still store message bodies as flat columns.

use log::{info, warn};

use super::StepContext;
use crate::store::{
    model::{parse_flags, Flag, FolderClass},
    probe,
    types::*,
};
use crate::support::error::Error;

static BASELINE_SCHEMA: &str = "\
DROP TABLE IF EXISTS folders;
CREATE TABLE folders (
    id INTEGER PRIMARY KEY,
    name TEXT,
    last_updated INTEGER,
    unread_count INTEGER,
    visible_limit INTEGER,
    status TEXT,
    push_state TEXT,
    last_pushed INTEGER
);
CREATE INDEX IF NOT EXISTS folder_name ON folders (name);

DROP TABLE IF EXISTS messages;
CREATE TABLE messages (
    id INTEGER PRIMARY KEY,
    folder_id INTEGER,
    uid TEXT,
    subject TEXT,
    date INTEGER,
    flags TEXT,
    sender_list TEXT,
    to_list TEXT,
    cc_list TEXT,
    bcc_list TEXT,
    reply_to_list TEXT,
    html_content TEXT,
    text_content TEXT,
    attachment_count INTEGER,
    internal_date INTEGER,
    message_id TEXT
);

DROP TABLE IF EXISTS headers;
CREATE TABLE headers (
    id INTEGER PRIMARY KEY,
    message_id INTEGER,
    name TEXT,
    value TEXT
);
CREATE INDEX IF NOT EXISTS header_folder ON headers (message_id);

CREATE INDEX IF NOT EXISTS msg_uid ON messages (uid, folder_id);
CREATE INDEX IF NOT EXISTS msg_folder_id_date ON messages (folder_id, internal_date);

DROP TABLE IF EXISTS attachments;
CREATE TABLE attachments (
    id INTEGER PRIMARY KEY,
    message_id INTEGER,
    store_data TEXT,
    content_uri TEXT,
    size INTEGER,
    name TEXT,
    mime_type TEXT
);

DROP TABLE IF EXISTS pending_commands;
CREATE TABLE pending_commands (
    id INTEGER PRIMARY KEY,
    command TEXT,
    arguments TEXT
);

DROP TRIGGER IF EXISTS delete_folder;
CREATE TRIGGER delete_folder BEFORE DELETE ON folders
BEGIN
    DELETE FROM messages WHERE old.id = folder_id;
END;

DROP TRIGGER IF EXISTS delete_message;
CREATE TRIGGER delete_message BEFORE DELETE ON messages
BEGIN
    DELETE FROM attachments WHERE old.id = message_id;
    DELETE FROM headers WHERE old.id = message_id;
END;
";

/// Stores older than the first supported layout are rebuilt from scratch;
/// their content is re-fetched from the server.
pub fn create_baseline(ctx: &mut StepContext<'_>) -> Result<(), Error> {
    ctx.cxn.execute_batch(BASELINE_SCHEMA)?;
    Ok(())
}

pub fn add_deleted(ctx: &mut StepContext<'_>) -> Result<(), Error> {
    probe::add_column(ctx.cxn, "messages", "deleted", "INTEGER default 0")?;
    Ok(())
}

pub fn index_deleted_date(ctx: &mut StepContext<'_>) -> Result<(), Error> {
    ctx.cxn.execute_batch(
        "DROP INDEX IF EXISTS msg_folder_id_date;
         CREATE INDEX IF NOT EXISTS msg_folder_id_deleted_date \
         ON messages (folder_id, deleted, internal_date);",
    )?;
    Ok(())
}

pub fn mark_deleted(ctx: &mut StepContext<'_>) -> Result<(), Error> {
    let n = ctx.cxn.execute(
        "UPDATE messages SET deleted = 1 WHERE flags LIKE '%DELETED%'",
        (),
    )?;
    info!("{} Marked {} messages deleted", ctx.log_prefix, n);
    Ok(())
}

pub fn add_preview(ctx: &mut StepContext<'_>) -> Result<(), Error> {
    probe::add_column(ctx.cxn, "messages", "preview", "TEXT")?;
    Ok(())
}

pub fn add_flagged_count(ctx: &mut StepContext<'_>) -> Result<(), Error> {
    probe::add_column(ctx.cxn, "folders", "flagged_count", "INTEGER default 0")?;
    Ok(())
}

pub fn retire_no_seen_info(ctx: &mut StepContext<'_>) -> Result<(), Error> {
    ctx.cxn.execute(
        "UPDATE messages SET flags = REPLACE(flags, 'X_NO_SEEN_INFO', 'X_BAD_FLAG')",
        (),
    )?;
    Ok(())
}

pub fn add_content_id(ctx: &mut StepContext<'_>) -> Result<(), Error> {
    probe::add_column(ctx.cxn, "attachments", "content_id", "TEXT")?;
    Ok(())
}

pub fn add_content_disposition(
    ctx: &mut StepContext<'_>,
) -> Result<(), Error> {
    probe::add_column(ctx.cxn, "attachments", "content_disposition", "TEXT")?;
    Ok(())
}

/// Version 38 only pruned a cache that lived outside the store.
pub fn reserved(_: &mut StepContext<'_>) -> Result<(), Error> {
    Ok(())
}

pub fn purge_orphan_headers(ctx: &mut StepContext<'_>) -> Result<(), Error> {
    let n = ctx.cxn.execute(
        "DELETE FROM headers WHERE id IN (\
           SELECT headers.id FROM headers \
           LEFT JOIN messages ON headers.message_id = messages.id \
           WHERE messages.id IS NULL)",
        (),
    )?;
    info!("{} Purged {} orphaned header rows", ctx.log_prefix, n);
    Ok(())
}

pub fn add_mime_type(ctx: &mut StepContext<'_>) -> Result<(), Error> {
    probe::add_column(ctx.cxn, "messages", "mime_type", "TEXT")?;
    Ok(())
}

/// Preference keys under which a folder's settings were kept before they
/// moved into the store.
struct FolderKeys {
    display: String,
    sync: String,
    push: String,
    top_group: String,
    integrate: String,
}

impl FolderKeys {
    fn new(uuid: &str, folder: &str) -> Self {
        let key = |suffix: &str| format!("{}.{}.{}", uuid, folder, suffix);
        Self {
            display: key("displayMode"),
            sync: key("syncMode"),
            push: key("pushMode"),
            top_group: key("inTopGroup"),
            integrate: key("integrate"),
        }
    }
}

fn class_pref(
    value: Option<&str>,
    default: FolderClass,
    log_prefix: &dyn std::fmt::Display,
) -> FolderClass {
    match value.map(str::parse::<FolderClass>) {
        None => default,
        Some(Ok(class)) => class,
        Some(Err(e)) => {
            warn!("{} Ignoring folder preference: {}", log_prefix, e);
            default
        }
    }
}

pub fn classify_folders(ctx: &mut StepContext<'_>) -> Result<(), Error> {
    for &(column, declaration) in &[
        ("integrate", "INTEGER"),
        ("top_group", "INTEGER"),
        ("poll_class", "TEXT"),
        ("push_class", "TEXT"),
        ("display_class", "TEXT"),
    ] {
        probe::add_column(ctx.cxn, "folders", column, declaration)?;
    }

    let folders = ctx.helper.folders(ctx.cxn)?;
    let uuid = ctx.helper.account().uuid.clone();
    let inbox = ctx.helper.account().inbox_folder.clone();
    let log_prefix = ctx.log_prefix;
    let prefs = ctx.helper.preferences();

    for folder in folders {
        let is_inbox = folder.name.eq_ignore_ascii_case(&inbox);
        let (default_class, default_push) = if is_inbox {
            (FolderClass::FirstClass, FolderClass::FirstClass)
        } else {
            (FolderClass::NoClass, FolderClass::SecondClass)
        };
        let default_sync = if is_inbox {
            FolderClass::FirstClass
        } else {
            FolderClass::Inherited
        };

        let keys = FolderKeys::new(&uuid, &folder.name);
        let display =
            class_pref(prefs.get(&keys.display), default_class, log_prefix);
        let sync = class_pref(prefs.get(&keys.sync), default_sync, log_prefix);
        let push = class_pref(prefs.get(&keys.push), default_push, log_prefix);
        let top_group = prefs.get_bool(&keys.top_group, is_inbox);
        let integrate = prefs.get_bool(&keys.integrate, is_inbox);

        ctx.cxn.execute(
            "UPDATE folders SET integrate = ?, top_group = ?, \
             poll_class = ?, push_class = ?, display_class = ? WHERE id = ?",
            (integrate, top_group, sync, push, display, folder.id),
        )?;
    }

    Ok(())
}

pub fn save_folder_classes(ctx: &mut StepContext<'_>) -> Result<(), Error> {
    let uuid = ctx.helper.account().uuid.clone();
    let mut stmt = ctx.cxn.prepare(
        "SELECT name, display_class, poll_class, push_class, \
         top_group, integrate FROM folders ORDER BY id",
    )?;
    let folders = stmt
        .query_map(
            (),
            from_row::<(
                String,
                Option<FolderClass>,
                Option<FolderClass>,
                Option<FolderClass>,
                Option<bool>,
                Option<bool>,
            )>,
        )?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let prefs = ctx.helper.preferences();
    for (name, display, sync, push, top_group, integrate) in folders {
        let keys = FolderKeys::new(&uuid, &name);
        if let Some(display) = display {
            prefs.set(keys.display, display.as_str());
        }
        if let Some(sync) = sync {
            prefs.set(keys.sync, sync.as_str());
        }
        if let Some(push) = push {
            prefs.set(keys.push, push.as_str());
        }
        if let Some(top_group) = top_group {
            prefs.set(keys.top_group, top_group.to_string());
        }
        if let Some(integrate) = integrate {
            prefs.set(keys.integrate, integrate.to_string());
        }
    }

    Ok(())
}

pub const INTERNAL_OUTBOX: &str = "K9MAIL_INTERNAL_OUTBOX";

fn folder_id(
    cxn: &rusqlite::Connection,
    name: &str,
) -> Result<Option<FolderId>, Error> {
    use rusqlite::OptionalExtension as _;

    cxn.query_row(
        "SELECT id FROM folders WHERE name = ? ORDER BY id LIMIT 1",
        (name,),
        from_single,
    )
    .optional()
    .map_err(Into::into)
}

pub fn rename_outbox(ctx: &mut StepContext<'_>) -> Result<(), Error> {
    ctx.cxn.execute(
        "UPDATE folders SET name = ? WHERE name = 'OUTBOX'",
        (INTERNAL_OUTBOX,),
    )?;

    let account = ctx.helper.account();
    let localized = match account.localized_outbox_folder {
        Some(ref name) if name != "OUTBOX" && name != INTERNAL_OUTBOX => name,
        _ => return Ok(()),
    };

    let Some(obsolete) = folder_id(ctx.cxn, localized)? else {
        return Ok(());
    };

    let Some(drafts) = folder_id(ctx.cxn, &account.drafts_folder)? else {
        warn!(
            "{} No folder '{}' to receive the contents of old outbox '{}'",
            ctx.log_prefix, account.drafts_folder, localized
        );
        return Ok(());
    };

    let moved = ctx.cxn.execute(
        "UPDATE messages SET folder_id = ? WHERE folder_id = ?",
        (drafts, obsolete),
    )?;
    ctx.cxn
        .execute("DELETE FROM folders WHERE id = ?", (obsolete,))?;
    info!(
        "{} Moved {} messages from old outbox '{}' to '{}'",
        ctx.log_prefix, moved, localized, account.drafts_folder
    );
    Ok(())
}

pub fn add_thread_columns(ctx: &mut StepContext<'_>) -> Result<(), Error> {
    for &column in &[
        "thread_root",
        "thread_parent",
        "normalized_subject_hash",
        "empty",
    ] {
        probe::add_column(ctx.cxn, "messages", column, "INTEGER")?;
    }
    Ok(())
}

pub fn index_thread_columns(ctx: &mut StepContext<'_>) -> Result<(), Error> {
    ctx.cxn.execute_batch(
        "CREATE INDEX IF NOT EXISTS msg_empty ON messages (empty);
         CREATE INDEX IF NOT EXISTS msg_thread_root ON messages (thread_root);
         CREATE INDEX IF NOT EXISTS msg_thread_parent \
         ON messages (thread_parent);",
    )?;
    Ok(())
}

pub fn split_flags(ctx: &mut StepContext<'_>) -> Result<(), Error> {
    for &column in &["read", "flagged", "answered", "forwarded"] {
        probe::add_column(ctx.cxn, "messages", column, "INTEGER default 0")?;
    }

    let mut stmt = ctx
        .cxn
        .prepare("SELECT id, flags FROM messages WHERE flags IS NOT NULL")?;
    let messages = stmt
        .query_map((), from_row::<(MessageId, String)>)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    for (id, text) in messages {
        let flags = parse_flags(Some(&text));
        ctx.cxn.execute(
            "UPDATE messages SET flags = ?, \
             read = (read OR ?), flagged = (flagged OR ?), \
             answered = (answered OR ?), forwarded = (forwarded OR ?) \
             WHERE id = ?",
            (
                ctx.helper.serialize_flags(&flags),
                flags.contains(&Flag::Seen),
                flags.contains(&Flag::Flagged),
                flags.contains(&Flag::Answered),
                flags.contains(&Flag::Forwarded),
                id,
            ),
        )?;
    }

    ctx.cxn.execute_batch(
        "CREATE INDEX IF NOT EXISTS msg_read ON messages (read);
         CREATE INDEX IF NOT EXISTS msg_flagged ON messages (flagged);",
    )?;
    Ok(())
}

pub fn create_threads(ctx: &mut StepContext<'_>) -> Result<(), Error> {
    ctx.cxn.execute_batch(
        "CREATE TABLE IF NOT EXISTS threads (
             id INTEGER PRIMARY KEY,
             message_id INTEGER,
             root INTEGER,
             parent INTEGER
         );
         DROP INDEX IF EXISTS threads_message_id;
         CREATE INDEX threads_message_id ON threads (message_id);
         DROP INDEX IF EXISTS threads_root;
         CREATE INDEX threads_root ON threads (root);
         DROP INDEX IF EXISTS threads_parent;
         CREATE INDEX threads_parent ON threads (parent);

         INSERT INTO threads (message_id)
             SELECT id FROM messages
             WHERE id NOT IN (SELECT message_id FROM threads);

         UPDATE threads SET
             root = (SELECT t.id FROM threads t JOIN messages m
                     ON t.message_id = m.thread_root
                     WHERE m.id = threads.message_id),
             parent = (SELECT t.id FROM threads t JOIN messages m
                       ON t.message_id = m.thread_parent
                       WHERE m.id = threads.message_id)
             WHERE root IS NULL;

         DROP INDEX IF EXISTS msg_thread_root;
         DROP INDEX IF EXISTS msg_thread_parent;
         UPDATE messages SET thread_root = NULL, thread_parent = NULL;",
    )?;
    Ok(())
}

pub fn thread_root_trigger(ctx: &mut StepContext<'_>) -> Result<(), Error> {
    ctx.cxn.execute_batch(
        "UPDATE threads SET root = id WHERE root IS NULL;
         DROP TRIGGER IF EXISTS set_thread_root;
         CREATE TRIGGER set_thread_root AFTER INSERT ON threads
         BEGIN
             UPDATE threads SET root = id
             WHERE root IS NULL AND ROWID = NEW.ROWID;
         END;",
    )?;
    Ok(())
}

pub fn composite_index(ctx: &mut StepContext<'_>) -> Result<(), Error> {
    ctx.cxn.execute(
        "CREATE INDEX IF NOT EXISTS msg_composite \
         ON messages (deleted, empty, folder_id, flagged, read)",
        (),
    )?;
    Ok(())
}

pub fn add_notify_class(ctx: &mut StepContext<'_>) -> Result<(), Error> {
    probe::add_column(
        ctx.cxn,
        "folders",
        "notify_class",
        "TEXT default 'INHERITED'",
    )?;
    ctx.cxn.execute(
        "UPDATE folders SET notify_class = ? WHERE name = ?",
        (FolderClass::FirstClass, &ctx.helper.account().inbox_folder),
    )?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::migration::helper::MigrationsHelper;
    use crate::test_data::*;

    #[test]
    fn deleted_flags_become_columns() {
        let mut fixture = Fixture::at_version(44);
        fixture.exec(
            "INSERT INTO messages (id, folder_id, flags) VALUES \
             (1, 1, 'SEEN,FLAGGED,X_DOWNLOADED_FULL'), \
             (2, 1, 'ANSWERED,FORWARDED,DRAFT,X_BAD_FLAG'), \
             (3, 1, NULL)",
        );
        fixture.migrate_to(46);

        let rows = fixture.rows::<(i64, Option<String>, bool, bool, bool, bool)>(
            "SELECT id, flags, read, flagged, answered, forwarded \
             FROM messages ORDER BY id",
        );
        assert_eq!(
            vec![
                (
                    1,
                    Some("X_DOWNLOADED_FULL".to_owned()),
                    true,
                    true,
                    false,
                    false
                ),
                (2, Some("DRAFT".to_owned()), false, false, true, true),
                (3, None, false, false, false, false),
            ],
            rows
        );
    }

    #[test]
    fn deleted_column_backfill() {
        let mut fixture = Fixture::at_version(29);
        fixture.exec(
            "INSERT INTO messages (id, flags) VALUES \
             (1, 'SEEN,DELETED'), (2, 'SEEN'), (3, 'X_NO_SEEN_INFO')",
        );
        fixture.migrate_to(35);

        assert_eq!(
            vec![(1, 1), (2, 0), (3, 0)],
            fixture.rows::<(i64, i64)>(
                "SELECT id, deleted FROM messages ORDER BY id"
            )
        );
        assert_eq!(
            vec![Some("X_BAD_FLAG".to_owned())],
            fixture.rows::<(Option<String>,)>(
                "SELECT flags FROM messages WHERE id = 3"
            )
            .into_iter()
            .map(|(f,)| f)
            .collect::<Vec<_>>()
        );
    }

    #[test]
    fn orphan_headers_are_purged() {
        let mut fixture = Fixture::at_version(38);
        fixture.exec(
            "INSERT INTO messages (id) VALUES (1);
             INSERT INTO headers (message_id, name, value) VALUES \
             (1, 'Subject', 'kept'), (2, 'Subject', 'orphan');",
        );
        fixture.migrate_to(39);
        assert_eq!(
            vec![("kept".to_owned(),)],
            fixture.rows::<(String,)>("SELECT value FROM headers")
        );
    }

    #[test]
    fn folder_classes_come_from_preferences() {
        let mut fixture = Fixture::at_version(40);
        fixture.exec(
            "INSERT INTO folders (id, name) VALUES \
             (1, 'INBOX'), (2, 'Archive'), (3, 'Lists')",
        );
        {
            let prefs = fixture.helper.preferences();
            prefs.set(format!("{}.Lists.displayMode", ACCOUNT), "FIRST_CLASS");
            prefs.set(format!("{}.Lists.syncMode", ACCOUNT), "SECOND_CLASS");
            prefs.set(format!("{}.Lists.pushMode", ACCOUNT), "garbage");
            prefs.set(format!("{}.Lists.inTopGroup", ACCOUNT), "true");
        }
        fixture.migrate_to(42);

        assert_eq!(
            vec![
                (
                    "INBOX".to_owned(),
                    "FIRST_CLASS".to_owned(),
                    "FIRST_CLASS".to_owned(),
                    "FIRST_CLASS".to_owned(),
                    true,
                    true
                ),
                (
                    "Archive".to_owned(),
                    "NO_CLASS".to_owned(),
                    "INHERITED".to_owned(),
                    "SECOND_CLASS".to_owned(),
                    false,
                    false
                ),
                (
                    "Lists".to_owned(),
                    "FIRST_CLASS".to_owned(),
                    "SECOND_CLASS".to_owned(),
                    "SECOND_CLASS".to_owned(),
                    true,
                    false
                ),
            ],
            fixture.rows::<(String, String, String, String, bool, bool)>(
                "SELECT name, display_class, poll_class, push_class, \
                 top_group, integrate FROM folders ORDER BY id"
            )
        );

        // Version 42 writes the resolved classes back.
        let prefs = fixture.helper.preferences();
        assert_eq!(
            Some("INHERITED"),
            prefs.get(&format!("{}.Archive.syncMode", ACCOUNT))
        );
        assert_eq!(
            Some("SECOND_CLASS"),
            prefs.get(&format!("{}.Lists.pushMode", ACCOUNT))
        );
        assert_eq!(
            Some("true"),
            prefs.get(&format!("{}.INBOX.integrate", ACCOUNT))
        );
    }

    #[test]
    fn outboxes_are_renamed_and_merged() {
        let mut fixture = Fixture::at_version(42);
        fixture.helper.account.localized_outbox_folder =
            Some("Postausgang".to_owned());
        fixture.exec(
            "INSERT INTO folders (id, name) VALUES \
             (1, 'OUTBOX'), (2, 'Postausgang'), (3, 'Drafts');
             INSERT INTO messages (id, folder_id) VALUES (1, 1), (2, 2);",
        );
        fixture.migrate_to(43);

        assert_eq!(
            vec![(1, INTERNAL_OUTBOX.to_owned()), (3, "Drafts".to_owned())],
            fixture.rows::<(i64, String)>(
                "SELECT id, name FROM folders ORDER BY id"
            )
        );
        assert_eq!(
            vec![(1, 1), (2, 3)],
            fixture.rows::<(i64, i64)>(
                "SELECT id, folder_id FROM messages ORDER BY id"
            )
        );
    }

    #[test]
    fn thread_columns_move_to_threads_table() {
        let mut fixture = Fixture::at_version(46);
        fixture.exec(
            "INSERT INTO messages (id, thread_root, thread_parent) VALUES \
             (10, NULL, NULL), (11, 10, 10), (12, 10, 11), (13, NULL, NULL)",
        );
        fixture.migrate_to(48);

        let threads = fixture.rows::<(i64, i64, i64, Option<i64>)>(
            "SELECT id, message_id, root, parent FROM threads ORDER BY id",
        );
        assert_eq!(4, threads.len());
        let thread_of = |message: i64| {
            *threads.iter().find(|t| t.1 == message).unwrap()
        };
        let root = thread_of(10).0;
        assert_eq!((root, None), (thread_of(10).2, thread_of(10).3));
        assert_eq!((root, Some(root)), (thread_of(11).2, thread_of(11).3));
        assert_eq!(
            (root, Some(thread_of(11).0)),
            (thread_of(12).2, thread_of(12).3)
        );
        assert_eq!(thread_of(13).0, thread_of(13).2);
        assert_eq!(
            vec![(None, None)],
            fixture.rows::<(Option<i64>, Option<i64>)>(
                "SELECT DISTINCT thread_root, thread_parent FROM messages"
            )
        );

        // New threads default their root to themselves.
        fixture.exec("INSERT INTO threads (message_id) VALUES (99)");
        assert_eq!(
            vec![(true,)],
            fixture.rows::<(bool,)>(
                "SELECT root = id FROM threads WHERE message_id = 99"
            )
        );
    }

    #[test]
    fn inbox_notifies_first_class() {
        let mut fixture = Fixture::at_version(49);
        fixture.exec(
            "INSERT INTO folders (id, name) VALUES (1, 'INBOX'), (2, 'Spam')",
        );
        fixture.migrate_to(50);
        assert_eq!(
            vec![
                ("FIRST_CLASS".to_owned(),),
                ("INHERITED".to_owned(),)
            ],
            fixture.rows::<(String,)>(
                "SELECT notify_class FROM folders ORDER BY id"
            )
        );
    }
}
