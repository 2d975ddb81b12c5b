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

//! The move from flat message bodies plus an attachments table to a tree of
//! `message_parts` rows per message.
//!
//! Messages are converted one at a time, each inside its own savepoint. A
//! message which cannot be converted is reset so that the sync layer fetches
//! it again, and the rest carry on; only store-level failures abort the
//! migration. Attachment payloads move to a fresh directory keyed by part id,
//! and the legacy directory is only deleted once the whole migration has
//! committed.

use std::fs;
use std::io;

use chrono::prelude::*;
use log::{error, info, warn};

pub mod cursor;
pub mod layout;
pub mod relocate;

use self::layout::{LegacyAttachment, LegacyMessage, PartWriter, Reconstructed};
use self::relocate::AttachmentRelocator;
use super::helper::MigrationsHelper;
use super::{FsAction, StepContext};
use crate::mime::header::HeaderBlock;
use crate::store::{
    model::{parse_flags, Flag},
    types::*,
};
use crate::support::error::Error;

static PART_SCHEMA: &str = "\
DROP TRIGGER IF EXISTS delete_folder;
DROP TRIGGER IF EXISTS delete_message;
DROP INDEX IF EXISTS msg_uid;
DROP INDEX IF EXISTS msg_folder_id_deleted_date;
DROP INDEX IF EXISTS msg_empty;
DROP INDEX IF EXISTS msg_read;
DROP INDEX IF EXISTS msg_flagged;
DROP INDEX IF EXISTS msg_composite;

ALTER TABLE messages RENAME TO messages_old;

CREATE TABLE messages (
    id INTEGER PRIMARY KEY,
    deleted INTEGER default 0,
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
    attachment_count INTEGER,
    internal_date INTEGER,
    message_id TEXT,
    preview TEXT,
    mime_type TEXT,
    normalized_subject_hash INTEGER,
    empty INTEGER default 0,
    read INTEGER default 0,
    flagged INTEGER default 0,
    answered INTEGER default 0,
    forwarded INTEGER default 0,
    message_part_id INTEGER
);

CREATE TABLE message_parts (
    id INTEGER PRIMARY KEY,
    type INTEGER NOT NULL,
    root INTEGER,
    parent INTEGER NOT NULL,
    seq INTEGER NOT NULL,
    mime_type TEXT,
    decoded_body_size INTEGER,
    display_name TEXT,
    header TEXT,
    encoding TEXT,
    charset TEXT,
    data_location INTEGER NOT NULL,
    data BLOB,
    preamble TEXT,
    epilogue TEXT,
    boundary TEXT,
    content_id TEXT,
    server_extra TEXT
);

CREATE TRIGGER set_message_part_root AFTER INSERT ON message_parts
BEGIN
    UPDATE message_parts SET root = id
    WHERE root IS NULL AND ROWID = NEW.ROWID;
END;

INSERT INTO messages (
    id, deleted, folder_id, uid, subject, date, sender_list, to_list,
    cc_list, bcc_list, reply_to_list, attachment_count, internal_date,
    message_id, preview, mime_type, normalized_subject_hash, empty, read,
    flagged, answered, forwarded
)
SELECT
    id, deleted, folder_id, uid, subject, date, sender_list, to_list,
    cc_list, bcc_list, reply_to_list, attachment_count, internal_date,
    message_id, preview, mime_type, normalized_subject_hash, empty, read,
    flagged, answered, forwarded
FROM messages_old;

CREATE INDEX msg_uid ON messages (uid, folder_id);
CREATE INDEX msg_folder_id_deleted_date
    ON messages (folder_id, deleted, internal_date);
CREATE INDEX msg_empty ON messages (empty);
CREATE INDEX msg_read ON messages (read);
CREATE INDEX msg_flagged ON messages (flagged);
CREATE INDEX msg_composite
    ON messages (deleted, empty, folder_id, flagged, read);

CREATE TRIGGER delete_folder BEFORE DELETE ON folders
BEGIN
    DELETE FROM messages WHERE old.id = folder_id;
END;

CREATE TRIGGER delete_message BEFORE DELETE ON messages
BEGIN
    DELETE FROM message_parts WHERE root = OLD.message_part_id;
END;
";

static DROP_LEGACY: &str = "\
DROP TABLE messages_old;
DROP TABLE attachments;
DROP TABLE headers;
";

/// The per-message results of the conversion.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub items: Vec<(MessageId, Result<Reconstructed, Error>)>,
}

impl BatchOutcome {
    pub fn migrated(&self) -> usize {
        self.items.iter().filter(|&&(_, ref r)| r.is_ok()).count()
    }

    pub fn degraded(&self) -> impl Iterator<Item = MessageId> + '_ {
        self.items
            .iter()
            .filter(|&&(_, ref r)| r.is_err())
            .map(|&(id, _)| id)
    }
}

pub fn migrate_to_message_parts(
    ctx: &mut StepContext<'_>,
) -> Result<(), Error> {
    ctx.cxn.execute_batch(PART_SCHEMA)?;

    let relocator = prepare_attachment_dirs(ctx)?;
    let outcome = convert_messages(ctx, &relocator)?;
    let degraded = outcome.items.len() - outcome.migrated();
    info!(
        "{} Reconstructed {} messages, {} left to be downloaded again",
        ctx.log_prefix,
        outcome.migrated(),
        degraded
    );

    ctx.cxn.execute_batch(DROP_LEGACY)?;
    ctx.fs
        .after_commit(FsAction::Purge(relocator.old_dir().to_owned()));
    Ok(())
}

/// Move the legacy attachment directory aside and create an empty one in its
/// place.
fn prepare_attachment_dirs(
    ctx: &mut StepContext<'_>,
) -> Result<AttachmentRelocator, Error> {
    let account = ctx.helper.account();
    let new_dir = account.attachment_dir.clone();
    let old_dir = new_dir.with_file_name(legacy_dir_name(
        &account.uuid,
        Utc::now().timestamp_millis(),
    ));

    match fs::rename(&new_dir, &old_dir) {
        Ok(()) => ctx.fs.undo_with(FsAction::Rename {
            from: old_dir.clone(),
            to: new_dir.clone(),
        }),
        Err(e) if io::ErrorKind::NotFound == e.kind() => {
            info!(
                "{} No attachment directory at {}",
                ctx.log_prefix,
                new_dir.display()
            );
        }
        Err(e) => return Err(e.into()),
    }

    fs::create_dir_all(&new_dir)?;
    ctx.fs.undo_with(FsAction::Purge(new_dir.clone()));

    Ok(AttachmentRelocator::new(
        old_dir,
        new_dir,
        ctx.log_prefix.clone(),
    ))
}

fn convert_messages(
    ctx: &mut StepContext<'_>,
    relocator: &AttachmentRelocator,
) -> Result<BatchOutcome, Error> {
    let ids = {
        let mut stmt =
            ctx.cxn.prepare("SELECT id FROM messages_old ORDER BY id")?;
        let ids = stmt
            .query_map((), from_single::<MessageId>)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        ids
    };

    let mut outcome = BatchOutcome::default();
    for id in ids {
        ctx.cxn.execute_batch("SAVEPOINT convert_message")?;
        let mut writer = PartWriter::new(ctx.cxn, relocator);
        let result = convert_message(ctx, &mut writer, id);
        let moved = writer.into_moved();

        match result {
            Ok(reconstructed) => {
                ctx.cxn.execute_batch("RELEASE convert_message")?;
                ctx.fs.undo_all_with(moved);
                outcome.items.push((id, Ok(reconstructed)));
            }

            Err(e) => {
                ctx.cxn.execute_batch(
                    "ROLLBACK TO convert_message; RELEASE convert_message",
                )?;
                for action in moved.iter().rev() {
                    if let Err(io) = action.perform() {
                        warn!(
                            "{} Could not undo {:?}: {}",
                            ctx.log_prefix, action, io
                        );
                    }
                }

                if e.is_fatal() {
                    return Err(e);
                }

                error!(
                    "{} Message {} could not be reconstructed and will be \
                     downloaded again: {}",
                    ctx.log_prefix, id.0, e
                );
                mark_for_download(ctx, id)?;
                outcome.items.push((id, Err(e)));
            }
        }
    }

    Ok(outcome)
}

fn convert_message(
    ctx: &StepContext<'_>,
    writer: &mut PartWriter<'_>,
    id: MessageId,
) -> Result<Reconstructed, Error> {
    let cxn = ctx.cxn;
    let message = cxn.query_row(
        "SELECT id, mime_type, attachment_count, text_content, html_content \
         FROM messages_old WHERE id = ?",
        (id,),
        from_row::<LegacyMessage>,
    )?;
    let flags = cxn.query_row(
        "SELECT flags FROM messages_old WHERE id = ?",
        (id,),
        from_single::<Option<String>>,
    )?;

    let mut headers = HeaderBlock::new();
    {
        let mut stmt = cxn.prepare(
            "SELECT name, value FROM headers \
             WHERE message_id = ? ORDER BY id",
        )?;
        let rows = stmt
            .query_map((id,), from_row::<(Option<String>, Option<String>)>)?;
        for row in rows {
            if let (Some(name), value) = row? {
                headers.add(name, value.unwrap_or_default());
            }
        }
    }

    let attachments = {
        let mut stmt = cxn.prepare(
            "SELECT id, size, name, mime_type, store_data, content_uri, \
             content_id, content_disposition FROM attachments \
             WHERE message_id = ? ORDER BY id",
        )?;
        let attachments = stmt
            .query_map((id,), from_row::<LegacyAttachment>)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        attachments
    };

    let reconstructed =
        writer.write_message(&message, headers, &attachments)?;

    let mut flags = parse_flags(flags.as_deref());
    if !flags.contains(&Flag::XMigratedFromV50) {
        flags.push(Flag::XMigratedFromV50);
    }

    cxn.execute(
        "UPDATE messages SET flags = ?, mime_type = ?, message_part_id = ?, \
         attachment_count = ? WHERE id = ?",
        (
            ctx.helper.serialize_flags(&flags),
            reconstructed.mime_type,
            reconstructed.tree.root,
            reconstructed.attachment_count,
            id,
        ),
    )?;

    Ok(reconstructed)
}

/// Leave `id` without a part tree and flagged as not downloaded.
fn mark_for_download(ctx: &StepContext<'_>, id: MessageId) -> Result<(), Error> {
    // The flags themselves may be what is unreadable.
    let flags = ctx
        .cxn
        .query_row(
            "SELECT flags FROM messages_old WHERE id = ?",
            (id,),
            from_single::<Option<String>>,
        )
        .ok()
        .flatten();

    let mut flags = parse_flags(flags.as_deref());
    flags.retain(|&f| {
        Flag::XDownloadedFull != f && Flag::XDownloadedPartial != f
    });
    if !flags.contains(&Flag::XMigratedFromV50) {
        flags.push(Flag::XMigratedFromV50);
    }

    ctx.cxn.execute(
        "UPDATE messages SET flags = ?, message_part_id = NULL WHERE id = ?",
        (ctx.helper.serialize_flags(&flags), id),
    )?;
    Ok(())
}

/// The name the legacy attachment directory of `uuid` is moved to while a
/// migration started at `millis` runs.
pub fn legacy_dir_name(uuid: &str, millis: i64) -> String {
    format!("{}.old_attach-{}", uuid, millis)
}
