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

//! Steps after the message part tree was introduced.

use log::{info, warn};

use super::pending_commands::LegacyCommand;
use super::StepContext;
use crate::mime::quoted_printable::qp_decode;
use crate::store::{probe, types::*};
use crate::support::error::Error;

pub fn add_more_messages(ctx: &mut StepContext<'_>) -> Result<(), Error> {
    probe::add_column(
        ctx.cxn,
        "folders",
        "more_messages",
        "TEXT default 'unknown'",
    )?;
    Ok(())
}

pub fn clear_null_empty(ctx: &mut StepContext<'_>) -> Result<(), Error> {
    ctx.cxn
        .execute("UPDATE messages SET empty = 0 WHERE empty IS NULL", ())?;
    Ok(())
}

pub fn add_preview_type(ctx: &mut StepContext<'_>) -> Result<(), Error> {
    probe::add_column(
        ctx.cxn,
        "messages",
        "preview_type",
        "TEXT default 'none'",
    )?;
    ctx.cxn.execute(
        "UPDATE messages SET preview_type = 'text' \
         WHERE preview IS NOT NULL AND preview != ''",
        (),
    )?;
    Ok(())
}

/// The searchable text of a message: its first stored `text/plain` part, or
/// else its preview.
fn fulltext_of(
    cxn: &rusqlite::Connection,
    root: Option<MessagePartId>,
    preview: Option<String>,
) -> Result<Option<String>, Error> {
    use rusqlite::OptionalExtension as _;

    let part = match root {
        None => None,
        Some(root) => cxn
            .query_row(
                "SELECT data, encoding FROM message_parts \
                 WHERE root = ? AND mime_type = 'text/plain' \
                 AND data_location = ? AND data IS NOT NULL \
                 ORDER BY id LIMIT 1",
                (root, DataLocation::InDatabase),
                from_row::<(Vec<u8>, Option<String>)>,
            )
            .optional()?,
    };

    let text = match part {
        Some((data, encoding)) => {
            let decoded = if encoding
                .as_deref()
                .map_or(false, |e| e.eq_ignore_ascii_case("quoted-printable"))
            {
                qp_decode(&data).0.into_owned()
            } else {
                data
            };
            Some(String::from_utf8_lossy(&decoded).into_owned())
        }
        None => preview,
    };

    Ok(text.filter(|t| !t.trim().is_empty()))
}

pub fn create_fulltext(ctx: &mut StepContext<'_>) -> Result<(), Error> {
    ctx.cxn.execute(
        "CREATE VIRTUAL TABLE IF NOT EXISTS messages_fulltext \
         USING fts4 (fulltext)",
        (),
    )?;

    let messages = {
        let mut stmt = ctx.cxn.prepare(
            "SELECT id, message_part_id, preview FROM messages \
             WHERE deleted = 0 \
             AND id NOT IN (SELECT docid FROM messages_fulltext) \
             ORDER BY id",
        )?;
        let messages = stmt
            .query_map(
                (),
                from_row::<(MessageId, Option<MessagePartId>, Option<String>)>,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        messages
    };

    let mut indexed = 0;
    for (id, root, preview) in messages {
        if let Some(text) = fulltext_of(ctx.cxn, root, preview)? {
            ctx.cxn.execute(
                "INSERT INTO messages_fulltext (docid, fulltext) VALUES (?, ?)",
                (id, text),
            )?;
            indexed += 1;
        }
    }

    info!("{} Indexed {} messages for search", ctx.log_prefix, indexed);
    Ok(())
}

pub fn prune_fulltext(ctx: &mut StepContext<'_>) -> Result<(), Error> {
    ctx.cxn.execute(
        "DELETE FROM messages_fulltext WHERE docid NOT IN \
         (SELECT id FROM messages WHERE deleted = 0)",
        (),
    )?;
    Ok(())
}

pub fn mark_multipart_locations(
    ctx: &mut StepContext<'_>,
) -> Result<(), Error> {
    ctx.cxn.execute(
        "UPDATE message_parts SET data_location = ? \
         WHERE mime_type LIKE 'multipart/%'",
        (DataLocation::ChildPartContainsData,),
    )?;
    Ok(())
}

pub fn cascade_message_deletes(
    ctx: &mut StepContext<'_>,
) -> Result<(), Error> {
    let purged = ctx.cxn.execute(
        "DELETE FROM message_parts WHERE root NOT IN \
         (SELECT message_part_id FROM messages \
          WHERE message_part_id IS NOT NULL)",
        (),
    )?;
    info!("{} Purged {} orphaned message parts", ctx.log_prefix, purged);

    ctx.cxn.execute_batch(
        "DROP TRIGGER IF EXISTS delete_message;
         CREATE TRIGGER delete_message BEFORE DELETE ON messages
         BEGIN
             DELETE FROM message_parts WHERE root = OLD.message_part_id;
             DELETE FROM messages_fulltext WHERE docid = OLD.id;
         END;",
    )?;
    Ok(())
}

pub fn add_missing_indexes(ctx: &mut StepContext<'_>) -> Result<(), Error> {
    ctx.cxn.execute_batch(
        "CREATE INDEX IF NOT EXISTS message_parts_root \
         ON message_parts (root);
         CREATE INDEX IF NOT EXISTS msg_uid ON messages (uid, folder_id);",
    )?;
    Ok(())
}

pub fn reshape_pending_commands(
    ctx: &mut StepContext<'_>,
) -> Result<(), Error> {
    if !probe::column_exists(ctx.cxn, "pending_commands", "arguments")? {
        return Ok(());
    }

    let legacy = {
        let mut stmt = ctx.cxn.prepare(
            "SELECT id, command, arguments FROM pending_commands ORDER BY id",
        )?;
        let legacy = stmt
            .query_map((), from_row::<(i64, Option<String>, Option<String>)>)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        legacy
    };

    ctx.cxn.execute(
        "CREATE TABLE pending_commands_reshaped (
             id INTEGER PRIMARY KEY,
             command TEXT NOT NULL,
             data TEXT NOT NULL
         )",
        (),
    )?;

    for (id, name, arguments) in legacy {
        let command = name.as_deref().and_then(|name| {
            LegacyCommand::parse(name, arguments.as_deref()).convert()
        });
        match command {
            Some(command) => {
                ctx.cxn.execute(
                    "INSERT INTO pending_commands_reshaped (id, command, data) \
                     VALUES (?, ?, ?)",
                    (id, command.name(), command.data()?),
                )?;
            }
            None => warn!(
                "{} Dropping pending command {} ({}): not understood",
                ctx.log_prefix,
                id,
                name.as_deref().unwrap_or("unnamed")
            ),
        }
    }

    ctx.cxn.execute_batch(
        "DROP TABLE pending_commands;
         ALTER TABLE pending_commands_reshaped RENAME TO pending_commands;",
    )?;
    Ok(())
}

pub const ERRORS_FOLDER: &str = "K9mail-errors";

pub fn remove_errors_folder(ctx: &mut StepContext<'_>) -> Result<(), Error> {
    let removed = ctx
        .cxn
        .execute("DELETE FROM folders WHERE name = ?", (ERRORS_FOLDER,))?;
    if removed > 0 {
        info!("{} Removed folder {}", ctx.log_prefix, ERRORS_FOLDER);
    }
    Ok(())
}

pub fn add_remote_ids(ctx: &mut StepContext<'_>) -> Result<(), Error> {
    probe::add_column(ctx.cxn, "folders", "remoteId", "TEXT")?;
    probe::add_column(ctx.cxn, "folders", "parentRemoteId", "TEXT")?;
    ctx.cxn.execute(
        "UPDATE folders SET remoteId = name WHERE remoteId IS NULL",
        (),
    )?;
    Ok(())
}
