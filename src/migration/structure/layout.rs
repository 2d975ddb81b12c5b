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

//! Choosing the shape of a legacy message's part tree and writing its rows.

use std::borrow::Cow;

use super::cursor::{Cursor, MimeTree, RootCursor, Slot};
use super::relocate::{AttachmentRelocator, Relocation};
use crate::migration::FsAction;
use crate::mime::header::*;
use crate::mime::quoted_printable::qp_encode;
use crate::store::types::*;
use crate::support::error::Error;

/// The body columns of a message in the flat layout.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LegacyMessage {
    pub id: MessageId,
    pub mime_type: Option<String>,
    pub attachment_count: i64,
    pub text: Option<String>,
    pub html: Option<String>,
}

impl FromRow for LegacyMessage {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            mime_type: row.get("mime_type")?,
            attachment_count: row
                .get::<_, Option<i64>>("attachment_count")?
                .unwrap_or(0),
            text: row.get("text_content")?,
            html: row.get("html_content")?,
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LegacyAttachment {
    pub id: AttachmentId,
    pub size: Option<i64>,
    pub name: Option<String>,
    pub mime_type: Option<String>,
    pub store_data: Option<String>,
    pub content_uri: Option<String>,
    pub content_id: Option<String>,
    pub content_disposition: Option<String>,
}

impl FromRow for LegacyAttachment {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            size: row.get("size")?,
            name: row.get("name")?,
            mime_type: row.get("mime_type")?,
            store_data: row.get("store_data")?,
            content_uri: row.get("content_uri")?,
            content_id: row.get("content_id")?,
            content_disposition: row.get("content_disposition")?,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SimpleKind {
    Plain,
    Html,
    Alternative,
}

impl SimpleKind {
    pub fn from_mime_type(mime_type: Option<&str>) -> Result<Self, Error> {
        if is_mime_type(mime_type, "text/plain") {
            Ok(SimpleKind::Plain)
        } else if is_mime_type(mime_type, "text/html") {
            Ok(SimpleKind::Html)
        } else if is_mime_type(mime_type, "multipart/alternative") {
            Ok(SimpleKind::Alternative)
        } else {
            Err(Error::UnsupportedSimpleType(
                mime_type.unwrap_or("").to_owned(),
            ))
        }
    }

    fn mime_type(self) -> &'static str {
        match self {
            SimpleKind::Plain => "text/plain",
            SimpleKind::Html => "text/html",
            SimpleKind::Alternative => "multipart/alternative",
        }
    }
}

/// The tree shape chosen for a legacy message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Layout {
    /// PGP/MIME: a `multipart/encrypted` container holding the attachment at
    /// `control` followed by the one at `payload`.
    Encrypted { control: usize, payload: usize },
    /// The body alone.
    Simple(SimpleKind),
    /// A `multipart/mixed` container holding the body and then every
    /// attachment.
    Mixed,
}

pub fn classify(
    message: &LegacyMessage,
    attachments: &[LegacyAttachment],
) -> Layout {
    if 2 == message.attachment_count
        && 2 == attachments.len()
        && is_mime_type(message.mime_type.as_deref(), "multipart/encrypted")
    {
        let is_control = |a: &LegacyAttachment| {
            is_mime_type(a.mime_type.as_deref(), "application/pgp-encrypted")
        };
        let (control, payload) =
            if !is_control(&attachments[0]) && is_control(&attachments[1]) {
                (1, 0)
            } else {
                (0, 1)
            };

        if is_control(&attachments[control])
            && is_mime_type(
                attachments[payload].mime_type.as_deref(),
                "application/octet-stream",
            )
        {
            return Layout::Encrypted { control, payload };
        }
    }

    if 0 == message.attachment_count && attachments.is_empty() {
        if let Ok(kind) =
            SimpleKind::from_mime_type(message.mime_type.as_deref())
        {
            return Layout::Simple(kind);
        }
    }

    Layout::Mixed
}

/// Point references to attachments' legacy content locators in `html` at
/// their content ids instead.
pub fn rewrite_inline_references<'a>(
    html: &'a str,
    attachments: &[LegacyAttachment],
) -> Cow<'a, str> {
    let mut html = Cow::Borrowed(html);
    for attachment in attachments {
        if let (Some(uri), Some(cid)) =
            (&attachment.content_uri, &attachment.content_id)
        {
            if !uri.is_empty() && html.contains(uri.as_str()) {
                let cid = format!("cid:{}", cid);
                html = Cow::Owned(html.replace(uri.as_str(), &cid));
            }
        }
    }
    html
}

/// What became of a message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reconstructed {
    pub tree: MimeTree,
    pub mime_type: &'static str,
    pub attachment_count: i64,
}

/// Writes the part rows of one message, moving attachment payloads as it
/// goes.
pub struct PartWriter<'a> {
    cxn: &'a rusqlite::Connection,
    relocator: &'a AttachmentRelocator,
    moved: Vec<FsAction>,
}

impl<'a> PartWriter<'a> {
    pub fn new(
        cxn: &'a rusqlite::Connection,
        relocator: &'a AttachmentRelocator,
    ) -> Self {
        Self {
            cxn,
            relocator,
            moved: Vec::new(),
        }
    }

    /// The renames which would put every payload moved so far back where it
    /// was.
    pub fn into_moved(self) -> Vec<FsAction> {
        self.moved
    }

    /// Write the whole tree of `message`, whose own header fields are
    /// `headers`.
    pub fn write_message(
        &mut self,
        message: &LegacyMessage,
        headers: HeaderBlock,
        attachments: &[LegacyAttachment],
    ) -> Result<Reconstructed, Error> {
        let text = message.text.as_deref();
        let html = message.html.as_deref();

        match classify(message, attachments) {
            Layout::Encrypted { control, payload } => {
                let tree = self.write_encrypted(
                    headers,
                    &attachments[control],
                    &attachments[payload],
                )?;
                Ok(Reconstructed {
                    tree,
                    mime_type: "multipart/encrypted",
                    attachment_count: 2,
                })
            }

            Layout::Simple(kind) => {
                let cursor = RootCursor::new();
                let tree = match kind {
                    SimpleKind::Plain => {
                        self.write_text(cursor, headers, text, false)?
                    }
                    SimpleKind::Html => {
                        self.write_text(cursor, headers, html, true)?
                    }
                    SimpleKind::Alternative => {
                        self.write_alternative(cursor, headers, text, html)?
                    }
                };
                Ok(Reconstructed {
                    tree,
                    mime_type: kind.mime_type(),
                    attachment_count: 0,
                })
            }

            Layout::Mixed => {
                let html = html.map(|h| rewrite_inline_references(h, attachments));
                let tree = self.write_mixed(
                    headers,
                    text,
                    html.as_deref(),
                    attachments,
                )?;
                Ok(Reconstructed {
                    tree,
                    mime_type: "multipart/mixed",
                    attachment_count: attachments.len() as i64,
                })
            }
        }
    }

    fn write_encrypted(
        &mut self,
        mut headers: HeaderBlock,
        control: &LegacyAttachment,
        payload: &LegacyAttachment,
    ) -> Result<MimeTree, Error> {
        let boundary = boundary_of(&headers).unwrap_or_else(generate_boundary);
        headers.set(
            CONTENT_TYPE,
            format!(
                "multipart/encrypted; boundary=\"{}\"; \
                 protocol=\"application/pgp-encrypted\"",
                boundary
            ),
        );

        let (id, slot) = self.insert_container(
            RootCursor::new(),
            "multipart/encrypted",
            &headers,
            &boundary,
            DataLocation::InDatabase,
        )?;
        // The protocol parts are written under their canonical types, and
        // never carry a content id or disposition.
        let protocol_part = |attachment: &LegacyAttachment, mime_type: &str| {
            LegacyAttachment {
                mime_type: Some(mime_type.to_owned()),
                content_id: None,
                content_disposition: None,
                ..attachment.clone()
            }
        };
        let control = protocol_part(control, "application/pgp-encrypted");
        let payload = protocol_part(payload, "application/octet-stream");

        let cursor = slot.container(id);
        let cursor = self.write_attachment(cursor, &control)?;
        let cursor = self.write_attachment(cursor, &payload)?;
        Ok(cursor.finish())
    }

    fn write_mixed(
        &mut self,
        mut headers: HeaderBlock,
        text: Option<&str>,
        html: Option<&str>,
        attachments: &[LegacyAttachment],
    ) -> Result<MimeTree, Error> {
        let boundary = boundary_of(&headers).unwrap_or_else(generate_boundary);
        headers.set(
            CONTENT_TYPE,
            format!("multipart/mixed; boundary=\"{}\";", boundary),
        );

        let (id, slot) = self.insert_container(
            RootCursor::new(),
            "multipart/mixed",
            &headers,
            &boundary,
            DataLocation::InDatabase,
        )?;
        let mut cursor = slot.container(id);

        cursor = match (text, html) {
            (Some(_), Some(_)) => self.write_alternative(
                cursor,
                HeaderBlock::new(),
                text,
                html,
            )?,
            (None, Some(_)) => {
                self.write_text(cursor, HeaderBlock::new(), html, true)?
            }
            (Some(_), None) => {
                self.write_text(cursor, HeaderBlock::new(), text, false)?
            }
            (None, None) => cursor,
        };

        for attachment in attachments {
            cursor = self.write_attachment(cursor, attachment)?;
        }

        Ok(cursor.finish())
    }

    fn write_alternative<C: Cursor>(
        &mut self,
        cursor: C,
        mut headers: HeaderBlock,
        text: Option<&str>,
        html: Option<&str>,
    ) -> Result<<C::Slot as Slot>::Leaf, Error> {
        let boundary = boundary_of(&headers).unwrap_or_else(generate_boundary);
        headers.set(
            CONTENT_TYPE,
            format!("multipart/alternative; boundary=\"{}\";", boundary),
        );
        let location = if text.is_some() || html.is_some() {
            DataLocation::InDatabase
        } else {
            DataLocation::Missing
        };

        let (id, slot) = self.insert_container(
            cursor,
            "multipart/alternative",
            &headers,
            &boundary,
            location,
        )?;
        let mut children = slot.container(id);
        if text.is_some() {
            children =
                self.write_text(children, HeaderBlock::new(), text, false)?;
        }
        if html.is_some() {
            children =
                self.write_text(children, HeaderBlock::new(), html, true)?;
        }
        <C::Slot as Slot>::close(children)
    }

    fn insert_container<C: Cursor>(
        &mut self,
        cursor: C,
        mime_type: &str,
        headers: &HeaderBlock,
        boundary: &str,
        location: DataLocation,
    ) -> Result<(MessagePartId, C::Slot), Error> {
        let (placement, slot) = cursor.stamp();
        self.cxn.execute(
            "INSERT INTO message_parts \
             (type, root, parent, seq, mime_type, header, data_location, \
              boundary) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            (
                MessagePartType::Unknown,
                placement.root,
                placement.parent_value(),
                placement.seq,
                mime_type,
                headers.to_string(),
                location,
                boundary,
            ),
        )?;
        Ok((MessagePartId(self.cxn.last_insert_rowid()), slot))
    }

    fn write_text<C: Cursor>(
        &mut self,
        cursor: C,
        mut headers: HeaderBlock,
        content: Option<&str>,
        html: bool,
    ) -> Result<<C::Slot as Slot>::Leaf, Error> {
        let mime_type = if html { "text/html" } else { "text/plain" };
        headers.set(
            CONTENT_TYPE,
            format!("{}; charset=\"utf-8\"", mime_type),
        );
        headers.set(CONTENT_TRANSFER_ENCODING, "quoted-printable");

        let (location, data, size) = match content {
            Some(content) => (
                DataLocation::InDatabase,
                Some(qp_encode(content.as_bytes())),
                content.len() as i64,
            ),
            None => (DataLocation::Missing, None, 0),
        };

        let (placement, slot) = cursor.stamp();
        self.cxn.execute(
            "INSERT INTO message_parts \
             (type, root, parent, seq, mime_type, decoded_body_size, header, \
              encoding, charset, data_location, data) \
             VALUES (?, ?, ?, ?, ?, ?, ?, 'quoted-printable', 'utf-8', ?, ?)",
            (
                MessagePartType::Unknown,
                placement.root,
                placement.parent_value(),
                placement.seq,
                mime_type,
                size,
                headers.to_string(),
                location,
                data.map(String::into_bytes),
            ),
        )?;
        Ok(slot.leaf(MessagePartId(self.cxn.last_insert_rowid())))
    }

    fn write_attachment<C: Cursor>(
        &mut self,
        cursor: C,
        attachment: &LegacyAttachment,
    ) -> Result<<C::Slot as Slot>::Leaf, Error> {
        let mime_type = attachment
            .mime_type
            .as_deref()
            .unwrap_or("application/octet-stream");
        let name = attachment.name.as_deref().unwrap_or("");
        let disposition = attachment
            .content_disposition
            .as_deref()
            .unwrap_or("attachment");
        let size = attachment.size.unwrap_or(0);
        let content_id =
            attachment.content_id.as_deref().filter(|c| !c.is_empty());

        let mut headers = HeaderBlock::new();
        headers.add(CONTENT_TYPE, format!("{};\r\n name=\"{}\"", mime_type, name));
        headers.add(
            CONTENT_DISPOSITION,
            format!(
                "{};\r\n filename=\"{}\";\r\n size={}",
                disposition, name, size
            ),
        );
        if let Some(content_id) = content_id {
            headers.add(CONTENT_ID, content_id);
        }

        let kind = if content_id.is_some()
            && disposition.eq_ignore_ascii_case("inline")
        {
            MessagePartType::HiddenAttachment
        } else {
            MessagePartType::Unknown
        };

        let source = self
            .relocator
            .source(attachment.id, attachment.content_uri.as_deref());
        let location = if source.is_some() {
            DataLocation::OnDisk
        } else {
            DataLocation::Missing
        };

        let (placement, slot) = cursor.stamp();
        self.cxn.execute(
            "INSERT INTO message_parts \
             (type, root, parent, seq, mime_type, decoded_body_size, \
              display_name, header, encoding, data_location, content_id, \
              server_extra) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'binary', ?, ?, ?)",
            (
                kind,
                placement.root,
                placement.parent_value(),
                placement.seq,
                mime_type,
                size,
                attachment.name.as_deref(),
                headers.to_string(),
                location,
                content_id,
                attachment.store_data.as_deref(),
            ),
        )?;
        let id = MessagePartId(self.cxn.last_insert_rowid());

        if let Some(source) = source {
            match self.relocator.relocate(attachment.id, id) {
                Relocation::Located(dst) => self.moved.push(FsAction::Rename {
                    from: dst,
                    to: source,
                }),
                Relocation::Missing => {
                    self.cxn.execute(
                        "UPDATE message_parts SET data_location = ? \
                         WHERE id = ?",
                        (DataLocation::Missing, id),
                    )?;
                }
            }
        }

        Ok(slot.leaf(id))
    }
}
