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

//! Fixtures shared by the migration tests: an account with a scratch
//! directory, stores at arbitrary versions, and legacy messages to feed the
//! structural migration.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::migration::{
    helper::{Account, MigrationsHelper, PreferenceStore},
    FsJournal, MigrationReport, Migrations, Step, StepContext,
};
use crate::store::{probe, types::*};
use crate::support::{error::Error, log_prefix::LogPrefix};

pub const ACCOUNT: &str = "8b6c0a4e-3f1d-4f57-9a55-2d8e1c7b9f30";

pub struct TestHelper {
    pub account: Account,
    pub preferences: PreferenceStore,
}

impl TestHelper {
    /// A helper for an account keeping its files under `root`.
    pub fn new(root: &Path) -> Self {
        Self {
            account: Account {
                uuid: ACCOUNT.to_owned(),
                inbox_folder: "INBOX".to_owned(),
                drafts_folder: "Drafts".to_owned(),
                localized_outbox_folder: None,
                attachment_dir: root.join(format!("{}.db_att", ACCOUNT)),
            },
            preferences: PreferenceStore::default(),
        }
    }
}

impl MigrationsHelper for TestHelper {
    fn account(&self) -> &Account {
        &self.account
    }

    fn preferences(&mut self) -> &mut PreferenceStore {
        &mut self.preferences
    }
}

/// A store in a temporary directory.
pub struct Fixture {
    pub tmpdir: TempDir,
    pub cxn: rusqlite::Connection,
    pub helper: TestHelper,
    pub log_prefix: LogPrefix,
}

impl Fixture {
    /// An empty store, at version 0.
    pub fn new() -> Self {
        crate::init_test_log();

        let tmpdir = TempDir::new().unwrap();
        let db_path = tmpdir.path().join(format!("{}.db", ACCOUNT));
        let cxn = rusqlite::Connection::open(db_path).unwrap();
        let helper = TestHelper::new(tmpdir.path());
        fs::create_dir_all(&helper.account.attachment_dir).unwrap();

        Self {
            tmpdir,
            cxn,
            helper,
            log_prefix: LogPrefix::new("test".to_owned()),
        }
    }

    pub fn at_version(version: u32) -> Self {
        let mut fixture = Self::new();
        fixture.migrate_to(version);
        fixture
    }

    pub fn migrate_to(&mut self, version: u32) -> MigrationReport {
        self.try_migrate_to(version).unwrap()
    }

    pub fn try_migrate_to(
        &mut self,
        version: u32,
    ) -> Result<MigrationReport, Error> {
        let migrations = Migrations::standard()?;
        self.run_with(&migrations, version)
    }

    pub fn run_with(
        &mut self,
        migrations: &Migrations,
        version: u32,
    ) -> Result<MigrationReport, Error> {
        migrations.run_to(
            &mut self.cxn,
            &mut self.helper,
            &self.log_prefix,
            version,
        )
    }

    /// Run a single step outside of the engine, discarding its filesystem
    /// journal.
    pub fn apply(&mut self, step: &Step) -> Result<(), Error> {
        let mut journal = FsJournal::default();
        let mut ctx = StepContext {
            cxn: &self.cxn,
            helper: &mut self.helper,
            fs: &mut journal,
            log_prefix: &self.log_prefix,
        };
        (step.apply)(&mut ctx)
    }

    pub fn exec(&self, sql: &str) {
        self.cxn.execute_batch(sql).unwrap();
    }

    pub fn rows<T: FromRow>(&self, sql: &str) -> Vec<T> {
        let mut stmt = self.cxn.prepare(sql).unwrap();
        let rows = stmt
            .query_map((), from_row::<T>)
            .unwrap()
            .collect::<rusqlite::Result<Vec<_>>>()
            .unwrap();
        rows
    }

    pub fn schema(&self) -> Vec<probe::SchemaObject> {
        probe::schema(&self.cxn).unwrap()
    }

    pub fn attachment_dir(&self) -> PathBuf {
        self.helper.account.attachment_dir.clone()
    }

    /// Everything in the scratch directory other than the store itself.
    pub fn dir_entries(&self) -> Vec<String> {
        let mut names = fs::read_dir(self.tmpdir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| !n.ends_with(".db") && !n.ends_with(".db-journal"))
            .collect::<Vec<_>>();
        names.sort();
        names
    }

    pub fn insert_v50(&self, message: &V50Message) {
        self.cxn
            .execute(
                "INSERT INTO messages (id, folder_id, uid, subject, flags, \
                 mime_type, attachment_count, text_content, html_content, \
                 deleted, empty) \
                 VALUES (?, 1, ?, 'subject', ?, ?, ?, ?, ?, 0, 0)",
                (
                    message.id,
                    format!("uid{}", message.id),
                    message.flags,
                    message.mime_type,
                    message.attachment_count(),
                    message.text.as_deref(),
                    message.html.as_deref(),
                ),
            )
            .unwrap();

        for &(name, value) in &message.headers {
            self.cxn
                .execute(
                    "INSERT INTO headers (message_id, name, value) \
                     VALUES (?, ?, ?)",
                    (message.id, name, value),
                )
                .unwrap();
        }

        for attachment in &message.attachments {
            self.cxn
                .execute(
                    "INSERT INTO attachments (id, message_id, store_data, \
                     content_uri, size, name, mime_type, content_id, \
                     content_disposition) \
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    (
                        attachment.id,
                        message.id,
                        format!("store{}", attachment.id),
                        attachment
                            .content_uri
                            .clone()
                            .unwrap_or_else(|| locator(attachment.id)),
                        attachment.payload.map_or(0, |p| p.len() as i64),
                        attachment.name,
                        attachment.mime_type,
                        attachment.content_id,
                        attachment.disposition,
                    ),
                )
                .unwrap();

            if let Some(payload) = attachment.payload {
                fs::write(
                    self.attachment_dir().join(attachment.id.to_string()),
                    payload,
                )
                .unwrap();
            }
        }
    }

    /// The part rows of message `id`, in insertion order.
    pub fn parts(&self, id: i64) -> Vec<PartRow> {
        let mut stmt = self
            .cxn
            .prepare(
                "SELECT id, type, root, parent, seq, mime_type, header, \
                 data_location, data, boundary, content_id, display_name, \
                 decoded_body_size, server_extra FROM message_parts \
                 WHERE root = (SELECT message_part_id FROM messages \
                               WHERE id = ?) \
                 ORDER BY id",
            )
            .unwrap();
        let rows = stmt
            .query_map((id,), from_row::<PartRow>)
            .unwrap()
            .collect::<rusqlite::Result<Vec<_>>>()
            .unwrap();
        rows
    }
}

/// The locator the legacy store used for the payload of attachment `id`.
pub fn locator(id: i64) -> String {
    format!("content://com.fsck.k9.attachmentprovider/{}/{}/RAW", ACCOUNT, id)
}

/// A message as stored before version 51.
#[derive(Clone, Debug)]
pub struct V50Message {
    pub id: i64,
    pub mime_type: &'static str,
    pub flags: &'static str,
    pub text: Option<String>,
    pub html: Option<String>,
    pub headers: Vec<(&'static str, &'static str)>,
    pub attachments: Vec<V50Attachment>,
}

impl V50Message {
    pub fn new(id: i64, mime_type: &'static str) -> Self {
        Self {
            id,
            mime_type,
            flags: "X_DOWNLOADED_FULL",
            text: None,
            html: None,
            headers: vec![
                ("From", "alice@example.com"),
                ("Subject", "subject"),
            ],
            attachments: Vec::new(),
        }
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn html(mut self, html: impl Into<String>) -> Self {
        self.html = Some(html.into());
        self
    }

    pub fn header(mut self, name: &'static str, value: &'static str) -> Self {
        self.headers.push((name, value));
        self
    }

    pub fn attachment(mut self, attachment: V50Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    pub fn attachment_count(&self) -> i64 {
        self.attachments.len() as i64
    }
}

#[derive(Clone, Debug)]
pub struct V50Attachment {
    pub id: i64,
    pub mime_type: &'static str,
    pub name: &'static str,
    pub content_id: Option<&'static str>,
    pub disposition: Option<&'static str>,
    /// Overrides the locator normally derived from `id`.
    pub content_uri: Option<String>,
    /// The file contents, or `None` if the file was never downloaded.
    pub payload: Option<&'static [u8]>,
}

impl V50Attachment {
    pub fn new(
        id: i64,
        mime_type: &'static str,
        name: &'static str,
        payload: Option<&'static [u8]>,
    ) -> Self {
        Self {
            id,
            mime_type,
            name,
            content_id: None,
            disposition: None,
            content_uri: None,
            payload,
        }
    }

    pub fn located_at(mut self, content_uri: impl Into<String>) -> Self {
        self.content_uri = Some(content_uri.into());
        self
    }

    pub fn inline(mut self, content_id: &'static str) -> Self {
        self.content_id = Some(content_id);
        self.disposition = Some("inline");
        self
    }
}

/// A `message_parts` row as read back by tests.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartRow {
    pub id: i64,
    pub kind: MessagePartType,
    pub root: i64,
    pub parent: i64,
    pub seq: u32,
    pub mime_type: Option<String>,
    pub header: Option<String>,
    pub data_location: DataLocation,
    pub data: Option<Vec<u8>>,
    pub boundary: Option<String>,
    pub content_id: Option<String>,
    pub display_name: Option<String>,
    pub decoded_body_size: Option<i64>,
    pub server_extra: Option<String>,
}

impl FromRow for PartRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            kind: row.get("type")?,
            root: row.get("root")?,
            parent: row.get("parent")?,
            seq: row.get("seq")?,
            mime_type: row.get("mime_type")?,
            header: row.get("header")?,
            data_location: row.get("data_location")?,
            data: row.get("data")?,
            boundary: row.get("boundary")?,
            content_id: row.get("content_id")?,
            display_name: row.get("display_name")?,
            decoded_body_size: row.get("decoded_body_size")?,
            server_extra: row.get("server_extra")?,
        })
    }
}
