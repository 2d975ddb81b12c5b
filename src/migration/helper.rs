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

//! The view of the surrounding account subsystem that migration steps get.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::store::model::Flag;
use crate::store::types::*;
use crate::support::{error::Error, file_ops};

/// The account whose store is being migrated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Account {
    pub uuid: String,
    pub inbox_folder: String,
    pub drafts_folder: String,
    pub localized_outbox_folder: Option<String>,
    /// The directory holding the account's attachment payload files.
    pub attachment_dir: PathBuf,
}

/// A folder as listed by the helper.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Folder {
    pub id: FolderId,
    pub name: String,
}

impl FromRow for Folder {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
        })
    }
}

/// The account-scoped preference key-value storage.
///
/// Edits are held in memory; the owner persists them with `save` once the
/// migration transaction has committed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PreferenceStore {
    values: BTreeMap<String, String>,
    dirty: bool,
}

impl PreferenceStore {
    /// Load preferences from the TOML table at `path`. A missing file is an
    /// empty store.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let data = match fs::read(path) {
            Ok(data) => data,
            Err(e) if io::ErrorKind::NotFound == e.kind() => {
                return Ok(Self::default())
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            values: toml::from_slice(&data)?,
            dirty: false,
        })
    }

    /// Atomically write the preferences to `path` if anything changed.
    pub fn save(&mut self, path: &Path) -> Result<(), Error> {
        if !self.dirty {
            return Ok(());
        }

        let data = toml::to_string(&self.values)?;
        file_ops::spit(path, 0o600, data.as_bytes())?;
        self.dirty = false;
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get(key) {
            Some("true") => true,
            Some("false") => false,
            _ => default,
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        if self.values.get(&key) != Some(&value) {
            self.values.insert(key, value);
            self.dirty = true;
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}

/// Everything a migration step may need from outside the store.
pub trait MigrationsHelper {
    fn account(&self) -> &Account;

    fn preferences(&mut self) -> &mut PreferenceStore;

    /// List the account's folders.
    fn folders(
        &self,
        cxn: &rusqlite::Connection,
    ) -> Result<Vec<Folder>, Error> {
        let mut stmt =
            cxn.prepare("SELECT id, name FROM folders ORDER BY id")?;
        let folders = stmt
            .query_map((), from_row::<Folder>)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(folders)
    }

    /// Serialise the flags which do not have dedicated columns into the
    /// store's textual flag format.
    fn serialize_flags(&self, flags: &[Flag]) -> String {
        flags
            .iter()
            .filter(|f| !f.is_columnar())
            .map(|f| f.as_str())
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// The helper used outside of tests: a configured account plus its on-disk
/// preferences.
pub struct StandardHelper {
    account: Account,
    preferences: PreferenceStore,
}

impl StandardHelper {
    pub fn new(account: Account, preferences: PreferenceStore) -> Self {
        Self {
            account,
            preferences,
        }
    }

    pub fn into_preferences(self) -> PreferenceStore {
        self.preferences
    }
}

impl MigrationsHelper for StandardHelper {
    fn account(&self) -> &Account {
        &self.account
    }

    fn preferences(&mut self) -> &mut PreferenceStore {
        &mut self.preferences
    }
}
