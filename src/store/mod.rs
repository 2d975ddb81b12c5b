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

//! The account's SQLite message store.

use std::path::Path;
use std::time::Duration;

use log::warn;

use crate::migration::{
    self, helper::MigrationsHelper, MigrationReport, Migrations,
};
use crate::support::{error::Error, file_ops, log_prefix::LogPrefix};

pub mod model;
pub mod probe;
pub mod types;

/// An open connection to one account's store.
#[derive(Debug)]
pub struct Store {
    cxn: rusqlite::Connection,
}

impl Store {
    /// Open the store at `path`, creating an empty one if it does not exist.
    pub fn open(path: &Path) -> Result<Self, Error> {
        let cxn = rusqlite::Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        // Mail content; only the owner may read it.
        if let Err(e) = file_ops::chmod(path, 0o600) {
            warn!("Unable to restrict access to '{}': {}", path.display(), e);
        }

        cxn.busy_timeout(Duration::from_secs(10))?;
        Ok(Self { cxn })
    }

    /// Open an existing store without write access.
    ///
    /// Unlike `open`, a missing store is an error rather than a new empty
    /// one.
    pub fn open_existing(path: &Path) -> Result<Self, Error> {
        if !path.is_file() {
            return Err(Error::NxStore(path.to_owned()));
        }

        let cxn = rusqlite::Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY
                | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        cxn.busy_timeout(Duration::from_secs(10))?;
        Ok(Self { cxn })
    }

    pub fn version(&self) -> Result<u32, Error> {
        migration::stored_version(&self.cxn)
    }

    /// Bring the store to `target`, or the latest version `migrations` knows
    /// if `None`.
    pub fn upgrade(
        &mut self,
        migrations: &Migrations,
        helper: &mut dyn MigrationsHelper,
        log_prefix: &LogPrefix,
        target: Option<u32>,
    ) -> Result<MigrationReport, Error> {
        let target = target.unwrap_or_else(|| migrations.latest());
        migrations.run_to(&mut self.cxn, helper, log_prefix, target)
    }

    pub fn connection(&self) -> &rusqlite::Connection {
        &self.cxn
    }
}
