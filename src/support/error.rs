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

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Store version {0} predates every supported upgrade path")]
    UnsupportedVersion(u32),
    #[error("Store version {found} is newer than this build supports ({supported})")]
    StoreTooNew { found: u32, supported: u32 },
    #[error("Malformed migration table: {0}")]
    BadMigrationTable(String),
    #[error("Target version {0} is not a step boundary")]
    BadTargetVersion(u32),
    #[error("Part cursor ascended past its outermost container")]
    CursorUnderflow,
    #[error("Content type '{0}' cannot be stored as simple content")]
    UnsupportedSimpleType(String),
    #[error("Legacy message {0} is corrupt: {1}")]
    CorruptMessage(i64, String),
    #[error("No such account: {0}")]
    NxAccount(String),
    #[error("No store at '{}'", .0.display())]
    NxStore(PathBuf),
    #[error("Bad preferences file: {0}")]
    BadPreferences(#[from] toml::de::Error),
    #[error(transparent)]
    PreferencesSer(#[from] toml::ser::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

impl Error {
    /// Whether this error must abort the whole migration transaction.
    ///
    /// Anything else only spoils the item being processed when it occurs
    /// inside a best-effort batch.
    pub fn is_fatal(&self) -> bool {
        match *self {
            Error::Sqlite(rusqlite::Error::FromSqlConversionFailure(..))
            | Error::Sqlite(rusqlite::Error::InvalidColumnType(..))
            | Error::Sqlite(rusqlite::Error::Utf8Error(..))
            | Error::Io(..)
            | Error::CursorUnderflow
            | Error::UnsupportedSimpleType(..)
            | Error::CorruptMessage(..) => false,
            _ => true,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn store_level_errors_are_fatal() {
        assert!(Error::Sqlite(rusqlite::Error::InvalidQuery).is_fatal());
        assert!(Error::UnsupportedVersion(3).is_fatal());
        assert!(!Error::Io(io::Error::new(io::ErrorKind::Other, "x"))
            .is_fatal());
        assert!(!Error::CursorUnderflow.is_fatal());
        assert!(!Error::Sqlite(rusqlite::Error::InvalidColumnType(
            0,
            "text_content".to_owned(),
            rusqlite::types::Type::Blob,
        ))
        .is_fatal());
    }
}
