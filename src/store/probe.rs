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

//! Inspection of the live schema, used to keep schema steps re-runnable.

use super::types::*;
use crate::support::error::Error;

pub fn table_exists(
    cxn: &rusqlite::Connection,
    table: &str,
) -> Result<bool, Error> {
    object_exists(cxn, "table", table)
}

pub fn index_exists(
    cxn: &rusqlite::Connection,
    index: &str,
) -> Result<bool, Error> {
    object_exists(cxn, "index", index)
}

pub fn trigger_exists(
    cxn: &rusqlite::Connection,
    trigger: &str,
) -> Result<bool, Error> {
    object_exists(cxn, "trigger", trigger)
}

fn object_exists(
    cxn: &rusqlite::Connection,
    kind: &str,
    name: &str,
) -> Result<bool, Error> {
    cxn.query_row(
        "SELECT COUNT(*) FROM `sqlite_master` WHERE `type` = ? AND `name` = ?",
        (kind, name),
        from_single::<i64>,
    )
    .map(|n| n > 0)
    .map_err(Into::into)
}

pub fn column_exists(
    cxn: &rusqlite::Connection,
    table: &str,
    column: &str,
) -> Result<bool, Error> {
    cxn.query_row(
        "SELECT COUNT(*) FROM pragma_table_info(?) WHERE `name` = ?",
        (table, column),
        from_single::<i64>,
    )
    .map(|n| n > 0)
    .map_err(Into::into)
}

/// Add `column` to `table` with the given declaration unless it is already
/// there.
///
/// Returns whether the column was added.
pub fn add_column(
    cxn: &rusqlite::Connection,
    table: &str,
    column: &str,
    declaration: &str,
) -> Result<bool, Error> {
    if column_exists(cxn, table, column)? {
        return Ok(false);
    }

    cxn.execute(
        &format!("ALTER TABLE {} ADD {} {}", table, column, declaration),
        (),
    )
    .ignore_duplicate_column()?;
    Ok(true)
}

pub trait IgnoreDuplicateColumn {
    /// Treat a "duplicate column name" failure as success.
    fn ignore_duplicate_column(self) -> Self;
}

impl<R: Default> IgnoreDuplicateColumn for rusqlite::Result<R> {
    fn ignore_duplicate_column(self) -> Self {
        match self {
            Err(rusqlite::Error::SqliteFailure(_, Some(ref message)))
                if message.starts_with("duplicate column name") =>
            {
                Ok(R::default())
            }
            r => r,
        }
    }
}

/// One entry of `sqlite_master`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct SchemaObject {
    pub kind: String,
    pub name: String,
    pub sql: Option<String>,
}

impl FromRow for SchemaObject {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            kind: row.get("type")?,
            name: row.get("name")?,
            sql: row.get("sql")?,
        })
    }
}

/// Every table, index, trigger, and view of the store, in a stable order.
pub fn schema(cxn: &rusqlite::Connection) -> Result<Vec<SchemaObject>, Error> {
    let mut stmt = cxn.prepare(
        "SELECT `type`, `name`, `sql` FROM `sqlite_master` \
         WHERE `name` NOT LIKE 'sqlite_%' ORDER BY `type`, `name`",
    )?;
    let objects = stmt
        .query_map((), from_row::<SchemaObject>)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(objects)
}
