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

//! Bindings for the store's model types to `rusqlite`.

use rusqlite::types::{
    FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef,
};

use super::model::FolderClass;

macro_rules! transparent_to_sql {
    ($t:ident) => {
        impl ToSql for $t {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                self.0.to_sql()
            }
        }
    };
}

macro_rules! transparent_from_sql {
    ($t:ident) => {
        impl FromSql for $t {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                FromSql::column_result(value).map(Self)
            }
        }
    };
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FolderId(pub i64);
transparent_to_sql!(FolderId);
transparent_from_sql!(FolderId);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MessageId(pub i64);
transparent_to_sql!(MessageId);
transparent_from_sql!(MessageId);

/// The id of a row in the legacy `attachments` table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AttachmentId(pub i64);
transparent_to_sql!(AttachmentId);
transparent_from_sql!(AttachmentId);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MessagePartId(pub i64);
transparent_to_sql!(MessagePartId);
transparent_from_sql!(MessagePartId);

/// The value of `message_parts.parent` for a root part.
pub const NO_PARENT: i64 = -1;

/// Where the payload of a message part lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataLocation {
    Missing = 0,
    InDatabase = 1,
    OnDisk = 2,
    /// Only for multipart containers, whose content is their children.
    ChildPartContainsData = 3,
}

impl ToSql for DataLocation {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(*self as i64))
    }
}

impl FromSql for DataLocation {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match i64::column_result(value)? {
            0 => Ok(Self::Missing),
            1 => Ok(Self::InDatabase),
            2 => Ok(Self::OnDisk),
            3 => Ok(Self::ChildPartContainsData),
            other => Err(FromSqlError::OutOfRange(other)),
        }
    }
}

/// The role a message part plays when the message is displayed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessagePartType {
    Unknown = 0,
    AlternativePlain = 1,
    AlternativeHtml = 2,
    Text = 3,
    Related = 4,
    Attachment = 5,
    HiddenAttachment = 6,
}

impl ToSql for MessagePartType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(*self as i64))
    }
}

impl FromSql for MessagePartType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match i64::column_result(value)? {
            0 => Ok(Self::Unknown),
            1 => Ok(Self::AlternativePlain),
            2 => Ok(Self::AlternativeHtml),
            3 => Ok(Self::Text),
            4 => Ok(Self::Related),
            5 => Ok(Self::Attachment),
            6 => Ok(Self::HiddenAttachment),
            other => Err(FromSqlError::OutOfRange(other)),
        }
    }
}

impl ToSql for FolderClass {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::Borrowed(ValueRef::Text(
            self.as_str().as_bytes(),
        )))
    }
}

impl FromSql for FolderClass {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let as_str = value.as_str()?;
        as_str
            .parse()
            .map_err(|_| FromSqlError::Other(as_str.to_owned().into()))
    }
}

pub fn from_single<T: FromSql>(row: &rusqlite::Row<'_>) -> rusqlite::Result<T> {
    row.get(0)
}

pub fn from_row<T: FromRow>(row: &rusqlite::Row<'_>) -> rusqlite::Result<T> {
    T::from_row(row)
}

pub trait FromRow: Sized {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self>;
}

macro_rules! from_row_tuple {
    ($($ix:tt: $t:ident),*) => {
        impl<$($t: FromSql,)*> FromRow
        for ($($t,)*) {
            fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
                Ok(($(row.get($ix)?,)*))
            }
        }
    }
}

from_row_tuple!(0: A);
from_row_tuple!(0: A, 1: B);
from_row_tuple!(0: A, 1: B, 2: C);
from_row_tuple!(0: A, 1: B, 2: C, 3: D);
from_row_tuple!(0: A, 1: B, 2: C, 3: D, 4: E);
from_row_tuple!(0: A, 1: B, 2: C, 3: D, 4: E, 5: F);
