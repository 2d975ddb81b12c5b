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

//! Model types shared by the migration steps.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown value: {0}")]
pub struct UnknownName(pub String);

macro_rules! named_enum {
    ($(#[$meta:meta])* pub enum $name:ident { $($variant:ident = $text:literal,)* }) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub enum $name {
            $($variant,)*
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant,)*];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text,)*
                }
            }
        }

        impl FromStr for $name {
            type Err = UnknownName;

            fn from_str(s: &str) -> Result<Self, UnknownName> {
                match s {
                    $($text => Ok($name::$variant),)*
                    _ => Err(UnknownName(s.to_owned())),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

named_enum! {
    /// A message flag as stored in the textual `flags` column.
    pub enum Flag {
        Deleted = "DELETED",
        Seen = "SEEN",
        Answered = "ANSWERED",
        Flagged = "FLAGGED",
        Draft = "DRAFT",
        Recent = "RECENT",
        Forwarded = "FORWARDED",
        XDestroyed = "X_DESTROYED",
        XSendFailed = "X_SEND_FAILED",
        XSendInProgress = "X_SEND_IN_PROGRESS",
        XDownloadedFull = "X_DOWNLOADED_FULL",
        XDownloadedPartial = "X_DOWNLOADED_PARTIAL",
        XRemoteCopyStarted = "X_REMOTE_COPY_STARTED",
        XMigratedFromV50 = "X_MIGRATED_FROM_V50",
        XDraftOpenPgpInline = "X_DRAFT_OPENPGP_INLINE",
        XSubjectDecrypted = "X_SUBJECT_DECRYPTED",
    }
}

impl Flag {
    /// Whether this flag has a dedicated boolean column on `messages` rather
    /// than living in the `flags` text.
    pub fn is_columnar(self) -> bool {
        matches!(
            self,
            Flag::Deleted
                | Flag::Seen
                | Flag::Answered
                | Flag::Flagged
                | Flag::Forwarded
        )
    }
}

/// Parse a comma-separated legacy flag list.
///
/// Names this build does not know are dropped, as are duplicates.
pub fn parse_flags(text: Option<&str>) -> Vec<Flag> {
    let mut flags = Vec::new();
    for name in text.unwrap_or("").split(',') {
        if let Ok(flag) = name.trim().parse::<Flag>() {
            if !flags.contains(&flag) {
                flags.push(flag);
            }
        }
    }
    flags
}

named_enum! {
    /// How prominently a folder is displayed, synced, pushed, or notified.
    pub enum FolderClass {
        NoClass = "NO_CLASS",
        Inherited = "INHERITED",
        FirstClass = "FIRST_CLASS",
        SecondClass = "SECOND_CLASS",
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn flag_names_round_trip() {
        for &flag in Flag::ALL {
            assert_eq!(Ok(flag), flag.as_str().parse());
        }
        for &class in FolderClass::ALL {
            assert_eq!(Ok(class), class.to_string().parse());
        }
        assert_eq!(
            Err(UnknownName("X_BAD_FLAG".to_owned())),
            "X_BAD_FLAG".parse::<Flag>()
        );
    }

    #[test]
    fn parse_legacy_flag_lists() {
        assert_eq!(Vec::<Flag>::new(), parse_flags(None));
        assert_eq!(Vec::<Flag>::new(), parse_flags(Some("")));
        assert_eq!(
            vec![Flag::Seen, Flag::XDownloadedFull, Flag::Deleted],
            parse_flags(Some("SEEN,X_DOWNLOADED_FULL,,X_BAD_FLAG,DELETED,SEEN"))
        );
        assert!(Flag::Seen.is_columnar());
        assert!(!Flag::Draft.is_columnar());
    }
}
