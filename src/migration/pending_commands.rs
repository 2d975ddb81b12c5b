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

//! Queued remote operations, converted from the positional argument lists of
//! the legacy `pending_commands.arguments` column into typed JSON for `data`.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Serialize, Serializer};

use crate::store::model::Flag;

const LEGACY_PREFIX: &str = "com.fsck.k9.MessagingController.";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveOrCopy {
    pub src_folder: String,
    pub dest_folder: String,
    pub is_copy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_uid_map: Option<BTreeMap<String, String>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetFlag {
    pub folder: String,
    pub new_state: bool,
    #[serde(serialize_with = "flag_name")]
    pub flag: Flag,
    pub uids: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Append {
    pub folder: String,
    pub uid: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct InFolder {
    pub folder: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EmptyTrash {}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PendingCommand {
    MoveOrCopy(MoveOrCopy),
    SetFlag(SetFlag),
    Append(Append),
    MarkAllAsRead(InFolder),
    Expunge(InFolder),
    EmptyTrash(EmptyTrash),
}

fn flag_name<S: Serializer>(flag: &Flag, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(flag.as_str())
}

impl PendingCommand {
    /// The value of the `command` column.
    pub fn name(&self) -> &'static str {
        match *self {
            PendingCommand::MoveOrCopy(..) => "move_or_copy",
            PendingCommand::SetFlag(..) => "set_flag",
            PendingCommand::Append(..) => "append",
            PendingCommand::MarkAllAsRead(..) => "mark_all_as_read",
            PendingCommand::Expunge(..) => "expunge",
            PendingCommand::EmptyTrash(..) => "empty_trash",
        }
    }

    /// The value of the `data` column.
    pub fn data(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// A row of the legacy table: a command name and its decoded arguments.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LegacyCommand<'a> {
    pub name: &'a str,
    pub arguments: Vec<String>,
}

impl<'a> LegacyCommand<'a> {
    /// Split the stored argument list. Each argument was URL-encoded and the
    /// results joined with commas; trailing empty arguments were never kept.
    pub fn parse(name: &'a str, arguments: Option<&str>) -> Self {
        let mut arguments = arguments
            .unwrap_or("")
            .split(',')
            .map(url_decode)
            .collect::<Vec<_>>();
        while arguments.last().map_or(false, String::is_empty) {
            arguments.pop();
        }

        Self { name, arguments }
    }

    /// The typed form of this command, or `None` if its name is unknown or
    /// its arguments do not have the shape the name requires.
    pub fn convert(&self) -> Option<PendingCommand> {
        let a = &self.arguments;
        let command = match self.name.strip_prefix(LEGACY_PREFIX)? {
            "moveOrCopy" if 4 == a.len() => {
                PendingCommand::MoveOrCopy(MoveOrCopy {
                    src_folder: a[0].clone(),
                    dest_folder: a[2].clone(),
                    is_copy: parse_bool(&a[3]),
                    uids: Some(vec![a[1].clone()]),
                    new_uid_map: None,
                })
            }

            "moveOrCopyBulk" if a.len() >= 3 => {
                PendingCommand::MoveOrCopy(MoveOrCopy {
                    src_folder: a[0].clone(),
                    dest_folder: a[1].clone(),
                    is_copy: parse_bool(&a[2]),
                    uids: Some(a[3..].to_vec()),
                    new_uid_map: None,
                })
            }

            "moveOrCopyBulkNew" if a.len() >= 4 => {
                let rest = &a[4..];
                let (uids, new_uid_map) = if parse_bool(&a[3]) {
                    if 0 != rest.len() % 2 {
                        return None;
                    }
                    let (old, new) = rest.split_at(rest.len() / 2);
                    let map = old.iter().cloned().zip(new.iter().cloned());
                    (None, Some(map.collect()))
                } else {
                    (Some(rest.to_vec()), None)
                };

                PendingCommand::MoveOrCopy(MoveOrCopy {
                    src_folder: a[0].clone(),
                    dest_folder: a[1].clone(),
                    is_copy: parse_bool(&a[2]),
                    uids,
                    new_uid_map,
                })
            }

            "setFlagBulk" if a.len() >= 3 => PendingCommand::SetFlag(SetFlag {
                folder: a[0].clone(),
                new_state: parse_bool(&a[1]),
                flag: Flag::from_str(&a[2]).ok()?,
                uids: a[3..].to_vec(),
            }),

            "setFlag" if 4 == a.len() => PendingCommand::SetFlag(SetFlag {
                folder: a[0].clone(),
                new_state: parse_bool(&a[2]),
                flag: Flag::from_str(&a[3]).ok()?,
                uids: vec![a[1].clone()],
            }),

            "append" if 2 == a.len() => PendingCommand::Append(Append {
                folder: a[0].clone(),
                uid: a[1].clone(),
            }),

            "markAllAsRead" if 1 == a.len() => {
                PendingCommand::MarkAllAsRead(InFolder {
                    folder: a[0].clone(),
                })
            }

            "expunge" if 1 == a.len() => PendingCommand::Expunge(InFolder {
                folder: a[0].clone(),
            }),

            "emptyTrash" => PendingCommand::EmptyTrash(EmptyTrash {}),

            _ => return None,
        };

        Some(command)
    }
}

fn parse_bool(s: &str) -> bool {
    s.eq_ignore_ascii_case("true")
}

/// Decode `application/x-www-form-urlencoded` text. Malformed escapes are
/// kept literally.
fn url_decode(s: &str) -> String {
    fn hex(b: u8) -> Option<u8> {
        (b as char).to_digit(16).map(|d| d as u8)
    }

    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' if i + 2 < bytes.len() => {
                match (hex(bytes[i + 1]), hex(bytes[i + 2])) {
                    (Some(hi), Some(lo)) => {
                        out.push(hi << 4 | lo);
                        i += 2;
                    }
                    _ => out.push(b'%'),
                }
            }
            b => out.push(b),
        }
        i += 1;
    }

    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod test {
    use super::*;

    const SOURCE: &str = "source_folder";
    const DEST: &str = "dest_folder";

    fn legacy(name: &str, arguments: &[&str]) -> Option<PendingCommand> {
        let name = format!("{}{}", LEGACY_PREFIX, name);
        let joined = arguments.join(",");
        LegacyCommand::parse(&name, Some(joined.as_str())).convert()
    }

    fn uids(uids: &[&str]) -> Vec<String> {
        uids.iter().map(|&u| u.to_owned()).collect()
    }

    #[test]
    fn move_or_copy_with_uid_list() {
        assert_eq!(
            Some(PendingCommand::MoveOrCopy(MoveOrCopy {
                src_folder: SOURCE.to_owned(),
                dest_folder: DEST.to_owned(),
                is_copy: true,
                uids: Some(uids(&["uid_1", "uid_2"])),
                new_uid_map: None,
            })),
            legacy(
                "moveOrCopyBulkNew",
                &[SOURCE, DEST, "true", "false", "uid_1", "uid_2"]
            )
        );
    }

    #[test]
    fn move_or_copy_with_uid_map() {
        let mut map = BTreeMap::new();
        map.insert("uid_1".to_owned(), "uid_other_1".to_owned());
        map.insert("uid_2".to_owned(), "uid_other_2".to_owned());

        let command = legacy(
            "moveOrCopyBulkNew",
            &[
                SOURCE,
                DEST,
                "true",
                "true",
                "uid_1",
                "uid_2",
                "uid_other_1",
                "uid_other_2",
            ],
        )
        .unwrap();
        assert_eq!(
            PendingCommand::MoveOrCopy(MoveOrCopy {
                src_folder: SOURCE.to_owned(),
                dest_folder: DEST.to_owned(),
                is_copy: true,
                uids: None,
                new_uid_map: Some(map),
            }),
            command
        );
        assert_eq!(
            "{\"srcFolder\":\"source_folder\",\"destFolder\":\"dest_folder\",\
             \"isCopy\":true,\"newUidMap\":{\"uid_1\":\"uid_other_1\",\
             \"uid_2\":\"uid_other_2\"}}",
            command.data().unwrap()
        );

        assert_eq!(
            None,
            legacy(
                "moveOrCopyBulkNew",
                &[SOURCE, DEST, "true", "true", "uid_1", "uid_2", "x"]
            )
        );
    }

    #[test]
    fn move_or_copy_older_formats() {
        let expected = |u: &[&str]| {
            Some(PendingCommand::MoveOrCopy(MoveOrCopy {
                src_folder: SOURCE.to_owned(),
                dest_folder: DEST.to_owned(),
                is_copy: true,
                uids: Some(uids(u)),
                new_uid_map: None,
            }))
        };

        assert_eq!(
            expected(&["uid_1", "uid_2"]),
            legacy("moveOrCopyBulk", &[SOURCE, DEST, "true", "uid_1", "uid_2"])
        );
        assert_eq!(
            expected(&["uid"]),
            legacy("moveOrCopy", &[SOURCE, "uid", DEST, "true"])
        );
    }

    #[test]
    fn set_flag_formats() {
        let bulk = legacy(
            "setFlagBulk",
            &[SOURCE, "true", "X_DESTROYED", "uid_1", "uid_2"],
        )
        .unwrap();
        assert_eq!(
            PendingCommand::SetFlag(SetFlag {
                folder: SOURCE.to_owned(),
                new_state: true,
                flag: Flag::XDestroyed,
                uids: uids(&["uid_1", "uid_2"]),
            }),
            bulk
        );
        assert_eq!("set_flag", bulk.name());
        assert_eq!(
            "{\"folder\":\"source_folder\",\"newState\":true,\
             \"flag\":\"X_DESTROYED\",\"uids\":[\"uid_1\",\"uid_2\"]}",
            bulk.data().unwrap()
        );

        assert_eq!(
            Some(PendingCommand::SetFlag(SetFlag {
                folder: SOURCE.to_owned(),
                new_state: true,
                flag: Flag::XDestroyed,
                uids: uids(&["uid"]),
            })),
            legacy("setFlag", &[SOURCE, "uid", "true", "X_DESTROYED"])
        );

        assert_eq!(
            None,
            legacy("setFlag", &[SOURCE, "uid", "true", "NOT_A_FLAG"])
        );
    }

    #[test]
    fn folder_commands() {
        assert_eq!(
            Some(PendingCommand::Expunge(InFolder {
                folder: SOURCE.to_owned()
            })),
            legacy("expunge", &[SOURCE])
        );
        assert_eq!(
            Some(PendingCommand::MarkAllAsRead(InFolder {
                folder: SOURCE.to_owned()
            })),
            legacy("markAllAsRead", &[SOURCE])
        );
        assert_eq!(
            Some(PendingCommand::Append(Append {
                folder: SOURCE.to_owned(),
                uid: "uid".to_owned(),
            })),
            legacy("append", &[SOURCE, "uid"])
        );

        let empty_trash = legacy("emptyTrash", &[]).unwrap();
        assert_eq!(PendingCommand::EmptyTrash(EmptyTrash {}), empty_trash);
        assert_eq!("empty_trash", empty_trash.name());
        assert_eq!("{}", empty_trash.data().unwrap());

        assert_eq!(None, legacy("expunge", &[]));
        assert_eq!(None, legacy("sendMessages", &[SOURCE]));
    }

    #[test]
    fn arguments_are_url_decoded() {
        let command = LegacyCommand::parse(
            "com.fsck.k9.MessagingController.expunge",
            Some("Sent+Items%2C%20%E2%9C%93,,"),
        );
        assert_eq!(vec!["Sent Items, \u{2713}".to_owned()], command.arguments);
        assert_eq!("100%", url_decode("100%"));
        assert_eq!("%zz", url_decode("%zz"));
    }
}
