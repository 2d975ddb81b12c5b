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

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::migration::helper::Account;
use crate::support::error::Error;

/// The configuration of a mail store installation.
///
/// This is stored in a file named `mailstore.toml` under the root directory,
/// which is typically `/usr/local/etc/mailstore` or `/etc/mailstore`.
#[derive(Clone, Debug, Deserialize, Serialize, Default)]
pub struct SystemConfig {
    /// Where databases and attachment files live.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Per-account settings, keyed by account UUID.
    #[serde(default)]
    pub accounts: BTreeMap<String, AccountConfig>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding one `<uuid>.db` per account. Relative paths are
    /// resolved against the root.
    pub database_dir: PathBuf,
    /// Directory holding one `<uuid>.db_att` attachment directory per
    /// account. Relative paths are resolved against the root.
    pub attachment_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_dir: "databases".into(),
            attachment_dir: "attachments".into(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct AccountConfig {
    /// The server-side name of the inbox.
    pub inbox_folder: String,
    /// The folder which receives messages rescued from a localized outbox.
    pub drafts_folder: String,
    /// The name under which older clients created their outbox, if it was
    /// localized rather than the fixed `OUTBOX`.
    pub localized_outbox_folder: Option<String>,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            inbox_folder: "INBOX".to_owned(),
            drafts_folder: "Drafts".to_owned(),
            localized_outbox_folder: None,
        }
    }
}

impl SystemConfig {
    pub fn database_path(&self, root: &Path, uuid: &str) -> PathBuf {
        root.join(&self.storage.database_dir)
            .join(format!("{}.db", uuid))
    }

    pub fn attachment_path(&self, root: &Path, uuid: &str) -> PathBuf {
        root.join(&self.storage.attachment_dir)
            .join(format!("{}.db_att", uuid))
    }

    /// Build the account description the migration steps consume.
    pub fn account(&self, root: &Path, uuid: &str) -> Result<Account, Error> {
        let config = self
            .accounts
            .get(uuid)
            .ok_or_else(|| Error::NxAccount(uuid.to_owned()))?;

        Ok(Account {
            uuid: uuid.to_owned(),
            inbox_folder: config.inbox_folder.clone(),
            drafts_folder: config.drafts_folder.clone(),
            localized_outbox_folder: config.localized_outbox_folder.clone(),
            attachment_dir: self.attachment_path(root, uuid),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_minimal_and_full() {
        let config: SystemConfig = toml::from_str(
            "[accounts.abc]\n\
             inbox_folder = \"Inbox\"\n",
        )
        .unwrap();
        let account = config.account(Path::new("/srv"), "abc").unwrap();
        assert_eq!("Inbox", account.inbox_folder);
        assert_eq!("Drafts", account.drafts_folder);
        assert_eq!(None, account.localized_outbox_folder);
        assert_eq!(
            PathBuf::from("/srv/attachments/abc.db_att"),
            account.attachment_dir
        );
        assert_eq!(
            PathBuf::from("/srv/databases/abc.db"),
            config.database_path(Path::new("/srv"), "abc")
        );

        let config: SystemConfig = toml::from_str(
            "[storage]\n\
             database_dir = \"/var/db\"\n\
             [accounts.xyz]\n\
             localized_outbox_folder = \"Postausgang\"\n",
        )
        .unwrap();
        assert_eq!(
            PathBuf::from("/var/db/xyz.db"),
            config.database_path(Path::new("/srv"), "xyz")
        );
        assert_eq!(
            Some("Postausgang".to_owned()),
            config
                .account(Path::new("/srv"), "xyz")
                .unwrap()
                .localized_outbox_folder
        );
        assert_matches!(
            Err(Error::NxAccount(_)),
            config.account(Path::new("/srv"), "abc")
        );
    }
}
