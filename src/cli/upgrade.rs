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

use log::{error, info};

use super::main::{Installation, StatusSubcommand, UpgradeSubcommand};
use crate::migration::{
    helper::{PreferenceStore, StandardHelper},
    MigrationReport, Migrations,
};
use crate::store::Store;
use crate::support::{error::Error, log_prefix::LogPrefix, sysexits::*};

fn migrations() -> Result<Migrations, Sysexit> {
    Migrations::standard().map_err(|e| {
        error!("Built-in migration table is unusable: {}", e);
        EX_SOFTWARE
    })
}

fn load_preferences(installation: &Installation) -> Result<PreferenceStore, Sysexit> {
    let path = installation.preferences_path();
    PreferenceStore::load(&path).map_err(|e| {
        error!("Unable to load '{}': {}", path.display(), e);
        EX_CONFIG
    })
}

pub(super) fn upgrade(
    installation: &Installation,
    cmd: UpgradeSubcommand,
) -> Sysexit {
    let migrations = match migrations() {
        Ok(m) => m,
        Err(exit) => return exit,
    };
    let mut preferences = match load_preferences(installation) {
        Ok(p) => p,
        Err(exit) => return exit,
    };

    let mut status = EX_OK;
    for uuid in &cmd.common.accounts {
        let log_prefix = LogPrefix::new("upgrade".to_owned());
        log_prefix.set_account(uuid.clone());

        // The step may change preferences before failing; those changes must
        // not outlive the rolled-back store.
        let snapshot = preferences.clone();
        match upgrade_account(
            installation,
            &migrations,
            uuid,
            preferences,
            &log_prefix,
            cmd.target,
        ) {
            Ok((report, updated)) => {
                preferences = updated;
                if report.applied.is_empty() {
                    info!(
                        "{} Already at version {}",
                        log_prefix, report.to
                    );
                }

                let path = installation.preferences_path();
                if let Err(e) = preferences.save(&path) {
                    error!(
                        "{} Upgraded, but failed to save '{}': {}",
                        log_prefix,
                        path.display(),
                        e
                    );
                    status = status.worst(EX_IOERR);
                }
            }

            Err(e) => {
                preferences = snapshot;
                error!("{} Not upgraded: {}", log_prefix, e);
                status = status.worst(match e {
                    Error::NxAccount(..) => EX_CONFIG,
                    Error::BadTargetVersion(..) => EX_USAGE,
                    _ => EX_TEMPFAIL,
                });
            }
        }
    }

    status
}

fn upgrade_account(
    installation: &Installation,
    migrations: &Migrations,
    uuid: &str,
    preferences: PreferenceStore,
    log_prefix: &LogPrefix,
    target: Option<u32>,
) -> Result<(MigrationReport, PreferenceStore), Error> {
    let config = &installation.config;
    let account = config.account(&installation.root, uuid)?;
    let mut store =
        Store::open(&config.database_path(&installation.root, uuid))?;

    let mut helper = StandardHelper::new(account, preferences);
    let report = store.upgrade(migrations, &mut helper, log_prefix, target)?;
    Ok((report, helper.into_preferences()))
}

pub(super) fn status(
    installation: &Installation,
    cmd: StatusSubcommand,
) -> Sysexit {
    let migrations = match migrations() {
        Ok(m) => m,
        Err(exit) => return exit,
    };

    let mut status = EX_OK;
    for uuid in &cmd.common.accounts {
        match account_status(installation, &migrations, uuid) {
            Ok(text) => print!("{}", text),
            Err(e) => {
                eprintln!("{}: {}", uuid, e);
                status = status.worst(match e {
                    Error::NxAccount(..) => EX_CONFIG,
                    Error::NxStore(..) => EX_NOINPUT,
                    _ => EX_IOERR,
                });
            }
        }
    }

    status
}

fn account_status(
    installation: &Installation,
    migrations: &Migrations,
    uuid: &str,
) -> Result<String, Error> {
    use std::fmt::Write as _;

    let config = &installation.config;
    config.account(&installation.root, uuid)?;
    let path = config.database_path(&installation.root, uuid);
    let store = Store::open_existing(&path)?;
    let version = store.version()?;

    let mut text = String::new();
    let _ = writeln!(
        text,
        "{}: version {} (latest {})",
        uuid,
        version,
        migrations.latest()
    );
    match migrations.pending(version, migrations.latest()) {
        Ok(steps) if steps.is_empty() => {
            let _ = writeln!(text, "  up to date");
        }
        Ok(steps) => {
            for step in steps {
                let _ = writeln!(
                    text,
                    "  pending {:>2} -> {:>2}  {}",
                    step.from, step.to, step.name
                );
            }
        }
        Err(e) => {
            let _ = writeln!(text, "  cannot upgrade: {}", e);
        }
    }
    Ok(text)
}
