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

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use structopt::StructOpt;

use crate::support::sysexits::*;
use crate::support::system_config::SystemConfig;

#[derive(StructOpt)]
#[structopt(max_term_width = 80)]
enum Command {
    /// Bring account stores up to date.
    ///
    /// Each account is upgraded in a single transaction. If anything goes
    /// wrong, that account's store and attachment files are left exactly as
    /// they were, the failure is logged, and the command exits with
    /// EX_TEMPFAIL once every account has been attempted. Running the command
    /// again retries from scratch.
    Upgrade(UpgradeSubcommand),
    /// Show the version of account stores and what an upgrade would do.
    Status(StatusSubcommand),
}

#[derive(StructOpt)]
pub(super) struct CommonOptions {
    /// The directory containing `mailstore.toml` etc
    /// [default: /etc/mailstore or /usr/local/etc/mailstore]
    #[structopt(long, parse(from_os_str))]
    pub(super) root: Option<PathBuf>,

    /// The UUIDs of the accounts to operate on.
    #[structopt(required = true, min_values = 1)]
    pub(super) accounts: Vec<String>,
}

#[derive(StructOpt)]
pub(super) struct UpgradeSubcommand {
    #[structopt(flatten)]
    pub(super) common: CommonOptions,

    /// Stop at this version instead of the latest one. It must be a version
    /// some upgrade step ends at.
    #[structopt(long)]
    pub(super) target: Option<u32>,
}

#[derive(StructOpt)]
pub(super) struct StatusSubcommand {
    #[structopt(flatten)]
    pub(super) common: CommonOptions,
}

/// Everything loaded from the root directory.
pub(super) struct Installation {
    pub(super) root: PathBuf,
    pub(super) config: SystemConfig,
}

impl Installation {
    pub(super) fn preferences_path(&self) -> PathBuf {
        self.root.join("preferences.toml")
    }
}

pub fn main() {
    // Clap exits with status 1 instead of EX_USAGE if we use the more concise
    // API
    let cmd = Command::from_clap(&match Command::clap().get_matches_safe() {
        Ok(matches) => matches,
        Err(
            e @ clap::Error {
                kind: clap::ErrorKind::HelpDisplayed,
                ..
            },
        )
        | Err(
            e @ clap::Error {
                kind: clap::ErrorKind::VersionDisplayed,
                ..
            },
        ) => {
            println!("{}", e.message);
            return;
        }
        Err(e) => {
            eprintln!("{}", e.message);
            EX_USAGE.exit()
        }
    });

    let status = match cmd {
        Command::Upgrade(cmd) => {
            let installation = load_installation(cmd.common.root.clone());
            init_logging(&installation.root);
            super::upgrade::upgrade(&installation, cmd)
        }
        Command::Status(cmd) => {
            let installation = load_installation(cmd.common.root.clone());
            init_logging(&installation.root);
            super::upgrade::status(&installation, cmd)
        }
    };

    status.exit()
}

fn load_installation(root: Option<PathBuf>) -> Installation {
    let root = root.unwrap_or_else(|| {
        if Path::new("/etc/mailstore/mailstore.toml").is_file() {
            "/etc/mailstore".to_owned().into()
        } else if Path::new("/usr/local/etc/mailstore/mailstore.toml").is_file()
        {
            "/usr/local/etc/mailstore".to_owned().into()
        } else {
            eprintln!(
                "Neither /etc/mailstore nor /usr/local/etc/mailstore looks\n\
                 like the mail store root; use --root=/path/to/mailstore if\n\
                 your installation is elsewhere."
            );
            EX_CONFIG.exit()
        }
    });

    let system_config_path = root.join("mailstore.toml");
    let mut system_config_toml = Vec::new();
    if let Err(e) = fs::File::open(&system_config_path)
        .and_then(|mut f| f.read_to_end(&mut system_config_toml))
    {
        eprintln!("Error reading '{}': {}", system_config_path.display(), e);
        EX_CONFIG.exit();
    }

    let config: SystemConfig = match toml::from_slice(&system_config_toml) {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "Error in config file at '{}': {}",
                system_config_path.display(),
                e
            );
            EX_CONFIG.exit()
        }
    };

    Installation { root, config }
}

fn init_logging(root: &Path) {
    if Ok(true) == nix::unistd::isatty(2) {
        // Running interactively; ignore logging configuration and just write
        // to stderr.
        crate::init_simple_log();
        return;
    }

    let log_config_file = root.join("logging.toml");
    if log_config_file.is_file() {
        if let Err(e) =
            log4rs::init_file(
                &log_config_file,
                log4rs::file::Deserializers::new(),
            )
        {
            eprintln!(
                "Failed to initialise logging from '{}': {}",
                log_config_file.display(),
                e
            );
            EX_CONFIG.exit();
        }
        return;
    }

    let formatter = syslog::Formatter3164 {
        facility: syslog::Facility::LOG_MAIL,
        hostname: None,
        process: env!("CARGO_PKG_NAME").to_owned(),
        pid: nix::unistd::getpid().as_raw(),
    };

    let result = syslog::unix(formatter)
        .map_err(|e| e.to_string())
        .and_then(|logger| {
            log::set_boxed_logger(Box::new(syslog::BasicLogger::new(logger)))
                .map_err(|e| e.to_string())
        });
    match result {
        Ok(()) => log::set_max_level(log::LevelFilter::Info),
        Err(e) => {
            eprintln!("Failed to connect to syslog: {}", e);
            EX_IOERR.exit();
        }
    }
}
