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

//! Filesystem side effects of migration steps, deferred or compensated so
//! they line up with the outcome of the store transaction.

use std::fs;
use std::io;
use std::path::PathBuf;

use log::{info, warn};

use crate::support::{
    file_ops::{self, IgnoreKinds},
    log_prefix::LogPrefix,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FsAction {
    Rename { from: PathBuf, to: PathBuf },
    /// Delete a directory's files and then the directory.
    Purge(PathBuf),
}

impl FsAction {
    pub fn perform(&self) -> io::Result<()> {
        match *self {
            FsAction::Rename { ref from, ref to } => fs::rename(from, to),
            FsAction::Purge(ref dir) => {
                file_ops::purge_dir(dir).map(|_| ()).ignore_not_found()
            }
        }
    }
}

/// Actions to run once the transaction commits, and the compensating actions
/// that undo what steps already did to the filesystem if it rolls back.
#[derive(Debug, Default)]
pub struct FsJournal {
    on_commit: Vec<FsAction>,
    undo: Vec<FsAction>,
}

impl FsJournal {
    pub fn after_commit(&mut self, action: FsAction) {
        self.on_commit.push(action);
    }

    /// Record how to reverse something that has just been done. Undo actions
    /// run in the reverse of the order they were recorded.
    pub fn undo_with(&mut self, action: FsAction) {
        self.undo.push(action);
    }

    pub fn undo_all_with(&mut self, actions: impl IntoIterator<Item = FsAction>) {
        self.undo.extend(actions);
    }

    pub fn commit(self, log_prefix: &LogPrefix) {
        for action in self.on_commit {
            match action.perform() {
                Ok(()) => info!("{} Finished {:?}", log_prefix, action),
                Err(e) => warn!("{} {:?} failed: {}", log_prefix, action, e),
            }
        }
    }

    pub fn roll_back(self, log_prefix: &LogPrefix) {
        for action in self.undo.into_iter().rev() {
            if let Err(e) = action.perform() {
                warn!(
                    "{} Could not undo with {:?}: {}",
                    log_prefix, action, e
                );
            }
        }
    }
}
