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

//! The versioned schema migration engine.
//!
//! A store records the schema version it was last brought to. Opening it with
//! a newer build runs, inside one exclusive transaction, every step between
//! that version and the target, then records the target. Any failure rolls
//! the whole sequence back, including the filesystem effects steps registered
//! in the `FsJournal`, so the next attempt starts from the same place.

use chrono::prelude::*;
use log::{error, info};

pub mod helper;
mod journal;
mod legacy_steps;
mod part_steps;
mod pending_commands;
pub mod structure;

pub use self::journal::{FsAction, FsJournal};

use self::helper::MigrationsHelper;
use crate::store::{probe, types::*};
use crate::support::{error::Error, log_prefix::LogPrefix};

/// The schema version this build brings stores to.
pub const LATEST_VERSION: u32 = 62;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepKind {
    /// Only DDL. Re-applying the step must be harmless.
    Schema,
    /// Only bulk updates to existing rows.
    Data,
    /// DDL plus a backfill of what it added.
    SchemaAndData,
    /// Rewrites the shape of the stored messages.
    Structural,
    /// Claims a version number without changing the store.
    Reserved,
}

/// What a step gets to work with.
pub struct StepContext<'a> {
    pub cxn: &'a rusqlite::Connection,
    pub helper: &'a mut dyn MigrationsHelper,
    pub fs: &'a mut FsJournal,
    pub log_prefix: &'a LogPrefix,
}

pub type StepFn = fn(&mut StepContext<'_>) -> Result<(), Error>;

/// One entry of the migration table, upgrading a store at any version in
/// `from..to` to `to`.
#[derive(Clone, Copy)]
pub struct Step {
    pub from: u32,
    pub to: u32,
    pub name: &'static str,
    pub kind: StepKind,
    pub apply: StepFn,
}

impl Step {
    pub fn new(
        from: u32,
        to: u32,
        name: &'static str,
        kind: StepKind,
        apply: StepFn,
    ) -> Self {
        Self {
            from,
            to,
            name,
            kind,
            apply,
        }
    }
}

impl std::fmt::Debug for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}->{} {} ({:?})", self.from, self.to, self.name, self.kind)
    }
}

/// The ordered steps which carry a store from the oldest supported version to
/// the latest one.
pub fn standard_steps() -> Vec<Step> {
    use self::legacy_steps::*;
    use self::part_steps::*;
    use self::StepKind::*;

    vec![
        Step::new(0, 29, "create baseline schema", Schema, create_baseline),
        Step::new(29, 30, "add messages.deleted", Schema, add_deleted),
        Step::new(30, 31, "index by deleted and date", Schema, index_deleted_date),
        Step::new(31, 32, "mark deleted messages", Data, mark_deleted),
        Step::new(32, 33, "add messages.preview", Schema, add_preview),
        Step::new(33, 34, "add folders.flagged_count", Schema, add_flagged_count),
        Step::new(34, 35, "retire X_NO_SEEN_INFO", Data, retire_no_seen_info),
        Step::new(35, 36, "add attachments.content_id", Schema, add_content_id),
        Step::new(
            36,
            37,
            "add attachments.content_disposition",
            Schema,
            add_content_disposition,
        ),
        Step::new(37, 38, "prune attachment cache", Reserved, reserved),
        Step::new(38, 39, "purge orphaned headers", Data, purge_orphan_headers),
        Step::new(39, 40, "add messages.mime_type", Schema, add_mime_type),
        Step::new(
            40,
            41,
            "classify folders from preferences",
            SchemaAndData,
            classify_folders,
        ),
        Step::new(
            41,
            42,
            "save folder classes to preferences",
            Data,
            save_folder_classes,
        ),
        Step::new(42, 43, "rename internal outbox", Data, rename_outbox),
        Step::new(43, 44, "add threading columns", Schema, add_thread_columns),
        Step::new(44, 45, "index threading columns", Schema, index_thread_columns),
        Step::new(45, 46, "split out flag columns", SchemaAndData, split_flags),
        Step::new(46, 47, "create threads table", SchemaAndData, create_threads),
        Step::new(47, 48, "default thread roots", SchemaAndData, thread_root_trigger),
        Step::new(48, 49, "add composite message index", Schema, composite_index),
        Step::new(49, 50, "add folders.notify_class", SchemaAndData, add_notify_class),
        Step::new(
            50,
            51,
            "reconstruct MIME structure",
            Structural,
            structure::migrate_to_message_parts,
        ),
        Step::new(51, 52, "add folders.more_messages", Schema, add_more_messages),
        Step::new(52, 53, "clear null empty flags", Data, clear_null_empty),
        Step::new(53, 54, "add messages.preview_type", SchemaAndData, add_preview_type),
        Step::new(54, 55, "create fulltext index", SchemaAndData, create_fulltext),
        Step::new(55, 56, "prune fulltext index", Data, prune_fulltext),
        Step::new(
            56,
            57,
            "mark multipart data locations",
            Data,
            mark_multipart_locations,
        ),
        Step::new(
            57,
            58,
            "purge orphaned parts and cascade deletes",
            SchemaAndData,
            cascade_message_deletes,
        ),
        Step::new(58, 59, "add missing indexes", Schema, add_missing_indexes),
        Step::new(
            59,
            60,
            "reshape pending commands",
            SchemaAndData,
            reshape_pending_commands,
        ),
        Step::new(60, 61, "remove errors folder", Data, remove_errors_folder),
        Step::new(61, 62, "add folder remote ids", SchemaAndData, add_remote_ids),
    ]
}

/// The outcome of a successful run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MigrationReport {
    pub from: u32,
    pub to: u32,
    pub applied: Vec<&'static str>,
}

/// A validated migration table.
#[derive(Debug)]
pub struct Migrations {
    steps: Vec<Step>,
}

impl Migrations {
    /// Build a migration table, checking that the steps are non-empty, each
    /// moves forward, and together they form one unbroken chain.
    pub fn new(steps: Vec<Step>) -> Result<Self, Error> {
        if steps.is_empty() {
            return Err(Error::BadMigrationTable("no steps".to_owned()));
        }

        for step in &steps {
            if step.from >= step.to {
                return Err(Error::BadMigrationTable(format!(
                    "step {:?} does not advance",
                    step
                )));
            }
        }

        for pair in steps.windows(2) {
            if pair[0].to != pair[1].from {
                return Err(Error::BadMigrationTable(format!(
                    "{:?} is followed by {:?}",
                    pair[0], pair[1]
                )));
            }
        }

        Ok(Self { steps })
    }

    pub fn standard() -> Result<Self, Error> {
        Self::new(standard_steps())
    }

    pub fn oldest(&self) -> u32 {
        self.steps[0].from
    }

    pub fn latest(&self) -> u32 {
        self.steps[self.steps.len() - 1].to
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// The steps needed to take a store at `current` to `target`.
    pub fn pending(&self, current: u32, target: u32) -> Result<&[Step], Error> {
        let latest = self.latest();
        if current > latest {
            return Err(Error::StoreTooNew {
                found: current,
                supported: latest,
            });
        }

        if current == target {
            return Ok(&[]);
        }

        if current > target {
            return Err(Error::StoreTooNew {
                found: current,
                supported: target,
            });
        }

        let end = self
            .steps
            .iter()
            .position(|s| s.to == target)
            .ok_or(Error::BadTargetVersion(target))?;

        if current < self.oldest() {
            return Err(Error::UnsupportedVersion(current));
        }

        let start = self
            .steps
            .iter()
            .position(|s| s.from <= current && current < s.to)
            .ok_or(Error::UnsupportedVersion(current))?;

        Ok(&self.steps[start..=end])
    }

    /// Bring the store to the latest version.
    pub fn run(
        &self,
        cxn: &mut rusqlite::Connection,
        helper: &mut dyn MigrationsHelper,
        log_prefix: &LogPrefix,
    ) -> Result<MigrationReport, Error> {
        self.run_to(cxn, helper, log_prefix, self.latest())
    }

    /// Bring the store to `target`, which must be the end of some step.
    pub fn run_to(
        &self,
        cxn: &mut rusqlite::Connection,
        helper: &mut dyn MigrationsHelper,
        log_prefix: &LogPrefix,
        target: u32,
    ) -> Result<MigrationReport, Error> {
        let txn = cxn.transaction_with_behavior(
            rusqlite::TransactionBehavior::Exclusive,
        )?;
        let current = stored_version(&txn)?;
        let pending = self.pending(current, target)?;
        if pending.is_empty() {
            return Ok(MigrationReport {
                from: current,
                to: current,
                applied: Vec::new(),
            });
        }

        info!(
            "{} Upgrading store from version {} to {}",
            log_prefix, current, target
        );

        let mut journal = FsJournal::default();
        let result =
            apply_steps(&txn, pending, helper, &mut journal, log_prefix);
        log_prefix.set_step(None);
        let result = match result {
            Ok(()) => record_version(&txn, pending)
                .and_then(|()| txn.commit().map_err(Error::from)),
            Err(e) => {
                let _ = txn.rollback();
                Err(e)
            }
        };

        match result {
            Ok(()) => {
                journal.commit(log_prefix);
                info!("{} Store is now at version {}", log_prefix, target);
                Ok(MigrationReport {
                    from: current,
                    to: target,
                    applied: pending.iter().map(|s| s.name).collect(),
                })
            }
            Err(e) => {
                error!(
                    "{} Upgrade from version {} failed, store left \
                     unchanged: {}",
                    log_prefix, current, e
                );
                journal.roll_back(log_prefix);
                Err(e)
            }
        }
    }
}

fn apply_steps(
    cxn: &rusqlite::Connection,
    steps: &[Step],
    helper: &mut dyn MigrationsHelper,
    journal: &mut FsJournal,
    log_prefix: &LogPrefix,
) -> Result<(), Error> {
    for step in steps {
        log_prefix.set_step(Some((step.from, step.to)));
        info!("{} Applying: {}", log_prefix, step.name);
        let mut ctx = StepContext {
            cxn,
            helper: &mut *helper,
            fs: &mut *journal,
            log_prefix,
        };
        (step.apply)(&mut ctx)?;
    }

    Ok(())
}

fn record_version(
    cxn: &rusqlite::Connection,
    steps: &[Step],
) -> Result<(), Error> {
    cxn.execute(
        "CREATE TABLE IF NOT EXISTS `migration` (\
         `version` INTEGER NOT NULL PRIMARY KEY, \
         `applied_at` INTEGER NOT NULL)",
        (),
    )?;

    let now = Utc::now().timestamp();
    let mut target = 0;
    for step in steps {
        cxn.execute(
            "INSERT OR REPLACE INTO `migration` (`version`, `applied_at`) \
             VALUES (?, ?)",
            (step.to, now),
        )?;
        target = step.to;
    }

    cxn.pragma_update(None, "user_version", target)?;
    Ok(())
}

/// The schema version recorded in the store.
///
/// Stores written before the `migration` table existed only carry the SQLite
/// user version.
pub fn stored_version(cxn: &rusqlite::Connection) -> Result<u32, Error> {
    let user_version =
        cxn.pragma_query_value(None, "user_version", from_single::<u32>)?;
    let recorded = if probe::table_exists(cxn, "migration")? {
        cxn.query_row(
            "SELECT MAX(`version`) FROM `migration`",
            (),
            from_single::<Option<u32>>,
        )?
        .unwrap_or(0)
    } else {
        0
    };

    Ok(user_version.max(recorded))
}
