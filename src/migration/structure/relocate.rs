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

//! Moving attachment payload files from the legacy layout, keyed by
//! attachment id, to the part layout, keyed by message part id.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use log::{debug, warn};
use regex::Regex;

use crate::store::types::{AttachmentId, MessagePartId};
use crate::support::log_prefix::LogPrefix;

lazy_static! {
    // content://<authority>/<account>/<attachment id>[/<variant>...]
    static ref LOCATOR: Regex =
        Regex::new(r"^content://[^/]+/[^/]+/([0-9]+)(?:/.*)?$").unwrap();
}

/// The attachment id a legacy content locator points at.
pub fn locator_attachment_id(locator: &str) -> Option<AttachmentId> {
    LOCATOR
        .captures(locator)
        .and_then(|c| c[1].parse().ok())
        .map(AttachmentId)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Relocation {
    /// The payload now lives at this path.
    Located(PathBuf),
    Missing,
}

/// Move the payload of legacy attachment `attachment_id` in `old_dir` to the
/// file for part `part_id` in `new_dir`.
///
/// Failure is never an error: the part is simply left without its payload,
/// which will be downloaded again.
pub fn relocate(
    old_dir: &Path,
    new_dir: &Path,
    attachment_id: AttachmentId,
    part_id: MessagePartId,
    log_prefix: &LogPrefix,
) -> Relocation {
    let src = old_dir.join(attachment_id.0.to_string());
    let dst = new_dir.join(part_id.0.to_string());

    match fs::rename(&src, &dst) {
        Ok(()) => Relocation::Located(dst),
        Err(e) if io::ErrorKind::NotFound == e.kind() => {
            debug!(
                "{} Attachment {} has no file to move",
                log_prefix, attachment_id.0
            );
            Relocation::Missing
        }
        Err(e) => {
            warn!(
                "{} Failed to move {} to {}: {}",
                log_prefix,
                src.display(),
                dst.display(),
                e
            );
            Relocation::Missing
        }
    }
}

/// The old and new attachment directories of one structural migration.
#[derive(Debug)]
pub struct AttachmentRelocator {
    old_dir: PathBuf,
    new_dir: PathBuf,
    log_prefix: LogPrefix,
}

impl AttachmentRelocator {
    pub fn new(old_dir: PathBuf, new_dir: PathBuf, log_prefix: LogPrefix) -> Self {
        Self {
            old_dir,
            new_dir,
            log_prefix,
        }
    }

    pub fn old_dir(&self) -> &Path {
        &self.old_dir
    }

    pub fn new_dir(&self) -> &Path {
        &self.new_dir
    }

    /// The legacy payload file of attachment `id`, if its locator names it
    /// and the file is actually there.
    pub fn source(
        &self,
        id: AttachmentId,
        locator: Option<&str>,
    ) -> Option<PathBuf> {
        if locator.and_then(locator_attachment_id) != Some(id) {
            return None;
        }

        let path = self.old_dir.join(id.0.to_string());
        if path.is_file() {
            Some(path)
        } else {
            None
        }
    }

    pub fn relocate(
        &self,
        id: AttachmentId,
        part_id: MessagePartId,
    ) -> Relocation {
        relocate(&self.old_dir, &self.new_dir, id, part_id, &self.log_prefix)
    }
}
