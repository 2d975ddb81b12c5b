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

use std::fmt;
use std::sync::{Arc, Mutex};

/// Tracks text that should be included in at the start of every log statement.
///
/// Clones of a `LogPrefix` share the same underlying data, so the migration
/// engine can update the current step while steps hold their own handle.
#[derive(Clone)]
pub struct LogPrefix {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Clone)]
struct Inner {
    operation: String,
    account: Option<String>,
    step: Option<(u32, u32)>,
}

impl LogPrefix {
    pub fn new(operation: String) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                operation,
                account: None,
                step: None,
            })),
        }
    }

    pub fn deep_clone(&self) -> Self {
        Self {
            inner: Arc::new(Mutex::new(self.lock().clone())),
        }
    }

    pub fn set_account(&self, account: String) {
        self.lock().account = Some(sanitise(account));
    }

    pub fn set_step(&self, step: Option<(u32, u32)>) {
        self.lock().step = step;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A panic while formatting cannot leave `Inner` half-updated.
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl fmt::Debug for LogPrefix {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "LogPrefix({})", self)
    }
}

impl fmt::Display for LogPrefix {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let inner = self.lock();
        write!(f, "{}", inner.operation)?;
        if inner.account.is_some() || inner.step.is_some() {
            write!(f, "[")?;
            if let Some(ref account) = inner.account {
                write!(f, "{}", account)?;
                if inner.step.is_some() {
                    write!(f, " ")?;
                }
            }
            if let Some((from, to)) = inner.step {
                write!(f, "{}->{}", from, to)?;
            }
            write!(f, "]")?;
        }

        Ok(())
    }
}

fn sanitise(mut s: String) -> String {
    s.retain(|c| !c.is_control());
    if let Some((truncate_len, _)) = s.char_indices().nth(64) {
        s.truncate(truncate_len);
    }

    s
}
