//! Registry Entry
//!
//! A `Section` is the registry's record for one key: the backing path, the
//! open `FileStack` (if any) and the last-access time. All stack I/O and all
//! eviction decisions for a key run under the section's own mutex, so a
//! handle can never be closed underneath an in-flight operation, while
//! operations on different keys proceed in parallel.

use super::file_stack::FileStack;
use super::types::SectionInfo;
use crate::error::{Result, StackError};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Shared reference to a registry entry, handed out by `find`/`get`.
pub type StackHandle = Arc<Section>;

/// A message read from a stack together with the depth observed before the read.
pub type RawEntry = (Vec<u8>, Vec<u8>, usize);

enum HandleState {
    /// The backing file is open.
    Open(FileStack),
    /// Evicted by the sweep; reopened on next use.
    Idle,
    /// Removed from the registry or the registry was closed.
    Released,
}

struct Slot {
    state: HandleState,
    depth: usize,
    last_access: DateTime<Utc>,
}

pub struct Section {
    key: String,
    path: PathBuf,
    slot: Mutex<Slot>,
}

impl Section {
    /// Opens (creating if needed) the stack file for `key`.
    pub(crate) fn open(key: &str, path: PathBuf) -> Result<Self> {
        let stack = FileStack::open(&path)?;
        let depth = stack.depth();

        Ok(Self {
            key: key.to_string(),
            path,
            slot: Mutex::new(Slot {
                state: HandleState::Open(stack),
                depth,
                last_access: Utc::now(),
            }),
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Runs `op` against the open stack, reopening it first if it was evicted.
    ///
    /// The section lock is held for the whole call. On success the cached
    /// depth and the last-access time are refreshed.
    pub fn with_stack<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&mut FileStack) -> Result<T>,
    {
        let mut guard = self.slot.lock();
        let slot = &mut *guard;

        if matches!(slot.state, HandleState::Idle) {
            let stack = FileStack::open(&self.path)?;
            tracing::debug!("Reopened stack {} at depth {}", self.key, stack.depth());
            slot.state = HandleState::Open(stack);
        }

        // Idle was turned into Open above, so only Released lands here.
        let HandleState::Open(stack) = &mut slot.state else {
            return Err(StackError::Closed);
        };

        let value = op(stack)?;
        slot.depth = stack.depth();
        slot.last_access = Utc::now();
        Ok(value)
    }

    /// Pushes one entry and returns the depth before the push.
    pub fn push(&self, header: &[u8], body: &[u8]) -> Result<usize> {
        self.with_stack(|stack| stack.push(header, body))
    }

    /// Reads the top entry. `None` when the stack is empty.
    pub fn peek(&self) -> Result<Option<RawEntry>> {
        self.with_stack(|stack| {
            let depth = stack.depth();
            Ok(stack.peek()?.map(|(header, body)| (header, body, depth)))
        })
    }

    /// Removes the top entry. `None` when the stack is empty.
    pub fn pop(&self) -> Result<Option<RawEntry>> {
        self.with_stack(|stack| {
            let depth = stack.depth();
            Ok(stack.pop()?.map(|(header, body)| (header, body, depth)))
        })
    }

    /// Depth as of the last completed operation. Does not reopen an evicted stack.
    pub fn depth(&self) -> usize {
        self.slot.lock().depth
    }

    pub fn last_access(&self) -> DateTime<Utc> {
        self.slot.lock().last_access
    }

    /// True while the backing file descriptor is held.
    pub fn is_open(&self) -> bool {
        matches!(self.slot.lock().state, HandleState::Open(_))
    }

    pub fn is_released(&self) -> bool {
        matches!(self.slot.lock().state, HandleState::Released)
    }

    pub fn info(&self) -> SectionInfo {
        let slot = self.slot.lock();
        SectionInfo {
            name: self.key.clone(),
            depth: slot.depth,
            last_access: slot.last_access,
        }
    }

    /// Closes the file if the section has been idle longer than `keep_alive`.
    ///
    /// Never waits: a section whose lock is held is in use and therefore not idle.
    pub(crate) fn evict_if_idle(&self, now: DateTime<Utc>, keep_alive: Duration) -> bool {
        let Some(mut slot) = self.slot.try_lock() else {
            return false;
        };

        if !matches!(slot.state, HandleState::Open(_)) {
            return false;
        }

        let idle = match (now - slot.last_access).to_std() {
            Ok(idle) => idle,
            Err(_) => return false,
        };
        if idle <= keep_alive {
            return false;
        }

        if let HandleState::Open(stack) = std::mem::replace(&mut slot.state, HandleState::Idle) {
            if let Err(e) = stack.sync() {
                tracing::warn!("Failed to sync evicted stack {}: {}", self.key, e);
            }
        }
        tracing::debug!("Evicted stack {} after {:?} idle", self.key, idle);
        true
    }

    /// Closes the file for good. Waits for any in-flight operation.
    pub(crate) fn release(&self) -> Result<()> {
        let mut slot = self.slot.lock();
        match std::mem::replace(&mut slot.state, HandleState::Released) {
            HandleState::Open(stack) => stack.sync(),
            HandleState::Idle | HandleState::Released => Ok(()),
        }
    }
}
