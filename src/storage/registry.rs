//! Stack Registry
//!
//! Maps section keys to stack handles rooted in one flat directory. Handles
//! are opened lazily on first reference (or eagerly by [`StackRegistry::scan`]),
//! closed by a background sweep once idle for longer than the keep-alive, and
//! reopened transparently on the next access.
//!
//! ## Locking
//! - The entry set is a `DashMap`. Lookups take a shard read lock; a miss
//!   retries through the shard's `entry` API, so exactly one caller opens the
//!   file for a new key and every other caller gets that same handle.
//! - Each entry guards its open file with its own mutex (see `Section`). The
//!   sweep only `try_lock`s, so a handle in use is never evicted.

use super::codec;
use super::section::{Section, StackHandle};
use super::types::{ScanReport, SkippedFile};
use crate::error::{Result, StackError};

use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;

const MIN_SWEEP_PERIOD: Duration = Duration::from_millis(1);

pub struct StackRegistry {
    root: PathBuf,
    keep_alive: Duration,
    sections: DashMap<String, StackHandle>,
    closed: AtomicBool,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl StackRegistry {
    /// Creates the root directory if needed and starts the idle sweep.
    ///
    /// Must be called from within a tokio runtime. The registry starts empty;
    /// call [`scan`](Self::scan) to recover stacks left by a previous process.
    pub fn open(root: impl Into<PathBuf>, keep_alive: Duration) -> Result<Arc<Self>> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| StackError::Io(io::Error::new(io::ErrorKind::Other, e)))?;

        let registry = Arc::new(Self {
            root,
            keep_alive,
            sections: DashMap::new(),
            closed: AtomicBool::new(false),
            sweeper: Mutex::new(None),
        });

        let sweeper = registry.spawn_sweeper(&runtime);
        *registry.sweeper.lock() = Some(sweeper);

        tracing::info!(
            "Stack registry opened at {} (keep-alive {:?})",
            registry.root.display(),
            keep_alive
        );

        Ok(registry)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn keep_alive(&self) -> Duration {
        self.keep_alive
    }

    /// Looks up the handle for `key`.
    ///
    /// Returns `Ok(None)` when the key is unknown, `create` is false and no
    /// backing file exists. Otherwise the stack is opened (creating the file
    /// if absent) and registered.
    pub fn find(&self, key: &str, create: bool) -> Result<Option<StackHandle>> {
        self.ensure_open()?;

        if let Some(section) = self.sections.get(key) {
            return Ok(Some(section.value().clone()));
        }

        let path = self.path_for(key)?;
        if !create && !path.is_file() {
            return Ok(None);
        }

        match self.sections.entry(key.to_string()) {
            Entry::Occupied(entry) => Ok(Some(entry.get().clone())),
            Entry::Vacant(entry) => {
                let section = self.open_section(key, path)?;
                tracing::info!("New stack allocated at {}", section.path().display());
                entry.insert(section.clone());
                Ok(Some(section))
            }
        }
    }

    /// Find-or-create. Never yields "not found"; failures are returned as errors.
    pub fn get(&self, key: &str) -> Result<StackHandle> {
        self.find(key, true)?
            .ok_or_else(|| StackError::NotFound(key.to_string()))
    }

    /// Closes the handle for `key` and deletes its file. Unknown keys are a no-op.
    pub fn remove(&self, key: &str) -> Result<()> {
        self.ensure_open()?;

        let Entry::Occupied(entry) = self.sections.entry(key.to_string()) else {
            return Ok(());
        };

        // The shard stays locked until the file is gone, so a concurrent
        // `find` cannot open a fresh handle on the file being deleted.
        let section = entry.get().clone();
        let released = section.release();
        let deleted = remove_stack_file(section.path());
        entry.remove();

        tracing::info!("Removed stack {}", key);
        released.and(deleted)
    }

    /// Removes every known stack. All entries are attempted; the first error is returned.
    pub fn clean(&self) -> Result<()> {
        self.ensure_open()?;

        let keys: Vec<String> = self
            .sections
            .iter()
            .map(|entry| entry.key().clone())
            .collect();

        let mut first_error = None;
        for key in keys {
            if let Err(e) = self.remove(&key) {
                tracing::warn!("Failed to remove stack {}: {}", key, e);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Registers every stack file in the root directory that is not known yet.
    ///
    /// Subdirectories are ignored. Files whose names are not escaped keys are
    /// reported in the returned [`ScanReport`] and left alone; I/O errors and
    /// corrupt stack files abort the scan.
    pub fn scan(&self) -> Result<ScanReport> {
        self.ensure_open()?;

        let mut report = ScanReport::default();

        for dir_entry in std::fs::read_dir(&self.root)? {
            let dir_entry = dir_entry?;
            if !dir_entry.file_type()?.is_file() {
                continue;
            }

            let file_name = dir_entry.file_name();
            let decoded = match file_name.to_str() {
                Some(name) => codec::unescape(name),
                None => Err(StackError::decode("file name is not valid UTF-8")),
            };
            let key = match decoded {
                Ok(key) => key,
                Err(e) => {
                    let file_name = file_name.to_string_lossy().into_owned();
                    tracing::warn!("Skipping {} during scan: {}", file_name, e);
                    report.skipped.push(SkippedFile {
                        file_name,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            if let Entry::Vacant(entry) = self.sections.entry(key) {
                let section = self.open_section(entry.key(), dir_entry.path())?;
                tracing::debug!("Recovered stack {} with depth {}", section.key(), section.depth());
                entry.insert(section);
                report.recovered += 1;
            }
        }

        tracing::info!(
            "Scan of {} recovered {} stack(s), skipped {}",
            self.root.display(),
            report.recovered,
            report.skipped.len()
        );

        Ok(report)
    }

    /// Snapshot of every known key, sorted.
    pub fn names(&self) -> Result<BTreeSet<String>> {
        self.ensure_open()?;
        Ok(self
            .sections
            .iter()
            .map(|entry| entry.key().clone())
            .collect())
    }

    /// Runs one sweep pass and returns how many handles were closed.
    pub fn evict_idle(&self) -> usize {
        if self.closed.load(Ordering::SeqCst) {
            return 0;
        }

        let now = Utc::now();
        self.sections
            .iter()
            .filter(|entry| entry.value().evict_if_idle(now, self.keep_alive))
            .count()
    }

    /// Number of entries currently holding an open file.
    pub fn open_handles(&self) -> usize {
        self.sections
            .iter()
            .filter(|entry| entry.value().is_open())
            .count()
    }

    /// Closes every handle and stops the sweep. Later calls fail with `Closed`.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        if let Some(sweeper) = self.sweeper.lock().take() {
            sweeper.abort();
        }

        let sections: Vec<StackHandle> = self
            .sections
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        self.sections.clear();

        let mut first_error = None;
        for section in sections {
            if let Err(e) = section.release() {
                tracing::warn!("Failed to close stack {}: {}", section.key(), e);
                first_error.get_or_insert(e);
            }
        }

        tracing::info!("Stack registry at {} closed", self.root.display());

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(StackError::Closed);
        }
        Ok(())
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() {
            return Err(StackError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                "section name must not be empty",
            )));
        }
        Ok(self.root.join(codec::escape(key)))
    }

    /// Opens a section while the caller holds the vacant map entry.
    fn open_section(&self, key: &str, path: PathBuf) -> Result<StackHandle> {
        // Re-checked under the shard lock: `close` flips the flag before it
        // walks the map, so nothing can be inserted behind its back.
        self.ensure_open()?;
        Ok(Arc::new(Section::open(key, path)?))
    }

    fn spawn_sweeper(self: &Arc<Self>, runtime: &tokio::runtime::Handle) -> JoinHandle<()> {
        let registry = Arc::downgrade(self);
        let period = (self.keep_alive / 3).max(MIN_SWEEP_PERIOD);

        runtime.spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick completes immediately.
            interval.tick().await;

            loop {
                interval.tick().await;

                let Some(registry) = registry.upgrade() else {
                    break;
                };
                // The pass walks map shards that `find` may hold across a file open.
                match tokio::task::spawn_blocking(move || registry.evict_idle()).await {
                    Ok(0) => {}
                    Ok(evicted) => tracing::debug!("Sweep closed {} idle stack(s)", evicted),
                    Err(e) => tracing::warn!("Sweep pass failed: {}", e),
                }
            }
        })
    }
}

impl Drop for StackRegistry {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.get_mut().take() {
            sweeper.abort();
        }
    }
}

fn remove_stack_file(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
