//! Shared Service Contract
//!
//! Every front end (REST, binary RPC, RPC over HTTP) goes through
//! `StackService`: resolve the key in the registry, run one stack operation,
//! convert the raw entry back into a `Message`.
//!
//! Registry and file work is blocking, so each call is moved onto tokio's
//! blocking pool.

use super::headers::{decode_headers, encode_headers};
use super::types::{DataResult, Message, PushArgs, SectionInfo};
use crate::error::{Result, StackError};
use crate::storage::registry::StackRegistry;
use crate::storage::section::{RawEntry, StackHandle};

use std::io;
use std::sync::Arc;

/// How many times a push retries after its handle was released by a
/// concurrent `remove`.
const RELEASED_HANDLE_RETRIES: usize = 3;

#[derive(Clone)]
pub struct StackService {
    registry: Arc<StackRegistry>,
}

impl StackService {
    pub fn new(registry: Arc<StackRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<StackRegistry> {
        &self.registry
    }

    /// Finds or creates the section and pushes the message.
    /// Returns the depth before the push.
    pub async fn push(&self, args: PushArgs) -> Result<usize> {
        let registry = self.registry.clone();
        blocking(move || push_now(&registry, &args)).await
    }

    /// Returns the top message without removing it.
    pub async fn peek(&self, section: String) -> Result<DataResult> {
        let registry = self.registry.clone();
        blocking(move || {
            let handle = lookup(&registry, &section)?;
            read_entry(&registry, &section, handle.peek())
        })
        .await
    }

    /// Removes and returns the top message.
    pub async fn pop(&self, section: String) -> Result<DataResult> {
        let registry = self.registry.clone();
        blocking(move || {
            let handle = lookup(&registry, &section)?;
            read_entry(&registry, &section, handle.pop())
        })
        .await
    }

    /// Lists known sections whose names start with `prefix`, sorted by name.
    pub async fn sections(&self, prefix: String) -> Result<Vec<SectionInfo>> {
        let registry = self.registry.clone();
        blocking(move || sections_now(&registry, &prefix)).await
    }
}

fn push_now(registry: &StackRegistry, args: &PushArgs) -> Result<usize> {
    let handle = registry.get(&args.section)?;
    push_on(registry, handle, args)
}

/// Pushes through `handle`, switching to a fresh handle if a concurrent
/// `remove` released it first.
pub(crate) fn push_on(
    registry: &StackRegistry,
    mut handle: StackHandle,
    args: &PushArgs,
) -> Result<usize> {
    let header = encode_headers(&args.message.headers)?;

    let mut attempt = 0;
    loop {
        match handle.push(&header, &args.message.body) {
            Err(StackError::Closed) if !registry.is_closed() && attempt < RELEASED_HANDLE_RETRIES => {
                tracing::debug!("Stack {} removed during push, retrying", args.section);
                attempt += 1;
                handle = registry.get(&args.section)?;
            }
            result => return result,
        }
    }
}

fn lookup(registry: &StackRegistry, section: &str) -> Result<StackHandle> {
    registry
        .find(section, false)?
        .ok_or_else(|| StackError::NotFound(section.to_string()))
}

pub(crate) fn read_entry(
    registry: &StackRegistry,
    section: &str,
    entry: Result<Option<RawEntry>>,
) -> Result<DataResult> {
    let entry = match entry {
        // The handle was removed between lookup and read.
        Err(StackError::Closed) if !registry.is_closed() => {
            return Err(StackError::NotFound(section.to_string()));
        }
        other => other?,
    };

    let (header, body, depth) = entry.ok_or_else(|| StackError::Empty(section.to_string()))?;

    Ok(DataResult {
        message: Message {
            headers: decode_headers(&header)?,
            body,
        },
        depth,
    })
}

fn sections_now(registry: &StackRegistry, prefix: &str) -> Result<Vec<SectionInfo>> {
    let mut sections = Vec::new();

    for name in registry.names()? {
        if !name.starts_with(prefix) {
            continue;
        }
        // Entries removed since `names` was taken are skipped.
        if let Some(handle) = registry.find(&name, false)? {
            if !handle.is_released() {
                sections.push(handle.info());
            }
        }
    }

    Ok(sections)
}

async fn blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| StackError::Io(io::Error::new(io::ErrorKind::Other, e)))?
}
