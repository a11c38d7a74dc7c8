//! File-backed LIFO
//!
//! One open stack bound to one file. Records are appended as
//! `header | body | footer`, where the footer holds three little-endian u64
//! values: header length, body length and the depth after the push. Popping
//! truncates the file back to the start of the last record, so the file
//! always contains exactly the live entries.

use crate::error::{Result, StackError};

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

const FOOTER_LEN: u64 = 24;

/// Location of the topmost record inside the file.
#[derive(Debug, Clone, Copy)]
struct Record {
    start: u64,
    header_len: u64,
    body_len: u64,
}

pub struct FileStack {
    path: PathBuf,
    file: File,
    len: u64,
    depth: usize,
}

impl FileStack {
    /// Opens the stack at `path`, creating an empty file if absent.
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        let len = file.metadata()?.len();

        let mut stack = Self {
            path: path.to_path_buf(),
            file,
            len,
            depth: 0,
        };

        if len > 0 {
            let (_, depth) = stack.top()?;
            stack.depth = depth;
        }

        tracing::trace!("Opened {} with depth {}", path.display(), stack.depth);

        Ok(stack)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Appends one entry and returns the depth before the push.
    pub fn push(&mut self, header: &[u8], body: &[u8]) -> Result<usize> {
        let before = self.depth;
        let after = before as u64 + 1;

        let mut record = Vec::with_capacity(header.len() + body.len() + FOOTER_LEN as usize);
        record.extend_from_slice(header);
        record.extend_from_slice(body);
        record.extend_from_slice(&(header.len() as u64).to_le_bytes());
        record.extend_from_slice(&(body.len() as u64).to_le_bytes());
        record.extend_from_slice(&after.to_le_bytes());

        self.file.seek(SeekFrom::Start(self.len))?;
        if let Err(e) = self.file.write_all(&record) {
            // Drop whatever part of the record made it to disk.
            if let Err(truncate) = self.file.set_len(self.len) {
                tracing::warn!(
                    "Failed to roll back partial record in {}: {}",
                    self.path.display(),
                    truncate
                );
            }
            return Err(e.into());
        }

        self.len += record.len() as u64;
        self.depth = before + 1;
        Ok(before)
    }

    /// Returns the topmost entry without removing it.
    pub fn peek(&mut self) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        if self.depth == 0 {
            return Ok(None);
        }
        let (record, _) = self.top()?;
        self.read_record(record).map(Some)
    }

    /// Removes and returns the topmost entry.
    pub fn pop(&mut self) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        if self.depth == 0 {
            return Ok(None);
        }
        let (record, _) = self.top()?;
        let entry = self.read_record(record)?;

        self.file.set_len(record.start)?;
        self.len = record.start;
        self.depth -= 1;

        Ok(Some(entry))
    }

    /// Flushes file contents to disk. The descriptor is released on drop.
    pub fn sync(&self) -> Result<()> {
        self.file.sync_data()?;
        Ok(())
    }

    fn top(&mut self) -> Result<(Record, usize)> {
        if self.len < FOOTER_LEN {
            return Err(self.corrupt("truncated footer"));
        }

        let mut footer = [0u8; FOOTER_LEN as usize];
        self.file.seek(SeekFrom::Start(self.len - FOOTER_LEN))?;
        self.file.read_exact(&mut footer)?;

        let field = |i: usize| {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&footer[i * 8..(i + 1) * 8]);
            u64::from_le_bytes(raw)
        };
        let header_len = field(0);
        let body_len = field(1);
        let depth = field(2);

        let payload = header_len
            .checked_add(body_len)
            .and_then(|n| n.checked_add(FOOTER_LEN))
            .filter(|&n| n <= self.len)
            .ok_or_else(|| self.corrupt("record larger than file"))?;

        if depth == 0 {
            return Err(self.corrupt("zero depth in footer"));
        }

        let record = Record {
            start: self.len - payload,
            header_len,
            body_len,
        };
        Ok((record, depth as usize))
    }

    fn read_record(&mut self, record: Record) -> Result<(Vec<u8>, Vec<u8>)> {
        let mut header = vec![0u8; record.header_len as usize];
        let mut body = vec![0u8; record.body_len as usize];

        self.file.seek(SeekFrom::Start(record.start))?;
        self.file.read_exact(&mut header)?;
        self.file.read_exact(&mut body)?;

        Ok((header, body))
    }

    fn corrupt(&self, reason: &str) -> StackError {
        StackError::decode(format!("corrupt stack {}: {}", self.path.display(), reason))
    }
}
