use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Point-in-time snapshot of one registry entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionInfo {
    /// The section key (unescaped).
    pub name: String,
    /// Number of messages currently in the stack.
    pub depth: usize,
    /// Time of the most recent successful operation against the stack.
    pub last_access: DateTime<Utc>,
}

/// Outcome of a startup recovery pass over the root directory.
#[derive(Debug, Default)]
pub struct ScanReport {
    /// Stacks opened and registered by this pass.
    pub recovered: usize,
    /// Files left alone because their names are not escaped keys.
    pub skipped: Vec<SkippedFile>,
}

#[derive(Debug, Clone)]
pub struct SkippedFile {
    pub file_name: String,
    pub reason: String,
}
