use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub use crate::storage::types::SectionInfo;

/// Message headers. Stored as a JSON object alongside the body.
pub type Headers = HashMap<String, String>;

/// One stack entry as seen by clients.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub headers: Headers,
    pub body: Vec<u8>,
}

/// Arguments of a push: the target section and the message to store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushArgs {
    pub section: String,
    pub message: Message,
}

/// Result of a peek or pop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataResult {
    pub message: Message,
    /// Stack depth observed immediately before the operation.
    pub depth: usize,
}
