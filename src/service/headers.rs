//! Header map <-> blob conversion at the storage boundary.

use super::types::Headers;
use crate::error::Result;

pub fn encode_headers(headers: &Headers) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(headers)?)
}

/// Fails with `StackError::Decode` on a malformed blob.
pub fn decode_headers(blob: &[u8]) -> Result<Headers> {
    Ok(serde_json::from_slice(blob)?)
}
