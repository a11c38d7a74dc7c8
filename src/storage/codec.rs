//! Section Key Codec
//!
//! Maps arbitrary section keys to names that are safe as a single file inside
//! the flat root directory, and back. Everything outside `[A-Za-z0-9-_.~]` is
//! percent-encoded; the two dot-only names that would address a directory are
//! encoded as well.

use crate::error::{Result, StackError};

/// Percent-encodes `key` into a file name. Total over all strings.
pub fn escape(key: &str) -> String {
    match key {
        "." => "%2E".to_string(),
        ".." => "%2E%2E".to_string(),
        _ => urlencoding::encode(key).into_owned(),
    }
}

/// Recovers the key from a file name produced by [`escape`].
///
/// Names that decode but would not be produced by `escape` (lowercase hex,
/// stray `%`, unencoded reserved bytes) are rejected so that the mapping
/// stays one-to-one.
pub fn unescape(name: &str) -> Result<String> {
    let key = urlencoding::decode(name)
        .map_err(|e| StackError::decode(format!("file name {:?}: {}", name, e)))?
        .into_owned();

    if escape(&key) != name {
        return Err(StackError::decode(format!(
            "file name {:?} is not a canonical escaped key",
            name
        )));
    }

    Ok(key)
}
