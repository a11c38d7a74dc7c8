//! Binary RPC Protocol
//!
//! Typed calls against the `db` service, encoded with bincode. Over TCP each
//! message travels as one frame: a big-endian `u32` payload length followed by
//! the payload. Over HTTP one request frame payload is the POST body and one
//! response payload is the reply body.

use crate::error::StackError;
use crate::service::types::{DataResult, PushArgs, SectionInfo};

use anyhow::Result;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Name under which the stack service is registered.
pub const SERVICE_NAME: &str = "db";
/// Path of the RPC-over-HTTP endpoint.
pub const ENDPOINT_RPC_HTTP: &str = "/_stackdb_rpc";
/// Content type of RPC-over-HTTP bodies.
pub const CONTENT_TYPE_RPC: &str = "application/octet-stream";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RpcCall {
    Sections { prefix: String },
    Push(PushArgs),
    Peek { section: String },
    Pop { section: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcRequest {
    /// Echoed back in the matching response.
    pub seq: u64,
    pub service: String,
    pub call: RpcCall,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RpcReply {
    Sections(Vec<SectionInfo>),
    /// Depth before the push.
    Pushed { depth: usize },
    /// Result of a peek or pop.
    Message(DataResult),
}

/// Errors returned to RPC callers. Not-found and empty stay distinct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum RpcError {
    #[error("Section not found")]
    SectionNotFound,
    #[error("Section is empty")]
    SectionEmpty,
    #[error("Registry is closed")]
    Closed,
    #[error("Unknown service: {0}")]
    UnknownService(String),
    #[error("{0}")]
    Internal(String),
}

impl From<StackError> for RpcError {
    fn from(err: StackError) -> Self {
        match err {
            StackError::NotFound(_) => RpcError::SectionNotFound,
            StackError::Empty(_) => RpcError::SectionEmpty,
            StackError::Closed => RpcError::Closed,
            other => RpcError::Internal(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub seq: u64,
    pub result: std::result::Result<RpcReply, RpcError>,
}

/// Writes one length-prefixed bincode frame.
pub async fn write_frame<W, T>(writer: &mut W, message: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let payload = bincode::serialize(message)?;
    let len = u32::try_from(payload.len())
        .map_err(|_| anyhow::anyhow!("Frame of {} bytes exceeds u32 length prefix", payload.len()))?;

    writer.write_u32(len).await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one frame. `Ok(None)` when the peer closed the stream between frames.
pub async fn read_frame<R, T>(reader: &mut R) -> Result<Option<T>>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let len = match reader.read_u32().await {
        Ok(len) => len,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    // Grows with the bytes actually received rather than the announced length.
    let mut payload = Vec::new();
    (&mut *reader)
        .take(u64::from(len))
        .read_to_end(&mut payload)
        .await?;
    if payload.len() != len as usize {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("frame truncated after {} of {} bytes", payload.len(), len),
        )
        .into());
    }

    Ok(Some(bincode::deserialize(&payload)?))
}
