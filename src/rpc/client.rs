//! RPC Client
//!
//! Typed calls over either transport. Protocol-level failures come back as an
//! `anyhow::Error` wrapping [`RpcError`], so callers can `downcast_ref` to tell
//! "not found" from "empty".

use super::protocol::*;
use crate::service::types::{DataResult, Headers, Message, PushArgs, SectionInfo};

use anyhow::Result;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::BufStream;
use tokio::net::TcpStream;
use tokio::sync::Mutex;

enum Transport {
    Tcp(Mutex<BufStream<TcpStream>>),
    Http { client: reqwest::Client, url: String },
}

pub struct RpcClient {
    transport: Transport,
    seq: AtomicU64,
}

impl RpcClient {
    /// Connects to a binary RPC endpoint (`host:port` or `:port` for localhost).
    pub async fn connect_tcp(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(dial_address(addr)).await?;
        stream.set_nodelay(true)?;

        Ok(Self {
            transport: Transport::Tcp(Mutex::new(BufStream::new(stream))),
            seq: AtomicU64::new(1),
        })
    }

    /// Targets an RPC-over-HTTP endpoint. Accepts `host:port` or a full base URL.
    pub fn http(addr: &str) -> Self {
        let trimmed = addr.trim().trim_end_matches('/');
        let base = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            trimmed.to_string()
        } else {
            format!("http://{}", dial_address(trimmed))
        };

        Self {
            transport: Transport::Http {
                client: reqwest::Client::new(),
                url: format!("{}{}", base, ENDPOINT_RPC_HTTP),
            },
            seq: AtomicU64::new(1),
        }
    }

    pub async fn push(&self, section: &str, headers: Headers, body: Vec<u8>) -> Result<usize> {
        let call = RpcCall::Push(PushArgs {
            section: section.to_string(),
            message: Message { headers, body },
        });
        match self.call(call).await? {
            RpcReply::Pushed { depth } => Ok(depth),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn peek(&self, section: &str) -> Result<DataResult> {
        let call = RpcCall::Peek {
            section: section.to_string(),
        };
        match self.call(call).await? {
            RpcReply::Message(result) => Ok(result),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn pop(&self, section: &str) -> Result<DataResult> {
        let call = RpcCall::Pop {
            section: section.to_string(),
        };
        match self.call(call).await? {
            RpcReply::Message(result) => Ok(result),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn sections(&self, prefix: &str) -> Result<Vec<SectionInfo>> {
        let call = RpcCall::Sections {
            prefix: prefix.to_string(),
        };
        match self.call(call).await? {
            RpcReply::Sections(sections) => Ok(sections),
            other => Err(unexpected(&other)),
        }
    }

    /// Sends one call to the `db` service and waits for its reply.
    pub async fn call(&self, call: RpcCall) -> Result<RpcReply> {
        let request = RpcRequest {
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
            service: SERVICE_NAME.to_string(),
            call,
        };

        let response = match &self.transport {
            Transport::Tcp(stream) => {
                let mut stream = stream.lock().await;
                write_frame(&mut *stream, &request).await?;
                read_frame::<_, RpcResponse>(&mut *stream)
                    .await?
                    .ok_or_else(|| anyhow::anyhow!("Connection closed by server"))?
            }
            Transport::Http { client, url } => {
                let response = client
                    .post(url.as_str())
                    .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE_RPC)
                    .body(bincode::serialize(&request)?)
                    .send()
                    .await?;

                if !response.status().is_success() {
                    return Err(anyhow::anyhow!(
                        "RPC over HTTP failed: {}",
                        response.status()
                    ));
                }

                let payload = response.bytes().await?;
                bincode::deserialize::<RpcResponse>(&payload)?
            }
        };

        if response.seq != request.seq {
            return Err(anyhow::anyhow!(
                "Response sequence {} does not match request {}",
                response.seq,
                request.seq
            ));
        }

        response.result.map_err(anyhow::Error::new)
    }
}

fn dial_address(addr: &str) -> String {
    if addr.starts_with(':') {
        format!("127.0.0.1{}", addr)
    } else {
        addr.to_string()
    }
}

fn unexpected(reply: &RpcReply) -> anyhow::Error {
    anyhow::anyhow!("Unexpected reply: {:?}", reply)
}
