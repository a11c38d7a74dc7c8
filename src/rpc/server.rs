//! RPC Server
//!
//! Accepts TCP connections and serves framed requests on each one in order
//! until the peer hangs up. Each connection runs in its own tokio task.

use super::protocol::*;
use crate::service::stack_service::StackService;

use anyhow::Result;
use tokio::io::{BufReader, BufWriter};
use tokio::net::{TcpListener, TcpStream};

/// Accept loop. Returns only if accepting fails.
pub async fn serve(listener: TcpListener, service: StackService) -> Result<()> {
    tracing::info!("RPC server listening on {}", listener.local_addr()?);

    loop {
        let (stream, peer) = listener.accept().await?;
        let service = service.clone();

        tokio::spawn(async move {
            tracing::debug!("[RPC] Connection from {}", peer);
            if let Err(e) = handle_connection(stream, &service).await {
                tracing::warn!("[RPC] Connection from {} failed: {}", peer, e);
            }
        });
    }
}

async fn handle_connection(mut stream: TcpStream, service: &StackService) -> Result<()> {
    let (reader, writer) = stream.split();
    let mut reader = BufReader::new(reader);
    let mut writer = BufWriter::new(writer);

    while let Some(request) = read_frame::<_, RpcRequest>(&mut reader).await? {
        let response = dispatch(service, request).await;
        write_frame(&mut writer, &response).await?;
    }

    Ok(())
}

/// Executes one request against the service. Shared by the TCP and HTTP transports.
pub async fn dispatch(service: &StackService, request: RpcRequest) -> RpcResponse {
    let RpcRequest {
        seq,
        service: name,
        call,
    } = request;

    if name != SERVICE_NAME {
        tracing::warn!("[RPC] Call for unknown service {}", name);
        return RpcResponse {
            seq,
            result: Err(RpcError::UnknownService(name)),
        };
    }

    let result = match call {
        RpcCall::Push(args) => {
            tracing::info!(
                "[RPC] Push to {} headers: {} items, body: {} bytes",
                args.section,
                args.message.headers.len(),
                args.message.body.len()
            );
            service
                .push(args)
                .await
                .map(|depth| RpcReply::Pushed { depth })
        }
        RpcCall::Peek { section } => {
            tracing::info!("[RPC] Peek from {}", section);
            service.peek(section).await.map(RpcReply::Message)
        }
        RpcCall::Pop { section } => {
            tracing::info!("[RPC] Pop from {}", section);
            service.pop(section).await.map(RpcReply::Message)
        }
        RpcCall::Sections { prefix } => {
            tracing::info!("[RPC] Sections with prefix {:?}", prefix);
            service.sections(prefix).await.map(RpcReply::Sections)
        }
    };

    let result = result.map_err(|e| {
        if !e.is_absent() {
            tracing::error!("[RPC] Call {} failed: {}", seq, e);
        }
        RpcError::from(e)
    });

    RpcResponse { seq, result }
}
