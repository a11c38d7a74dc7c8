use clap::Parser;
use stackdb::config::{bind_address, ServerConfig};
use stackdb::rpc;
use stackdb::service::handlers;
use stackdb::service::stack_service::StackService;
use stackdb::storage::registry::StackRegistry;
use tokio::net::TcpListener;
use tokio::task::JoinSet;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::parse();

    tracing_subscriber::fmt()
        .with_env_filter(config.env_filter())
        .init();

    config.validate()?;

    // 1. Stack registry:
    let registry = StackRegistry::open(&config.root, config.keep_alive)?;
    tracing::info!(
        "Stacks stored in {} (keep-alive {})",
        registry.root().display(),
        humantime::format_duration(config.keep_alive)
    );

    // 2. Recover existing stacks:
    let report = registry.scan()?;
    tracing::info!("Recovered {} stack(s)", report.recovered);
    for skipped in &report.skipped {
        tracing::warn!("Skipped {}: {}", skipped.file_name, skipped.reason);
    }

    let service = StackService::new(registry.clone());
    let mut servers: JoinSet<anyhow::Result<()>> = JoinSet::new();

    // 3. Plain HTTP:
    if let Some(endpoint) = &config.http {
        let listener = TcpListener::bind(bind_address(endpoint)).await?;
        tracing::info!("HTTP server listening on {}", listener.local_addr()?);
        let app = handlers::router(service.clone());
        servers.spawn(async move { Ok(axum::serve(listener, app).await?) });
    }

    // 4. Binary RPC:
    if let Some(endpoint) = &config.rpc {
        let listener = TcpListener::bind(bind_address(endpoint)).await?;
        servers.spawn(rpc::server::serve(listener, service.clone()));
    }

    // 5. RPC over HTTP:
    if let Some(endpoint) = &config.http_rpc {
        let listener = TcpListener::bind(bind_address(endpoint)).await?;
        tracing::info!("HTTP RPC server listening on {}", listener.local_addr()?);
        let app = rpc::http::router(service.clone());
        servers.spawn(async move { Ok(axum::serve(listener, app).await?) });
    }

    tracing::info!("Press Ctrl+C to shutdown");

    let outcome = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down");
            signal.map_err(anyhow::Error::from)
        }
        Some(joined) = servers.join_next() => match joined {
            Ok(Ok(())) => Err(anyhow::anyhow!("Server stopped unexpectedly")),
            Ok(Err(e)) => Err(e),
            Err(e) => Err(anyhow::Error::from(e)),
        },
    };

    servers.abort_all();
    registry.close()?;

    outcome
}
