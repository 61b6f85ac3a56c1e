use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use backgate::config::{GateConfig, StoreConfig};
use backgate::gate::dispatcher::JobDispatcher;
use backgate::gate::handlers::{router, GateContext};
use backgate::job::repository::JobRepository;
use backgate::routing::registry::RouteRegistry;
use backgate::routing::strategy::RouteStrategy;
use backgate::shutdown;
use backgate::store;
use backgate::worker::{demo, AppWorker};

#[derive(Parser, Debug)]
#[command(name = "gate")]
#[command(about = "Public-facing HTTP ingress of the split gateway")]
struct Args {
    /// Spawn an in-process demo worker sharing this gate's store
    #[arg(long, value_name = "VERSION")]
    local_worker: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let store_config = StoreConfig::from_env();
    let gate_config = GateConfig::from_env();

    let store = store::connect(&store_config);
    let repository = JobRepository::new(store.clone());
    let registry = RouteRegistry::new(store.clone());
    let strategy = RouteStrategy::new(store.clone(), gate_config.strategy);
    let dispatcher = JobDispatcher::new(
        store.clone(),
        repository.clone(),
        registry.clone(),
        strategy,
    )
    .with_timeout(gate_config.dispatch_timeout);
    let ctx = Arc::new(GateContext {
        repository,
        registry,
        dispatcher,
    });

    let shutdown = shutdown::install_handler("gate");

    if let Some(version) = args.local_worker {
        tracing::info!(version = %version, "Starting in-process demo worker");
        let worker = AppWorker::new(
            version,
            store.clone(),
            demo::handlers(store.clone()),
            shutdown.clone(),
        );
        tokio::spawn(async move {
            if let Err(e) = worker.run().await {
                tracing::error!("Local worker failed: {}", e);
            }
        });
    }

    let app = router(ctx, gate_config.max_body_bytes);
    let addr = SocketAddr::from(([0, 0, 0, 0], gate_config.port));
    tracing::info!(
        %addr,
        strategy = gate_config.strategy.as_str(),
        timeout_ms = gate_config.dispatch_timeout.as_millis() as u64,
        "Gate listening"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    Ok(())
}
