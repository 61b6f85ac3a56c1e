use clap::Parser;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use backgate::config::StoreConfig;
use backgate::shutdown;
use backgate::store;
use backgate::worker::{demo, AppWorker};

#[derive(Parser, Debug)]
#[command(name = "worker", disable_version_flag = true)]
#[command(about = "Job-consuming worker of the split gateway")]
struct Args {
    /// Worker version identifier; defaults to the hostname
    #[arg(long)]
    version: Option<String>,
}

fn default_version() -> String {
    if let Some(hostname) = std::env::var("HOSTNAME").ok().filter(|h| !h.is_empty()) {
        return hostname;
    }
    let id = Uuid::new_v4().simple().to_string();
    format!("worker-{}", &id[..8])
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let version = args.version.unwrap_or_else(default_version);

    let store = store::connect(&StoreConfig::from_env());
    let shutdown = shutdown::install_handler("worker");
    let worker = AppWorker::new(
        version.clone(),
        store.clone(),
        demo::handlers(store),
        shutdown,
    );

    tracing::info!(version = %version, "Starting worker, press Ctrl+C to stop");
    // Store failure beyond the retry budget surfaces here; anyhow exits 1.
    worker.run().await?;

    Ok(())
}
