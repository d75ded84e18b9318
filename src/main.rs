//! Context Keeper - persistent assistant context with a live viewer

use context_keeper::cli;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging (INFO for this crate by default, override with RUST_LOG)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,context_keeper=info,tower_http=info"))
        )
        .init();

    // Run CLI
    cli::run().await
}
