//! # veilsyncd
//!
//! Synchronization daemon for a veilsync node.
//!
//! On startup it opens (or initializes) the data directory, adds any
//! bootstrap addresses and then runs the [`Communicator`] loop until a
//! `shutdown` command arrives on the command queue. Ctrl+C enqueues that
//! command, so the loop always stops between ticks and flushes its session
//! statistics.
//!
//! [`Communicator`]: veilsync_daemon::Communicator

use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use veilsync_daemon::{Communicator, DaemonConfig, Node};
use veilsync_net::HttpTransport;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,veilsync_daemon=debug")),
        )
        .init();

    info!("Starting veilsync daemon v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = DaemonConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Open the node; a bad key file or store is fatal
    // -----------------------------------------------------------------------
    let node = Node::open(&config.data_dir)?;
    info!(public_key = %node.public_key(), "Node identity");

    // commands left from a previous run must not stop this one
    node.database().clear_commands()?;
    node.add_bootstrap(&config.bootstrap);

    let transport = HttpTransport::new(&config.transport_config())?;

    // -----------------------------------------------------------------------
    // 4. Route Ctrl+C through the command queue
    // -----------------------------------------------------------------------
    let signal_node = node.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down");
            if let Err(e) = signal_node.enqueue_shutdown() {
                error!(error = %e, "Failed to enqueue shutdown");
            }
        }
    });

    // -----------------------------------------------------------------------
    // 5. Run the sync loop (blocks until shutdown)
    // -----------------------------------------------------------------------
    let mut communicator = Communicator::new(node, transport, config.sync_settings());
    communicator.run().await;

    info!("veilsync daemon stopped");
    Ok(())
}
