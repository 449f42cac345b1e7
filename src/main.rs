//! canvas-hub server binary
//!
//! Configuration comes from the environment (see [`ServerConfig::from_env`]).
//! Logging honours `RUST_LOG` and defaults to `canvas_hub=info`; set
//! `CANVAS_LOG_FORMAT=json` for JSON lines.

use canvas_hub::registry::{LockedRegistry, RegistryBackend, ShardedRegistry};
use canvas_hub::{CanvasServer, ServerConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let config = ServerConfig::from_env()?;
    tracing::info!(
        addr = %config.bind_addr,
        backend = ?config.backend,
        recycle_ids = config.registry.recycle_ids,
        "Starting canvas hub"
    );

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        }
    };

    match config.backend {
        RegistryBackend::Locked => {
            CanvasServer::<LockedRegistry>::new(config)
                .run_until(shutdown)
                .await?
        }
        RegistryBackend::Sharded => {
            CanvasServer::<ShardedRegistry>::new(config)
                .run_until(shutdown)
                .await?
        }
    }

    tracing::info!("Signal received, done");
    Ok(())
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("canvas_hub=info"));
    let json = std::env::var("CANVAS_LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
