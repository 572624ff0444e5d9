//! Gateway session entry point
//!
//! Run with:
//! ```bash
//! cargo run -p gateway-session
//! ```
//!
//! Configuration is loaded from environment variables.

use gateway_common::{try_init_tracing_with_config, ClientConfig, TracingConfig};
use gateway_session::{GatewayEvent, ShardEvent, ShardManager};
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() {
    // Load configuration first; the tracing preset depends on the environment
    let config = match ClientConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = try_init_tracing_with_config(TracingConfig::for_environment(config.app.env)) {
        eprintln!("Warning: Failed to initialize tracing: {e}");
    }

    if let Err(e) = run(config).await {
        error!(error = %e, "Gateway session failed");
        std::process::exit(1);
    }
}

async fn run(config: ClientConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        env = ?config.app.env,
        url = %config.gateway.url,
        shards = ?config.sharding.effective_shard_ids(),
        shard_count = config.sharding.shard_count,
        max_concurrency = config.sharding.max_concurrency,
        "Configuration loaded"
    );

    let (manager, mut events) = ShardManager::from_client_config(&config);

    tokio::select! {
        result = manager.open_all() => {
            if let Err(e) = result {
                manager.close_all().await;
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown requested before all shards opened");
            manager.close_all().await;
            return Ok(());
        }
    }

    let mut running = manager.shard_count();
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(ShardEvent { shard_id, event }) = event else {
                    break;
                };
                match event {
                    GatewayEvent::Message(message) => match &message.t {
                        Some(name) => info!(shard_id, event = %name, seq = ?message.s, "Dispatch"),
                        None => debug!(shard_id, op = message.op, "Message"),
                    },
                    GatewayEvent::Closed(notice) => {
                        warn!(shard_id, %notice, "Shard will not reconnect");
                        running = running.saturating_sub(1);
                        if running == 0 {
                            error!("All shards stopped");
                            break;
                        }
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                break;
            }
        }
    }

    manager.close_all().await;
    Ok(())
}
