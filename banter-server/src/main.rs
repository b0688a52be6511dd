use std::sync::Arc;

use banter_core::models::User;
use banter_core::Core;
use banter_server::{handle_connection, Config};
use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    let core = Arc::new(Core::in_memory(config.upload_dir.clone()));

    for seed in &config.seed_users {
        let user = User {
            id: seed.id.clone(),
            tenant_id: seed.tenant_id.clone(),
            display_name: seed.display_name.clone(),
            deleted: false,
        };
        match core.store.insert_user(user).await {
            Ok(()) => info!("seeded user {} ({})", seed.id, seed.tenant_id),
            Err(e) => warn!("could not seed user {}: {}", seed.id, e),
        }
    }

    // Periodic reconciliation for uploads orphaned in Uploading.
    let sweeper = core.clone();
    let sweep_interval = config.sweep_interval;
    let stalled_after_ms = config.stalled_after_ms;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(e) = sweeper.attachments.sweep_stalled(stalled_after_ms).await {
                error!("upload sweep failed: {}", e);
            }
        }
    });

    let listener = match TcpListener::bind(&config.addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("failed to bind to {}: {}", config.addr, e);
            std::process::exit(1);
        }
    };
    info!("banter gateway listening on {}", config.addr);

    loop {
        match listener.accept().await {
            Ok((stream, peer_addr)) => {
                info!("new connection from {}", peer_addr);
                let core = core.clone();
                let auth_timeout = config.auth_timeout;
                tokio::spawn(async move {
                    match accept_async(stream).await {
                        Ok(ws_stream) => {
                            handle_connection(ws_stream, core, auth_timeout).await;
                        }
                        Err(e) => {
                            error!("websocket handshake failed for {}: {}", peer_addr, e);
                        }
                    }
                });
            }
            Err(e) => {
                error!("failed to accept connection: {}", e);
            }
        }
    }
}
