use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use server_api::ApiContext;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

mod app_state;
mod config;
mod transport;

use app_state::AppState;
use config::{load_settings, Settings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = load_settings()?;
    init_tracing(&settings.log_level);

    let state = Arc::new(build_state(&settings));

    let addr: SocketAddr = settings
        .bind_addr
        .parse()
        .with_context(|| format!("invalid bind address '{}'", settings.bind_addr))?;
    let listener = TcpListener::bind(addr).await.map_err(|error| {
        error!(%addr, %error, "failed to bind listener");
        error
    })?;
    info!(%addr, max_frame_bytes = settings.max_frame_bytes, "server listening");

    tokio::select! {
        () = accept_loop(listener, state) => Ok(()),
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for shutdown signal")?;
            info!("shutting down");
            Ok(())
        }
    }
}

/// `RUST_LOG` wins over the configured level.
fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn build_state(settings: &Settings) -> AppState {
    let api = ApiContext::new(settings.snapshot_locator());
    if !api.snapshots.is_confined() {
        warn!("snapshot_dir is not set; save and load accept any path the server can reach");
    }

    if let Some(path) = &settings.restore_snapshot {
        match api.store.load(path) {
            Ok(stats) => info!(
                path = %path.display(),
                groups = stats.groups,
                polls = stats.polls,
                ballots = stats.ballots,
                "snapshot restored"
            ),
            Err(error) => error!(
                path = %path.display(),
                %error,
                "failed to restore snapshot; starting empty"
            ),
        }
    }

    AppState::new(api, settings.max_frame_bytes)
}

async fn accept_loop(listener: TcpListener, state: Arc<AppState>) {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(error) => {
                warn!(%error, "failed to accept connection");
                continue;
            }
        };

        let connection = state.next_connection_id();
        debug!(%connection, %peer, "connection accepted");

        let state = Arc::clone(&state);
        tokio::spawn(async move {
            if let Err(error) = transport::serve(state, connection, stream).await {
                warn!(%connection, error = %error, "connection failed");
            }
            debug!(%connection, "connection closed");
        });
    }
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
