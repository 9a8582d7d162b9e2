// Moonbag service entry point
//
// Boots the settlement engines and runs the two periodic sweeps: wager
// session expiry and prediction resolution. The HTTP surface that feeds the
// engines is a separate service; this binary owns the background work.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use moonbag::{AppState, Config};

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    info!(data_dir = %config.data_dir.display(), "starting moonbag settlement engine");

    let state = match AppState::new(config) {
        Ok(state) => Arc::new(state),
        Err(e) => {
            error!(error = %e, "failed to initialize engine");
            std::process::exit(1);
        }
    };

    // wager-session expiry sweep
    {
        let state = Arc::clone(&state);
        let interval = Duration::from_secs(state.config.mines_sweep_interval_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if let Err(e) = state.sweep_expired_sessions().await {
                    error!(error = %e, "session expiry sweep failed");
                }
            }
        });
    }

    // prediction resolution sweep
    {
        let state = Arc::clone(&state);
        let interval = Duration::from_secs(state.config.resolution_sweep_interval_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let stats = state.sweep_due_questions().await;
                if stats.resolved + stats.cancelled + stats.deferred > 0 {
                    info!(
                        resolved = stats.resolved,
                        cancelled = stats.cancelled,
                        deferred = stats.deferred,
                        "resolution sweep finished"
                    );
                }
            }
        });
    }

    info!("sweeps running; press ctrl-c to stop");
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install ctrl-c handler");
    info!("shutdown signal received, exiting");
}
