//! Binary entrypoint for the audion devtools server.
//!
//! Reads configuration from environment variables:
//! - `AUDION_DEBUGGER_URL`: page target WebSocket URL (required)
//! - `AUDION_PORT`: server listen port (default: 3000)
//! - `AUDION_THROTTLE_MS`, `AUDION_REALTIME_INTERVAL_MS`,
//!   `AUDION_REALTIME_TIMEOUT_MS`, `AUDION_EMIT_PARAM_UPDATES`: pipeline tuning
//!
//! Log output is controlled with `RUST_LOG` (default: `info`).

use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

use audion_devtools::config::DevtoolsConfig;
use audion_devtools::router::build_router;
use audion_devtools::state::AppState;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match DevtoolsConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("invalid configuration: {}", e);
            return ExitCode::from(2);
        }
    };

    let state = AppState::connect(&config);
    let app = build_router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!(debugger = %config.debugger_url, "audion devtools starting on {}", addr);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("failed to bind {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("server error: {}", e);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
