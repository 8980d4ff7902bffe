// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Request Guard Service
//!
//! Serves the token issuance endpoint and a guarded echo endpoint behind the
//! rate limiter and CSRF defenses.
//!
//! ## Configuration
//!
//! Configuration is loaded from environment variables, after reading a
//! `.env` file when one is present:
//!
//! - `BIND_ADDR`: Server bind address (default: 0.0.0.0:8080)
//! - `APP_ENV`: `development` or `production` (default: production)
//! - `CSRF_SECRET` / `SESSION_SECRET`: token signing secret (required)
//! - `ALLOWED_ORIGINS`: extra trusted origins, comma separated
//! - `RATE_LIMIT_SWEEP_SECS`: expired counter sweep interval (default: 300)
//! - `BODY_LIMIT_BYTES`: maximum request body size (default: 1 MiB)
//! - `METRICS_ENABLED`: expose Prometheus metrics (default: true)

use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use request_guard::{
    config::Config,
    endpoint::Guard,
    handlers::{router, AppState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let config = Config::from_env().context("failed to load configuration")?;
    info!(
        bind_addr = %config.bind_addr,
        environment = ?config.environment,
        allowed_origins = ?config.csrf.allowed_origins,
        auth_policy = ?config.rate_limit.auth,
        api_policy = ?config.rate_limit.api,
        strict_policy = ?config.rate_limit.strict,
        metrics_enabled = config.metrics.enabled,
        "Starting request guard"
    );

    let guard = Arc::new(Guard::from_config(&config)?);
    guard.spawn_janitor(config.rate_limit.sweep_interval());

    let addr: SocketAddr = config
        .bind_addr
        .parse()
        .with_context(|| format!("invalid BIND_ADDR {:?}", config.bind_addr))?;

    let state = Arc::new(AppState::new(guard, config));
    let app = router(state).layer(TraceLayer::new_for_http());

    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "Server listening");

    axum::serve(listener, app).await?;

    Ok(())
}
