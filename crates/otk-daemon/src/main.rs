//! otk-daemon entry point.
//!
//! Thin on purpose: load config, set up tracing, build the shared state,
//! wire middleware and serve. Route handlers live in `routes.rs`; shared
//! state lives in `state.rs`.
//!
//! Usage: `otk-daemon <config.yaml> [<overlay.yaml> ...]`

use std::{net::SocketAddr, sync::Arc};

use anyhow::{bail, Context};
use axum::http::{HeaderValue, Method};
use otk_config::{load_layered_yaml, report_unused_keys, ConfigMode, DaemonConfig, UnusedKeyPolicy};
use otk_daemon::{routes, state};
use otk_runtime::Tracker;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, warn, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Dev convenience; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let paths: Vec<String> = std::env::args().skip(1).collect();
    if paths.is_empty() {
        bail!("usage: otk-daemon <config.yaml> [<overlay.yaml> ...]");
    }
    let path_refs: Vec<&str> = paths.iter().map(String::as_str).collect();
    let loaded = load_layered_yaml(&path_refs)?;

    let report = report_unused_keys(ConfigMode::Daemon, &loaded.config_json, UnusedKeyPolicy::Warn)?;
    for pointer in &report.unused_leaf_pointers {
        warn!(pointer = %pointer, "unused config key");
    }

    let tracker_cfg = loaded.tracker()?;
    let daemon_cfg = DaemonConfig::from_config_json(&loaded.config_json)?;
    info!(config_hash = %loaded.config_hash, "config loaded");

    let shared = Arc::new(
        state::AppState::new(Tracker::from_config(&tracker_cfg))
            .with_config_hash(loaded.config_hash.clone()),
    );

    state::spawn_heartbeat(shared.bus.clone(), daemon_cfg.heartbeat);

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    let addr = resolve_bind_addr(&daemon_cfg)?;
    info!("otk-daemon listening on http://{}", addr);

    let shutdown_state = Arc::clone(&shared);
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            let n = shutdown_state.dispose_all().await;
            info!(disposed = n, "shutdown: sessions disposed");
        })
        .await
        .context("server crashed")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

/// `OTK_DAEMON_ADDR`, then `daemon.bind_addr`, then 127.0.0.1:8899.
fn resolve_bind_addr(cfg: &DaemonConfig) -> anyhow::Result<SocketAddr> {
    if let Some(addr) = std::env::var("OTK_DAEMON_ADDR").ok().and_then(|s| s.parse().ok()) {
        return Ok(addr);
    }
    match &cfg.bind_addr {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("CONFIG_INVALID /daemon/bind_addr: {raw}")),
        None => Ok(SocketAddr::from(([127, 0, 0, 1], 8899))),
    }
}

/// CORS: allow only localhost origins.
fn cors_localhost_only() -> CorsLayer {
    let allowed_origins = [
        "http://localhost",
        "http://127.0.0.1",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
        "http://localhost:5173",
        "http://127.0.0.1:5173",
    ];

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(tower_http::cors::Any)
}
