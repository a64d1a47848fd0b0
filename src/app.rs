/*
 * Responsibility
 * - Load Config -> build the OAuth2 gate -> assemble the Router
 * - Apply middleware (OAuth2 gate on /api/v1, HTTP layers on everything)
 * - Start with axum::serve()
 */
use std::{panic, process};

use anyhow::Result;
use axum::{Router, routing::get};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::{api, config::Config, middleware, services, state::AppState};

fn init_tracing() {
    // Prefer RUST_LOG if set; otherwise use a sensible default.
    // Ex:
    // RUST_LOG=info,oauth2_gate=debug,tower_http=debug cargo run
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn init_panic_hook(abort_on_panic: bool) {
    let default_hook = panic::take_hook();

    panic::set_hook(Box::new(move |info| {
        // Always surface panics via tracing; stderr may be hidden depending on how we run.
        tracing::error!(?info, "panic");

        // Development: crash the whole process so it gets noticed.
        // Production: default behavior (stderr), keep serving.
        if abort_on_panic {
            process::abort();
        } else {
            default_hook(info);
        }
    }))
}

pub async fn run() -> Result<()> {
    init_tracing();
    let config = Config::from_env()?;
    init_panic_hook(!config.app_env.is_production());

    tracing::info!(
        "starting oauth2 gate in {:?} mode on {} (gateway_enabled={})",
        config.app_env,
        config.addr,
        config.gateway_enabled
    );

    let state = build_state(&config).await?;
    let app = build_router(state, &config);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

pub async fn build_state(config: &Config) -> Result<AppState> {
    let gate = services::oauth2::build_gate(config).await?;
    Ok(AppState::new(gate))
}

pub fn build_router(state: AppState, config: &Config) -> Router {
    let v1 = middleware::oauth2::apply(api::v1::routes(), state.gate.clone());

    let router = Router::new()
        .route("/health", get(api::health::health))
        .nest("/api/v1", v1)
        .with_state(state);

    middleware::http::apply(router, config.request_body_limit_bytes)
}
