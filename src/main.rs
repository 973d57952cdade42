mod config;
mod error;
mod filter;
mod gatekeeper;
mod handlers;
mod metrics;
mod models;
mod rate_limit;
mod routes;
mod security_headers;
mod state;
mod store;

use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Args;
use crate::rate_limit::sweeper;
use crate::state::AppState;
use crate::store::MemoryDocumentStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // parse cli arguments
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_new(&args.log_filter)
                .unwrap_or_else(|_| EnvFilter::new("edge_gatekeeper=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let api = args.api_limit()?;
    let contact = args.contact_limit()?;
    let inquiry = args.inquiry_limit()?;

    let state = Arc::new(AppState::new(
        api,
        contact,
        inquiry,
        Arc::new(MemoryDocumentStore::new()),
        args.csp_report_uri.clone(),
    ));

    // the inline 1% sweep always runs; this one is the deterministic backstop
    if let Some(every) = args.cleanup_interval() {
        tokio::spawn(sweeper(state.limiters(), every));
    }

    let app = routes::build_router(state);

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!(%addr, "gatekeeper listening");
    tracing::info!(
        limit = api.limit,
        window_secs = api.window.as_secs(),
        "api rate limit"
    );
    tracing::info!(
        contact_limit = contact.limit,
        contact_window_secs = contact.window.as_secs(),
        inquiry_limit = inquiry.limit,
        inquiry_window_secs = inquiry.window.as_secs(),
        "lead form rate limits"
    );
    axum::serve(listener, app).await?;
    Ok(())
}
