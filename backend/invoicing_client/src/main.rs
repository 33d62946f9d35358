//! Decentralized invoicing client — entry point.
//!
//! Reconstructs invoice state from the `decentralized_invoicing` Move module
//! by scanning its view functions, keeps per-identity views current as the
//! connected wallet changes, and dispatches lifecycle and admin transitions
//! through an external signing service. Everything is exposed over a small
//! Axum REST API for the frontend.

mod amount;
mod api;
mod client;
mod clock;
mod config;
mod dispatcher;
mod errors;
mod fetcher;
mod invoice;
mod policy;
mod rpc;
mod session;
mod views;
mod wallet;

#[cfg(test)]
mod test_lifecycle;
#[cfg(test)]
mod testutil;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use client::InvoicingClient;
use clock::SystemClock;
use config::Config;
use rpc::AptosRpc;
use wallet::HttpWallet;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging (RUST_LOG controls verbosity).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Load optional .env file (ignored if missing).
    let _ = dotenvy::dotenv();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;
    info!("Using module {} via {}", config.module, config.rpc_url);

    // HTTP client shared between the reader and the wallet.
    let http = rpc::http_client(config.http_timeout_secs)?;

    let reader = AptosRpc::new(
        http.clone(),
        config.rpc_url.clone(),
        config.module.clone(),
        config.not_found_abort.clone(),
    );
    let wallet = HttpWallet::new(
        http,
        config.wallet_url.clone(),
        config.rpc_url.clone(),
        Duration::from_secs(config.finality_timeout_secs),
    );
    let client = Arc::new(InvoicingClient::new(
        config.clone(),
        Arc::new(reader),
        Arc::new(wallet),
        Arc::new(SystemClock),
    ));

    // ─── Background tasks ─────────────────────────────────
    let shutdown = CancellationToken::new();
    let watcher = tokio::spawn(client.clone().watch_session(shutdown.clone()));
    tokio::spawn({
        let client = client.clone();
        async move {
            client.refresh().await;
        }
    });

    // ─── REST API ─────────────────────────────────────────
    let api_state = Arc::new(api::ApiState { client });

    let app = Router::new()
        .route("/health", get(api::health))
        .route("/invoices", get(api::get_invoices).post(api::create_invoice))
        .route("/invoices/:id", get(api::get_invoice))
        .route("/invoices/:id/list", post(api::list_invoice))
        .route("/invoices/:id/buy", post(api::buy_invoice))
        .route("/invoices/:id/settle", post(api::settle_invoice))
        .route("/invoices/:id/default", post(api::handle_default))
        .route("/investments", get(api::get_investments))
        .route("/platform", get(api::get_platform))
        .route("/refresh", post(api::refresh))
        .route(
            "/session",
            get(api::get_session)
                .put(api::connect_session)
                .delete(api::disconnect_session),
        )
        .route("/admin/compensate", post(api::compensate))
        .route("/admin/collect-fees", post(api::collect_fees))
        .route("/admin/stake-ratio", post(api::update_stake_ratio))
        .route("/admin/pool-contribution", post(api::update_pool_contribution))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(api_state);

    let addr = format!("0.0.0.0:{}", config.api_port);
    info!("API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown({
            let shutdown = shutdown.clone();
            async move {
                let _ = tokio::signal::ctrl_c().await;
                info!("Shutting down");
                shutdown.cancel();
            }
        })
        .await?;

    shutdown.cancel();
    watcher.await?;
    Ok(())
}
