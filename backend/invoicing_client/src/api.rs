//! Axum REST API handlers.
//!
//! This is the presentation surface: it serves the latest snapshot and turns
//! requests into dispatcher calls. It holds no lifecycle rules of its own;
//! each invoice carries its `legal_actions`.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::client::InvoicingClient;
use crate::dispatcher::{CreateInvoice, Compensate, ListInvoice, Outcome, RatioUpdate};
use crate::fetcher;
use crate::invoice::Address;
use crate::policy::AdminAction;
use crate::views::{InvoiceView, PlatformView};

#[derive(Clone)]
pub struct ApiState {
    pub client: Arc<InvoicingClient>,
}

// ─────────────────────────────────────────────────────────
// Response shapes
// ─────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct InvoicesResponse {
    pub generation: u64,
    pub count: usize,
    pub invoices: Vec<InvoiceView>,
}

#[derive(Serialize)]
pub struct InvoiceResponse {
    pub invoice: InvoiceView,
}

#[derive(Serialize)]
pub struct PlatformResponse {
    pub generation: u64,
    pub platform: PlatformView,
}

#[derive(Serialize)]
pub struct SessionResponse {
    pub address: Option<Address>,
    pub is_admin: bool,
    pub admin_actions: Vec<AdminAction>,
}

#[derive(Serialize)]
pub struct RefreshResponse {
    pub applied: bool,
    pub generation: u64,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Deserialize)]
pub struct ConnectRequest {
    pub address: String,
}

fn error(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

/// `200` on success, `422` on failure, `204` when the action was not available.
fn outcome_response(outcome: Outcome) -> Response {
    match outcome {
        Outcome::Skipped => StatusCode::NO_CONTENT.into_response(),
        Outcome::Succeeded { .. } => (StatusCode::OK, Json(outcome)).into_response(),
        Outcome::Failed { .. } => (StatusCode::UNPROCESSABLE_ENTITY, Json(outcome)).into_response(),
    }
}

// ─────────────────────────────────────────────────────────
// Read handlers
// ─────────────────────────────────────────────────────────

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `GET /invoices`
///
/// All invoices, newest first.
pub async fn get_invoices(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    let snapshot = state.client.snapshot().await;
    Json(InvoicesResponse {
        generation: snapshot.generation,
        count: snapshot.invoices.len(),
        invoices: snapshot.invoices,
    })
}

/// `GET /invoices/:id`
///
/// Reads the invoice straight from the ledger rather than the snapshot.
pub async fn get_invoice(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<u64>,
) -> Response {
    let client = &state.client;
    match fetcher::fetch_invoice(client.reader.as_ref(), id).await {
        Ok(Some(invoice)) => {
            let session = client.session().current();
            let view = InvoiceView::new(invoice, session.as_ref(), client.clock.now());
            (StatusCode::OK, Json(InvoiceResponse { invoice: view })).into_response()
        }
        Ok(None) => error(StatusCode::NOT_FOUND, format!("invoice #{id} not found")),
        Err(e) => error(StatusCode::BAD_GATEWAY, e.to_string()),
    }
}

/// `GET /investments`
///
/// Invoices held by the session identity.
pub async fn get_investments(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    let snapshot = state.client.snapshot().await;
    Json(InvoicesResponse {
        generation: snapshot.generation,
        count: snapshot.my_investments.len(),
        invoices: snapshot.my_investments,
    })
}

/// `GET /platform`
pub async fn get_platform(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    let snapshot = state.client.snapshot().await;
    Json(PlatformResponse {
        generation: snapshot.generation,
        platform: snapshot.platform,
    })
}

/// `POST /refresh`
pub async fn refresh(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    let applied = state.client.refresh().await;
    let generation = state.client.snapshot().await.generation;
    Json(RefreshResponse {
        applied,
        generation,
    })
}

// ─────────────────────────────────────────────────────────
// Session handlers
// ─────────────────────────────────────────────────────────

async fn session_response(client: &InvoicingClient) -> SessionResponse {
    let address = client.session().current();
    let deployer = client.config().deployer();
    SessionResponse {
        is_admin: crate::views::is_admin(address.as_ref(), deployer),
        admin_actions: crate::policy::admin_actions(address.as_ref(), deployer)
            .into_iter()
            .collect(),
        address,
    }
}

/// `GET /session`
pub async fn get_session(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    Json(session_response(&state.client).await)
}

/// `PUT /session`
///
/// Called by the wallet connector when an account connects or switches.
pub async fn connect_session(
    State(state): State<Arc<ApiState>>,
    Json(body): Json<ConnectRequest>,
) -> Response {
    match Address::parse(&body.address) {
        Ok(address) => {
            state.client.session().connect(address);
            Json(session_response(&state.client).await).into_response()
        }
        Err(e) => error(StatusCode::BAD_REQUEST, e.to_string()),
    }
}

/// `DELETE /session`
pub async fn disconnect_session(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    state.client.session().disconnect();
    Json(session_response(&state.client).await)
}

// ─────────────────────────────────────────────────────────
// Transition handlers
// ─────────────────────────────────────────────────────────

/// `POST /invoices`
pub async fn create_invoice(
    State(state): State<Arc<ApiState>>,
    Json(body): Json<CreateInvoice>,
) -> Response {
    outcome_response(state.client.create_invoice(&body).await)
}

/// `POST /invoices/:id/list`
pub async fn list_invoice(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<u64>,
    Json(body): Json<ListInvoice>,
) -> Response {
    outcome_response(state.client.list_invoice(id, &body).await)
}

/// `POST /invoices/:id/buy`
pub async fn buy_invoice(State(state): State<Arc<ApiState>>, Path(id): Path<u64>) -> Response {
    outcome_response(state.client.buy_invoice(id).await)
}

/// `POST /invoices/:id/settle`
pub async fn settle_invoice(State(state): State<Arc<ApiState>>, Path(id): Path<u64>) -> Response {
    outcome_response(state.client.settle_invoice(id).await)
}

/// `POST /invoices/:id/default`
pub async fn handle_default(State(state): State<Arc<ApiState>>, Path(id): Path<u64>) -> Response {
    outcome_response(state.client.handle_default(id).await)
}

/// `POST /admin/compensate`
pub async fn compensate(
    State(state): State<Arc<ApiState>>,
    Json(body): Json<Compensate>,
) -> Response {
    outcome_response(state.client.compensate_from_pool(&body).await)
}

/// `POST /admin/collect-fees`
pub async fn collect_fees(State(state): State<Arc<ApiState>>) -> Response {
    outcome_response(state.client.collect_fees().await)
}

/// `POST /admin/stake-ratio`
pub async fn update_stake_ratio(
    State(state): State<Arc<ApiState>>,
    Json(body): Json<RatioUpdate>,
) -> Response {
    outcome_response(state.client.update_stake_ratio(&body).await)
}

/// `POST /admin/pool-contribution`
pub async fn update_pool_contribution(
    State(state): State<Arc<ApiState>>,
    Json(body): Json<RatioUpdate>,
) -> Response {
    outcome_response(state.client.update_pool_contribution(&body).await)
}
