//! Ledger read primitive — calls the node's `/view` endpoint for the
//! invoicing module.
//!
//! ## Failure classification
//!
//! * A node error whose `error_code` is `resource_not_found` /
//!   `table_item_not_found` becomes [`LedgerError::NotFound`].
//! * So does a view that aborts with the module's not-found abort reason
//!   (`E_INVOICE_NOT_FOUND` unless configured otherwise) or with any code in
//!   the Move `NOT_FOUND` category.
//! * Everything else (connection errors, rate limits, 5xx, undecodable bodies)
//!   becomes [`LedgerError::Transport`].
//!
//! No retries happen here. Callers decide what a failed read means.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::ModuleId;
use crate::errors::{LedgerError, Result};

/// `vm_error_code` the node reports when execution aborted.
const VM_STATUS_ABORTED: u64 = 4016;

/// Canonical Move error category for "resource does not exist" (`std::error::not_found`).
const ABORT_CATEGORY_NOT_FOUND: u64 = 0x6;

/// Node `error_code` values that mean the queried item is absent.
const NOT_FOUND_ERROR_CODES: &[&str] = &["resource_not_found", "table_item_not_found"];

// ─────────────────────────────────────────────────────────
// Read primitive
// ─────────────────────────────────────────────────────────

/// Read-only access to the invoicing module's view functions.
///
/// Implementations must report an absent record as [`LedgerError::NotFound`]
/// and nothing else as `NotFound`.
#[async_trait]
pub trait LedgerReader: Send + Sync {
    /// Call view function `function` (unqualified, e.g. `get_invoice`).
    async fn view(&self, function: &str, args: Vec<Value>) -> std::result::Result<Vec<Value>, LedgerError>;
}

/// Build the HTTP client shared by the reader and the wallet.
pub fn http_client(timeout_secs: u64) -> Result<Client> {
    Ok(Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

// ─────────────────────────────────────────────────────────
// Node response shapes
// ─────────────────────────────────────────────────────────

/// Error body returned by the node REST API.
#[derive(Debug, Deserialize, Default)]
pub struct ApiError {
    #[serde(default)]
    pub message: String,
    pub error_code: Option<String>,
    pub vm_error_code: Option<u64>,
}

// ─────────────────────────────────────────────────────────
// Node client
// ─────────────────────────────────────────────────────────

pub struct AptosRpc {
    client: Client,
    rpc_url: String,
    module: ModuleId,
    /// Abort reason the module raises for an absent invoice.
    not_found_abort: String,
}

impl AptosRpc {
    pub fn new(
        client: Client,
        rpc_url: impl Into<String>,
        module: ModuleId,
        not_found_abort: impl Into<String>,
    ) -> Self {
        Self {
            client,
            rpc_url: rpc_url.into(),
            module,
            not_found_abort: not_found_abort.into(),
        }
    }
}

#[async_trait]
impl LedgerReader for AptosRpc {
    async fn view(&self, function: &str, args: Vec<Value>) -> std::result::Result<Vec<Value>, LedgerError> {
        let function = self.module.function(function);
        let response = self
            .client
            .post(format!("{}/view", self.rpc_url))
            .json(&json!({
                "function": function,
                "type_arguments": [],
                "arguments": args,
            }))
            .send()
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            let values: Vec<Value> = response
                .json()
                .await
                .map_err(|e| LedgerError::Transport(format!("undecodable view result: {e}")))?;
            debug!("{function} returned {} value(s)", values.len());
            return Ok(values);
        }

        let body: ApiError = response.json().await.unwrap_or_default();
        Err(classify_error(status, &body, &self.not_found_abort))
    }
}

// ─────────────────────────────────────────────────────────
// Failure classification
// ─────────────────────────────────────────────────────────

/// Map a failed node response onto the ledger error taxonomy.
///
/// `not_found_abort` is the abort reason the module uses for an absent record.
pub fn classify_error(status: StatusCode, body: &ApiError, not_found_abort: &str) -> LedgerError {
    if let Some(code) = body.error_code.as_deref() {
        if NOT_FOUND_ERROR_CODES.contains(&code) {
            return LedgerError::NotFound;
        }
    }

    if body.vm_error_code == Some(VM_STATUS_ABORTED) {
        let named = abort_reason(&body.message) == Some(not_found_abort);
        let categorised = abort_code(&body.message).is_some_and(is_not_found_abort);
        if named || categorised {
            return LedgerError::NotFound;
        }
    }

    LedgerError::Transport(format!("{status}: {}", body.message))
}

/// Whether a Move abort code falls in the `NOT_FOUND` category.
///
/// Canonical abort codes pack the category in bits 16..24 (`0x6_0001` is
/// `not_found(1)`).
pub fn is_not_found_abort(code: u64) -> bool {
    (code >> 16) & 0xff == ABORT_CATEGORY_NOT_FOUND
}

/// Extract the abort reason identifier, e.g. `E_INVOICE_NOT_FOUND` from
/// `Move abort in 0x1::m: E_INVOICE_NOT_FOUND(0x2): `.
pub fn abort_reason(vm_status: &str) -> Option<&str> {
    let rest = vm_status.strip_prefix("Move abort in ")?;
    let (_, tail) = rest.split_once(": ")?;
    let (reason, _) = tail.split_once('(')?;
    let reason = reason.trim();
    (!reason.is_empty()).then_some(reason)
}

/// Extract the abort code from a VM status such as
/// `Move abort in 0x1::m: E_NOT_FOUND(0x60001): ` or `Move abort in 0x1::m: 0x60001`.
pub fn abort_code(vm_status: &str) -> Option<u64> {
    let rest = vm_status.strip_prefix("Move abort in ")?;
    let (_, tail) = rest.split_once(": ")?;
    let token = match tail.split_once('(') {
        Some((_, inner)) => inner.split(')').next()?,
        None => tail.split(|c: char| c == ':' || c.is_whitespace()).next()?,
    };
    let hex = token.strip_prefix("0x")?;
    u64::from_str_radix(hex, 16).ok()
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
