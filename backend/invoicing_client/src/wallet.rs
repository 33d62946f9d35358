//! Ledger write primitive — transaction submission and finality.
//!
//! Signing happens outside this process. [`HttpWallet`] hands entry-function
//! payloads to a signing service and then waits on the node for the resulting
//! transaction to finalize.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::errors::LedgerError;
use crate::invoice::{value_to_u64, Address};

/// An entry-function call ready to be signed and submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransitionRequest {
    /// Fully qualified function id.
    pub function: String,
    pub type_arguments: Vec<String>,
    /// Ordered arguments; `u64` values are encoded as decimal strings.
    pub arguments: Vec<Value>,
}

/// Opaque handle of a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingHandle {
    pub hash: String,
}

/// A transaction that has been committed successfully.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finalized {
    pub hash: String,
    pub version: Option<u64>,
    pub vm_status: String,
}

/// Submission and finality on behalf of a signing identity.
///
/// Submitting is not idempotent: each call is a distinct transaction.
#[async_trait]
pub trait Wallet: Send + Sync {
    async fn submit(
        &self,
        sender: &Address,
        request: &TransitionRequest,
    ) -> Result<PendingHandle, LedgerError>;

    /// Wait until the transaction is committed. A committed but failed
    /// transaction is [`LedgerError::Rejected`].
    async fn await_finality(&self, handle: &PendingHandle) -> Result<Finalized, LedgerError>;
}

// ─────────────────────────────────────────────────────────
// HTTP wallet
// ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    hash: String,
}

#[derive(Debug, Deserialize)]
struct WalletError {
    #[serde(default)]
    message: String,
}

/// Transaction as returned by `GET /transactions/wait_by_hash/{hash}`.
#[derive(Debug, Deserialize)]
struct TransactionInfo {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    vm_status: Option<String>,
    #[serde(default)]
    version: Option<Value>,
}

pub struct HttpWallet {
    client: Client,
    wallet_url: String,
    rpc_url: String,
    finality_timeout: Duration,
}

impl HttpWallet {
    pub fn new(
        client: Client,
        wallet_url: impl Into<String>,
        rpc_url: impl Into<String>,
        finality_timeout: Duration,
    ) -> Self {
        Self {
            client,
            wallet_url: wallet_url.into(),
            rpc_url: rpc_url.into(),
            finality_timeout,
        }
    }

    /// One long-poll against the node. `None` means still pending.
    async fn wait_once(&self, hash: &str) -> Result<Option<Finalized>, LedgerError> {
        let response = self
            .client
            .get(format!("{}/transactions/wait_by_hash/{hash}", self.rpc_url))
            .send()
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))?;

        // The node may not have seen the transaction yet.
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(LedgerError::Transport(format!(
                "wait_by_hash returned {}",
                response.status()
            )));
        }

        let tx: TransactionInfo = response
            .json()
            .await
            .map_err(|e| LedgerError::Transport(format!("undecodable transaction: {e}")))?;
        finalize(hash, tx)
    }
}

fn finalize(hash: &str, tx: TransactionInfo) -> Result<Option<Finalized>, LedgerError> {
    if tx.kind == "pending_transaction" {
        return Ok(None);
    }
    let vm_status = tx.vm_status.unwrap_or_default();
    if tx.success != Some(true) {
        return Err(LedgerError::Rejected(vm_status));
    }
    Ok(Some(Finalized {
        hash: hash.to_string(),
        version: tx.version.as_ref().and_then(value_to_u64),
        vm_status,
    }))
}

#[async_trait]
impl Wallet for HttpWallet {
    async fn submit(
        &self,
        sender: &Address,
        request: &TransitionRequest,
    ) -> Result<PendingHandle, LedgerError> {
        let response = self
            .client
            .post(format!("{}/sign_and_submit", self.wallet_url))
            .json(&json!({
                "sender": sender,
                "payload": {
                    "type": "entry_function_payload",
                    "function": request.function,
                    "type_arguments": request.type_arguments,
                    "arguments": request.arguments,
                },
            }))
            .send()
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body: Option<WalletError> = response.json().await.ok();
            let message = body.map(|b| b.message).unwrap_or_default();
            warn!("Wallet refused {}: {status} {message}", request.function);
            return Err(LedgerError::Rejected(format!("{status}: {message}")));
        }

        let body: SubmitResponse = response
            .json()
            .await
            .map_err(|e| LedgerError::Transport(format!("undecodable wallet response: {e}")))?;
        debug!("Submitted {} as {}", request.function, body.hash);
        Ok(PendingHandle { hash: body.hash })
    }

    async fn await_finality(&self, handle: &PendingHandle) -> Result<Finalized, LedgerError> {
        let wait = async {
            loop {
                match self.wait_once(&handle.hash).await {
                    Ok(Some(done)) => return Ok(done),
                    Ok(None) => tokio::time::sleep(Duration::from_millis(500)).await,
                    Err(e) => return Err(e),
                }
            }
        };
        tokio::time::timeout(self.finality_timeout, wait)
            .await
            .map_err(|_| LedgerError::Timeout)?
    }
}
