//! Lifecycle and admin transitions.
//!
//! Every operation follows the same path:
//!
//! ```text
//! session bound? ── no ──► Outcome::Skipped
//!      │ yes
//! validate input + build TransitionRequest ── bad ──► Outcome::Failed
//!      │
//! Wallet::submit ──► Wallet::await_finality ── error ──► Outcome::Failed
//!      │ final
//! refresh cycle ──► Outcome::Succeeded
//! ```
//!
//! Failures never touch the view and are never retried.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::amount::{parse_display_amount, percent_to_bps};
use crate::client::InvoicingClient;
use crate::config::ModuleId;
use crate::errors::InputError;
use crate::invoice::{Address, Invoice};
use crate::policy::{self, Action};
use crate::views;
use crate::wallet::{Finalized, TransitionRequest};

/// Coin type the module is instantiated with for payments.
pub const APTOS_COIN: &str = "0x1::aptos_coin::AptosCoin";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Create,
    List,
    Buy,
    Settle,
    HandleDefault,
    Compensate,
    CollectFees,
    UpdateStakeRatio,
    UpdatePoolContribution,
}

impl Operation {
    /// Entry function of the invoicing module.
    pub fn entry_function(&self) -> &'static str {
        match self {
            Self::Create => "create_invoice",
            Self::List => "list_invoice",
            Self::Buy => "buy_invoice",
            Self::Settle => "settle_invoice",
            Self::HandleDefault => "handle_default",
            Self::Compensate => "compensate_from_pool",
            Self::CollectFees => "collect_fees",
            Self::UpdateStakeRatio => "update_stake_ratio",
            Self::UpdatePoolContribution => "update_pool_contribution",
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            Self::Create => "creating invoice",
            Self::List => "listing invoice",
            Self::Buy => "buying invoice",
            Self::Settle => "settling invoice",
            Self::HandleDefault => "handling default",
            Self::Compensate => "compensating investor",
            Self::CollectFees => "collecting fees",
            Self::UpdateStakeRatio => "updating stake ratio",
            Self::UpdatePoolContribution => "updating pool contribution",
        }
    }

    fn success_message(&self) -> &'static str {
        match self {
            Self::Create => "Invoice created successfully!",
            Self::List => "Invoice listed successfully!",
            Self::Buy => "Invoice purchased successfully!",
            Self::Settle => "Invoice settled successfully!",
            Self::HandleDefault => "Invoice default handled successfully.",
            Self::Compensate => "Investor compensated successfully!",
            Self::CollectFees => "Fees collected successfully!",
            Self::UpdateStakeRatio => "Stake ratio updated successfully!",
            Self::UpdatePoolContribution => "Pool contribution updated successfully!",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(
            self,
            Self::Compensate | Self::CollectFees | Self::UpdateStakeRatio | Self::UpdatePoolContribution
        )
    }
}

/// User-visible result of a transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// No session, or a non-admin session attempting an admin operation.
    Skipped,
    Succeeded {
        operation: Operation,
        message: String,
        tx_hash: String,
    },
    Failed {
        operation: Operation,
        message: String,
    },
}

impl Outcome {
    fn failed(operation: Operation, message: impl Into<String>) -> Self {
        Self::Failed {
            operation,
            message: message.into(),
        }
    }

    fn succeeded(operation: Operation, finalized: Finalized) -> Self {
        Self::Succeeded {
            operation,
            message: operation.success_message().to_string(),
            tx_hash: finalized.hash,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }
}

// ─────────────────────────────────────────────────────────
// Input shapes
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct CreateInvoice {
    /// Face amount in display units.
    pub amount: String,
    /// `YYYY-MM-DD` or epoch seconds.
    pub due_date: String,
    pub client_name: String,
    pub industry: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListInvoice {
    /// List price in display units.
    pub price: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Compensate {
    pub investor: String,
    /// Amount in display units.
    pub amount: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RatioUpdate {
    /// New value as a percentage.
    pub percent: String,
}

// ─────────────────────────────────────────────────────────
// Request builders
// ─────────────────────────────────────────────────────────

fn request(module: &ModuleId, operation: Operation, arguments: Vec<Value>) -> TransitionRequest {
    TransitionRequest {
        function: module.function(operation.entry_function()),
        type_arguments: Vec::new(),
        arguments,
    }
}

fn u64_arg(value: u64) -> Value {
    json!(value.to_string())
}

/// Parse a due date given as `YYYY-MM-DD` (midnight UTC) or epoch seconds.
pub fn parse_due_date(text: &str) -> Result<u64, InputError> {
    let text = text.trim();
    if let Ok(secs) = text.parse::<u64>() {
        return Ok(secs);
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc().timestamp())
        .and_then(|secs| u64::try_from(secs).ok())
        .ok_or_else(|| InputError::DueDate(text.to_string()))
}

fn non_empty(value: &str, field: &'static str) -> Result<String, InputError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(InputError::Empty(field));
    }
    Ok(trimmed.to_string())
}

pub fn build_create(module: &ModuleId, input: &CreateInvoice) -> Result<TransitionRequest, InputError> {
    let amount = parse_display_amount(&input.amount)?;
    let due_at = parse_due_date(&input.due_date)?;
    let client_name = non_empty(&input.client_name, "client name")?;
    let industry = non_empty(&input.industry, "industry")?;
    Ok(request(
        module,
        Operation::Create,
        vec![u64_arg(amount), u64_arg(due_at), json!(client_name), json!(industry)],
    ))
}

pub fn build_list(module: &ModuleId, id: u64, input: &ListInvoice) -> Result<TransitionRequest, InputError> {
    let price = parse_display_amount(&input.price)?;
    Ok(request(module, Operation::List, vec![u64_arg(id), u64_arg(price)]))
}

/// Buying pays exactly the list price already on the ledger.
pub fn build_buy(module: &ModuleId, invoice: &Invoice) -> TransitionRequest {
    TransitionRequest {
        type_arguments: vec![APTOS_COIN.to_string()],
        ..request(
            module,
            Operation::Buy,
            vec![u64_arg(invoice.id), u64_arg(invoice.list_price)],
        )
    }
}

/// Settling repays the full face amount.
pub fn build_settle(module: &ModuleId, invoice: &Invoice) -> TransitionRequest {
    TransitionRequest {
        type_arguments: vec![APTOS_COIN.to_string()],
        ..request(
            module,
            Operation::Settle,
            vec![u64_arg(invoice.id), u64_arg(invoice.face_amount)],
        )
    }
}

pub fn build_handle_default(module: &ModuleId, id: u64) -> TransitionRequest {
    request(module, Operation::HandleDefault, vec![u64_arg(id)])
}

pub fn build_compensate(module: &ModuleId, input: &Compensate) -> Result<TransitionRequest, InputError> {
    let investor = Address::parse(&input.investor)?;
    let amount = parse_display_amount(&input.amount)?;
    Ok(request(
        module,
        Operation::Compensate,
        vec![json!(investor), u64_arg(amount)],
    ))
}

pub fn build_collect_fees(module: &ModuleId) -> TransitionRequest {
    request(module, Operation::CollectFees, Vec::new())
}

pub fn build_ratio_update(
    module: &ModuleId,
    operation: Operation,
    bps: u64,
) -> TransitionRequest {
    request(module, operation, vec![u64_arg(bps)])
}

// ─────────────────────────────────────────────────────────
// Dispatch
// ─────────────────────────────────────────────────────────

impl InvoicingClient {
    /// The identity to act as, or `None` if the operation's precondition is unmet.
    fn acting_identity(&self, operation: Operation) -> Option<Address> {
        let identity = self.session.current()?;
        if operation.is_admin() && !views::is_admin(Some(&identity), self.config.deployer()) {
            debug!("Ignoring {operation:?}: {identity} is not the platform admin");
            return None;
        }
        Some(identity)
    }

    /// Look up `id` in the current view and check `action` is on offer.
    async fn offered_invoice(
        &self,
        operation: Operation,
        action: Action,
        id: u64,
        identity: &Address,
    ) -> Result<Invoice, Outcome> {
        let invoice = self.known_invoice(id).await.ok_or_else(|| {
            Outcome::failed(
                operation,
                format!("Error {}: invoice #{id} is not in the current view.", operation.describe()),
            )
        })?;
        if !policy::is_legal(action, &invoice, Some(identity), self.clock.now()) {
            warn!("Refusing {operation:?} on invoice #{id} in status {}", invoice.status.label());
            return Err(Outcome::failed(
                operation,
                format!(
                    "Error {}: not allowed for invoice #{id} while it is {}.",
                    operation.describe(),
                    invoice.status.label()
                ),
            ));
        }
        Ok(invoice)
    }

    /// Validate, submit and await finality.
    async fn execute(
        &self,
        operation: Operation,
        sender: &Address,
        request: Result<TransitionRequest, InputError>,
    ) -> Result<Finalized, Outcome> {
        let request = request.map_err(|e| {
            warn!("Rejected {operation:?} input: {e}");
            Outcome::failed(operation, format!("Invalid input: {e}."))
        })?;

        info!("Submitting {} as {sender}", request.function);
        let handle = self.wallet.submit(sender, &request).await.map_err(|e| {
            error!("{operation:?} submission failed: {e}");
            Outcome::failed(operation, format!("Error {}: {e}.", operation.describe()))
        })?;

        let finalized = self.wallet.await_finality(&handle).await.map_err(|e| {
            error!("{operation:?} transaction {} failed: {e}", handle.hash);
            Outcome::failed(operation, format!("Error {}: {e}.", operation.describe()))
        })?;
        info!(
            "{operation:?} finalized in {} at version {} ({})",
            finalized.hash,
            finalized.version.map_or("?".to_string(), |v| v.to_string()),
            finalized.vm_status
        );
        Ok(finalized)
    }

    /// Submit, await finality, refresh.
    async fn dispatch(
        &self,
        operation: Operation,
        sender: &Address,
        request: Result<TransitionRequest, InputError>,
    ) -> Outcome {
        match self.execute(operation, sender, request).await {
            Ok(finalized) => {
                self.refresh().await;
                Outcome::succeeded(operation, finalized)
            }
            Err(outcome) => outcome,
        }
    }

    pub async fn create_invoice(&self, input: &CreateInvoice) -> Outcome {
        let operation = Operation::Create;
        let Some(identity) = self.acting_identity(operation) else {
            return Outcome::Skipped;
        };
        let request = build_create(&self.config.module, input);
        self.dispatch(operation, &identity, request).await
    }

    pub async fn list_invoice(&self, id: u64, input: &ListInvoice) -> Outcome {
        let operation = Operation::List;
        let Some(identity) = self.acting_identity(operation) else {
            return Outcome::Skipped;
        };
        if let Err(outcome) = self.offered_invoice(operation, Action::List, id, &identity).await {
            return outcome;
        }
        let request = build_list(&self.config.module, id, input);
        self.dispatch(operation, &identity, request).await
    }

    pub async fn buy_invoice(&self, id: u64) -> Outcome {
        let operation = Operation::Buy;
        let Some(identity) = self.acting_identity(operation) else {
            return Outcome::Skipped;
        };
        let invoice = match self.offered_invoice(operation, Action::Buy, id, &identity).await {
            Ok(invoice) => invoice,
            Err(outcome) => return outcome,
        };
        let request = build_buy(&self.config.module, &invoice);
        self.dispatch(operation, &identity, Ok(request)).await
    }

    pub async fn settle_invoice(&self, id: u64) -> Outcome {
        let operation = Operation::Settle;
        let Some(identity) = self.acting_identity(operation) else {
            return Outcome::Skipped;
        };
        let invoice = match self.offered_invoice(operation, Action::Settle, id, &identity).await {
            Ok(invoice) => invoice,
            Err(outcome) => return outcome,
        };
        let request = build_settle(&self.config.module, &invoice);
        self.dispatch(operation, &identity, Ok(request)).await
    }

    pub async fn handle_default(&self, id: u64) -> Outcome {
        let operation = Operation::HandleDefault;
        let Some(identity) = self.acting_identity(operation) else {
            return Outcome::Skipped;
        };
        if let Err(outcome) = self
            .offered_invoice(operation, Action::HandleDefault, id, &identity)
            .await
        {
            return outcome;
        }
        let request = build_handle_default(&self.config.module, id);
        self.dispatch(operation, &identity, Ok(request)).await
    }

    pub async fn compensate_from_pool(&self, input: &Compensate) -> Outcome {
        let operation = Operation::Compensate;
        let Some(identity) = self.acting_identity(operation) else {
            return Outcome::Skipped;
        };
        let request = build_compensate(&self.config.module, input);
        self.dispatch(operation, &identity, request).await
    }

    pub async fn collect_fees(&self) -> Outcome {
        let operation = Operation::CollectFees;
        let Some(identity) = self.acting_identity(operation) else {
            return Outcome::Skipped;
        };
        let request = build_collect_fees(&self.config.module);
        self.dispatch(operation, &identity, Ok(request)).await
    }

    pub async fn update_stake_ratio(&self, input: &RatioUpdate) -> Outcome {
        self.update_ratio(Operation::UpdateStakeRatio, input).await
    }

    pub async fn update_pool_contribution(&self, input: &RatioUpdate) -> Outcome {
        self.update_ratio(Operation::UpdatePoolContribution, input).await
    }

    async fn update_ratio(&self, operation: Operation, input: &RatioUpdate) -> Outcome {
        let Some(identity) = self.acting_identity(operation) else {
            return Outcome::Skipped;
        };
        let bps = match percent_to_bps(&input.percent) {
            Ok(bps) => bps,
            Err(e) => return self.dispatch(operation, &identity, Err(e)).await,
        };
        let request = build_ratio_update(&self.config.module, operation, bps);
        let finalized = match self.execute(operation, &identity, Ok(request)).await {
            Ok(finalized) => finalized,
            Err(outcome) => return outcome,
        };

        // No view function exposes the ratios, so record them before refreshing.
        self.update_platform(|params| match operation {
            Operation::UpdateStakeRatio => params.stake_ratio_bps = bps,
            _ => params.pool_contribution_bps = bps,
        })
        .await;
        self.refresh().await;
        Outcome::succeeded(operation, finalized)
    }
}
