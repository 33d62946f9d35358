//! Derived views over a fetched invoice set.
//!
//! Every function here is pure. The whole [`Snapshot`] is recomputed after
//! each completed fetch and each session change.

use std::collections::BTreeSet;

use chrono::DateTime;
use serde::Serialize;

use crate::amount::{format_bps, format_minor_units, AGGREGATE_PLACES, INVOICE_PLACES};
use crate::invoice::{Address, Invoice, PlatformParameters};
use crate::policy::{self, Action, AdminAction};

/// Newest invoice first.
pub fn display_order(fetched: &[Invoice]) -> Vec<Invoice> {
    fetched.iter().rev().cloned().collect()
}

/// Invoices held by `session`, in source order.
pub fn my_investments(fetched: &[Invoice], session: Option<&Address>) -> Vec<Invoice> {
    let Some(identity) = session else {
        return Vec::new();
    };
    fetched
        .iter()
        .filter(|invoice| invoice.is_held_by(identity))
        .cloned()
        .collect()
}

pub fn is_admin(session: Option<&Address>, deployer: &Address) -> bool {
    session == Some(deployer)
}

/// `YYYY-MM-DD` in UTC.
pub fn format_due_date(due_at: u64) -> String {
    i64::try_from(due_at)
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| due_at.to_string())
}

// ─────────────────────────────────────────────────────────
// View shapes
// ─────────────────────────────────────────────────────────

/// An invoice as presented, with the transitions the session may perform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvoiceView {
    #[serde(flatten)]
    pub invoice: Invoice,
    pub status_label: &'static str,
    pub progress_percent: u8,
    pub face_amount_display: String,
    /// Present once a list price has been fixed.
    pub list_price_display: Option<String>,
    pub due_date: String,
    pub issuer_short: String,
    pub investor_short: Option<String>,
    pub legal_actions: BTreeSet<Action>,
}

impl InvoiceView {
    pub fn new(invoice: Invoice, session: Option<&Address>, now: u64) -> Self {
        let legal_actions = policy::legal_actions(&invoice, session, now);
        Self {
            status_label: invoice.status.label(),
            progress_percent: invoice.status.progress_percent(),
            face_amount_display: format_minor_units(invoice.face_amount, INVOICE_PLACES),
            list_price_display: invoice
                .status
                .is_listed()
                .then(|| format_minor_units(invoice.list_price, INVOICE_PLACES)),
            due_date: format_due_date(invoice.due_at),
            issuer_short: invoice.issuer.short(),
            investor_short: invoice.investor.as_ref().map(Address::short),
            legal_actions,
            invoice,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlatformView {
    #[serde(flatten)]
    pub params: PlatformParameters,
    pub pool_balance_display: String,
    pub collected_fees_display: String,
    pub stake_ratio: String,
    pub pool_contribution: String,
    pub investor_profit: String,
}

impl From<PlatformParameters> for PlatformView {
    fn from(params: PlatformParameters) -> Self {
        Self {
            pool_balance_display: format_minor_units(params.pool_balance, AGGREGATE_PLACES),
            collected_fees_display: format_minor_units(params.collected_fees, AGGREGATE_PLACES),
            stake_ratio: format_bps(params.stake_ratio_bps),
            pool_contribution: format_bps(params.pool_contribution_bps),
            investor_profit: format_bps(params.investor_profit_bps),
            params,
        }
    }
}

impl Default for PlatformView {
    fn default() -> Self {
        PlatformParameters::default().into()
    }
}

/// Everything the rendering layer needs after one refresh cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    /// Refresh cycle that produced this snapshot.
    pub generation: u64,
    pub session: Option<Address>,
    pub is_admin: bool,
    pub admin_actions: BTreeSet<AdminAction>,
    /// Newest first.
    pub invoices: Vec<InvoiceView>,
    pub my_investments: Vec<InvoiceView>,
    pub platform: PlatformView,
}

/// Derive the full snapshot from a fetched set.
pub fn reduce(
    generation: u64,
    fetched: &[Invoice],
    platform: PlatformParameters,
    session: Option<&Address>,
    deployer: &Address,
    now: u64,
) -> Snapshot {
    let to_views = |invoices: Vec<Invoice>| -> Vec<InvoiceView> {
        invoices
            .into_iter()
            .map(|invoice| InvoiceView::new(invoice, session, now))
            .collect()
    };

    Snapshot {
        generation,
        session: session.cloned(),
        is_admin: is_admin(session, deployer),
        admin_actions: policy::admin_actions(session, deployer),
        invoices: to_views(display_order(fetched)),
        my_investments: to_views(my_investments(fetched, session)),
        platform: platform.into(),
    }
}
