//! Which lifecycle transitions are offered for an invoice.
//!
//! The ledger is authoritative; this mirrors its rules so the client never
//! offers, or submits, a transition it already knows is illegal.
//!
//! | Action          | Offered when                                         |
//! |-----------------|------------------------------------------------------|
//! | `List`          | `Created`, caller is the issuer                      |
//! | `Buy`           | `Listed`, caller is not the issuer                   |
//! | `Settle`        | `Sold`                                               |
//! | `HandleDefault` | `Sold`, caller is the investor, due date has passed  |

use std::collections::BTreeSet;

use serde::Serialize;

use crate::invoice::{Address, Invoice, InvoiceStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    List,
    Buy,
    Settle,
    HandleDefault,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminAction {
    Compensate,
    CollectFees,
    UpdateStakeRatio,
    UpdatePoolContribution,
}

impl AdminAction {
    pub const ALL: [AdminAction; 4] = [
        Self::Compensate,
        Self::CollectFees,
        Self::UpdateStakeRatio,
        Self::UpdatePoolContribution,
    ];
}

/// Transitions `session` may perform on `invoice` at time `now`.
pub fn legal_actions(invoice: &Invoice, session: Option<&Address>, now: u64) -> BTreeSet<Action> {
    let mut actions = BTreeSet::new();
    let Some(caller) = session else {
        return actions;
    };

    match invoice.status {
        InvoiceStatus::Created if invoice.is_issued_by(caller) => {
            actions.insert(Action::List);
        }
        InvoiceStatus::Listed if !invoice.is_issued_by(caller) => {
            actions.insert(Action::Buy);
        }
        InvoiceStatus::Sold => {
            actions.insert(Action::Settle);
            if invoice.is_held_by(caller) && invoice.is_overdue(now) {
                actions.insert(Action::HandleDefault);
            }
        }
        _ => {}
    }
    actions
}

pub fn is_legal(action: Action, invoice: &Invoice, session: Option<&Address>, now: u64) -> bool {
    legal_actions(invoice, session, now).contains(&action)
}

/// Platform administration is open to the deployer only.
pub fn admin_actions(session: Option<&Address>, deployer: &Address) -> BTreeSet<AdminAction> {
    if session == Some(deployer) {
        AdminAction::ALL.into_iter().collect()
    } else {
        BTreeSet::new()
    }
}
