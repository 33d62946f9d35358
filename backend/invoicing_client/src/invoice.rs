//! Invoice and platform types as reconstructed from the `decentralized_invoicing`
//! Move module.
//!
//! [`RawInvoice`] mirrors the JSON the node returns for the module's `Invoice`
//! struct; [`Invoice`] is the validated client-side form.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::errors::{ClientError, InputError};

/// Hex digits in a canonical account address.
const ADDRESS_HEX_LEN: usize = 64;

// ─────────────────────────────────────────────────────────
// Address
// ─────────────────────────────────────────────────────────

/// A canonical account address: `0x` followed by 64 lowercase hex digits.
///
/// Short forms are zero-padded on parse, so `0x1` and `0x01` compare equal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    pub fn parse(raw: &str) -> Result<Self, InputError> {
        let trimmed = raw.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        if digits.is_empty() || digits.len() > ADDRESS_HEX_LEN {
            return Err(InputError::Address(raw.to_string()));
        }
        let padded = format!("{:0>width$}", digits, width = ADDRESS_HEX_LEN);
        let bytes = hex::decode(&padded).map_err(|_| InputError::Address(raw.to_string()))?;
        Ok(Self(format!("0x{}", hex::encode(bytes))))
    }

    /// Abbreviated form for display, e.g. `0x7920...c61e`.
    pub fn short(&self) -> String {
        let s = &self.0;
        format!("{}...{}", &s[..6], &s[s.len() - 4..])
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Address {
    type Error = InputError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Address> for String {
    fn from(value: Address) -> Self {
        value.0
    }
}

// ─────────────────────────────────────────────────────────
// Status
// ─────────────────────────────────────────────────────────

/// Lifecycle status of an invoice.
///
/// ```text
/// Created ──► Listed ──► Sold ──► Settled
///                          └────► Defaulted
/// ```
///
/// `Settled` and `Defaulted` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Created,
    Listed,
    Sold,
    Settled,
    Defaulted,
}

impl InvoiceStatus {
    /// Decode the `u8` status code stored by the module.
    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            0 => Some(Self::Created),
            1 => Some(Self::Listed),
            2 => Some(Self::Sold),
            3 => Some(Self::Settled),
            4 => Some(Self::Defaulted),
            _ => None,
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            Self::Created => 0,
            Self::Listed => 1,
            Self::Sold => 2,
            Self::Settled => 3,
            Self::Defaulted => 4,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Created => "Created",
            Self::Listed => "Listed",
            Self::Sold => "Sold",
            Self::Settled => "Settled",
            Self::Defaulted => "Defaulted",
        }
    }

    /// Position along the lifecycle as a percentage (0 for `Created`, 100 for `Defaulted`).
    pub fn progress_percent(&self) -> u8 {
        (self.code() * 25).min(100)
    }

    /// Whether an invoice in this status must carry an investor.
    pub fn has_investor(&self) -> bool {
        matches!(self, Self::Sold | Self::Settled | Self::Defaulted)
    }

    /// Whether the list price has been fixed.
    pub fn is_listed(&self) -> bool {
        !matches!(self, Self::Created)
    }
}

// ─────────────────────────────────────────────────────────
// Invoice
// ─────────────────────────────────────────────────────────

/// Move `Option<address>` as serialized by the node: `{"vec": []}` or `{"vec": ["0x…"]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveOption {
    pub vec: Vec<String>,
}

/// Invoice exactly as returned by the `get_invoice` view function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawInvoice {
    #[serde(deserialize_with = "u64_from_json")]
    pub invoice_id: u64,
    pub sme_address: String,
    pub investor_address: MoveOption,
    pub client_name: String,
    pub industry: String,
    #[serde(deserialize_with = "u64_from_json")]
    pub invoice_amount: u64,
    #[serde(deserialize_with = "u64_from_json")]
    pub list_price: u64,
    #[serde(deserialize_with = "u64_from_json")]
    pub due_date_secs: u64,
    #[serde(deserialize_with = "u64_from_json")]
    pub status: u64,
}

/// A validated invoice record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Invoice {
    pub id: u64,
    pub issuer: Address,
    pub investor: Option<Address>,
    pub client_name: String,
    pub industry: String,
    /// Amount owed at settlement, in minor units.
    pub face_amount: u64,
    /// Asking price in minor units; zero until listed.
    pub list_price: u64,
    /// Due date, seconds since the Unix epoch.
    pub due_at: u64,
    pub status: InvoiceStatus,
}

impl Invoice {
    /// True once `now` is strictly past the due date.
    pub fn is_overdue(&self, now: u64) -> bool {
        now > self.due_at
    }

    pub fn is_issued_by(&self, identity: &Address) -> bool {
        &self.issuer == identity
    }

    pub fn is_held_by(&self, identity: &Address) -> bool {
        self.investor.as_ref() == Some(identity)
    }
}

impl TryFrom<RawInvoice> for Invoice {
    type Error = ClientError;

    fn try_from(raw: RawInvoice) -> Result<Self, Self::Error> {
        let id = raw.invoice_id;
        let bad = |what: String| ClientError::Decode(format!("invoice #{id}: {what}"));

        let status = InvoiceStatus::from_code(raw.status)
            .ok_or_else(|| bad(format!("unknown status code {}", raw.status)))?;
        let issuer = Address::parse(&raw.sme_address).map_err(|e| bad(e.to_string()))?;

        if raw.investor_address.vec.len() > 1 {
            return Err(bad("investor option holds more than one value".to_string()));
        }
        let investor = raw
            .investor_address
            .vec
            .first()
            .map(|a| Address::parse(a))
            .transpose()
            .map_err(|e| bad(e.to_string()))?;

        if investor.is_some() != status.has_investor() {
            return Err(bad(format!(
                "investor presence does not match status {}",
                status.label()
            )));
        }

        Ok(Invoice {
            id,
            issuer,
            investor,
            client_name: raw.client_name,
            industry: raw.industry,
            face_amount: raw.invoice_amount,
            list_price: raw.list_price,
            due_at: raw.due_date_secs,
            status,
        })
    }
}

impl From<&Invoice> for RawInvoice {
    fn from(invoice: &Invoice) -> Self {
        RawInvoice {
            invoice_id: invoice.id,
            sme_address: invoice.issuer.to_string(),
            investor_address: MoveOption {
                vec: invoice.investor.iter().map(|a| a.to_string()).collect(),
            },
            client_name: invoice.client_name.clone(),
            industry: invoice.industry.clone(),
            invoice_amount: invoice.face_amount,
            list_price: invoice.list_price,
            due_date_secs: invoice.due_at,
            status: invoice.status.code() as u64,
        }
    }
}

// ─────────────────────────────────────────────────────────
// Platform
// ─────────────────────────────────────────────────────────

/// Process-wide parameters owned by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlatformParameters {
    pub stake_ratio_bps: u64,
    pub pool_contribution_bps: u64,
    pub investor_profit_bps: u64,
    /// Community pool balance, in minor units.
    pub pool_balance: u64,
    /// Platform fees not yet collected, in minor units.
    pub collected_fees: u64,
}

impl Default for PlatformParameters {
    fn default() -> Self {
        Self {
            stake_ratio_bps: 4_000,
            pool_contribution_bps: 400,
            investor_profit_bps: 1_500,
            pool_balance: 0,
            collected_fees: 0,
        }
    }
}

impl PlatformParameters {
    /// `self`'s aggregates combined with the ratio parameters of `current`.
    pub fn with_ratios_of(self, current: &PlatformParameters) -> Self {
        Self {
            stake_ratio_bps: current.stake_ratio_bps,
            pool_contribution_bps: current.pool_contribution_bps,
            investor_profit_bps: current.investor_profit_bps,
            ..self
        }
    }
}

// ─────────────────────────────────────────────────────────
// JSON helpers
// ─────────────────────────────────────────────────────────

/// Read a `u64` the node may encode either as a decimal string or a JSON number.
pub fn value_to_u64(value: &Value) -> Option<u64> {
    match value {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_u64(),
        _ => None,
    }
}

fn u64_from_json<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    value_to_u64(&value)
        .ok_or_else(|| serde::de::Error::custom(format!("expected u64, got {value}")))
}
