//! Application-wide error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invoice decode error: {0}")]
    Decode(String),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

/// Outcome of a ledger read or write that did not succeed.
///
/// `NotFound` is the expected terminator of the invoice scan and must only be
/// produced from a structured signal of the node, never from message text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("record not found")]
    NotFound,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("transaction rejected: {0}")]
    Rejected(String),

    #[error("timed out waiting for finality")]
    Timeout,
}

/// Malformed user input, rejected before anything is submitted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("invalid amount `{0}`")]
    Amount(String),

    #[error("amount must be greater than zero")]
    ZeroAmount,

    #[error("invalid percentage `{0}`")]
    Percent(String),

    #[error("invalid due date `{0}`")]
    DueDate(String),

    #[error("invalid address `{0}`")]
    Address(String),

    #[error("{0} must not be empty")]
    Empty(&'static str),
}

pub type Result<T> = std::result::Result<T, ClientError>;
