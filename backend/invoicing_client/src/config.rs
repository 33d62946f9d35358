//! Application configuration loaded from environment variables.

use std::fmt;

use crate::errors::{ClientError, Result};
use crate::invoice::Address;

/// Abort reason the invoicing module raises for an absent invoice.
pub const DEFAULT_NOT_FOUND_ABORT: &str = "E_INVOICE_NOT_FOUND";

/// A published Move module, e.g. `0x7920…::decentralized_invoicing`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleId {
    /// Account the module is published under. This account is the platform admin.
    pub address: Address,
    pub name: String,
}

impl ModuleId {
    /// Fully qualified function id, e.g. `0x…::decentralized_invoicing::get_invoice`.
    pub fn function(&self, name: &str) -> String {
        format!("{}::{}::{}", self.address, self.name, name)
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.address, self.name)
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Fullnode REST endpoint (e.g. https://fullnode.testnet.aptoslabs.com/v1)
    pub rpc_url: String,
    /// The invoicing module; its address is also the deployer identity
    pub module: ModuleId,
    /// Abort reason that marks an absent invoice in a failed view
    pub not_found_abort: String,
    /// Signing service that submits transactions on behalf of the session identity
    pub wallet_url: String,
    /// Identity bound at startup, if any
    pub session_address: Option<Address>,
    /// Port for the REST API server
    pub api_port: u16,
    /// Timeout for a single HTTP request to the node or the wallet
    pub http_timeout_secs: u64,
    /// How long to wait for a submitted transaction to finalize
    pub finality_timeout_secs: u64,
    /// Upper bound on invoice indices read during one scan
    pub max_scan_index: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let module_address = env_var("MODULE_ADDRESS").map_err(|_| {
            ClientError::Config("MODULE_ADDRESS environment variable is required".to_string())
        })?;

        Ok(Config {
            rpc_url: env_var("RPC_URL")
                .unwrap_or_else(|_| "https://fullnode.testnet.aptoslabs.com/v1".to_string())
                .trim_end_matches('/')
                .to_string(),
            module: ModuleId {
                address: Address::parse(&module_address)
                    .map_err(|e| ClientError::Config(format!("Invalid MODULE_ADDRESS: {e}")))?,
                name: env_var("MODULE_NAME")
                    .unwrap_or_else(|_| "decentralized_invoicing".to_string()),
            },
            not_found_abort: env_var("NOT_FOUND_ABORT")
                .unwrap_or_else(|_| DEFAULT_NOT_FOUND_ABORT.to_string()),
            wallet_url: env_var("WALLET_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:8090".to_string())
                .trim_end_matches('/')
                .to_string(),
            session_address: env_var("SESSION_ADDRESS")
                .ok()
                .map(|raw| Address::parse(&raw))
                .transpose()
                .map_err(|e| ClientError::Config(format!("Invalid SESSION_ADDRESS: {e}")))?,
            api_port: env_var("API_PORT")
                .unwrap_or_else(|_| "3001".to_string())
                .parse()
                .map_err(|_| ClientError::Config("Invalid API_PORT".to_string()))?,
            http_timeout_secs: env_var("HTTP_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .map_err(|_| ClientError::Config("Invalid HTTP_TIMEOUT_SECS".to_string()))?,
            finality_timeout_secs: env_var("FINALITY_TIMEOUT_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .map_err(|_| ClientError::Config("Invalid FINALITY_TIMEOUT_SECS".to_string()))?,
            max_scan_index: env_var("MAX_SCAN_INDEX")
                .unwrap_or_else(|_| "10000".to_string())
                .parse()
                .map_err(|_| ClientError::Config("Invalid MAX_SCAN_INDEX".to_string()))?,
        })
    }

    /// The platform admin: the account that published the module.
    pub fn deployer(&self) -> &Address {
        &self.module.address
    }
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| ClientError::Config(format!("Missing env var: {key}")))
}
