//! In-memory stand-in for the invoicing module, used by the unit tests.
//!
//! It answers the same view functions as the node, executes entry functions
//! on finality with the module's lifecycle rules, and doubles as the clock so
//! tests can move time past a due date.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::client::InvoicingClient;
use crate::clock::Clock;
use crate::config::{Config, ModuleId, DEFAULT_NOT_FOUND_ABORT};
use crate::errors::LedgerError;
use crate::fetcher::{GET_COLLECTED_FEES, GET_INVOICE, GET_POOL_BALANCE};
use crate::invoice::{value_to_u64, Address, Invoice, InvoiceStatus, RawInvoice};
use crate::rpc::LedgerReader;
use crate::wallet::{Finalized, PendingHandle, TransitionRequest, Wallet};

pub fn addr(s: &str) -> Address {
    Address::parse(s).unwrap()
}

pub fn test_config(deployer: Address, session: Option<Address>) -> Config {
    Config {
        rpc_url: "http://127.0.0.1:1".to_string(),
        module: ModuleId {
            address: deployer,
            name: "decentralized_invoicing".to_string(),
        },
        not_found_abort: DEFAULT_NOT_FOUND_ABORT.to_string(),
        wallet_url: "http://127.0.0.1:1".to_string(),
        session_address: session,
        api_port: 0,
        http_timeout_secs: 1,
        finality_timeout_secs: 1,
        max_scan_index: 1_000,
    }
}

/// Serve `app` on an ephemeral local port; returns its base URL.
pub async fn serve_stub(app: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    format!("http://{addr}")
}

/// A client whose reader, wallet and clock are all `ledger`.
pub fn client_with(ledger: &Arc<MemoryLedger>, session: Option<Address>) -> InvoicingClient {
    InvoicingClient::new(
        test_config(ledger.admin.clone(), session),
        ledger.clone(),
        ledger.clone(),
        ledger.clone(),
    )
}

#[derive(Default)]
struct LedgerState {
    invoices: Vec<Invoice>,
    pool_balance: u64,
    collected_fees: u64,
    stake_ratio_bps: u64,
    pool_contribution_bps: u64,
    now: u64,
    reads: HashMap<u64, usize>,
    fail_read_at: Option<u64>,
    delays: HashMap<String, Duration>,
    reject_submissions: bool,
    submissions: usize,
    pending: HashMap<String, (Address, TransitionRequest)>,
    next_version: u64,
}

pub struct MemoryLedger {
    admin: Address,
    state: Mutex<LedgerState>,
}

impl MemoryLedger {
    pub fn new(admin: Address) -> Self {
        Self {
            admin,
            state: Mutex::new(LedgerState {
                now: 1_000,
                ..LedgerState::default()
            }),
        }
    }

    /// Append a `Created` invoice directly; returns its id.
    pub fn seed_invoice(&self, issuer: &Address, face_amount: u64, due_at: u64) -> u64 {
        let mut state = self.state.lock().unwrap();
        let id = state.invoices.len() as u64;
        state.invoices.push(Invoice {
            id,
            issuer: issuer.clone(),
            investor: None,
            client_name: format!("Client {id}"),
            industry: "Services".to_string(),
            face_amount,
            list_price: 0,
            due_at,
            status: InvoiceStatus::Created,
        });
        id
    }

    pub fn set_aggregates(&self, pool_balance: u64, collected_fees: u64) {
        let mut state = self.state.lock().unwrap();
        state.pool_balance = pool_balance;
        state.collected_fees = collected_fees;
    }

    /// Make every `get_invoice(index)` fail with a transport error.
    pub fn fail_reads_at(&self, index: u64) {
        self.state.lock().unwrap().fail_read_at = Some(index);
    }

    /// Delay every call of view `function` by `delay` before answering.
    pub fn slow_view(&self, function: &str, delay: Duration) {
        self.state
            .lock()
            .unwrap()
            .delays
            .insert(function.to_string(), delay);
    }

    pub fn reads_of(&self, index: u64) -> usize {
        self.state.lock().unwrap().reads.get(&index).copied().unwrap_or(0)
    }

    pub fn reject_submissions(&self, reject: bool) {
        self.state.lock().unwrap().reject_submissions = reject;
    }

    pub fn submissions(&self) -> usize {
        self.state.lock().unwrap().submissions
    }

    pub fn set_now(&self, now: u64) {
        self.state.lock().unwrap().now = now;
    }

    pub fn invoice(&self, id: u64) -> Option<Invoice> {
        self.state.lock().unwrap().invoices.get(id as usize).cloned()
    }

    pub fn stake_ratio_bps(&self) -> u64 {
        self.state.lock().unwrap().stake_ratio_bps
    }

    pub fn pool_contribution_bps(&self) -> u64 {
        self.state.lock().unwrap().pool_contribution_bps
    }
}

impl Clock for MemoryLedger {
    fn now(&self) -> u64 {
        self.state.lock().unwrap().now
    }
}

#[async_trait]
impl LedgerReader for MemoryLedger {
    async fn view(&self, function: &str, args: Vec<Value>) -> Result<Vec<Value>, LedgerError> {
        let delay = self.state.lock().unwrap().delays.get(function).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state.lock().unwrap();
        match function {
            GET_INVOICE => {
                let id = args
                    .first()
                    .and_then(value_to_u64)
                    .ok_or_else(|| LedgerError::Transport("bad invoice id".to_string()))?;
                *state.reads.entry(id).or_default() += 1;
                if state.fail_read_at == Some(id) {
                    return Err(LedgerError::Transport("connection reset".to_string()));
                }
                let invoice = state.invoices.get(id as usize).ok_or(LedgerError::NotFound)?;
                Ok(vec![serde_json::to_value(RawInvoice::from(invoice)).unwrap()])
            }
            GET_POOL_BALANCE => Ok(vec![json!(state.pool_balance.to_string())]),
            GET_COLLECTED_FEES => Ok(vec![json!(state.collected_fees.to_string())]),
            other => Err(LedgerError::Transport(format!("unknown view function {other}"))),
        }
    }
}

#[async_trait]
impl Wallet for MemoryLedger {
    async fn submit(
        &self,
        sender: &Address,
        request: &TransitionRequest,
    ) -> Result<PendingHandle, LedgerError> {
        let mut state = self.state.lock().unwrap();
        state.submissions += 1;
        if state.reject_submissions {
            return Err(LedgerError::Rejected("user rejected the request".to_string()));
        }
        let hash = format!("0x{:064x}", state.submissions);
        state
            .pending
            .insert(hash.clone(), (sender.clone(), request.clone()));
        Ok(PendingHandle { hash })
    }

    async fn await_finality(&self, handle: &PendingHandle) -> Result<Finalized, LedgerError> {
        let mut state = self.state.lock().unwrap();
        let (sender, request) = state
            .pending
            .remove(&handle.hash)
            .ok_or_else(|| LedgerError::Transport(format!("unknown transaction {}", handle.hash)))?;
        execute(&mut state, &self.admin, &sender, &request).map_err(LedgerError::Rejected)?;
        state.next_version += 1;
        Ok(Finalized {
            hash: handle.hash.clone(),
            version: Some(state.next_version),
            vm_status: "Executed successfully".to_string(),
        })
    }
}

fn arg_u64(request: &TransitionRequest, index: usize) -> Result<u64, String> {
    request
        .arguments
        .get(index)
        .and_then(value_to_u64)
        .ok_or_else(|| format!("argument {index} is not a u64"))
}

fn arg_str(request: &TransitionRequest, index: usize) -> Result<String, String> {
    request
        .arguments
        .get(index)
        .and_then(Value::as_str)
        .map(String::from)
        .ok_or_else(|| format!("argument {index} is not a string"))
}

fn abort(reason: &str) -> String {
    format!("Move abort in 0x1::decentralized_invoicing: {reason}")
}

/// Apply `request` with the module's rules.
fn execute(
    state: &mut LedgerState,
    admin: &Address,
    sender: &Address,
    request: &TransitionRequest,
) -> Result<(), String> {
    let entry = request.function.rsplit("::").next().unwrap_or_default();
    let now = state.now;

    match entry {
        "create_invoice" => {
            let id = state.invoices.len() as u64;
            state.invoices.push(Invoice {
                id,
                issuer: sender.clone(),
                investor: None,
                client_name: arg_str(request, 2)?,
                industry: arg_str(request, 3)?,
                face_amount: arg_u64(request, 0)?,
                list_price: 0,
                due_at: arg_u64(request, 1)?,
                status: InvoiceStatus::Created,
            });
        }
        "list_invoice" | "buy_invoice" | "settle_invoice" | "handle_default" => {
            let id = arg_u64(request, 0)?;
            let invoice = state
                .invoices
                .get_mut(id as usize)
                .ok_or_else(|| abort("E_INVOICE_NOT_FOUND(0x60001)"))?;
            match entry {
                "list_invoice" => {
                    if invoice.status != InvoiceStatus::Created {
                        return Err(abort("E_INVALID_STATUS(0x30002)"));
                    }
                    if &invoice.issuer != sender {
                        return Err(abort("E_NOT_OWNER(0x50003)"));
                    }
                    invoice.list_price = arg_u64(request, 1)?;
                    invoice.status = InvoiceStatus::Listed;
                }
                "buy_invoice" => {
                    if invoice.status != InvoiceStatus::Listed {
                        return Err(abort("E_INVALID_STATUS(0x30002)"));
                    }
                    if &invoice.issuer == sender {
                        return Err(abort("E_SELF_PURCHASE(0x50005)"));
                    }
                    if arg_u64(request, 1)? != invoice.list_price {
                        return Err(abort("E_WRONG_AMOUNT(0x10006)"));
                    }
                    invoice.investor = Some(sender.clone());
                    invoice.status = InvoiceStatus::Sold;
                }
                "settle_invoice" => {
                    if invoice.status != InvoiceStatus::Sold {
                        return Err(abort("E_INVALID_STATUS(0x30002)"));
                    }
                    invoice.status = InvoiceStatus::Settled;
                }
                _ => {
                    if invoice.status != InvoiceStatus::Sold {
                        return Err(abort("E_INVALID_STATUS(0x30002)"));
                    }
                    if invoice.investor.as_ref() != Some(sender) {
                        return Err(abort("E_NOT_INVESTOR(0x50004)"));
                    }
                    if now <= invoice.due_at {
                        return Err(abort("E_NOT_DUE(0x30004)"));
                    }
                    invoice.status = InvoiceStatus::Defaulted;
                }
            }
        }
        "compensate_from_pool" | "collect_fees" | "update_stake_ratio" | "update_pool_contribution" => {
            if sender != admin {
                return Err(abort("E_NOT_ADMIN(0x50001)"));
            }
            match entry {
                "compensate_from_pool" => {
                    let amount = arg_u64(request, 1)?;
                    state.pool_balance = state
                        .pool_balance
                        .checked_sub(amount)
                        .ok_or_else(|| abort("E_INSUFFICIENT_POOL(0x10007)"))?;
                }
                "collect_fees" => state.collected_fees = 0,
                "update_stake_ratio" => state.stake_ratio_bps = arg_u64(request, 0)?,
                _ => state.pool_contribution_bps = arg_u64(request, 0)?,
            }
        }
        other => return Err(format!("unknown entry function {other}")),
    }
    Ok(())
}
