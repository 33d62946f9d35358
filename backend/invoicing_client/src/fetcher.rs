//! Reconstructs invoice and platform state from the module's view functions.
//!
//! The module has no listing view, so invoices are enumerated by reading
//! `get_invoice(0)`, `get_invoice(1)`, … until the first absent id.

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::errors::{ClientError, LedgerError, Result};
use crate::invoice::{value_to_u64, Invoice, PlatformParameters, RawInvoice};
use crate::rpc::LedgerReader;

pub const GET_INVOICE: &str = "get_invoice";
pub const GET_POOL_BALANCE: &str = "get_pool_balance";
pub const GET_COLLECTED_FEES: &str = "get_collected_fees";

/// Read every invoice in ascending id order.
///
/// Stops at the first absent id, at `max_index`, or at the first read that
/// fails for any other reason. A failed read is logged and the invoices read
/// so far are returned; the scan is never retried here.
pub async fn fetch_all_invoices(reader: &dyn LedgerReader, max_index: u64) -> Vec<Invoice> {
    let mut invoices = Vec::new();
    let mut index = 0u64;

    loop {
        if index >= max_index {
            warn!("Invoice scan hit MAX_SCAN_INDEX ({max_index}); result may be incomplete");
            break;
        }
        match fetch_invoice(reader, index).await {
            Ok(Some(invoice)) => {
                invoices.push(invoice);
                index += 1;
            }
            Ok(None) => {
                debug!("Invoice scan reached the end at index {index}");
                break;
            }
            Err(e) => {
                warn!("Invoice scan stopped at index {index}: {e}");
                break;
            }
        }
    }

    info!("Fetched {} invoice(s)", invoices.len());
    invoices
}

/// Read a single invoice. An absent id is `Ok(None)`.
pub async fn fetch_invoice(reader: &dyn LedgerReader, id: u64) -> Result<Option<Invoice>> {
    let values = match reader.view(GET_INVOICE, vec![json!(id.to_string())]).await {
        Ok(values) => values,
        Err(LedgerError::NotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let first = values
        .into_iter()
        .next()
        .ok_or_else(|| ClientError::Decode(format!("{GET_INVOICE}({id}) returned no value")))?;
    let raw: RawInvoice = serde_json::from_value(first)?;
    if raw.invoice_id != id {
        return Err(ClientError::Decode(format!(
            "{GET_INVOICE}({id}) returned invoice #{}",
            raw.invoice_id
        )));
    }
    Ok(Some(Invoice::try_from(raw)?))
}

/// Refresh the pool balance and collected fees on top of `previous`.
///
/// The ratio parameters have no view function and are carried over. A failed
/// aggregate read keeps the previous value.
pub async fn fetch_platform(
    reader: &dyn LedgerReader,
    previous: PlatformParameters,
) -> PlatformParameters {
    let mut params = previous;

    match read_u64(reader, GET_POOL_BALANCE).await {
        Ok(balance) => params.pool_balance = balance,
        Err(e) => warn!("Failed to read pool balance: {e}"),
    }
    match read_u64(reader, GET_COLLECTED_FEES).await {
        Ok(fees) => params.collected_fees = fees,
        Err(e) => warn!("Failed to read collected fees: {e}"),
    }

    params
}

async fn read_u64(reader: &dyn LedgerReader, function: &str) -> Result<u64> {
    let values: Vec<Value> = reader.view(function, Vec::new()).await?;
    values
        .first()
        .and_then(value_to_u64)
        .ok_or_else(|| ClientError::Decode(format!("{function} did not return a u64")))
}
