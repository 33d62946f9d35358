use std::sync::Arc;

use crate::client::InvoicingClient;
use crate::dispatcher::{CreateInvoice, ListInvoice, Operation, Outcome, RatioUpdate};
use crate::invoice::{Address, InvoiceStatus};
use crate::policy::Action;
use crate::testutil::{addr, client_with, MemoryLedger};
use crate::views::InvoiceView;

const T: u64 = 1_700_000_000;
const DAY: u64 = 86_400;

fn deployer() -> Address {
    addr("0xd3e")
}

fn issuer() -> Address {
    addr("0xa11ce")
}

fn buyer() -> Address {
    addr("0xb0b")
}

fn setup() -> (Arc<MemoryLedger>, InvoicingClient) {
    let ledger = Arc::new(MemoryLedger::new(deployer()));
    ledger.set_now(T);
    let client = client_with(&ledger, Some(issuer()));
    (ledger, client)
}

async fn switch_to(client: &InvoicingClient, identity: Address) {
    client.session().connect(identity);
    client.invalidate().await;
    client.refresh().await;
}

async fn view_of(client: &InvoicingClient, id: u64) -> InvoiceView {
    client
        .snapshot()
        .await
        .invoices
        .into_iter()
        .find(|v| v.invoice.id == id)
        .unwrap()
}

async fn create(client: &InvoicingClient) -> Outcome {
    client
        .create_invoice(&CreateInvoice {
            amount: "100".to_string(),
            due_date: (T + DAY).to_string(),
            client_name: "Globex".to_string(),
            industry: "Manufacturing".to_string(),
        })
        .await
}

async fn list(client: &InvoicingClient, price: &str) -> Outcome {
    client
        .list_invoice(
            0,
            &ListInvoice {
                price: price.to_string(),
            },
        )
        .await
}

#[tokio::test]
async fn test_scenario_a_create() {
    let (_ledger, client) = setup();

    let outcome = create(&client).await;
    assert!(outcome.is_success(), "{outcome:?}");

    let view = view_of(&client, 0).await;
    assert_eq!(view.invoice.status, InvoiceStatus::Created);
    assert_eq!(view.invoice.investor, None);
    assert_eq!(view.invoice.face_amount, 100_00000000);
    assert_eq!(view.invoice.due_at, T + DAY);
    assert_eq!(view.invoice.issuer, issuer());
    assert_eq!(view.legal_actions.iter().copied().collect::<Vec<_>>(), vec![Action::List]);
}

#[tokio::test]
async fn test_scenario_b_list() {
    let (_ledger, client) = setup();
    create(&client).await;

    let outcome = list(&client, "85").await;
    assert!(outcome.is_success(), "{outcome:?}");

    let view = view_of(&client, 0).await;
    assert_eq!(view.invoice.status, InvoiceStatus::Listed);
    assert_eq!(view.invoice.list_price, 85_00000000);
    assert_eq!(view.list_price_display.as_deref(), Some("85.00"));
    assert!(view.legal_actions.is_empty());
}

#[tokio::test]
async fn test_scenario_c_buy() {
    let (_ledger, client) = setup();
    create(&client).await;
    list(&client, "85").await;

    switch_to(&client, buyer()).await;
    assert!(view_of(&client, 0).await.legal_actions.contains(&Action::Buy));

    let outcome = client.buy_invoice(0).await;
    assert!(outcome.is_success(), "{outcome:?}");

    let snapshot = client.snapshot().await;
    let view = &snapshot.invoices[0];
    assert_eq!(view.invoice.status, InvoiceStatus::Sold);
    assert_eq!(view.invoice.investor, Some(buyer()));
    assert_eq!(snapshot.my_investments.len(), 1);
    assert_eq!(snapshot.my_investments[0].invoice.id, 0);
}

#[tokio::test]
async fn test_scenario_d_default_only_after_due_date() {
    let (ledger, client) = setup();
    create(&client).await;
    list(&client, "85").await;
    switch_to(&client, buyer()).await;
    client.buy_invoice(0).await;

    assert!(!view_of(&client, 0).await.legal_actions.contains(&Action::HandleDefault));
    let early = client.handle_default(0).await;
    assert!(matches!(
        early,
        Outcome::Failed {
            operation: Operation::HandleDefault,
            ..
        }
    ));
    client.refresh().await;
    assert_eq!(view_of(&client, 0).await.invoice.status, InvoiceStatus::Sold);

    ledger.set_now(T + DAY + 1);
    client.refresh().await;
    assert!(view_of(&client, 0).await.legal_actions.contains(&Action::HandleDefault));

    let outcome = client.handle_default(0).await;
    assert!(outcome.is_success(), "{outcome:?}");
    let view = view_of(&client, 0).await;
    assert_eq!(view.invoice.status, InvoiceStatus::Defaulted);
    assert!(view.legal_actions.is_empty());
    assert_eq!(ledger.invoice(0).map(|i| i.status), Some(InvoiceStatus::Defaulted));
}

#[tokio::test]
async fn test_settle_sold_invoice() {
    let (_ledger, client) = setup();
    create(&client).await;
    list(&client, "85").await;
    switch_to(&client, buyer()).await;
    client.buy_invoice(0).await;
    switch_to(&client, issuer()).await;

    let outcome = client.settle_invoice(0).await;
    assert!(outcome.is_success(), "{outcome:?}");
    assert_eq!(view_of(&client, 0).await.invoice.status, InvoiceStatus::Settled);
    assert!(matches!(
        client.settle_invoice(0).await,
        Outcome::Failed { .. }
    ));
}

#[tokio::test]
async fn test_ledger_rejection_from_stale_view() {
    let (ledger, client) = setup();
    create(&client).await;
    list(&client, "85").await;

    let rival = client_with(&ledger, Some(addr("0xc4a5e")));
    rival.refresh().await;
    switch_to(&client, buyer()).await;
    assert!(client.buy_invoice(0).await.is_success());

    // The rival still sees the invoice as Listed and submits; the ledger refuses.
    let before = rival.snapshot().await;
    let outcome = rival.buy_invoice(0).await;
    assert!(matches!(
        outcome,
        Outcome::Failed { operation: Operation::Buy, ref message } if message.contains("rejected")
    ));
    assert_eq!(rival.snapshot().await, before);
    assert_eq!(ledger.invoice(0).and_then(|i| i.investor), Some(buyer()));
}

#[tokio::test]
async fn test_admin_updates_stake_ratio() {
    let (ledger, client) = setup();
    switch_to(&client, deployer()).await;
    assert!(client.snapshot().await.is_admin);

    let outcome = client
        .update_stake_ratio(&RatioUpdate {
            percent: "35".to_string(),
        })
        .await;
    assert!(outcome.is_success(), "{outcome:?}");
    assert_eq!(ledger.stake_ratio_bps(), 3_500);
    assert_eq!(client.snapshot().await.platform.stake_ratio, "35.00%");

    let bad = client
        .update_stake_ratio(&RatioUpdate {
            percent: "140".to_string(),
        })
        .await;
    assert!(matches!(bad, Outcome::Failed { .. }));
    assert_eq!(ledger.stake_ratio_bps(), 3_500);
}
