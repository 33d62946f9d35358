//! The invoicing client: owns the reconstructed view and runs refresh cycles.
//!
//! ## Refresh cycles
//!
//! Each cycle takes the next generation number when it starts. A cycle's
//! result is applied only if no cycle with a higher generation has been
//! applied already, so a slow scan can never overwrite newer state. A session
//! change also takes a generation, which voids every cycle started under the
//! previous identity.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::config::Config;
use crate::fetcher;
use crate::invoice::{Address, Invoice, PlatformParameters};
use crate::rpc::LedgerReader;
use crate::session::SessionBinding;
use crate::views::{self, Snapshot};
use crate::wallet::Wallet;

/// State replaced wholesale at the end of each applied cycle.
#[derive(Debug, Default)]
pub(crate) struct ViewState {
    pub applied_generation: u64,
    /// Fetched invoices in ascending id order.
    pub fetched: Vec<Invoice>,
    pub platform: PlatformParameters,
    pub snapshot: Snapshot,
}

pub struct InvoicingClient {
    pub(crate) config: Config,
    pub(crate) reader: Arc<dyn LedgerReader>,
    pub(crate) wallet: Arc<dyn Wallet>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) session: SessionBinding,
    pub(crate) state: RwLock<ViewState>,
    generation: AtomicU64,
}

impl InvoicingClient {
    pub fn new(
        config: Config,
        reader: Arc<dyn LedgerReader>,
        wallet: Arc<dyn Wallet>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let session = SessionBinding::new(config.session_address.clone());
        Self {
            config,
            reader,
            wallet,
            clock,
            session,
            state: RwLock::new(ViewState::default()),
            generation: AtomicU64::new(0),
        }
    }

    pub fn session(&self) -> &SessionBinding {
        &self.session
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The most recently applied snapshot.
    pub async fn snapshot(&self) -> Snapshot {
        self.state.read().await.snapshot.clone()
    }

    /// Last fetched copy of invoice `id`, if it is in the current view.
    pub(crate) async fn known_invoice(&self, id: u64) -> Option<Invoice> {
        self.state
            .read()
            .await
            .fetched
            .iter()
            .find(|invoice| invoice.id == id)
            .cloned()
    }

    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Run one full fetch + reduce cycle.
    ///
    /// Returns `true` if the result was applied, `false` if a newer cycle
    /// had already been applied.
    pub async fn refresh(&self) -> bool {
        let generation = self.next_generation();
        let session = self.session.current();
        debug!("Refresh cycle {generation} started");

        let fetched =
            fetcher::fetch_all_invoices(self.reader.as_ref(), self.config.max_scan_index).await;
        let previous = self.state.read().await.platform;
        let platform = fetcher::fetch_platform(self.reader.as_ref(), previous).await;

        self.apply(generation, session.as_ref(), fetched, platform).await
    }

    async fn apply(
        &self,
        generation: u64,
        session: Option<&Address>,
        fetched: Vec<Invoice>,
        platform: PlatformParameters,
    ) -> bool {
        let mut state = self.state.write().await;
        if generation <= state.applied_generation {
            debug!(
                "Discarding refresh cycle {generation}; cycle {} already applied",
                state.applied_generation
            );
            return false;
        }

        // Ratios are set locally only; keep the current ones.
        let platform = platform.with_ratios_of(&state.platform);
        state.snapshot = views::reduce(
            generation,
            &fetched,
            platform,
            session,
            self.config.deployer(),
            self.clock.now(),
        );
        state.applied_generation = generation;
        state.fetched = fetched;
        state.platform = platform;
        info!(
            "Applied refresh cycle {generation}: {} invoice(s), {} investment(s)",
            state.snapshot.invoices.len(),
            state.snapshot.my_investments.len()
        );
        true
    }

    /// Drop every derived view and void in-flight cycles.
    pub async fn invalidate(&self) {
        let generation = self.next_generation();
        let session = self.session.current();
        let mut state = self.state.write().await;
        if generation <= state.applied_generation {
            debug!(
                "Skipping invalidation {generation}; cycle {} already applied",
                state.applied_generation
            );
            return;
        }
        state.snapshot = views::reduce(
            generation,
            &[],
            state.platform,
            session.as_ref(),
            self.config.deployer(),
            self.clock.now(),
        );
        state.applied_generation = generation;
        state.fetched.clear();
    }

    /// Record a ratio change the ledger has no view function for.
    pub(crate) async fn update_platform(&self, update: impl FnOnce(&mut PlatformParameters)) {
        let mut state = self.state.write().await;
        update(&mut state.platform);
        state.snapshot.platform = state.platform.into();
    }

    /// Rebuild views and refetch on every session change until `shutdown` fires.
    ///
    /// Subscribes before returning, so changes made after this call are never missed.
    pub fn watch_session(
        self: Arc<Self>,
        shutdown: CancellationToken,
    ) -> impl Future<Output = ()> + Send {
        let mut rx = self.session.subscribe();
        async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    changed = rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let identity = rx.borrow_and_update().clone();
                        info!(
                            "Session changed to {}; refreshing",
                            identity.as_ref().map_or("none".to_string(), Address::to_string)
                        );
                        self.invalidate().await;
                        self.refresh().await;
                    }
                }
            }
            debug!("Session watcher stopped");
        }
    }
}
