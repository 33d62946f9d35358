//! Binding to the externally connected wallet identity.
//!
//! The identity is published on a [`watch`] channel. The client subscribes to
//! it and rebuilds every derived view whenever it changes.

use tokio::sync::watch;
use tracing::info;

use crate::invoice::Address;

pub struct SessionBinding {
    tx: watch::Sender<Option<Address>>,
}

impl SessionBinding {
    pub fn new(initial: Option<Address>) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    /// The currently bound identity, if any.
    pub fn current(&self) -> Option<Address> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Address>> {
        self.tx.subscribe()
    }

    /// Bind `identity`. Returns `false` when it was already bound.
    pub fn connect(&self, identity: Address) -> bool {
        self.replace(Some(identity))
    }

    /// Clear the bound identity. Returns `false` when none was bound.
    pub fn disconnect(&self) -> bool {
        self.replace(None)
    }

    fn replace(&self, identity: Option<Address>) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == identity {
                return false;
            }
            *current = identity.clone();
            true
        });
        if changed {
            match &identity {
                Some(address) => info!("Session bound to {address}"),
                None => info!("Session cleared"),
            }
        }
        changed
    }
}
