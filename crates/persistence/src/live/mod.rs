//! Live views over store watches.
//!
//! A live view merges one or more underlying watches into a single stream of
//! full result sets. The consumer owns a [`LiveView`]; closing or dropping it
//! cancels every task and watch it opened. Once closed, [`LiveView::next`]
//! yields nothing more, even for updates already buffered.

pub mod aggregator;
pub mod alerts;
pub mod groups;
pub mod invitations;
pub mod locations;

pub use aggregator::Aggregator;
pub use alerts::{watch_group_alerts, watch_user_alerts};
pub use groups::watch_user_groups;
pub use invitations::watch_pending_invitations;
pub use locations::{watch_group_locations, watch_my_location};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Consumer end of a live view.
#[derive(Debug)]
pub struct LiveView<T> {
    name: &'static str,
    updates: mpsc::UnboundedReceiver<Vec<T>>,
    token: CancellationToken,
    closed: bool,
}

impl<T> LiveView<T> {
    pub(crate) fn channel(name: &'static str) -> (Self, Publisher<T>) {
        let (tx, updates) = mpsc::unbounded_channel();
        let token = CancellationToken::new();
        let publisher = Publisher {
            tx,
            token: token.clone(),
        };
        let view = Self {
            name,
            updates,
            token,
            closed: false,
        };
        (view, publisher)
    }

    /// Next merged result set; `None` once the view is closed or every
    /// source has stopped.
    pub async fn next(&mut self) -> Option<Vec<T>> {
        if self.closed {
            return None;
        }
        tokio::select! {
            biased;
            _ = self.token.cancelled() => None,
            update = self.updates.recv() => update,
        }
    }

    /// Stops every underlying watch. Safe to call more than once.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.token.cancel();
        self.updates.close();
        while self.updates.try_recv().is_ok() {}
        debug!(view = self.name, "Live view closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed || self.token.is_cancelled()
    }

    /// Handle that closes this view from another task.
    pub fn disposer(&self) -> Disposer {
        Disposer(self.token.clone())
    }
}

impl<T> Drop for LiveView<T> {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Cloneable close handle of a [`LiveView`].
#[derive(Debug, Clone)]
pub struct Disposer(CancellationToken);

impl Disposer {
    pub fn dispose(&self) {
        self.0.cancel();
    }

    pub fn is_disposed(&self) -> bool {
        self.0.is_cancelled()
    }
}

/// Producer end of a live view.
#[derive(Debug)]
pub(crate) struct Publisher<T> {
    tx: mpsc::UnboundedSender<Vec<T>>,
    token: CancellationToken,
}

impl<T> Clone for Publisher<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            token: self.token.clone(),
        }
    }
}

impl<T> Publisher<T> {
    /// Returns false once the consumer is gone.
    pub(crate) fn publish(&self, items: Vec<T>) -> bool {
        if self.token.is_cancelled() {
            return false;
        }
        self.tx.send(items).is_ok()
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.token.is_cancelled() || self.tx.is_closed()
    }
}
