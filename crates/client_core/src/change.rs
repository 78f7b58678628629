//! Change notification shared by the stores.

use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, PoisonError,
    },
};

use tokio::sync::broadcast;
use tracing::debug;

const CHANGE_CHANNEL_CAPACITY: usize = 64;

type Listener = Arc<dyn Fn() + Send + Sync>;

/// Capability returned by `add_change_listener`; hand it back to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerToken(u64);

/// Broadcast payload for async subscribers. Carries no data: re-read the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreChange {
    pub store: &'static str,
    pub revision: u64,
}

pub struct ChangeNotifier {
    store: &'static str,
    listeners: Mutex<Vec<(ListenerToken, Listener)>>,
    next_token: AtomicU64,
    revision: AtomicU64,
    events: broadcast::Sender<StoreChange>,
}

impl fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("store", &self.store)
            .field("listeners", &self.listener_count())
            .field("revision", &self.revision())
            .finish()
    }
}

impl ChangeNotifier {
    pub fn new(store: &'static str) -> Self {
        let (events, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            store,
            listeners: Mutex::new(Vec::new()),
            next_token: AtomicU64::new(0),
            revision: AtomicU64::new(0),
            events,
        }
    }

    pub fn add_listener<F>(&self, listener: F) -> ListenerToken
    where
        F: Fn() + Send + Sync + 'static,
    {
        let token = ListenerToken(self.next_token.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((token, Arc::new(listener)));
        token
    }

    pub fn remove_listener(&self, token: ListenerToken) -> bool {
        let mut listeners = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|(registered, _)| *registered != token);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.events.subscribe()
    }

    /// Number of changes emitted so far.
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }

    /// Callers must not hold the store's state lock here: listeners read it back.
    pub fn emit(&self) {
        let revision = self.revision.fetch_add(1, Ordering::AcqRel) + 1;
        let listeners: Vec<Listener> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        debug!(
            store = self.store,
            revision,
            listeners = listeners.len(),
            "emitting store change"
        );
        for listener in listeners {
            listener();
        }
        // No receivers is the common case for synchronous consumers.
        let _ = self.events.send(StoreChange {
            store: self.store,
            revision,
        });
    }
}

#[cfg(test)]
#[path = "tests/change_tests.rs"]
mod tests;
