//! Single-channel action router.
//!
//! Callbacks run synchronously on the dispatching thread, in registration
//! order. A dispatch issued from inside a callback is rejected; dispatches from
//! other threads wait for the running cycle to finish.

use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError, RwLock,
    },
    thread::{self, ThreadId},
};

use shared::protocol::Action;
use tracing::debug;

use crate::error::DispatchError;

type Callback = Arc<dyn Fn(&Action) -> anyhow::Result<()> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DispatchToken(u64);

impl fmt::Display for DispatchToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ID_{}", self.0)
    }
}

#[derive(Default)]
pub struct Dispatcher {
    callbacks: RwLock<Vec<(DispatchToken, Callback)>>,
    next_token: AtomicU64,
    active: Mutex<Option<(ThreadId, &'static str)>>,
    cycle: Mutex<()>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("callbacks", &self.len())
            .finish_non_exhaustive()
    }
}

/// Clears the active marker even when a callback fails or panics.
struct ActiveCycle<'a> {
    active: &'a Mutex<Option<(ThreadId, &'static str)>>,
    _cycle: MutexGuard<'a, ()>,
}

impl Drop for ActiveCycle<'_> {
    fn drop(&mut self) {
        *self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&self, callback: F) -> DispatchToken
    where
        F: Fn(&Action) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let token = DispatchToken(self.next_token.fetch_add(1, Ordering::Relaxed));
        self.callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((token, Arc::new(callback)));
        debug!(%token, "registered dispatch callback");
        token
    }

    /// Returns false when the token was not registered.
    pub fn unregister(&self, token: DispatchToken) -> bool {
        let mut callbacks = self
            .callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = callbacks.len();
        callbacks.retain(|(registered, _)| *registered != token);
        let removed = callbacks.len() != before;
        if removed {
            debug!(%token, "unregistered dispatch callback");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_dispatching(&self) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Delivers `action` to every registered callback before returning.
    ///
    /// The first failing callback aborts the cycle; later callbacks do not see
    /// the action.
    pub fn dispatch(&self, action: &Action) -> Result<(), DispatchError> {
        let tag = action.tag();
        let _cycle = self.begin(tag)?;

        // Snapshot so callbacks may register or unregister without deadlocking.
        let callbacks: Vec<(DispatchToken, Callback)> = self
            .callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        debug!(action = tag, callbacks = callbacks.len(), "dispatching action");
        for (token, callback) in callbacks {
            callback(action).map_err(|source| DispatchError::Callback { token, tag, source })?;
        }
        Ok(())
    }

    fn begin(&self, tag: &'static str) -> Result<ActiveCycle<'_>, DispatchError> {
        let current = thread::current().id();
        if let Some((owner, active)) = *self.active.lock().unwrap_or_else(PoisonError::into_inner)
        {
            if owner == current {
                return Err(DispatchError::Reentrant { tag, active });
            }
        }

        let cycle = self.cycle.lock().unwrap_or_else(PoisonError::into_inner);
        *self.active.lock().unwrap_or_else(PoisonError::into_inner) = Some((current, tag));
        Ok(ActiveCycle {
            active: &self.active,
            _cycle: cycle,
        })
    }
}

#[cfg(test)]
#[path = "tests/dispatcher_tests.rs"]
mod tests;
