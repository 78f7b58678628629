use std::sync::{Arc, PoisonError, RwLock, Weak};

use shared::{
    domain::{User, UserId},
    protocol::Action,
};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::{
    change::{ChangeNotifier, ListenerToken, StoreChange},
    dispatcher::{DispatchToken, Dispatcher},
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserSnapshot {
    pub user: Option<Arc<User>>,
    pub loading: Option<UserId>,
}

/// The single user currently opened for editing.
#[derive(Debug)]
pub struct UserStore {
    token: DispatchToken,
    state: RwLock<UserSnapshot>,
    changes: ChangeNotifier,
}

impl UserStore {
    pub fn register(dispatcher: &Dispatcher) -> Arc<Self> {
        Arc::new_cyclic(|store: &Weak<Self>| {
            let store = store.clone();
            let token = dispatcher.register(move |action| {
                if let Some(store) = store.upgrade() {
                    store.handle(action);
                }
                Ok(())
            });
            Self {
                token,
                state: RwLock::new(UserSnapshot::default()),
                changes: ChangeNotifier::new("user"),
            }
        })
    }

    pub fn dispatch_token(&self) -> DispatchToken {
        self.token
    }

    pub fn snapshot(&self) -> UserSnapshot {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn user(&self) -> Option<Arc<User>> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .user
            .clone()
    }

    pub fn loading(&self) -> Option<UserId> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .loading
            .clone()
    }

    pub fn add_change_listener<F>(&self, listener: F) -> ListenerToken
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.changes.add_listener(listener)
    }

    pub fn remove_change_listener(&self, token: ListenerToken) -> bool {
        self.changes.remove_listener(token)
    }

    pub fn change_listener_count(&self) -> usize {
        self.changes.listener_count()
    }

    pub fn subscribe_changes(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }

    fn handle(&self, action: &Action) {
        match action {
            Action::Load { id } => self.load(id),
            Action::SyncUser { user } => self.sync(user.clone()),
            Action::Unload => self.unload(),
            _ => {}
        }
    }

    // A cached user with another id is dropped so a new view never starts from it.
    fn load(&self, id: &UserId) {
        let evicted = {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            state.loading = Some(id.clone());
            let stale = state.user.as_ref().is_some_and(|user| &user.id != id);
            if stale {
                state.user = None;
            }
            stale
        };
        debug!(user_id = %id, evicted, "user store loading");
        if evicted {
            self.changes.emit();
        }
    }

    // Only the user currently being loaded is accepted; anything else is a
    // response that arrived after an unload or a newer load.
    fn sync(&self, user: User) {
        {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            if state.loading.as_ref() != Some(&user.id) {
                warn!(
                    user_id = %user.id,
                    loading = ?state.loading,
                    "dropping user sync for a load that was unloaded or superseded"
                );
                return;
            }
            debug!(user_id = %user.id, "user store synced");
            state.user = Some(Arc::new(user));
        }
        self.changes.emit();
    }

    fn unload(&self) {
        {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            state.user = None;
            state.loading = None;
        }
        debug!("user store unloaded");
        self.changes.emit();
    }
}

#[cfg(test)]
#[path = "tests/user_tests.rs"]
mod tests;
