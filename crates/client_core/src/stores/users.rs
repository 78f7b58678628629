use std::sync::{Arc, PoisonError, RwLock, Weak};

use shared::{domain::User, protocol::Action};
use tokio::sync::broadcast;
use tracing::debug;

use crate::{
    change::{ChangeNotifier, ListenerToken, StoreChange},
    dispatcher::{DispatchToken, Dispatcher},
};

pub const DEFAULT_PAGE_COUNT: u32 = 50;

/// Point-in-time copy of the list state. `users` aliases the store's snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsersSnapshot {
    pub users: Arc<Vec<User>>,
    pub page: u32,
    pub page_count: u32,
    pub count: u64,
    pub filter: Option<String>,
}

impl UsersSnapshot {
    /// Number of pages needed for `count` users at the current page size.
    pub fn total_pages(&self) -> u64 {
        self.count.div_ceil(u64::from(self.page_count.max(1)))
    }
}

/// Paginated user list.
///
/// Paging and filter requests update the query state silently; only data
/// arrival (`user.sync`) notifies listeners.
#[derive(Debug)]
pub struct UsersStore {
    token: DispatchToken,
    state: RwLock<UsersSnapshot>,
    changes: ChangeNotifier,
}

impl UsersStore {
    pub fn register(dispatcher: &Dispatcher) -> Arc<Self> {
        Self::register_with_page_count(dispatcher, DEFAULT_PAGE_COUNT)
    }

    pub fn register_with_page_count(dispatcher: &Dispatcher, page_count: u32) -> Arc<Self> {
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
                state: RwLock::new(UsersSnapshot {
                    users: Arc::new(Vec::new()),
                    page: 0,
                    page_count: page_count.max(1),
                    count: 0,
                    filter: None,
                }),
                changes: ChangeNotifier::new("users"),
            }
        })
    }

    pub fn dispatch_token(&self) -> DispatchToken {
        self.token
    }

    pub fn snapshot(&self) -> UsersSnapshot {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn users(&self) -> Arc<Vec<User>> {
        Arc::clone(&self.state.read().unwrap_or_else(PoisonError::into_inner).users)
    }

    pub fn page(&self) -> u32 {
        self.state.read().unwrap_or_else(PoisonError::into_inner).page
    }

    pub fn page_count(&self) -> u32 {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .page_count
    }

    pub fn count(&self) -> u64 {
        self.state.read().unwrap_or_else(PoisonError::into_inner).count
    }

    pub fn filter(&self) -> Option<String> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .filter
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
            Action::Traverse { page } => self.traverse(*page),
            Action::Filter { filter } => self.set_filter(filter.clone()),
            Action::Sync { users, count } => self.sync(users.clone(), *count),
            _ => {}
        }
    }

    fn traverse(&self, page: u32) {
        self.state.write().unwrap_or_else(PoisonError::into_inner).page = page;
        debug!(page, "users store traversed");
    }

    fn set_filter(&self, filter: Option<String>) {
        let filter = filter.filter(|f| !f.trim().is_empty());
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.filter = filter;
        state.page = 0;
    }

    fn sync(&self, users: Vec<User>, count: u64) {
        {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            debug!(users = users.len(), count, "users store synced");
            state.users = Arc::new(users);
            state.count = count;
        }
        self.changes.emit();
    }
}

#[cfg(test)]
#[path = "tests/users_tests.rs"]
mod tests;
