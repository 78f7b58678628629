//! Client core for the user administration front-end.
//!
//! Data flows one way: action creators dispatch [`Action`]s through the
//! [`Dispatcher`], stores apply them and notify listeners, and views re-read
//! store snapshots. [`ClientContext`] wires one dispatcher to its stores and is
//! passed explicitly to whatever needs them.

use std::sync::Arc;

use shared::domain::UserId;

pub mod actions;
pub mod change;
pub mod detail;
pub mod dispatcher;
pub mod error;
pub mod stores;

pub use actions::{RestUserActions, UserActions};
pub use change::{ChangeNotifier, ListenerToken, StoreChange};
pub use detail::{classify_commit_failure, ConflictPolicy, DraftState, UserDetailed, UserEdit};
pub use dispatcher::{DispatchToken, Dispatcher};
pub use error::{ActionError, DispatchError};
pub use shared::protocol::Action;
pub use stores::{UserSnapshot, UserStore, UsersSnapshot, UsersStore, DEFAULT_PAGE_COUNT};

#[derive(Debug, Clone)]
pub struct ClientContext {
    pub dispatcher: Arc<Dispatcher>,
    pub users: Arc<UsersStore>,
    pub user: Arc<UserStore>,
}

impl ClientContext {
    pub fn new() -> Self {
        Self::with_page_count(DEFAULT_PAGE_COUNT)
    }

    pub fn with_page_count(page_count: u32) -> Self {
        let dispatcher = Arc::new(Dispatcher::new());
        let users = UsersStore::register_with_page_count(&dispatcher, page_count);
        let user = UserStore::register(&dispatcher);
        Self {
            dispatcher,
            users,
            user,
        }
    }

    pub fn dispatch(&self, action: &Action) -> Result<(), DispatchError> {
        self.dispatcher.dispatch(action)
    }

    /// Opens a detail view for `id` against this context's user store.
    pub fn user_detailed(&self, id: UserId, actions: Arc<dyn UserActions>) -> UserDetailed {
        UserDetailed::new(id, Arc::clone(&self.user), actions)
    }
}

impl Default for ClientContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
