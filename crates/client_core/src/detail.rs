//! Stateful user edit form: a local draft over `UserStore` with commit/cancel.

use std::{
    fmt,
    str::FromStr,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
};

use serde::{Deserialize, Serialize};
use shared::{
    domain::{Administrator, User, UserId},
    error::ErrorCode,
};
use tracing::{debug, info, warn};

use crate::{
    actions::UserActions, change::ListenerToken, error::ActionError, stores::UserStore,
};

pub const SAVED_MESSAGE: &str = "Your changes have been saved";
pub const DISCARDED_MESSAGE: &str = "Your changes have been discarded";
pub const CONFLICT_MESSAGE: &str =
    "This user was changed elsewhere; save to overwrite or cancel to reload";

/// What a store change does to a draft with unsaved edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Replace the draft with the store snapshot, dropping unsaved edits.
    #[default]
    Overwrite,
    /// Keep a dirty draft and warn instead.
    #[serde(alias = "preserve-edits", alias = "preserve")]
    PreserveEdits,
}

impl FromStr for ConflictPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "overwrite" => Ok(ConflictPolicy::Overwrite),
            "preserve_edits" | "preserve" => Ok(ConflictPolicy::PreserveEdits),
            other => Err(format!(
                "unknown conflict policy '{other}' (expected overwrite or preserve-edits)"
            )),
        }
    }
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictPolicy::Overwrite => f.write_str("overwrite"),
            ConflictPolicy::PreserveEdits => f.write_str("preserve-edits"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserEdit {
    Username(String),
    Password(String),
    Administrator(Administrator),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DraftState {
    pub changed: bool,
    pub disabled: bool,
    pub message: String,
    pub add_role: String,
    pub user: Option<User>,
}

impl DraftState {
    fn from_store(store: &UserStore) -> Self {
        Self {
            user: store.user().map(|user| (*user).clone()),
            ..Self::default()
        }
    }

    fn mark_edited(&mut self) {
        self.changed = true;
        self.message.clear();
    }

    fn add_role_to_draft(&mut self, role: &str) -> bool {
        let role = role.trim();
        if role.is_empty() {
            return false;
        }
        let Some(user) = self.user.as_mut() else {
            return false;
        };
        user.add_role(role);
        self.mark_edited();
        self.add_role.clear();
        true
    }

    fn apply_store_change(&mut self, snapshot: Option<Arc<User>>, policy: ConflictPolicy) {
        if policy == ConflictPolicy::PreserveEdits && self.changed && !self.disabled {
            self.message = CONFLICT_MESSAGE.to_string();
            return;
        }
        self.user = snapshot.map(|user| (*user).clone());
    }
}

/// Detail view for one user.
///
/// The draft lives behind a shared lock because store notifications arrive on
/// whichever thread dispatched the change.
pub struct UserDetailed {
    user_id: UserId,
    store: Arc<UserStore>,
    actions: Arc<dyn UserActions>,
    policy: ConflictPolicy,
    state: Arc<Mutex<DraftState>>,
    listener: Option<ListenerToken>,
}

impl fmt::Debug for UserDetailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserDetailed")
            .field("user_id", &self.user_id)
            .field("policy", &self.policy)
            .field("state", &*self.lock())
            .field("mounted", &self.listener.is_some())
            .finish_non_exhaustive()
    }
}

impl UserDetailed {
    pub fn new(user_id: UserId, store: Arc<UserStore>, actions: Arc<dyn UserActions>) -> Self {
        let state = DraftState::from_store(&store);
        Self {
            user_id,
            store,
            actions,
            policy: ConflictPolicy::default(),
            state: Arc::new(Mutex::new(state)),
            listener: None,
        }
    }

    pub fn with_conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn is_mounted(&self) -> bool {
        self.listener.is_some()
    }

    pub fn state(&self) -> DraftState {
        self.lock().clone()
    }

    pub fn user(&self) -> Option<User> {
        self.lock().user.clone()
    }

    pub fn changed(&self) -> bool {
        self.lock().changed
    }

    pub fn disabled(&self) -> bool {
        self.lock().disabled
    }

    pub fn message(&self) -> String {
        self.lock().message.clone()
    }

    /// Subscribes to the store, then asks the action layer to load the user.
    pub async fn mount(&mut self) -> Result<(), ActionError> {
        if self.listener.is_none() {
            let state = Arc::downgrade(&self.state);
            let store = Arc::downgrade(&self.store);
            let policy = self.policy;
            self.listener = Some(
                self.store
                    .add_change_listener(move || on_store_change(&state, &store, policy)),
            );
        }
        debug!(user_id = %self.user_id, "mounting user detail view");
        self.actions.load(&self.user_id).await
    }

    /// Unsubscribes and tells the action layer the user is no longer needed.
    pub fn unmount(mut self) -> Result<(), ActionError> {
        if let Some(token) = self.listener.take() {
            self.store.remove_change_listener(token);
        }
        debug!(user_id = %self.user_id, "unmounting user detail view");
        self.actions.unload()
    }

    pub fn set(&self, edit: UserEdit) -> bool {
        self.edit_user(|user| match edit {
            UserEdit::Username(username) => user.username = username,
            UserEdit::Password(password) => user.password = password,
            UserEdit::Administrator(administrator) => user.administrator = administrator,
        })
    }

    pub fn toggle_administrator(&self) -> bool {
        self.edit_user(|user| user.administrator = user.administrator.toggled())
    }

    /// Updates the pending role input without touching the draft user.
    pub fn set_add_role(&self, value: impl Into<String>) {
        self.lock().add_role = value.into();
    }

    /// Adds the pending role input to the draft and clears the input.
    ///
    /// The input is kept while the form is disabled or has no user.
    pub fn submit_add_role(&self) -> bool {
        let mut state = self.lock();
        if state.disabled || state.user.is_none() {
            return false;
        }
        let role = std::mem::take(&mut state.add_role);
        state.add_role_to_draft(&role)
    }

    /// Appends `role` unless already present. Blank roles are ignored.
    pub fn add_role(&self, role: impl Into<String>) -> bool {
        let role = role.into();
        let mut state = self.lock();
        if state.disabled {
            return false;
        }
        state.add_role_to_draft(&role)
    }

    /// Removes the first matching role; returns false and leaves state untouched if absent.
    pub fn remove_role(&self, role: &str) -> bool {
        let mut state = self.lock();
        if state.disabled {
            return false;
        }
        let Some(user) = state.user.as_mut() else {
            return false;
        };
        if !user.remove_role(role) {
            return false;
        }
        state.mark_edited();
        state.add_role.clear();
        true
    }

    /// Drops local edits and reloads the draft from the store.
    pub fn cancel(&self) -> bool {
        let snapshot = self.store.user();
        let mut state = self.lock();
        if state.disabled {
            return false;
        }
        state.user = snapshot.map(|user| (*user).clone());
        state.changed = false;
        state.add_role.clear();
        state.message = DISCARDED_MESSAGE.to_string();
        true
    }

    /// Disables the form and returns the draft to commit, or `None` when there
    /// is nothing to save or a save is already running.
    pub fn begin_save(&self) -> Option<User> {
        let mut state = self.lock();
        if state.disabled {
            return None;
        }
        let user = state.user.clone()?;
        state.disabled = true;
        Some(user)
    }

    pub fn finish_save(&self, result: &Result<(), ActionError>) {
        let mut state = self.lock();
        state.disabled = false;
        match result {
            Ok(()) => {
                state.changed = false;
                state.message = SAVED_MESSAGE.to_string();
            }
            Err(err) => {
                state.message = classify_commit_failure(err);
            }
        }
    }

    pub async fn save(&self) -> Result<(), ActionError> {
        let Some(user) = self.begin_save() else {
            return Ok(());
        };
        info!(user_id = %user.id, "saving user");
        let result = self.actions.commit(&user).await;
        if let Err(err) = &result {
            warn!(user_id = %user.id, error = %err, "user commit failed");
        }
        self.finish_save(&result);
        result
    }

    fn edit_user(&self, apply: impl FnOnce(&mut User)) -> bool {
        let mut state = self.lock();
        if state.disabled {
            return false;
        }
        let Some(user) = state.user.as_mut() else {
            return false;
        };
        apply(user);
        state.mark_edited();
        true
    }

    fn lock(&self) -> MutexGuard<'_, DraftState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for UserDetailed {
    fn drop(&mut self) {
        if let Some(token) = self.listener.take() {
            self.store.remove_change_listener(token);
        }
    }
}

fn on_store_change(
    state: &Weak<Mutex<DraftState>>,
    store: &Weak<UserStore>,
    policy: ConflictPolicy,
) {
    let (Some(state), Some(store)) = (state.upgrade(), store.upgrade()) else {
        return;
    };
    let snapshot = store.user();
    state
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .apply_store_change(snapshot, policy);
}

/// User-facing message for a failed commit.
pub fn classify_commit_failure(err: &ActionError) -> String {
    if err.is_unreachable() {
        return "Server unreachable; check the URL/network and retry saving.".to_string();
    }
    match (err.api_code(), err) {
        (Some(ErrorCode::Validation | ErrorCode::Conflict), ActionError::Api(api)) => {
            format!("Changes rejected by server: {}", api.message)
        }
        (Some(ErrorCode::Unauthorized | ErrorCode::Forbidden), ActionError::Api(api)) => {
            format!("Not permitted to modify this user: {}", api.message)
        }
        _ => format!("Failed to save changes: {err}"),
    }
}

#[cfg(test)]
#[path = "tests/detail_tests.rs"]
mod tests;
