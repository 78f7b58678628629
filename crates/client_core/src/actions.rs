//! Action creators: turn user intent and server responses into dispatched actions.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use shared::{
    domain::{User, UserId},
    error::{ApiError, ApiException},
    protocol::{Action, UserListQuery, UserListResponse},
};
use tracing::{info, warn};
use url::Url;

use crate::{dispatcher::Dispatcher, error::ActionError, stores::UsersStore, ClientContext};

#[async_trait]
pub trait UserActions: Send + Sync {
    /// Fetches one user and dispatches it to the user store.
    async fn load(&self, id: &UserId) -> Result<(), ActionError>;
    /// Signals that the loaded user is no longer needed.
    fn unload(&self) -> Result<(), ActionError>;
    /// Persists the full entity.
    async fn commit(&self, user: &User) -> Result<(), ActionError>;
    async fn traverse(&self, page: u32) -> Result<(), ActionError>;
    async fn filter(&self, filter: Option<String>) -> Result<(), ActionError>;
    /// Refreshes the list for the current page and filter.
    async fn sync(&self) -> Result<(), ActionError>;
}

/// `UserActions` backed by the admin REST API.
pub struct RestUserActions {
    http: Client,
    base_url: Url,
    dispatcher: Arc<Dispatcher>,
    users: Arc<UsersStore>,
}

impl RestUserActions {
    pub fn new(server_url: &str, context: &ClientContext) -> Result<Self, ActionError> {
        Self::with_client(Client::new(), server_url, context)
    }

    pub fn with_client(
        http: Client,
        server_url: &str,
        context: &ClientContext,
    ) -> Result<Self, ActionError> {
        Ok(Self {
            http,
            base_url: parse_base_url(server_url)?,
            dispatcher: Arc::clone(&context.dispatcher),
            users: Arc::clone(&context.users),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ActionError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ActionError::InvalidServerUrl {
                url: self.base_url.to_string(),
                reason: "url cannot be a base".to_string(),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

#[async_trait]
impl UserActions for RestUserActions {
    async fn load(&self, id: &UserId) -> Result<(), ActionError> {
        self.dispatcher.dispatch(&Action::Load { id: id.clone() })?;

        let url = self.endpoint(&["user", id.as_str()])?;
        info!(user_id = %id, "loading user");
        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|source| transport(&url, source))?;
        let user: User = read_json(&url, response).await?;

        // The user store drops this if the view unloaded or moved on meanwhile.
        self.dispatcher.dispatch(&Action::SyncUser { user })?;
        Ok(())
    }

    fn unload(&self) -> Result<(), ActionError> {
        self.dispatcher.dispatch(&Action::Unload)?;
        Ok(())
    }

    async fn commit(&self, user: &User) -> Result<(), ActionError> {
        let url = self.endpoint(&["user", user.id.as_str()])?;
        info!(user_id = %user.id, "committing user");
        let response = self
            .http
            .put(url.clone())
            .json(user)
            .send()
            .await
            .map_err(|source| transport(&url, source))?;
        let body = read_body(&url, response).await?;
        let saved = if body.trim().is_empty() {
            user.clone()
        } else {
            serde_json::from_str::<User>(&body).map_err(|source| ActionError::Decode {
                endpoint: url.to_string(),
                source,
            })?
        };

        self.dispatcher.dispatch(&Action::SyncUser { user: saved })?;
        if let Err(err) = self.sync().await {
            warn!(user_id = %user.id, error = %err, "user list refresh after commit failed");
        }
        Ok(())
    }

    async fn traverse(&self, page: u32) -> Result<(), ActionError> {
        self.dispatcher.dispatch(&Action::Traverse { page })?;
        self.sync().await
    }

    async fn filter(&self, filter: Option<String>) -> Result<(), ActionError> {
        self.dispatcher.dispatch(&Action::Filter { filter })?;
        self.sync().await
    }

    async fn sync(&self) -> Result<(), ActionError> {
        let snapshot = self.users.snapshot();
        let query = UserListQuery {
            page: snapshot.page,
            page_count: snapshot.page_count,
            username: snapshot.filter,
        };
        let url = self.endpoint(&["user"])?;
        let response = self
            .http
            .get(url.clone())
            .query(&query)
            .send()
            .await
            .map_err(|source| transport(&url, source))?;
        let body: UserListResponse = read_json(&url, response).await?;
        info!(
            page = query.page,
            users = body.users.len(),
            count = body.count,
            "synced user list"
        );
        self.dispatcher.dispatch(&Action::Sync {
            users: body.users,
            count: body.count,
        })?;
        Ok(())
    }
}

fn parse_base_url(server_url: &str) -> Result<Url, ActionError> {
    let trimmed = server_url.trim();
    let url = Url::parse(trimmed).map_err(|err| ActionError::InvalidServerUrl {
        url: trimmed.to_string(),
        reason: err.to_string(),
    })?;
    if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") {
        return Err(ActionError::InvalidServerUrl {
            url: trimmed.to_string(),
            reason: "expected an http(s) url".to_string(),
        });
    }
    Ok(url)
}

fn transport(url: &Url, source: reqwest::Error) -> ActionError {
    ActionError::Transport {
        endpoint: url.to_string(),
        source,
    }
}

async fn read_body(url: &Url, response: Response) -> Result<String, ActionError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|source| transport(url, source))?;
    if status.is_success() {
        return Ok(body);
    }

    let api_error = serde_json::from_str::<ApiError>(&body)
        .unwrap_or_else(|_| ApiError::from_status(status.as_u16(), body));
    warn!(
        endpoint = %url,
        status = status.as_u16(),
        message = %api_error.message,
        "api request rejected"
    );
    Err(ApiException::from(api_error).into())
}

async fn read_json<T: DeserializeOwned>(url: &Url, response: Response) -> Result<T, ActionError> {
    let body = read_body(url, response).await?;
    serde_json::from_str(&body).map_err(|source| ActionError::Decode {
        endpoint: url.to_string(),
        source,
    })
}

#[cfg(test)]
#[path = "tests/actions_tests.rs"]
mod tests;
