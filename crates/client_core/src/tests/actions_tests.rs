use super::*;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use shared::error::ErrorCode;
use tokio::{
    net::TcpListener,
    sync::{Mutex as AsyncMutex, Notify, Semaphore},
};

#[derive(Clone, Default)]
struct ApiState {
    users: Arc<AsyncMutex<Vec<User>>>,
    queries: Arc<AsyncMutex<Vec<UserListQuery>>>,
    commits: Arc<AsyncMutex<Vec<User>>>,
    reject_commit: Arc<AsyncMutex<Option<ApiError>>>,
    empty_commit_body: bool,
    load_gate: Option<LoadGate>,
}

#[derive(Clone)]
struct LoadGate {
    received: Arc<Notify>,
    release: Arc<Semaphore>,
}

impl LoadGate {
    fn new() -> Self {
        Self {
            received: Arc::new(Notify::new()),
            release: Arc::new(Semaphore::new(0)),
        }
    }
}

impl ApiState {
    fn with_users(users: Vec<User>) -> Self {
        Self {
            users: Arc::new(AsyncMutex::new(users)),
            ..Self::default()
        }
    }
}

async fn list_users(
    State(state): State<ApiState>,
    Query(query): Query<UserListQuery>,
) -> Json<UserListResponse> {
    let users = state.users.lock().await.clone();
    let matching: Vec<User> = users
        .into_iter()
        .filter(|user| {
            query
                .username
                .as_deref()
                .map_or(true, |needle| user.username.contains(needle))
        })
        .collect();
    let count = matching.len() as u64;
    let users = matching
        .into_iter()
        .skip((query.page * query.page_count) as usize)
        .take(query.page_count as usize)
        .collect();
    state.queries.lock().await.push(query);
    Json(UserListResponse { users, count })
}

async fn get_user(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    if let Some(gate) = &state.load_gate {
        gate.received.notify_one();
        if let Ok(permit) = gate.release.acquire().await {
            permit.forget();
        }
    }
    let users = state.users.lock().await;
    match users.iter().find(|user| user.id.as_str() == id) {
        Some(user) => Json(user.clone()).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ApiError::new(ErrorCode::NotFound, "user not found")),
        )
            .into_response(),
    }
}

async fn put_user(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(user): Json<User>,
) -> Response {
    state.commits.lock().await.push(user.clone());
    if let Some(err) = state.reject_commit.lock().await.clone() {
        return (StatusCode::UNPROCESSABLE_ENTITY, Json(err)).into_response();
    }

    // The server never echoes passwords back.
    let mut saved = user;
    saved.password.clear();
    {
        let mut users = state.users.lock().await;
        match users.iter_mut().find(|existing| existing.id.as_str() == id) {
            Some(existing) => *existing = saved.clone(),
            None => users.push(saved.clone()),
        }
    }
    if state.empty_commit_body {
        return StatusCode::NO_CONTENT.into_response();
    }
    Json(saved).into_response()
}

async fn spawn_api_server(state: ApiState) -> anyhow::Result<String> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let app = Router::new()
        .route("/user", get(list_users))
        .route("/user/:id", get(get_user).put(put_user))
        .with_state(state);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(format!("http://{addr}"))
}

fn sample_users() -> Vec<User> {
    vec![
        User::new("u1", "alice").with_roles(["ops"]),
        User::new("u2", "bob"),
        User::new("u3", "carol").with_roles(["ops", "billing"]),
    ]
}

#[test]
fn rejects_non_http_server_urls() {
    let context = ClientContext::new();
    for url in ["not a url", "mailto:admin@example.com", "ftp://example.com"] {
        let err = RestUserActions::new(url, &context)
            .err()
            .expect("invalid url must be rejected");
        assert!(
            matches!(err, ActionError::InvalidServerUrl { .. }),
            "unexpected error for {url}: {err}"
        );
    }
}

#[test]
fn endpoints_keep_base_path_prefix() {
    let context = ClientContext::new();
    let actions = RestUserActions::new("http://admin.local/api/", &context).expect("actions");
    let url = actions.endpoint(&["user", "a b"]).expect("endpoint");
    assert_eq!(url.as_str(), "http://admin.local/api/user/a%20b");
}

#[tokio::test]
async fn load_dispatches_user_into_store() {
    let server_url = spawn_api_server(ApiState::with_users(sample_users()))
        .await
        .expect("spawn server");
    let context = ClientContext::new();
    let actions = RestUserActions::new(&server_url, &context).expect("actions");

    actions.load(&UserId::new("u3")).await.expect("load");

    let user = context.user.user().expect("user synced");
    assert_eq!(user.username, "carol");
    assert_eq!(user.roles, vec!["ops", "billing"]);
    assert_eq!(context.user.loading(), Some(UserId::new("u3")));
}

#[tokio::test]
async fn load_of_missing_user_surfaces_api_error() {
    let server_url = spawn_api_server(ApiState::with_users(sample_users()))
        .await
        .expect("spawn server");
    let context = ClientContext::new();
    let actions = RestUserActions::new(&server_url, &context).expect("actions");

    let err = actions
        .load(&UserId::new("missing"))
        .await
        .expect_err("must fail");

    assert_eq!(err.api_code(), Some(ErrorCode::NotFound));
    assert!(context.user.user().is_none());
}

#[tokio::test]
async fn load_completing_after_unload_is_dropped() {
    let gate = LoadGate::new();
    let mut state = ApiState::with_users(sample_users());
    state.load_gate = Some(gate.clone());
    let server_url = spawn_api_server(state).await.expect("spawn server");

    let context = ClientContext::new();
    let actions = Arc::new(RestUserActions::new(&server_url, &context).expect("actions"));

    let loading = {
        let actions = Arc::clone(&actions);
        tokio::spawn(async move { actions.load(&UserId::new("u1")).await })
    };
    gate.received.notified().await;
    actions.unload().expect("unload");
    gate.release.add_permits(1);

    loading.await.expect("join").expect("load");
    assert!(context.user.user().is_none());
    assert_eq!(context.user.loading(), None);
}

#[tokio::test]
async fn load_superseded_by_newer_load_is_dropped() {
    let gate = LoadGate::new();
    let mut state = ApiState::with_users(sample_users());
    state.load_gate = Some(gate.clone());
    let server_url = spawn_api_server(state).await.expect("spawn server");

    let context = ClientContext::new();
    let actions = Arc::new(RestUserActions::new(&server_url, &context).expect("actions"));

    let spawn_load = |id: &'static str| {
        let actions = Arc::clone(&actions);
        tokio::spawn(async move { actions.load(&UserId::new(id)).await })
    };
    let first = spawn_load("u1");
    gate.received.notified().await;
    let second = spawn_load("u2");
    gate.received.notified().await;
    gate.release.add_permits(2);

    first.await.expect("join").expect("first load");
    second.await.expect("join").expect("second load");
    assert_eq!(
        context.user.user().map(|user| user.username.clone()).as_deref(),
        Some("bob")
    );
    assert_eq!(context.user.loading(), Some(UserId::new("u2")));
}

#[tokio::test]
async fn commit_puts_entity_and_syncs_server_copy() {
    let state = ApiState::with_users(sample_users());
    let server_url = spawn_api_server(state.clone()).await.expect("spawn server");
    let context = ClientContext::new();
    let actions = RestUserActions::new(&server_url, &context).expect("actions");
    actions.load(&UserId::new("u2")).await.expect("load");

    let mut edited = (*context.user.user().expect("loaded")).clone();
    edited.username = "robert".to_string();
    edited.password = "hunter2".to_string();
    edited.add_role("support");
    actions.commit(&edited).await.expect("commit");

    let commits = state.commits.lock().await.clone();
    assert_eq!(commits.len(), 1);
    assert_eq!(commits[0].password, "hunter2");

    let synced = context.user.user().expect("synced");
    assert_eq!(synced.username, "robert");
    assert!(synced.password.is_empty());
    assert_eq!(synced.roles, vec!["support"]);

    // The list is refreshed after a successful commit.
    assert_eq!(context.users.count(), 3);
    assert!(context
        .users
        .users()
        .iter()
        .any(|user| user.username == "robert"));
}

#[tokio::test]
async fn commit_with_empty_response_keeps_local_copy() {
    let mut state = ApiState::with_users(sample_users());
    state.empty_commit_body = true;
    let server_url = spawn_api_server(state).await.expect("spawn server");
    let context = ClientContext::new();
    let actions = RestUserActions::new(&server_url, &context).expect("actions");
    actions.load(&UserId::new("u1")).await.expect("load");

    let mut edited = (*context.user.user().expect("loaded")).clone();
    edited.username = "alicia".to_string();
    actions.commit(&edited).await.expect("commit");

    assert_eq!(context.user.user().expect("synced").username, "alicia");
}

#[tokio::test]
async fn rejected_commit_returns_api_error_and_keeps_store() {
    let state = ApiState::with_users(sample_users());
    *state.reject_commit.lock().await = Some(ApiError::new(
        ErrorCode::Validation,
        "username already taken",
    ));
    let server_url = spawn_api_server(state).await.expect("spawn server");
    let context = ClientContext::new();
    let actions = RestUserActions::new(&server_url, &context).expect("actions");
    actions.load(&UserId::new("u1")).await.expect("load");

    let mut edited = (*context.user.user().expect("loaded")).clone();
    edited.username = "bob".to_string();
    let err = actions.commit(&edited).await.expect_err("must fail");

    match &err {
        ActionError::Api(api) => {
            assert_eq!(api.code, ErrorCode::Validation);
            assert_eq!(api.message, "username already taken");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(context.user.user().expect("still loaded").username, "alice");
}

#[tokio::test]
async fn traverse_and_filter_forward_list_query() {
    let state = ApiState::with_users(sample_users());
    let server_url = spawn_api_server(state.clone()).await.expect("spawn server");
    let context = ClientContext::with_page_count(2);
    let actions = RestUserActions::new(&server_url, &context).expect("actions");

    actions.traverse(1).await.expect("traverse");
    assert_eq!(context.users.page(), 1);
    assert_eq!(context.users.count(), 3);
    assert_eq!(context.users.users().len(), 1);
    assert_eq!(context.users.users()[0].username, "carol");

    actions
        .filter(Some("o".to_string()))
        .await
        .expect("filter");
    assert_eq!(context.users.page(), 0);
    assert_eq!(context.users.count(), 2);

    let queries = state.queries.lock().await.clone();
    assert_eq!(queries.len(), 2);
    assert_eq!(queries[0].page, 1);
    assert_eq!(queries[0].page_count, 2);
    assert_eq!(queries[0].username, None);
    assert_eq!(queries[1].page, 0);
    assert_eq!(queries[1].username.as_deref(), Some("o"));
}

#[tokio::test]
async fn unreachable_server_is_reported_as_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let context = ClientContext::new();
    let actions = RestUserActions::new(&format!("http://{addr}"), &context).expect("actions");

    let err = actions.sync().await.expect_err("must fail");
    assert!(err.is_unreachable(), "unexpected error: {err}");
}
