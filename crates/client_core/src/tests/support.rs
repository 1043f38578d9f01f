//! In-process social backend for exercising the REST client and session.

use std::{collections::HashMap, sync::Arc};

use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, Method, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::{TimeZone, Utc};
use shared::{
    domain::{PostId, UserId},
    error::{ApiError, ErrorCode},
    protocol::{FeedPage, FeedQuery, LoginRequest, PostSummary, TokenPair, UserProfile},
};
use tokio::{
    net::TcpListener,
    sync::{oneshot, Mutex, Notify},
};

pub const VALID_PASSWORD: &str = "hunter2";
pub const FEED_PAGES: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub authorization: Option<String>,
}

#[derive(Clone, Default)]
pub struct SocialServerState {
    pub following: Arc<Mutex<HashMap<i64, bool>>>,
    pub follower_counts: Arc<Mutex<HashMap<i64, u64>>>,
    pub liked: Arc<Mutex<HashMap<i64, bool>>>,
    pub like_counts: Arc<Mutex<HashMap<i64, u64>>>,
    pub requests: Arc<Mutex<Vec<RecordedRequest>>>,
    pub fail_relations: Arc<Mutex<bool>>,
    pub relation_gate: Arc<Mutex<Option<oneshot::Receiver<()>>>>,
    pub relation_received: Arc<Notify>,
}

impl SocialServerState {
    pub async fn set_fail_relations(&self, fail: bool) {
        *self.fail_relations.lock().await = fail;
    }

    /// Holds the next follow/like request until the returned sender fires.
    pub async fn hold_next_relation(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.relation_gate.lock().await = Some(rx);
        tx
    }

    pub async fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().await.clone()
    }

    async fn record(&self, method: &Method, path: String, headers: &HeaderMap) {
        let authorization = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        self.requests.lock().await.push(RecordedRequest {
            method: method.to_string(),
            path,
            authorization,
        });
    }
}

type ApiFailure = (StatusCode, Json<ApiError>);

fn failure(status: StatusCode, code: ErrorCode, message: &str) -> ApiFailure {
    (status, Json(ApiError::new(code, message)))
}

async fn login(
    Json(request): Json<LoginRequest>,
) -> std::result::Result<Json<TokenPair>, ApiFailure> {
    if request.password != VALID_PASSWORD {
        return Err(failure(
            StatusCode::UNAUTHORIZED,
            ErrorCode::Unauthorized,
            "invalid credentials",
        ));
    }
    Ok(Json(TokenPair {
        access_token: format!("access-{}", request.username),
        refresh_token: format!("refresh-{}", request.username),
    }))
}

async fn profile(
    State(state): State<SocialServerState>,
    Path(user_id): Path<i64>,
    headers: HeaderMap,
) -> std::result::Result<Json<UserProfile>, ApiFailure> {
    state
        .record(&Method::GET, format!("/users/{user_id}"), &headers)
        .await;
    if user_id <= 0 {
        return Err(failure(
            StatusCode::NOT_FOUND,
            ErrorCode::NotFound,
            "no such user",
        ));
    }
    let is_following = state
        .following
        .lock()
        .await
        .get(&user_id)
        .copied()
        .unwrap_or(false);
    let follower_count = state
        .follower_counts
        .lock()
        .await
        .get(&user_id)
        .copied()
        .unwrap_or(100);
    Ok(Json(UserProfile {
        user_id: UserId(user_id),
        username: format!("user{user_id}"),
        display_name: None,
        bio: None,
        follower_count,
        following_count: 3,
        is_following,
    }))
}

async fn feed(
    State(state): State<SocialServerState>,
    Query(query): Query<FeedQuery>,
    headers: HeaderMap,
) -> Json<FeedPage> {
    state
        .record(
            &Method::GET,
            format!("/posts?page={}&page_size={}", query.page, query.page_size),
            &headers,
        )
        .await;
    let liked = state.liked.lock().await.clone();
    let like_counts = state.like_counts.lock().await.clone();
    let first = i64::from(query.page) * i64::from(query.page_size) + 1;
    let posts = (first..first + i64::from(query.page_size))
        .map(|post_id| PostSummary {
            post_id: PostId(post_id),
            author_id: UserId(1),
            author_username: Some("user1".to_string()),
            body: format!("post {post_id}"),
            like_count: like_counts.get(&post_id).copied().unwrap_or(0),
            liked_by_me: liked.get(&post_id).copied().unwrap_or(false),
            created_at: Utc
                .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
                .single()
                .unwrap_or_default(),
        })
        .collect();
    Json(FeedPage {
        page: query.page,
        page_size: query.page_size,
        posts,
        has_more: query.page + 1 < FEED_PAGES,
    })
}

async fn apply_relation(
    state: &SocialServerState,
    method: &Method,
    path: String,
    headers: &HeaderMap,
) -> std::result::Result<bool, ApiFailure> {
    state.record(method, path, headers).await;
    state.relation_received.notify_one();

    let gate = state.relation_gate.lock().await.take();
    if let Some(gate) = gate {
        let _ = gate.await;
    }

    if *state.fail_relations.lock().await {
        return Err(failure(
            StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::Internal,
            "relation store unavailable",
        ));
    }
    Ok(*method == Method::POST)
}

fn adjust(counts: &mut HashMap<i64, u64>, id: i64, default: u64, enabled: bool) {
    let count = counts.entry(id).or_insert(default);
    *count = if enabled {
        count.saturating_add(1)
    } else {
        count.saturating_sub(1)
    };
}

async fn set_follow(
    State(state): State<SocialServerState>,
    method: Method,
    Path(user_id): Path<i64>,
    headers: HeaderMap,
) -> std::result::Result<StatusCode, ApiFailure> {
    let enabled =
        apply_relation(&state, &method, format!("/users/{user_id}/follow"), &headers).await?;
    state.following.lock().await.insert(user_id, enabled);
    adjust(
        &mut *state.follower_counts.lock().await,
        user_id,
        100,
        enabled,
    );
    Ok(StatusCode::NO_CONTENT)
}

async fn set_like(
    State(state): State<SocialServerState>,
    method: Method,
    Path(post_id): Path<i64>,
    headers: HeaderMap,
) -> std::result::Result<StatusCode, ApiFailure> {
    let enabled =
        apply_relation(&state, &method, format!("/posts/{post_id}/like"), &headers).await?;
    state.liked.lock().await.insert(post_id, enabled);
    adjust(&mut *state.like_counts.lock().await, post_id, 0, enabled);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn spawn_social_server() -> Result<(String, SocialServerState)> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let state = SocialServerState::default();
    let app = Router::new()
        .route("/auth/login", post(login))
        .route("/users/:user_id", get(profile))
        .route("/users/:user_id/follow", post(set_follow).delete(set_follow))
        .route("/posts", get(feed))
        .route("/posts/:post_id/like", post(set_like).delete(set_like))
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((format!("http://{addr}"), state))
}
