// gramfeed server - REST surface over the fan-out/interaction services
// Development wiring: in-memory or SQLite-backed document store, in-memory
// blob store, and a header-trusting identity provider. Production swaps the
// three seams, not the services.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

use gramfeed::core::types::{PostId, UserId};
use gramfeed::core::ViewerContext;
use gramfeed::error::AppResult;
use gramfeed::infrastructure::{
    BlobStore, DocumentStore, IdentityProvider, MemoryBlobStore, MemoryStore, SqliteStore,
};
use gramfeed::services::user_directory::NewProfile;
use gramfeed::{AppError, ServiceConfig, Services};

/// Trusts the bearer token as a user id verbatim. Development only; a real
/// deployment implements `IdentityProvider` against its auth backend.
struct TrustingIdentity;

#[async_trait]
impl IdentityProvider for TrustingIdentity {
    async fn authenticate(&self, token: &str) -> AppResult<UserId> {
        if token.is_empty() {
            return Err(AppError::Unauthenticated("empty token".to_string()));
        }
        Ok(UserId::new(token))
    }
}

#[derive(Clone)]
struct AppState {
    services: Arc<Services>,
    identity: Arc<dyn IdentityProvider>,
}

impl AppState {
    /// Build the per-request context from the `x-user-id` header.
    async fn context(&self, headers: &HeaderMap) -> AppResult<ViewerContext> {
        match headers.get("x-user-id").and_then(|v| v.to_str().ok()) {
            Some(token) => {
                let user_id = self.identity.authenticate(token).await?;
                Ok(ViewerContext::authenticated(user_id))
            }
            None => Ok(ViewerContext::anonymous()),
        }
    }
}

#[derive(Deserialize)]
struct CreateProfileRequest {
    id: String,
    username: String,
    full_name: String,
    email: String,
    profile_image_url: Option<String>,
}

#[derive(Deserialize)]
struct PublishRequest {
    caption: String,
    /// Image payload; the dev blob store only cares about the bytes.
    image: String,
}

#[derive(Deserialize)]
struct CommentRequest {
    text: String,
}

async fn create_profile(
    State(state): State<AppState>,
    Json(request): Json<CreateProfileRequest>,
) -> AppResult<impl IntoResponse> {
    let user = state
        .services
        .users
        .create_profile(NewProfile {
            id: UserId::new(request.id),
            username: request.username,
            full_name: request.full_name,
            email: request.email,
            profile_image_url: request.profile_image_url,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn publish(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<PublishRequest>,
) -> AppResult<impl IntoResponse> {
    let ctx = state.context(&headers).await?;
    let receipt = state
        .services
        .post_fanout
        .publish(&ctx, request.caption, request.image.into_bytes())
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "post_id": receipt.post_id,
            "feeds_attempted": receipt.fanout.attempted,
            "feeds_failed": receipt.fanout.failed.len(),
        })),
    ))
}

async fn get_post(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let post = state.services.feed.post(&PostId::new(post_id)).await?;
    Ok(Json(post))
}

async fn timeline(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    Ok(Json(state.services.feed.timeline().await?))
}

async fn posts_by_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let posts = state
        .services
        .feed
        .posts_by(&UserId::new(user_id))
        .await?;
    Ok(Json(posts))
}

async fn user_stats(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    Ok(Json(
        state.services.users.stats(&UserId::new(user_id)).await?,
    ))
}

async fn like(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(post_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let ctx = state.context(&headers).await?;
    state
        .services
        .interactions
        .like(&ctx, &PostId::new(post_id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn unlike(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(post_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let ctx = state.context(&headers).await?;
    state
        .services
        .interactions
        .unlike(&ctx, &PostId::new(post_id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn likers(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(post_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let ctx = state.context(&headers).await?;
    let users = state
        .services
        .interactions
        .likers(&ctx, &PostId::new(post_id))
        .await?;
    Ok(Json(users))
}

async fn follow(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let ctx = state.context(&headers).await?;
    let report = state
        .services
        .follow_fanout
        .follow(&ctx, &UserId::new(user_id))
        .await?;
    Ok(Json(json!({
        "feed_entries_attempted": report.attempted,
        "feed_entries_failed": report.failed.len(),
    })))
}

async fn unfollow(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let ctx = state.context(&headers).await?;
    let report = state
        .services
        .follow_fanout
        .unfollow(&ctx, &UserId::new(user_id))
        .await?;
    Ok(Json(json!({
        "feed_entries_attempted": report.attempted,
        "feed_entries_failed": report.failed.len(),
    })))
}

async fn feed(State(state): State<AppState>, headers: HeaderMap) -> AppResult<impl IntoResponse> {
    let ctx = state.context(&headers).await?;
    Ok(Json(state.services.feed.assemble(&ctx).await?))
}

async fn notifications(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<impl IntoResponse> {
    let ctx = state.context(&headers).await?;
    let recipient = ctx.require_user()?.clone();
    let events = state
        .services
        .notifications
        .list_for(&ctx, &recipient)
        .await?;
    Ok(Json(events))
}

async fn add_comment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(post_id): Path<String>,
    Json(request): Json<CommentRequest>,
) -> AppResult<impl IntoResponse> {
    let ctx = state.context(&headers).await?;
    let comment_id = state
        .services
        .comments
        .add(&ctx, &PostId::new(post_id), request.text)
        .await?;
    Ok((StatusCode::CREATED, Json(json!({ "comment_id": comment_id }))))
}

async fn list_comments(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(post_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let ctx = state.context(&headers).await?;
    let comments = state
        .services
        .comments
        .list(&ctx, &PostId::new(post_id))
        .await?;
    Ok(Json(comments))
}

fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/users", post(create_profile))
        .route("/users/{id}/posts", get(posts_by_user))
        .route("/users/{id}/stats", get(user_stats))
        .route("/users/{id}/follow", post(follow).delete(unfollow))
        .route("/posts", post(publish).get(timeline))
        .route("/posts/{id}", get(get_post))
        .route("/posts/{id}/like", post(like).delete(unlike))
        .route("/posts/{id}/likers", get(likers))
        .route("/posts/{id}/comments", post(add_comment).get(list_comments))
        .route("/feed", get(feed))
        .route("/notifications", get(notifications))
        .layer(cors)
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let store: Arc<dyn DocumentStore> = match std::env::var("GRAMFEED_DB") {
        Ok(path) if path != "memory" => {
            info!("using SQLite store at {}", path);
            Arc::new(SqliteStore::open(&path).await?)
        }
        _ => {
            info!("using in-memory store");
            Arc::new(MemoryStore::new())
        }
    };
    let blobs: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
    let services = Arc::new(Services::build(store, blobs, ServiceConfig::default()));

    let state = AppState {
        services,
        identity: Arc::new(TrustingIdentity),
    };

    let addr = std::env::var("GRAMFEED_ADDR").unwrap_or_else(|_| "127.0.0.1:3000".to_string());
    let listener = TcpListener::bind(&addr).await?;
    info!("listening on {}", addr);
    axum::serve(listener, router(state)).await?;
    Ok(())
}
