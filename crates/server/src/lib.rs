//! Taskdeck API server: personal and team tasks, comments, progress,
//! meetings, notifications, profiles and an AI assistant over one SQLite
//! database.

pub mod ai;
pub mod avatars;
pub mod config;
pub mod error;
pub mod identity;
pub mod mailer;
pub mod routes;
pub mod storage;

use axum::{
    Router,
    extract::{DefaultBodyLimit, FromRef},
    http::{HeaderValue, Method, header},
    routing::{get, post},
};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use ai::LanguageModel;
use avatars::AvatarStore;
use config::{AppConfig, StorageConfig};
use identity::IdentityProvider;
use mailer::MailQueue;
use storage::Db;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub config: Arc<AppConfig>,
    pub identity: Arc<dyn IdentityProvider>,
    pub avatars: Arc<dyn AvatarStore>,
    /// `None` when no model API key is configured.
    pub ai: Option<Arc<dyn LanguageModel>>,
    pub mail: MailQueue,
    pub started_at: Instant,
}

impl FromRef<AppState> for Db {
    fn from_ref(state: &AppState) -> Self {
        state.db.clone()
    }
}

impl FromRef<AppState> for Arc<AppConfig> {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

impl FromRef<AppState> for Arc<dyn IdentityProvider> {
    fn from_ref(state: &AppState) -> Self {
        state.identity.clone()
    }
}

impl FromRef<AppState> for MailQueue {
    fn from_ref(state: &AppState) -> Self {
        state.mail.clone()
    }
}

/// Build the full application router.
pub fn router(state: AppState) -> Router {
    use routes::{ai, comments, health, meetings, notifications, profile, progress, tasks, teams, users};

    let api = Router::new()
        // Health
        .route("/health", get(health::health))
        // Tasks
        .route("/tasks", get(tasks::list_tasks).post(tasks::create_task))
        .route("/tasks/stats", get(tasks::task_stats))
        .route(
            "/tasks/{id}",
            get(tasks::get_task)
                .put(tasks::update_task)
                .delete(tasks::delete_task),
        )
        // Comments
        .route(
            "/tasks/{id}/comments",
            get(comments::list_comments).post(comments::create_comment),
        )
        .route(
            "/comments/{id}",
            axum::routing::patch(comments::update_comment).delete(comments::delete_comment),
        )
        // Progress
        .route(
            "/tasks/{id}/progress",
            get(progress::list_progress).post(progress::create_progress),
        )
        // Meetings
        .route(
            "/meetings",
            get(meetings::list_meetings).post(meetings::create_meeting),
        )
        .route(
            "/meetings/{id}",
            get(meetings::get_meeting)
                .patch(meetings::update_meeting)
                .delete(meetings::delete_meeting),
        )
        // Notifications
        .route(
            "/notifications",
            get(notifications::list_notifications).post(notifications::create_notification),
        )
        .route(
            "/notifications/unread-count",
            get(notifications::unread_count),
        )
        .route(
            "/notifications/mark-all-read",
            post(notifications::mark_all_read),
        )
        .route(
            "/notifications/{id}",
            get(notifications::get_notification)
                .patch(notifications::update_notification)
                .delete(notifications::delete_notification),
        )
        // Teams
        .route("/teams", get(teams::list_my_teams).post(teams::create_team))
        .route(
            "/teams/{id}",
            get(teams::get_team)
                .patch(teams::update_team)
                .put(teams::update_team)
                .delete(teams::delete_team),
        )
        .route("/teams/{id}/stats", get(teams::team_stats))
        .route(
            "/teams/{id}/members",
            get(teams::list_members).post(teams::add_member),
        )
        .route(
            "/teams/{id}/members/{member_id}",
            axum::routing::patch(teams::update_member).delete(teams::remove_member),
        )
        // AI assistant
        .route("/ai/categorize", post(ai::categorize))
        .route("/ai/prioritize", post(ai::prioritize))
        // Profile
        .route(
            "/profile",
            get(profile::get_profile)
                .put(profile::update_profile)
                .delete(profile::delete_profile),
        )
        .route(
            "/profile/avatar",
            post(profile::upload_avatar)
                .delete(profile::delete_avatar)
                // Multipart framing on top of the 5 MiB image.
                .layer(DefaultBodyLimit::max(
                    taskdeck_api::service::MAX_AVATAR_BYTES + 64 * 1024,
                )),
        )
        // Users
        .route("/users/search", get(users::search_users))
        .route("/users/{id}", get(users::get_user));

    let mut app = Router::new().nest("/api", api);

    if state.config.storage == StorageConfig::Local {
        let dir = state.db.data_dir().join(avatars::LOCAL_AVATAR_DIR);
        app = app.nest_service("/avatars", ServeDir::new(dir));
    }

    app.layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.config))
        .with_state(state)
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    match config
        .frontend_url
        .as_deref()
        .and_then(|origin| HeaderValue::from_str(origin).ok())
    {
        Some(origin) => base.allow_origin(origin).allow_credentials(true),
        None => base.allow_origin(Any),
    }
}
