use std::sync::Arc;
use std::time::Instant;

use taskdeck_server::{
    AppState, ai, avatars,
    config::{AppConfig, AuthMode},
    identity,
    mailer::{self, MailQueue},
    router, storage,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "taskdeck_server=info,tower_http=info".into()),
        )
        .init();

    let config = AppConfig::from_env()?;
    tracing::info!("data directory: {}", config.data_dir.display());

    let db = storage::init_db(&config.data_dir)?;
    tracing::info!("database initialized");

    match &config.auth {
        AuthMode::Hosted { url, .. } => tracing::info!("verifying tokens with {url}"),
        AuthMode::LocalJwt { .. } => {
            tracing::warn!("AUTH_URL not set; verifying tokens locally, account deletion keeps the identity")
        }
    }
    let identity = identity::from_config(&config.auth)?;
    let avatars = avatars::from_config(&config.storage, &config.data_dir, &config.public_url)?;

    let ai: Option<Arc<dyn ai::LanguageModel>> = match &config.ai {
        Some(ai_config) => {
            tracing::info!("AI assistant enabled ({})", ai_config.model);
            let model: Arc<dyn ai::LanguageModel> = Arc::new(ai::GeminiModel::new(ai_config.clone())?);
            Some(model)
        }
        None => {
            tracing::warn!("GOOGLE_GENERATIVE_AI_API_KEY not set; AI endpoints will answer 503");
            None
        }
    };

    let mail = MailQueue::start(mailer::transport_from_config(&config.mail)?);

    let port = config.port;
    let state = AppState {
        db,
        config: Arc::new(config),
        identity,
        avatars,
        ai,
        mail,
        started_at: Instant::now(),
    };
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
