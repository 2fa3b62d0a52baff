use anyhow::bail;
use std::path::PathBuf;

/// How bearer tokens are verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMode {
    /// Ask the hosted auth service about every token; admin calls use the
    /// service-role key.
    Hosted { url: String, service_key: String },
    /// Verify HS256 tokens with the auth service's signing secret.
    LocalJwt { secret: String },
}

/// Where avatar objects live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageConfig {
    /// Files under `{data_dir}/avatars`, served at `/avatars`.
    Local,
    /// Object storage at `{url}/storage/v1`, authenticated with the service key.
    Hosted {
        url: String,
        bucket: String,
        service_key: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailConfig {
    /// HTTP mail API endpoint. Without it, mail is only logged.
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub from: String,
}

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub data_dir: PathBuf,
    /// Public origin of this server, used to build local avatar URLs.
    pub public_url: String,
    /// Browser origin allowed by CORS and linked from emails. `None` allows any.
    pub frontend_url: Option<String>,
    pub auth: AuthMode,
    pub storage: StorageConfig,
    pub ai: Option<AiConfig>,
    pub mail: MailConfig,
}

pub const DEFAULT_PORT: u16 = 4000;
pub const DEFAULT_AI_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_AI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_BUCKET: &str = "avatars";
pub const DEFAULT_MAIL_FROM: &str = "Taskdeck <noreply@taskdeck.app>";

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from any key lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let port = match get("PORT") {
            Some(raw) => raw
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a port number, got {raw:?}"))?,
            None => DEFAULT_PORT,
        };
        let data_dir = get("TASKDECK_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("data"));
        let public_url = get("TASKDECK_PUBLIC_URL")
            .unwrap_or_else(|| format!("http://localhost:{port}"))
            .trim_end_matches('/')
            .to_string();
        let frontend_url = get("FRONTEND_URL").map(|u| u.trim_end_matches('/').to_string());

        let service_key = get("AUTH_SERVICE_KEY");
        let auth = match (get("AUTH_URL"), service_key.clone(), get("AUTH_JWT_SECRET")) {
            (Some(url), Some(service_key), _) => AuthMode::Hosted { url, service_key },
            (_, _, Some(secret)) => AuthMode::LocalJwt { secret },
            (Some(_), None, None) => bail!("AUTH_URL is set but AUTH_SERVICE_KEY is missing"),
            (None, _, None) => bail!("either AUTH_URL + AUTH_SERVICE_KEY or AUTH_JWT_SECRET must be set"),
        };

        let storage = match (get("STORAGE_URL"), service_key) {
            (Some(url), Some(service_key)) => StorageConfig::Hosted {
                url: url.trim_end_matches('/').to_string(),
                bucket: get("AVATAR_BUCKET").unwrap_or_else(|| DEFAULT_BUCKET.into()),
                service_key,
            },
            (Some(_), None) => bail!("STORAGE_URL requires AUTH_SERVICE_KEY"),
            (None, _) => StorageConfig::Local,
        };

        let ai = get("GOOGLE_GENERATIVE_AI_API_KEY").map(|api_key| AiConfig {
            api_key,
            model: get("AI_MODEL").unwrap_or_else(|| DEFAULT_AI_MODEL.into()),
            base_url: get("AI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_AI_BASE_URL.into())
                .trim_end_matches('/')
                .to_string(),
        });

        let mail = MailConfig {
            api_url: get("MAIL_API_URL"),
            api_key: get("MAIL_API_KEY"),
            from: get("MAIL_FROM").unwrap_or_else(|| DEFAULT_MAIL_FROM.into()),
        };

        Ok(Self {
            port,
            data_dir,
            public_url,
            frontend_url,
            auth,
            storage,
            ai,
            mail,
        })
    }

    /// Link target for emails.
    pub fn app_url(&self) -> &str {
        self.frontend_url.as_deref().unwrap_or(&self.public_url)
    }
}
