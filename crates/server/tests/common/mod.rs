#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tower::ServiceExt;

use taskdeck_api::crypto;
use taskdeck_server::{
    AppState,
    ai::{AiError, LanguageModel},
    avatars::{AvatarStore, StoreError},
    config::{AppConfig, AuthMode, MailConfig, StorageConfig},
    identity::{Identity, IdentityError, IdentityProvider, LocalJwtIdentity},
    mailer::{MailError, MailQueue, MailTransport, OutgoingMail},
    router, storage,
};

pub const SECRET: &str = "integration-test-secret";

/// Side effects on external services, in the order they happened.
pub type EventLog = Arc<Mutex<Vec<String>>>;

/// Email addresses the identity service knows, by user id.
pub type Directory = Arc<Mutex<HashMap<String, String>>>;

struct RecordingIdentity {
    inner: LocalJwtIdentity,
    directory: Directory,
    log: EventLog,
}

#[async_trait]
impl IdentityProvider for RecordingIdentity {
    async fn verify(&self, token: &str) -> Result<Identity, IdentityError> {
        self.inner.verify(token).await
    }

    async fn lookup_email(&self, user_id: &str) -> Result<Option<String>, IdentityError> {
        Ok(self.directory.lock().unwrap().get(user_id).cloned())
    }

    async fn delete_user(&self, user_id: &str) -> Result<(), IdentityError> {
        self.log.lock().unwrap().push(format!("identity.delete {user_id}"));
        Ok(())
    }
}

struct RecordingStore {
    log: EventLog,
}

#[async_trait]
impl AvatarStore for RecordingStore {
    async fn put(&self, key: &str, _content_type: &str, _bytes: Vec<u8>) -> Result<String, StoreError> {
        self.log.lock().unwrap().push(format!("avatar.put {key}"));
        Ok(format!("http://storage.test/avatars/{key}"))
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.log.lock().unwrap().push(format!("avatar.remove {key}"));
        Ok(())
    }
}

struct RecordingTransport {
    outbox: Arc<Mutex<Vec<OutgoingMail>>>,
}

#[async_trait]
impl MailTransport for RecordingTransport {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        self.outbox.lock().unwrap().push(mail.clone());
        Ok(())
    }
}

/// Returns the same text for every prompt.
pub struct CannedModel(pub &'static str);

#[async_trait]
impl LanguageModel for CannedModel {
    async fn generate(&self, _prompt: &str, _temperature: f32) -> Result<String, AiError> {
        Ok(self.0.to_string())
    }
}

pub struct TestApp {
    pub state: AppState,
    pub log: EventLog,
    pub outbox: Arc<Mutex<Vec<OutgoingMail>>>,
    directory: Directory,
    _dir: tempfile::TempDir,
}

pub struct Response {
    pub status: StatusCode,
    pub body: Value,
}

impl TestApp {
    pub fn new() -> Self {
        Self::build(None)
    }

    pub fn with_model(model: impl LanguageModel + 'static) -> Self {
        let model: Arc<dyn LanguageModel> = Arc::new(model);
        Self::build(Some(model))
    }

    fn build(ai: Option<Arc<dyn LanguageModel>>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db = storage::init_db(dir.path()).unwrap();
        let log: EventLog = Arc::default();
        let directory: Directory = Arc::default();
        let outbox = Arc::new(Mutex::new(Vec::new()));

        let config = AppConfig {
            port: 0,
            data_dir: dir.path().to_path_buf(),
            public_url: "http://localhost:4000".into(),
            frontend_url: Some("http://app.test".into()),
            auth: AuthMode::LocalJwt {
                secret: SECRET.into(),
            },
            storage: StorageConfig::Hosted {
                url: "http://storage.test".into(),
                bucket: "avatars".into(),
                service_key: "k".into(),
            },
            ai: None,
            mail: MailConfig {
                api_url: None,
                api_key: None,
                from: "Taskdeck <noreply@taskdeck.test>".into(),
            },
        };

        let state = AppState {
            db,
            config: Arc::new(config),
            identity: Arc::new(RecordingIdentity {
                inner: LocalJwtIdentity::new(SECRET.into()),
                directory: directory.clone(),
                log: log.clone(),
            }),
            avatars: Arc::new(RecordingStore { log: log.clone() }),
            ai,
            mail: MailQueue::start(Arc::new(RecordingTransport {
                outbox: outbox.clone(),
            })),
            started_at: Instant::now(),
        };

        Self {
            state,
            log,
            outbox,
            directory,
            _dir: dir,
        }
    }

    fn app(&self) -> Router {
        router(self.state.clone())
    }

    pub async fn send(&self, req: Request<Body>) -> Response {
        let resp = self.app().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        Response { status, body }
    }

    pub async fn call(&self, method: Method, uri: &str, user: Option<&User>, body: Option<Value>) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", user.token));
        }
        let req = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(req).await
    }

    pub async fn get(&self, uri: &str, user: &User) -> Response {
        self.call(Method::GET, uri, Some(user), None).await
    }

    pub async fn post(&self, uri: &str, user: &User, body: Value) -> Response {
        self.call(Method::POST, uri, Some(user), Some(body)).await
    }

    pub async fn put(&self, uri: &str, user: &User, body: Value) -> Response {
        self.call(Method::PUT, uri, Some(user), Some(body)).await
    }

    pub async fn patch(&self, uri: &str, user: &User, body: Value) -> Response {
        self.call(Method::PATCH, uri, Some(user), Some(body)).await
    }

    pub async fn delete(&self, uri: &str, user: &User) -> Response {
        self.call(Method::DELETE, uri, Some(user), None).await
    }

    /// A user registered with the identity service who has never called the
    /// API, so no profile row exists yet.
    pub fn signed_up_user(&self, name: &str) -> User {
        let id = uuid::Uuid::new_v4().to_string();
        let email = format!("{name}@example.com");
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs();
        self.directory
            .lock()
            .unwrap()
            .insert(id.clone(), email.clone());
        User {
            token: crypto::sign_jwt(&id, Some(&email), SECRET, now),
            id,
            email,
        }
    }

    /// Sign a token for a fresh user and touch `/api/profile` so the
    /// profile row exists.
    pub async fn user(&self, name: &str) -> User {
        let user = self.signed_up_user(name);
        let resp = self.get("/api/profile", &user).await;
        assert_eq!(resp.status, StatusCode::OK, "{}", resp.body);
        user
    }

    /// Create a team led by `leader` with the given members.
    pub async fn team(&self, leader: &User, members: &[&User]) -> String {
        let resp = self
            .post("/api/teams", leader, serde_json::json!({ "name": "Platform" }))
            .await;
        assert_eq!(resp.status, StatusCode::CREATED, "{}", resp.body);
        let team_id = resp.body["data"]["id"].as_str().unwrap().to_string();
        for member in members {
            let resp = self
                .post(
                    &format!("/api/teams/{team_id}/members"),
                    leader,
                    serde_json::json!({ "user_id": member.id }),
                )
                .await;
            assert_eq!(resp.status, StatusCode::CREATED, "{}", resp.body);
        }
        team_id
    }

    /// Wait for the mail worker to drain `n` messages.
    pub async fn wait_for_mail(&self, n: usize) -> Vec<OutgoingMail> {
        for _ in 0..100 {
            if self.outbox.lock().unwrap().len() >= n {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.outbox.lock().unwrap().clone()
    }

    pub fn events(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

pub struct User {
    pub id: String,
    pub email: String,
    pub token: String,
}
