//! Outgoing email.
//!
//! Handlers never wait on mail delivery. They enqueue an [`OutgoingMail`] on
//! the [`MailQueue`]; a single background task hands it to the configured
//! [`MailTransport`] and records the outcome in counters exposed on
//! `/api/health`.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

use taskdeck_api::{MailStats, TeamRole};

use crate::config::MailConfig;

/// Pending messages beyond this are dropped (and counted).
pub const QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("mail request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("mail service returned {0}")]
    Upstream(reqwest::StatusCode),
}

#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError>;
}

pub fn transport_from_config(config: &MailConfig) -> anyhow::Result<Arc<dyn MailTransport>> {
    let transport: Arc<dyn MailTransport> = match &config.api_url {
        Some(url) => Arc::new(HttpMailTransport::new(
            url.clone(),
            config.api_key.clone(),
            config.from.clone(),
        )?),
        None => {
            tracing::warn!("MAIL_API_URL not set; outgoing mail will only be logged");
            Arc::new(LogMailTransport)
        }
    };
    Ok(transport)
}

/// Posts `{from, to, subject, html}` as JSON to a transactional mail API.
pub struct HttpMailTransport {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    from: String,
}

#[derive(Serialize)]
struct MailPayload<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html: &'a str,
}

impl HttpMailTransport {
    pub fn new(url: String, api_key: Option<String>, from: String) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self {
            client,
            url,
            api_key,
            from,
        })
    }
}

#[async_trait]
impl MailTransport for HttpMailTransport {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        let mut req = self.client.post(&self.url).json(&MailPayload {
            from: &self.from,
            to: &mail.to,
            subject: &mail.subject,
            html: &mail.html,
        });
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let resp = req.send().await?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(MailError::Upstream(resp.status()))
        }
    }
}

/// Logs instead of sending. Used when no mail API is configured.
pub struct LogMailTransport;

#[async_trait]
impl MailTransport for LogMailTransport {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        tracing::info!(to = %mail.to, subject = %mail.subject, "mail (not sent, no transport configured)");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Queue
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Counters {
    sent: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

/// Handle to the background mail worker. Cheap to clone.
#[derive(Clone)]
pub struct MailQueue {
    tx: mpsc::Sender<OutgoingMail>,
    counters: Arc<Counters>,
}

impl MailQueue {
    /// Spawn the worker on the current runtime.
    pub fn start(transport: Arc<dyn MailTransport>) -> Self {
        let (tx, mut rx) = mpsc::channel::<OutgoingMail>(QUEUE_CAPACITY);
        let counters = Arc::new(Counters::default());
        let worker_counters = Arc::clone(&counters);

        tokio::spawn(async move {
            while let Some(mail) = rx.recv().await {
                match transport.send(&mail).await {
                    Ok(()) => {
                        worker_counters.sent.fetch_add(1, Ordering::Relaxed);
                        tracing::debug!(to = %mail.to, "mail sent");
                    }
                    Err(e) => {
                        worker_counters.failed.fetch_add(1, Ordering::Relaxed);
                        tracing::warn!(to = %mail.to, "mail delivery failed: {e}");
                    }
                }
            }
            tracing::debug!("mail queue closed");
        });

        Self { tx, counters }
    }

    /// Queue a message without waiting. A full or closed queue drops it.
    pub fn enqueue(&self, mail: OutgoingMail) {
        if let Err(e) = self.tx.try_send(mail) {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::warn!("mail dropped: {e}");
        }
    }

    pub fn stats(&self) -> MailStats {
        MailStats {
            sent: self.counters.sent.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }
}

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

pub struct TeamInvitation<'a> {
    pub to: &'a str,
    pub recipient_name: &'a str,
    pub team_name: &'a str,
    pub inviter_name: &'a str,
    pub role: TeamRole,
    pub app_url: &'a str,
}

pub fn team_invitation(inv: &TeamInvitation<'_>) -> OutgoingMail {
    let permissions = match inv.role {
        TeamRole::Leader => "You will have full team management permissions.",
        TeamRole::Member => "You can view and update team tasks.",
    };
    let html = format!(
        "<!DOCTYPE html>\n<html>\n<body style=\"font-family: sans-serif; line-height: 1.6; color: #333; max-width: 600px; margin: 0 auto;\">\n\
         <h1>Team Invitation</h1>\n\
         <p>Hi {recipient},</p>\n\
         <p><strong>{inviter}</strong> has invited you to join their team!</p>\n\
         <h2>Team: {team}</h2>\n\
         <p><strong>Your Role:</strong> {role}</p>\n\
         <p>{permissions}</p>\n\
         <p><a href=\"{url}/dashboard\">View in Dashboard</a></p>\n\
         <p style=\"color: #6b7280; font-size: 14px;\">You're receiving this email because someone added you to a team on Taskdeck. \
         If you didn't expect this invitation, you can safely ignore this email.</p>\n\
         </body>\n</html>\n",
        recipient = escape_html(inv.recipient_name),
        inviter = escape_html(inv.inviter_name),
        team = escape_html(inv.team_name),
        role = inv.role.label(),
        url = escape_html(inv.app_url),
    );
    OutgoingMail {
        to: inv.to.to_string(),
        subject: format!("You've been invited to join {}!", inv.team_name),
        html,
    }
}
