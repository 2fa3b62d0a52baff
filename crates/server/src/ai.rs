//! Language model client and the two assistant operations built on it.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use taskdeck_api::assistant::{self, ParseError};
use taskdeck_api::{Categorization, Prioritization, PrioritizeRequest};

use crate::config::AiConfig;

#[derive(Debug, thiserror::Error)]
pub enum AiError {
    #[error("model request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("model returned {status}: {body}")]
    Upstream {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("model returned no text")]
    EmptyResponse,
    #[error("malformed model output: {0}")]
    MalformedOutput(#[from] ParseError),
}

/// A text-in, text-out model.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, prompt: &str, temperature: f32) -> Result<String, AiError>;
}

/// Google Gemini `generateContent` over REST.
pub struct GeminiModel {
    client: reqwest::Client,
    config: AiConfig,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    text: Option<String>,
}

impl GeminiModel {
    pub fn new(config: AiConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl LanguageModel for GeminiModel {
    async fn generate(&self, prompt: &str, temperature: f32) -> Result<String, AiError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url, self.config.model
        );
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": { "temperature": temperature },
        });
        let resp = self
            .client
            .post(url)
            .query(&[("key", self.config.api_key.as_str())])
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AiError::Upstream {
                status,
                body: body.chars().take(200).collect(),
            });
        }

        let parsed: GenerateResponse = resp.json().await?;
        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();
        if text.trim().is_empty() {
            return Err(AiError::EmptyResponse);
        }
        Ok(text)
    }
}

pub async fn categorize(
    model: &dyn LanguageModel,
    title: &str,
    description: Option<&str>,
    priority: Option<&str>,
) -> Result<Categorization, AiError> {
    let prompt = assistant::categorize_prompt(title, description, priority);
    let text = model
        .generate(&prompt, assistant::CATEGORIZE_TEMPERATURE)
        .await?;
    Ok(assistant::parse_categorization(&text)?)
}

pub async fn prioritize(
    model: &dyn LanguageModel,
    req: &PrioritizeRequest,
) -> Result<Prioritization, AiError> {
    let prompt = assistant::prioritize_prompt(&req.tasks, req.user_context.as_ref());
    let text = model
        .generate(&prompt, assistant::PRIORITIZE_TEMPERATURE)
        .await?;
    Ok(assistant::parse_prioritization(&text)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Canned {
        reply: String,
        seen: Mutex<Vec<f32>>,
    }

    #[async_trait]
    impl LanguageModel for Canned {
        async fn generate(&self, _prompt: &str, temperature: f32) -> Result<String, AiError> {
            self.seen.lock().unwrap().push(temperature);
            Ok(self.reply.clone())
        }
    }

    fn canned(reply: &str) -> Canned {
        Canned {
            reply: reply.into(),
            seen: Mutex::new(Vec::new()),
        }
    }

    #[tokio::test]
    async fn categorize_parses_fenced_json() {
        let model = canned("```json\n{\"category\":\"Work\",\"confidence\":140,\"reasoning\":\"job\"}\n```");
        let result = categorize(&model, "Ship release", None, Some("high")).await.unwrap();
        assert_eq!(result.category, "Work");
        assert_eq!(result.confidence, 100);
        assert_eq!(*model.seen.lock().unwrap(), vec![assistant::CATEGORIZE_TEMPERATURE]);
    }

    #[tokio::test]
    async fn malformed_output_is_a_typed_error() {
        let model = canned("I think this is about work.");
        let err = categorize(&model, "Ship release", None, None).await.unwrap_err();
        assert!(matches!(err, AiError::MalformedOutput(ParseError::NotJson(_))));

        let model = canned("[1, 2]");
        let err = categorize(&model, "Ship release", None, None).await.unwrap_err();
        assert!(matches!(err, AiError::MalformedOutput(ParseError::NotObject)));
    }

    #[test]
    fn gemini_response_text_is_concatenated() {
        let parsed: GenerateResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"{\"a\":"},{"text":"1}"}]}}]}"#,
        )
        .unwrap();
        let text: String = parsed.candidates[0]
            .content
            .as_ref()
            .unwrap()
            .parts
            .iter()
            .filter_map(|p| p.text.clone())
            .collect();
        assert_eq!(text, "{\"a\":1}");
    }
}
