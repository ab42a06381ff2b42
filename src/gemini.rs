use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::capabilities::TextGenerator;
use crate::config::GeminiSettings;
use crate::error::{CoachError, CoachResult};

const API_KEY_HEADER: &str = "x-goog-api-key";

pub struct GeminiGenerator {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl GeminiGenerator {
    pub fn new(api_key: String, settings: &GeminiSettings) -> Self {
        Self {
            client: Client::new(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            api_key,
        }
    }

    /// `None` when the configured API key variable is unset or empty.
    pub fn from_env(settings: &GeminiSettings) -> Option<Self> {
        std::env::var(&settings.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .map(|key| Self::new(key, settings))
    }
}

fn extract_text(body: &Value) -> CoachResult<String> {
    body["candidates"][0]["content"]["parts"][0]["text"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| CoachError::Parse("Gemini response had no candidate text".into()))
}

/// Transport errors carry the request URL; drop it so logs and stored
/// results only see the cause.
fn transport_error(err: reqwest::Error) -> CoachError {
    CoachError::ExternalCall(format!("Gemini request failed: {}", err.without_url()))
}

fn classify_status(status: StatusCode, body: &str) -> CoachError {
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        CoachError::ExternalCall(format!("Gemini returned {status}"))
    } else {
        CoachError::Config(format!("Gemini rejected the request ({status}): {body}"))
    }
}

#[async_trait]
impl TextGenerator for GeminiGenerator {
    async fn generate(&self, prompt: &str) -> CoachResult<String> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let payload = json!({
            "contents": [{ "parts": [{ "text": prompt }] }]
        });

        debug!(model = %self.model, prompt_chars = prompt.len(), "sending Gemini request");
        let response = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let body: Value = response
            .json()
            .await
            .map_err(transport_error)?;
        extract_text(&body)
    }
}

/// Canned responses for running without an API key.
#[derive(Debug, Clone, Default)]
pub struct OfflineGenerator;

const OFFLINE_PLAN: &str = "Day 1 | Foundations | Review core concepts | Build vocabulary\n\n\
Day 2 | Practice | Worked problems | Apply the basics\n\n\
Day 3 | Review | Spaced repetition of days 1-2 | Retain\n\n\
Day 4 | Weak topics | Extra time on weak areas | Close gaps\n\n\
Day 5 | Mixed practice | Problems across subjects | Transfer\n\n\
Day 6 | Rest and light reading | Buffer | Recover\n\n\
Day 7 | Review and self-test | Spaced repetition | Consolidate";

const OFFLINE_QUIZ: &str = "Quiz Questions:\n\
What is Newton's First Law of Motion? | Force equals mass times acceleration | An object at rest stays at rest unless acted upon | For every action there is an equal reaction | Energy is conserved | B\n\
An object with 10J kinetic energy and 2kg mass moves at about? | 2.5 m/s | 3.16 m/s | 5 m/s | 10 m/s | B";

#[async_trait]
impl TextGenerator for OfflineGenerator {
    async fn generate(&self, prompt: &str) -> CoachResult<String> {
        let lowered = prompt.to_lowercase();
        let text = if lowered.contains("quiz") || lowered.contains("questions") {
            OFFLINE_QUIZ.to_string()
        } else if lowered.contains("study schedule") || lowered.contains("study plan") {
            OFFLINE_PLAN.to_string()
        } else {
            let preview: String = prompt.chars().take(100).collect();
            format!("Offline response to: {preview}")
        };
        info!("using offline text generator");
        Ok(text)
    }
}
