use anyhow::{anyhow, Result};
use reqwest::Client;
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::normalizer;

// The indentation before "- Modularization" is part of the literal text.
pub const NOT_CONFIGURED_CHECKLIST: &str = concat!(
    "Gemini API key not configured or client creation failed. Please set GEMINI_API_KEY (or GOOGLE_API_KEY) in your environment.\n\n",
    "Fallback checklist:\n",
    "- Readability: check variable and function names\n",
    "- Comments: ensure important blocks have comments\n            ",
    "- Modularization: extract large functions into smaller units\n",
    "- Security: validate and sanitize inputs\n",
    "- Performance: look for repeated work inside loops\n",
);

const CALL_FAILED_CHECKLIST: &str = "Fallback checklist:\n\
- Readability: check variable names\n\
- Comments: check presence of comments\n\
- Modularization: check long functions\n\
- Security: check for unsafe input handling\n";

pub fn call_failed_checklist(error: &str) -> String {
    format!(
        "LLM call to Gemini failed: {}\n\n{}",
        error, CALL_FAILED_CHECKLIST
    )
}

pub fn build_prompt(code: &str, language_hint: &str) -> String {
    let hint = match language_hint.trim() {
        "" => "unspecified",
        hint => hint,
    };
    format!(
        "You are an expert senior software engineer and code reviewer.\n\
        Analyze the following source code for readability, modularity, maintainability, potential bugs, security issues, and performance pitfalls.\n\
        Provide: (1) Short summary, (2) Line-by-line important issues (if any), (3) Suggested improvements, (4) Example refactor or code snippet if appropriate.\n\
        \n\
        Language hint: {}\n\
        \n\
        Code:\n\
        \n\
        {}\n",
        hint, code
    )
}

#[derive(Debug, Clone)]
pub struct AIConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub api_base: String,
    pub timeout: Duration,
}

/// How a review was produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewOutcome {
    /// Model answered; text has been through the normalizer.
    Reviewed(String),
    /// No API key, so no call was made.
    NotConfigured,
    /// The call was made and failed.
    CallFailed(String),
}

impl ReviewOutcome {
    /// Text to show and store. Fallbacks are returned verbatim.
    pub fn into_text(self) -> String {
        match self {
            ReviewOutcome::Reviewed(text) => text,
            ReviewOutcome::NotConfigured => NOT_CONFIGURED_CHECKLIST.to_string(),
            ReviewOutcome::CallFailed(error) => call_failed_checklist(&error),
        }
    }

    pub fn is_fallback(&self) -> bool {
        !matches!(self, ReviewOutcome::Reviewed(_))
    }
}

#[derive(Clone)]
pub struct AIService {
    config: AIConfig,
    client: Option<Client>,
}

impl AIService {
    pub fn new(config: AIConfig) -> Self {
        let client = match Client::builder().timeout(config.timeout).build() {
            Ok(client) => Some(client),
            Err(e) => {
                warn!("Failed to build HTTP client: {}", e);
                None
            }
        };
        Self { config, client }
    }

    pub fn is_configured(&self) -> bool {
        self.config.api_key.is_some() && self.client.is_some()
    }

    /// Review `code`, falling back to a fixed checklist when Gemini is
    /// unavailable. Never fails.
    pub async fn review_code(&self, code: &str, language_hint: &str) -> String {
        self.review(code, language_hint).await.into_text()
    }

    pub async fn review(&self, code: &str, language_hint: &str) -> ReviewOutcome {
        let (Some(api_key), Some(client)) = (&self.config.api_key, &self.client) else {
            warn!("Gemini API key not configured, returning fallback checklist");
            return ReviewOutcome::NotConfigured;
        };

        let prompt = build_prompt(code, language_hint);
        let start_time = Instant::now();

        match self.call_gemini(client, api_key, &prompt).await {
            Ok(raw) => {
                info!(
                    "Gemini review received ({} chars in {:?})",
                    raw.len(),
                    start_time.elapsed()
                );
                ReviewOutcome::Reviewed(normalizer::normalize(&raw))
            }
            Err(e) => {
                warn!("Gemini call failed after {:?}: {:#}", start_time.elapsed(), e);
                ReviewOutcome::CallFailed(format!("{:#}", e))
            }
        }
    }

    async fn call_gemini(&self, client: &Client, api_key: &str, prompt: &str) -> Result<String> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.config.api_base, self.config.model
        );

        let body = serde_json::json!({
            "contents": [{
                "parts": [{"text": prompt}]
            }]
        });

        let response = client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await?;
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow!(
                "Gemini API error: {} - Body: {}",
                status,
                error_text
            ));
        }

        let json: Value = response.json().await?;
        gemini_text(&json)
    }
}

/// Concatenated text parts of the first candidate.
pub fn gemini_text(json: &Value) -> Result<String> {
    let parts = json["candidates"][0]["content"]["parts"]
        .as_array()
        .ok_or_else(|| anyhow!("Invalid Gemini response format"))?;

    let text: String = parts
        .iter()
        .filter_map(|part| part["text"].as_str())
        .collect();

    if text.is_empty() {
        return Err(anyhow!("Gemini response contained no text"));
    }
    Ok(text)
}
