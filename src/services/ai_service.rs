use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::Arc;

use crate::models::ai::*;
use crate::models::record::Insight;
use crate::utils::http::build_ai_client;

/// Meta-commentary the model tends to wrap its answer in.
pub const DEFAULT_DENY_LIST: &[&str] = &["here are", "insights", "following", "bullet points"];

/// Anything that turns a prompt into text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

// ========== OpenAI-compatible chat client ==========

pub struct ChatCompletionClient {
    client: reqwest::Client,
    config: AIConfig,
}

impl ChatCompletionClient {
    pub fn new(config: AIConfig) -> Result<Self> {
        let client = build_ai_client(10, config.timeout_secs)?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl TextGenerator for ChatCompletionClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let api_key = self
            .config
            .api_key
            .as_ref()
            .ok_or_else(|| anyhow!("text generation API key not configured"))?;

        let req = ChatCompletionRequest {
            model: self.config.model_name.clone(),
            messages: vec![
                ChatMessage::system("You are a concise Indian stock market analyst writing for retail investors."),
                ChatMessage::user(prompt),
            ],
            max_tokens: Some(self.config.max_tokens),
            temperature: Some(self.config.temperature),
            stream: Some(false),
        };

        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", api_key.expose()))
            .header("Content-Type", "application/json")
            .json(&req)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            return Err(anyhow!("AI API error ({}): {}", status, snippet(&body)));
        }

        let response: ChatCompletionResponse = serde_json::from_str(&body)
            .map_err(|e| anyhow!("AI response parse error: {} body: {}", e, snippet(&body)))?;

        let content = response
            .choices
            .first()
            .and_then(|c| c.message.as_ref())
            .and_then(|m| m.content.clone())
            .unwrap_or_default();

        if content.trim().is_empty() {
            return Err(anyhow!("AI response had no content"));
        }
        if let Some(usage) = response.usage {
            log::debug!("AI tokens used: {} (prompt {})", usage.total_tokens, usage.prompt_tokens);
        }
        Ok(content)
    }
}

// ========== Insight generation ==========

/// What to ask for: a compact summary of one record plus the format constraints.
pub struct InsightBrief<'a> {
    /// e.g. "sector performance"
    pub topic: &'a str,
    /// Already bounded by the caller (top-N rows).
    pub summary: String,
    pub count: usize,
    /// Extra guidance appended to the fixed prompt.
    pub focus: &'a str,
    /// Lines containing any of these (case-insensitive) are dropped.
    pub deny: &'a [&'a str],
}

/// Wraps an optional text generator. With no generator (missing credentials)
/// or on any failure, every call yields `Insight::unavailable()`.
#[derive(Clone)]
pub struct InsightGenerator {
    backend: Option<Arc<dyn TextGenerator>>,
}

impl InsightGenerator {
    pub fn new(backend: Arc<dyn TextGenerator>) -> Self {
        Self { backend: Some(backend) }
    }

    pub fn disabled() -> Self {
        Self { backend: None }
    }

    pub fn from_config(config: &AIConfig) -> Self {
        if config.api_key.is_none() {
            return Self::disabled();
        }
        match ChatCompletionClient::new(config.clone()) {
            Ok(client) => Self::new(Arc::new(client)),
            Err(e) => {
                log::error!("Failed to build AI client, insights disabled: {}", e);
                Self::disabled()
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    /// Raw completion for callers that parse the reply themselves.
    pub async fn complete(&self, prompt: &str) -> Result<String> {
        match &self.backend {
            Some(backend) => backend.generate(prompt).await,
            None => Err(anyhow!("text generation API key not configured")),
        }
    }

    pub async fn generate(&self, brief: &InsightBrief<'_>) -> Insight {
        if !self.is_enabled() {
            log::warn!("Cannot generate {} insights: API key not available", brief.topic);
            return Insight::unavailable();
        }

        let prompt = build_prompt(brief);
        match self.complete(&prompt).await {
            Ok(raw) => {
                let lines = clean_bullets(&raw, brief.deny, brief.count);
                if lines.is_empty() {
                    log::warn!("{} insights were empty after cleanup", brief.topic);
                    Insight::unavailable()
                } else {
                    Insight::new(lines)
                }
            }
            Err(e) => {
                log::error!("Error generating {} insights: {}", brief.topic, e);
                Insight::unavailable()
            }
        }
    }
}

fn snippet(body: &str) -> String {
    body.chars().take(200).collect()
}

fn build_prompt(brief: &InsightBrief<'_>) -> String {
    format!(
        "Based on the following {topic} data, provide exactly {count} concise bullet-point insights.\n\
        \n\
        {summary}\n\
        \n\
        Requirements:\n\
        - Exactly {count} bullet points, one per line, each starting with \"- \"\n\
        - Each point must stand on its own; do not refer to other points\n\
        - Keep every point under 30 words and mention concrete figures\n\
        {focus}\n\
        Do not add an introduction or a conclusion.",
        topic = brief.topic,
        count = brief.count,
        summary = brief.summary,
        focus = brief.focus,
    )
}

/// Turn a raw model reply into at most `count` "- "-prefixed lines.
pub fn clean_bullets(raw: &str, deny: &[&str], count: usize) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| {
            let lower = line.to_lowercase();
            !deny.iter().any(|d| lower.contains(&d.to_lowercase()))
        })
        .filter_map(|line| {
            let body = strip_marker(line);
            if body.is_empty() { None } else { Some(format!("- {}", body)) }
        })
        .take(count)
        .collect()
}

/// Drop leading list markers ("- ", "* ", "• ", "1. ", "2) ", "**"), repeatedly.
/// A sign glued to a number ("-1.2%") is not a marker.
fn strip_marker(line: &str) -> &str {
    let mut s = line.trim();
    loop {
        let before = s;
        for marker in ["- ", "* ", "• ", "**"] {
            if let Some(rest) = s.strip_prefix(marker) {
                s = rest.trim_start();
            }
        }
        let digits = s.chars().take_while(|c| c.is_ascii_digit()).count();
        if digits > 0 && (s[digits..].starts_with(". ") || s[digits..].starts_with(") ")) {
            s = s[digits + 2..].trim_start();
        }
        if s == before {
            return s;
        }
    }
}
