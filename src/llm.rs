//! Language-model client.
//!
//! The service only needs "prompt in, text out". `ModelClient` is that seam;
//! `ChatCompletionsClient` talks to any OpenAI-compatible chat completions
//! endpoint (Fireworks by default).

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::config::ModelConfig;
use crate::error::{Error, Result};

const BODY_PREVIEW_LIMIT: usize = 512;

/// What the service asks the model
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub task_text: String,
    pub context: Option<String>,
    /// Current local time as shown to the model
    pub now: DateTime<Local>,
}

impl ModelRequest {
    pub fn weekday(&self) -> String {
        self.now.format("%A").to_string()
    }

    /// Render the prompt sent to the model
    pub fn prompt(&self) -> String {
        let context = self.context.as_deref().unwrap_or("");
        format!(
            r#"You turn a user's task into well-timed reminders.

Current time: {now}
Current day: {weekday}

Task: "{task}"
Context: {context}

Reply with JSON of exactly this shape:

{{
    "tasks": [
        {{
            "title": "short title",
            "description": "one or two sentences",
            "reminders": [
                {{
                    "time": "YYYY-MM-DD HH:MM:SS",
                    "message": "what to tell the user",
                    "type": "beforehand | exact | followup"
                }}
            ],
            "priority": "high | medium | low"
        }}
    ]
}}

Rules:
1. Compute times relative to the current time, in 24-hour local time.
2. Important tasks get several reminders (one beforehand, one at the exact time).
3. Meetings get a reminder 15-30 minutes before; deadlines also get one the day before.
4. Keep messages short and natural.
5. Output only the JSON."#,
            now = self.now.format("%Y-%m-%d %H:%M:%S"),
            weekday = self.weekday(),
            task = self.task_text,
        )
    }
}

/// Prompt in, free text out
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn complete(&self, request: &ModelRequest) -> Result<String>;
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible chat completions client
pub struct ChatCompletionsClient {
    client: Client,
    api_url: String,
    model: String,
    api_key: Option<String>,
    temperature: f32,
    max_tokens: u32,
}

impl ChatCompletionsClient {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|err| Error::Model(format!("failed to build HTTP client: {err}")))?;

        let api_key = config.api_key();
        if api_key.is_none() {
            tracing::warn!(env = %config.api_key_env, "no model API key set; requests will be unauthenticated");
        }

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            model: config.model.clone(),
            api_key,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl ModelClient for ChatCompletionsClient {
    async fn complete(&self, request: &ModelRequest) -> Result<String> {
        let prompt = request.prompt();
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: &prompt,
            }],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let mut builder = self.client.post(&self.api_url).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        tracing::debug!(url = %self.api_url, model = %self.model, "calling model");
        let response = builder.send().await.map_err(|err| {
            if err.is_timeout() {
                Error::Model(format!("model call timed out: {err}"))
            } else {
                Error::Model(format!("model request failed: {err}"))
            }
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| Error::Model(format!("unreadable model response: {err}")))?;
        completion_text(status, &body)
    }
}

/// Turn an HTTP status and body into the completion text
pub fn completion_text(status: StatusCode, body: &str) -> Result<String> {
    if !status.is_success() {
        return Err(Error::Model(format!(
            "model API returned HTTP {}: {}",
            status.as_u16(),
            preview(body)
        )));
    }

    let parsed: ChatResponse = serde_json::from_str(body)
        .map_err(|err| Error::Model(format!("unreadable model response: {err}")))?;

    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| Error::Model("model response has no message content".to_string()))
}

fn preview(body: &str) -> &str {
    let trimmed = body.trim_end();
    if trimmed.len() <= BODY_PREVIEW_LIMIT {
        return trimmed;
    }
    let mut end = BODY_PREVIEW_LIMIT;
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    &trimmed[..end]
}
