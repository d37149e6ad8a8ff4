//! Chat session — all mutable state for one conversation and the
//! operations that fold API results into it.

use std::cmp::Ordering;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use crate::client::{ChatTransport, CompletionRequest};
use crate::error::{KestrelError, Result};
use crate::message::ChatMessage;
use crate::model::{format_cost, ModelDescriptor, UsageStats};

pub const DEFAULT_MODEL: &str = "anthropic/claude-3-sonnet:beta";
pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const MAX_TOKENS: u32 = 4096;
const MAX_RECENT_MODELS: usize = 10;

pub fn default_enabled_models() -> Vec<String> {
    vec![
        "anthropic/claude-3-sonnet:beta".to_string(),
        "anthropic/claude-2.1".to_string(),
        "openai/gpt-4-turbo".to_string(),
        "openai/gpt-3.5-turbo".to_string(),
    ]
}

/// Initial settings for a session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub api_key: String,
    pub temperature: f64,
    pub default_model: String,
    pub enabled_models: Vec<String>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            temperature: DEFAULT_TEMPERATURE,
            default_model: DEFAULT_MODEL.to_string(),
            enabled_models: default_enabled_models(),
        }
    }
}

/// One chat session: API key, history, model catalog, usage accounting.
///
/// The session issues exactly one external call pattern — request,
/// await JSON, fold the result into state. At most one completion is
/// in flight at a time; a second concurrent send fails fast with
/// [`KestrelError::RequestInFlight`].
pub struct ChatSession {
    transport: Arc<dyn ChatTransport>,
    api_key: String,
    current_model: String,
    temperature: f64,
    chat_id: Option<String>,
    messages: Vec<ChatMessage>,
    available_models: Vec<ModelDescriptor>,
    enabled_model_ids: Vec<String>,
    recent_model_ids: Vec<String>,
    usage: UsageStats,
    busy: bool,
    last_error: Option<String>,
    started_at: DateTime<Utc>,
}

fn normalize_temperature(value: f64) -> f64 {
    if !value.is_finite() {
        warn!("temperature must be a finite number, using default {}", DEFAULT_TEMPERATURE);
        return DEFAULT_TEMPERATURE;
    }
    value.clamp(0.0, 1.0)
}

impl ChatSession {
    pub fn new(transport: Arc<dyn ChatTransport>, options: SessionOptions) -> Self {
        Self {
            transport,
            api_key: options.api_key,
            current_model: options.default_model,
            temperature: normalize_temperature(options.temperature),
            chat_id: None,
            messages: Vec::new(),
            available_models: Vec::new(),
            enabled_model_ids: options.enabled_models,
            recent_model_ids: Vec::new(),
            usage: UsageStats::default(),
            busy: false,
            last_error: None,
            started_at: Utc::now(),
        }
    }

    fn record_err(&mut self, err: KestrelError) -> KestrelError {
        self.last_error = Some(err.to_string());
        err
    }

    // ─── Key Management ────────────────────────────────────

    /// Replace the stored API key. A non-empty key triggers a catalog
    /// refresh; an empty key clears the catalog without a request.
    pub async fn set_api_key(&mut self, key: &str) -> Result<()> {
        self.api_key = key.to_string();
        if self.api_key.is_empty() {
            self.available_models.clear();
            return Ok(());
        }
        self.fetch_available_models().await
    }

    /// True iff the stored key has non-zero length. No format checks.
    pub fn has_valid_key(&self) -> bool {
        !self.api_key.is_empty()
    }

    // ─── Model Catalog ─────────────────────────────────────

    /// Fetch the model catalog and replace the cached copy wholesale.
    /// On any failure the catalog is cleared, never left partial.
    pub async fn fetch_available_models(&mut self) -> Result<()> {
        if !self.has_valid_key() {
            let err = KestrelError::Configuration(
                "API key is required to fetch models".to_string(),
            );
            return Err(self.record_err(err));
        }

        self.last_error = None;

        match self.transport.fetch_models(&self.api_key).await {
            Ok(models) => {
                self.available_models = models;
                Ok(())
            }
            Err(err) => {
                self.available_models.clear();
                Err(self.record_err(err))
            }
        }
    }

    /// Mean of prompt and completion price for a model, 0 if unknown.
    pub fn model_cost(&self, model_id: &str) -> f64 {
        self.available_models
            .iter()
            .find(|m| m.id == model_id)
            .map(|m| m.mean_cost())
            .unwrap_or(0.0)
    }

    /// Render a model's cost, or an explicit override, for display.
    pub fn format_model_cost(&self, model_id: &str, raw_cost: Option<f64>) -> String {
        format_cost(raw_cost.unwrap_or_else(|| self.model_cost(model_id)))
    }

    /// Switch the active model. Unknown ids leave state untouched and
    /// return false.
    pub fn set_model(&mut self, model_id: &str) -> bool {
        if self.available_models.iter().any(|m| m.id == model_id) {
            self.current_model = model_id.to_string();
            true
        } else {
            false
        }
    }

    /// Move a model to the front of the recent-usage list.
    pub fn track_model_usage(&mut self, model_id: &str) {
        self.recent_model_ids.retain(|id| id != model_id);
        self.recent_model_ids.insert(0, model_id.to_string());
        self.recent_model_ids.truncate(MAX_RECENT_MODELS);
    }

    // ─── Conversation ──────────────────────────────────────

    /// Clamp a new temperature into [0, 1]. Non-finite input logs a
    /// warning and falls back to the default instead of failing.
    pub fn update_temperature(&mut self, value: f64) {
        self.temperature = normalize_temperature(value);
    }

    /// Send a user message and wait for the assistant reply.
    ///
    /// The user message is appended before the request is issued; the
    /// full history goes out with no truncation. Usage accounting is
    /// folded in on success. The busy flag is cleared on every exit
    /// path, and every failure is recorded in the error slot before
    /// being returned.
    pub async fn send_message(&mut self, content: &str) -> Result<String> {
        if !self.has_valid_key() {
            let err = KestrelError::Configuration("API key is required".to_string());
            return Err(self.record_err(err));
        }
        if content.trim().is_empty() {
            let err = KestrelError::Validation("Message content cannot be empty".to_string());
            return Err(self.record_err(err));
        }
        if self.busy {
            return Err(self.record_err(KestrelError::RequestInFlight));
        }

        if self.chat_id.is_none() {
            self.chat_id = Some(Uuid::new_v4().to_string());
        }

        self.busy = true;
        self.last_error = None;
        self.messages.push(ChatMessage::user(content));

        let request = CompletionRequest {
            model: self.current_model.clone(),
            messages: self.messages.clone(),
            temperature: self.temperature,
            max_tokens: MAX_TOKENS,
        };

        let result = self.transport.complete(&self.api_key, request).await;
        self.busy = false;

        match result {
            Ok(completion) => {
                let reply = completion.message.content.clone();
                self.messages.push(completion.message);

                self.usage.total_tokens += u64::from(completion.usage.total_tokens);
                self.usage.last_prompt_tokens = completion.usage.prompt_tokens;
                self.usage.last_completion_tokens = completion.usage.completion_tokens;
                self.usage.last_cost = completion.usage.total_cost;
                self.usage.cumulative_cost += completion.usage.total_cost;

                Ok(reply)
            }
            Err(err) => Err(self.record_err(err)),
        }
    }

    /// Reset history, chat id, and usage stats. Key, model,
    /// temperature, catalog, and recent usage are untouched.
    pub fn clear_chat(&mut self) {
        self.messages.clear();
        self.chat_id = None;
        self.usage = UsageStats::default();
    }

    // ─── Read Surface ──────────────────────────────────────

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn available_models(&self) -> &[ModelDescriptor] {
        &self.available_models
    }

    /// Enabled models, sorted by mean cost descending with free
    /// models last.
    pub fn enabled_models(&self) -> Vec<&ModelDescriptor> {
        let mut models: Vec<&ModelDescriptor> = self
            .available_models
            .iter()
            .filter(|m| self.enabled_model_ids.iter().any(|id| *id == m.id))
            .collect();
        models.sort_by(|a, b| {
            let (cost_a, cost_b) = (a.mean_cost(), b.mean_cost());
            if cost_a == 0.0 && cost_b != 0.0 {
                return Ordering::Greater;
            }
            if cost_b == 0.0 && cost_a != 0.0 {
                return Ordering::Less;
            }
            cost_b.partial_cmp(&cost_a).unwrap_or(Ordering::Equal)
        });
        models
    }

    /// Recently used models projected through the catalog; ids the
    /// catalog no longer knows are skipped.
    pub fn recent_models(&self) -> Vec<&ModelDescriptor> {
        self.recent_model_ids
            .iter()
            .filter_map(|id| self.available_models.iter().find(|m| m.id == *id))
            .collect()
    }

    pub fn current_model(&self) -> &str {
        &self.current_model
    }

    /// Display name of the active model, falling back to the raw id
    /// when the catalog has no entry for it.
    pub fn model_name(&self) -> &str {
        self.available_models
            .iter()
            .find(|m| m.id == self.current_model)
            .map(|m| m.name.as_str())
            .unwrap_or(&self.current_model)
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn chat_id(&self) -> Option<&str> {
        self.chat_id.as_deref()
    }

    pub fn usage(&self) -> &UsageStats {
        &self.usage
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}
