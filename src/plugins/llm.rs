//! LLM assistant backed by an Ollama server.
//!
//! Each node keeps its chosen model and a short rolling chat history in plugin
//! state. Replies are capped to keep radio traffic small.

use anyhow::Result;
use async_trait::async_trait;
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

use super::http::{HttpClient, HttpError};
use super::truncate_chars;
use crate::config::LlmConfig;
use crate::plugin::{state_of, NodeContext, Plugin, PluginMetadata, PluginResponse, PluginState};

/// Most recent messages kept as context (4 exchanges).
pub const MAX_HISTORY_MESSAGES: usize = 8;
/// Token budget per reply.
pub const MAX_TOKENS: u32 = 150;

const SERVICE: &str = "Ollama";
const SYSTEM_PROMPT: &str = "You are a helpful assistant responding via a low-bandwidth radio network. \
Keep responses very brief and concise (under 200 characters when possible). \
Avoid markdown formatting, bullet points, and long explanations. Be direct and informative.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    fn new(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
    options: Value,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: Option<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Debug, Deserialize)]
struct ModelTag {
    name: String,
}

/// A parsed line of user input.
#[derive(Debug, PartialEq, Eq)]
enum Command<'a> {
    Clear,
    ListModels,
    SwitchModel(&'a str),
    Prompt(&'a str),
}

fn parse_command(message: &str) -> Command<'_> {
    let lower = message.to_lowercase();
    if lower == "!clear" {
        Command::Clear
    } else if lower == "!models" {
        Command::ListModels
    } else if lower == "!model" || lower.starts_with("!model ") {
        Command::SwitchModel(message.get(6..).unwrap_or("").trim())
    } else {
        Command::Prompt(message)
    }
}

/// Keep the newest `MAX_HISTORY_MESSAGES` entries.
fn trim_history(mut history: Vec<ChatMessage>) -> Vec<ChatMessage> {
    if history.len() > MAX_HISTORY_MESSAGES {
        history.drain(..history.len() - MAX_HISTORY_MESSAGES);
    }
    history
}

/// Resolve a requested model name against the installed ones: exact match
/// first, then a unique substring match.
fn match_model<'a>(requested: &str, installed: &'a [String]) -> std::result::Result<&'a str, String> {
    if let Some(exact) = installed.iter().find(|m| m.as_str() == requested) {
        return Ok(exact.as_str());
    }
    let partial: Vec<&String> = installed.iter().filter(|m| m.contains(requested)).collect();
    match partial.as_slice() {
        [one] => Ok(one.as_str()),
        [] => Err(format!("Model '{}' not found.", requested)),
        many => Err(format!(
            "Multiple matches: {}",
            many.iter().take(5).map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
        )),
    }
}

pub struct LlmPlugin {
    metadata: PluginMetadata,
    http: HttpClient,
    base_url: String,
    default_model: String,
    max_response_length: usize,
}

impl LlmPlugin {
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        Ok(Self {
            metadata: PluginMetadata::new(
                "LLM Assistant",
                "Ask AI questions",
                2,
                &["!model", "!models", "!clear"],
            )?,
            http: HttpClient::new(Duration::from_secs(config.timeout_seconds))?,
            base_url: config.ollama_url.trim_end_matches('/').to_string(),
            default_model: config.model.clone(),
            max_response_length: config.max_response_length,
        })
    }

    fn model_of(&self, state: &PluginState) -> String {
        state
            .get("model")
            .and_then(Value::as_str)
            .unwrap_or(&self.default_model)
            .to_string()
    }

    fn state(model: &str, history: &[ChatMessage]) -> PluginState {
        state_of([("model", json!(model)), ("history", json!(history))])
    }

    async fn installed_models(&self) -> std::result::Result<Vec<String>, HttpError> {
        let tags: TagsResponse = self
            .http
            .get_json(&format!("{}/api/tags", self.base_url), &[])
            .await?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    async fn list_models(&self, model: &str, history: &[ChatMessage]) -> PluginResponse {
        let message = match self.installed_models().await {
            Ok(models) if models.is_empty() => "No models found.".to_string(),
            Ok(models) => format!(
                "Models: {}\nCurrent: {}",
                models.iter().take(10).cloned().collect::<Vec<_>>().join(", "),
                model
            ),
            Err(e) => {
                warn!("Listing Ollama models failed: {}", e);
                e.user_message(SERVICE)
            }
        };
        PluginResponse::with_state(message, Self::state(model, history))
    }

    async fn switch_model(&self, requested: &str, model: &str, history: &[ChatMessage]) -> PluginResponse {
        if requested.is_empty() {
            return PluginResponse::with_state(
                format!("Usage: !model <name>\nCurrent: {}", model),
                Self::state(model, history),
            );
        }
        match self.installed_models().await {
            Ok(models) => match match_model(requested, &models) {
                Ok(found) => PluginResponse::with_state(
                    format!("Switched to {}. History cleared.", found),
                    Self::state(found, &[]),
                ),
                Err(reason) => PluginResponse::with_state(reason, Self::state(model, history)),
            },
            Err(e) => {
                warn!("Switching Ollama model failed: {}", e);
                PluginResponse::with_state(e.user_message(SERVICE), Self::state(model, history))
            }
        }
    }

    async fn prompt(&self, prompt: &str, model: &str, history: Vec<ChatMessage>) -> PluginResponse {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::new("system", SYSTEM_PROMPT));
        messages.extend(history.iter().cloned());
        messages.push(ChatMessage::new("user", prompt));
        let request = ChatRequest {
            model,
            messages,
            stream: false,
            options: json!({ "num_predict": MAX_TOKENS }),
        };

        let reply: ChatResponse = match self
            .http
            .post_json(&format!("{}/api/chat", self.base_url), &request)
            .await
        {
            Ok(reply) => reply,
            Err(HttpError::Timeout(_)) => {
                return PluginResponse::with_state(
                    "Request timed out. Try a simpler question.",
                    Self::state(model, &history),
                )
            }
            Err(e) => {
                warn!("Ollama chat failed: {}", e);
                return PluginResponse::with_state(e.user_message(SERVICE), Self::state(model, &history));
            }
        };

        let content = reply.message.map(|m| m.content).unwrap_or_default();
        if content.trim().is_empty() {
            return PluginResponse::with_state("No response from model.", Self::state(model, &history));
        }
        let answer = truncate_chars(content.trim(), self.max_response_length);

        let mut updated = history;
        updated.push(ChatMessage::new("user", prompt));
        updated.push(ChatMessage::new("assistant", &answer));
        let updated = trim_history(updated);
        PluginResponse::with_state(answer, Self::state(model, &updated))
    }
}

#[async_trait]
impl Plugin for LlmPlugin {
    fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }

    fn welcome_message(&self) -> String {
        format!(
            "LLM Assistant (model: {})\nSend your question or !help for commands.",
            self.default_model
        )
    }

    fn help_text(&self) -> String {
        "LLM Commands:\n[message] - Ask a question\n!model <name> - Switch model\n!models - List models\n!clear - Clear history\n!help - Show this help\n!exit - Return to menu".to_string()
    }

    async fn handle(&self, message: &str, _context: &NodeContext, state: &PluginState) -> Result<PluginResponse> {
        let model = self.model_of(state);
        let history: Vec<ChatMessage> = state
            .get("history")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();

        let response = match parse_command(message.trim()) {
            Command::Clear => PluginResponse::with_state("Conversation cleared.", Self::state(&model, &[])),
            Command::ListModels => self.list_models(&model, &history).await,
            Command::SwitchModel(name) => self.switch_model(name, &model, &history).await,
            Command::Prompt("") => PluginResponse::reply("Send your question."),
            Command::Prompt(prompt) => self.prompt(prompt, &model, history).await,
        };
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands() {
        assert_eq!(parse_command("!clear"), Command::Clear);
        assert_eq!(parse_command("!MODELS"), Command::ListModels);
        assert_eq!(parse_command("!model mistral"), Command::SwitchModel("mistral"));
        assert_eq!(parse_command("!model"), Command::SwitchModel(""));
        assert_eq!(parse_command("!modelx"), Command::Prompt("!modelx"));
        assert_eq!(parse_command("why is the sky blue"), Command::Prompt("why is the sky blue"));
    }

    #[test]
    fn history_keeps_newest_entries() {
        let history: Vec<ChatMessage> = (0..11)
            .map(|i| ChatMessage::new("user", &i.to_string()))
            .collect();
        let trimmed = trim_history(history);
        assert_eq!(trimmed.len(), MAX_HISTORY_MESSAGES);
        assert_eq!(trimmed[0].content, "3");
        assert_eq!(trimmed[7].content, "10");
    }

    #[test]
    fn model_matching_prefers_exact_then_unique_partial() {
        let installed = vec![
            "llama3.2:latest".to_string(),
            "llama3.2".to_string(),
            "mistral:7b".to_string(),
        ];
        assert_eq!(match_model("llama3.2", &installed), Ok("llama3.2"));
        assert_eq!(match_model("mistral", &installed), Ok("mistral:7b"));
        assert!(match_model("llama", &installed).unwrap_err().starts_with("Multiple matches"));
        assert_eq!(match_model("phi", &installed), Err("Model 'phi' not found.".to_string()));
    }

    #[test]
    fn state_round_trips_history() {
        let history = vec![ChatMessage::new("user", "hi"), ChatMessage::new("assistant", "hello")];
        let state = LlmPlugin::state("llama3.2", &history);
        let parsed: Vec<ChatMessage> = serde_json::from_value(state["history"].clone()).unwrap();
        assert_eq!(parsed, history);
        assert_eq!(state["model"], json!("llama3.2"));
    }
}
