//! Wikipedia search and article summaries.
//!
//! A search with several hits lists them numbered and stores the titles in
//! plugin state; the next numeric message opens that title's summary.

use anyhow::Result;
use async_trait::async_trait;
use log::warn;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use super::http::{HttpClient, HttpError};
use super::truncate_chars;
use crate::config::WikipediaConfig;
use crate::plugin::{state_of, NodeContext, Plugin, PluginMetadata, PluginResponse, PluginState};

/// Hits requested per search.
pub const SEARCH_LIMIT: usize = 5;
const SERVICE: &str = "Wikipedia";

#[derive(Debug, Deserialize)]
struct Summary {
    title: Option<String>,
    extract: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
enum Command<'a> {
    Random,
    Search(&'a str),
    Select(usize),
    Empty,
}

fn parse_command<'a>(message: &'a str, last_results: &[String]) -> Command<'a> {
    let lower = message.to_lowercase();
    if lower == "!random" {
        return Command::Random;
    }
    if lower == "!search" || lower.starts_with("!search ") {
        return Command::Search(message.get(7..).unwrap_or("").trim());
    }
    if let Ok(n) = message.parse::<usize>() {
        if (1..=last_results.len()).contains(&n) {
            return Command::Select(n);
        }
    }
    if message.is_empty() {
        Command::Empty
    } else {
        Command::Search(message)
    }
}

/// Titles from an opensearch response: `[query, [titles], [descriptions], [urls]]`.
fn opensearch_titles(data: &Value) -> Vec<String> {
    data.get(1)
        .and_then(Value::as_array)
        .map(|titles| {
            titles
                .iter()
                .filter_map(|t| t.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

fn format_results(query: &str, titles: &[String]) -> String {
    let mut out = format!("Results for '{}':", query);
    for (i, title) in titles.iter().enumerate() {
        out.push_str(&format!("\n{}. {}", i + 1, title));
    }
    out.push_str("\n\nSend number to select");
    out
}

/// Path segment for the REST summary endpoint.
fn title_slug(title: &str) -> String {
    urlencoding::encode(&title.replace(' ', "_")).into_owned()
}

pub struct WikipediaPlugin {
    metadata: PluginMetadata,
    http: HttpClient,
    language: String,
    max_summary_length: usize,
}

impl WikipediaPlugin {
    pub fn from_config(config: &WikipediaConfig) -> Result<Self> {
        Ok(Self {
            metadata: PluginMetadata::new("Wikipedia", "Search Wikipedia", 4, &["!search", "!random"])?,
            http: HttpClient::new(Duration::from_secs(config.timeout_seconds))?,
            language: config.language.clone(),
            max_summary_length: config.max_summary_length,
        })
    }

    fn rest_base(&self) -> String {
        format!("https://{}.wikipedia.org/api/rest_v1", self.language)
    }

    fn render_summary(&self, fallback_title: &str, summary: Summary) -> (String, String) {
        let title = summary.title.unwrap_or_else(|| fallback_title.to_string());
        let extract = summary
            .extract
            .filter(|e| !e.trim().is_empty())
            .unwrap_or_else(|| "No content available.".to_string());
        let body = truncate_chars(&extract, self.max_summary_length);
        (format!("{}\n\n{}", title, body), title)
    }

    async fn search(&self, query: &str) -> PluginResponse {
        if query.is_empty() {
            return PluginResponse::reply("Usage: !search <query>");
        }
        let url = format!("https://{}.wikipedia.org/w/api.php", self.language);
        let params = [
            ("action", "opensearch".to_string()),
            ("search", query.to_string()),
            ("limit", SEARCH_LIMIT.to_string()),
            ("namespace", "0".to_string()),
            ("format", "json".to_string()),
        ];
        let data: Value = match self.http.get_json(&url, &params).await {
            Ok(data) => data,
            Err(e) => {
                warn!("Wikipedia search failed: {}", e);
                return PluginResponse::reply(e.user_message(SERVICE));
            }
        };
        let titles = opensearch_titles(&data);
        match titles.as_slice() {
            [] => PluginResponse::with_state(
                format!("No results for '{}'.", query),
                state_of([("last_results", json!([]))]),
            ),
            [only] => self.summary(only).await,
            _ => PluginResponse::with_state(
                format_results(query, &titles),
                state_of([("last_results", json!(titles)), ("last_query", json!(query))]),
            ),
        }
    }

    async fn summary(&self, title: &str) -> PluginResponse {
        let url = format!("{}/page/summary/{}", self.rest_base(), title_slug(title));
        match self.http.get_json::<Summary>(&url, &[]).await {
            Ok(summary) => {
                let (message, display_title) = self.render_summary(title, summary);
                PluginResponse::with_state(
                    message,
                    state_of([("last_title", json!(display_title)), ("last_results", json!([]))]),
                )
            }
            Err(HttpError::Status(404)) => PluginResponse::with_state(
                format!("Article '{}' not found.", title),
                state_of([("last_results", json!([]))]),
            ),
            Err(e) => {
                warn!("Wikipedia summary for '{}' failed: {}", title, e);
                PluginResponse::reply(e.user_message(SERVICE))
            }
        }
    }

    async fn random(&self) -> PluginResponse {
        let url = format!("{}/page/random/summary", self.rest_base());
        match self.http.get_json::<Summary>(&url, &[]).await {
            Ok(summary) => {
                let (message, title) = self.render_summary("Unknown", summary);
                PluginResponse::with_state(message, state_of([("last_title", json!(title))]))
            }
            Err(e) => {
                warn!("Wikipedia random article failed: {}", e);
                PluginResponse::reply(e.user_message(SERVICE))
            }
        }
    }
}

#[async_trait]
impl Plugin for WikipediaPlugin {
    fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }

    fn welcome_message(&self) -> String {
        "Wikipedia Search\nSend a topic to search or !help for commands.".to_string()
    }

    fn help_text(&self) -> String {
        "Wikipedia Commands:\n[topic] - Search for topic\n!search <query> - Search\n!random - Random article\n!help - Show this help\n!exit - Return to menu".to_string()
    }

    async fn handle(&self, message: &str, _context: &NodeContext, state: &PluginState) -> Result<PluginResponse> {
        let last_results: Vec<String> = state
            .get("last_results")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();

        let response = match parse_command(message.trim(), &last_results) {
            Command::Random => self.random().await,
            Command::Search(query) => self.search(query).await,
            Command::Select(n) => self.summary(&last_results[n - 1]).await,
            Command::Empty => PluginResponse::reply("Send a topic to search."),
        };
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_select_only_within_last_results() {
        let results = vec!["Rust".to_string(), "Rust (fungus)".to_string()];
        assert_eq!(parse_command("2", &results), Command::Select(2));
        assert_eq!(parse_command("3", &results), Command::Search("3"));
        assert_eq!(parse_command("1", &[]), Command::Search("1"));
        assert_eq!(parse_command("!Random", &results), Command::Random);
        assert_eq!(parse_command("!search  mesh radio", &[]), Command::Search("mesh radio"));
        assert_eq!(parse_command("!search", &[]), Command::Search(""));
        assert_eq!(parse_command("", &[]), Command::Empty);
    }

    #[test]
    fn parses_opensearch_payload() {
        let data = json!(["rust", ["Rust", "Rust (programming language)"], ["", ""], ["u1", "u2"]]);
        assert_eq!(
            opensearch_titles(&data),
            vec!["Rust".to_string(), "Rust (programming language)".to_string()]
        );
        assert!(opensearch_titles(&json!({"error": true})).is_empty());
    }

    #[test]
    fn formats_numbered_results() {
        let titles = vec!["A".to_string(), "B".to_string()];
        assert_eq!(
            format_results("q", &titles),
            "Results for 'q':\n1. A\n2. B\n\nSend number to select"
        );
    }

    #[test]
    fn slugs_titles_for_rest_paths() {
        assert_eq!(title_slug("Rust (fungus)"), "Rust_%28fungus%29");
        assert_eq!(title_slug("Zürich"), "Z%C3%BCrich");
    }
}
