//! Gopher-style browser over a local directory tree.
//!
//! Entries are listed with numbers; sending a number opens a directory or
//! prints a file. The current directory is kept in plugin state as a path
//! relative to the root, so the plugin itself holds nothing per node.
//! Hidden entries are never listed and nothing outside the root is reachable.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use log::debug;
use serde_json::json;
use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::config::GopherConfig;
use crate::plugin::{state_of, NodeContext, Plugin, PluginMetadata, PluginResponse, PluginState};

const STATE_PATH: &str = "current_path";

pub struct GopherPlugin {
    metadata: PluginMetadata,
    browser: Browser,
}

/// Filesystem side of the plugin; cloned into blocking tasks.
#[derive(Debug, Clone)]
struct Browser {
    root: PathBuf,
    max_file_chars: usize,
}

struct Entry {
    name: String,
    is_dir: bool,
}

impl GopherPlugin {
    /// Create the root directory if missing and canonicalize it.
    pub fn new(root: impl AsRef<Path>, max_file_chars: usize) -> Result<Self> {
        let root = root.as_ref();
        fs::create_dir_all(root)
            .map_err(|e| anyhow!("Failed to create gopher root {}: {}", root.display(), e))?;
        let root = root
            .canonicalize()
            .map_err(|e| anyhow!("Failed to resolve gopher root {}: {}", root.display(), e))?;
        Ok(Self {
            metadata: PluginMetadata::new(
                "Gopher Server",
                "Browse files and directories",
                1,
                &["!back", "!home"],
            )?,
            browser: Browser {
                root,
                max_file_chars,
            },
        })
    }

    pub fn from_config(config: &GopherConfig) -> Result<Self> {
        Self::new(&config.root_directory, config.max_file_chars)
    }
}

impl Browser {
    /// Map a stored relative path back to a directory under the root.
    /// Anything that does not resolve to a directory inside the root yields the root.
    fn resolve(&self, relative: &str) -> PathBuf {
        let mut path = self.root.clone();
        for component in Path::new(relative.trim_start_matches('/')).components() {
            match component {
                Component::Normal(part) => path.push(part),
                Component::CurDir => {}
                _ => return self.root.clone(),
            }
        }
        match path.canonicalize() {
            Ok(p) if p.starts_with(&self.root) && p.is_dir() => p,
            _ => self.root.clone(),
        }
    }

    fn relative(&self, dir: &Path) -> String {
        match dir.strip_prefix(&self.root) {
            Ok(rel) if rel.as_os_str().is_empty() => "/".to_string(),
            Ok(rel) => format!("/{}", rel.to_string_lossy().replace('\\', "/")),
            Err(_) => "/".to_string(),
        }
    }

    fn entries(&self, dir: &Path) -> Vec<Entry> {
        let Ok(read) = fs::read_dir(dir) else {
            return Vec::new();
        };
        let mut entries: Vec<Entry> = read
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let name = e.file_name().to_string_lossy().into_owned();
                if name.starts_with('.') {
                    return None;
                }
                let is_dir = e.path().is_dir();
                Some(Entry { name, is_dir })
            })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries
    }

    fn listing(&self, dir: &Path) -> String {
        let entries = self.entries(dir);
        let mut out = format!("[{}]", self.relative(dir));
        if entries.is_empty() {
            out.push_str("\n(empty)");
        }
        for (i, entry) in entries.iter().enumerate() {
            out.push_str(&format!(
                "\n{}. {}{}",
                i + 1,
                entry.name,
                if entry.is_dir { "/" } else { "" }
            ));
        }
        out
    }

    fn read_file(&self, path: &Path) -> String {
        match fs::read(path) {
            Ok(bytes) => {
                let text = String::from_utf8_lossy(&bytes);
                let mut content: String = text.chars().take(self.max_file_chars).collect();
                if text.chars().count() > self.max_file_chars {
                    content.push_str("...[truncated]");
                }
                content.trim().to_string()
            }
            Err(e) => format!("Error reading file: {}", e),
        }
    }

    fn at(&self, dir: &Path, message: impl Into<String>) -> PluginResponse {
        PluginResponse::with_state(message, state_of([(STATE_PATH, json!(self.relative(dir)))]))
    }

    fn respond(&self, message: &str, state: &PluginState) -> PluginResponse {
        let current = self.resolve(
            state
                .get(STATE_PATH)
                .and_then(|v| v.as_str())
                .unwrap_or("/"),
        );
        let command = message.trim().to_lowercase();

        match command.as_str() {
            "!back" => {
                if current == self.root {
                    return self.at(&self.root, format!("Already at root.\n\n{}", self.listing(&self.root)));
                }
                let parent = current
                    .parent()
                    .filter(|p| p.starts_with(&self.root))
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| self.root.clone());
                self.at(&parent, self.listing(&parent))
            }
            "!home" => self.at(&self.root, self.listing(&self.root)),
            _ => match command.parse::<usize>() {
                Ok(n) => self.select(&current, n),
                Err(_) => self.at(
                    &current,
                    format!("Invalid input. Send a number or command.\n\n{}", self.listing(&current)),
                ),
            },
        }
    }

    fn select(&self, current: &Path, n: usize) -> PluginResponse {
        let entries = self.entries(current);
        if n == 0 || n > entries.len() {
            return self.at(
                current,
                format!(
                    "Invalid selection. Choose 1-{}.\n\n{}",
                    entries.len(),
                    self.listing(current)
                ),
            );
        }
        let entry = &entries[n - 1];
        let target = current.join(&entry.name);
        let resolved = match target.canonicalize() {
            Ok(p) if p.starts_with(&self.root) => p,
            _ => {
                debug!("Refused to follow {} outside gopher root", target.display());
                return self.at(current, format!("Not available.\n\n{}", self.listing(current)));
            }
        };
        if entry.is_dir {
            self.at(&resolved, self.listing(&resolved))
        } else {
            self.at(current, format!("{}:\n{}", entry.name, self.read_file(&resolved)))
        }
    }
}

#[async_trait]
impl Plugin for GopherPlugin {
    fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }

    fn welcome_message(&self) -> String {
        format!(
            "Gopher Server\n{}\nSend number to select, !help for commands",
            self.browser.listing(&self.browser.root)
        )
    }

    fn help_text(&self) -> String {
        "Gopher Commands:\n[number] - Select item\n!back - Parent directory\n!home - Root directory\n!help - Show this help\n!exit - Return to menu".to_string()
    }

    async fn handle(&self, message: &str, _context: &NodeContext, state: &PluginState) -> Result<PluginResponse> {
        let browser = self.browser.clone();
        let message = message.to_string();
        let state = state.clone();
        tokio::task::spawn_blocking(move || browser.respond(&message, &state))
            .await
            .map_err(|e| anyhow!("gopher browse task failed: {}", e))
    }
}
