//! Line-oriented console transport.
//!
//! Each stdin line is `node_id: text`. A line without a colon is sent as the
//! default node. Replies are printed as `[node_id] chunk`.

use anyhow::Result;
use async_trait::async_trait;
use log::debug;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;

use super::{InboundMessage, MessageSink, MessageSource};

pub const DEFAULT_NODE: &str = "!console";

pub struct ConsoleTransport {
    lines: Lines<BufReader<Stdin>>,
    default_node: String,
}

impl ConsoleTransport {
    pub fn new() -> Self {
        Self::with_default_node(DEFAULT_NODE)
    }

    pub fn with_default_node(node_id: &str) -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
            default_node: node_id.to_string(),
        }
    }
}

impl Default for ConsoleTransport {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse `node_id: text`. Returns `None` for a line that has no node prefix.
pub fn parse_line(line: &str) -> Option<(&str, &str)> {
    let (node, text) = line.split_once(':')?;
    let node = node.trim();
    if node.is_empty() || node.contains(char::is_whitespace) {
        return None;
    }
    Some((node, text.trim_start()))
}

#[async_trait]
impl MessageSource for ConsoleTransport {
    async fn next_message(&mut self) -> Option<InboundMessage> {
        match self.lines.next_line().await {
            Ok(Some(line)) => {
                let message = match parse_line(&line) {
                    Some((node, text)) => InboundMessage::new(node, text),
                    None => InboundMessage::new(self.default_node.clone(), line.trim()),
                };
                Some(message)
            }
            Ok(None) => None,
            Err(e) => {
                debug!("stdin read failed: {}", e);
                None
            }
        }
    }
}

/// Prints reply chunks to stdout.
#[derive(Default)]
pub struct ConsoleSink {
    stdout: Mutex<Option<tokio::io::Stdout>>,
}

impl ConsoleSink {
    pub fn new() -> Self {
        Self {
            stdout: Mutex::new(Some(tokio::io::stdout())),
        }
    }
}

#[async_trait]
impl MessageSink for ConsoleSink {
    async fn send(&self, node_id: &str, chunk: &str) -> Result<()> {
        let mut guard = self.stdout.lock().await;
        let stdout = guard.get_or_insert_with(tokio::io::stdout);
        stdout
            .write_all(format!("[{}] {}\n", node_id, chunk).as_bytes())
            .await?;
        stdout.flush().await?;
        Ok(())
    }
}
