//! Test plugins & fixtures shared by the integration tests.
//!
//! Each test binary pulls this in with `mod common;` and uses only part of it.
#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use meshgate::config::Config;
use meshgate::gateway::{MessageRouter, PluginRegistry};
use meshgate::plugin::{state_of, NodeContext, Plugin, PluginMetadata, PluginResponse, PluginState};
use meshgate::transport::InboundMessage;

/// Menu 1. Echoes input, remembers the last message and counts calls in state.
/// `bye` exits back to the menu.
pub struct EchoPlugin {
    metadata: PluginMetadata,
}

impl EchoPlugin {
    pub fn new(menu_number: u32) -> Self {
        Self {
            metadata: PluginMetadata::new("Echo", "Repeats what you send", menu_number, &["bye"]).unwrap(),
        }
    }
}

#[async_trait]
impl Plugin for EchoPlugin {
    fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }

    fn welcome_message(&self) -> String {
        "Echo ready".to_string()
    }

    fn help_text(&self) -> String {
        "Echo help: send anything, bye to leave".to_string()
    }

    async fn handle(&self, message: &str, _context: &NodeContext, state: &PluginState) -> Result<PluginResponse> {
        if message.eq_ignore_ascii_case("bye") {
            return Ok(PluginResponse::exit("Goodbye"));
        }
        let count = state.get("count").and_then(|v| v.as_u64()).unwrap_or(0) + 1;
        Ok(PluginResponse::with_state(
            format!("echo: {}", message),
            state_of([("last", json!(message)), ("count", json!(count))]),
        ))
    }
}

/// Menu 2. Misbehaves on request:
/// `fail` errors, `panic` panics, `hang` sleeps far past any deadline,
/// `big` returns an oversized state patch. Anything else stores `value`.
pub struct TroublePlugin {
    metadata: PluginMetadata,
}

impl TroublePlugin {
    pub fn new(menu_number: u32) -> Self {
        Self {
            metadata: PluginMetadata::new("Trouble", "Breaks on demand", menu_number, &["fail", "panic", "hang"])
                .unwrap(),
        }
    }
}

#[async_trait]
impl Plugin for TroublePlugin {
    fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }

    fn welcome_message(&self) -> String {
        "Trouble ready".to_string()
    }

    fn help_text(&self) -> String {
        "fail, panic, hang, big".to_string()
    }

    async fn handle(&self, message: &str, _context: &NodeContext, _state: &PluginState) -> Result<PluginResponse> {
        match message {
            "fail" => Err(anyhow!("backend unreachable")),
            "panic" => panic!("plugin bug"),
            "hang" => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(PluginResponse::with_state("too late", state_of([("value", json!("late"))])))
            }
            "big" => Ok(PluginResponse::with_state(
                "stored big",
                state_of([("blob", json!("x".repeat(64 * 1024)))]),
            )),
            other => Ok(PluginResponse::with_state(
                format!("stored {}", other),
                state_of([("value", json!(other))]),
            )),
        }
    }
}

/// Menu 3. Sleeps for a fixed time, then reports the context it was given.
pub struct SlowPlugin {
    metadata: PluginMetadata,
    delay: Duration,
}

impl SlowPlugin {
    pub fn new(menu_number: u32, delay: Duration) -> Self {
        Self {
            metadata: PluginMetadata::new("Slow", "Takes its time", menu_number, &[]).unwrap(),
            delay,
        }
    }
}

#[async_trait]
impl Plugin for SlowPlugin {
    fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }

    fn welcome_message(&self) -> String {
        "Slow ready".to_string()
    }

    fn help_text(&self) -> String {
        "Everything takes a while".to_string()
    }

    async fn handle(&self, message: &str, context: &NodeContext, _state: &PluginState) -> Result<PluginResponse> {
        tokio::time::sleep(self.delay).await;
        let place = match context.location {
            Some(loc) => format!(" @{:.1},{:.1}", loc.latitude, loc.longitude),
            None => String::new(),
        };
        Ok(PluginResponse::reply(format!("{} done for {}{}", message, context.node_id, place)))
    }
}

/// Config tuned for tests: no chunk pacing, one-second plugin deadline.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.server.chunk_delay_ms = 0;
    config.server.plugin_timeout_seconds = 1;
    config.logging.file = None;
    config.logging.security_file = None;
    config
}

/// Echo (1), Trouble (2) and a one-second Slow (3).
pub fn standard_registry() -> PluginRegistry {
    PluginRegistry::new()
        .with(Arc::new(EchoPlugin::new(1)))
        .and_then(|r| r.with(Arc::new(TroublePlugin::new(2))))
        .and_then(|r| r.with(Arc::new(SlowPlugin::new(3, Duration::from_secs(1)))))
        .expect("registry")
}

pub fn router_with(config: &Config) -> MessageRouter {
    MessageRouter::new(config, standard_registry()).expect("router")
}

pub fn msg(node_id: &str, text: &str) -> InboundMessage {
    InboundMessage::new(node_id, text)
}
