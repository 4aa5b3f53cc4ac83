//! # Plugin Capability Contract
//!
//! Every service reachable from the main menu implements [`Plugin`]. The
//! gateway only ever talks to a plugin through this trait: it reads the
//! immutable [`PluginMetadata`] once at registration, shows the welcome and
//! help text verbatim, and forwards every other message to [`Plugin::handle`].
//!
//! ## State
//!
//! Plugins are shared by all nodes and must not keep per-node data themselves.
//! Per-node data lives in the session as a [`PluginState`] map that the
//! gateway stores but never interprets. A handler receives the current map
//! read-only and returns a patch in [`PluginResponse::plugin_state_patch`];
//! patch keys overwrite existing keys, nothing is deep-merged.
//!
//! ## Reserved commands
//!
//! `!exit`, `!menu` and `!help` are intercepted by the router and never reach
//! [`Plugin::handle`], whatever a plugin lists in its metadata.
//!
//! ## Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use meshgate::plugin::{NodeContext, Plugin, PluginMetadata, PluginResponse, PluginState};
//!
//! struct Echo {
//!     metadata: PluginMetadata,
//! }
//!
//! #[async_trait]
//! impl Plugin for Echo {
//!     fn metadata(&self) -> &PluginMetadata {
//!         &self.metadata
//!     }
//!     fn welcome_message(&self) -> String {
//!         "Echo ready".into()
//!     }
//!     fn help_text(&self) -> String {
//!         "Send anything".into()
//!     }
//!     async fn handle(
//!         &self,
//!         message: &str,
//!         _context: &NodeContext,
//!         _state: &PluginState,
//!     ) -> anyhow::Result<PluginResponse> {
//!         Ok(PluginResponse::reply(message))
//!     }
//! }
//! ```

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque per-node plugin data. Only the active plugin gives it meaning.
pub type PluginState = serde_json::Map<String, serde_json::Value>;

/// Descriptor registered once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginMetadata {
    pub name: String,
    pub description: String,
    pub menu_number: u32,
    /// Plugin-specific command tokens, listed for documentation only.
    pub commands: Vec<String>,
}

impl PluginMetadata {
    /// Build validated metadata. The name must be non-empty and the menu
    /// number positive.
    pub fn new(name: &str, description: &str, menu_number: u32, commands: &[&str]) -> Result<Self> {
        if name.trim().is_empty() {
            return Err(anyhow!("plugin name cannot be empty"));
        }
        if menu_number == 0 {
            return Err(anyhow!("menu number must be >= 1 for '{}'", name));
        }
        Ok(Self {
            name: name.to_string(),
            description: description.to_string(),
            menu_number,
            commands: commands.iter().map(|c| c.to_string()).collect(),
        })
    }
}

/// Result of one [`Plugin::handle`] call. Consumed immediately by the router.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PluginResponse {
    pub message: String,
    pub plugin_state_patch: Option<PluginState>,
    pub exit_plugin: bool,
}

impl PluginResponse {
    /// Plain reply with no state change.
    pub fn reply(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    /// Reply plus a state patch to merge into the session.
    pub fn with_state(message: impl Into<String>, patch: PluginState) -> Self {
        Self {
            message: message.into(),
            plugin_state_patch: Some(patch),
            exit_plugin: false,
        }
    }

    /// Reply and return the node to the main menu.
    pub fn exit(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            plugin_state_patch: None,
            exit_plugin: true,
        }
    }
}

/// GPS fix reported by the sending node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
}

impl GpsLocation {
    /// Validated constructor; rejects coordinates outside the WGS84 ranges.
    pub fn new(latitude: f64, longitude: f64, altitude: Option<f64>) -> Result<Self> {
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(anyhow!("latitude must be between -90 and 90, got {}", latitude));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(anyhow!("longitude must be between -180 and 180, got {}", longitude));
        }
        Ok(Self {
            latitude,
            longitude,
            altitude,
        })
    }
}

/// Read-only information about the sender handed to a plugin call.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeContext {
    pub node_id: String,
    pub node_name: Option<String>,
    pub location: Option<GpsLocation>,
    pub session_created_at: DateTime<Utc>,
    pub session_last_active_at: DateTime<Utc>,
}

/// A menu-selectable service.
#[async_trait]
pub trait Plugin: Send + Sync {
    fn metadata(&self) -> &PluginMetadata;

    /// Text shown when a node enters the plugin from the main menu.
    fn welcome_message(&self) -> String;

    /// Text shown for `!help` while inside the plugin.
    fn help_text(&self) -> String;

    /// Handle one message. Errors are reported to the user as a generic
    /// failure and leave the session untouched.
    async fn handle(
        &self,
        message: &str,
        context: &NodeContext,
        state: &PluginState,
    ) -> Result<PluginResponse>;
}

/// Build a [`PluginState`] from key/value pairs.
pub fn state_of<I, K>(pairs: I) -> PluginState
where
    I: IntoIterator<Item = (K, serde_json::Value)>,
    K: Into<String>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}
