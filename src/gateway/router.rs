//! # Message Router
//!
//! Turns one inbound message into zero or more reply chunks. Every message
//! passes through the same pipeline:
//!
//! 1. **Admission** - [`NodeFilter`]; denied nodes never get a session
//! 2. **Rate check** - [`RateLimiter`]; limited nodes get a retry hint only
//! 3. **Checkout** - [`SessionStore::checkout`] touches the session and marks it in flight
//! 4. **Decision** - the menu/plugin state machine, with a plugin call when needed
//! 5. **Commit** - the transition and any state patch go back through the store
//! 6. **Chunking** - [`ContentChunker`] sizes the reply for the radio
//!
//! A failed or timed-out plugin call skips step 5, so the session is left
//! exactly as it was before the message.
//!
//! ## State machine
//!
//! | State | Input | Next | Reply |
//! |---|---|---|---|
//! | menu | registered menu number | plugin | welcome text |
//! | menu | `!menu` | menu | menu listing |
//! | menu | `!exit` | menu | "Returned to menu." and menu listing |
//! | menu | anything else, `!help` and empty text included | menu | reprompt and menu listing |
//! | plugin | `!exit` / `!menu` | menu | menu listing |
//! | plugin | `!help` | plugin | help text |
//! | plugin | other | plugin or menu | plugin reply |
//!
//! Callers must not run two messages for the same node concurrently; the
//! server's dispatch lanes guarantee that.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;

use super::chunker::ContentChunker;
use super::errors::GatewayError;
use super::filter::{Admission, NodeFilter};
use super::rate_limit::{RateDecision, RateLimiter};
use super::registry::PluginRegistry;
use super::session::{Session, SessionLease, SessionStore};
use crate::config::Config;
use crate::logutil::escape_log;
use crate::metrics;
use crate::plugin::{NodeContext, Plugin, PluginState};
use crate::transport::InboundMessage;

macro_rules! sec_log {
    ($($arg:tt)*) => { log::warn!(target: "security", $($arg)*); };
}

pub const EXIT_COMMAND: &str = "!exit";
pub const MENU_COMMAND: &str = "!menu";
pub const HELP_COMMAND: &str = "!help";

/// Reply when a plugin call fails or times out.
pub const FAILURE_REPLY: &str = "Service error. Please try again.";
/// Reply when the session table is full of in-flight sessions.
pub const BUSY_REPLY: &str = "Gateway busy. Try again shortly.";

/// Where the session goes after a message.
#[derive(Debug, Clone, PartialEq)]
enum Transition {
    Stay { patch: Option<PluginState> },
    Enter { menu_number: u32, plugin: String },
    Leave { plugin: Option<String> },
}

#[derive(Debug)]
struct Outcome {
    reply: String,
    transition: Transition,
}

impl Outcome {
    fn stay(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            transition: Transition::Stay { patch: None },
        }
    }
}

pub struct MessageRouter {
    registry: Arc<PluginRegistry>,
    sessions: SessionStore,
    filter: NodeFilter,
    limiter: RateLimiter,
    chunker: ContentChunker,
    plugin_timeout: Duration,
    denied_reply: Option<String>,
}

impl MessageRouter {
    pub fn new(config: &Config, registry: PluginRegistry) -> Result<Self, GatewayError> {
        Ok(Self {
            registry: Arc::new(registry),
            sessions: SessionStore::from_config(config),
            filter: NodeFilter::from_config(&config.security),
            limiter: RateLimiter::from_config(&config.security),
            chunker: ContentChunker::new(config.server.max_message_size)?,
            plugin_timeout: config.server.plugin_timeout(),
            denied_reply: config.security.denied_reply.clone(),
        })
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn filter(&self) -> &NodeFilter {
        &self.filter
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    pub fn chunker(&self) -> &ContentChunker {
        &self.chunker
    }

    /// Main menu listing in menu-number order.
    pub fn render_menu(&self) -> String {
        let mut menu = String::from("Available Services:\n");
        for plugin in self.registry.list_ordered() {
            let meta = plugin.metadata();
            menu.push_str(&format!("{}. {}\n", meta.menu_number, meta.name));
        }
        menu.push_str("\nSend number to select");
        menu
    }

    /// Process one message and return the chunks to send, in order.
    /// An empty vector means nothing is sent.
    pub async fn handle(&self, message: &InboundMessage) -> Vec<String> {
        match self.respond(message, Utc::now()).await {
            Some(reply) => self.chunker.split(&reply),
            None => Vec::new(),
        }
    }

    /// Process one message at `now` and return the unchunked reply.
    pub async fn respond(&self, message: &InboundMessage, now: DateTime<Utc>) -> Option<String> {
        metrics::inc_inbound();
        let node_id = message.node_id.as_str();
        debug!("<- {}: {}", node_id, escape_log(&message.text));

        if self.filter.admit(node_id) == Admission::Denied {
            metrics::inc_denied();
            sec_log!("{}", GatewayError::AdmissionDenied(node_id.to_string()));
            return self.denied_reply.clone();
        }

        if let RateDecision::Limited { retry_after } = self.limiter.check(node_id, now) {
            metrics::inc_rate_limited();
            let secs = retry_secs(retry_after);
            sec_log!(
                "Node {}: {}",
                node_id,
                GatewayError::RateLimited { retry_after_secs: secs }
            );
            return Some(format!("Rate limited. Try in {}s", secs));
        }

        let lease = match self.sessions.checkout(node_id, now) {
            Ok(lease) => lease,
            Err(e) => {
                warn!("No session for {}: {}", node_id, e);
                return Some(BUSY_REPLY.to_string());
            }
        };
        if let Some(evicted) = lease.evicted() {
            self.record_exit(evicted);
        }

        match self.decide(lease.session(), message).await {
            Ok(outcome) => Some(self.commit(&lease, outcome)),
            Err(e) => {
                if matches!(e, GatewayError::PluginTimeout { .. }) {
                    metrics::inc_dispatch_timeouts();
                }
                if e.is_dispatch_failure() {
                    metrics::inc_dispatch_failures();
                }
                warn!("Dispatch for {} failed: {}", node_id, e);
                Some(FAILURE_REPLY.to_string())
            }
        }
    }

    async fn decide(&self, session: &Session, message: &InboundMessage) -> Result<Outcome, GatewayError> {
        let text = message.text.trim();
        let command = text.to_lowercase();
        match session.active_plugin {
            None => Ok(self.at_menu(text, &command)),
            Some(menu_number) => self.in_plugin(menu_number, session, text, &command, message).await,
        }
    }

    fn at_menu(&self, text: &str, command: &str) -> Outcome {
        match command {
            MENU_COMMAND => return Outcome::stay(self.render_menu()),
            EXIT_COMMAND => return Outcome::stay(format!("Returned to menu.\n\n{}", self.render_menu())),
            _ => {}
        }
        match self.select(text) {
            Ok(plugin) => {
                let meta = plugin.metadata();
                Outcome {
                    reply: plugin.welcome_message(),
                    transition: Transition::Enter {
                        menu_number: meta.menu_number,
                        plugin: meta.name.clone(),
                    },
                }
            }
            Err(e) => {
                debug!("{}", e);
                let reply = match text.parse::<u32>() {
                    Ok(n) => format!("Invalid selection '{}'.\n\n{}", n, self.render_menu()),
                    Err(_) => format!(
                        "Invalid selection. Please send a number.\n\n{}",
                        self.render_menu()
                    ),
                };
                Outcome::stay(reply)
            }
        }
    }

    fn select(&self, text: &str) -> Result<Arc<dyn Plugin>, GatewayError> {
        text.parse::<u32>()
            .ok()
            .and_then(|n| self.registry.lookup_by_menu(n))
            .ok_or_else(|| GatewayError::UnknownMenuSelection(escape_log(text)))
    }

    async fn in_plugin(
        &self,
        menu_number: u32,
        session: &Session,
        text: &str,
        command: &str,
        message: &InboundMessage,
    ) -> Result<Outcome, GatewayError> {
        let Some(plugin) = self.registry.lookup_by_menu(menu_number) else {
            warn!(
                "Session {} points at unregistered menu #{}",
                session.id, menu_number
            );
            return Ok(Outcome {
                reply: format!("Plugin not available.\n\n{}", self.render_menu()),
                transition: Transition::Leave { plugin: None },
            });
        };
        let name = plugin.metadata().name.clone();

        match command {
            EXIT_COMMAND => {
                return Ok(Outcome {
                    reply: format!("Returned to menu.\n\n{}", self.render_menu()),
                    transition: Transition::Leave { plugin: Some(name) },
                })
            }
            MENU_COMMAND => {
                return Ok(Outcome {
                    reply: self.render_menu(),
                    transition: Transition::Leave { plugin: Some(name) },
                })
            }
            HELP_COMMAND => return Ok(Outcome::stay(plugin.help_text())),
            _ => {}
        }

        let context = NodeContext {
            node_id: session.node_id.clone(),
            node_name: message.node_name.clone(),
            location: message.location,
            session_created_at: session.created_at,
            session_last_active_at: session.last_active_at,
        };
        let state = session.plugin_state.clone();
        let input = text.to_string();
        let call = Arc::clone(&plugin);

        // Not aborted on timeout; the detached task finishes on its own and its result is dropped.
        let task = tokio::spawn(async move { call.handle(&input, &context, &state).await });
        let response = match tokio::time::timeout(self.plugin_timeout, task).await {
            Err(_) => {
                return Err(GatewayError::PluginTimeout {
                    plugin: name,
                    timeout_secs: self.plugin_timeout.as_secs(),
                })
            }
            Ok(Err(join_err)) => {
                let reason = if join_err.is_panic() {
                    "handler panicked".to_string()
                } else {
                    join_err.to_string()
                };
                return Err(GatewayError::PluginDispatch { plugin: name, reason });
            }
            Ok(Ok(Err(e))) => {
                return Err(GatewayError::PluginDispatch {
                    plugin: name,
                    reason: format!("{:#}", e),
                })
            }
            Ok(Ok(Ok(response))) => response,
        };

        if response.exit_plugin {
            return Ok(Outcome {
                reply: format!("{}\n\n{}", response.message, self.render_menu()),
                transition: Transition::Leave { plugin: Some(name) },
            });
        }
        Ok(Outcome {
            reply: response.message,
            transition: Transition::Stay {
                patch: response.plugin_state_patch,
            },
        })
    }

    fn commit(&self, lease: &SessionLease, outcome: Outcome) -> String {
        let node_id = lease.node_id();
        match outcome.transition {
            Transition::Stay { patch } => {
                // An oversized patch is dropped; the reply still goes out.
                if let Err(e) = self.sessions.merge_state(node_id, patch.as_ref()) {
                    warn!("Dropped state patch for {}: {}", node_id, e);
                }
            }
            Transition::Enter { menu_number, plugin } => {
                self.sessions.set_active_plugin(node_id, Some(menu_number));
                let counter = metrics::record_plugin_entry(&plugin);
                info!(
                    "{} entered '{}' (active {})",
                    node_id, plugin, counter.currently_active
                );
            }
            Transition::Leave { plugin } => {
                self.sessions.set_active_plugin(node_id, None);
                if let Some(plugin) = plugin {
                    metrics::record_plugin_exit(&plugin);
                    info!("{} left '{}'", node_id, plugin);
                }
            }
        }
        outcome.reply
    }

    fn record_exit(&self, session: &Session) {
        if let Some(plugin) = session
            .active_plugin
            .and_then(|n| self.registry.lookup_by_menu(n))
        {
            metrics::record_plugin_exit(&plugin.metadata().name);
        }
    }

    /// Expire idle sessions and prune idle rate windows. Returns the expired node ids.
    pub fn reap(&self, now: DateTime<Utc>) -> Vec<String> {
        let expired = self.sessions.drain_idle(now);
        for session in &expired {
            self.record_exit(session);
        }
        let pruned = self.limiter.cleanup_inactive(now);
        if !expired.is_empty() || pruned > 0 {
            info!(
                "Reaper: expired {} session(s), pruned {} rate window(s)",
                expired.len(),
                pruned
            );
        }
        expired.into_iter().map(|s| s.node_id).collect()
    }
}

/// Whole seconds until retry, rounded up and never zero.
fn retry_secs(retry_after: Duration) -> u64 {
    let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
    secs.max(1)
}
