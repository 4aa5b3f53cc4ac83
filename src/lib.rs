//! # Meshgate - Plugin Gateway for Meshtastic Networks
//!
//! Meshgate lets users on a low-bandwidth LoRa mesh reach pluggable services
//! through a numbered-menu chat interface. Every node gets its own session, so
//! one node browsing files never disturbs another asking the LLM a question.
//!
//! ## Features
//!
//! - **Numbered Menu**: plugins are selected by number; `!exit`, `!menu` and `!help` work everywhere.
//! - **Per-node Sessions**: ordered, non-overlapping handling per node with full parallelism across nodes.
//! - **Failure Isolation**: a failing, panicking or slow plugin leaves the session exactly as it was.
//! - **Radio-sized Replies**: long replies are split into byte-bounded chunks with a `[..]` continuation marker.
//! - **Admission Control**: optional allow/deny lists and a per-node sliding-window rate limit.
//! - **Built-in Plugins**: Gopher file browser, Ollama LLM assistant, Open-Meteo weather and Wikipedia.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use meshgate::config::Config;
//! use meshgate::gateway::{GatewayServer, PluginRegistry};
//! use meshgate::plugins::register_builtin;
//! use meshgate::transport::{ConsoleSink, ConsoleTransport};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!
//!     let mut registry = PluginRegistry::new();
//!     register_builtin(&config, &mut registry)?;
//!
//!     let server = GatewayServer::new(&config, registry, Arc::new(ConsoleSink::new()))?;
//!     server.run(ConsoleTransport::new()).await
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`gateway`] - dispatch engine: admission, rate limiting, sessions, state machine, chunking, server loop
//! - [`plugin`] - the capability contract every plugin implements
//! - [`plugins`] - built-in plugins and their registration
//! - [`transport`] - message source/sink seam and the shipped transports
//! - [`config`] - configuration loading and validation
//! - [`metrics`] - process-wide counters
//! - [`logutil`] - log formatting helpers
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   Transport     │ ← radio link, console or channels
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │ Gateway Server  │ ← ingestion, per-node lanes, reaper
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │ Message Router  │ ← admission, sessions, state machine, chunking
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │    Plugins      │ ← menu services
//! └─────────────────┘
//! ```

pub mod config;
pub mod gateway;
pub mod logutil;
pub mod metrics;
pub mod plugin;
pub mod plugins;
pub mod transport;
