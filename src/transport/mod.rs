//! # Transport Seam
//!
//! The gateway never talks to radio hardware directly. It pulls inbound text
//! from a [`MessageSource`] and pushes reply chunks to a [`MessageSink`].
//! Two transports ship with the crate:
//!
//! - [`channel::ChannelTransport`] - in-process tokio channels, used for
//!   embedding the gateway and by the integration tests
//! - [`console::ConsoleTransport`] - `node_id: text` lines on stdin, replies
//!   on stdout, for running the gateway by hand
//!
//! A mesh radio link is another implementation of the same two traits.

pub mod channel;
pub mod console;

use anyhow::Result;
use async_trait::async_trait;

use crate::plugin::GpsLocation;

pub use channel::{ChannelHandle, ChannelSink, ChannelTransport};
pub use console::{ConsoleSink, ConsoleTransport};

/// One text message received from a node.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub node_id: String,
    /// Long name announced by the node, when the transport knows it.
    pub node_name: Option<String>,
    pub text: String,
    pub location: Option<GpsLocation>,
}

impl InboundMessage {
    pub fn new(node_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            node_name: None,
            text: text.into(),
            location: None,
        }
    }

    pub fn with_location(mut self, location: GpsLocation) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.node_name = Some(name.into());
        self
    }
}

/// Lazily produced stream of inbound messages. `None` means the source is
/// exhausted and the gateway should shut down.
#[async_trait]
pub trait MessageSource: Send {
    async fn next_message(&mut self) -> Option<InboundMessage>;
}

/// Delivery of one reply chunk to one node. Failures are reported, never retried.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn send(&self, node_id: &str, chunk: &str) -> Result<()>;
}
