//! In-process transport over tokio mpsc channels.
//!
//! [`ChannelTransport::pair`] returns the gateway-facing transport and a
//! [`ChannelHandle`] for the other side: push inbound messages with
//! [`ChannelHandle::inject`] and read what the gateway sent with
//! [`ChannelHandle::recv`].

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{InboundMessage, MessageSink, MessageSource};

/// Gateway side: a source of inbound messages.
pub struct ChannelTransport {
    inbound_rx: mpsc::UnboundedReceiver<InboundMessage>,
}

/// Gateway side: the reply sink. Cheap to clone.
#[derive(Clone)]
pub struct ChannelSink {
    outbound_tx: mpsc::UnboundedSender<(String, String)>,
}

/// Far side of the channel pair.
pub struct ChannelHandle {
    inbound_tx: Option<mpsc::UnboundedSender<InboundMessage>>,
    outbound_rx: mpsc::UnboundedReceiver<(String, String)>,
}

impl ChannelTransport {
    pub fn pair() -> (ChannelTransport, ChannelSink, ChannelHandle) {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        (
            ChannelTransport { inbound_rx },
            ChannelSink { outbound_tx },
            ChannelHandle {
                inbound_tx: Some(inbound_tx),
                outbound_rx,
            },
        )
    }
}

#[async_trait]
impl MessageSource for ChannelTransport {
    async fn next_message(&mut self) -> Option<InboundMessage> {
        self.inbound_rx.recv().await
    }
}

#[async_trait]
impl MessageSink for ChannelSink {
    async fn send(&self, node_id: &str, chunk: &str) -> Result<()> {
        self.outbound_tx
            .send((node_id.to_string(), chunk.to_string()))
            .map_err(|_| anyhow!("outbound channel closed"))
    }
}

impl ChannelHandle {
    /// Queue an inbound message for the gateway.
    pub fn inject(&self, message: InboundMessage) -> Result<()> {
        self.inbound_tx
            .as_ref()
            .ok_or_else(|| anyhow!("inbound channel already closed"))?
            .send(message)
            .map_err(|_| anyhow!("gateway stopped receiving"))
    }

    /// Shorthand for injecting plain text from `node_id`.
    pub fn say(&self, node_id: &str, text: &str) -> Result<()> {
        self.inject(InboundMessage::new(node_id, text))
    }

    /// Close the inbound side; the gateway drains and stops.
    pub fn close(&mut self) {
        self.inbound_tx = None;
    }

    /// Next `(node_id, chunk)` sent by the gateway.
    pub async fn recv(&mut self) -> Option<(String, String)> {
        self.outbound_rx.recv().await
    }

    /// Everything sent so far, without waiting.
    pub fn drain(&mut self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        while let Ok(item) = self.outbound_rx.try_recv() {
            out.push(item);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn messages_flow_both_ways() {
        let (mut transport, sink, mut handle) = ChannelTransport::pair();
        handle.say("!a", "hello").unwrap();
        let msg = transport.next_message().await.unwrap();
        assert_eq!(msg.node_id, "!a");
        assert_eq!(msg.text, "hello");

        sink.send("!a", "reply").await.unwrap();
        assert_eq!(handle.recv().await, Some(("!a".into(), "reply".into())));
    }

    #[tokio::test]
    async fn closing_ends_the_source() {
        let (mut transport, _sink, mut handle) = ChannelTransport::pair();
        handle.close();
        assert!(transport.next_message().await.is_none());
        assert!(handle.say("!a", "late").is_err());
    }

    #[tokio::test]
    async fn send_fails_after_handle_dropped() {
        let (_transport, sink, handle) = ChannelTransport::pair();
        drop(handle);
        assert!(sink.send("!a", "x").await.is_err());
    }
}
