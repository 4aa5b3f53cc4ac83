//! # Gateway Server
//!
//! Owns the ingestion loop, the per-node dispatch lanes and the reaper.
//!
//! ## Dispatch lanes
//!
//! Every node with pending work has one lane: an unbounded queue served by a
//! single tokio task. Messages for one node are therefore handled in arrival
//! order and never overlap, while lanes for different nodes run in parallel.
//! A lane task exits once its queue is empty. The emptiness check and the
//! lane removal happen under the lane-map lock, the same lock the ingestion
//! loop holds while enqueueing, so a message is never left in a retired lane.
//!
//! ## Reaper
//!
//! An independent task ticks every `session_cleanup_interval`, expiring idle
//! sessions and pruning idle rate windows. It never touches a session with a
//! dispatch in flight.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use meshgate::config::Config;
//! use meshgate::gateway::{GatewayServer, PluginRegistry};
//! use meshgate::transport::ChannelTransport;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     let (source, sink, _handle) = ChannelTransport::pair();
//!     let server = GatewayServer::new(&config, PluginRegistry::new(), Arc::new(sink))?;
//!     server.run(source).await
//! }
//! ```

use anyhow::Result;
use chrono::Utc;
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};

use super::errors::GatewayError;
use super::registry::PluginRegistry;
use super::router::MessageRouter;
use crate::config::Config;
use crate::logutil::describe_chunks;
use crate::metrics;
use crate::transport::{InboundMessage, MessageSink, MessageSource};

type LaneMap = Arc<Mutex<HashMap<String, mpsc::UnboundedSender<InboundMessage>>>>;

pub struct GatewayServer {
    router: Arc<MessageRouter>,
    sink: Arc<dyn MessageSink>,
    lanes: LaneMap,
    chunk_delay: Duration,
    cleanup_interval: Duration,
}

impl GatewayServer {
    pub fn new(config: &Config, registry: PluginRegistry, sink: Arc<dyn MessageSink>) -> Result<Self> {
        config.validate()?;
        let router = MessageRouter::new(config, registry)?;
        Ok(Self {
            router: Arc::new(router),
            sink,
            lanes: Arc::new(Mutex::new(HashMap::new())),
            chunk_delay: config.server.chunk_delay(),
            cleanup_interval: config.server.session_cleanup_interval(),
        })
    }

    pub fn router(&self) -> &Arc<MessageRouter> {
        &self.router
    }

    /// Number of nodes with a live dispatch lane.
    pub fn active_lanes(&self) -> usize {
        self.lanes.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Serve `source` until it is exhausted or Ctrl-C is received.
    pub async fn run<S: MessageSource>(&self, source: S) -> Result<()> {
        self.run_until(source, async {
            if tokio::signal::ctrl_c().await.is_err() {
                warn!("Ctrl-C handler unavailable; stopping only when the source closes");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Serve `source` until it is exhausted or `shutdown` completes. Messages
    /// already queued in a lane are processed before returning.
    pub async fn run_until<S, F>(&self, mut source: S, shutdown: F) -> Result<()>
    where
        S: MessageSource,
        F: Future<Output = ()>,
    {
        info!(
            "Gateway started with {} plugin(s), max message size {}, node filter {}, rate limit {}",
            self.router.registry().len(),
            self.router.chunker().max_size(),
            if self.router.filter().is_active() { "on" } else { "off" },
            if self.router.limiter().is_enabled() { "on" } else { "off" }
        );
        let reaper = self.spawn_reaper();
        let mut workers = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                maybe = source.next_message() => match maybe {
                    Some(message) => self.dispatch(message, &mut workers),
                    None => {
                        info!("Message source closed");
                        break;
                    }
                },
                Some(joined) = workers.join_next(), if !workers.is_empty() => {
                    log_lane_exit(joined);
                }
                _ = &mut shutdown => {
                    info!("Received shutdown signal");
                    break;
                }
            }
        }

        debug!("Draining {} dispatch lane(s)", workers.len());
        while let Some(joined) = workers.join_next().await {
            log_lane_exit(joined);
        }
        reaper.abort();
        info!("Gateway stopped: {}", metrics::snapshot());
        for (plugin, counter) in metrics::plugin_counters_snapshot() {
            info!(
                "Plugin '{}': {} entries, {} exits, peak {} concurrent",
                plugin, counter.entries, counter.exits, counter.concurrent_peak
            );
        }
        Ok(())
    }

    fn dispatch(&self, message: InboundMessage, workers: &mut JoinSet<()>) {
        let node_id = message.node_id.clone();
        let mut lanes = self.lanes.lock().unwrap_or_else(PoisonError::into_inner);
        let message = match lanes.get(&node_id) {
            Some(tx) => match tx.send(message) {
                Ok(()) => return,
                // Lane task died without retiring; replace it.
                Err(mpsc::error::SendError(message)) => message,
            },
            None => message,
        };

        let (tx, rx) = mpsc::unbounded_channel();
        if tx.send(message).is_err() {
            return;
        }
        lanes.insert(node_id.clone(), tx);
        drop(lanes);

        workers.spawn(run_lane(
            node_id,
            rx,
            Arc::clone(&self.lanes),
            Arc::clone(&self.router),
            Arc::clone(&self.sink),
            self.chunk_delay,
        ));
    }

    fn spawn_reaper(&self) -> JoinHandle<()> {
        let router = Arc::clone(&self.router);
        let period = self.cleanup_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                router.reap(Utc::now());
                debug!("Metrics: {}", metrics::snapshot());
            }
        })
    }
}

fn log_lane_exit(joined: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        if e.is_panic() {
            error!("Dispatch lane panicked: {}", e);
        }
    }
}

/// Serve one node's queue until it is empty, then retire.
async fn run_lane(
    node_id: String,
    mut rx: mpsc::UnboundedReceiver<InboundMessage>,
    lanes: LaneMap,
    router: Arc<MessageRouter>,
    sink: Arc<dyn MessageSink>,
    chunk_delay: Duration,
) {
    loop {
        let next = match rx.try_recv() {
            Ok(message) => Some(message),
            Err(_) => {
                let mut map = lanes.lock().unwrap_or_else(PoisonError::into_inner);
                match rx.try_recv() {
                    Ok(message) => Some(message),
                    Err(_) => {
                        map.remove(&node_id);
                        None
                    }
                }
            }
        };
        let Some(message) = next else {
            debug!("Lane for {} retired", node_id);
            return;
        };
        let chunks = router.handle(&message).await;
        if !chunks.is_empty() {
            debug!("-> {}: {}", node_id, describe_chunks(&chunks));
            send_chunks(sink.as_ref(), &node_id, &chunks, chunk_delay).await;
        }
    }
}

/// Send chunks in order with `delay` between them. A failed chunk is logged
/// and counted; the rest are still attempted.
pub async fn send_chunks(sink: &dyn MessageSink, node_id: &str, chunks: &[String], delay: Duration) -> usize {
    let mut sent = 0;
    for (i, chunk) in chunks.iter().enumerate() {
        if i > 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        match sink.send(node_id, chunk).await {
            Ok(()) => {
                metrics::inc_chunks_sent();
                sent += 1;
            }
            Err(e) => {
                metrics::inc_send_failures();
                let err = GatewayError::TransportSend {
                    node_id: node_id.to_string(),
                    reason: format!("{:#}", e),
                };
                warn!("Chunk {}/{}: {}", i + 1, chunks.len(), err);
            }
        }
    }
    sent
}
