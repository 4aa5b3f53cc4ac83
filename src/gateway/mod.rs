//! # Dispatch Engine
//!
//! Everything between the transport and the plugins:
//!
//! - [`filter`] - allow/deny admission
//! - [`rate_limit`] - per-node sliding-window throttle
//! - [`registry`] - plugins keyed by menu number
//! - [`session`] - per-node session store and dispatch leases
//! - [`chunker`] - radio-sized reply chunks
//! - [`router`] - the menu/plugin state machine
//! - [`server`] - ingestion loop, dispatch lanes and reaper
//!
//! Components are leaves-first: the router composes the first five, the
//! server drives the router.

pub mod chunker;
pub mod errors;
pub mod filter;
pub mod rate_limit;
pub mod registry;
pub mod router;
pub mod server;
pub mod session;

pub use chunker::{strip_markers, ContentChunker, MARKER, MIN_MAX_SIZE};
pub use errors::GatewayError;
pub use filter::{Admission, NodeFilter};
pub use rate_limit::{RateDecision, RateLimiter};
pub use registry::PluginRegistry;
pub use router::MessageRouter;
pub use server::GatewayServer;
pub use session::{Session, SessionLease, SessionStore};
