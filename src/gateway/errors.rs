use thiserror::Error;

/// Errors raised inside the dispatch engine.
///
/// Admission, rate-limit and menu errors never leave the router; they are turned
/// into replies (or silence) before any plugin sees the message. Registration
/// errors are fatal and surface before the gateway starts serving traffic.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Node rejected by the allow/deny lists.
    #[error("node {0} is not admitted")]
    AdmissionDenied(String),

    /// Node exceeded its sliding-window budget.
    #[error("rate limited, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// Text at the main menu did not name a registered plugin.
    #[error("unknown menu selection: {0}")]
    UnknownMenuSelection(String),

    /// Two plugins claim the same menu number.
    #[error("menu number {menu_number} is already used by '{existing}'")]
    DuplicateMenuNumber { menu_number: u32, existing: String },

    /// Two plugins share a display name.
    #[error("plugin '{0}' is already registered")]
    DuplicatePluginName(String),

    /// Metadata failed validation (empty name, zero menu number).
    #[error("invalid plugin metadata: {0}")]
    InvalidPluginMetadata(String),

    /// Plugin handler returned an error or panicked.
    #[error("plugin '{plugin}' failed: {reason}")]
    PluginDispatch { plugin: String, reason: String },

    /// Plugin handler did not finish before the dispatch deadline.
    #[error("plugin '{plugin}' timed out after {timeout_secs}s")]
    PluginTimeout { plugin: String, timeout_secs: u64 },

    /// Merged plugin state would exceed the configured byte budget.
    #[error("plugin state for {node_id} would be {size} bytes (limit {limit})")]
    StateTooLarge {
        node_id: String,
        size: usize,
        limit: usize,
    },

    /// Session table is full and every session has a dispatch in flight.
    #[error("session capacity of {0} exhausted")]
    CapacityExhausted(usize),

    /// Transport refused a chunk.
    #[error("send to {node_id} failed: {reason}")]
    TransportSend { node_id: String, reason: String },

    /// Configuration value out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl GatewayError {
    /// True for failures that originate in a plugin call and require the
    /// session to be left exactly as it was before the call.
    pub fn is_dispatch_failure(&self) -> bool {
        matches!(
            self,
            GatewayError::PluginDispatch { .. } | GatewayError::PluginTimeout { .. }
        )
    }
}
