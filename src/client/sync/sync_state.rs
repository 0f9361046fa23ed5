//! # Sync Engine State
//!
//! Lifecycle of one collection view:
//!
//! ```text
//! Uninitialized ──start()──► Connecting ──first snapshot──► Subscribed
//!       │                        │                             │
//!       └──start(), cache hit────┼──────────► Subscribed { provisional }
//!                                │                             │
//!                      feed error ▼                             ▼
//!                              Failed ◄──────feed error──── (any running)
//!                                 └──start()──► Connecting
//! any ──stop()──► Unsubscribed ──start()──► Connecting
//! ```
//!
//! Reconciliation happens under the engine lock and is never observable as a
//! state of its own.

/// Lifecycle state of a Sync Engine
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum EngineState {
    /// Never started
    #[default]
    Uninitialized,
    /// Feed open, nothing to show yet
    Connecting,
    /// Serving a view; `provisional` while it still comes from the cache
    Subscribed { provisional: bool },
    /// Feed failed; the last known view is still served and writable
    Failed(String),
    /// Torn down by `stop()`
    Unsubscribed,
}

impl EngineState {
    /// Whether writes are accepted
    pub fn is_running(&self) -> bool {
        matches!(
            self,
            EngineState::Connecting | EngineState::Subscribed { .. } | EngineState::Failed(_)
        )
    }

    /// Whether `start()` has work to do
    pub fn can_start(&self) -> bool {
        matches!(
            self,
            EngineState::Uninitialized | EngineState::Failed(_) | EngineState::Unsubscribed
        )
    }
}
