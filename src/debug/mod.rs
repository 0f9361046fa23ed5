//! Debug-build checks and chatty logging
//!
//! Reconciliation runs on every snapshot; its per-document traces and the
//! view invariant check are compiled in only when `debug_assertions` is on.

/// Whether this is a debug build
pub const DEBUG_MODE: bool = cfg!(debug_assertions);

/// `tracing::debug!` in debug builds, nothing otherwise
#[macro_export]
macro_rules! debug_log {
    ($($arg:tt)*) => {
        if $crate::debug::DEBUG_MODE {
            tracing::debug!($($arg)*);
        }
    };
}

/// `tracing::trace!` in debug builds, nothing otherwise
#[macro_export]
macro_rules! debug_trace {
    ($($arg:tt)*) => {
        if $crate::debug::DEBUG_MODE {
            tracing::trace!($($arg)*);
        }
    };
}

/// Check a view invariant
///
/// A violation is logged at `error`; debug builds also panic.
pub fn validate_invariant(holds: bool, message: &str) {
    if !holds {
        tracing::error!("Invariant violation: {}", message);
        #[cfg(debug_assertions)]
        {
            panic!("Invariant violation: {}", message);
        }
    }
}
