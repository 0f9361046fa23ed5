//! # Notice Board
//!
//! Dismissible, user-visible notifications of synchronization failures.
//! Every notice is also written to the log at the matching level.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

use crate::shared::SyncError;

/// How serious a notice is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// One entry on the board
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    /// Handle used to dismiss the notice
    pub id: u64,
    pub severity: Severity,
    /// Text shown to the user
    pub message: String,
    /// Failure the notice was raised for, if any
    pub error: Option<SyncError>,
    pub raised_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct BoardState {
    next_id: u64,
    notices: Vec<Notice>,
}

/// Shared list of active notices
#[derive(Debug, Clone, Default)]
pub struct NoticeBoard {
    state: Arc<Mutex<BoardState>>,
}

impl NoticeBoard {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BoardState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Log a sync failure and post it as an error notice
    pub fn report(&self, error: &SyncError) -> u64 {
        tracing::error!("{}", error);
        self.push(Severity::Error, error.to_string(), Some(error.clone()))
    }

    /// Log and post a warning
    pub fn warn(&self, message: impl Into<String>) -> u64 {
        let message = message.into();
        tracing::warn!("{}", message);
        self.push(Severity::Warning, message, None)
    }

    fn push(&self, severity: Severity, message: String, error: Option<SyncError>) -> u64 {
        let mut state = self.lock();
        state.next_id += 1;
        let id = state.next_id;
        state.notices.push(Notice {
            id,
            severity,
            message,
            error,
            raised_at: Utc::now(),
        });
        id
    }

    /// Notices not yet dismissed, oldest first
    pub fn active(&self) -> Vec<Notice> {
        self.lock().notices.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().notices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().notices.is_empty()
    }

    /// Dismiss one notice, returns false if it was already gone
    pub fn dismiss(&self, id: u64) -> bool {
        let mut state = self.lock();
        let before = state.notices.len();
        state.notices.retain(|notice| notice.id != id);
        state.notices.len() != before
    }

    pub fn clear(&self) {
        self.lock().notices.clear();
    }
}
