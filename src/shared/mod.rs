//! Shared Module
//!
//! Platform-agnostic types of the synchronization core: entities and views,
//! record drafts, timestamps, errors and configuration. Nothing in here needs
//! the async runtime or the remote store.

/// Entities, identifiers and collection views
pub mod entity;

/// Record drafts and well-known field names
pub mod records;

/// Record date parsing
pub mod timestamp;

/// Shared error types
pub mod error;

/// Application configuration
pub mod config;

/// Re-export commonly used types for convenience
pub use config::{AppConfig, AppConfigBuilder, ConfigError};
pub use entity::{
    CollectionKind, CollectionView, Entity, EntityId, Fields, LocalId, Origin, RemoteDocument,
    SortOrder,
};
pub use error::{CacheError, RemoteError, SyncError, WriteOp};
pub use records::{Draft, NewEvent, NewMember, NewPost, PostCategory};
