//! Offline-first synchronization with the News server.
//!
//! A sync pass uploads local read and star changes, fetches folders, feeds
//! and items, reconciles them with the local store and recomputes the feed
//! counters. [`SyncService`] runs at most one pass at a time.

pub mod orchestrator;
pub mod service;
pub mod tracker;

use std::fmt;

use crate::api::QueryType;
use crate::app::TributaryError;
use crate::domain::MarkAction;

pub use service::SyncService;
pub use tracker::{ChangeTracker, PendingBatch};

/// What a sync pass does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncType {
    /// Upload changes, then fetch structure and items.
    FullSync,
    /// Upload changes without fetching anything.
    ChangesOnly,
    /// Fetch one page of older items for a feed, folder or the starred list.
    LoadMore {
        query_type: QueryType,
        id: i64,
        /// Smallest item id already shown.
        offset: i64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    UploadingChanges,
    FullFetch,
    IncrementalFetch,
    ChangesOnly,
    LoadingMore,
    Reconciling,
    RecomputingCounters,
    Failed(String),
}

impl SyncState {
    pub fn is_running(&self) -> bool {
        !matches!(self, SyncState::Idle | SyncState::Failed(_))
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncState::Idle => f.write_str("idle"),
            SyncState::UploadingChanges => f.write_str("uploading changes"),
            SyncState::FullFetch => f.write_str("fetching all items"),
            SyncState::IncrementalFetch => f.write_str("fetching updated items"),
            SyncState::ChangesOnly => f.write_str("confirming changes"),
            SyncState::LoadingMore => f.write_str("loading more items"),
            SyncState::Reconciling => f.write_str("reconciling"),
            SyncState::RecomputingCounters => f.write_str("recomputing counters"),
            SyncState::Failed(message) => write!(f, "failed: {}", message),
        }
    }
}

/// Result of a sync pass that ran to the end.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub uploaded: Vec<(MarkAction, usize)>,
    /// Change kinds whose upload failed. Their items stay dirty and are sent
    /// again on the next pass.
    pub upload_failures: Vec<(MarkAction, TributaryError)>,
    pub items_stored: usize,
    pub folders_removed: usize,
    pub feeds_removed: usize,
    pub items_purged: usize,
    pub failed_feeds: Vec<i64>,
}

impl SyncReport {
    pub fn is_success(&self) -> bool {
        self.upload_failures.is_empty()
    }
}

#[derive(Debug)]
pub enum SyncOutcome {
    Completed(SyncReport),
    /// Another pass was already running; this request was dropped.
    Coalesced,
}
