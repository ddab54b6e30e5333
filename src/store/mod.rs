pub mod events;
pub mod schema;
pub mod sqlite;

use tokio::sync::broadcast;

use crate::api::IncomingItem;
use crate::app::Result;
use crate::domain::{Feed, Folder, Item, MarkAction, TemporaryFeed, User, WindowKind};

pub use events::StoreEvent;
pub use sqlite::SqliteStore;

/// Item ids whose pending change of one kind the server has accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmedChange {
    pub action: MarkAction,
    pub item_ids: Vec<i64>,
}

/// Server-side structure applied in one transaction at the end of a sync.
///
/// `None` leaves the corresponding local table untouched; `Some` replaces it,
/// deleting local rows whose id is missing from the list.
#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    pub folders: Option<Vec<Folder>>,
    pub feeds: Option<Vec<Feed>>,
    pub user: Option<User>,
    pub confirmed: Vec<ConfirmedChange>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertStats {
    /// Full items inserted or replaced.
    pub stored: usize,
    /// Flags-only payloads that matched a stored item.
    pub flags_applied: usize,
    /// Flags-only payloads without a matching item.
    pub unmatched: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub folders_removed: usize,
    pub feeds_removed: usize,
}

pub trait Store: Send + Sync {
    // Folder operations
    fn get_folder(&self, id: i64) -> Result<Option<Folder>>;
    fn get_all_folders(&self) -> Result<Vec<Folder>>;

    // Feed operations
    fn get_feed(&self, id: i64) -> Result<Option<Feed>>;
    fn get_all_feeds(&self) -> Result<Vec<Feed>>;
    fn get_feeds_in_folder(&self, folder_id: i64) -> Result<Vec<Feed>>;
    /// Insert or replace a feed, keeping the local counters of an existing row.
    fn insert_feed(&self, feed: &Feed) -> Result<()>;
    fn move_feed(&self, feed_id: i64, folder_id: i64) -> Result<()>;
    /// Delete a feed and its items. Returns whether a row was removed.
    fn delete_feed(&self, feed_id: i64) -> Result<bool>;

    // Item operations
    fn get_item(&self, id: i64) -> Result<Option<Item>>;
    fn get_items_by_feed(&self, feed_id: i64, unread_only: bool) -> Result<Vec<Item>>;
    fn get_items_by_folder(&self, folder_id: i64, unread_only: bool) -> Result<Vec<Item>>;
    fn get_starred_items(&self) -> Result<Vec<Item>>;
    fn get_unread_items(&self) -> Result<Vec<Item>>;
    fn item_count(&self) -> Result<i64>;
    /// Highest `last_modified` of any stored item, `0` on an empty store.
    fn max_last_modified(&self) -> Result<i64>;
    /// Store a batch of incoming items in one transaction.
    fn upsert_items(&self, items: &[IncomingItem]) -> Result<UpsertStats>;

    // State operations
    /// Set the unread flag of the given items and of every item sharing their
    /// fingerprint. Returns the number of items that changed.
    fn set_items_unread(&self, ids: &[i64], unread: bool) -> Result<usize>;
    fn set_items_starred(&self, ids: &[i64], starred: bool) -> Result<usize>;
    fn pending_changes(&self, action: MarkAction) -> Result<Vec<Item>>;
    fn pending_change_count(&self) -> Result<i64>;
    fn clear_changes(&self, confirmed: &[ConfirmedChange]) -> Result<()>;

    // Sync operations
    fn reconcile(&self, reconciliation: &Reconciliation) -> Result<ReconcileStats>;
    fn recompute_counters(&self) -> Result<()>;
    /// Delete the oldest purgeable items until at most `max_items` remain.
    fn remove_excess_items(&self, max_items: i64) -> Result<usize>;
    fn get_user(&self) -> Result<Option<User>>;

    // Window operations
    fn set_list_window(&self, tree_item_id: i64, name: &str, item_ids: &[i64]) -> Result<()>;
    /// Copy the list window into the pager window and mark its items active.
    fn update_pager_window(&self) -> Result<()>;
    fn get_window(&self, kind: WindowKind) -> Result<TemporaryFeed>;
    /// Mark the list window read in display order, up to and including
    /// `last_item_id` when given.
    fn mark_list_window_read(&self, last_item_id: Option<i64>) -> Result<usize>;

    /// Delete all account data.
    fn reset(&self) -> Result<()>;
    fn subscribe(&self) -> broadcast::Receiver<StoreEvent>;
}
