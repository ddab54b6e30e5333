//! One sync pass, step by step.
//!
//! Network calls are the only suspension points. Every store write is its
//! own short transaction: one per page of items, one for the reconcile step.
//! A failed step aborts the rest of the pass; whatever was committed before
//! stays, and the next pass repairs it since all writes are idempotent.

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::api::{ItemPayload, ItemsQuery, NewsApi, QueryType};
use crate::app::{Result, TributaryError};
use crate::config::SyncConfig;
use crate::domain::MarkAction;
use crate::store::{ConfirmedChange, Reconciliation, Store};
use crate::sync::{ChangeTracker, SyncReport, SyncState, SyncType};

pub struct SyncPass<'a> {
    store: &'a dyn Store,
    api: &'a dyn NewsApi,
    config: &'a SyncConfig,
    state: &'a watch::Sender<SyncState>,
}

impl<'a> SyncPass<'a> {
    pub fn new(
        store: &'a dyn Store,
        api: &'a dyn NewsApi,
        config: &'a SyncConfig,
        state: &'a watch::Sender<SyncState>,
    ) -> Self {
        Self {
            store,
            api,
            config,
            state,
        }
    }

    pub async fn run(&self, sync_type: SyncType) -> Result<SyncReport> {
        let mut report = SyncReport::default();
        match sync_type {
            SyncType::FullSync => self.full_sync(&mut report).await?,
            SyncType::ChangesOnly => self.changes_only(&mut report).await?,
            SyncType::LoadMore {
                query_type,
                id,
                offset,
            } => self.load_more(&mut report, query_type, id, offset).await?,
        }
        Ok(report)
    }

    fn enter(&self, state: SyncState) {
        debug!("Sync state: {}", state);
        self.state.send_replace(state);
    }

    async fn full_sync(&self, report: &mut SyncReport) -> Result<()> {
        let confirmed = self.upload_changes(report).await?;

        let last_sync = self.store.max_last_modified()?;
        let (folders, feeds, user) =
            futures::try_join!(self.api.folders(), self.api.feeds(), self.api.user())?;

        if last_sync == 0 {
            self.enter(SyncState::FullFetch);
            report.items_stored += self.page_through(QueryType::Starred, true).await?;
            report.items_stored += self.page_through(QueryType::All, false).await?;
        } else {
            self.enter(SyncState::IncrementalFetch);
            let payloads = self
                .api
                .updated_items(last_sync, QueryType::All, 0)
                .await?;
            debug!("{} items changed since {}", payloads.len(), last_sync);
            report.items_stored += self.store_items(payloads)?;
        }

        self.enter(SyncState::Reconciling);
        report.failed_feeds = feeds
            .iter()
            .filter(|feed| feed.is_considered_failed(self.config.failed_feed_threshold))
            .map(|feed| feed.id)
            .collect();
        let stats = self.store.reconcile(&Reconciliation {
            folders: Some(folders),
            feeds: Some(feeds),
            user: Some(user),
            confirmed,
        })?;
        report.folders_removed = stats.folders_removed;
        report.feeds_removed = stats.feeds_removed;
        if stats.folders_removed > 0 || stats.feeds_removed > 0 {
            info!(
                "Removed {} folders and {} feeds no longer on the server",
                stats.folders_removed, stats.feeds_removed
            );
        }

        self.enter(SyncState::RecomputingCounters);
        self.store.recompute_counters()?;
        report.items_purged = self.store.remove_excess_items(self.config.max_items)?;

        if !report.failed_feeds.is_empty() {
            warn!("Feeds failing to update: {:?}", report.failed_feeds);
        }
        info!(
            "Sync finished: {} items stored, {} purged",
            report.items_stored, report.items_purged
        );
        Ok(())
    }

    async fn changes_only(&self, report: &mut SyncReport) -> Result<()> {
        let confirmed = self.upload_changes(report).await?;
        self.enter(SyncState::ChangesOnly);
        self.store.clear_changes(&confirmed)?;
        Ok(())
    }

    async fn load_more(
        &self,
        report: &mut SyncReport,
        query_type: QueryType,
        id: i64,
        offset: i64,
    ) -> Result<()> {
        self.enter(SyncState::LoadingMore);
        let query = ItemsQuery {
            id,
            ..ItemsQuery::page(query_type, true, self.config.batch_size).with_offset(offset)
        };
        let payloads = self.api.items(&query).await?;
        report.items_stored += self.store_items(payloads)?;

        self.enter(SyncState::RecomputingCounters);
        self.store.recompute_counters()?;
        Ok(())
    }

    /// Upload every kind of pending change. A failed kind is recorded in the
    /// report and left dirty; the others go ahead.
    async fn upload_changes(&self, report: &mut SyncReport) -> Result<Vec<ConfirmedChange>> {
        self.enter(SyncState::UploadingChanges);
        let tracker = ChangeTracker::new(self.store);
        let mut confirmed = Vec::new();

        for action in MarkAction::ALL {
            let batch = tracker.batch(action)?;
            if !batch.unsendable.is_empty() {
                confirmed.push(ConfirmedChange {
                    action,
                    item_ids: batch.unsendable.clone(),
                });
            }
            if batch.is_empty() {
                continue;
            }

            let result = match action {
                MarkAction::MarkRead => self.api.mark_read(&batch.item_ids).await,
                MarkAction::MarkUnread => self.api.mark_unread(&batch.item_ids).await,
                MarkAction::MarkStarred => self.api.mark_starred(&batch.refs).await,
                MarkAction::MarkUnstarred => self.api.mark_unstarred(&batch.refs).await,
            };

            match result {
                Ok(()) => {
                    debug!("Uploaded {} for {} items", action, batch.len());
                    report.uploaded.push((action, batch.len()));
                    confirmed.push(ConfirmedChange {
                        action,
                        item_ids: batch.item_ids,
                    });
                }
                Err(e) => {
                    let error = TributaryError::from(e);
                    warn!("Failed to {} {} items: {}", action, batch.len(), error);
                    report.upload_failures.push((action, error));
                }
            }
        }
        Ok(confirmed)
    }

    /// Page backwards through the item list, one transaction per page.
    async fn page_through(&self, query_type: QueryType, get_read: bool) -> Result<usize> {
        let mut query = ItemsQuery::page(query_type, get_read, self.config.batch_size);
        let mut stored = 0;
        let mut pages = 0;

        loop {
            let payloads = self.api.items(&query).await?;
            let count = payloads.len() as i64;
            let lowest = payloads.iter().filter_map(|p| p.id).min();
            stored += self.store_items(payloads)?;
            pages += 1;

            if count < self.config.batch_size {
                break;
            }
            match lowest {
                Some(id) if query.offset == 0 || id < query.offset => {
                    query = query.with_offset(id);
                }
                _ => break,
            }
        }

        debug!(
            "Fetched {:?} items (read included: {}) in {} pages",
            query_type, get_read, pages
        );
        Ok(stored)
    }

    fn store_items(&self, payloads: Vec<ItemPayload>) -> Result<usize> {
        let incoming: Vec<_> = payloads
            .into_iter()
            .filter_map(|payload| match payload.finalize() {
                Ok(item) => Some(item),
                Err(e) => {
                    warn!("Skipping item: {}", e);
                    None
                }
            })
            .collect();
        if incoming.is_empty() {
            return Ok(0);
        }

        let stats = self.store.upsert_items(&incoming)?;
        if stats.unmatched > 0 {
            debug!("{} flag updates had no matching item", stats.unmatched);
        }
        Ok(stats.stored + stats.flags_applied)
    }
}
