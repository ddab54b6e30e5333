use std::sync::Arc;

use tokio::sync::{watch, Mutex};

use crate::api::NewsApi;
use crate::app::Result;
use crate::config::SyncConfig;
use crate::domain::Feed;
use crate::store::Store;
use crate::sync::orchestrator::SyncPass;
use crate::sync::{SyncOutcome, SyncState, SyncType};

/// Entry point for everything that talks to the server.
///
/// Only one sync pass runs at a time. Feed structure changes wait for a
/// running pass to finish so its reconcile step cannot undo them.
pub struct SyncService {
    store: Arc<dyn Store>,
    api: Arc<dyn NewsApi>,
    config: SyncConfig,
    lock: Mutex<()>,
    state: watch::Sender<SyncState>,
}

impl SyncService {
    pub fn new(store: Arc<dyn Store>, api: Arc<dyn NewsApi>, config: SyncConfig) -> Self {
        let (state, _) = watch::channel(SyncState::Idle);
        Self {
            store,
            api,
            config,
            lock: Mutex::new(()),
            state,
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn state(&self) -> SyncState {
        self.state.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    /// Run a sync pass, or return [`SyncOutcome::Coalesced`] right away when
    /// one is already running.
    pub async fn sync(&self, sync_type: SyncType) -> Result<SyncOutcome> {
        let Ok(_guard) = self.lock.try_lock() else {
            tracing::debug!("Sync already in progress, dropping {:?}", sync_type);
            return Ok(SyncOutcome::Coalesced);
        };

        tracing::info!("Starting {:?}", sync_type);
        let pass = SyncPass::new(
            self.store.as_ref(),
            self.api.as_ref(),
            &self.config,
            &self.state,
        );

        match pass.run(sync_type).await {
            Ok(report) => {
                if report.is_success() {
                    self.state.send_replace(SyncState::Idle);
                } else {
                    let kinds: Vec<String> = report
                        .upload_failures
                        .iter()
                        .map(|(action, _)| action.to_string())
                        .collect();
                    self.state.send_replace(SyncState::Failed(format!(
                        "could not upload: {}",
                        kinds.join(", ")
                    )));
                }
                Ok(SyncOutcome::Completed(report))
            }
            Err(e) => {
                tracing::error!("Sync failed: {}", e);
                self.state.send_replace(SyncState::Failed(e.to_string()));
                Err(e)
            }
        }
    }

    /// Subscribe to a feed on the server, then store it locally.
    pub async fn create_feed(&self, url: &str, folder_id: i64) -> Result<Feed> {
        let _guard = self.lock.lock().await;
        let mut feed = self.api.create_feed(url, folder_id).await?;
        feed.unread_count = 0;
        feed.starred_count = 0;
        self.store.insert_feed(&feed)?;
        tracing::info!("Subscribed to {} as feed {}", feed.url, feed.id);
        Ok(feed)
    }

    pub async fn move_feed(&self, feed_id: i64, folder_id: i64) -> Result<()> {
        let _guard = self.lock.lock().await;
        self.api.move_feed(feed_id, folder_id).await?;
        self.store.move_feed(feed_id, folder_id)
    }

    /// Delete a feed on the server, then locally together with its items.
    pub async fn delete_feed(&self, feed_id: i64) -> Result<()> {
        let _guard = self.lock.lock().await;
        self.api.delete_feed(feed_id).await?;
        if !self.store.delete_feed(feed_id)? {
            tracing::debug!("Feed {} was not stored locally", feed_id);
        }
        Ok(())
    }

    /// Local only; the change is uploaded by the next sync pass.
    pub fn set_item_unread(&self, unread: bool, item_ids: &[i64]) -> Result<usize> {
        self.store.set_items_unread(item_ids, unread)
    }

    /// Local only; the change is uploaded by the next sync pass.
    pub fn set_item_starred(&self, starred: bool, item_ids: &[i64]) -> Result<usize> {
        self.store.set_items_starred(item_ids, starred)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::{item_payload, FakeApi};
    use crate::api::{ItemRef, QueryType};
    use crate::app::TributaryError;
    use crate::domain::{Folder, MarkAction, User};
    use crate::store::SqliteStore;
    use crate::sync::SyncReport;

    struct Harness {
        store: Arc<SqliteStore>,
        api: Arc<FakeApi>,
        service: SyncService,
    }

    fn harness(api: FakeApi) -> Harness {
        harness_with(api, SyncConfig::default())
    }

    fn harness_with(api: FakeApi, config: SyncConfig) -> Harness {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let api = Arc::new(api);
        let service = SyncService::new(store.clone(), api.clone(), config);
        Harness {
            store,
            api,
            service,
        }
    }

    fn server_with_feed() -> FakeApi {
        FakeApi::new().with(|s| {
            s.folders = vec![Folder::new(5, "News")];
            let mut feed = Feed::new(1, "https://example.com/feed.xml");
            feed.folder_id = 5;
            s.feeds = vec![feed];
        })
    }

    fn completed(outcome: SyncOutcome) -> SyncReport {
        match outcome {
            SyncOutcome::Completed(report) => report,
            SyncOutcome::Coalesced => panic!("sync was coalesced"),
        }
    }

    fn seed_local(store: &SqliteStore, ids: &[i64], last_modified: i64) {
        store
            .insert_feed(&Feed::new(1, "https://example.com/feed.xml"))
            .unwrap();
        let items: Vec<_> = ids
            .iter()
            .map(|&id| item_payload(id, 1, last_modified).finalize().unwrap())
            .collect();
        store.upsert_items(&items).unwrap();
        store.recompute_counters().unwrap();
    }

    fn counters_match(store: &SqliteStore) -> bool {
        store.get_all_feeds().unwrap().iter().all(|feed| {
            let items = store.get_items_by_feed(feed.id, false).unwrap();
            feed.unread_count == items.iter().filter(|i| i.is_unread()).count() as i64
                && feed.starred_count == items.iter().filter(|i| i.is_starred()).count() as i64
        })
    }

    #[tokio::test]
    async fn test_first_sync_pages_starred_then_unread() {
        let api = server_with_feed().with(|s| {
            s.items = (1..=250).map(|id| item_payload(id, 1, id)).collect();
            for id in 300..305 {
                let mut starred = item_payload(id, 1, id);
                starred.unread = Some(false);
                starred.starred = Some(true);
                s.items.push(starred);
            }
            let mut read = item_payload(400, 1, 400);
            read.unread = Some(false);
            s.items.push(read);
        });
        let h = harness(api);

        let report = completed(h.service.sync(SyncType::FullSync).await.unwrap());
        assert!(report.is_success());
        assert_eq!(report.items_stored, 255);

        assert_eq!(h.store.item_count().unwrap(), 255);
        assert!(h.store.get_item(400).unwrap().is_none());
        let items_calls = h.api.calls().iter().filter(|c| *c == "items").count();
        assert_eq!(items_calls, 4);

        let feed = h.store.get_feed(1).unwrap().unwrap();
        assert_eq!(feed.unread_count, 250);
        assert_eq!(feed.starred_count, 5);
        assert_eq!(feed.folder_id, 5);
        assert_eq!(h.store.get_user().unwrap().unwrap().user_id, "alice");
        assert_eq!(h.service.state(), SyncState::Idle);
    }

    #[tokio::test]
    async fn test_paging_stops_on_full_last_page() {
        let api = server_with_feed().with(|s| {
            s.items = (1..=4).map(|id| item_payload(id, 1, id)).collect();
        });
        let config = SyncConfig {
            batch_size: 2,
            ..SyncConfig::default()
        };
        let h = harness_with(api, config);

        h.service.sync(SyncType::FullSync).await.unwrap();

        assert_eq!(h.store.item_count().unwrap(), 4);
        // Starred: one empty page. Unread: two full pages, then an empty one.
        let items_calls = h.api.calls().iter().filter(|c| *c == "items").count();
        assert_eq!(items_calls, 4);
    }

    #[tokio::test]
    async fn test_incremental_sync() {
        let api = server_with_feed().with(|s| {
            s.items = vec![
                item_payload(1, 1, 900),
                item_payload(11, 1, 1001),
                item_payload(12, 1, 1002),
                item_payload(15, 1, 1005),
            ];
        });
        let h = harness(api);
        seed_local(&h.store, &[2], 1000);

        completed(h.service.sync(SyncType::FullSync).await.unwrap());

        assert_eq!(h.store.max_last_modified().unwrap(), 1005);
        for id in [11, 12, 15] {
            assert!(h.store.get_item(id).unwrap().is_some());
        }
        assert!(h.store.get_item(1).unwrap().is_none());
        let calls = h.api.calls();
        assert!(calls.contains(&"updated_items".to_string()));
        assert!(!calls.contains(&"items".to_string()));
        assert!(counters_match(&h.store));
    }

    #[tokio::test]
    async fn test_upload_failure_keeps_items_dirty() {
        let api = server_with_feed().with(|s| {
            s.items = vec![item_payload(1, 1, 1001), item_payload(2, 1, 1001)];
        });
        api.fail("mark_read");
        let h = harness(api);
        seed_local(&h.store, &[1, 2], 1000);
        h.service.set_item_unread(false, &[1, 2]).unwrap();

        let report = completed(h.service.sync(SyncType::FullSync).await.unwrap());

        assert!(!report.is_success());
        assert_eq!(report.upload_failures.len(), 1);
        assert_eq!(report.upload_failures[0].0, MarkAction::MarkRead);
        assert!(matches!(
            report.upload_failures[0].1,
            TributaryError::Server { status: 503, .. }
        ));
        for id in [1, 2] {
            let item = h.store.get_item(id).unwrap().unwrap();
            assert!(item.unread_changed());
            // The server still says unread; the local change wins.
            assert!(!item.is_unread());
        }
        assert!(h.api.calls().contains(&"feeds".to_string()));
        assert!(matches!(h.service.state(), SyncState::Failed(_)));
        assert!(counters_match(&h.store));
    }

    #[tokio::test]
    async fn test_upload_failure_is_isolated_per_kind() {
        let api = server_with_feed();
        api.fail("mark_read");
        let h = harness(api);
        seed_local(&h.store, &[1, 2], 1000);
        h.service.set_item_unread(false, &[1]).unwrap();
        h.service.set_item_starred(true, &[2]).unwrap();

        let report = completed(h.service.sync(SyncType::FullSync).await.unwrap());

        assert_eq!(report.uploaded, vec![(MarkAction::MarkStarred, 1)]);
        assert!(h.store.get_item(1).unwrap().unwrap().unread_changed());
        assert!(!h.store.get_item(2).unwrap().unwrap().starred_changed());
    }

    #[tokio::test]
    async fn test_uploaded_changes_reach_server_and_clear() {
        let api = server_with_feed();
        let h = harness(api);
        seed_local(&h.store, &[1, 2, 3], 1000);
        h.service.set_item_unread(false, &[1, 2]).unwrap();
        h.service.set_item_starred(true, &[3]).unwrap();

        completed(h.service.sync(SyncType::FullSync).await.unwrap());

        {
            let state = h.api.state.lock().unwrap();
            assert_eq!(state.marked_read, vec![1, 2]);
            assert_eq!(
                state.marked_starred,
                vec![ItemRef {
                    feed_id: 1,
                    guid_hash: "hash-3".into()
                }]
            );
        }
        assert_eq!(h.store.pending_change_count().unwrap(), 0);
        assert_eq!(h.service.state(), SyncState::Idle);
    }

    #[tokio::test]
    async fn test_fetch_failure_aborts_pass() {
        let api = server_with_feed();
        api.fail("feeds");
        let h = harness(api);
        seed_local(&h.store, &[1], 1000);
        h.service.set_item_unread(false, &[1]).unwrap();

        let err = h.service.sync(SyncType::FullSync).await.unwrap_err();
        assert!(matches!(err, TributaryError::Server { status: 503, .. }));
        assert!(matches!(h.service.state(), SyncState::Failed(_)));

        // Uploaded but not confirmed locally: sent again next time.
        assert!(h.store.get_item(1).unwrap().unwrap().unread_changed());
        assert!(!h.api.calls().contains(&"updated_items".to_string()));
    }

    #[tokio::test]
    async fn test_changes_only() {
        let h = harness(server_with_feed());
        seed_local(&h.store, &[1], 1000);
        h.service.set_item_unread(false, &[1]).unwrap();

        let report = completed(h.service.sync(SyncType::ChangesOnly).await.unwrap());

        assert_eq!(report.uploaded, vec![(MarkAction::MarkRead, 1)]);
        assert_eq!(h.api.calls(), vec!["mark_read"]);
        assert!(!h.store.get_item(1).unwrap().unwrap().unread_changed());
    }

    #[tokio::test]
    async fn test_star_without_guid_hash_is_dropped_once() {
        let h = harness(server_with_feed());
        seed_local(&h.store, &[1], 1000);
        let mut without_hash = item_payload(2, 1, 1000);
        without_hash.guid_hash = None;
        h.store
            .upsert_items(&[without_hash.finalize().unwrap()])
            .unwrap();
        h.service.set_item_starred(true, &[1, 2]).unwrap();

        let report = completed(h.service.sync(SyncType::ChangesOnly).await.unwrap());

        assert_eq!(report.uploaded, vec![(MarkAction::MarkStarred, 1)]);
        assert_eq!(h.api.state.lock().unwrap().marked_starred.len(), 1);
        let item = h.store.get_item(2).unwrap().unwrap();
        assert!(item.is_starred());
        assert!(!item.starred_changed());
        assert_eq!(h.store.pending_change_count().unwrap(), 0);

        completed(h.service.sync(SyncType::ChangesOnly).await.unwrap());
        assert_eq!(
            h.api.calls().iter().filter(|c| *c == "mark_starred").count(),
            1
        );
    }

    #[tokio::test]
    async fn test_concurrent_sync_is_coalesced() {
        let h = harness(server_with_feed());
        let _running = h.service.lock.try_lock().unwrap();

        let outcome = h.service.sync(SyncType::FullSync).await.unwrap();
        assert!(matches!(outcome, SyncOutcome::Coalesced));
        assert!(h.api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_sync_removes_feeds_gone_from_server() {
        let h = harness(server_with_feed());
        seed_local(&h.store, &[1], 1000);
        h.store
            .insert_feed(&Feed::new(2, "https://example.com/gone.xml"))
            .unwrap();
        h.store
            .upsert_items(&[item_payload(9, 2, 1000).finalize().unwrap()])
            .unwrap();

        let report = completed(h.service.sync(SyncType::FullSync).await.unwrap());

        assert_eq!(report.feeds_removed, 1);
        assert!(h.store.get_feed(2).unwrap().is_none());
        assert!(h.store.get_item(9).unwrap().is_none());
        assert!(h.store.get_item(1).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_sync_reports_failed_feeds() {
        let api = server_with_feed().with(|s| s.feeds[0].update_error_count = 50);
        let h = harness(api);

        let report = completed(h.service.sync(SyncType::FullSync).await.unwrap());
        assert_eq!(report.failed_feeds, vec![1]);
    }

    #[tokio::test]
    async fn test_load_more() {
        let api = server_with_feed().with(|s| {
            s.items = (1..=10).map(|id| item_payload(id, 1, id)).collect();
            s.items[0].unread = Some(false);
        });
        let h = harness(api);

        let report = completed(
            h.service
                .sync(SyncType::LoadMore {
                    query_type: QueryType::Feed,
                    id: 1,
                    offset: 4,
                })
                .await
                .unwrap(),
        );

        assert_eq!(report.items_stored, 3);
        let ids: Vec<i64> = h
            .store
            .get_items_by_feed(1, false)
            .unwrap()
            .iter()
            .map(|i| i.id)
            .collect();
        assert_eq!(ids.len(), 3);
        assert!(ids.iter().all(|id| *id < 4));
        assert_eq!(h.store.get_feed(1).unwrap().unwrap().unread_count, 2);
        assert_eq!(h.api.calls(), vec!["items"]);
    }

    #[tokio::test]
    async fn test_state_transitions_are_published() {
        let h = harness(server_with_feed());
        let mut states = h.service.subscribe_state();
        assert_eq!(*states.borrow_and_update(), SyncState::Idle);

        h.service.sync(SyncType::ChangesOnly).await.unwrap();
        assert!(states.has_changed().unwrap());
        assert_eq!(*states.borrow_and_update(), SyncState::Idle);
    }

    #[tokio::test]
    async fn test_create_move_and_delete_feed() {
        let h = harness(FakeApi::new());

        let feed = h
            .service
            .create_feed("https://example.com/new.xml", 0)
            .await
            .unwrap();
        assert_eq!(feed.id, 1001);
        let stored = h.store.get_feed(1001).unwrap().unwrap();
        assert_eq!(stored.unread_count, 0);
        assert!(stored.is_root());

        h.service.move_feed(1001, 7).await.unwrap();
        assert_eq!(h.store.get_feed(1001).unwrap().unwrap().folder_id, 7);
        assert!(h.store.get_folder(7).unwrap().is_some());

        h.store
            .upsert_items(&[item_payload(1, 1001, 1).finalize().unwrap()])
            .unwrap();
        h.service.delete_feed(1001).await.unwrap();
        assert!(h.store.get_feed(1001).unwrap().is_none());
        assert_eq!(h.store.item_count().unwrap(), 0);
        assert_eq!(
            h.api.calls(),
            vec!["create_feed", "move_feed", "delete_feed"]
        );
    }

    #[tokio::test]
    async fn test_failed_delete_keeps_local_feed() {
        let api = FakeApi::new();
        api.fail("delete_feed");
        let h = harness(api);
        h.store
            .insert_feed(&Feed::new(3, "https://example.com/feed.xml"))
            .unwrap();

        assert!(h.service.delete_feed(3).await.is_err());
        assert!(h.store.get_feed(3).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_user_is_refreshed() {
        let api = server_with_feed().with(|s| s.user = Some(User::new("alice", "Alice L.")));
        let h = harness(api);

        h.service.sync(SyncType::FullSync).await.unwrap();
        assert_eq!(
            h.store.get_user().unwrap().unwrap().display_name,
            "Alice L."
        );
    }
}
