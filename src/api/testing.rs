//! Scriptable in-memory [`NewsApi`] used by the sync and session tests.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::api::{
    ApiError, ApiLevels, ApiResult, ItemPayload, ItemRef, ItemsQuery, NewsApi, QueryType, Status,
    Version,
};
use crate::domain::{Feed, Folder, User};

#[derive(Default)]
pub(crate) struct FakeState {
    pub api_levels: Vec<String>,
    pub version: Option<Version>,
    pub user: Option<User>,
    pub folders: Vec<Folder>,
    pub feeds: Vec<Feed>,
    pub items: Vec<ItemPayload>,
    pub next_feed_id: i64,

    /// Endpoint names that answer with 503.
    pub failing: HashSet<&'static str>,

    pub calls: Vec<String>,
    pub marked_read: Vec<i64>,
    pub marked_unread: Vec<i64>,
    pub marked_starred: Vec<ItemRef>,
    pub marked_unstarred: Vec<ItemRef>,
}

pub(crate) struct FakeApi {
    pub state: Mutex<FakeState>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState {
                api_levels: vec!["v1-2".into()],
                version: Some(Version::new(25, 1, 0)),
                user: Some(User::new("alice", "Alice")),
                next_feed_id: 1000,
                ..Default::default()
            }),
        }
    }

    pub fn with<F: FnOnce(&mut FakeState)>(self, f: F) -> Self {
        f(&mut self.state.lock().unwrap());
        self
    }

    pub fn fail(&self, endpoint: &'static str) {
        self.state.lock().unwrap().failing.insert(endpoint);
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    fn enter(&self, endpoint: &'static str) -> ApiResult<std::sync::MutexGuard<'_, FakeState>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(endpoint.to_string());
        if state.failing.contains(endpoint) {
            return Err(ApiError::Status {
                status: StatusCode::SERVICE_UNAVAILABLE,
                body: String::new(),
            });
        }
        Ok(state)
    }
}

pub(crate) fn item_payload(id: i64, feed_id: i64, last_modified: i64) -> ItemPayload {
    ItemPayload {
        id: Some(id),
        guid: Some(format!("guid-{id}")),
        guid_hash: Some(format!("hash-{id}")),
        title: Some(format!("Item {id}")),
        body: Some(format!("<p>Body {id}</p>")),
        feed_id: Some(feed_id),
        unread: Some(true),
        starred: Some(false),
        last_modified: Some(last_modified),
        content_hash: Some(format!("content-{id}")),
        ..Default::default()
    }
}

#[async_trait]
impl NewsApi for FakeApi {
    async fn api_levels(&self) -> ApiResult<ApiLevels> {
        let state = self.enter("api_levels")?;
        Ok(ApiLevels {
            api_levels: state.api_levels.clone(),
        })
    }

    async fn status(&self) -> ApiResult<Status> {
        let state = self.enter("status")?;
        Ok(Status {
            version: state.version.clone(),
            improperly_configured_cron: false,
        })
    }

    async fn user(&self) -> ApiResult<User> {
        let state = self.enter("user")?;
        state
            .user
            .clone()
            .ok_or_else(|| ApiError::Rejected("no user".into()))
    }

    async fn folders(&self) -> ApiResult<Vec<Folder>> {
        Ok(self.enter("folders")?.folders.clone())
    }

    async fn feeds(&self) -> ApiResult<Vec<Feed>> {
        Ok(self.enter("feeds")?.feeds.clone())
    }

    async fn create_feed(&self, url: &str, folder_id: i64) -> ApiResult<Feed> {
        let mut state = self.enter("create_feed")?;
        state.next_feed_id += 1;
        let mut feed = Feed::new(state.next_feed_id, url);
        feed.folder_id = folder_id;
        feed.name = format!("Feed {}", state.next_feed_id);
        state.feeds.push(feed.clone());
        Ok(feed)
    }

    async fn move_feed(&self, feed_id: i64, folder_id: i64) -> ApiResult<()> {
        let mut state = self.enter("move_feed")?;
        if let Some(feed) = state.feeds.iter_mut().find(|f| f.id == feed_id) {
            feed.folder_id = folder_id;
        }
        Ok(())
    }

    async fn delete_feed(&self, feed_id: i64) -> ApiResult<()> {
        let mut state = self.enter("delete_feed")?;
        state.feeds.retain(|f| f.id != feed_id);
        Ok(())
    }

    async fn items(&self, query: &ItemsQuery) -> ApiResult<Vec<ItemPayload>> {
        let state = self.enter("items")?;
        let mut matching: Vec<ItemPayload> = state
            .items
            .iter()
            .filter(|i| query.offset <= 0 || i.id.unwrap_or(0) < query.offset)
            .filter(|i| match query.query_type {
                QueryType::Starred => i.starred == Some(true),
                QueryType::Feed => i.feed_id == Some(query.id),
                QueryType::Folder | QueryType::All => true,
            })
            .filter(|i| query.get_read || i.unread == Some(true))
            .cloned()
            .collect();
        matching.sort_by_key(|i| std::cmp::Reverse(i.id));
        if query.batch_size > 0 {
            matching.truncate(query.batch_size as usize);
        }
        Ok(matching)
    }

    async fn updated_items(
        &self,
        last_modified: i64,
        _query_type: QueryType,
        _id: i64,
    ) -> ApiResult<Vec<ItemPayload>> {
        let state = self.enter("updated_items")?;
        Ok(state
            .items
            .iter()
            .filter(|i| i.last_modified.unwrap_or(0) > last_modified)
            .cloned()
            .collect())
    }

    async fn mark_read(&self, ids: &[i64]) -> ApiResult<()> {
        self.enter("mark_read")?.marked_read.extend_from_slice(ids);
        Ok(())
    }

    async fn mark_unread(&self, ids: &[i64]) -> ApiResult<()> {
        self.enter("mark_unread")?.marked_unread.extend_from_slice(ids);
        Ok(())
    }

    async fn mark_starred(&self, items: &[ItemRef]) -> ApiResult<()> {
        self.enter("mark_starred")?
            .marked_starred
            .extend_from_slice(items);
        Ok(())
    }

    async fn mark_unstarred(&self, items: &[ItemRef]) -> ApiResult<()> {
        self.enter("mark_unstarred")?
            .marked_unstarred
            .extend_from_slice(items);
        Ok(())
    }
}
