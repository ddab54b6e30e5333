pub mod http_client;
pub mod json;
pub mod version;

#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::domain::{Feed, Folder, User};

pub use http_client::{HttpNewsClient, HttpSettings};
pub use json::{IncomingItem, ItemPayload, ItemRef};
pub use version::Version;

/// Items requested per page when paging through the server's item list.
pub const BATCH_SIZE: i64 = 100;

/// Oldest server release whose API behaves the way the sync pass expects.
pub const MIN_VERSION: Version = Version::new(8, 8, 2);

/// Raw failure of a remote call. Translated into
/// [`TributaryError`](crate::app::TributaryError) by the callers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected status {status}")]
    Status { status: StatusCode, body: String },

    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The server answered with success but the payload says otherwise.
    #[error("{0}")]
    Rejected(String),
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Selects which items an items query returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    Feed,
    Folder,
    Starred,
    All,
}

impl QueryType {
    pub fn code(self) -> i32 {
        match self {
            QueryType::Feed => 0,
            QueryType::Folder => 1,
            QueryType::Starred => 2,
            QueryType::All => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemsQuery {
    /// `-1` asks for every matching item in one response.
    pub batch_size: i64,
    /// Only items with an id lower than this are returned; `0` starts at the newest.
    pub offset: i64,
    pub query_type: QueryType,
    /// Feed or folder id for [`QueryType::Feed`] and [`QueryType::Folder`].
    pub id: i64,
    pub get_read: bool,
    pub oldest_first: bool,
}

impl ItemsQuery {
    pub fn page(query_type: QueryType, get_read: bool, batch_size: i64) -> Self {
        Self {
            batch_size,
            offset: 0,
            query_type,
            id: 0,
            get_read,
            oldest_first: false,
        }
    }

    pub fn with_offset(self, offset: i64) -> Self {
        Self { offset, ..self }
    }
}

/// Server status as reported by `GET status`.
#[derive(Debug, Clone, PartialEq)]
pub struct Status {
    /// `None` when the server sent a version string that does not parse.
    pub version: Option<Version>,
    pub improperly_configured_cron: bool,
}

/// API levels this client knows about, in order of preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApiLevel {
    #[serde(rename = "v2")]
    V2,
    #[serde(rename = "v1-2")]
    V1_2,
}

impl ApiLevel {
    const PREFERENCE: [ApiLevel; 2] = [ApiLevel::V2, ApiLevel::V1_2];

    pub fn as_str(self) -> &'static str {
        match self {
            ApiLevel::V2 => "v2",
            ApiLevel::V1_2 => "v1-2",
        }
    }

    pub fn is_supported(self) -> bool {
        matches!(self, ApiLevel::V1_2)
    }
}

/// Response of the capability discovery endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiLevels {
    #[serde(default)]
    pub api_levels: Vec<String>,
}

impl ApiLevels {
    pub fn highest_supported(&self) -> Option<ApiLevel> {
        ApiLevel::PREFERENCE
            .into_iter()
            .find(|level| level.is_supported() && self.api_levels.iter().any(|l| l == level.as_str()))
    }
}

/// Typed operations of the remote News API.
///
/// Implementations never retry; callers decide what to do with a failure.
#[async_trait]
pub trait NewsApi: Send + Sync {
    /// Capability discovery relative to the server's base URL.
    async fn api_levels(&self) -> ApiResult<ApiLevels>;
    async fn status(&self) -> ApiResult<Status>;
    async fn user(&self) -> ApiResult<User>;

    async fn folders(&self) -> ApiResult<Vec<Folder>>;
    async fn feeds(&self) -> ApiResult<Vec<Feed>>;
    async fn create_feed(&self, url: &str, folder_id: i64) -> ApiResult<Feed>;
    async fn move_feed(&self, feed_id: i64, folder_id: i64) -> ApiResult<()>;
    async fn delete_feed(&self, feed_id: i64) -> ApiResult<()>;

    async fn items(&self, query: &ItemsQuery) -> ApiResult<Vec<ItemPayload>>;
    async fn updated_items(
        &self,
        last_modified: i64,
        query_type: QueryType,
        id: i64,
    ) -> ApiResult<Vec<ItemPayload>>;

    async fn mark_read(&self, ids: &[i64]) -> ApiResult<()>;
    async fn mark_unread(&self, ids: &[i64]) -> ApiResult<()>;
    async fn mark_starred(&self, items: &[ItemRef]) -> ApiResult<()>;
    async fn mark_unstarred(&self, items: &[ItemRef]) -> ApiResult<()>;
}
