use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use url::Url;

use crate::api::json::{
    CreateFeedRequest, Feeds, Folders, ItemIds, ItemMap, Items, MoveFeedRequest, StatusPayload,
    UserPayload,
};
use crate::api::{
    ApiError, ApiLevel, ApiLevels, ApiResult, ItemPayload, ItemRef, ItemsQuery, NewsApi,
    QueryType, Status,
};
use crate::domain::{Feed, Folder, User};
use crate::session::Credentials;

const API_ROOT: &str = "index.php/apps/news/api/";

/// Transport settings for [`HttpNewsClient`].
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub connect_timeout: Duration,
    /// Long enough for a full item list on first sync.
    pub read_timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(20),
            read_timeout: Duration::from_secs(3600),
            user_agent: concat!("tributary/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// reqwest-based [`NewsApi`] bound to one account.
pub struct HttpNewsClient {
    client: Client,
    base_url: Url,
    api_root: Url,
    username: String,
    password: String,
}

impl HttpNewsClient {
    pub fn new(credentials: &Credentials, settings: &HttpSettings) -> ApiResult<Self> {
        let client = Client::builder()
            .connect_timeout(settings.connect_timeout)
            .read_timeout(settings.read_timeout)
            .gzip(true)
            .brotli(true)
            .user_agent(settings.user_agent.as_str())
            .build()?;

        let base_url = directory_url(&credentials.url)?;
        let level = credentials.api_level.unwrap_or(ApiLevel::V1_2);
        let api_root = base_url.join(&format!("{}{}/", API_ROOT, level.as_str()))?;

        Ok(Self {
            client,
            base_url,
            api_root,
            username: credentials.username.clone(),
            password: credentials.password.clone(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn api_root(&self) -> &Url {
        &self.api_root
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let same_host = url.host_str() == self.base_url.host_str()
            && url.port_or_known_default() == self.base_url.port_or_known_default();
        let builder = self.client.request(method, url);
        if same_host {
            builder.basic_auth(&self.username, Some(&self.password))
        } else {
            builder
        }
    }

    fn endpoint(&self, path: &str) -> ApiResult<Url> {
        Ok(self.api_root.join(path)?)
    }

    pub(crate) fn items_url(&self, query: &ItemsQuery) -> ApiResult<Url> {
        let mut url = self.endpoint("items")?;
        url.query_pairs_mut()
            .append_pair("batchSize", &query.batch_size.to_string())
            .append_pair("offset", &query.offset.to_string())
            .append_pair("type", &query.query_type.code().to_string())
            .append_pair("id", &query.id.to_string())
            .append_pair("getRead", &query.get_read.to_string())
            .append_pair("oldestFirst", &query.oldest_first.to_string());
        Ok(url)
    }

    pub(crate) fn updated_items_url(
        &self,
        last_modified: i64,
        query_type: QueryType,
        id: i64,
    ) -> ApiResult<Url> {
        let mut url = self.endpoint("items/updated")?;
        url.query_pairs_mut()
            .append_pair("lastModified", &last_modified.to_string())
            .append_pair("type", &query_type.code().to_string())
            .append_pair("id", &id.to_string());
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> ApiResult<T> {
        let response = self.request(Method::GET, url).send().await?;
        decode(checked(response).await?).await
    }

    async fn send_json<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: Url,
        body: &B,
    ) -> ApiResult<Response> {
        let response = self.request(method, url).json(body).send().await?;
        checked(response).await
    }
}

/// Resolve the configured address as a directory so relative API paths append to it.
pub(crate) fn directory_url(url: &str) -> ApiResult<Url> {
    let mut parsed = Url::parse(url.trim())?;
    if !parsed.path().ends_with('/') {
        let path = format!("{}/", parsed.path());
        parsed.set_path(&path);
    }
    Ok(parsed)
}

async fn checked(response: Response) -> ApiResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    tracing::debug!("Request failed with {}: {}", status, body);
    Err(ApiError::Status { status, body })
}

async fn decode<T: DeserializeOwned>(response: Response) -> ApiResult<T> {
    let bytes = response.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[async_trait]
impl NewsApi for HttpNewsClient {
    async fn api_levels(&self) -> ApiResult<ApiLevels> {
        let url = self.base_url.join(API_ROOT.trim_end_matches('/'))?;
        self.get_json(url).await
    }

    async fn status(&self) -> ApiResult<Status> {
        let payload: StatusPayload = self.get_json(self.endpoint("status")?).await?;
        Ok(payload.into_status())
    }

    async fn user(&self) -> ApiResult<User> {
        let payload: UserPayload = self.get_json(self.endpoint("user")?).await?;
        Ok(payload.into_user())
    }

    async fn folders(&self) -> ApiResult<Vec<Folder>> {
        let folders: Folders = self.get_json(self.endpoint("folders")?).await?;
        Ok(folders.folders.into_iter().map(|f| f.into_folder()).collect())
    }

    async fn feeds(&self) -> ApiResult<Vec<Feed>> {
        let feeds: Feeds = self.get_json(self.endpoint("feeds")?).await?;
        Ok(feeds.feeds.into_iter().map(|f| f.into_feed()).collect())
    }

    async fn create_feed(&self, url: &str, folder_id: i64) -> ApiResult<Feed> {
        let body = CreateFeedRequest { url, folder_id };
        let response = self
            .send_json(Method::POST, self.endpoint("feeds")?, &body)
            .await?;
        let feeds: Feeds = decode(response).await?;
        feeds
            .feeds
            .into_iter()
            .next()
            .map(|f| f.into_feed())
            .ok_or_else(|| ApiError::Rejected("server did not return the created feed".into()))
    }

    async fn move_feed(&self, feed_id: i64, folder_id: i64) -> ApiResult<()> {
        let url = self.endpoint(&format!("feeds/{}/move", feed_id))?;
        self.send_json(Method::PUT, url, &MoveFeedRequest { folder_id })
            .await?;
        Ok(())
    }

    async fn delete_feed(&self, feed_id: i64) -> ApiResult<()> {
        let url = self.endpoint(&format!("feeds/{}", feed_id))?;
        let response = self.request(Method::DELETE, url).send().await?;
        checked(response).await?;
        Ok(())
    }

    async fn items(&self, query: &ItemsQuery) -> ApiResult<Vec<ItemPayload>> {
        let items: Items = self.get_json(self.items_url(query)?).await?;
        Ok(items.items)
    }

    async fn updated_items(
        &self,
        last_modified: i64,
        query_type: QueryType,
        id: i64,
    ) -> ApiResult<Vec<ItemPayload>> {
        let url = self.updated_items_url(last_modified, query_type, id)?;
        let items: Items = self.get_json(url).await?;
        Ok(items.items)
    }

    async fn mark_read(&self, ids: &[i64]) -> ApiResult<()> {
        let url = self.endpoint("items/read/multiple")?;
        self.send_json(Method::PUT, url, &ItemIds { items: ids })
            .await?;
        Ok(())
    }

    async fn mark_unread(&self, ids: &[i64]) -> ApiResult<()> {
        let url = self.endpoint("items/unread/multiple")?;
        self.send_json(Method::PUT, url, &ItemIds { items: ids })
            .await?;
        Ok(())
    }

    async fn mark_starred(&self, items: &[ItemRef]) -> ApiResult<()> {
        let url = self.endpoint("items/star/multiple")?;
        self.send_json(Method::PUT, url, &ItemMap { items }).await?;
        Ok(())
    }

    async fn mark_unstarred(&self, items: &[ItemRef]) -> ApiResult<()> {
        let url = self.endpoint("items/unstar/multiple")?;
        self.send_json(Method::PUT, url, &ItemMap { items }).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(url: &str) -> HttpNewsClient {
        let credentials = Credentials::new(url, "user", "secret");
        HttpNewsClient::new(&credentials, &HttpSettings::default()).unwrap()
    }

    #[test]
    fn test_api_root_under_subdirectory() {
        let client = client("https://cloud.example.com/nextcloud");
        assert_eq!(
            client.api_root().as_str(),
            "https://cloud.example.com/nextcloud/index.php/apps/news/api/v1-2/"
        );
    }

    #[test]
    fn test_api_root_for_other_level() {
        let mut credentials = Credentials::new("https://cloud.example.com/", "user", "secret");
        credentials.api_level = Some(ApiLevel::V2);
        let client = HttpNewsClient::new(&credentials, &HttpSettings::default()).unwrap();
        assert_eq!(
            client.api_root().as_str(),
            "https://cloud.example.com/index.php/apps/news/api/v2/"
        );
    }

    #[test]
    fn test_items_url() {
        let client = client("https://cloud.example.com/");
        let query = ItemsQuery::page(QueryType::Starred, true, 100).with_offset(420);
        assert_eq!(
            client.items_url(&query).unwrap().as_str(),
            "https://cloud.example.com/index.php/apps/news/api/v1-2/items\
             ?batchSize=100&offset=420&type=2&id=0&getRead=true&oldestFirst=false"
        );
    }

    #[test]
    fn test_updated_items_url() {
        let client = client("https://cloud.example.com/");
        assert_eq!(
            client
                .updated_items_url(1000, QueryType::All, 0)
                .unwrap()
                .as_str(),
            "https://cloud.example.com/index.php/apps/news/api/v1-2/items/updated\
             ?lastModified=1000&type=3&id=0"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        let credentials = Credentials::new("not a url", "user", "secret");
        assert!(matches!(
            HttpNewsClient::new(&credentials, &HttpSettings::default()),
            Err(ApiError::InvalidUrl(_))
        ));
    }
}
