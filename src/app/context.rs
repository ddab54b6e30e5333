use std::path::PathBuf;
use std::sync::Arc;

use crate::api::{NewsApi, Status};
use crate::app::error::{Result, TributaryError};
use crate::config::Config;
use crate::session::{CredentialStore, Credentials, SessionManager};
use crate::store::sqlite::SqliteStore;
use crate::store::Store;
use crate::sync::SyncService;

pub struct AppContext {
    pub store: Arc<SqliteStore>,
    pub config: Config,
    pub session: SessionManager,
}

impl AppContext {
    pub fn new(db_path: Option<PathBuf>, config: Config) -> Result<Self> {
        let db_path = match db_path {
            Some(p) => p,
            None => Self::default_db_path()?,
        };

        let store = Arc::new(SqliteStore::new(&db_path)?);
        let session = SessionManager::new(
            CredentialStore::new(CredentialStore::default_path()?),
            config.http.settings(),
        );

        Ok(Self {
            store,
            config,
            session,
        })
    }

    pub fn in_memory(config: Config, credentials_path: PathBuf) -> Result<Self> {
        let store = Arc::new(SqliteStore::in_memory()?);
        let session = SessionManager::new(
            CredentialStore::new(credentials_path),
            config.http.settings(),
        );

        Ok(Self {
            store,
            config,
            session,
        })
    }

    pub fn default_db_path() -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| TributaryError::Config("Could not find data directory".into()))?;
        let app_dir = data_dir.join("tributary");
        std::fs::create_dir_all(&app_dir)?;
        Ok(app_dir.join("tributary.db"))
    }

    /// Sync service bound to the stored account.
    pub fn sync_service(&self) -> Result<SyncService> {
        let client = self.session.connect()?;
        Ok(self.sync_service_with(Arc::new(client)))
    }

    pub fn sync_service_with(&self, api: Arc<dyn NewsApi>) -> SyncService {
        SyncService::new(self.store.clone(), api, self.config.sync.clone())
    }

    pub async fn login(&self, base_url: &str, username: &str, password: &str) -> Result<Status> {
        let previous = self.session.credential_store().load()?;
        let status = self.session.login(base_url, username, password).await?;
        self.forget_other_account(previous)?;
        Ok(status)
    }

    pub async fn login_with<A: NewsApi + ?Sized>(
        &self,
        api: &A,
        credentials: Credentials,
    ) -> Result<Status> {
        let previous = self.session.credential_store().load()?;
        let status = self.session.login_with(api, credentials).await?;
        self.forget_other_account(previous)?;
        Ok(status)
    }

    pub fn logout(&self) -> Result<()> {
        self.session.logout()?;
        self.store.reset()
    }

    /// Local data of a different account must not be mixed into the new one.
    /// `previous` is the raw stored account, complete or not.
    fn forget_other_account(&self, previous: Option<Credentials>) -> Result<()> {
        let Some(previous) = previous else {
            return Ok(());
        };
        let current = self.session.credentials()?;
        let same = current
            .as_ref()
            .is_some_and(|c| c.url == previous.url && c.username == previous.username);
        if !same {
            tracing::info!("Account changed, clearing local data");
            self.store.reset()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::{item_payload, FakeApi};
    use crate::domain::Feed;

    fn context(dir: &tempfile::TempDir) -> AppContext {
        AppContext::in_memory(Config::default(), dir.path().join("credentials.toml")).unwrap()
    }

    fn seed(ctx: &AppContext) {
        ctx.store
            .insert_feed(&Feed::new(1, "https://example.com/feed.xml"))
            .unwrap();
        ctx.store
            .upsert_items(&[item_payload(1, 1, 1).finalize().unwrap()])
            .unwrap();
    }

    #[test]
    fn test_sync_service_requires_login() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            context(&dir).sync_service(),
            Err(TributaryError::NotLoggedIn)
        ));
    }

    #[tokio::test]
    async fn test_login_then_sync_service() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&dir);
        ctx.login_with(
            &FakeApi::new(),
            Credentials::new("https://cloud.example.com/", "alice", "pw"),
        )
        .await
        .unwrap();

        assert!(ctx.sync_service().is_ok());
    }

    #[tokio::test]
    async fn test_relogin_same_account_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&dir);
        let credentials = Credentials::new("https://cloud.example.com/", "alice", "pw");
        ctx.login_with(&FakeApi::new(), credentials.clone())
            .await
            .unwrap();
        seed(&ctx);

        ctx.login_with(&FakeApi::new(), credentials).await.unwrap();
        assert_eq!(ctx.store.item_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_switching_account_clears_data() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&dir);
        ctx.login_with(
            &FakeApi::new(),
            Credentials::new("https://cloud.example.com/", "alice", "pw"),
        )
        .await
        .unwrap();
        seed(&ctx);

        ctx.login_with(
            &FakeApi::new(),
            Credentials::new("https://cloud.example.com/", "bob", "pw"),
        )
        .await
        .unwrap();
        assert_eq!(ctx.store.item_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_switching_from_incomplete_account_clears_data() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&dir);
        ctx.session
            .credential_store()
            .save(&Credentials::new("https://cloud.example.com/", "alice", "pw"))
            .unwrap();
        assert!(!ctx.session.has_credentials().unwrap());
        seed(&ctx);
        ctx.store.set_items_unread(&[1], false).unwrap();

        ctx.login_with(
            &FakeApi::new(),
            Credentials::new("https://other.example.com/", "bob", "pw"),
        )
        .await
        .unwrap();

        assert_eq!(ctx.store.item_count().unwrap(), 0);
        assert_eq!(ctx.store.pending_change_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_logout_clears_data() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&dir);
        ctx.login_with(
            &FakeApi::new(),
            Credentials::new("https://cloud.example.com/", "alice", "pw"),
        )
        .await
        .unwrap();
        seed(&ctx);

        ctx.logout().unwrap();
        assert!(!ctx.session.has_credentials().unwrap());
        assert_eq!(ctx.store.item_count().unwrap(), 0);
        assert!(ctx.store.get_all_feeds().unwrap().is_empty());
    }
}
