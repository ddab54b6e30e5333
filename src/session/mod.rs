pub mod credentials;

pub use credentials::{CredentialStore, Credentials};

use crate::api::http_client::directory_url;
use crate::api::{HttpNewsClient, HttpSettings, NewsApi, Status, MIN_VERSION};
use crate::app::{Result, TributaryError};

/// Resolves, verifies and persists login credentials.
pub struct SessionManager {
    store: CredentialStore,
    http: HttpSettings,
}

impl SessionManager {
    pub fn new(store: CredentialStore, http: HttpSettings) -> Self {
        Self { store, http }
    }

    pub fn credential_store(&self) -> &CredentialStore {
        &self.store
    }

    /// Stored credentials, if they are complete enough to sync with.
    pub fn credentials(&self) -> Result<Option<Credentials>> {
        Ok(self.store.load()?.filter(Credentials::is_complete))
    }

    pub fn has_credentials(&self) -> Result<bool> {
        Ok(self.credentials()?.is_some())
    }

    /// Build an API client for the stored account.
    pub fn connect(&self) -> Result<HttpNewsClient> {
        let credentials = self.credentials()?.ok_or(TributaryError::NotLoggedIn)?;
        Ok(HttpNewsClient::new(&credentials, &self.http)?)
    }

    /// Log in against a server and persist the credentials on success.
    pub async fn login(&self, base_url: &str, username: &str, password: &str) -> Result<Status> {
        let url = directory_url(base_url)?;
        let mut credentials = Credentials::new(url.as_str(), username, password);

        let discovery = HttpNewsClient::new(&credentials, &self.http)?;
        credentials.api_level = Some(negotiate(&discovery).await?);

        let client = HttpNewsClient::new(&credentials, &self.http)?;
        self.verify_and_save(&client, credentials).await
    }

    /// Log in through an already constructed API client.
    pub async fn login_with<A: NewsApi + ?Sized>(
        &self,
        api: &A,
        mut credentials: Credentials,
    ) -> Result<Status> {
        credentials.api_level = Some(negotiate(api).await?);
        self.verify_and_save(api, credentials).await
    }

    pub fn logout(&self) -> Result<()> {
        tracing::info!("Removing stored credentials");
        self.store.clear()
    }

    async fn verify_and_save<A: NewsApi + ?Sized>(
        &self,
        api: &A,
        credentials: Credentials,
    ) -> Result<Status> {
        let status = api.status().await?;
        check_version(&status)?;

        self.store.save(&credentials)?;
        tracing::info!(
            "Logged in as {} on {} (API {})",
            credentials.username,
            credentials.url,
            credentials.api_level.map(|l| l.as_str()).unwrap_or("?")
        );
        Ok(status)
    }
}

async fn negotiate<A: NewsApi + ?Sized>(api: &A) -> Result<crate::api::ApiLevel> {
    let levels = api.api_levels().await?;
    levels.highest_supported().ok_or_else(|| {
        TributaryError::Compatibility(format!(
            "no supported API level among {:?}",
            levels.api_levels
        ))
    })
}

fn check_version(status: &Status) -> Result<()> {
    match status.version {
        Some(ref version) if *version >= MIN_VERSION => Ok(()),
        Some(ref version) => Err(TributaryError::Compatibility(format!(
            "News app {} is older than the required {}",
            version, MIN_VERSION
        ))),
        None => Err(TributaryError::Compatibility(
            "server did not report a usable version".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::FakeApi;
    use crate::api::{ApiLevel, Version};

    fn manager(dir: &tempfile::TempDir) -> SessionManager {
        SessionManager::new(
            CredentialStore::new(dir.path().join("credentials.toml")),
            HttpSettings::default(),
        )
    }

    fn credentials() -> Credentials {
        Credentials::new("https://cloud.example.com/", "alice", "secret")
    }

    #[tokio::test]
    async fn test_login_persists_credentials_with_level() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(&dir);
        let api = FakeApi::new();

        let status = manager.login_with(&api, credentials()).await.unwrap();
        assert_eq!(status.version, Some(Version::new(25, 1, 0)));

        let stored = manager.credentials().unwrap().unwrap();
        assert_eq!(stored.username, "alice");
        assert_eq!(stored.api_level, Some(ApiLevel::V1_2));
        assert!(manager.has_credentials().unwrap());
        assert_eq!(api.calls(), vec!["api_levels", "status"]);
    }

    #[tokio::test]
    async fn test_login_rejects_old_server() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(&dir);
        let api = FakeApi::new().with(|s| s.version = Some(Version::new(8, 8, 0)));

        let err = manager.login_with(&api, credentials()).await.unwrap_err();
        assert!(matches!(err, TributaryError::Compatibility(_)));
        assert!(!manager.credential_store().path().exists());
        assert!(!manager.has_credentials().unwrap());
    }

    #[tokio::test]
    async fn test_login_accepts_minimum_version() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(&dir);
        let api = FakeApi::new().with(|s| s.version = Some(Version::new(8, 8, 2)));

        tokio_test::assert_ok!(manager.login_with(&api, credentials()).await);
    }

    #[tokio::test]
    async fn test_login_without_supported_level() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(&dir);
        let api = FakeApi::new().with(|s| s.api_levels = vec!["v2".into()]);

        let err = manager.login_with(&api, credentials()).await.unwrap_err();
        assert!(matches!(err, TributaryError::Compatibility(_)));
        assert_eq!(api.calls(), vec!["api_levels"]);
        assert!(!manager.has_credentials().unwrap());
    }

    #[tokio::test]
    async fn test_login_with_unparseable_version() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(&dir);
        let api = FakeApi::new().with(|s| s.version = None);

        let err = manager.login_with(&api, credentials()).await.unwrap_err();
        assert!(matches!(err, TributaryError::Compatibility(_)));
    }

    #[tokio::test]
    async fn test_failed_login_keeps_previous_account() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(&dir);
        manager
            .login_with(&FakeApi::new(), credentials())
            .await
            .unwrap();

        let api = FakeApi::new();
        api.fail("status");
        let other = Credentials::new("https://other.example.com/", "bob", "pw");
        let err = manager.login_with(&api, other).await.unwrap_err();
        assert!(matches!(err, TributaryError::Server { status: 503, .. }));

        assert_eq!(manager.credentials().unwrap().unwrap().username, "alice");
    }

    #[test]
    fn test_connect_requires_login() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            manager(&dir).connect(),
            Err(TributaryError::NotLoggedIn)
        ));
    }
}
