use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::api::ApiLevel;
use crate::app::{Result, TributaryError};

/// Login data handed from the login flow to the sync engine.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub url: String,
    pub username: String,
    pub password: String,
    /// API level detected at login. Absent on credentials written by older
    /// releases, which forces a new login.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_level: Option<ApiLevel>,
}

impl Credentials {
    pub fn new(
        url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            username: username.into(),
            password: password.into(),
            api_level: None,
        }
    }

    /// Credentials are usable only with a username and a detected API level.
    pub fn is_complete(&self) -> bool {
        !self.username.is_empty() && self.api_level.is_some()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("api_level", &self.api_level)
            .finish()
    }
}

/// Credentials persisted as TOML next to the configuration file.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| TributaryError::Config("Could not find config directory".into()))?;
        Ok(config_dir.join("tributary").join("credentials.toml"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<Credentials>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)?;
        let credentials = toml::from_str(&content).map_err(|e| {
            TributaryError::Config(format!(
                "Failed to parse {}: {}",
                self.path.display(),
                e
            ))
        })?;
        Ok(Some(credentials))
    }

    /// Write all fields at once, replacing whatever was stored before.
    pub fn save(&self, credentials: &Credentials) -> Result<()> {
        let content = toml::to_string(credentials)
            .map_err(|e| TributaryError::Config(format!("Failed to encode credentials: {}", e)))?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp = self.path.with_extension("toml.tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            restrict_permissions(&file)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(unix)]
fn restrict_permissions(file: &fs::File) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_file: &fs::File) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("credentials.toml"));
        assert!(store.load().unwrap().is_none());

        let mut credentials = Credentials::new("https://cloud.example.com/", "alice", "pw");
        credentials.api_level = Some(ApiLevel::V1_2);
        store.save(&credentials).unwrap();

        assert_eq!(store.load().unwrap(), Some(credentials));
    }

    #[test]
    fn test_legacy_file_without_level_is_incomplete() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.toml");
        fs::write(
            &path,
            "url = \"https://cloud.example.com/\"\nusername = \"alice\"\npassword = \"pw\"\n",
        )
        .unwrap();

        let credentials = CredentialStore::new(path).load().unwrap().unwrap();
        assert_eq!(credentials.username, "alice");
        assert!(!credentials.is_complete());
    }

    #[test]
    fn test_debug_redacts_password() {
        let credentials = Credentials::new("https://cloud.example.com/", "alice", "hunter2");
        assert!(!format!("{:?}", credentials).contains("hunter2"));
    }

    #[test]
    fn test_clear_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("credentials.toml"));
        store.clear().unwrap();
    }
}
