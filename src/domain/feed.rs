use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::Folder;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feed {
    pub id: i64,
    pub folder_id: i64,
    pub url: String,
    pub name: String,
    pub link: Option<String>,
    pub favicon_link: Option<String>,
    pub added: DateTime<Utc>,
    pub unread_count: i64,
    pub starred_count: i64,
    pub ordering: i64,
    pub pinned: bool,
    pub update_error_count: i64,
    pub last_update_error: Option<String>,
}

impl Feed {
    /// Number of consecutive update errors after which a feed counts as failed.
    pub const DEFAULT_FAILED_THRESHOLD: i64 = 50;

    pub fn new(id: i64, url: impl Into<String>) -> Self {
        Self {
            id,
            folder_id: Folder::ROOT_ID,
            url: url.into(),
            name: String::new(),
            link: None,
            favicon_link: None,
            added: Utc::now(),
            unread_count: 0,
            starred_count: 0,
            ordering: 0,
            pinned: false,
            update_error_count: 0,
            last_update_error: None,
        }
    }

    pub fn is_root(&self) -> bool {
        self.folder_id == Folder::ROOT_ID
    }

    pub fn is_considered_failed(&self, threshold: i64) -> bool {
        self.update_error_count >= threshold
    }

    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.url
        } else {
            &self.name
        }
    }
}
