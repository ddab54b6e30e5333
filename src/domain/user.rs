use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Profile of the logged-in account. Only one row is ever stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub user_id: String,
    pub display_name: String,
    pub last_login: Option<DateTime<Utc>>,
    pub avatar: Option<String>,
    pub avatar_mime: Option<String>,
}

impl User {
    pub fn new(user_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
            last_login: None,
            avatar: None,
            avatar_mime: None,
        }
    }
}
