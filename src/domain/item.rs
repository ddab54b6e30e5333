use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: i64,
    pub guid: Option<String>,
    pub guid_hash: Option<String>,
    pub url: Option<String>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub pub_date: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub body: String,
    pub enclosure_mime: Option<String>,
    pub enclosure_link: Option<String>,
    pub feed_id: i64,
    pub(crate) unread: bool,
    pub(crate) unread_changed: bool,
    pub(crate) starred: bool,
    pub(crate) starred_changed: bool,
    /// Server modification time in epoch seconds.
    pub last_modified: i64,
    pub fingerprint: Option<String>,
    pub content_hash: Option<String>,
    pub active: bool,
    /// Set on items loaded from the store. Flag changes on detached items
    /// are plain assignments.
    #[serde(skip)]
    pub(crate) managed: bool,
}

impl Item {
    pub fn new(id: i64, feed_id: i64) -> Self {
        Self {
            id,
            guid: None,
            guid_hash: None,
            url: None,
            title: None,
            author: None,
            pub_date: None,
            updated_at: None,
            body: String::new(),
            enclosure_mime: None,
            enclosure_link: None,
            feed_id,
            unread: true,
            unread_changed: false,
            starred: false,
            starred_changed: false,
            last_modified: 0,
            fingerprint: None,
            content_hash: None,
            active: false,
            managed: false,
        }
    }

    pub fn is_unread(&self) -> bool {
        self.unread
    }

    pub fn is_starred(&self) -> bool {
        self.starred
    }

    pub fn unread_changed(&self) -> bool {
        self.unread_changed
    }

    pub fn starred_changed(&self) -> bool {
        self.starred_changed
    }

    pub fn is_managed(&self) -> bool {
        self.managed
    }

    pub fn has_pending_changes(&self) -> bool {
        self.unread_changed || self.starred_changed
    }

    /// Set the unread flag.
    ///
    /// On a stored item an actual change toggles `unread_changed`, so setting
    /// a value and then restoring it leaves nothing to upload. Returns the
    /// delta to apply to the owning feed's unread counter.
    pub fn set_unread(&mut self, unread: bool) -> i64 {
        if self.unread == unread {
            return 0;
        }
        self.unread = unread;
        if !self.managed {
            return 0;
        }
        self.unread_changed = !self.unread_changed;
        if unread {
            1
        } else {
            -1
        }
    }

    /// Set the starred flag. Same contract as [`set_unread`](Self::set_unread).
    pub fn set_starred(&mut self, starred: bool) -> i64 {
        if self.starred == starred {
            return 0;
        }
        self.starred = starred;
        if !self.managed {
            return 0;
        }
        self.starred_changed = !self.starred_changed;
        if starred {
            1
        } else {
            -1
        }
    }

    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or("(Untitled)")
    }

    pub fn has_enclosure(&self) -> bool {
        self.enclosure_link.is_some()
    }
}
