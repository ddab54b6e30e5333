//! Wire payloads of the News API and their conversion into domain models.
//!
//! Every field is optional on the wire. Payloads are decoded as-is and only
//! turned into domain values once the whole object is parsed, so a missing
//! field keeps its meaning instead of being filled with a default.

use chrono::{DateTime, TimeZone, Utc};
use html_escape::decode_html_entities;
use serde::{Deserialize, Serialize};

use crate::api::version::Version;
use crate::api::Status;
use crate::domain::{Feed, Folder, Item, User};

#[derive(Debug, Deserialize)]
pub(crate) struct Folders {
    #[serde(default)]
    pub folders: Vec<FolderPayload>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Feeds {
    #[serde(default)]
    pub feeds: Vec<FeedPayload>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Items {
    #[serde(default)]
    pub items: Vec<ItemPayload>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FolderPayload {
    pub id: i64,
    pub name: Option<String>,
}

impl FolderPayload {
    pub fn into_folder(self) -> Folder {
        Folder::new(self.id, clean(self.name.unwrap_or_default()))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedPayload {
    pub id: i64,
    pub url: Option<String>,
    pub title: Option<String>,
    pub link: Option<String>,
    pub favicon_link: Option<String>,
    pub added: Option<i64>,
    pub folder_id: Option<i64>,
    /// Reported by the server but never trusted; counters are recomputed locally.
    pub unread_count: Option<i64>,
    /// `null` in the response to a create-feed request.
    pub ordering: Option<i64>,
    /// `null` in the response to a create-feed request.
    pub pinned: Option<bool>,
    pub update_error_count: Option<i64>,
    pub last_update_error: Option<String>,
}

impl FeedPayload {
    pub fn into_feed(self) -> Feed {
        Feed {
            id: self.id,
            folder_id: self.folder_id.unwrap_or(Folder::ROOT_ID),
            url: self.url.unwrap_or_default(),
            name: clean(self.title.unwrap_or_default()),
            link: non_blank(self.link),
            favicon_link: non_blank(self.favicon_link),
            added: self.added.and_then(from_epoch).unwrap_or_else(Utc::now),
            unread_count: 0,
            starred_count: 0,
            ordering: self.ordering.unwrap_or(0),
            pinned: self.pinned.unwrap_or(false),
            update_error_count: self.update_error_count.unwrap_or(0),
            last_update_error: non_blank(self.last_update_error),
        }
    }
}

/// An item as sent by the server, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemPayload {
    pub id: Option<i64>,
    pub guid: Option<String>,
    pub guid_hash: Option<String>,
    pub url: Option<String>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub pub_date: Option<i64>,
    #[serde(alias = "updatedDate")]
    pub updated_at: Option<i64>,
    pub body: Option<String>,
    pub enclosure_mime: Option<String>,
    pub enclosure_link: Option<String>,
    pub feed_id: Option<i64>,
    #[serde(alias = "isUnread")]
    pub unread: Option<bool>,
    #[serde(alias = "isStarred")]
    pub starred: Option<bool>,
    pub last_modified: Option<i64>,
    pub fingerprint: Option<String>,
    pub content_hash: Option<String>,
}

/// A validated incoming item.
#[derive(Debug, Clone, PartialEq)]
pub enum IncomingItem {
    /// A complete article that is inserted or replaces the stored one.
    Full(Item),
    /// A payload without a title: only the flags of the stored item with the
    /// same content hash are updated.
    FlagsOnly {
        content_hash: String,
        unread: Option<bool>,
        starred: Option<bool>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidItem {
    #[error("item payload without id")]
    MissingId,
    #[error("item {0} has no feed id")]
    MissingFeed(i64),
    #[error("flags-only payload without content hash")]
    MissingContentHash,
}

impl ItemPayload {
    pub fn finalize(self) -> Result<IncomingItem, InvalidItem> {
        let Some(title) = self.title else {
            let content_hash = self
                .content_hash
                .filter(|h| !h.is_empty())
                .ok_or(InvalidItem::MissingContentHash)?;
            return Ok(IncomingItem::FlagsOnly {
                content_hash,
                unread: self.unread,
                starred: self.starred,
            });
        };

        let id = self.id.ok_or(InvalidItem::MissingId)?;
        let feed_id = self.feed_id.ok_or(InvalidItem::MissingFeed(id))?;

        let mut item = Item::new(id, feed_id);
        item.guid = self.guid;
        item.guid_hash = self.guid_hash;
        item.url = self.url;
        item.title = Some(clean(title));
        item.author = self.author.map(clean).filter(|a| !a.is_empty());
        item.pub_date = self.pub_date.and_then(from_epoch);
        item.updated_at = self.updated_at.and_then(from_epoch);
        item.body = self.body.unwrap_or_default();
        item.enclosure_mime = non_blank(self.enclosure_mime);
        item.enclosure_link = non_blank(self.enclosure_link);
        item.unread = self.unread.unwrap_or(true);
        item.starred = self.starred.unwrap_or(false);
        item.last_modified = self.last_modified.unwrap_or(0);
        item.fingerprint = non_blank(self.fingerprint);
        item.content_hash = non_blank(self.content_hash);
        Ok(IncomingItem::Full(item))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPayload {
    pub user_id: String,
    pub display_name: Option<String>,
    pub last_login_timestamp: Option<i64>,
    pub avatar: Option<AvatarPayload>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AvatarPayload {
    pub data: Option<String>,
    pub mime: Option<String>,
}

impl UserPayload {
    pub fn into_user(self) -> User {
        let (avatar, avatar_mime) = match self.avatar {
            Some(AvatarPayload {
                data: Some(data),
                mime: Some(mime),
            }) => (Some(data), Some(mime)),
            _ => (None, None),
        };
        User {
            display_name: self.display_name.unwrap_or_else(|| self.user_id.clone()),
            user_id: self.user_id,
            last_login: self.last_login_timestamp.and_then(from_epoch),
            avatar,
            avatar_mime,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct StatusPayload {
    version: Option<String>,
    /// Called `warnings` in API v1-2 and `issues` in v2.
    #[serde(default, alias = "issues")]
    warnings: Warnings,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Warnings {
    #[serde(default)]
    improperly_configured_cron: bool,
}

impl StatusPayload {
    pub fn into_status(self) -> Status {
        let version = self.version.and_then(|v| match v.parse::<Version>() {
            Ok(version) => Some(version),
            Err(e) => {
                tracing::warn!("Failed to parse server version: {}", e);
                None
            }
        });
        Status {
            version,
            improperly_configured_cron: self.warnings.improperly_configured_cron,
        }
    }
}

/// Reference to an item by feed and guid hash, as the star endpoints expect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemRef {
    pub feed_id: i64,
    pub guid_hash: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct ItemIds<'a> {
    pub items: &'a [i64],
}

#[derive(Debug, Serialize)]
pub(crate) struct ItemMap<'a> {
    pub items: &'a [ItemRef],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateFeedRequest<'a> {
    pub url: &'a str,
    pub folder_id: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MoveFeedRequest {
    pub folder_id: i64,
}

fn clean(s: String) -> String {
    decode_html_entities(s.trim()).into_owned()
}

fn non_blank(s: Option<String>) -> Option<String> {
    s.filter(|s| !s.trim().is_empty())
}

fn from_epoch(secs: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0).single()
}
