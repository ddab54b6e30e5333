use std::collections::HashSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Params, Row};
use tokio::sync::broadcast;

use crate::api::IncomingItem;
use crate::app::{Result, TributaryError};
use crate::domain::{Feed, Flag, Folder, Item, MarkAction, TemporaryFeed, User, WindowKind};
use crate::store::events::EventBus;
use crate::store::{
    schema, ConfirmedChange, ReconcileStats, Reconciliation, Store, StoreEvent, UpsertStats,
};

const FEED_COLUMNS: &str = "id, folder_id, url, name, link, favicon_link, added, unread_count, \
     starred_count, ordering, pinned, update_error_count, last_update_error";

const ITEM_COLUMNS: &str = "id, feed_id, guid, guid_hash, url, title, author, pub_date, \
     updated_at, body, enclosure_mime, enclosure_link, unread, unread_changed, starred, \
     starred_changed, last_modified, fingerprint, content_hash, active";

/// Items that may be purged by the retention cap: read, unstarred, not shown
/// in the pager and without anything left to upload.
const PURGEABLE: &str = "unread = 0 AND starred = 0 AND active = 0 \
     AND unread_changed = 0 AND starred_changed = 0";

pub struct SqliteStore {
    conn: Mutex<Connection>,
    events: EventBus,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::with_connection(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(mut conn: Connection) -> Result<Self> {
        schema::prepare(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            events: EventBus::new(),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| TributaryError::State(format!("database lock poisoned: {}", e)))
    }

    fn query_feeds<P: Params>(&self, filter: &str, params: P) -> Result<Vec<Feed>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM feeds {} ORDER BY ordering, name COLLATE NOCASE, id",
            FEED_COLUMNS, filter
        );
        let mut stmt = conn.prepare(&sql)?;
        let feeds = stmt
            .query_map(params, feed_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(feeds)
    }

    fn query_items<P: Params>(&self, filter: &str, params: P) -> Result<Vec<Item>> {
        let conn = self.conn()?;
        select_items(&conn, filter, params)
    }
}

fn epoch(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
}

fn feed_from_row(row: &Row) -> rusqlite::Result<Feed> {
    Ok(Feed {
        id: row.get(0)?,
        folder_id: row.get(1)?,
        url: row.get(2)?,
        name: row.get(3)?,
        link: row.get(4)?,
        favicon_link: row.get(5)?,
        added: epoch(row.get(6)?).unwrap_or_default(),
        unread_count: row.get(7)?,
        starred_count: row.get(8)?,
        ordering: row.get(9)?,
        pinned: row.get(10)?,
        update_error_count: row.get(11)?,
        last_update_error: row.get(12)?,
    })
}

fn item_from_row(row: &Row) -> rusqlite::Result<Item> {
    Ok(Item {
        id: row.get(0)?,
        feed_id: row.get(1)?,
        guid: row.get(2)?,
        guid_hash: row.get(3)?,
        url: row.get(4)?,
        title: row.get(5)?,
        author: row.get(6)?,
        pub_date: row.get::<_, Option<i64>>(7)?.and_then(epoch),
        updated_at: row.get::<_, Option<i64>>(8)?.and_then(epoch),
        body: row.get(9)?,
        enclosure_mime: row.get(10)?,
        enclosure_link: row.get(11)?,
        unread: row.get(12)?,
        unread_changed: row.get(13)?,
        starred: row.get(14)?,
        starred_changed: row.get(15)?,
        last_modified: row.get(16)?,
        fingerprint: row.get(17)?,
        content_hash: row.get(18)?,
        active: row.get(19)?,
        managed: true,
    })
}

fn select_items<P: Params>(conn: &Connection, filter: &str, params: P) -> Result<Vec<Item>> {
    let sql = format!("SELECT {} FROM items {}", ITEM_COLUMNS, filter);
    let mut stmt = conn.prepare(&sql)?;
    let items = stmt
        .query_map(params, item_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(items)
}

fn load_item(conn: &Connection, id: i64) -> Result<Option<Item>> {
    let sql = format!("SELECT {} FROM items WHERE id = ?1", ITEM_COLUMNS);
    Ok(conn.query_row(&sql, [id], item_from_row).optional()?)
}

fn ids(conn: &Connection, sql: &str) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare(sql)?;
    let ids = stmt
        .query_map([], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(ids)
}

/// Rows referenced before their parent arrives are created empty and filled
/// in by a later sync.
fn ensure_folder(conn: &Connection, folder_id: i64) -> Result<()> {
    if folder_id != Folder::ROOT_ID {
        conn.execute("INSERT OR IGNORE INTO folders (id) VALUES (?1)", [folder_id])?;
    }
    Ok(())
}

fn ensure_feed(conn: &Connection, feed_id: i64) -> Result<()> {
    conn.execute("INSERT OR IGNORE INTO feeds (id) VALUES (?1)", [feed_id])?;
    Ok(())
}

fn upsert_folder(conn: &Connection, folder: &Folder) -> Result<()> {
    conn.execute(
        "INSERT INTO folders (id, name) VALUES (?1, ?2)
         ON CONFLICT(id) DO UPDATE SET name = excluded.name",
        params![folder.id, folder.name],
    )?;
    Ok(())
}

fn upsert_feed(conn: &Connection, feed: &Feed) -> Result<()> {
    ensure_folder(conn, feed.folder_id)?;
    conn.execute(
        "INSERT INTO feeds (id, folder_id, url, name, link, favicon_link, added, ordering,
                            pinned, update_error_count, last_update_error)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
         ON CONFLICT(id) DO UPDATE SET
            folder_id = excluded.folder_id,
            url = excluded.url,
            name = excluded.name,
            link = excluded.link,
            favicon_link = excluded.favicon_link,
            added = excluded.added,
            ordering = excluded.ordering,
            pinned = excluded.pinned,
            update_error_count = excluded.update_error_count,
            last_update_error = excluded.last_update_error",
        params![
            feed.id,
            feed.folder_id,
            feed.url,
            feed.name,
            feed.link,
            feed.favicon_link,
            feed.added.timestamp(),
            feed.ordering,
            feed.pinned,
            feed.update_error_count,
            feed.last_update_error,
        ],
    )?;
    Ok(())
}

/// Insert or replace a full item. A locally changed flag keeps its local
/// value until the change is uploaded; `active` is never touched.
fn upsert_item(conn: &Connection, item: &Item) -> Result<()> {
    ensure_feed(conn, item.feed_id)?;
    conn.execute(
        "INSERT INTO items (id, feed_id, guid, guid_hash, url, title, author, pub_date,
                            updated_at, body, enclosure_mime, enclosure_link, unread, starred,
                            last_modified, fingerprint, content_hash)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
         ON CONFLICT(id) DO UPDATE SET
            feed_id = excluded.feed_id,
            guid = excluded.guid,
            guid_hash = excluded.guid_hash,
            url = excluded.url,
            title = excluded.title,
            author = excluded.author,
            pub_date = excluded.pub_date,
            updated_at = excluded.updated_at,
            body = excluded.body,
            enclosure_mime = excluded.enclosure_mime,
            enclosure_link = excluded.enclosure_link,
            unread = CASE WHEN items.unread_changed THEN items.unread ELSE excluded.unread END,
            starred = CASE WHEN items.starred_changed THEN items.starred ELSE excluded.starred END,
            last_modified = excluded.last_modified,
            fingerprint = excluded.fingerprint,
            content_hash = excluded.content_hash",
        params![
            item.id,
            item.feed_id,
            item.guid,
            item.guid_hash,
            item.url,
            item.title,
            item.author,
            item.pub_date.map(|d| d.timestamp()),
            item.updated_at.map(|d| d.timestamp()),
            item.body,
            item.enclosure_mime,
            item.enclosure_link,
            item.unread,
            item.starred,
            item.last_modified,
            item.fingerprint,
            item.content_hash,
        ],
    )?;
    Ok(())
}

/// Apply server flags to the first stored item with the given content hash.
fn apply_server_flags(
    conn: &Connection,
    content_hash: &str,
    unread: Option<bool>,
    starred: Option<bool>,
) -> Result<bool> {
    let id: Option<i64> = conn
        .query_row(
            "SELECT id FROM items WHERE content_hash = ?1 ORDER BY id LIMIT 1",
            [content_hash],
            |row| row.get(0),
        )
        .optional()?;
    let Some(id) = id else {
        return Ok(false);
    };

    if let Some(unread) = unread {
        conn.execute(
            "UPDATE items SET unread = ?1 WHERE id = ?2 AND unread_changed = 0",
            params![unread, id],
        )?;
    }
    if let Some(starred) = starred {
        conn.execute(
            "UPDATE items SET starred = ?1 WHERE id = ?2 AND starred_changed = 0",
            params![starred, id],
        )?;
    }
    Ok(true)
}

/// Change one flag of a stored item as a user action: the dirty flag and the
/// feed counter follow the change.
fn apply_flag(conn: &Connection, item: &mut Item, flag: Flag, value: bool) -> Result<bool> {
    let delta = match flag {
        Flag::Unread => item.set_unread(value),
        Flag::Starred => item.set_starred(value),
    };
    if delta == 0 {
        return Ok(false);
    }

    let (current, changed, counter) = match flag {
        Flag::Unread => (item.unread, item.unread_changed, "unread_count"),
        Flag::Starred => (item.starred, item.starred_changed, "starred_count"),
    };
    conn.execute(
        &format!(
            "UPDATE items SET {} = ?1, {} = ?2 WHERE id = ?3",
            flag.column(),
            flag.changed_column()
        ),
        params![current, changed, item.id],
    )?;
    conn.execute(
        &format!("UPDATE feeds SET {counter} = {counter} + ?1 WHERE id = ?2"),
        params![delta, item.feed_id],
    )?;
    Ok(true)
}

fn delete_feeds(conn: &Connection, feed_ids: &[i64]) -> Result<usize> {
    let mut removed = 0;
    for id in feed_ids {
        removed += conn.execute("DELETE FROM feeds WHERE id = ?1", [id])?;
    }
    Ok(removed)
}

fn window_item_ids(conn: &Connection, kind: WindowKind) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare(
        "SELECT item_id FROM temporary_feed_items WHERE temporary_feed_id = ?1 ORDER BY position",
    )?;
    let ids = stmt
        .query_map([kind.id()], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(ids)
}

impl Store for SqliteStore {
    fn get_folder(&self, id: i64) -> Result<Option<Folder>> {
        let conn = self.conn()?;
        let folder = conn
            .query_row(
                "SELECT id, name FROM folders WHERE id = ?1",
                [id],
                |row| Ok(Folder::new(row.get(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;
        Ok(folder)
    }

    fn get_all_folders(&self) -> Result<Vec<Folder>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id, name FROM folders ORDER BY name COLLATE NOCASE")?;
        let folders = stmt
            .query_map([], |row| Ok(Folder::new(row.get(0)?, row.get::<_, String>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(folders)
    }

    fn get_feed(&self, id: i64) -> Result<Option<Feed>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM feeds WHERE id = ?1", FEED_COLUMNS);
        Ok(conn.query_row(&sql, [id], feed_from_row).optional()?)
    }

    fn get_all_feeds(&self) -> Result<Vec<Feed>> {
        self.query_feeds("", [])
    }

    fn get_feeds_in_folder(&self, folder_id: i64) -> Result<Vec<Feed>> {
        self.query_feeds("WHERE folder_id = ?1", [folder_id])
    }

    fn insert_feed(&self, feed: &Feed) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        upsert_feed(&tx, feed)?;
        tx.commit()?;
        self.events.publish(&[StoreEvent::Folders, StoreEvent::Feeds]);
        Ok(())
    }

    fn move_feed(&self, feed_id: i64, folder_id: i64) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        ensure_folder(&tx, folder_id)?;
        let updated = tx.execute(
            "UPDATE feeds SET folder_id = ?1 WHERE id = ?2",
            params![folder_id, feed_id],
        )?;
        if updated == 0 {
            return Err(TributaryError::FeedNotFound(feed_id));
        }
        tx.commit()?;
        self.events.publish(&[StoreEvent::Folders, StoreEvent::Feeds]);
        Ok(())
    }

    fn delete_feed(&self, feed_id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let removed = conn.execute("DELETE FROM feeds WHERE id = ?1", [feed_id])? > 0;
        if removed {
            self.events.publish(&[StoreEvent::Feeds, StoreEvent::Items]);
        }
        Ok(removed)
    }

    fn get_item(&self, id: i64) -> Result<Option<Item>> {
        let conn = self.conn()?;
        load_item(&conn, id)
    }

    fn get_items_by_feed(&self, feed_id: i64, unread_only: bool) -> Result<Vec<Item>> {
        self.query_items(
            "WHERE feed_id = ?1 AND (?2 = 0 OR unread = 1) ORDER BY pub_date DESC, id DESC",
            params![feed_id, unread_only],
        )
    }

    fn get_items_by_folder(&self, folder_id: i64, unread_only: bool) -> Result<Vec<Item>> {
        self.query_items(
            "WHERE feed_id IN (SELECT id FROM feeds WHERE folder_id = ?1)
               AND (?2 = 0 OR unread = 1)
             ORDER BY pub_date DESC, id DESC",
            params![folder_id, unread_only],
        )
    }

    fn get_starred_items(&self) -> Result<Vec<Item>> {
        self.query_items("WHERE starred = 1 ORDER BY pub_date DESC, id DESC", [])
    }

    fn get_unread_items(&self) -> Result<Vec<Item>> {
        self.query_items("WHERE unread = 1 ORDER BY pub_date DESC, id DESC", [])
    }

    fn item_count(&self) -> Result<i64> {
        let conn = self.conn()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM items", [], |row| row.get(0))?)
    }

    fn max_last_modified(&self) -> Result<i64> {
        let conn = self.conn()?;
        Ok(conn.query_row(
            "SELECT COALESCE(MAX(last_modified), 0) FROM items",
            [],
            |row| row.get(0),
        )?)
    }

    fn upsert_items(&self, items: &[IncomingItem]) -> Result<UpsertStats> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut stats = UpsertStats::default();

        for incoming in items {
            match incoming {
                IncomingItem::Full(item) => {
                    upsert_item(&tx, item)?;
                    stats.stored += 1;
                }
                IncomingItem::FlagsOnly {
                    content_hash,
                    unread,
                    starred,
                } => {
                    if apply_server_flags(&tx, content_hash, *unread, *starred)? {
                        stats.flags_applied += 1;
                    } else {
                        tracing::debug!("No stored item with content hash {}", content_hash);
                        stats.unmatched += 1;
                    }
                }
            }
        }

        tx.commit()?;
        if stats.stored > 0 {
            self.events.publish(&[StoreEvent::Feeds, StoreEvent::Items]);
        } else if stats.flags_applied > 0 {
            self.events.publish(&[StoreEvent::Items]);
        }
        Ok(stats)
    }

    fn set_items_unread(&self, ids: &[i64], unread: bool) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut seen = HashSet::new();
        let mut changed = 0;

        for &id in ids {
            let item = load_item(&tx, id)?.ok_or(TributaryError::ItemNotFound(id))?;
            // Duplicates of an article across feeds share a fingerprint and
            // are read together.
            let targets = match item.fingerprint.as_deref() {
                Some(fingerprint) => select_items(
                    &tx,
                    "WHERE fingerprint = ?1 AND unread != ?2",
                    params![fingerprint, unread],
                )?,
                None => vec![item],
            };
            for mut target in targets {
                if seen.insert(target.id) && apply_flag(&tx, &mut target, Flag::Unread, unread)? {
                    changed += 1;
                }
            }
        }

        tx.commit()?;
        if changed > 0 {
            self.events.publish(&[StoreEvent::Feeds, StoreEvent::Items]);
        }
        Ok(changed)
    }

    fn set_items_starred(&self, ids: &[i64], starred: bool) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut changed = 0;

        for &id in ids {
            let mut item = load_item(&tx, id)?.ok_or(TributaryError::ItemNotFound(id))?;
            if apply_flag(&tx, &mut item, Flag::Starred, starred)? {
                changed += 1;
            }
        }

        tx.commit()?;
        if changed > 0 {
            self.events.publish(&[StoreEvent::Feeds, StoreEvent::Items]);
        }
        Ok(changed)
    }

    fn pending_changes(&self, action: MarkAction) -> Result<Vec<Item>> {
        let flag = action.flag();
        let filter = format!(
            "WHERE {} = 1 AND {} = ?1 ORDER BY id",
            flag.changed_column(),
            flag.column()
        );
        self.query_items(&filter, [action.value()])
    }

    fn pending_change_count(&self) -> Result<i64> {
        let conn = self.conn()?;
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM items WHERE unread_changed = 1 OR starred_changed = 1",
            [],
            |row| row.get(0),
        )?)
    }

    fn clear_changes(&self, confirmed: &[ConfirmedChange]) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        clear_confirmed(&tx, confirmed)?;
        tx.commit()?;
        Ok(())
    }

    fn reconcile(&self, reconciliation: &Reconciliation) -> Result<ReconcileStats> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut stats = ReconcileStats::default();

        if let Some(folders) = &reconciliation.folders {
            for folder in folders {
                upsert_folder(&tx, folder)?;
            }
        }

        let listed: Option<HashSet<i64>> = reconciliation
            .feeds
            .as_ref()
            .map(|feeds| feeds.iter().map(|f| f.id).collect());

        if let (Some(feeds), Some(keep)) = (&reconciliation.feeds, &listed) {
            for feed in feeds {
                upsert_feed(&tx, feed)?;
            }
            let gone: Vec<i64> = ids(&tx, "SELECT id FROM feeds")?
                .into_iter()
                .filter(|id| !keep.contains(id))
                .collect();
            stats.feeds_removed += delete_feeds(&tx, &gone)?;
        }

        // Folders go last so a feed moved out of a removed folder keeps its items.
        if let Some(folders) = &reconciliation.folders {
            let keep: HashSet<i64> = folders.iter().map(|f| f.id).collect();
            for id in ids(&tx, "SELECT id FROM folders")? {
                if keep.contains(&id) {
                    continue;
                }
                let children: Vec<i64> = {
                    let mut stmt = tx.prepare("SELECT id FROM feeds WHERE folder_id = ?1")?;
                    let rows = stmt.query_map([id], |row| row.get(0))?;
                    rows.collect::<rusqlite::Result<_>>()?
                };
                let (still_listed, unlisted): (Vec<i64>, Vec<i64>) = children
                    .into_iter()
                    .partition(|feed_id| listed.as_ref().is_some_and(|l| l.contains(feed_id)));

                stats.feeds_removed += delete_feeds(&tx, &unlisted)?;
                if !still_listed.is_empty() {
                    tracing::debug!(
                        "Folder {} is gone; moving {} listed feeds to the root",
                        id,
                        still_listed.len()
                    );
                    tx.execute(
                        "UPDATE feeds SET folder_id = ?1 WHERE folder_id = ?2",
                        params![Folder::ROOT_ID, id],
                    )?;
                }
                stats.folders_removed += tx.execute("DELETE FROM folders WHERE id = ?1", [id])?;
            }
        }

        if let Some(user) = &reconciliation.user {
            tx.execute(
                "INSERT INTO users (id, user_id, display_name, last_login, avatar, avatar_mime)
                 VALUES (0, ?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                    user_id = excluded.user_id,
                    display_name = excluded.display_name,
                    last_login = excluded.last_login,
                    avatar = excluded.avatar,
                    avatar_mime = excluded.avatar_mime",
                params![
                    user.user_id,
                    user.display_name,
                    user.last_login.map(|d| d.timestamp()),
                    user.avatar,
                    user.avatar_mime,
                ],
            )?;
        }

        clear_confirmed(&tx, &reconciliation.confirmed)?;
        tx.commit()?;

        let mut events = vec![StoreEvent::Items];
        if reconciliation.folders.is_some() {
            events.push(StoreEvent::Folders);
        }
        if reconciliation.folders.is_some() || reconciliation.feeds.is_some() {
            events.push(StoreEvent::Feeds);
        }
        if reconciliation.user.is_some() {
            events.push(StoreEvent::User);
        }
        self.events.publish(&events);
        Ok(stats)
    }

    fn recompute_counters(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE feeds SET
                unread_count = (SELECT COUNT(*) FROM items
                                WHERE items.feed_id = feeds.id AND items.unread = 1),
                starred_count = (SELECT COUNT(*) FROM items
                                 WHERE items.feed_id = feeds.id AND items.starred = 1)",
            [],
        )?;
        self.events.publish(&[StoreEvent::Feeds]);
        Ok(())
    }

    fn remove_excess_items(&self, max_items: i64) -> Result<usize> {
        let conn = self.conn()?;
        let total: i64 = conn.query_row("SELECT COUNT(*) FROM items", [], |row| row.get(0))?;
        if total <= max_items {
            return Ok(0);
        }

        let removed = conn.execute(
            &format!(
                "DELETE FROM items WHERE id IN (
                    SELECT id FROM items WHERE {}
                    ORDER BY last_modified ASC, id ASC LIMIT ?1)",
                PURGEABLE
            ),
            [total - max_items],
        )?;
        if removed > 0 {
            tracing::debug!("Removed {} items above the cap of {}", removed, max_items);
            self.events.publish(&[StoreEvent::Items]);
        }
        Ok(removed)
    }

    fn get_user(&self) -> Result<Option<User>> {
        let conn = self.conn()?;
        let user = conn
            .query_row(
                "SELECT user_id, display_name, last_login, avatar, avatar_mime
                 FROM users WHERE id = 0",
                [],
                |row| {
                    Ok(User {
                        user_id: row.get(0)?,
                        display_name: row.get(1)?,
                        last_login: row.get::<_, Option<i64>>(2)?.and_then(epoch),
                        avatar: row.get(3)?,
                        avatar_mime: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(user)
    }

    fn set_list_window(&self, tree_item_id: i64, name: &str, item_ids: &[i64]) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let list = WindowKind::List.id();

        tx.execute(
            "UPDATE temporary_feeds SET tree_item_id = ?1, name = ?2 WHERE id = ?3",
            params![tree_item_id, name, list],
        )?;
        tx.execute(
            "DELETE FROM temporary_feed_items WHERE temporary_feed_id = ?1",
            [list],
        )?;
        for (position, id) in item_ids.iter().enumerate() {
            tx.execute(
                "INSERT OR IGNORE INTO temporary_feed_items (temporary_feed_id, item_id, position)
                 SELECT ?1, id, ?2 FROM items WHERE id = ?3",
                params![list, position as i64, id],
            )?;
        }

        tx.commit()?;
        self.events.publish(&[StoreEvent::Windows]);
        Ok(())
    }

    fn update_pager_window(&self) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let (list, pager) = (WindowKind::List.id(), WindowKind::Pager.id());

        tx.execute("UPDATE items SET active = 0 WHERE active = 1", [])?;
        tx.execute(
            "UPDATE temporary_feeds SET
                tree_item_id = (SELECT tree_item_id FROM temporary_feeds WHERE id = ?1),
                name = (SELECT name FROM temporary_feeds WHERE id = ?1)
             WHERE id = ?2",
            params![list, pager],
        )?;
        tx.execute(
            "DELETE FROM temporary_feed_items WHERE temporary_feed_id = ?1",
            [pager],
        )?;
        tx.execute(
            "INSERT INTO temporary_feed_items (temporary_feed_id, item_id, position)
             SELECT ?2, item_id, position FROM temporary_feed_items WHERE temporary_feed_id = ?1",
            params![list, pager],
        )?;
        tx.execute(
            "UPDATE items SET active = 1 WHERE id IN
                (SELECT item_id FROM temporary_feed_items WHERE temporary_feed_id = ?1)",
            [pager],
        )?;

        tx.commit()?;
        self.events.publish(&[StoreEvent::Windows, StoreEvent::Items]);
        Ok(())
    }

    fn get_window(&self, kind: WindowKind) -> Result<TemporaryFeed> {
        let conn = self.conn()?;
        let (tree_item_id, name) = conn.query_row(
            "SELECT tree_item_id, name FROM temporary_feeds WHERE id = ?1",
            [kind.id()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(TemporaryFeed {
            id: kind.id(),
            tree_item_id,
            name,
            item_ids: window_item_ids(&conn, kind)?,
        })
    }

    fn mark_list_window_read(&self, last_item_id: Option<i64>) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut changed = 0;

        for id in window_item_ids(&tx, WindowKind::List)? {
            if let Some(mut item) = load_item(&tx, id)? {
                if apply_flag(&tx, &mut item, Flag::Unread, false)? {
                    changed += 1;
                }
            }
            if last_item_id == Some(id) {
                break;
            }
        }

        tx.commit()?;
        if changed > 0 {
            self.events.publish(&[StoreEvent::Feeds, StoreEvent::Items]);
        }
        Ok(changed)
    }

    fn reset(&self) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute_batch(
            "DELETE FROM temporary_feed_items;
             DELETE FROM items;
             DELETE FROM feeds;
             DELETE FROM folders;
             DELETE FROM users;
             UPDATE temporary_feeds SET tree_item_id = 0, name = '';",
        )?;
        tx.commit()?;
        tracing::info!("Local store cleared");
        self.events.publish(&[StoreEvent::Reset]);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }
}

/// A confirmed change is cleared only if the flag still holds the uploaded
/// value; a flag toggled again during the upload stays dirty.
fn clear_confirmed(conn: &Connection, confirmed: &[ConfirmedChange]) -> Result<()> {
    for change in confirmed {
        let flag = change.action.flag();
        let sql = format!(
            "UPDATE items SET {changed} = ({column} != ?1) WHERE id = ?2",
            changed = flag.changed_column(),
            column = flag.column()
        );
        let mut stmt = conn.prepare(&sql)?;
        for id in &change.item_ids {
            stmt.execute(params![change.action.value(), id])?;
        }
    }
    Ok(())
}
