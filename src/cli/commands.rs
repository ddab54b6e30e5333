use std::io::BufRead;

use crate::api::{NewsApi, QueryType};
use crate::app::{AppContext, Result, TributaryError};
use crate::domain::{Folder, Item};
use crate::store::Store;
use crate::sync::{ChangeTracker, SyncOutcome, SyncReport, SyncType};

pub async fn login(
    ctx: &AppContext,
    url: &str,
    username: &str,
    password: Option<String>,
) -> Result<()> {
    let password = match password {
        Some(p) => p,
        None => read_password()?,
    };

    let status = ctx.login(url, username, &password).await?;
    match status.version {
        Some(version) => println!("Logged in as {} (News {})", username, version),
        None => println!("Logged in as {}", username),
    }
    if status.improperly_configured_cron {
        println!("Warning: the server's cron job is not configured, feeds may not update");
    }
    Ok(())
}

fn read_password() -> Result<String> {
    eprint!("Password: ");
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    let password = line.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        return Err(TributaryError::Config("No password given".into()));
    }
    Ok(password)
}

pub fn logout(ctx: &AppContext) -> Result<()> {
    ctx.logout()?;
    println!("Logged out, local data removed");
    Ok(())
}

pub async fn status(ctx: &AppContext) -> Result<()> {
    match ctx.session.credentials()? {
        Some(credentials) => {
            println!("Account: {} on {}", credentials.username, credentials.url);
            let client = ctx.session.connect()?;
            match client.status().await {
                Ok(status) => {
                    match status.version {
                        Some(version) => println!("Server: News {}", version),
                        None => println!("Server: unknown version"),
                    }
                    if status.improperly_configured_cron {
                        println!("Warning: the server's cron job is not configured");
                    }
                }
                Err(e) => println!("Server: unreachable ({})", TributaryError::from(e)),
            }
        }
        None => println!("Not logged in"),
    }

    let store = ctx.store.as_ref();
    if let Some(user) = store.get_user()? {
        println!("User: {} ({})", user.display_name, user.user_id);
    }
    println!(
        "Local: {} feeds, {} items, {} unsynced changes",
        store.get_all_feeds()?.len(),
        store.item_count()?,
        store.pending_change_count()?
    );
    Ok(())
}

pub async fn sync(ctx: &AppContext, changes_only: bool) -> Result<()> {
    let service = ctx.sync_service()?;
    let sync_type = if changes_only {
        SyncType::ChangesOnly
    } else {
        SyncType::FullSync
    };

    match service.sync(sync_type).await? {
        SyncOutcome::Completed(report) => print_report(ctx, &report),
        SyncOutcome::Coalesced => {
            println!("A sync is already running");
            Ok(())
        }
    }
}

fn print_report(ctx: &AppContext, report: &SyncReport) -> Result<()> {
    for (action, count) in &report.uploaded {
        println!("  {}: {} items", action, count);
    }
    for (action, error) in &report.upload_failures {
        eprintln!("  ! {} failed: {}", action, error);
    }
    for feed_id in &report.failed_feeds {
        if let Some(feed) = ctx.store.get_feed(*feed_id)? {
            eprintln!(
                "  ! {} keeps failing to update: {}",
                feed.display_name(),
                feed.last_update_error.as_deref().unwrap_or("unknown error")
            );
        }
    }
    println!(
        "Sync complete: {} items stored, {} removed",
        report.items_stored, report.items_purged
    );

    if report.is_success() {
        Ok(())
    } else {
        Err(TributaryError::State(
            "some changes could not be uploaded and will be retried".into(),
        ))
    }
}

pub async fn load_more(ctx: &AppContext, query_type: QueryType, id: i64, offset: i64) -> Result<()> {
    let service = ctx.sync_service()?;
    if let SyncOutcome::Completed(report) = service
        .sync(SyncType::LoadMore {
            query_type,
            id,
            offset,
        })
        .await?
    {
        println!("Fetched {} older items", report.items_stored);
    }
    Ok(())
}

pub async fn add_feed(ctx: &AppContext, url: &str, folder_id: i64) -> Result<()> {
    let service = ctx.sync_service()?;
    let feed = service.create_feed(url, folder_id).await?;
    println!("Added feed {}: {}", feed.id, feed.display_name());
    Ok(())
}

pub async fn remove_feed(ctx: &AppContext, feed_id: i64) -> Result<()> {
    let feed = ctx
        .store
        .get_feed(feed_id)?
        .ok_or(TributaryError::FeedNotFound(feed_id))?;

    ctx.sync_service()?.delete_feed(feed_id).await?;
    println!("Removed feed: {}", feed.display_name());
    Ok(())
}

pub async fn move_feed(ctx: &AppContext, feed_id: i64, folder_id: i64) -> Result<()> {
    ctx.sync_service()?.move_feed(feed_id, folder_id).await?;
    let target = match ctx.store.get_folder(folder_id)? {
        Some(folder) if folder.id != Folder::ROOT_ID => folder.name,
        _ => "root".to_string(),
    };
    println!("Moved feed {} to {}", feed_id, target);
    Ok(())
}

pub fn list_feeds(ctx: &AppContext) -> Result<()> {
    let store = ctx.store.as_ref();
    let feeds = store.get_all_feeds()?;

    if feeds.is_empty() {
        println!("No feeds");
        return Ok(());
    }

    let threshold = ctx.config.sync.failed_feed_threshold;
    let print_feed = |feed: &crate::domain::Feed, indent: &str| {
        let failed = if feed.is_considered_failed(threshold) {
            " [failing]"
        } else {
            ""
        };
        println!(
            "{}{:>5} {} ({} unread, {} starred){}",
            indent,
            feed.id,
            feed.display_name(),
            feed.unread_count,
            feed.starred_count,
            failed
        );
    };

    for feed in feeds.iter().filter(|f| f.is_root()) {
        print_feed(feed, "");
    }
    for folder in store.get_all_folders()? {
        println!("{} [{}]", folder.name, folder.id);
        for feed in store.get_feeds_in_folder(folder.id)? {
            print_feed(&feed, "  ");
        }
    }

    Ok(())
}

pub fn list_items(
    ctx: &AppContext,
    feed: Option<i64>,
    folder: Option<i64>,
    starred: bool,
    unread: bool,
) -> Result<()> {
    let store = ctx.store.as_ref();
    let items = match (feed, folder) {
        (Some(feed_id), _) => store.get_items_by_feed(feed_id, unread)?,
        (None, Some(folder_id)) => store.get_items_by_folder(folder_id, unread)?,
        (None, None) if starred => store
            .get_starred_items()?
            .into_iter()
            .filter(|i| !unread || i.is_unread())
            .collect(),
        (None, None) if unread => store.get_unread_items()?,
        (None, None) => {
            let mut all = Vec::new();
            for f in store.get_all_feeds()? {
                all.extend(store.get_items_by_feed(f.id, false)?);
            }
            all
        }
    };

    if items.is_empty() {
        println!("No items");
        return Ok(());
    }

    for item in &items {
        println!("{}", format_item(item));
    }

    Ok(())
}

fn format_item(item: &Item) -> String {
    let read_marker = if item.is_unread() { "●" } else { " " };
    let star_marker = if item.is_starred() { "★" } else { " " };
    let media_marker = if item.has_enclosure() { " ♪" } else { "" };
    let date = item
        .pub_date
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "          ".to_string());

    format!(
        "{}{} {:>8} {} {}{}",
        read_marker,
        star_marker,
        item.id,
        date,
        item.display_title(),
        media_marker
    )
}

pub fn set_unread(ctx: &AppContext, ids: &[i64], unread: bool) -> Result<()> {
    let changed = ctx.store.set_items_unread(ids, unread)?;
    let state = if unread { "unread" } else { "read" };
    println!("Marked {} items {}", changed, state);
    report_pending(ctx)
}

pub fn set_starred(ctx: &AppContext, ids: &[i64], starred: bool) -> Result<()> {
    let changed = ctx.store.set_items_starred(ids, starred)?;
    let state = if starred { "starred" } else { "unstarred" };
    println!("{} {} items", capitalize(state), changed);
    report_pending(ctx)
}

fn report_pending(ctx: &AppContext) -> Result<()> {
    if ChangeTracker::new(ctx.store.as_ref()).has_pending()? {
        println!("Changes will be uploaded on the next sync");
    }
    Ok(())
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_item() {
        let mut item = Item::new(42, 1);
        item.title = Some("Item 42".into());
        item.pub_date = chrono::DateTime::from_timestamp(1_700_000_000, 0);

        let line = format_item(&item);
        assert!(line.starts_with('●'));
        assert!(line.contains("42"));
        assert!(line.contains("2023-11-14"));
        assert!(line.ends_with("Item 42"));
    }

    #[test]
    fn test_format_item_marks_enclosure() {
        let mut item = Item::new(7, 1);
        item.title = Some("Episode 7".into());
        assert!(!item.has_enclosure());
        assert!(format_item(&item).ends_with("Episode 7"));

        item.enclosure_link = Some("https://example.com/ep7.mp3".into());
        assert!(format_item(&item).ends_with("Episode 7 ♪"));
    }

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("starred"), "Starred");
        assert_eq!(capitalize(""), "");
    }
}
