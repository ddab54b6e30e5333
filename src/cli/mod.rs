pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::api::QueryType;

#[derive(Parser)]
#[command(name = "tributary")]
#[command(about = "An offline-first client for Nextcloud News", long_about = None)]
pub struct Cli {
    /// Path of the local database
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Path of the configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Log in to a News server
    Login {
        /// Address of the Nextcloud instance
        url: String,
        username: String,
        /// Read from standard input when omitted
        #[arg(long)]
        password: Option<String>,
    },
    /// Forget the stored account and delete local data
    Logout,
    /// Show account, server and local state
    Status,
    /// Synchronize with the server
    Sync {
        /// Only upload local read/starred changes
        #[arg(long)]
        changes_only: bool,
    },
    /// Fetch older items for a feed, folder or the starred list
    LoadMore {
        #[arg(value_enum)]
        source: Source,
        /// Feed or folder id
        #[arg(default_value_t = 0)]
        id: i64,
        /// Only items with a lower id are fetched
        #[arg(long)]
        offset: i64,
    },
    /// Subscribe to a feed
    Add {
        /// URL of the feed to add
        url: String,
        /// Folder to put the feed in (0 = root)
        #[arg(long, default_value_t = 0)]
        folder: i64,
    },
    /// Unsubscribe from a feed
    Remove {
        feed_id: i64,
    },
    /// Move a feed to another folder
    Move {
        feed_id: i64,
        /// Target folder (0 = root)
        folder_id: i64,
    },
    /// List folders and feeds, or items
    List {
        /// Show items instead of feeds
        #[arg(long)]
        items: bool,
        /// Only items of this feed
        #[arg(long, conflicts_with = "folder")]
        feed: Option<i64>,
        /// Only items of feeds in this folder
        #[arg(long)]
        folder: Option<i64>,
        /// Only starred items
        #[arg(long, conflicts_with_all = ["feed", "folder"])]
        starred: bool,
        /// Only unread items
        #[arg(long)]
        unread: bool,
    },
    /// Mark items as read
    Read {
        #[arg(required = true)]
        ids: Vec<i64>,
    },
    /// Mark items as unread
    Unread {
        #[arg(required = true)]
        ids: Vec<i64>,
    },
    /// Star items
    Star {
        #[arg(required = true)]
        ids: Vec<i64>,
    },
    /// Unstar items
    Unstar {
        #[arg(required = true)]
        ids: Vec<i64>,
    },
    /// Background daemon for automatic sync
    Daemon {
        #[command(subcommand)]
        action: DaemonAction,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum Source {
    Feed,
    Folder,
    Starred,
}

impl From<Source> for QueryType {
    fn from(source: Source) -> Self {
        match source {
            Source::Feed => QueryType::Feed,
            Source::Folder => QueryType::Folder,
            Source::Starred => QueryType::Starred,
        }
    }
}

#[derive(Subcommand)]
pub enum DaemonAction {
    /// Start the background daemon in the foreground
    Start {
        /// Full sync interval (e.g., "1h", "30m", "1d"); defaults to the config file
        #[arg(short, long)]
        interval: Option<String>,

        /// Interval for uploading local changes
        #[arg(long)]
        changes_interval: Option<String>,

        /// Skip the initial sync on start
        #[arg(long)]
        no_initial_sync: bool,
    },
    /// Stop the running daemon
    Stop,
    /// Check daemon status
    Status,
}
