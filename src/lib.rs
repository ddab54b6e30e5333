//! # Tributary
//!
//! An offline-first client for the Nextcloud News API.
//!
//! ## Architecture
//!
//! Everything the user does happens against the local database first; the
//! sync engine reconciles it with the server afterwards:
//!
//! ```text
//! CLI → Store ← Sync Orchestrator → News API
//!          ↑            ↓
//!   Change Tracker ─────┘
//! ```
//!
//! - [`store`]: SQLite persistence with dirty flags for local changes
//! - [`api`]: Typed client for the News REST API
//! - [`sync`]: Upload, fetch and reconcile passes
//! - [`session`]: Stored account and login validation
//!
//! ## Quick Start
//!
//! ```bash
//! # Log in
//! tributary login https://cloud.example.com alice
//!
//! # Fetch everything
//! tributary sync
//!
//! # Read offline, then push the changes
//! tributary read 1042 1043
//! tributary sync --changes-only
//! ```

/// Application context and error handling.
///
/// The [`AppContext`](app::AppContext) struct wires together the store, the
/// configuration and the session.
pub mod app;

/// Configuration management.
///
/// Loads from `~/.config/tributary/config.toml`: sync limits, HTTP timeouts
/// and daemon intervals.
pub mod config;

/// Background daemon for automatic sync.
///
/// - `tributary daemon start` - Start the background syncer
/// - `tributary daemon stop` - Stop the daemon
/// - `tributary daemon status` - Check if daemon is running
pub mod daemon;

/// Command-line interface using clap.
pub mod cli;

/// Core domain models.
///
/// - [`Folder`](domain::Folder), [`Feed`](domain::Feed) and [`Item`](domain::Item)
/// - [`MarkAction`](domain::MarkAction): kinds of local changes to upload
/// - [`TemporaryFeed`](domain::TemporaryFeed): list and pager windows
pub mod domain;

/// Remote News API.
///
/// - [`NewsApi`](api::NewsApi): Async trait over the REST endpoints
/// - [`HttpNewsClient`](api::HttpNewsClient): reqwest-based implementation
pub mod api;

/// SQLite persistence layer.
///
/// - [`Store`](store::Store): Trait defining storage operations
/// - [`SqliteStore`](store::SqliteStore): SQLite implementation
pub mod store;

/// Synchronization engine.
///
/// - [`SyncService`](sync::SyncService): serialized sync passes and feed management
/// - [`ChangeTracker`](sync::ChangeTracker): batches of pending local changes
pub mod sync;

/// Stored credentials and login.
pub mod session;
