//! Background daemon for automatic sync.
//!
//! Runs a full sync on one interval and pushes pending read/star changes on
//! a shorter one, without requiring system scheduler configuration.

use std::fs;
use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::app::{Result, TributaryError};
use crate::config::DaemonSection;
use crate::sync::{ChangeTracker, SyncOutcome, SyncService, SyncType};

/// Daemon configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonConfig {
    /// Full sync interval in seconds (default: 3600 = 1 hour)
    pub full_interval_secs: u64,
    /// Interval for pushing local changes in seconds (default: 300)
    pub changes_interval_secs: u64,
    /// Whether to run a full sync immediately on start
    pub sync_on_start: bool,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            full_interval_secs: 3600,
            changes_interval_secs: 300,
            sync_on_start: true,
        }
    }
}

impl DaemonConfig {
    pub fn from_section(section: &DaemonSection) -> Result<Self> {
        Ok(Self {
            full_interval_secs: Self::parse_interval(&section.interval)
                .map_err(TributaryError::Config)?,
            changes_interval_secs: Self::parse_interval(&section.changes_interval)
                .map_err(TributaryError::Config)?,
            sync_on_start: true,
        })
    }

    /// Parse interval string like "1h", "30m", "6h", "1d"
    pub fn parse_interval(s: &str) -> std::result::Result<u64, String> {
        let s = s.trim().to_lowercase();

        let (digits, unit) = match s.char_indices().last() {
            Some((i, c)) if c.is_ascii_alphabetic() => (&s[..i], c),
            _ => (s.as_str(), 's'),
        };
        let multiplier = match unit {
            's' => 1,
            'm' => 60,
            'h' => 3600,
            'd' => 86400,
            _ => {
                return Err(format!(
                    "Invalid interval: {}. Use format like '1h', '30m', '1d'",
                    s
                ))
            }
        };

        let value = digits
            .parse::<u64>()
            .map_err(|_| format!("Invalid interval: {}. Use format like '1h', '30m', '1d'", s))?;
        if value == 0 {
            return Err("Interval must be greater than zero".to_string());
        }
        value
            .checked_mul(multiplier)
            .ok_or_else(|| format!("Interval too large: {}", s))
    }

    /// Format interval for display
    pub fn format_interval(secs: u64) -> String {
        if secs >= 86400 && secs.is_multiple_of(86400) {
            format!("{}d", secs / 86400)
        } else if secs >= 3600 && secs.is_multiple_of(3600) {
            format!("{}h", secs / 3600)
        } else if secs >= 60 && secs.is_multiple_of(60) {
            format!("{}m", secs / 60)
        } else {
            format!("{}s", secs)
        }
    }
}

/// PID file guarding against a second daemon instance.
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn default_path() -> Result<PathBuf> {
        dirs::runtime_dir()
            .or_else(dirs::cache_dir)
            .map(|d| d.join("tributary").join("daemon.pid"))
            .ok_or_else(|| TributaryError::Config("Could not determine PID file path".into()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// PID recorded in the file, if there is a readable one.
    pub fn read(&self) -> Option<u32> {
        fs::read_to_string(&self.path)
            .ok()
            .and_then(|s| s.trim().parse().ok())
    }

    /// PID of a live process recorded in the file.
    pub fn running_pid(&self) -> Option<u32> {
        self.read().filter(|&pid| process_exists(pid))
    }

    pub fn write(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = fs::File::create(&self.path)?;
        writeln!(file, "{}", std::process::id())?;
        Ok(())
    }

    pub fn remove(&self) {
        if let Err(e) = fs::remove_file(&self.path) {
            debug!("Could not remove {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(unix)]
fn process_exists(pid: u32) -> bool {
    use std::process::Command;
    Command::new("kill")
        .args(["-0", &pid.to_string()])
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

#[cfg(windows)]
fn process_exists(pid: u32) -> bool {
    use std::process::Command;
    Command::new("tasklist")
        .args(["/FI", &format!("PID eq {}", pid)])
        .output()
        .map(|o| String::from_utf8_lossy(&o.stdout).contains(&pid.to_string()))
        .unwrap_or(false)
}

/// Daemon runner
pub struct Daemon {
    service: SyncService,
    config: DaemonConfig,
}

impl Daemon {
    pub fn new(service: SyncService, config: DaemonConfig) -> Self {
        Self { service, config }
    }

    /// Run until SIGTERM or Ctrl-C, holding the PID file meanwhile.
    pub async fn run(&self, pid_file: &PidFile) -> Result<()> {
        if let Some(pid) = pid_file.running_pid() {
            return Err(TributaryError::State(format!(
                "Another daemon instance is already running (PID {})",
                pid
            )));
        }
        pid_file.write()?;

        let result = self.run_until(shutdown_signal()).await;
        pid_file.remove();
        result
    }

    /// Run the sync loop until `shutdown` resolves.
    pub async fn run_until<F: Future<Output = ()>>(&self, shutdown: F) -> Result<()> {
        tokio::pin!(shutdown);

        info!(
            "tributary daemon started (sync every {}, changes every {}, PID: {})",
            DaemonConfig::format_interval(self.config.full_interval_secs),
            DaemonConfig::format_interval(self.config.changes_interval_secs),
            std::process::id()
        );

        if self.config.sync_on_start {
            info!("Running initial sync...");
            self.full_sync().await;
        }

        let full_period = Duration::from_secs(self.config.full_interval_secs);
        let changes_period = Duration::from_secs(self.config.changes_interval_secs);
        let mut full = interval_at(Instant::now() + full_period, full_period);
        let mut changes = interval_at(Instant::now() + changes_period, changes_period);
        full.set_missed_tick_behavior(MissedTickBehavior::Delay);
        changes.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = full.tick() => {
                    info!("Running scheduled sync...");
                    self.full_sync().await;
                }
                _ = changes.tick() => self.push_changes().await,
            }
        }

        info!("Daemon shutting down...");
        Ok(())
    }

    async fn full_sync(&self) {
        match self.service.sync(SyncType::FullSync).await {
            Ok(SyncOutcome::Completed(report)) => {
                for (action, e) in &report.upload_failures {
                    warn!("  {} not uploaded: {}", action, e);
                }
                info!(
                    "Sync complete: {} items stored, {} purged",
                    report.items_stored, report.items_purged
                );
            }
            Ok(SyncOutcome::Coalesced) => debug!("Sync already running"),
            Err(e) if e.is_transient() => warn!("Sync failed, retrying next interval: {}", e),
            Err(e) => error!("Sync failed: {}", e),
        }
    }

    /// Upload pending changes, if there are any.
    async fn push_changes(&self) {
        match ChangeTracker::new(self.service.store().as_ref()).has_pending() {
            Ok(false) => return,
            Ok(true) => {}
            Err(e) => {
                error!("Could not read pending changes: {}", e);
                return;
            }
        }

        match self.service.sync(SyncType::ChangesOnly).await {
            Ok(SyncOutcome::Completed(report)) => {
                for (action, count) in &report.uploaded {
                    info!("  {}: {} items", action, count);
                }
                for (action, e) in &report.upload_failures {
                    warn!("  {} not uploaded: {}", action, e);
                }
            }
            Ok(SyncOutcome::Coalesced) => debug!("Sync already running"),
            Err(e) => warn!("Pushing changes failed: {}", e),
        }
    }
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = sigterm.recv() => {},
                _ = tokio::signal::ctrl_c() => {},
            }
        }
        Err(e) => {
            warn!("Failed to set up SIGTERM handler: {}", e);
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

/// Stop a running daemon by reading PID file and sending signal
pub fn stop_daemon(pid_file: &PidFile) -> Result<()> {
    let pid = pid_file.read().ok_or_else(|| {
        TributaryError::State("No daemon is running (PID file not found)".to_string())
    })?;

    #[cfg(unix)]
    let status = std::process::Command::new("kill")
        .args(["-TERM", &pid.to_string()])
        .status()?;

    #[cfg(windows)]
    let status = std::process::Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/F"])
        .status()?;

    if status.success() {
        pid_file.remove();
        Ok(())
    } else {
        Err(TributaryError::State(format!(
            "Failed to stop daemon (PID {})",
            pid
        )))
    }
}

/// Check daemon status
pub fn daemon_status(pid_file: &PidFile) -> String {
    match pid_file.read() {
        Some(pid) if process_exists(pid) => format!("Daemon is running (PID: {})", pid),
        Some(_) => "Daemon is not running (stale PID file)".to_string(),
        None => "Daemon is not running".to_string(),
    }
}
