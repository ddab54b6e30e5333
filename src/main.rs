use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tributary::app::AppContext;
use tributary::cli::{commands, Cli, Commands, DaemonAction};
use tributary::config::Config;
use tributary::daemon::{self, Daemon, DaemonConfig, PidFile};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Daemon passes log at info level
    let default_level = match cli.command {
        Commands::Daemon {
            action: DaemonAction::Start { .. },
        } => "info",
        _ => "warn",
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let ctx = AppContext::new(cli.db, config)?;

    match cli.command {
        Commands::Login {
            url,
            username,
            password,
        } => commands::login(&ctx, &url, &username, password).await?,
        Commands::Logout => commands::logout(&ctx)?,
        Commands::Status => commands::status(&ctx).await?,
        Commands::Sync { changes_only } => commands::sync(&ctx, changes_only).await?,
        Commands::LoadMore { source, id, offset } => {
            commands::load_more(&ctx, source.into(), id, offset).await?
        }
        Commands::Add { url, folder } => commands::add_feed(&ctx, &url, folder).await?,
        Commands::Remove { feed_id } => commands::remove_feed(&ctx, feed_id).await?,
        Commands::Move { feed_id, folder_id } => {
            commands::move_feed(&ctx, feed_id, folder_id).await?
        }
        Commands::List {
            items,
            feed,
            folder,
            starred,
            unread,
        } => {
            if items || feed.is_some() || folder.is_some() || starred || unread {
                commands::list_items(&ctx, feed, folder, starred, unread)?;
            } else {
                commands::list_feeds(&ctx)?;
            }
        }
        Commands::Read { ids } => commands::set_unread(&ctx, &ids, false)?,
        Commands::Unread { ids } => commands::set_unread(&ctx, &ids, true)?,
        Commands::Star { ids } => commands::set_starred(&ctx, &ids, true)?,
        Commands::Unstar { ids } => commands::set_starred(&ctx, &ids, false)?,
        Commands::Daemon { action } => {
            let pid_file = PidFile::new(PidFile::default_path()?);
            match action {
                DaemonAction::Start {
                    interval,
                    changes_interval,
                    no_initial_sync,
                } => {
                    let mut config = DaemonConfig::from_section(&ctx.config.daemon)?;
                    if let Some(interval) = interval {
                        config.full_interval_secs =
                            DaemonConfig::parse_interval(&interval).map_err(anyhow::Error::msg)?;
                    }
                    if let Some(interval) = changes_interval {
                        config.changes_interval_secs =
                            DaemonConfig::parse_interval(&interval).map_err(anyhow::Error::msg)?;
                    }
                    config.sync_on_start = !no_initial_sync;

                    Daemon::new(ctx.sync_service()?, config)
                        .run(&pid_file)
                        .await?;
                }
                DaemonAction::Stop => {
                    daemon::stop_daemon(&pid_file)?;
                    println!("Daemon stopped");
                }
                DaemonAction::Status => println!("{}", daemon::daemon_status(&pid_file)),
            }
        }
    }

    Ok(())
}
