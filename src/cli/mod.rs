//! Command-line interface for epiwatch.

use clap::{Parser, Subcommand};

use crate::config::Settings;
use crate::models::SyncTrigger;
use crate::repository::{run_migrations, AsyncSqlitePool, SyncLogRepository};
use crate::server::AppState;

#[derive(Parser)]
#[command(name = "epiwatch")]
#[command(about = "Public health surveillance data aggregation service")]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Start the dashboard server with scheduled syncing
    Serve {
        /// Address to bind to as HOST:PORT (overrides HOST/PORT env)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Run one full sync and exit
    Sync,

    /// Show recent sync runs
    Status {
        /// Number of runs to show
        #[arg(short, long, default_value = "10")]
        limit: i64,
    },

    /// Manage the CSV download cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
}

#[derive(Subcommand)]
enum CacheCommands {
    /// Show cache entry count, size, and age
    Stats,
    /// Remove all cached files and metadata
    Clear,
}

/// Load settings and prepare the database.
///
/// A store that cannot be opened or migrated is the one fatal startup
/// condition; the error propagates and the process exits non-zero.
async fn bootstrap() -> anyhow::Result<Settings> {
    let settings = Settings::from_env()?;
    settings.ensure_directories()?;
    run_migrations(&settings.database_url()).await?;
    Ok(settings)
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { bind } => {
            let mut settings = bootstrap().await?;
            if let Some(bind) = bind {
                let (host, port) = bind
                    .rsplit_once(':')
                    .ok_or_else(|| anyhow::anyhow!("--bind expects HOST:PORT, got '{bind}'"))?;
                settings.host = host.to_string();
                settings.port = port.parse()?;
            }
            crate::server::serve(&settings).await
        }

        Commands::Sync => {
            let settings = bootstrap().await?;
            let state = AppState::new(&settings)?;

            let outcome = state
                .sync
                .run_full_sync(SyncTrigger::Manual, "system:cli")
                .await;

            if outcome.success {
                println!("Sync complete");
                Ok(())
            } else {
                for error in &outcome.errors {
                    eprintln!("sync error: {}", error);
                }
                anyhow::bail!("sync finished with {} error(s)", outcome.errors.len())
            }
        }

        Commands::Status { limit } => {
            let settings = bootstrap().await?;
            let pool = AsyncSqlitePool::from_path(&settings.database_path);
            let sync_log = SyncLogRepository::new(pool);

            let runs = sync_log.recent(limit).await?;
            if runs.is_empty() {
                println!("No sync runs recorded yet");
                return Ok(());
            }

            for run in runs {
                let duration = run
                    .duration_ms
                    .map(|ms| format!("{}ms", ms))
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "#{} {} {} trigger={} by={} duration={} records={}{}",
                    run.id,
                    run.started_at.format("%Y-%m-%d %H:%M:%S"),
                    run.status.as_str(),
                    run.trigger.as_str(),
                    run.triggered_by,
                    duration,
                    run.records_processed,
                    run.error_message
                        .map(|e| format!(" error={}", e))
                        .unwrap_or_default(),
                );
            }
            Ok(())
        }

        Commands::Cache { command } => {
            let settings = bootstrap().await?;
            let state = AppState::new(&settings)?;

            match command {
                CacheCommands::Stats => {
                    let stats = state.csv_cache.stats().await?;
                    println!("Entries:  {}", stats.total_entries);
                    println!("Size:     {} bytes", stats.total_size);
                    if let Some(oldest) = stats.oldest_entry {
                        println!("Oldest:   {}", oldest.to_rfc3339());
                    }
                    if let Some(newest) = stats.newest_entry {
                        println!("Newest:   {}", newest.to_rfc3339());
                    }
                }
                CacheCommands::Clear => {
                    state.csv_cache.clear().await?;
                    println!("CSV cache cleared");
                }
            }
            Ok(())
        }
    }
}
