//! queuectl - persistent retrying job queue
//!
//! Composition root and operator console: wires the SQLite store and shell
//! runner into the engine, then maps each subcommand onto an engine
//! operation.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::sync::Arc;
use tabled::{Table, Tabled};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use queuectl_core::application::{EnqueueRequest, QueueService, RecoveryService};
use queuectl_core::domain::{DeadLetterEntry, Job, JobState};
use queuectl_core::port::id_provider::UuidProvider;
use queuectl_core::port::time_provider::SystemTimeProvider;
use queuectl_infra_sqlite::{create_pool, run_migrations, SqliteJobStore};
use queuectl_infra_system::ShellCommandRunner;

#[derive(Parser)]
#[command(name = "queuectl")]
#[command(about = "Persistent retrying job queue with a dead-letter queue", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Database path (defaults to the platform data directory)
    #[arg(long, env = "QUEUECTL_DB_PATH", global = true)]
    db: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Enqueue a new job
    Enqueue {
        /// Job id (generated when omitted; re-using an id replaces the job)
        #[arg(long)]
        id: Option<String>,

        /// Retry ceiling for this job (falls back to the max_retries config)
        #[arg(long)]
        max_retries: Option<i64>,

        /// Shell command to execute
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        command: Vec<String>,
    },

    /// List jobs
    List {
        /// Filter by state (pending, running, completed)
        #[arg(long)]
        state: Option<String>,
    },

    /// Show a single job as JSON
    Show {
        /// Job id
        id: String,
    },

    /// Reset a job for immediate retry (attempts back to 0)
    RetryNow {
        /// Job id
        id: String,
    },

    /// Delete a job
    Delete {
        /// Job id
        id: String,
    },

    /// Dead-letter queue operations
    Dlq {
        #[command(subcommand)]
        command: DlqCommands,
    },

    /// Engine configuration (max_retries, base_backoff_seconds)
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Show queue counts
    Status,

    /// Run a worker pool until Ctrl-C
    Work {
        /// Number of concurrent workers
        #[arg(long, default_value = "1")]
        count: usize,
    },
}

#[derive(Subcommand)]
enum DlqCommands {
    /// List dead-lettered jobs
    List,
    /// Move a dead-lettered job back to the pending queue
    Retry { id: String },
    /// Remove a dead-lettered job permanently
    Purge { id: String },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Read a config value
    Get { key: String },
    /// Write a config value
    Set { key: String, value: String },
}

#[derive(Tabled)]
struct JobView {
    id: String,
    state: String,
    attempts: String,
    created_at: String,
    next_run_at: String,
    command: String,
}

impl JobView {
    fn from_job(job: &Job) -> Self {
        Self {
            id: job.id.clone(),
            state: job.state.to_string(),
            attempts: format!("{}/{}", job.attempts, job.max_retries),
            created_at: format_ts(job.created_at),
            next_run_at: job.next_run_at.map(format_ts).unwrap_or_default(),
            command: job.command.clone(),
        }
    }
}

#[derive(Tabled)]
struct DlqView {
    id: String,
    attempts: String,
    failed_at: String,
    last_error: String,
    command: String,
}

impl DlqView {
    fn from_entry(entry: &DeadLetterEntry) -> Self {
        Self {
            id: entry.id.clone(),
            attempts: format!("{}/{}", entry.attempts, entry.max_retries),
            failed_at: format_ts(entry.failed_at),
            last_error: entry.last_error.clone(),
            command: entry.command.clone(),
        }
    }
}

fn format_ts(epoch_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(epoch_ms)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| epoch_ms.to_string())
}

fn init_logging() {
    let log_format = std::env::var("QUEUECTL_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| {
            EnvFilter::try_new("queuectl_core=info,queuectl_infra_sqlite=info,queuectl_infra_system=info")
        })
        .expect("Failed to create env filter");

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty())
                .init();
        }
    }
}

fn default_db_path() -> Result<String> {
    let dirs = directories::ProjectDirs::from("", "", "queuectl")
        .context("could not determine a data directory; pass --db")?;
    Ok(dirs.data_dir().join("queue.db").to_string_lossy().into_owned())
}

async fn build_service(db_path: &str) -> Result<(QueueService, RecoveryService)> {
    if let Some(parent) = std::path::Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
    }

    let pool = create_pool(db_path)
        .await
        .map_err(|e| anyhow::anyhow!("DB pool creation failed: {}", e))?;
    run_migrations(&pool)
        .await
        .map_err(|e| anyhow::anyhow!("Migration failed: {}", e))?;

    let time_provider = Arc::new(SystemTimeProvider);
    let store: Arc<SqliteJobStore> = Arc::new(SqliteJobStore::new(pool, time_provider.clone()));
    let runner = Arc::new(ShellCommandRunner::new(time_provider.clone()));

    let service = QueueService::new(
        store.clone(),
        runner,
        Arc::new(UuidProvider),
        time_provider,
    );
    let recovery = RecoveryService::new(store);
    Ok((service, recovery))
}

fn parse_state(s: &str) -> Result<JobState> {
    s.parse::<JobState>()
        .map_err(|e| anyhow::anyhow!("{} (expected pending, running or completed)", e))
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();
    let db_path = match &cli.db {
        Some(path) => path.clone(),
        None => default_db_path()?,
    };
    let (service, recovery) = build_service(&db_path).await?;

    match cli.command {
        Commands::Enqueue {
            id,
            max_retries,
            command,
        } => {
            let job_id = service
                .enqueue(EnqueueRequest {
                    id,
                    command: command.join(" "),
                    max_retries,
                })
                .await?;
            println!("{} {}", "✓ enqueued".green().bold(), job_id);
        }

        Commands::List { state } => {
            let filter = state.as_deref().map(parse_state).transpose()?;
            let jobs = service.list_jobs(filter).await?;
            if jobs.is_empty() {
                println!("{}", "no jobs".yellow());
            } else {
                let table = Table::new(jobs.iter().map(JobView::from_job)).to_string();
                println!("{table}");
            }
        }

        Commands::Show { id } => match service.get_job(&id).await? {
            Some(job) => println!("{}", serde_json::to_string_pretty(&job)?),
            None => {
                println!("{}", format!("job {} not found", id).red());
                std::process::exit(1);
            }
        },

        Commands::RetryNow { id } => {
            service.retry_now(&id).await?;
            println!("{} {}", "✓ scheduled for immediate retry".green().bold(), id);
        }

        Commands::Delete { id } => {
            if service.delete_job(&id).await? {
                println!("{} {}", "✓ deleted".green().bold(), id);
            } else {
                println!("{}", format!("job {} not found", id).yellow());
            }
        }

        Commands::Dlq { command } => match command {
            DlqCommands::List => {
                let entries = service.list_dlq().await?;
                if entries.is_empty() {
                    println!("{}", "DLQ is empty".yellow());
                } else {
                    let table = Table::new(entries.iter().map(DlqView::from_entry)).to_string();
                    println!("{table}");
                }
            }
            DlqCommands::Retry { id } => {
                service.retry_from_dlq(&id).await?;
                println!("{} {}", "✓ moved back to pending queue".green().bold(), id);
            }
            DlqCommands::Purge { id } => {
                if service.purge_dlq(&id).await? {
                    println!("{} {}", "✓ purged".green().bold(), id);
                } else {
                    println!("{}", format!("DLQ entry {} not found", id).yellow());
                }
            }
        },

        Commands::Config { command } => match command {
            ConfigCommands::Get { key } => match service.get_config(&key).await? {
                Some(value) => println!("{value}"),
                None => {
                    println!("{}", format!("config key {} not set", key).yellow());
                    std::process::exit(1);
                }
            },
            ConfigCommands::Set { key, value } => {
                service.set_config(&key, &value).await?;
                println!("{} {} = {}", "✓ set".green().bold(), key, value);
            }
        },

        Commands::Status => {
            let stats = service.stats().await?;
            println!("{}", "Queue Status".cyan().bold());
            println!();
            println!("  {} {}", "Pending:".bold(), stats.pending);
            println!("  {} {}", "Running:".bold(), stats.running);
            println!("  {} {}", "Completed:".bold(), stats.completed);
            println!("  {} {}", "In DLQ:".bold(), stats.dead_lettered);
        }

        Commands::Work { count } => {
            info!(db_path = %db_path, "queuectl v{} starting", queuectl_core::VERSION);

            // Jobs left Running by a crashed process become dispatchable again
            let recovered = recovery.requeue_orphaned().await?;
            if recovered > 0 {
                println!(
                    "{}",
                    format!("recovered {} orphaned job(s)", recovered).yellow()
                );
            }

            let pool = service.start_workers(count);
            println!(
                "{}",
                format!("started {} worker(s), press Ctrl-C to stop", pool.len())
                    .green()
                    .bold()
            );

            tokio::signal::ctrl_c().await?;
            println!("{}", "stopping workers...".yellow());
            service.stop_workers(pool).await;
            println!("{}", "✓ all workers stopped".green().bold());
        }
    }

    Ok(())
}
