//! ticketq CLI: run the dispatcher, submit jobs, and inspect the queue.

use std::str::FromStr;

use clap::{Parser, Subcommand, ValueEnum};
use secrecy::ExposeSecret;
use ticketq::config::Config;
use ticketq::db::Db;
use ticketq::engine::{
    DispatcherConfig, Executor, Intake, ShellExecutor, SimulatedExecutor, Submission,
};
use ticketq::error::Error;
use ticketq::limiter::RateLimiter;
use ticketq::model::{Job, JobId, State};
use ticketq::telemetry::{TelemetryConfig, init_telemetry};

#[derive(Parser)]
#[command(name = "ticketq", about = "Rate-limited, deduplicating, fair job queue")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Recover interrupted jobs and run the dispatcher
    Serve {
        /// How jobs are executed
        #[arg(long, value_enum, default_value_t = ExecutorKind::Simulated)]
        executor: ExecutorKind,
    },
    /// Submit one job per payload, in order
    Submit {
        /// Submitter identity
        submitter: String,
        /// Job payloads
        #[arg(required = true, num_args = 1..)]
        payloads: Vec<String>,
    },
    /// Show a job
    Status {
        /// Job ID (full UUID or unique prefix)
        id: String,
    },
    /// List jobs, newest first
    List {
        /// Filter by state
        #[arg(long)]
        state: Option<String>,
        /// Filter by submitter
        #[arg(long)]
        submitter: Option<String>,
        /// Maximum jobs to show
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Queue counts plus recent and failed jobs, as JSON
    Dashboard {
        /// Jobs per section
        #[arg(long, default_value_t = 10)]
        limit: i64,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ExecutorKind {
    /// Sleep for JOB_DURATION_MS and succeed
    Simulated,
    /// Run the payload with `sh -c`
    Shell,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    let db = Db::connect(config.database_url.expose_secret()).await?;
    db.migrate().await?;

    match cli.command {
        Command::Serve { executor } => {
            let _guard = init_telemetry(TelemetryConfig::from_config(&config))?;
            db.health_check().await?;
            let intake = Intake::new(db, RateLimiter::new(config.rate_limit)?);
            let dispatcher_config = DispatcherConfig {
                poll_interval: config.poll_interval,
            };
            match executor {
                ExecutorKind::Simulated => {
                    let executor = SimulatedExecutor::new(config.job_duration);
                    cmd_serve(&intake, executor, dispatcher_config).await
                }
                ExecutorKind::Shell => {
                    cmd_serve(&intake, ShellExecutor, dispatcher_config).await
                }
            }
        }
        Command::Submit {
            submitter,
            payloads,
        } => {
            let intake = Intake::new(db, RateLimiter::new(config.rate_limit)?);
            cmd_submit(&intake, &submitter, &payloads).await
        }
        Command::Status { id } => cmd_status(&db, &id).await,
        Command::List {
            state,
            submitter,
            limit,
        } => cmd_list(&db, state, submitter, limit).await,
        Command::Dashboard { limit } => {
            let intake = Intake::new(db, RateLimiter::new(config.rate_limit)?);
            cmd_dashboard(&intake, limit).await
        }
    }
}

async fn cmd_serve<E: Executor>(
    intake: &Intake,
    executor: E,
    config: DispatcherConfig,
) -> anyhow::Result<()> {
    let dispatcher = intake.startup(executor, config).await?;

    let handle = dispatcher.shutdown_handle();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        handle.shutdown();
    });

    dispatcher.run().await?;
    Ok(())
}

async fn cmd_submit(intake: &Intake, submitter: &str, payloads: &[String]) -> anyhow::Result<()> {
    for payload in payloads {
        match intake.submit(submitter, payload).await {
            Ok(Submission { job, is_new: true }) => {
                println!("created    {} (state: {})", job.id, job.state);
            }
            Ok(Submission { job, is_new: false }) => {
                println!("duplicate  {} (state: {})", job.id, job.state);
            }
            Err(Error::RateLimitExceeded { scope }) => {
                println!("rejected   ({scope}) {payload}");
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

async fn cmd_status(db: &Db, id_str: &str) -> anyhow::Result<()> {
    let id = resolve_id(db, id_str).await?;
    let job = db.get_job(id).await?;

    println!("ID:         {}", job.id);
    println!("Submitter:  {}", job.submitter_id);
    println!("State:      {}", job.state);
    println!("Payload:    {}", job.payload);
    println!("Created:    {}", job.created_at);
    if let Some(started) = job.started_at {
        println!("Started:    {started}");
    }
    if let Some(finished) = job.finished_at {
        println!("Finished:   {finished}");
    }
    if let Some(ref result) = job.result {
        println!("Result:     {result}");
    }
    if let Some(ref error) = job.error {
        println!("Error:      {error}");
    }
    Ok(())
}

/// Accept a full UUID or a prefix that matches exactly one recent job.
async fn resolve_id(db: &Db, id_str: &str) -> anyhow::Result<JobId> {
    if id_str.len() >= 36 {
        return Ok(JobId::from_str(id_str)?);
    }

    let jobs = db.list_jobs(None, None, 1000).await?;
    let matches: Vec<_> = jobs
        .iter()
        .filter(|job| job.id.to_string().starts_with(id_str))
        .collect();
    match matches.as_slice() {
        [] => anyhow::bail!("no job matching prefix '{id_str}'"),
        [job] => Ok(job.id),
        many => anyhow::bail!(
            "{} jobs match prefix '{id_str}', be more specific",
            many.len()
        ),
    }
}

async fn cmd_list(
    db: &Db,
    state: Option<String>,
    submitter: Option<String>,
    limit: i64,
) -> anyhow::Result<()> {
    let state_filter: Option<State> = state.as_deref().map(str::parse).transpose()?;

    let jobs = db
        .list_jobs(state_filter, submitter.as_deref(), limit)
        .await?;

    if jobs.is_empty() {
        println!("No jobs found.");
        return Ok(());
    }

    print_jobs(&jobs);
    println!("\n{} job(s)", jobs.len());
    Ok(())
}

async fn cmd_dashboard(intake: &Intake, limit: i64) -> anyhow::Result<()> {
    let dashboard = intake.dashboard(limit).await?;
    println!("{}", serde_json::to_string_pretty(&dashboard)?);
    Ok(())
}

fn print_jobs(jobs: &[Job]) {
    println!(
        "{:<8}  {:<16}  {:<8}  {:<30}  CREATED",
        "ID", "SUBMITTER", "STATE", "PAYLOAD"
    );
    println!("{}", "-".repeat(90));

    for job in jobs {
        let short_id = &job.id.to_string()[..8];
        let payload: String = job.payload.chars().take(30).collect();
        println!(
            "{:<8}  {:<16}  {:<8}  {:<30}  {}",
            short_id,
            job.submitter_id,
            job.state,
            payload,
            job.created_at.format("%Y-%m-%d %H:%M")
        );
    }
}
