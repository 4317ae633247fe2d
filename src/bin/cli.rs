//! `sigap` CLI — the control surface over the booking engine (spec.md §1,
//! "CLI / control surface" ambient-stack addendum in SPEC_FULL.md).
//!
//! Job payloads (`--profile`, `--cookies`) are accepted as JSON files rather
//! than a wall of flags, since `Profile` is a tagged union with a dozen
//! site-specific fields — the same shape the chat front-end would hand the
//! engine over its own transport.

use std::{path::PathBuf, process::ExitCode, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};

use sigap::clock::TokioTimerWheel;
use sigap::config::load_default_config;
use sigap::error::AppResult;
use sigap::event_bus::TokioBroadcastBus;
use sigap::http::HttpSessionFactory;
use sigap::model::{derive_job_name, Job, JobCookies, Profile, Site};
use sigap::orchestrator::Orchestrator;
use sigap::reporter::{MessageFormat, NotificationSink, StatusReporter};
use sigap::store::JsonJobStore;

const TZ: chrono_tz::Tz = chrono_tz::Asia::Jakarta;

#[derive(Parser, Debug)]
#[command(name = "sigap", about = "Scheduled booking engine for time-critical reservation releases", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Store the user-global `ci_session` fallback cookie.
    SetCiSession {
        #[arg(long)]
        user: String,
        #[arg(long)]
        value: String,
    },
    /// Manage scheduled jobs.
    Job {
        #[command(subcommand)]
        action: JobAction,
    },
    /// Check current capacity for a site/date without scheduling anything.
    Capacity {
        #[arg(long)]
        user: String,
        #[arg(long, value_enum)]
        site: SiteArg,
        /// Booking date, `YYYY-MM-DD`.
        #[arg(long)]
        date: NaiveDate,
    },
}

#[derive(Subcommand, Debug)]
enum JobAction {
    /// Schedule a new job.
    Create(JobSpec),
    /// Tear down an existing job's timers and re-arm with new parameters.
    Edit {
        #[arg(long)]
        job_name: String,
        #[command(flatten)]
        spec: JobSpec,
    },
    /// Cancel a job and remove it from the store.
    Cancel {
        #[arg(long)]
        user: String,
        #[arg(long)]
        job_name: String,
    },
    /// List a user's scheduled jobs.
    List {
        #[arg(long)]
        user: String,
    },
    /// Show one job's full record.
    Show {
        #[arg(long)]
        user: String,
        #[arg(long)]
        job_name: String,
    },
}

#[derive(Parser, Debug)]
struct JobSpec {
    #[arg(long)]
    user: String,
    #[arg(long, value_enum)]
    site: SiteArg,
    /// Booking date, `YYYY-MM-DD`.
    #[arg(long)]
    booking_date: NaiveDate,
    /// When to trigger the job, RFC 3339 (e.g. `2025-09-30T07:00:00+07:00`).
    #[arg(long)]
    exec_at: DateTime<Utc>,
    /// Path to a JSON file deserializing to [`Profile`] (tagged by `site`).
    #[arg(long)]
    profile: PathBuf,
    /// Path to a JSON file deserializing to [`JobCookies`]; omit to fall
    /// back to the user's stored `ci_session`.
    #[arg(long)]
    cookies: Option<PathBuf>,
    #[arg(long)]
    reminder_minutes: Option<u8>,
    #[arg(long)]
    chat_id: String,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum SiteArg {
    Bromo,
    Semeru,
}

impl From<SiteArg> for Site {
    fn from(s: SiteArg) -> Self {
        match s {
            SiteArg::Bromo => Site::Bromo,
            SiteArg::Semeru => Site::Semeru,
        }
    }
}

/// Prints notifications to stdout instead of delivering them to a chat
/// front-end — the real sink is out of scope for this crate (spec.md §1).
struct StdoutSink;

#[async_trait]
impl NotificationSink for StdoutSink {
    async fn send(&self, chat_id: &str, text: &str, _format: MessageFormat, _preview: bool) -> AppResult<()> {
        println!("[{chat_id}] {text}");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    sigap::logging::init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> AppResult<()> {
    let cli = Cli::parse();
    let config = load_default_config();

    let store_path = config
        .store
        .path
        .clone()
        .map(PathBuf::from)
        .or_else(|| dirs::home_dir().map(|h| h.join(".sigap").join("jobs.json")))
        .unwrap_or_else(|| PathBuf::from("jobs.json"));

    let wheel = Arc::new(TokioTimerWheel::new(TZ));
    let store = Arc::new(JsonJobStore::open(store_path)?);
    let http = Arc::new(HttpSessionFactory::new(&config.http)?);
    let bus = Arc::new(TokioBroadcastBus::new());
    let reporter = Arc::new(StatusReporter::new(Arc::new(StdoutSink)));

    let orchestrator = Orchestrator::new(wheel, store, http, bus, reporter, config);
    orchestrator.boot_rehydrate().await?;

    match cli.command {
        Command::SetCiSession { user, value } => {
            orchestrator.set_ci_session(&user, value).await?;
            println!("stored ci_session for user {user}");
        }
        Command::Job { action } => run_job_action(&orchestrator, action).await?,
        Command::Capacity { user, site, date } => {
            match orchestrator.probe_capacity(&user, site.into(), date).await {
                Some(row) => println!(
                    "{}: quota={} available={}",
                    row.date_label, row.quota, row.available
                ),
                None => println!("no capacity data returned"),
            }
        }
    }

    Ok(())
}

async fn run_job_action(orchestrator: &Arc<Orchestrator>, action: JobAction) -> AppResult<()> {
    match action {
        JobAction::Create(spec) => {
            let job = build_job(&spec)?;
            orchestrator.create_job(&spec.user, job).await?;
            println!("job scheduled");
        }
        JobAction::Edit { job_name, spec } => {
            let new_job = build_job(&spec)?;
            orchestrator.reschedule_job(&spec.user, &job_name, new_job).await?;
            println!("job rescheduled");
        }
        JobAction::Cancel { user, job_name } => {
            orchestrator.cancel_job(&user, &job_name).await?;
            println!("job cancelled");
        }
        JobAction::List { user } => {
            let jobs = orchestrator.list_jobs(&user).await?;
            if jobs.is_empty() {
                println!("no jobs scheduled");
            }
            for job in jobs {
                println!("{}  exec_at={}", job.job_name, job.exec_at.to_rfc3339());
            }
        }
        JobAction::Show { user, job_name } => match orchestrator.get_job(&user, &job_name).await? {
            Some(job) => println!("{}", serde_json::to_string_pretty(&job).unwrap_or_default()),
            None => println!("no such job"),
        },
    }
    Ok(())
}

fn build_job(spec: &JobSpec) -> AppResult<Job> {
    let profile_json = std::fs::read_to_string(&spec.profile)?;
    let profile: Profile = serde_json::from_str(&profile_json)?;

    let cookies = match &spec.cookies {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => JobCookies::default(),
    };

    let site: Site = spec.site.into();
    let exec_at_tz = spec.exec_at.with_timezone(&TZ);
    let job_name = derive_job_name(site, &spec.user, profile.leader_name(), spec.booking_date, exec_at_tz);

    let job = Job {
        job_name,
        site,
        booking_date: spec.booking_date,
        exec_at: spec.exec_at,
        profile,
        cookies,
        reminder_minutes: spec.reminder_minutes,
        chat_id: spec.chat_id.clone(),
        created_at: Utc::now(),
    };
    job.validate().map_err(|e| sigap::error::AppError::Config(e.to_string()))?;

    Ok(job)
}
