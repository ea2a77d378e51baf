//! tally CLI: host for offline result delivery profiles.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use snafu::prelude::*;
use tracing::info;

use tally::error::{
    ConfigSnafu, DeliverySnafu, OpenStoreSnafu, ParsePayloadSnafu, ProfileSnafu, QueueResultSnafu,
    ReadPayloadSnafu, RenderSnafu, SetupSnafu,
};
use tally::{
    CliArgs, CliError, Config, Profile, RecordStore, ResultPayload, ResultQueue, StatusTracker,
    SubmitOutcome, init_tracing, run_components,
};

/// Durable offline delivery of graded activity results.
#[derive(Parser, Debug)]
#[command(name = "tally")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    config: CliArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Drain every profile at startup and on its poll interval until shutdown.
    Run,
    /// Drain pending results once.
    Drain {
        /// Only drain this profile.
        #[arg(long)]
        profile: Option<String>,
    },
    /// Print the sync status as JSON.
    Status {
        /// Only show this profile.
        #[arg(long)]
        profile: Option<String>,
    },
    /// Queue a result payload for later delivery.
    Enqueue {
        #[arg(long)]
        profile: String,
        /// JSON file holding the result payload.
        #[arg(long)]
        file: PathBuf,
    },
    /// Deliver a result payload now, queueing it if delivery fails.
    Submit {
        #[arg(long)]
        profile: String,
        /// JSON file holding the result payload.
        #[arg(long)]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse();

    let paths = cli.config.config_paths();
    if paths.is_empty() {
        eprintln!("Error: no config files or directories specified");
        return ExitCode::FAILURE;
    }

    info!("Loading config from {} source(s)", paths.len());

    let config = match Config::from_paths(&paths).context(ConfigSnafu) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            return ExitCode::FAILURE;
        }
    };

    match execute(cli.command, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn execute(command: Command, config: &Config) -> Result<(), CliError> {
    match command {
        Command::Run => run(config).await,
        Command::Drain { profile } => drain(config, profile.as_deref()).await,
        Command::Status { profile } => status(config, profile.as_deref()).await,
        Command::Enqueue { profile, file } => enqueue(config, &profile, &file).await,
        Command::Submit { profile, file } => submit(config, &profile, &file).await,
    }
}

async fn run(config: &Config) -> Result<(), CliError> {
    info!(
        "Starting tally with {} profile(s)",
        config.profile_count()
    );

    let mut profiles = Vec::with_capacity(config.profile_count());
    for (key, profile_config) in &config.profiles {
        info!("  Profile: {} ({})", key, profile_config.endpoint.url);
        let profile = Profile::open(key.clone(), profile_config)
            .await
            .context(ProfileSnafu)?
            .with_poll_jitter(config.global.poll_jitter_secs);
        profiles.push(profile);
    }

    run_components(&config.metrics.address, &config.global, "profile", move || {
        profiles
    })
    .await
    .context(SetupSnafu)
}

async fn drain(config: &Config, name: Option<&str>) -> Result<(), CliError> {
    let mut reports = serde_json::Map::new();

    for (key, profile_config) in config.select(name).context(ConfigSnafu)? {
        let profile = Profile::open(key.clone(), profile_config)
            .await
            .context(ProfileSnafu)?;
        let report = profile.engine().drain().await.context(DeliverySnafu)?;

        let mut notices = tally::SyncNotices::default();
        notices.drain_finished(&report);
        for notice in notices.visible() {
            info!(target = %key, "{}", notice.message());
        }

        reports.insert(key.to_string(), to_value(&report)?);
    }

    print_json(&reports)
}

async fn status(config: &Config, name: Option<&str>) -> Result<(), CliError> {
    let mut statuses = serde_json::Map::new();

    // Reads the store directly so a running host's syncing flag is left alone
    for (key, profile_config) in config.select(name).context(ConfigSnafu)? {
        let store = open_store(key, profile_config).await?;
        let status = StatusTracker::new(store).current().await;
        statuses.insert(key.to_string(), to_value(&status)?);
    }

    print_json(&statuses)
}

async fn enqueue(config: &Config, name: &str, file: &Path) -> Result<(), CliError> {
    let (key, profile_config) = config.profile(name).context(ConfigSnafu)?;
    let payload = read_payload(file)?;

    let store = open_store(key, profile_config).await?;
    let queue = ResultQueue::new(store.clone(), StatusTracker::new(store));
    let id = queue
        .enqueue(payload)
        .await
        .context(QueueResultSnafu { profile: key.id() })?;

    print_json(&json!({ "profile": key.id(), "id": id }))
}

async fn submit(config: &Config, name: &str, file: &Path) -> Result<(), CliError> {
    let (key, profile_config) = config.profile(name).context(ConfigSnafu)?;
    let payload = read_payload(file)?;

    let profile = Profile::open(key.clone(), profile_config)
        .await
        .context(ProfileSnafu)?;
    let outcome = profile
        .engine()
        .submit(payload)
        .await
        .context(DeliverySnafu)?;

    let output = match outcome {
        SubmitOutcome::Delivered => json!({ "profile": key.id(), "outcome": "delivered" }),
        SubmitOutcome::Queued(id) => {
            json!({ "profile": key.id(), "outcome": "queued", "id": id })
        }
    };
    print_json(&output)
}

async fn open_store(
    key: &tally::ProfileKey,
    config: &tally::ProfileConfig,
) -> Result<RecordStore, CliError> {
    let store = RecordStore::open(&config.store.path, key.clone())
        .await
        .context(OpenStoreSnafu { profile: key.id() })
        .context(ProfileSnafu)?;
    Ok(store.with_dead_letter_limit(config.delivery.dead_letter_limit))
}

fn read_payload(file: &Path) -> Result<ResultPayload, CliError> {
    let path = file.display().to_string();
    let contents = std::fs::read_to_string(file).context(ReadPayloadSnafu { path: &path })?;
    serde_json::from_str(&contents).context(ParsePayloadSnafu { path })
}

fn to_value<T: Serialize>(value: &T) -> Result<serde_json::Value, CliError> {
    serde_json::to_value(value).context(RenderSnafu)
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value).context(RenderSnafu)?;
    println!("{rendered}");
    Ok(())
}
