//! Postroom - email ingestion and attachment processing pipeline.
//!
//! Each run is one stateless invocation: a sync pass or a single queue
//! drain, matching the externally-scheduled model. Coordination with
//! concurrent invocations happens through the shared store's leases.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use postroom_core::{
    GraphqlRecordStore, HttpObjectStorage, ImapMailSource, PipelineConfig, RetryPolicy,
    SqliteQueue, SqliteStore, TriggerAuth, TriggerResponse, TriggerService,
};

/// Parsed command line.
struct Invocation {
    command: Command,
    config_path: Option<PathBuf>,
    token: Option<String>,
}

enum Command {
    Sync { refresh: bool },
    Drain,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "postroom=info,postroom_core=info,postroom_imap=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let invocation = parse_args()?;
    let config = load_config(invocation.config_path.as_deref())?;

    info!("Starting postroom invocation");

    let store = SqliteStore::new(&config.database_path)
        .await
        .context("failed to open the pipeline database")?;
    let queue = SqliteQueue::from_pool(store.pool().clone())
        .await
        .context("failed to initialize the work queue")?;
    let mail = ImapMailSource::new(&config.mailbox);
    let records = GraphqlRecordStore::new(
        config.record_store.endpoint.clone(),
        config.record_store.api_token.clone(),
    );
    let storage = HttpObjectStorage::new(
        config.storage.endpoint.clone(),
        config.storage.api_token.clone(),
        config.storage.placeholder_domains.clone(),
    );

    let service = TriggerService::new(
        TriggerAuth::new(config.trigger.shared_secret.clone()),
        store,
        queue,
        mail,
        records,
        storage,
        config.sync.clone(),
        config.attachments.clone(),
        RetryPolicy::default(),
    );

    let token = invocation
        .token
        .or_else(|| std::env::var("POSTROOM_TRIGGER_TOKEN").ok());
    let token = token.as_deref();

    let response = match invocation.command {
        Command::Sync { refresh } => service.trigger_sync(token, refresh).await,
        Command::Drain => service.drain_one(token).await,
    };

    println!("{}", serde_json::to_string_pretty(&response)?);

    Ok(match response {
        TriggerResponse::Unauthorized | TriggerResponse::Fatal { .. } => ExitCode::FAILURE,
        _ => ExitCode::SUCCESS,
    })
}

/// Parses the minimal command surface: `sync [--refresh]` or `drain`,
/// plus `--config <path>` and `--token <secret>`.
fn parse_args() -> Result<Invocation> {
    let mut args = std::env::args().skip(1);
    let Some(command) = args.next() else {
        bail!("usage: postroom <sync [--refresh] | drain> [--config <path>] [--token <secret>]");
    };

    let mut refresh = false;
    let mut config_path = None;
    let mut token = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--refresh" => refresh = true,
            "--config" => {
                config_path = Some(PathBuf::from(
                    args.next().context("--config requires a path")?,
                ));
            }
            "--token" => {
                token = Some(args.next().context("--token requires a value")?);
            }
            other => bail!("unknown argument: {other}"),
        }
    }

    let command = match command.as_str() {
        "sync" => Command::Sync { refresh },
        "drain" => Command::Drain,
        other => bail!("unknown command: {other}"),
    };

    Ok(Invocation {
        command,
        config_path,
        token,
    })
}

/// Loads the pipeline config from the given path or the default location.
fn load_config(path: Option<&std::path::Path>) -> Result<PipelineConfig> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => dirs::config_dir()
            .context("no config directory on this platform")?
            .join("postroom")
            .join("config.json"),
    };

    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config from {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("invalid config in {}", path.display()))
}
