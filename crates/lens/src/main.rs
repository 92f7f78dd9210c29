mod config;
mod telemetry;

use clap::{Parser, Subcommand};
use config::{Config, ConfigError};
use lens_core::error::{QueueError, StoreError};
use lens_core::{Analyzer, JobSource, KvStore, TaskLifecycle, TaskQueue};
use lens_db::{RedisStore, SqliteStore};
use lens_serve::AppState;
use lens_serve::github::{GithubClient, InvalidApiUrl};
use lens_worker::{Executor, OllamaGenerator, RedisQueue, WorkerGroup};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

/// How long an idle worker waits before polling the queue again.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Parser)]
#[command(name = "lens", about = "Asynchronous pull request analysis")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API together with an embedded worker pool.
    Serve {
        /// Overrides LENS_WORKERS.
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Run a standalone worker pool against the Redis queue.
    Worker {
        /// Overrides LENS_WORKERS.
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Print the OpenAPI document.
    Openapi,
}

#[derive(Debug, Error)]
enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("store: {0}")]
    Store(#[from] StoreError),
    #[error("queue: {0}")]
    Queue(#[from] QueueError),
    #[error(transparent)]
    ApiUrl(#[from] InvalidApiUrl),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let (workers, standalone) = match cli.command {
        Command::Openapi => {
            println!("{}", lens_serve::openapi::generate_spec());
            return ExitCode::SUCCESS;
        }
        Command::Serve { workers } => (workers, false),
        Command::Worker { workers } => (workers, true),
    };

    let config = match load_config(workers) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("lens: {err}");
            return ExitCode::FAILURE;
        }
    };
    telemetry::init(&config.log);

    let result = if standalone {
        run_worker(config).await
    } else {
        run_serve(config).await
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "exiting");
            ExitCode::FAILURE
        }
    }
}

fn load_config(workers: Option<usize>) -> Result<Config, ConfigError> {
    let mut config = Config::from_env()?;
    if let Some(workers) = workers {
        config.workers = workers;
        config.validate()?;
    }
    Ok(config)
}

async fn open_store(config: &Config) -> Result<Arc<dyn KvStore>, AppError> {
    if let Some(url) = config.redis_url.as_deref() {
        info!("using redis task store");
        return Ok(Arc::new(RedisStore::connect(url).await?));
    }
    if let Some(parent) = config.db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let path = config.db_path.to_string_lossy();
    info!(path = %path, "using sqlite task store");
    Ok(Arc::new(SqliteStore::open(&path)?))
}

fn executor(config: &Config, lifecycle: TaskLifecycle) -> Executor {
    let generator = OllamaGenerator::new(config.ollama_url.clone(), config.ollama_model.clone());
    info!(url = %config.ollama_url, model = generator.model(), "text generation backend");
    Executor::new(lifecycle, Analyzer::new(Arc::new(generator)))
}

async fn run_serve(config: Config) -> Result<(), AppError> {
    let lifecycle = TaskLifecycle::new(open_store(&config).await?);

    let (queue, source): (Arc<dyn TaskQueue>, Arc<dyn JobSource>) = match &config.redis_url {
        Some(url) => {
            let queue = RedisQueue::connect(url, config.queue_key.clone()).await?;
            (Arc::new(queue.clone()), Arc::new(queue))
        }
        None => {
            let (queue, source) = lens_worker::channel(config.queue_capacity);
            (Arc::new(queue), Arc::new(source))
        }
    };
    let workers = WorkerGroup::spawn(
        config.workers,
        source,
        executor(&config, lifecycle.clone()),
        POLL_INTERVAL,
    );

    let diffs = GithubClient::new(&config.github_api_url)?
        .with_default_token(config.github_token.clone());
    let state = AppState {
        lifecycle,
        queue,
        diffs: Arc::new(diffs),
        repo_host: config.github_host.clone(),
    };

    let served = lens_serve::serve(state, config.addr(), shutdown_signal()).await;
    info!(workers = workers.len(), "stopping workers");
    workers.shutdown_and_join().await;
    Ok(served?)
}

async fn run_worker(config: Config) -> Result<(), AppError> {
    let Some(url) = config.redis_url.as_deref() else {
        return Err(ConfigError::Invalid {
            name: "REDIS_URL",
            reason: "standalone workers need the shared redis queue".to_string(),
        }
        .into());
    };
    if config.workers == 0 {
        return Err(ConfigError::Invalid {
            name: "LENS_WORKERS",
            reason: "must be at least 1".to_string(),
        }
        .into());
    }

    let lifecycle = TaskLifecycle::new(open_store(&config).await?);
    let queue = RedisQueue::connect(url, config.queue_key.clone()).await?;
    info!(key = queue.key(), "consuming queue");
    let workers = WorkerGroup::spawn(
        config.workers,
        Arc::new(queue),
        executor(&config, lifecycle),
        POLL_INTERVAL,
    );

    shutdown_signal().await;
    workers.shutdown_and_join().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "could not listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
