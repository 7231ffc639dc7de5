use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::commons::{ObjectStore, S3ObjectStore};
use crate::config::Settings;
use crate::models::{ApiResponse, CreateJobRequest, JobAccepted};
use crate::services::duplicate_detector::{
    find_duplicates, find_similar_remote, generate_report, DEFAULT_CACHE_FILE,
    DEFAULT_MAX_LISTED_OBJECTS,
};
use crate::services::{
    DuplicateDetector, ExtensionFilter, IngestService, KeyBuilder, Producer, UploadConfig,
    UploadService,
};
use crate::workers::{JobQueue, MainWorker, Scope, WorkerConfig};

mod commons;
mod config;
mod controllers;
mod models;
mod services;
mod workers;

#[derive(Parser, Debug)]
#[command(name = "hma-ingest")]
#[command(author, version, about = "Concurrent document ingestion into S3")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP ingress with a long-lived worker pool
    Serve,

    /// Upload every file under a directory and exit
    Upload {
        /// Input directory
        #[arg(short, long)]
        input: PathBuf,

        /// Target scope (mba, policy, or auto to follow the directory layout)
        #[arg(short, long)]
        scope: String,

        /// Comma-separated extensions to include
        #[arg(long, default_value = "")]
        include: String,

        /// Comma-separated extensions to exclude
        #[arg(long, default_value = "")]
        exclude: String,

        /// Number of concurrent upload workers
        #[arg(short, long, env = "WORKER_CONCURRENCY")]
        concurrency: Option<usize>,

        /// Upload even when the destination already holds identical content
        #[arg(long)]
        no_skip_identical: bool,
    },

    /// Submit one file to a running server
    Submit {
        /// Local path of the file, as seen by the server
        #[arg(short, long)]
        path: String,

        /// Target scope (mba or policy)
        #[arg(short, long)]
        scope: String,

        /// Base URL of the server
        #[arg(long, env = "HMA_INGEST_SERVER", default_value = "http://127.0.0.1:8080")]
        server: String,
    },

    /// Report files with identical content under a directory
    CheckDuplicates {
        /// Input directory
        #[arg(short, long)]
        input: PathBuf,

        /// Hash cache file
        #[arg(long, default_value = DEFAULT_CACHE_FILE)]
        cache: PathBuf,

        /// Only scan the top level of the directory
        #[arg(long)]
        no_recursive: bool,

        /// List copies of this file found under the input directory instead of a full report
        #[arg(long)]
        file: Option<PathBuf>,

        /// Also list objects in this scope's bucket with the same name or size as --file
        #[arg(long, requires = "file")]
        scope: Option<String>,

        /// Maximum number of remote objects to list
        #[arg(long, default_value_t = DEFAULT_MAX_LISTED_OBJECTS)]
        max_files: usize,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenv::dotenv().ok();

    // Initialize tracing with JSON format
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve => serve().await,
        Command::Upload {
            input,
            scope,
            include,
            exclude,
            concurrency,
            no_skip_identical,
        } => {
            let mut worker_config = WorkerConfig::from_env()?;
            if let Some(concurrency) = concurrency {
                worker_config.worker_concurrency = concurrency.max(1);
            }
            if no_skip_identical {
                worker_config.upload_skip_if_identical = false;
            }
            let filter = ExtensionFilter::from_lists(&include, &exclude);
            upload(input, &scope, filter, worker_config).await
        }
        Command::Submit {
            path,
            scope,
            server,
        } => submit(path, scope, &server).await,
        Command::CheckDuplicates {
            input,
            cache,
            no_recursive,
            file,
            scope,
            max_files,
        } => {
            check_duplicates(&input, cache, !no_recursive, file.as_deref())?;
            match (file, scope) {
                (Some(file), Some(scope)) => check_remote_similar(&file, &scope, max_files).await,
                _ => Ok(ExitCode::SUCCESS),
            }
        }
    }
}

async fn build_upload_service(settings: &Settings, worker_config: &WorkerConfig) -> Arc<UploadService> {
    let store: Arc<dyn ObjectStore> = Arc::new(S3ObjectStore::new(settings).await);
    Arc::new(UploadService::new(
        store,
        UploadConfig::new(worker_config, settings),
    ))
}

async fn serve() -> Result<ExitCode> {
    let settings = Settings::from_env().context("Failed to load settings")?;
    let worker_config = WorkerConfig::from_env().context("Failed to load worker configuration")?;
    info!("Worker configuration loaded successfully");

    let queue = Arc::new(JobQueue::with_capacity(worker_config.queue_capacity()));
    let key_builder = Arc::new(KeyBuilder::new(&settings));
    let upload_service = build_upload_service(&settings, &worker_config).await;

    let mut main_worker = MainWorker::new(worker_config, queue.clone(), upload_service);
    main_worker.start().await?;
    info!("Upload Worker System started successfully");

    let ingest = web::Data::new(IngestService::new(queue, key_builder));

    info!("Setting up API server");
    let server = HttpServer::new(move || {
        App::new()
            .app_data(ingest.clone())
            .service(controllers::jobs::create_job)
            .service(controllers::jobs::health)
            .service(controllers::jobs::stats)
    })
    .disable_signals()
    .bind((settings.host.as_str(), settings.port))?
    .run();

    // Ctrl-C only stops the server; the workers drain once it has exited for any reason
    let server_handle = server.handle();
    let signal_task = tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received, starting graceful shutdown");
                server_handle.stop(true).await;
                info!("HTTP server stopped");
            }
            Err(e) => warn!("Error waiting for interrupt signal: {}", e),
        }
    });

    info!("API server starting at {}:{}", settings.host, settings.port);
    let result = main_worker.run_until(server).await;
    signal_task.abort();
    result?;

    info!("Graceful shutdown completed");
    Ok(ExitCode::SUCCESS)
}

async fn upload(
    input: PathBuf,
    scope: &str,
    filter: ExtensionFilter,
    worker_config: WorkerConfig,
) -> Result<ExitCode> {
    let settings = Settings::from_env().context("Failed to load settings")?;

    // Every job is enqueued before workers start, so the batch queue is unbounded
    let queue = Arc::new(JobQueue::unbounded());
    let key_builder = Arc::new(KeyBuilder::new(&settings));

    let report = Producer::new(queue.clone(), key_builder)
        .enqueue_directory(&input, scope, &filter)
        .await?;
    if report.enqueued == 0 {
        warn!("No files found to upload in {}", input.display());
        return Ok(ExitCode::SUCCESS);
    }

    let upload_service = build_upload_service(&settings, &worker_config).await;
    let mut main_worker = MainWorker::new(worker_config, queue.clone(), upload_service).drain_once();
    main_worker.start().await?;
    main_worker.join().await?;

    let stats = queue.stats();
    let metrics = main_worker.metrics();
    println!("Upload summary for {} (scope {})", input.display(), scope);
    println!("  discovered:         {}", report.discovered);
    println!("  enqueued:           {}", report.enqueued);
    println!("  processed:          {}", stats.processed);
    println!(
        "  skipped duplicates: {}",
        metrics.duplicates_skipped.load(Ordering::Relaxed)
    );
    println!("  failed:             {}", stats.failed);

    if stats.failed > 0 {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

async fn submit(path: String, scope: String, server: &str) -> Result<ExitCode> {
    let url = format!("{}/jobs", server.trim_end_matches('/'));
    let response = reqwest::Client::new()
        .post(&url)
        .json(&CreateJobRequest { path, scope })
        .send()
        .await
        .with_context(|| format!("Failed to reach {}", url))?;

    let status = response.status();
    let body: ApiResponse<JobAccepted> = response
        .json()
        .await
        .with_context(|| format!("Unexpected response from {} ({})", url, status))?;

    match (body.success, body.data, body.errors) {
        (true, Some(accepted), _) => {
            println!("Job {} accepted for {}", accepted.job_id, accepted.destination);
            Ok(ExitCode::SUCCESS)
        }
        (_, _, errors) => {
            for error in errors.unwrap_or_default() {
                println!("Rejected ({}): {} [{}]", status, error.cause, error.code);
            }
            Ok(ExitCode::FAILURE)
        }
    }
}

fn check_duplicates(
    input: &Path,
    cache: PathBuf,
    recursive: bool,
    file: Option<&Path>,
) -> Result<ExitCode> {
    let mut detector = DuplicateDetector::new(cache);

    if let Some(file) = file {
        let copies = detector.check_local_duplicate(file, &[input.to_path_buf()])?;
        if copies.is_empty() {
            println!("No local duplicates of {}", file.display());
        }
        for copy in copies {
            println!("{}", copy.display());
        }
        return Ok(ExitCode::SUCCESS);
    }

    let groups = detector.scan_directory(input, recursive)?;
    let duplicates = find_duplicates(&groups);
    println!("{}", generate_report(&duplicates, Some(input)));
    Ok(ExitCode::SUCCESS)
}

async fn check_remote_similar(file: &Path, scope: &str, max_files: usize) -> Result<ExitCode> {
    let scope: Scope = scope.parse()?;
    let settings = Settings::from_env().context("Failed to load settings")?;
    let key_builder = KeyBuilder::new(&settings);
    let store = S3ObjectStore::new(&settings).await;

    let bucket = key_builder.bucket(scope);
    let prefix = key_builder.prefix(scope);
    let similar = find_similar_remote(&store, file, bucket, &prefix, max_files).await?;

    if similar.is_empty() {
        println!("No similar objects in s3://{}/{}", bucket, prefix);
    }
    for entry in similar {
        println!(
            "s3://{}/{} ({} bytes, {})",
            bucket,
            entry.object.key,
            entry.object.size,
            entry.similarity.as_str()
        );
    }
    Ok(ExitCode::SUCCESS)
}
