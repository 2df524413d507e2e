use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::Local;
use clap::Parser;
use log::{error, info, warn, LevelFilter};
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

use rust_s3_archiver::archive::{run_archive_job, ArchiveRequest};
use rust_s3_archiver::cli::{Args, Commands};
use rust_s3_archiver::cloud::client::create_s3_client;
use rust_s3_archiver::cloud::endpoint::Destination;
use rust_s3_archiver::cloud::s3::S3Storage;
use rust_s3_archiver::config::{expand_env_vars, UploadConfig};
use rust_s3_archiver::upload::progress::ProgressReporter;
use rust_s3_archiver::upload::UploadPipeline;

fn main() -> Result<()> {
    let args = Args::parse();

    initialize_logging(args.verbose)?;

    if let Some(cmd) = &args.command {
        return handle_subcommand(cmd);
    }

    let config = load_config(&args)?;
    let request = build_request(&args)?;

    let runtime = Runtime::new().context("Failed to create Tokio runtime")?;
    runtime.block_on(run(&args, config, request))
}

/// Initialize logging with the specified verbosity level
fn initialize_logging(verbose: bool) -> Result<()> {
    let log_level = if verbose { LevelFilter::Debug } else { LevelFilter::Info };
    TermLogger::init(
        log_level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )
    .context("Failed to initialize logger")?;
    Ok(())
}

fn handle_subcommand(cmd: &Commands) -> Result<()> {
    match cmd {
        Commands::InitConfig { path } => {
            info!("Creating default configuration file at {}", path.display());
            UploadConfig::default().save_to_yaml_file(path)?;
            Ok(())
        }
    }
}

/// Config file (or defaults) with command-line overrides applied
fn load_config(args: &Args) -> Result<UploadConfig> {
    let mut config = UploadConfig::load_or_default(args.config.as_deref())?;
    args.apply_overrides(&mut config);
    config.validate().context("Invalid upload configuration")?;
    Ok(config)
}

fn build_request(args: &Args) -> Result<ArchiveRequest> {
    let source_bucket = args
        .source_bucket
        .clone()
        .ok_or_else(|| anyhow!("--source-bucket is required"))?;
    let dest_bucket = args.dest_bucket.clone().unwrap_or_else(|| source_bucket.clone());

    let dest_key = match &args.dest_key {
        Some(template) => expand_env_vars(template),
        None => format!("archive-{}.zip", Local::now().format("%Y%m%d_%H%M%S")),
    };
    if dest_key.is_empty() {
        return Err(anyhow!("Destination key is empty"));
    }

    Ok(ArchiveRequest {
        source_bucket,
        source_prefix: args.prefix.clone(),
        destination: Destination::new(dest_bucket, dest_key),
        compression: args.compression.into(),
        skip_empty: args.skip_empty,
    })
}

async fn run(args: &Args, config: UploadConfig, request: ArchiveRequest) -> Result<()> {
    let client = create_s3_client(args.region.as_deref(), args.profile.as_deref())?;
    let storage = Arc::new(S3Storage::new(client));

    let pipeline = UploadPipeline::new(Arc::clone(&storage), config.to_pipeline_config());

    let cancel = pipeline.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, aborting upload");
            cancel.cancel();
        }
    });

    let done = CancellationToken::new();
    let progress = ProgressReporter::new(pipeline.stats(), config.progress_interval())
        .start_tracking(done.clone());

    let result = run_archive_job(storage.as_ref(), storage.as_ref(), pipeline, &request).await;

    done.cancel();
    if let Err(e) = progress.await {
        warn!("Progress reporter failed: {}", e);
    }

    match result {
        Ok(Some(report)) => {
            info!(
                "Created {} ({} bytes, {} parts, {} retries)",
                request.destination, report.bytes, report.parts, report.retries
            );
            Ok(())
        }
        Ok(None) => {
            info!("Nothing to archive");
            Ok(())
        }
        Err(e) => {
            error!("Archive job failed: {:#}", e);
            Err(e)
        }
    }
}
