//! pixcache - command-line front end for the image cache.

use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pixcache::{
    config::{Cli, Command, ProcessArgs},
    ImageCacheService,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    if let Err(e) = cli.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let config = cli.store_config();
    info!("Cache directory: {}", config.cache_dir.display());
    let service = ImageCacheService::new(config);

    let code = match &cli.command {
        Command::Process(args) => run_process(&service, args).await,
        Command::Base64 { uri } => run_base64(&service, uri).await,
        Command::Clear { disk } => run_clear(&service, *disk).await,
        Command::Check { uri } => run_check(&service, uri).await,
    };

    if cli.verbose {
        info!("{}", service.cache_stats().await);
    }

    code
}

/// Initialize the tracing/logging subsystem.
///
/// Logs go to stderr so command output on stdout stays machine-readable.
fn init_logging(verbose: bool) {
    let env_filter = if verbose { "pixcache=debug" } else { "pixcache=info" };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

// =============================================================================
// Commands
// =============================================================================

async fn run_process(service: &ImageCacheService, args: &ProcessArgs) -> ExitCode {
    let spec = match args.spec() {
        Ok(spec) => spec,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let image = match service.process_image(args.uri.as_str(), &spec).await {
        Ok(image) => image,
        Err(e) => {
            error!("Failed to process {}: {}", args.uri, e);
            return ExitCode::FAILURE;
        }
    };

    match serde_json::to_string_pretty(&image) {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Failed to serialize result: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_base64(service: &ImageCacheService, uri: &str) -> ExitCode {
    match service.image_to_base64(uri).await {
        Ok(payload) => {
            println!("{}", payload);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Failed to encode {}: {}", uri, e);
            ExitCode::FAILURE
        }
    }
}

async fn run_clear(service: &ImageCacheService, disk: bool) -> ExitCode {
    match service.clear(disk).await {
        Ok(()) => {
            if disk {
                info!("Cleared memory and disk cache");
            } else {
                info!("Cleared memory cache");
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Failed to clear cache: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_check(service: &ImageCacheService, uri: &str) -> ExitCode {
    let Some(reference) = service.normalizer().normalize(uri) else {
        println!("✗ Invalid reference: {:?}", uri);
        return ExitCode::FAILURE;
    };
    println!("Reference: {}", reference);

    if service.exists(uri).await {
        println!("✓ exists");
        ExitCode::SUCCESS
    } else {
        println!("✗ not found");
        ExitCode::FAILURE
    }
}
