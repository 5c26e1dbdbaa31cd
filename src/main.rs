//! imgapi - a public image repository server.
//!
//! This binary loads the configuration and starts the HTTP server.

use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use imgapi::{
    config::{CheckConfig, Cli, Command, ServeConfig},
    server::{create_router, RouterConfig},
    store::FsImageStore,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Serve(config) => run_serve(config).await,
        Command::Check(config) => run_check(config).await,
    }
}

// =============================================================================
// Serve Command
// =============================================================================

async fn run_serve(config: ServeConfig) -> ExitCode {
    init_logging(config.verbose);

    let resolved = match config.resolve() {
        Ok(resolved) => resolved,
        Err(e) => {
            error!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let datadir = resolved.context.datadir().to_path_buf();
    if let Err(e) = tokio::fs::create_dir_all(&datadir).await {
        error!("Failed to create {}: {}", datadir.display(), e);
        return ExitCode::FAILURE;
    }

    info!("imgapi v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration:");
    info!("  Data directory: {}", datadir.display());
    info!("  Users: {}", resolved.context.userdb().len());
    info!("  Channels: {}", resolved.context.channels().len());

    if resolved.context.userdb().is_empty() {
        warn!("  No users configured - the repository is read-only");
    }

    let mut router_config = RouterConfig::default().with_tracing(!config.no_tracing);
    if let Some(ref origins) = config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }

    let router = create_router(resolved.context, FsImageStore::new(), router_config);

    let addr = config.bind_address(resolved.port);
    info!("Server listening on: http://{}", addr);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = axum::serve(listener, router).await {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "imgapi=debug,tower_http=debug"
    } else {
        "imgapi=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

// =============================================================================
// Check Command
// =============================================================================

async fn run_check(config: CheckConfig) -> ExitCode {
    println!("imgapi Configuration Check");
    println!("══════════════════════════");
    println!();

    let resolved = match config.resolve() {
        Ok(resolved) => {
            println!("✓ Configuration loaded");
            resolved
        }
        Err(e) => {
            println!("✗ Configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let datadir = resolved.context.datadir();
    println!("✓ Port: {}", resolved.port);
    println!("✓ Users: {}", resolved.context.userdb().len());

    if !datadir.is_dir() {
        println!("✗ Data directory: {} does not exist", datadir.display());
        return ExitCode::FAILURE;
    }
    println!("✓ Data directory: {}", datadir.display());

    let images = match FsImageStore::new().load_all(datadir).await {
        Ok(images) => images,
        Err(e) => {
            println!("✗ Failed to read images: {}", e);
            return ExitCode::FAILURE;
        }
    };
    println!("✓ Images: {}", images.len());

    if config.list_images {
        println!();
        for image in &images {
            println!(
                "  {}  {} {} ({})",
                image.uuid,
                image.name,
                image.version,
                image.state.as_str()
            );
        }
    }

    println!();
    println!("══════════════════════════");
    println!("✓ All checks passed!");

    ExitCode::SUCCESS
}
