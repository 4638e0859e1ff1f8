use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use forge_core::services::{ArkModelClient, GeminiClient};
use forge_core::{
    load_config, validate_config, AssociationService, BatchConfig, BatchManager, PipelineConfig,
    PipelineRunner,
};

use forge_server::{create_router, AppState};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(version = VERSION, "Starting forge");

    // Determine config path
    let config_path = std::env::var("FORGE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    validate_config(&config).context("Configuration validation failed")?;

    let mut runner = PipelineRunner::new(PipelineConfig::from(&config));
    let mut associations: Option<Arc<dyn AssociationService>> = None;

    if let Some(ref gemini) = config.services.gemini {
        let client = Arc::new(
            GeminiClient::new(gemini).context("Failed to create Gemini client")?,
        );
        info!(
            prompt_model = %gemini.prompt_model,
            image_model = %gemini.image_model,
            "Gemini prompt, image and association services enabled"
        );
        associations = Some(client.clone());
        runner = runner
            .with_prompt_service(client.clone())
            .with_image_service(client);
    } else {
        info!("Gemini not configured, prompt, image and association services unavailable");
    }

    if let Some(ref ark) = config.services.ark {
        let client = ArkModelClient::new(ark).context("Failed to create Ark client")?;
        info!(model = %ark.model, "Ark 3D service enabled");
        runner = runner.with_model_service(Arc::new(client));
    } else {
        info!("Ark not configured, 3D service unavailable");
    }

    let runner = Arc::new(runner);
    let batches = BatchManager::new(BatchConfig::from(&config), Arc::clone(&runner));

    info!(
        output_dir = %config.output.dir.display(),
        batch_dir = %config.output.batch_dir.display(),
        max_parallel = config.batch.max_parallel,
        "Output configured"
    );

    let mut state = AppState::new(config.clone(), runner, batches);
    if let Some(service) = associations {
        state = state.with_association_service(service);
    }
    let state = Arc::new(state);
    let app = create_router(state);

    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutting down...");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
