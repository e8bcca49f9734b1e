use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::{AppState, router};
use assist_core::{
    AssistConfig, CachedUserDirectory, ConfigSources, ContainerMessageHandler, LaunchOrchestrator,
    PatientContextStore,
};
use smart_client::{HttpContextBridge, HttpUserDirectory, SmartAuthorizer};

/// Main entry point for the AI Assist launch service
///
/// Resolves configuration once, wires the SMART collaborators into the launch orchestrator and
/// serves the REST surface.
///
/// # Environment Variables
/// - `AI_ASSIST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `AI_ASSIST_CONFIG_FILE`: optional JSON file of injected runtime settings
/// - `AUTH_CLIENT_ID`, `AUTH_SCOPES`, `SMART_CONTAINER_URL`: required launch settings
/// - `RUST_LOG`: log filter (default directive `ai_assist=info`)
///
/// # Errors
/// Returns an error if configuration is missing or invalid, the HTTP client cannot be built, or
/// the server cannot bind or fails while running.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ai_assist=info".parse()?)
                .add_directive("assist_core=info".parse()?)
                .add_directive("smart_client=info".parse()?)
                .add_directive("api_rest=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut sources = ConfigSources::from_process_env();
    if let Some(path) = std::env::var_os("AI_ASSIST_CONFIG_FILE").map(PathBuf::from) {
        tracing::info!("-- Loading runtime config from {}", path.display());
        sources = sources.with_injected_file(&path)?;
    }
    let config = Arc::new(AssistConfig::resolve(&sources)?);

    let addr: SocketAddr = std::env::var("AI_ASSIST_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:3000".into())
        .parse()?;

    tracing::info!(
        host_env = config.host_env(),
        runtime_mode = ?config.runtime_mode(),
        pkce_mode = %config.pkce_mode(),
        "++ Starting AI Assist launch service on {}",
        addr
    );

    let http = smart_client::http_client()?;
    let authorizer = Arc::new(SmartAuthorizer::new(http.clone()));
    let bridge = Arc::new(HttpContextBridge::new(
        http.clone(),
        config.smart_container_url(),
    )?);

    let mut orchestrator = LaunchOrchestrator::new(
        config.clone(),
        authorizer.clone(),
        bridge,
        PatientContextStore::new(),
    );
    if let Some(api_url) = config.api_url() {
        let users = HttpUserDirectory::new(http.clone(), api_url)?;
        orchestrator = orchestrator.with_user_directory(Arc::new(CachedUserDirectory::new(users)));
    }

    let messages = Arc::new(ContainerMessageHandler::new(
        config.app_base_url().clone(),
        authorizer.clone(),
    ));
    let app = router(AppState::new(Arc::new(orchestrator), authorizer, messages));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        return;
    }
    tracing::info!("-- Shutting down AI Assist launch service");
}
