//! Tenantline application binary - composition root.
//!
//! Ties together all Tenantline crates into a single executable:
//! 1. Load configuration from TOML
//! 2. Load the property registry and start the refresh loop
//! 3. Build the dialogue controller and call manager
//! 4. Start the axum REST API server, or replay a transcript with `--replay`

mod cli;
mod replay;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tenantline_api::{start_server, AppState};
use tenantline_core::config::TenantlineConfig;
use tenantline_dialogue::{CallManager, DialogueController, LocalTicketService, LogNotifier};
use tenantline_registry::feed::refresh_once;
use tenantline_registry::{spawn_refresh, JsonFileFeed, PropertyIndex, RegistryFeed};

use cli::CliArgs;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config.
    let config_file = args.resolve_config_path();
    let config = TenantlineConfig::load_or_default(&config_file);

    // Tracing.
    let level = args.resolve_log_level(&config.general.log_level);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&level)),
        )
        .init();

    tracing::info!("Starting Tenantline v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(path = %config_file.display(), "Configuration resolved");

    // Registry.
    let index = Arc::new(PropertyIndex::new(config.registry.street_similarity_threshold));
    let feed: Option<Arc<dyn RegistryFeed>> = args
        .resolve_registry_path(config.registry.feed_path.as_deref())
        .map(|path| Arc::new(JsonFileFeed::new(path)) as Arc<dyn RegistryFeed>);

    match &feed {
        Some(feed) => {
            match refresh_once(feed.as_ref(), &index).await {
                Ok(properties) => tracing::info!(feed = feed.name(), properties, "Registry loaded"),
                Err(e) => {
                    tracing::warn!(feed = feed.name(), error = %e, "Registry load failed, every address will be unverified")
                }
            }
            if config.registry.refresh_secs > 0 && args.replay.is_none() {
                spawn_refresh(
                    Arc::clone(feed),
                    Arc::clone(&index),
                    Duration::from_secs(config.registry.refresh_secs),
                );
            }
        }
        None => tracing::warn!("No registry feed configured, every address will be unverified"),
    }

    // Dialogue.
    let controller = DialogueController::from_config(Arc::clone(&index), &config);
    let manager = CallManager::new(
        controller,
        Arc::new(LocalTicketService::new(config.collaborators.ticket_prefix.clone())),
        Arc::new(LogNotifier),
        &config.collaborators,
    );

    if let Some(path) = &args.replay {
        let lines = replay::load_transcript(path)?;
        tracing::info!(path = %path.display(), lines = lines.len(), "Replaying transcript");
        let settle = Duration::from_secs(config.collaborators.ticket_timeout_secs.max(1));
        let summary = replay::run(&manager, &lines, args.caller_id.clone(), settle).await?;
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    // API server.
    let port = args.resolve_port(config.general.port);
    let state = AppState::new(config, manager, feed);
    start_server(port, state).await?;

    Ok(())
}
