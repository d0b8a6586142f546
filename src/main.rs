use anyhow::{Context, Result};
use discord_translation_relay::config::Config;
use discord_translation_relay::discord::{self, SerenityGateway};
use discord_translation_relay::events::EventHub;
use discord_translation_relay::gateway::Gateway;
use discord_translation_relay::service::TranslatorService;
use discord_translation_relay::translation::{LibreTranslateClient, TranslationBackend};
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (ignored when variables come from the environment)
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("discord_translation_relay=info".parse()?),
        )
        .init();

    info!("Starting Discord translation relay");

    // Load configuration from environment
    let config = Config::from_env()?;
    info!(
        api = %config.translation_api_url,
        category = %config.constants.category_name,
        standard_language = %config.constants.standard_language,
        "Configuration loaded"
    );

    let backend: Arc<dyn TranslationBackend> = Arc::new(LibreTranslateClient::from_config(&config)?);

    let hub = Arc::new(EventHub::new());
    let mut client = discord::build_client(&config.discord_token, Arc::clone(&hub)).await?;
    let gateway: Arc<dyn Gateway> = Arc::new(SerenityGateway::from_client(&client));

    let service = TranslatorService::new(&config, gateway, backend);
    service.start(&hub).await;

    let shard_manager = Arc::clone(&client.shard_manager);
    let outcome = tokio::select! {
        result = client.start() => result.context("Discord client stopped unexpectedly"),
        signal = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
            signal.context("Failed to listen for shutdown signal")
        }
    };

    service.stop(&hub);
    shard_manager.shutdown_all().await;

    if let Err(e) = &outcome {
        error!("Relay exited with error: {:#}", e);
    }
    info!("Shutdown complete");
    outcome
}
