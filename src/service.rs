use crate::commands::CommandHandler;
use crate::config::{Config, TranslationConstants};
use crate::events::{EventHub, EventKind, GatewayEvents, SubscriptionId};
use crate::gateway::{Gateway, GuildId};
use crate::provisioner::{PairProvisioner, ProvisionError};
use crate::registry::{ChannelPair, ChannelPairRegistry};
use crate::relay::RelayDispatcher;
use crate::translation::TranslationBackend;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Wires the registry, relay and command handling together and owns their
/// gateway subscriptions between `start` and `stop`.
pub struct TranslatorService {
    registry: Arc<ChannelPairRegistry>,
    provisioner: Arc<PairProvisioner>,
    dispatcher: Arc<RelayDispatcher>,
    commands: Arc<CommandHandler>,
    gateway: Arc<dyn Gateway>,
    command_subscription: Mutex<Option<SubscriptionId>>,
}

impl TranslatorService {
    pub fn new(
        config: &Config,
        gateway: Arc<dyn Gateway>,
        backend: Arc<dyn TranslationBackend>,
    ) -> Self {
        Self::with_settings(
            config.constants.clone(),
            &config.command_prefix,
            config.translation_timeout,
            gateway,
            backend,
        )
    }

    pub fn with_settings(
        constants: TranslationConstants,
        command_prefix: &str,
        translation_timeout: Duration,
        gateway: Arc<dyn Gateway>,
        backend: Arc<dyn TranslationBackend>,
    ) -> Self {
        let registry = Arc::new(ChannelPairRegistry::new());
        let provisioner = Arc::new(PairProvisioner::new(
            Arc::clone(&registry),
            Arc::clone(&gateway),
            Arc::clone(&backend),
            constants.clone(),
        ));
        let dispatcher = Arc::new(RelayDispatcher::new(
            Arc::clone(&registry),
            Arc::clone(&gateway),
            backend,
            constants,
            translation_timeout,
        ));
        let commands = Arc::new(CommandHandler::new(
            Arc::clone(&provisioner),
            Arc::clone(&gateway),
            command_prefix,
        ));

        Self {
            registry,
            provisioner,
            dispatcher,
            commands,
            gateway,
            command_subscription: Mutex::new(None),
        }
    }

    /// Subscribe to gateway events, then rebuild the pair map from every guild
    /// that is already available. Guilds that show up later are scanned on
    /// their guild-available event.
    pub async fn start(&self, hub: &EventHub) {
        debug!("Localizer starting up");
        self.dispatcher.attach(hub);
        {
            let mut subscription = self
                .command_subscription
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if subscription.is_none() {
                let handler: Arc<dyn GatewayEvents> = self.commands.clone();
                *subscription = Some(hub.attach(handler, &[EventKind::MessageReceived]));
            }
        }

        match self.gateway.available_guilds().await {
            Ok(guilds) => {
                if !guilds.is_empty() {
                    debug!("Discord bot is already connected, rebuilding pair map");
                }
                for guild in &guilds {
                    self.dispatcher.rebuild(guild);
                }
            }
            Err(e) => warn!("Could not list available guilds, waiting for guild events: {:#}", e),
        }

        info!(pairs = self.registry.len(), "Localizer started");
    }

    /// Drop every gateway subscription. Relays already in flight are left to finish.
    pub fn stop(&self, hub: &EventHub) {
        self.dispatcher.detach(hub);
        let subscription = self
            .command_subscription
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(id) = subscription {
            hub.detach(id);
        }
        info!("Localizer stopped");
    }

    pub async fn get_or_create_channel_pair(
        &self,
        guild_id: GuildId,
        lang: &str,
    ) -> Result<ChannelPair, ProvisionError> {
        self.provisioner.get_or_create(guild_id, lang).await
    }

    pub fn registry(&self) -> &Arc<ChannelPairRegistry> {
        &self.registry
    }

    pub fn dispatcher(&self) -> &Arc<RelayDispatcher> {
        &self.dispatcher
    }
}
