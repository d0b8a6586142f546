//! Per-message relay between the two channels of a pair.
//!
//! Classification happens synchronously on the event path. The translation,
//! forward and history writes run in a spawned task whose failures are logged
//! and never reach the gateway. Relays are independent, so two messages in
//! the same channel may complete out of order.

use crate::archive::HistoryArchiver;
use crate::config::TranslationConstants;
use crate::events::{EventHub, EventKind, GatewayEvents, SubscriptionId};
use crate::gateway::{ChannelHandle, ChannelId, Gateway, GuildId, GuildView, InboundMessage};
use crate::language::{normalize, parse_channel_name, ChannelSide};
use crate::registry::ChannelPairRegistry;
use crate::scanner::GuildScanner;
use crate::translation::TranslationBackend;
use anyhow::{anyhow, Context, Result};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Why an inbound message was not relayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    OwnMessage,
    NotGuildTextChannel,
    NoCategory,
    OtherCategory,
    PermanentChannel,
    NotTranslationChannel,
    UntrackedPair,
    NotPairMember,
}

/// Everything the relay task needs, captured at classification time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayJob {
    pub guild_id: GuildId,
    pub category_id: ChannelId,
    pub author_name: String,
    pub source_channel: ChannelHandle,
    pub target_channel: ChannelHandle,
    pub from_lang: String,
    pub to_lang: String,
    pub content: String,
    pub attachment_urls: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Ignored(IgnoreReason),
    Relay(RelayJob),
}

/// What the handler did with a message.
#[derive(Debug)]
pub enum Dispatch {
    Ignored(IgnoreReason),
    Scheduled(JoinHandle<()>),
}

/// Result of the forward stage, consumed by the history stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayOutcome {
    pub original: String,
    /// Translated text, empty when the message was not translated
    pub translated: String,
}

/// The I/O half of a relay: translate, forward, archive.
struct Relay {
    gateway: Arc<dyn Gateway>,
    backend: Arc<dyn TranslationBackend>,
    archiver: HistoryArchiver,
    translation_timeout: Duration,
}

impl Relay {
    /// Two stages: the forward runs as its own task, the history write consumes its result.
    async fn run(self: Arc<Self>, job: RelayJob) {
        let forward = {
            let relay = Arc::clone(&self);
            let job = job.clone();
            tokio::spawn(async move { relay.forward(&job).await })
        };

        let outcome = match forward.await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                error!(channel = %job.source_channel.name, "Failed to relay message: {:#}", e);
                return;
            }
            Err(e) => {
                error!(channel = %job.source_channel.name, "Relay task aborted: {}", e);
                return;
            }
        };

        if let Err(e) = self.archive(&job, &outcome).await {
            warn!(channel = %job.source_channel.name, "Failed to write relay history: {:#}", e);
        }
    }

    /// Translate the message and post it to the partner channel.
    async fn forward(&self, job: &RelayJob) -> Result<RelayOutcome> {
        debug!(
            "Message received from {} channel '{}', sending to {}",
            job.from_lang, job.source_channel.name, job.target_channel.name
        );

        let mut parts = Vec::new();
        let mut translated = String::new();
        if !job.content.trim().is_empty() {
            match self.translate(job).await {
                Ok(text) => {
                    parts.push(text.clone());
                    translated = text;
                }
                Err(e) if !job.attachment_urls.is_empty() => {
                    warn!("Translation failed, relaying attachments only: {:#}", e);
                }
                Err(e) => return Err(e),
            }
        }
        if !job.attachment_urls.is_empty() {
            parts.push(job.attachment_urls.join(" "));
        }

        let relay_text = parts.join(" ");
        if relay_text.trim().is_empty() {
            debug!("Nothing to relay from '{}'", job.source_channel.name);
            return Ok(RelayOutcome {
                original: job.content.clone(),
                translated: String::new(),
            });
        }

        self.gateway
            .send_message(
                job.target_channel.id,
                &format!("{}: {}", job.author_name, relay_text),
            )
            .await
            .with_context(|| format!("Failed to send to {}", job.target_channel.name))?;

        Ok(RelayOutcome {
            original: job.content.clone(),
            translated,
        })
    }

    async fn translate(&self, job: &RelayJob) -> Result<String> {
        tokio::time::timeout(
            self.translation_timeout,
            self.backend
                .translate(&job.from_lang, &job.to_lang, &job.content),
        )
        .await
        .map_err(|_| anyhow!("Translation timed out after {:?}", self.translation_timeout))?
    }

    async fn archive(&self, job: &RelayJob, outcome: &RelayOutcome) -> Result<()> {
        if outcome.original.trim().is_empty() || outcome.translated.trim().is_empty() {
            return Ok(());
        }

        let Some(guild) = self.gateway.guild(job.guild_id).await? else {
            return Ok(());
        };
        let Some(category) = guild.category(job.category_id) else {
            return Ok(());
        };

        if self
            .archiver
            .archive(category, &job.author_name, &outcome.original, &outcome.translated)
            .await?
        {
            debug!("Completed translating messages");
        }
        Ok(())
    }
}

/// Gateway event handler that keeps the registry in sync and relays messages.
pub struct RelayDispatcher {
    registry: Arc<ChannelPairRegistry>,
    gateway: Arc<dyn Gateway>,
    relay: Arc<Relay>,
    scanner: GuildScanner,
    constants: TranslationConstants,
    subscription: Mutex<Option<SubscriptionId>>,
}

impl RelayDispatcher {
    pub fn new(
        registry: Arc<ChannelPairRegistry>,
        gateway: Arc<dyn Gateway>,
        backend: Arc<dyn TranslationBackend>,
        constants: TranslationConstants,
        translation_timeout: Duration,
    ) -> Self {
        let relay = Relay {
            archiver: HistoryArchiver::new(Arc::clone(&gateway), &constants.history_channel_name),
            gateway: Arc::clone(&gateway),
            backend,
            translation_timeout,
        };

        Self {
            registry,
            gateway,
            relay: Arc::new(relay),
            scanner: GuildScanner::new(constants.clone()),
            constants,
            subscription: Mutex::new(None),
        }
    }

    /// Subscribe to every gateway event the relay handles. Idempotent.
    pub fn attach(self: &Arc<Self>, hub: &EventHub) {
        let mut subscription = self
            .subscription
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if subscription.is_none() {
            let handler: Arc<dyn GatewayEvents> = self.clone();
            *subscription = Some(hub.attach(handler, &EventKind::ALL));
        }
    }

    /// Unsubscribe from all gateway events. In-flight relays keep running.
    pub fn detach(&self, hub: &EventHub) {
        let subscription = self
            .subscription
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(id) = subscription {
            hub.detach(id);
        }
    }

    pub fn is_attached(&self) -> bool {
        self.subscription
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_some()
    }

    /// Decide whether a message belongs to a tracked pair and in which direction it goes.
    pub fn classify(&self, message: &InboundMessage) -> Classification {
        use Classification::Ignored;

        if message.author_id == self.gateway.current_user_id() {
            return Ignored(IgnoreReason::OwnMessage);
        }

        let Some(location) = &message.channel else {
            return Ignored(IgnoreReason::NotGuildTextChannel);
        };

        let Some((category_id, category_name)) = &location.category else {
            return Ignored(IgnoreReason::NoCategory);
        };

        if *category_name != self.constants.category_name {
            return Ignored(IgnoreReason::OtherCategory);
        }

        let channel = &location.channel;
        if self.constants.is_permanent(&channel.name) {
            return Ignored(IgnoreReason::PermanentChannel);
        }

        let standard = &self.constants.standard_language;
        let Some((lang, _)) = parse_channel_name(&channel.name, standard) else {
            return Ignored(IgnoreReason::NotTranslationChannel);
        };

        let Some(pair) = self.registry.get(&normalize(&lang)) else {
            warn!(channel = %channel.name, "Message received from a loc channel without a valid pair");
            return Ignored(IgnoreReason::UntrackedPair);
        };

        let (target, from_lang, to_lang) = match pair.side_of(channel.id) {
            Some(ChannelSide::Standard) => (pair.translation_channel, standard.clone(), lang),
            Some(ChannelSide::Translation) => (pair.standard_channel, lang, standard.clone()),
            None => return Ignored(IgnoreReason::NotPairMember),
        };

        Classification::Relay(RelayJob {
            guild_id: location.guild_id,
            category_id: *category_id,
            author_name: message.author_name.clone(),
            source_channel: channel.clone(),
            target_channel: target,
            from_lang,
            to_lang,
            content: message.content.clone(),
            attachment_urls: message.attachment_urls.clone(),
        })
    }

    /// Classify `message` and, if it is relayable, schedule the relay. Never blocks on I/O.
    pub fn handle_message(&self, message: InboundMessage) -> Dispatch {
        match self.classify(&message) {
            Classification::Ignored(reason) => Dispatch::Ignored(reason),
            Classification::Relay(job) => {
                debug!("Starting translation of message");
                Dispatch::Scheduled(tokio::spawn(Arc::clone(&self.relay).run(job)))
            }
        }
    }

    /// Refresh the registry from a guild's channel layout.
    pub fn rebuild(&self, guild: &GuildView) {
        let pairs = self.scanner.scan(guild);
        if !pairs.is_empty() {
            info!(guild = %guild.name, pairs = pairs.len(), "Rebuilt channel pair map");
        }
        self.registry.rebuild_from_scan(pairs);
    }
}

impl GatewayEvents for RelayDispatcher {
    fn message_received(&self, message: InboundMessage) {
        let _ = self.handle_message(message);
    }

    fn message_updated(&self, message: InboundMessage) {
        // Edits are not propagated to the partner channel.
        if let Some(channel) = &message.channel {
            debug!(channel = %channel.channel.name, "Ignoring message edit");
        }
    }

    fn channel_destroyed(&self, channel_id: ChannelId) {
        if let Some(lang) = self.registry.remove_by_channel_id(channel_id) {
            debug!("One of the channels in a pair were deleted, removing pair '{}' from map", lang);
        }
    }

    fn guild_available(&self, guild: GuildView) {
        self.rebuild(&guild);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::TextChannelRef;
    use crate::registry::ChannelPair;
    use crate::test_support::{FakeGateway, FakeTranslator, BOT_ID};

    const GUILD: GuildId = 1;
    const CATEGORY: ChannelId = 10;
    const HISTORY: ChannelId = 11;
    const FR_STANDARD: ChannelId = 12;
    const FR_TRANSLATION: ChannelId = 13;

    struct Fixture {
        gateway: Arc<FakeGateway>,
        translator: Arc<FakeTranslator>,
        registry: Arc<ChannelPairRegistry>,
        dispatcher: Arc<RelayDispatcher>,
    }

    fn fixture_with(translator: FakeTranslator, timeout: Duration) -> Fixture {
        let gateway = Arc::new(FakeGateway::with_category(GUILD, CATEGORY, "Localization"));
        gateway.add_text_channel(GUILD, CATEGORY, HISTORY, "history");
        gateway.add_text_channel(GUILD, CATEGORY, FR_STANDARD, "from-fr-to-en");
        gateway.add_text_channel(GUILD, CATEGORY, FR_TRANSLATION, "to-fr-from-en");

        let registry = Arc::new(ChannelPairRegistry::new());
        registry.insert_if_absent(
            "fr",
            ChannelPair::new(
                ChannelHandle::new(FR_STANDARD, "from-fr-to-en"),
                ChannelHandle::new(FR_TRANSLATION, "to-fr-from-en"),
            ),
        );

        let translator = Arc::new(translator);
        let dispatcher = Arc::new(RelayDispatcher::new(
            Arc::clone(&registry),
            gateway.clone(),
            translator.clone(),
            TranslationConstants::default(),
            timeout,
        ));

        Fixture {
            gateway,
            translator,
            registry,
            dispatcher,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(FakeTranslator::new(), Duration::from_secs(5))
    }

    fn message(channel_id: ChannelId, channel_name: &str, content: &str) -> InboundMessage {
        InboundMessage {
            author_id: 42,
            author_name: "alice".to_string(),
            channel: Some(TextChannelRef {
                guild_id: GUILD,
                channel: ChannelHandle::new(channel_id, channel_name),
                category: Some((CATEGORY, "Localization".to_string())),
            }),
            content: content.to_string(),
            attachment_urls: Vec::new(),
        }
    }

    async fn dispatch(fixture: &Fixture, message: InboundMessage) {
        match fixture.dispatcher.handle_message(message) {
            Dispatch::Scheduled(handle) => handle.await.unwrap(),
            Dispatch::Ignored(reason) => panic!("message ignored: {:?}", reason),
        }
    }

    fn ignored(fixture: &Fixture, message: InboundMessage) -> IgnoreReason {
        match fixture.dispatcher.classify(&message) {
            Classification::Ignored(reason) => reason,
            Classification::Relay(job) => panic!("unexpected relay: {:?}", job),
        }
    }

    #[test]
    fn test_ignores_own_messages() {
        let fixture = fixture();
        let mut msg = message(FR_STANDARD, "from-fr-to-en", "hello");
        msg.author_id = BOT_ID;
        assert_eq!(ignored(&fixture, msg), IgnoreReason::OwnMessage);
    }

    #[test]
    fn test_ignores_non_text_channels() {
        let fixture = fixture();
        let mut msg = message(FR_STANDARD, "from-fr-to-en", "hello");
        msg.channel = None;
        assert_eq!(ignored(&fixture, msg), IgnoreReason::NotGuildTextChannel);
    }

    #[test]
    fn test_ignores_uncategorized_channels() {
        let fixture = fixture();
        let mut msg = message(FR_STANDARD, "from-fr-to-en", "hello");
        if let Some(channel) = msg.channel.as_mut() {
            channel.category = None;
        }
        assert_eq!(ignored(&fixture, msg), IgnoreReason::NoCategory);
    }

    #[test]
    fn test_ignores_other_categories() {
        let fixture = fixture();
        let mut msg = message(FR_STANDARD, "from-fr-to-en", "hello");
        if let Some(channel) = msg.channel.as_mut() {
            channel.category = Some((99, "General".to_string()));
        }
        assert_eq!(ignored(&fixture, msg), IgnoreReason::OtherCategory);
    }

    #[test]
    fn test_ignores_permanent_and_unrelated_channels() {
        let fixture = fixture();
        assert_eq!(
            ignored(&fixture, message(HISTORY, "history", "hello")),
            IgnoreReason::PermanentChannel
        );
        assert_eq!(
            ignored(&fixture, message(20, "general", "hello")),
            IgnoreReason::NotTranslationChannel
        );
    }

    #[test]
    fn test_ignores_untracked_and_foreign_channels() {
        let fixture = fixture();
        assert_eq!(
            ignored(&fixture, message(21, "from-de-to-en", "hallo")),
            IgnoreReason::UntrackedPair
        );
        // Named like the fr pair but not one of its channels
        assert_eq!(
            ignored(&fixture, message(22, "from-fr-to-en", "hello")),
            IgnoreReason::NotPairMember
        );
    }

    #[test]
    fn test_classify_direction() {
        let fixture = fixture();

        let Classification::Relay(job) =
            fixture.dispatcher.classify(&message(FR_STANDARD, "from-fr-to-en", "hello"))
        else {
            panic!("expected relay");
        };
        assert_eq!((job.from_lang.as_str(), job.to_lang.as_str()), ("en", "fr"));
        assert_eq!(job.target_channel.id, FR_TRANSLATION);

        let Classification::Relay(job) =
            fixture.dispatcher.classify(&message(FR_TRANSLATION, "to-fr-from-en", "salut"))
        else {
            panic!("expected relay");
        };
        assert_eq!((job.from_lang.as_str(), job.to_lang.as_str()), ("fr", "en"));
        assert_eq!(job.target_channel.id, FR_STANDARD);
    }

    #[tokio::test]
    async fn test_relay_standard_to_translation_with_history() {
        let fixture = fixture();

        dispatch(&fixture, message(FR_STANDARD, "from-fr-to-en", "hello")).await;

        assert_eq!(
            fixture.translator.translate_calls(),
            vec![("en".to_string(), "fr".to_string(), "hello".to_string())]
        );
        assert_eq!(
            fixture.gateway.sent_to(FR_TRANSLATION),
            vec!["alice: [en->fr] hello".to_string()]
        );
        assert_eq!(
            fixture.gateway.sent_to(HISTORY),
            vec!["alice: hello".to_string(), "alice: [en->fr] hello".to_string()]
        );
    }

    #[tokio::test]
    async fn test_relay_translation_to_standard() {
        let fixture = fixture();

        dispatch(&fixture, message(FR_TRANSLATION, "to-fr-from-en", "salut")).await;

        assert_eq!(
            fixture.gateway.sent_to(FR_STANDARD),
            vec!["alice: [fr->en] salut".to_string()]
        );
    }

    #[tokio::test]
    async fn test_relay_appends_attachments() {
        let fixture = fixture();
        let mut msg = message(FR_STANDARD, "from-fr-to-en", "look");
        msg.attachment_urls = vec!["https://cdn/a.png".to_string(), "https://cdn/b.png".to_string()];

        dispatch(&fixture, msg).await;

        assert_eq!(
            fixture.gateway.sent_to(FR_TRANSLATION),
            vec!["alice: [en->fr] look https://cdn/a.png https://cdn/b.png".to_string()]
        );
        assert_eq!(
            fixture.gateway.sent_to(HISTORY),
            vec!["alice: look".to_string(), "alice: [en->fr] look".to_string()]
        );
    }

    #[tokio::test]
    async fn test_relay_attachment_only_message_skips_translation_and_history() {
        let fixture = fixture();
        let mut msg = message(FR_STANDARD, "from-fr-to-en", "");
        msg.attachment_urls = vec!["https://cdn/a.png".to_string()];

        dispatch(&fixture, msg).await;

        assert!(fixture.translator.translate_calls().is_empty());
        assert_eq!(
            fixture.gateway.sent_to(FR_TRANSLATION),
            vec!["alice: https://cdn/a.png".to_string()]
        );
        assert!(fixture.gateway.sent_to(HISTORY).is_empty());
    }

    #[tokio::test]
    async fn test_relay_translation_failure_sends_nothing() {
        let fixture = fixture_with(FakeTranslator::new().failing(), Duration::from_secs(5));

        dispatch(&fixture, message(FR_STANDARD, "from-fr-to-en", "hello")).await;

        assert!(fixture.gateway.sent_messages().is_empty());
        // The registry is untouched by relay failures
        assert!(fixture.registry.get("fr").is_some());
    }

    #[tokio::test]
    async fn test_relay_translation_failure_still_forwards_attachments() {
        let fixture = fixture_with(FakeTranslator::new().failing(), Duration::from_secs(5));
        let mut msg = message(FR_STANDARD, "from-fr-to-en", "hello");
        msg.attachment_urls = vec!["https://cdn/a.png".to_string()];

        dispatch(&fixture, msg).await;

        assert_eq!(
            fixture.gateway.sent_to(FR_TRANSLATION),
            vec!["alice: https://cdn/a.png".to_string()]
        );
        assert!(fixture.gateway.sent_to(HISTORY).is_empty());
    }

    #[tokio::test]
    async fn test_relay_translation_timeout() {
        let fixture = fixture_with(
            FakeTranslator::new().with_delay(Duration::from_millis(500)),
            Duration::from_millis(20),
        );

        dispatch(&fixture, message(FR_STANDARD, "from-fr-to-en", "hello")).await;

        assert!(fixture.gateway.sent_messages().is_empty());
    }

    #[tokio::test]
    async fn test_channel_destroyed_prunes_pair() {
        let fixture = fixture();
        let hub = EventHub::new();
        fixture.dispatcher.attach(&hub);

        hub.publish_channel_destroyed(FR_TRANSLATION);

        assert!(fixture.registry.get("fr").is_none());
        assert_eq!(
            ignored(&fixture, message(FR_STANDARD, "from-fr-to-en", "hello")),
            IgnoreReason::UntrackedPair
        );
    }

    #[tokio::test]
    async fn test_guild_available_rebuilds_registry() {
        let fixture = fixture();
        fixture.gateway.add_text_channel(GUILD, CATEGORY, 30, "from-de-to-en");
        fixture.gateway.add_text_channel(GUILD, CATEGORY, 31, "to-de-from-en");
        let hub = EventHub::new();
        fixture.dispatcher.attach(&hub);

        let guild = fixture.gateway.guild(GUILD).await.unwrap().unwrap();
        hub.publish_guild_available(guild);

        assert_eq!(fixture.registry.keys(), vec!["de".to_string(), "fr".to_string()]);
    }

    #[tokio::test]
    async fn test_message_update_is_noop() {
        let fixture = fixture();
        let hub = EventHub::new();
        fixture.dispatcher.attach(&hub);

        hub.publish_message_updated(message(FR_STANDARD, "from-fr-to-en", "edited"));
        tokio::task::yield_now().await;

        assert!(fixture.translator.translate_calls().is_empty());
        assert!(fixture.gateway.sent_messages().is_empty());
    }

    #[tokio::test]
    async fn test_attach_is_idempotent_and_detach_unsubscribes_everything() {
        let fixture = fixture();
        let hub = EventHub::new();

        fixture.dispatcher.attach(&hub);
        fixture.dispatcher.attach(&hub);
        assert!(fixture.dispatcher.is_attached());
        for kind in EventKind::ALL {
            assert_eq!(hub.subscriber_count(kind), 1);
        }

        fixture.dispatcher.detach(&hub);
        assert!(!fixture.dispatcher.is_attached());
        for kind in EventKind::ALL {
            assert_eq!(hub.subscriber_count(kind), 0);
        }

        hub.publish_channel_destroyed(FR_STANDARD);
        assert!(fixture.registry.get("fr").is_some());
    }
}
