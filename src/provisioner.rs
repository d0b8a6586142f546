//! On-demand creation of channel pairs.
//!
//! Channel creation is not transactional with registry insertion. If the
//! process dies between the two, the orphaned channels stay on the guild until
//! a later guild scan adopts them or someone deletes them by hand.

use crate::config::TranslationConstants;
use crate::gateway::{ChannelHandle, Gateway, GuildId};
use crate::language::{normalize, pair_channel_names};
use crate::registry::{ChannelPair, ChannelPairRegistry, Insertion};
use crate::translation::TranslationBackend;
use anyhow::Context;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Why a channel pair could not be provisioned.
#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    /// The backend rejected the language. The message is safe to show to users.
    #[error("{message}")]
    LanguageNotSupported { lang: String, message: String },

    /// The guild has no managed category; an operator has to create it
    #[error("The channel category {category} does not exist")]
    Configuration { category: String },

    /// Translation or platform failure while provisioning
    #[error("Unable to create channel pair: {0:#}")]
    Backend(#[from] anyhow::Error),
}

impl ProvisionError {
    /// Reply text for the command layer
    pub fn user_message(&self) -> String {
        match self {
            ProvisionError::LanguageNotSupported { message, .. } => message.clone(),
            _ => "Unable to create channel pair".to_string(),
        }
    }
}

pub struct PairProvisioner {
    registry: Arc<ChannelPairRegistry>,
    gateway: Arc<dyn Gateway>,
    backend: Arc<dyn TranslationBackend>,
    constants: TranslationConstants,
}

impl PairProvisioner {
    pub fn new(
        registry: Arc<ChannelPairRegistry>,
        gateway: Arc<dyn Gateway>,
        backend: Arc<dyn TranslationBackend>,
        constants: TranslationConstants,
    ) -> Self {
        Self {
            registry,
            gateway,
            backend,
            constants,
        }
    }

    /// Return the pair for `lang`, creating its two channels if it is not tracked yet.
    pub async fn get_or_create(
        &self,
        guild_id: GuildId,
        lang: &str,
    ) -> Result<ChannelPair, ProvisionError> {
        let key = normalize(lang);
        if let Some(pair) = self.registry.get(&key) {
            debug!(lang = %key, "Channel pair already tracked");
            return Ok(pair);
        }

        let guild = self
            .gateway
            .guild(guild_id)
            .await?
            .with_context(|| format!("Guild {} is not available", guild_id))?;

        let category = guild
            .category_named(&self.constants.category_name)
            .ok_or_else(|| ProvisionError::Configuration {
                category: self.constants.category_name.clone(),
            })?;

        if !self.backend.is_language_supported(lang).await? {
            return Err(ProvisionError::LanguageNotSupported {
                lang: lang.to_string(),
                message: format!("{} is not supported at this time.", lang),
            });
        }

        let standard = &self.constants.standard_language;
        let (from_name, to_name) = pair_channel_names(&key, standard);

        // Topics are computed up front so a translation failure creates nothing.
        let from_topic = self
            .backend
            .translate(
                standard,
                lang,
                &format!(
                    "Responses will be translated to {} and posted in this channel's pair `#{}`",
                    lang, to_name
                ),
            )
            .await
            .context("Failed to translate channel topic")?;
        let to_topic = format!(
            "Responses will be translated to {} and posted in this channel's pair `#{}`",
            standard, from_name
        );

        let standard_channel = self
            .gateway
            .create_text_channel(guild.id, category.id, &from_name, &from_topic)
            .await
            .with_context(|| format!("Failed to create channel {}", from_name))?;

        let translation_channel = match self
            .gateway
            .create_text_channel(guild.id, category.id, &to_name, &to_topic)
            .await
        {
            Ok(channel) => channel,
            Err(e) => {
                self.discard(&[&standard_channel]).await;
                return Err(e
                    .context(format!("Failed to create channel {}", to_name))
                    .into());
            }
        };

        let proposed = ChannelPair::new(standard_channel, translation_channel);
        match self.registry.insert_if_absent(&key, proposed.clone()) {
            Insertion::Inserted(pair) => {
                info!(lang = %key, "Created channel pair {{{}, {}}}", from_name, to_name);
                Ok(pair)
            }
            Insertion::Existing(winner) => {
                warn!(
                    "The channel pairs {{{}, {}}} have already been tracked, cleaning up",
                    from_name, to_name
                );
                self.discard(&[&proposed.standard_channel, &proposed.translation_channel])
                    .await;
                Ok(winner)
            }
        }
    }

    /// Best-effort deletion of channels that lost a race or belong to a failed pair
    async fn discard(&self, channels: &[&ChannelHandle]) {
        let deletions = channels.iter().map(|channel| async move {
            if let Err(e) = self.gateway.delete_channel(channel.id).await {
                warn!(channel = %channel.name, "Failed to delete redundant channel: {:#}", e);
            }
        });
        futures::future::join_all(deletions).await;
    }
}
