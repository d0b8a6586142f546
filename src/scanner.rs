use crate::config::TranslationConstants;
use crate::gateway::{ChannelHandle, GuildView};
use crate::language::{normalize, parse_channel_name, ChannelSide};
use crate::registry::ChannelPair;
use std::collections::HashMap;
use tracing::debug;

/// Rebuilds channel pairs from the channels already present in a guild.
pub struct GuildScanner {
    constants: TranslationConstants,
}

/// Halves of a pair found so far during a scan
#[derive(Default)]
struct PartialPair {
    standard: Option<ChannelHandle>,
    translation: Option<ChannelHandle>,
}

impl GuildScanner {
    pub fn new(constants: TranslationConstants) -> Self {
        Self { constants }
    }

    /// Collect every complete pair in the managed category. Never fails:
    /// channels outside the naming grammar and half-pairs are skipped.
    pub fn scan(&self, guild: &GuildView) -> HashMap<String, ChannelPair> {
        let Some(category) = guild.category_named(&self.constants.category_name) else {
            return HashMap::new();
        };

        debug!("Guild available for {}, rebuilding pair map", guild.name);

        let mut partials: HashMap<String, PartialPair> = HashMap::new();
        for channel in &category.text_channels {
            if self.constants.is_permanent(&channel.name) {
                continue;
            }

            let Some((lang, side)) =
                parse_channel_name(&channel.name, &self.constants.standard_language)
            else {
                debug!("{} is not a translation channel, skipping", channel.name);
                continue;
            };

            let partial = partials.entry(normalize(&lang)).or_default();
            match side {
                ChannelSide::Standard => partial.standard = Some(channel.clone()),
                ChannelSide::Translation => partial.translation = Some(channel.clone()),
            }
        }

        partials
            .into_iter()
            .filter_map(|(key, partial)| match (partial.standard, partial.translation) {
                (Some(standard), Some(translation)) => {
                    Some((key, ChannelPair::new(standard, translation)))
                }
                _ => {
                    debug!(
                        lang = %key,
                        "Pair is missing either the language channel or the {} channel, skipping",
                        self.constants.standard_language
                    );
                    None
                }
            })
            .collect()
    }
}
