use crate::language::normalize;
use anyhow::{Context, Result};
use std::time::Duration;

/// Naming conventions that scope every channel this bot manages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationConstants {
    /// Name of the channel category that holds all managed channels
    pub category_name: String,
    /// Language every non-paired channel and the history log is written in
    pub standard_language: String,
    /// Name of the shared history channel inside the category
    pub history_channel_name: String,
    /// Channels in the category that are never treated as relay endpoints
    pub permanent_channels: Vec<String>,
}

impl TranslationConstants {
    pub fn new(category_name: &str, standard_language: &str, history_channel_name: &str) -> Self {
        Self {
            category_name: category_name.to_string(),
            standard_language: normalize(standard_language),
            history_channel_name: history_channel_name.to_string(),
            permanent_channels: vec![history_channel_name.to_string()],
        }
    }

    pub fn is_permanent(&self, channel_name: &str) -> bool {
        self.permanent_channels
            .iter()
            .any(|name| name.eq_ignore_ascii_case(channel_name))
    }
}

impl Default for TranslationConstants {
    fn default() -> Self {
        Self::new("Localization", "en", "history")
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub command_prefix: String,

    // Translation backend
    pub translation_api_url: String,
    pub translation_api_key: Option<String>,
    pub translation_timeout: Duration,

    // Channel layout
    pub constants: TranslationConstants,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let category = std::env::var("TRANSLATION_CATEGORY")
            .unwrap_or_else(|_| "Localization".to_string());
        let standard_language =
            std::env::var("STANDARD_LANGUAGE").unwrap_or_else(|_| "en".to_string());
        let history = std::env::var("HISTORY_CHANNEL").unwrap_or_else(|_| "history".to_string());

        Ok(Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN").context("DISCORD_TOKEN not set")?,
            command_prefix: std::env::var("COMMAND_PREFIX").unwrap_or_else(|_| "!".to_string()),

            // Translation backend
            translation_api_url: std::env::var("TRANSLATION_API_URL")
                .unwrap_or_else(|_| "https://libretranslate.com".to_string()),
            translation_api_key: std::env::var("TRANSLATION_API_KEY")
                .ok()
                .filter(|key| !key.trim().is_empty()),
            translation_timeout: Duration::from_secs(
                std::env::var("TRANSLATION_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(15),
            ),

            // Channel layout
            constants: TranslationConstants::new(&category, &standard_language, &history),
        })
    }
}
