use crate::config::Config;
use crate::language::normalize;
use crate::retry::{with_retry_if, RetryConfig};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::debug;

/// Remote text translation.
#[async_trait]
pub trait TranslationBackend: Send + Sync {
    async fn is_language_supported(&self, lang: &str) -> Result<bool>;

    async fn translate(&self, from: &str, to: &str, text: &str) -> Result<String>;
}

/// Non-success HTTP status from the translation API
#[derive(Debug, thiserror::Error)]
#[error("Translation API error ({status}): {body}")]
pub struct ApiStatusError {
    pub status: u16,
    pub body: String,
}

/// LibreTranslate `/translate` request
#[derive(Debug, Serialize)]
struct TranslateRequest<'a> {
    q: &'a str,
    source: &'a str,
    target: &'a str,
    format: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    #[serde(rename = "translatedText")]
    translated_text: String,
}

/// One entry of the LibreTranslate `/languages` listing
#[derive(Debug, Clone, Deserialize)]
pub struct SupportedLanguage {
    pub code: String,
    #[serde(default)]
    pub name: String,
}

/// HTTP client for a LibreTranslate-compatible API.
///
/// The language listing is fetched once and cached for the client's lifetime.
pub struct LibreTranslateClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    retry: RetryConfig,
    languages: OnceCell<Vec<SupportedLanguage>>,
}

impl LibreTranslateClient {
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build translation HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            retry: RetryConfig::translation_api(),
            languages: OnceCell::new(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            &config.translation_api_url,
            config.translation_api_key.clone(),
            config.translation_timeout,
        )
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Languages the API accepts, as reported by `GET /languages`
    pub async fn languages(&self) -> Result<&[SupportedLanguage]> {
        let languages = self
            .languages
            .get_or_try_init(|| async {
                with_retry_if(
                    &self.retry,
                    "Fetch supported languages",
                    || async {
                        let response = self
                            .client
                            .get(format!("{}/languages", self.base_url))
                            .send()
                            .await
                            .context("Failed to send language list request")?;

                        let response = check_status(response).await?;
                        let languages: Vec<SupportedLanguage> = response
                            .json()
                            .await
                            .context("Failed to parse language list response")?;
                        Ok(languages)
                    },
                    is_retryable_error,
                )
                .await
            })
            .await?;

        Ok(languages.as_slice())
    }

    /// Map a user-supplied language to the exact code the API expects.
    ///
    /// Tries the full tag first (`pt_br` -> `pt-BR`), then its primary subtag (`pt`).
    async fn resolve_code(&self, lang: &str) -> Result<Option<String>> {
        let wanted = normalize(lang);
        let primary = wanted.split('_').next().unwrap_or_default().to_string();
        let languages = self.languages().await?;

        let exact = languages.iter().find(|l| normalize(&l.code) == wanted);
        let fallback = || languages.iter().find(|l| normalize(&l.code) == primary);

        Ok(exact.or_else(fallback).map(|l| l.code.clone()))
    }
}

#[async_trait]
impl TranslationBackend for LibreTranslateClient {
    async fn is_language_supported(&self, lang: &str) -> Result<bool> {
        Ok(self.resolve_code(lang).await?.is_some())
    }

    async fn translate(&self, from: &str, to: &str, text: &str) -> Result<String> {
        if text.trim().is_empty() || normalize(from) == normalize(to) {
            return Ok(text.to_string());
        }

        let Some(source) = self.resolve_code(from).await? else {
            bail!("Source language '{}' is not supported", from);
        };
        let Some(target) = self.resolve_code(to).await? else {
            bail!("Target language '{}' is not supported", to);
        };

        let request = TranslateRequest {
            q: text,
            source: &source,
            target: &target,
            format: "text",
            api_key: self.api_key.as_deref(),
        };

        debug!("Translating {} characters from {} to {}", text.len(), source, target);

        with_retry_if(
            &self.retry,
            &format!("Translation {} -> {}", source, target),
            || async {
                let response = self
                    .client
                    .post(format!("{}/translate", self.base_url))
                    .json(&request)
                    .send()
                    .await
                    .context("Failed to send translation request")?;

                let response = check_status(response).await?;
                let body: TranslateResponse = response
                    .json()
                    .await
                    .context("Failed to parse translation response")?;
                Ok(body.translated_text)
            },
            is_retryable_error,
        )
        .await
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .unwrap_or_else(|e| format!("<failed to read body: {}>", e));
    Err(ApiStatusError { status, body }.into())
}

/// Determine if an error is retryable (5xx errors, 429 rate limit, network errors)
/// Other 4xx client errors should not be retried
fn is_retryable_error(error: &anyhow::Error) -> bool {
    match error.downcast_ref::<ApiStatusError>() {
        Some(api_error) => api_error.status == 429 || api_error.status >= 500,
        None => true,
    }
}
