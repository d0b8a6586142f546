//! Language keys and the channel naming grammar.
//!
//! Every managed channel is named after the language it relays:
//!
//! - `from-<lang>-to-<standard>` is the standard-side channel. Messages relayed
//!   out of the `<lang>` channel arrive here translated to the standard language.
//! - `to-<lang>-from-<standard>` is the translation-side channel. Messages
//!   relayed out of the standard channel arrive here translated to `<lang>`.

use regex::Regex;
use std::sync::OnceLock;

/// Which member of a channel pair a channel is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelSide {
    Standard,
    Translation,
}

/// Map a free-form language identifier to its registry key.
///
/// Lower-cases and replaces `-` with `_`, so `EN-US` and `en_us` collide.
pub fn normalize(lang: &str) -> String {
    lang.to_lowercase().replace('-', "_")
}

/// Names for the standard-side and translation-side channels of `key`.
pub fn pair_channel_names(key: &str, standard: &str) -> (String, String) {
    (
        format!("from-{}-to-{}", key, standard),
        format!("to-{}-from-{}", key, standard),
    )
}

/// Derive the language and pair side from a managed channel's name.
///
/// Returns `None` for names outside the grammar or for channels paired
/// against some other standard language.
pub fn parse_channel_name(name: &str, standard: &str) -> Option<(String, ChannelSide)> {
    let name = name.to_lowercase();
    let standard = normalize(standard);

    let standard_suffix = format!("-to-{}", standard);
    if let Some(lang) = name
        .strip_prefix("from-")
        .and_then(|rest| rest.strip_suffix(&standard_suffix))
    {
        if !lang.is_empty() {
            return Some((lang.to_string(), ChannelSide::Standard));
        }
    }

    let translation_suffix = format!("-from-{}", standard);
    if let Some(lang) = name
        .strip_prefix("to-")
        .and_then(|rest| rest.strip_suffix(&translation_suffix))
    {
        if !lang.is_empty() {
            return Some((lang.to_string(), ChannelSide::Translation));
        }
    }

    None
}

/// Loose BCP-47 shape check, applied to user input before it reaches the backend.
pub fn is_plausible_language_code(lang: &str) -> bool {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[A-Za-z]{2,3}(?:[-_][A-Za-z0-9]{2,8})*$").ok())
        .as_ref()
        .map(|re| re.is_match(lang))
        .unwrap_or(false)
}
