//! Cache key encoding and decoding
//!
//! The proxy stores every full-page response under a key of the form
//!
//! ```text
//! <prefix><scheme>GET<host/path?query><Desktop|Mobile>
//! ```
//!
//! e.g. `nginx-cache:httpsGETexample.com/blogDesktop`. This module turns such
//! keys back into URLs and device classes, builds them from URLs, and
//! produces the SCAN patterns used to find them.

use crate::config::CacheAdminConfig;
use crate::error::{CacheAdminError, Result};
use crate::models::{DecodedEntry, Device};
use regex::Regex;

const HTTP_MARKER: &str = "httpGET";
const HTTPS_MARKER: &str = "httpsGET";

/// Encoder/decoder for one key prefix
#[derive(Debug, Clone)]
pub struct KeyCodec {
    prefix: String,
    strict: Regex,
}

impl KeyCodec {
    /// Create a codec for the prefix configured in `config`
    pub fn new(config: &CacheAdminConfig) -> Result<Self> {
        Self::build(config.prefix())
    }

    /// Create a codec for an explicit prefix.
    ///
    /// The prefix is normalized the same way configured prefixes are:
    /// trailing colons collapse to exactly one.
    pub fn with_prefix(prefix: &str) -> Result<Self> {
        let config = CacheAdminConfig {
            key_prefix: Some(prefix.to_string()),
            ..Default::default()
        };
        Self::build(config.prefix())
    }

    fn build(prefix: String) -> Result<Self> {
        let pattern = format!(r"^{}(https?)GET.+(Desktop|Mobile)$", regex::escape(&prefix));
        let strict = Regex::new(&pattern).map_err(|e| {
            CacheAdminError::ConfigError(format!("Invalid key prefix '{}': {}", prefix, e))
        })?;
        Ok(KeyCodec { prefix, strict })
    }

    /// The normalized prefix, always ending in a single ':'
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Structural check: prefix, then `http`/`https` + `GET`, ending in a
    /// device suffix.
    ///
    /// Keys without a device suffix fail this check even though
    /// [`KeyCodec::decode`] accepts them as `All`.
    pub fn is_cache_key(&self, key: &str) -> bool {
        let Some(rest) = key.strip_prefix(self.prefix.as_str()) else {
            return false;
        };

        if !rest.starts_with(HTTP_MARKER) && !rest.starts_with(HTTPS_MARKER) {
            return false;
        }

        rest.ends_with(Device::Desktop.suffix()) || rest.ends_with(Device::Mobile.suffix())
    }

    /// The grammar the scanner filters with: like [`KeyCodec::is_cache_key`]
    /// but the URL between `GET` and the suffix must be non-empty.
    pub fn matches_strict(&self, key: &str) -> bool {
        self.strict.is_match(key)
    }

    /// Decode a raw key. Never fails; malformed input yields a best-effort
    /// entry with `well_formed == false`.
    pub fn decode(&self, key: &str) -> DecodedEntry {
        let (rest, had_prefix) = match key.strip_prefix(self.prefix.as_str()) {
            Some(rest) => (rest, true),
            None => (key, false),
        };

        let (rest, device) = if let Some(rest) = rest.strip_suffix(Device::Desktop.suffix()) {
            (rest, Device::Desktop)
        } else if let Some(rest) = rest.strip_suffix(Device::Mobile.suffix()) {
            (rest, Device::Mobile)
        } else {
            (rest, Device::All)
        };

        let (full_url, tail_len) = if let Some(tail) = rest.strip_prefix(HTTP_MARKER) {
            (format!("http://{}", tail), Some(tail.len()))
        } else if let Some(tail) = rest.strip_prefix(HTTPS_MARKER) {
            (format!("https://{}", tail), Some(tail.len()))
        } else {
            (rest.to_string(), None)
        };

        let full_url = match full_url.strip_suffix('/') {
            Some(trimmed) => trimmed.to_string(),
            None => full_url,
        };
        let url = strip_scheme(&full_url).to_string();

        let well_formed = had_prefix && device != Device::All && tail_len.is_some_and(|n| n > 0);

        DecodedEntry {
            url,
            device,
            full_url,
            raw_key: key.to_string(),
            well_formed,
        }
    }

    /// Build the key the proxy would store `url` under for `device`.
    ///
    /// URLs without an explicit scheme are encoded as plain `http`.
    pub fn encode(&self, url: &str, device: Device) -> String {
        let (marker, tail) = if let Some(tail) = url.strip_prefix("https://") {
            (HTTPS_MARKER, tail)
        } else if let Some(tail) = url.strip_prefix("http://") {
            (HTTP_MARKER, tail)
        } else {
            (HTTP_MARKER, url)
        };
        format!("{}{}{}{}", self.prefix, marker, tail, device.suffix())
    }

    /// SCAN pattern matching every key under the prefix
    pub fn scan_pattern(&self) -> String {
        format!("{}*", escape_glob(&self.prefix))
    }

    /// SCAN pattern matching every key whose URL part contains `url`.
    ///
    /// Substring semantics: `site.com/a` also matches `site.com/ab`.
    pub fn url_pattern(&self, url: &str) -> String {
        format!(
            "{}*{}*",
            escape_glob(&self.prefix),
            escape_glob(strip_scheme(url))
        )
    }
}

/// Remove a leading `http://` or `https://`
pub fn strip_scheme(url: &str) -> &str {
    url.strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url)
}

/// Escape glob metacharacters so the text matches literally in SCAN MATCH
pub fn escape_glob(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
