//! User-Agent based rejection of scripted clients.

use regex::{Regex, RegexBuilder};

/// Known scraper and scripting client signatures, checked in order.
pub const BOT_SIGNATURES: &[&str] = &[
    "python-requests",
    "python-urllib",
    "go-http-client",
    "curl/",
    "wget/",
    "scrapy",
    "node-fetch",
    "aiohttp",
    "httpx",
    "libwww-perl",
    "java/",
    "apache-httpclient",
    "okhttp",
    "php/",
    "guzzlehttp",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotVerdict {
    Allowed,
    MissingUserAgent,
    /// Matched the signature at this source pattern.
    Signature(&'static str),
}

impl BotVerdict {
    pub fn is_rejected(&self) -> bool {
        !matches!(self, BotVerdict::Allowed)
    }
}

#[derive(Debug, Clone)]
pub struct BotFilter {
    patterns: Vec<(&'static str, Regex)>,
}

impl BotFilter {
    /// Build a filter from literal, case-insensitive signatures.
    pub fn new(signatures: &[&'static str]) -> Result<Self, regex::Error> {
        let patterns = signatures
            .iter()
            .map(|signature| {
                RegexBuilder::new(&regex::escape(signature))
                    .case_insensitive(true)
                    .build()
                    .map(|regex| (*signature, regex))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { patterns })
    }

    pub fn check(&self, user_agent: Option<&str>) -> BotVerdict {
        let user_agent = match user_agent {
            Some(ua) if !ua.is_empty() => ua,
            _ => return BotVerdict::MissingUserAgent,
        };

        self.patterns
            .iter()
            .find(|(_, regex)| regex.is_match(user_agent))
            .map(|(signature, _)| BotVerdict::Signature(signature))
            .unwrap_or(BotVerdict::Allowed)
    }
}

impl Default for BotFilter {
    fn default() -> Self {
        // Escaped literals always compile.
        Self::new(BOT_SIGNATURES).unwrap_or(Self {
            patterns: Vec::new(),
        })
    }
}
