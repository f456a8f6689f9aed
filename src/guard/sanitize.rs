//! Prompt text sanitization.
//!
//! Text is cleaned before it is embedded in a prompt sent to the LLM.
//! This is defense in depth only; the LLM provider is the trust boundary.

use crate::config::SanitizerConfig;
use regex::{Regex, RegexBuilder};

/// Strips control characters, denylisted markers and HTML-like tags.
#[derive(Debug, Clone)]
pub struct Sanitizer {
    denylist: Option<Regex>,
    tags: Option<Regex>,
    max_length: usize,
}

impl Sanitizer {
    /// Build a sanitizer from its policy.
    pub fn new(config: &SanitizerConfig) -> Result<Self, regex::Error> {
        let markers: Vec<String> = config
            .denylist
            .iter()
            .filter(|marker| !marker.is_empty())
            .map(|marker| regex::escape(marker.as_str()))
            .collect();

        let denylist = if markers.is_empty() {
            None
        } else {
            Some(
                RegexBuilder::new(&markers.join("|"))
                    .case_insensitive(true)
                    .build()?,
            )
        };

        let tags = if config.strip_tags {
            Some(Regex::new(r"</?[A-Za-z!][^<>]*>")?)
        } else {
            None
        };

        Ok(Self {
            denylist,
            tags,
            max_length: config.max_length,
        })
    }

    /// Sanitize `input`.
    ///
    /// Order matters: control characters go first so they cannot split a
    /// marker, and marker removal repeats until nothing matches so that
    /// nested markers cannot reassemble.
    pub fn sanitize(&self, input: &str) -> String {
        let mut text: String = input
            .chars()
            .filter(|ch| !ch.is_control() || matches!(ch, '\n' | '\t' | '\r'))
            .collect();

        if let Some(ref denylist) = self.denylist {
            text = remove_all(denylist, text);
        }

        if let Some(ref tags) = self.tags {
            text = remove_all(tags, text);
        }

        if text.chars().count() > self.max_length {
            text = text.chars().take(self.max_length).collect();
        }

        text
    }
}

fn remove_all(pattern: &Regex, mut text: String) -> String {
    while pattern.is_match(&text) {
        text = pattern.replace_all(&text, "").into_owned();
    }
    text
}
