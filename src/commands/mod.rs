pub mod chat;
pub mod conversations;
pub mod documents;

use std::sync::Arc;

use crate::auth::{AuthNotifier, MemoryCredentials};
use crate::config::ClientConfig;
use crate::highlight::{Highlight, MarkedSection};
use crate::protocol::TagSelection;
use crate::store::ApiClient;

/// Shared wiring for every subcommand.
pub struct App {
    pub config: Arc<ClientConfig>,
    pub credentials: Arc<MemoryCredentials>,
    pub auth: AuthNotifier,
}

impl App {
    pub fn new(config: ClientConfig) -> Self {
        let credentials = Arc::new(MemoryCredentials::new(config.token.clone()));
        Self {
            config: Arc::new(config),
            credentials,
            auth: AuthNotifier::new(),
        }
    }

    pub fn api(&self) -> ApiClient {
        ApiClient::new(
            self.config.clone(),
            self.credentials.clone(),
            self.auth.clone(),
        )
    }
}

/// Parse `key:value`.
pub fn parse_tag(raw: &str) -> Result<TagSelection, String> {
    match raw.split_once(':') {
        Some((key, value)) if !key.is_empty() && !value.is_empty() => Ok(TagSelection {
            key: key.to_string(),
            value: value.to_string(),
        }),
        _ => Err(format!("expected key:value, got {:?}", raw)),
    }
}

pub fn print_sections(sections: &[MarkedSection]) {
    for section in sections {
        if let Some(speaker) = &section.speaker {
            println!("{}:", speaker);
        }
        for paragraph in &section.paragraphs {
            match paragraph.highlight() {
                Highlight::Marked {
                    before,
                    marked,
                    after,
                } => println!("  {}>>>{}<<<{}", before, marked, after),
                Highlight::Unmarked(text) => println!("  {}", text),
            }
        }
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tag() {
        let tag = parse_tag("ticker:ACME").unwrap();
        assert_eq!((tag.key.as_str(), tag.value.as_str()), ("ticker", "ACME"));
        assert_eq!(parse_tag("year:2024:Q1").unwrap().value, "2024:Q1");
        assert!(parse_tag("ticker").is_err());
        assert!(parse_tag(":ACME").is_err());
    }
}
