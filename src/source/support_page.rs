use super::ReleaseSource;
use crate::error::SourceError;
use crate::types::{Device, ReleaseSnapshot};
use async_trait::async_trait;
use log::{debug, info, warn};
use regex::Regex;
use scraper::{Html, Selector};
use std::collections::HashMap;
use std::time::Duration;

/// Text every release line on the support page starts with.
const RELEASE_MARKER: &str = "The latest version";

/// Reads the vendor's "latest software releases" support page.
pub struct SupportPageSource {
    url: String,
    client: reqwest::Client,
    parser: PageParser,
}

impl SupportPageSource {
    pub fn new(url: String, timeout: Duration, devices: &[Device]) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let parser = PageParser::new(devices)?;
        Ok(Self {
            url,
            client,
            parser,
        })
    }
}

#[async_trait]
impl ReleaseSource for SupportPageSource {
    async fn fetch_latest(&self) -> Result<ReleaseSnapshot, SourceError> {
        info!("Fetching release page {}", self.url);
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status(status));
        }
        let body = response.text().await?;
        debug!("Release page is {} bytes", body.len());
        self.parser.parse(&body)
    }
}

/// Turns the support page markup into a snapshot for the tracked devices.
pub struct PageParser {
    devices: Vec<(Device, Regex)>,
    version: Regex,
    sentence: Regex,
}

impl PageParser {
    pub fn new(devices: &[Device]) -> Result<Self, regex::Error> {
        let devices = devices
            .iter()
            .map(|device| {
                let pattern = format!(r"\bof {}\b", regex::escape(device.as_str()));
                Ok((device.clone(), Regex::new(&pattern)?))
            })
            .collect::<Result<Vec<_>, regex::Error>>()?;
        let version = Regex::new(r"\bis\s+(\d+(?:\.\d+)*)")?;
        // A terminator must be followed by whitespace or the end, so the
        // dots inside "17.1" never end a sentence. Terminators inside a
        // parenthetical are not special-cased.
        let sentence = Regex::new(r"^.*?[.!?](?:\s|$)")?;
        Ok(Self {
            devices,
            version,
            sentence,
        })
    }

    pub fn parse(&self, html: &str) -> Result<ReleaseSnapshot, SourceError> {
        let document = Html::parse_document(html);
        let items = Selector::parse("li").map_err(|e| SourceError::Parse(e.to_string()))?;

        let mut versions = HashMap::new();
        let mut statements = HashMap::new();

        for item in document.select(&items) {
            let text = normalize_whitespace(&item.text().collect::<String>());
            if !text.contains(RELEASE_MARKER) {
                continue;
            }
            let statement = self.first_sentence(&text);

            let Some(device) = self.device_for(statement) else {
                debug!("Ignoring release line for untracked platform: {}", statement);
                continue;
            };
            if versions.contains_key(device) {
                continue;
            }
            let Some(version) = self.version_in(statement) else {
                warn!("No version found for {} in {:?}", device, statement);
                continue;
            };

            versions.insert(device.clone(), version.to_string());
            statements.insert(device.clone(), statement.to_string());
        }

        if versions.is_empty() {
            return Err(SourceError::NoStatements);
        }
        Ok(ReleaseSnapshot::new(versions, statements)?)
    }

    /// First configured device named in the statement.
    fn device_for(&self, statement: &str) -> Option<&Device> {
        self.devices
            .iter()
            .find(|(_, pattern)| pattern.is_match(statement))
            .map(|(device, _)| device)
    }

    /// Text up to and including the first sentence terminator, or all of
    /// it when there is none.
    fn first_sentence<'a>(&self, text: &'a str) -> &'a str {
        self.sentence
            .find(text)
            .map_or(text, |m| m.as_str().trim_end())
    }

    fn version_in<'a>(&self, statement: &'a str) -> Option<&'a str> {
        self.version
            .captures(statement)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
    }
}

fn normalize_whitespace(text: &str) -> String {
    text.replace('\u{a0}', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
