use anyhow::Context;
use figment::{
    providers::{Env, Format, Json, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::types::Device;

const ENV_PREFIX: &str = "RELEASE_NOTIFY_";
const SECRET_NAMES: [&str; 4] = ["API_KEY", "API_SECRET", "ACCESS_TOKEN", "ACCESS_TOKEN_SECRET"];

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Tracked devices, in the order changes are processed and announced.
    pub devices: Vec<Device>,
    pub source_url: String,
    pub http_timeout_secs: u64,
    pub store_path: PathBuf,
    /// Post from the check run itself. Turn off only when something
    /// downstream of the store feeds `announce` from its change stream.
    pub notify_on_change: bool,
    /// Treat a page that omits any tracked device as invalid.
    pub require_all_devices: bool,
    /// Keys match device names regardless of case, since environment
    /// variables arrive lowercased.
    #[serde(default)]
    pub hashtags: BTreeMap<Device, Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub twitter: Option<TwitterConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            devices: ["iOS", "macOS", "watchOS", "tvOS", "visionOS"]
                .into_iter()
                .map(Device::from)
                .collect(),
            source_url: "https://support.apple.com/en-us/HT201222".into(),
            http_timeout_secs: 30,
            store_path: "releases.json".into(),
            notify_on_change: true,
            require_all_devices: false,
            hashtags: BTreeMap::new(),
            twitter: None,
        }
    }
}

#[derive(Clone, Default, Deserialize, Serialize)]
pub struct TwitterConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_secret: String,
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub access_token_secret: String,
    #[serde(default = "default_tweet_endpoint")]
    pub endpoint: String,
}

fn default_tweet_endpoint() -> String {
    "https://api.twitter.com/2/tweets".into()
}

// Config is logged at startup; keep credentials out of it.
impl fmt::Debug for TwitterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |s: &str| if s.is_empty() { "<unset>" } else { "<redacted>" };
        f.debug_struct("TwitterConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_secret", &redact(&self.api_secret))
            .field("access_token", &redact(&self.access_token))
            .field("access_token_secret", &redact(&self.access_token_secret))
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl TwitterConfig {
    fn secrets_mut(&mut self) -> [(&'static str, &mut String); 4] {
        [
            ("API_KEY", &mut self.api_key),
            ("API_SECRET", &mut self.api_secret),
            ("ACCESS_TOKEN", &mut self.access_token),
            ("ACCESS_TOKEN_SECRET", &mut self.access_token_secret),
        ]
    }
}

impl Config {
    /// Defaults, then `release-notify.toml`, `release-notify.json`, the
    /// optional explicit file and finally `RELEASE_NOTIFY_*` variables.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file("release-notify.toml"))
            .merge(Json::file("release-notify.json"));
        if let Some(path) = explicit {
            if !path.exists() {
                anyhow::bail!("Config file {} does not exist", path.display());
            }
            figment = figment.merge(Toml::file(path));
        }

        let mut config: Config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

        // Support Docker-style secrets
        config.apply_secret_files(|name| std::env::var(name).ok())?;

        config.validate()?;
        config.canonicalize_hashtags();
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.devices.is_empty() {
            anyhow::bail!("At least one device must be configured");
        }
        let mut seen = HashSet::new();
        for device in &self.devices {
            if !seen.insert(device.as_str().to_ascii_lowercase()) {
                anyhow::bail!("Device {} is configured more than once", device);
            }
        }
        Ok(())
    }

    /// Re-key hashtag entries onto the configured device spelling. An entry
    /// whose key differs only in case (the environment's lowercased form)
    /// overrides the exactly spelled one.
    fn canonicalize_hashtags(&mut self) {
        let hashtags = std::mem::take(&mut self.hashtags);
        let (exact, folded): (Vec<_>, Vec<_>) = hashtags
            .into_iter()
            .partition(|(key, _)| self.devices.contains(key));
        for (key, tags) in exact.into_iter().chain(folded) {
            let key = self
                .devices
                .iter()
                .find(|d| d.as_str().eq_ignore_ascii_case(key.as_str()))
                .cloned()
                .unwrap_or(key);
            self.hashtags.insert(key, tags);
        }
    }

    /// `RELEASE_NOTIFY_TWITTER_<FIELD>_FILE` replaces the credential with
    /// the trimmed file contents.
    fn apply_secret_files(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<()> {
        let mut overrides = BTreeMap::new();
        for name in SECRET_NAMES {
            let var = format!("{ENV_PREFIX}TWITTER_{name}_FILE");
            let Some(file) = lookup(&var) else {
                continue;
            };
            let value = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {} from {}", var, file))?;
            overrides.insert(name, value.trim().to_string());
        }
        if overrides.is_empty() {
            return Ok(());
        }

        let twitter = self.twitter.get_or_insert_with(|| TwitterConfig {
            endpoint: default_tweet_endpoint(),
            ..Default::default()
        });
        for (name, slot) in twitter.secrets_mut() {
            if let Some(value) = overrides.remove(name) {
                *slot = value;
            }
        }
        Ok(())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}
