//! Posting to X/Twitter through the v2 tweet endpoint.
//!
//! Requests are signed with OAuth 1.0a user context (HMAC-SHA1), which
//! is what the four long-lived app credentials in [`TwitterConfig`] allow.
//! The JSON body is not part of the signature; only the `oauth_*`
//! parameters and any query string on the endpoint are.

use super::Notifier;
use crate::config::TwitterConfig;
use crate::error::NotifyError;
use async_trait::async_trait;
use base64::Engine;
use hmac::{Hmac, Mac};
use log::{debug, info};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use rand::{distributions::Alphanumeric, Rng};
use sha1::Sha1;
use std::collections::BTreeMap;
use std::time::Duration;

/// RFC 3986 unreserved characters stay literal; everything else is encoded.
const OAUTH_ENCODE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

pub struct TwitterNotifier {
    config: TwitterConfig,
    client: reqwest::Client,
}

impl TwitterNotifier {
    pub fn new(config: TwitterConfig, timeout: Duration) -> anyhow::Result<Self> {
        let missing: Vec<&str> = [
            ("api_key", &config.api_key),
            ("api_secret", &config.api_secret),
            ("access_token", &config.access_token),
            ("access_token_secret", &config.access_token_secret),
        ]
        .into_iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(name, _)| name)
        .collect();
        if !missing.is_empty() {
            anyhow::bail!("Missing Twitter credentials: {}", missing.join(", "));
        }

        let client = reqwest::Client::builder().timeout(timeout).build()?;
        info!("Twitter notifier posting to {}", config.endpoint);
        Ok(Self { config, client })
    }

    fn authorization(&self, nonce: &str, timestamp: u64) -> String {
        let mut params = BTreeMap::from([
            ("oauth_consumer_key", self.config.api_key.clone()),
            ("oauth_nonce", nonce.to_string()),
            ("oauth_signature_method", "HMAC-SHA1".to_string()),
            ("oauth_timestamp", timestamp.to_string()),
            ("oauth_token", self.config.access_token.clone()),
            ("oauth_version", "1.0".to_string()),
        ]);
        let base = signature_base_string("POST", &self.config.endpoint, &params);
        let signature = sign(
            &base,
            &self.config.api_secret,
            &self.config.access_token_secret,
        );
        params.insert("oauth_signature", signature);

        let fields = params
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", encode(k), encode(v)))
            .collect::<Vec<_>>()
            .join(", ");
        format!("OAuth {}", fields)
    }
}

#[async_trait]
impl Notifier for TwitterNotifier {
    async fn post(&self, message: &str) -> Result<(), NotifyError> {
        if message.trim().is_empty() {
            return Err(NotifyError::EmptyMessage);
        }

        let nonce: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();
        let timestamp = chrono::Utc::now().timestamp().max(0) as u64;

        debug!("Posting {} characters", message.chars().count());
        let response = self
            .client
            .post(&self.config.endpoint)
            .header(
                reqwest::header::AUTHORIZATION,
                self.authorization(&nonce, timestamp),
            )
            .json(&serde_json::json!({ "text": message }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected { status, body });
        }
        debug!("Post accepted with status {}", status);
        Ok(())
    }
}

fn encode(value: &str) -> String {
    utf8_percent_encode(value, OAUTH_ENCODE).to_string()
}

/// `METHOD&url&params`, each part percent-encoded, params sorted by key.
/// Query parameters on `url` are folded into the parameter list.
fn signature_base_string(method: &str, url: &str, oauth: &BTreeMap<&str, String>) -> String {
    let (base_url, query) = url.split_once('?').unwrap_or((url, ""));

    let mut pairs: Vec<(String, String)> = oauth
        .iter()
        .map(|(k, v)| (encode(k), encode(v)))
        .collect();
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
        pairs.push((encode(k), encode(v)));
    }
    pairs.sort();

    let params = pairs
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");
    format!(
        "{}&{}&{}",
        method.to_ascii_uppercase(),
        encode(base_url),
        encode(&params)
    )
}

fn sign(base: &str, consumer_secret: &str, token_secret: &str) -> String {
    let key = format!("{}&{}", encode(consumer_secret), encode(token_secret));
    hmac_sha1_base64(key.as_bytes(), base.as_bytes())
}

fn hmac_sha1_base64(key: &[u8], data: &[u8]) -> String {
    let mut mac =
        Hmac::<Sha1>::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(data);
    base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes())
}
