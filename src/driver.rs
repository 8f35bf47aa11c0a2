//! Update driver: persists detected changes and announces them.

use std::collections::BTreeMap;

use chrono::DateTime;
use log::{error, info, warn};

use crate::notifier::Notifier;
use crate::store::ReleaseStore;
use crate::types::{Change, Device, Outcome};

/// Tag appended after the device tag when a device has no configured set.
const DEFAULT_VENDOR_TAG: &str = "#apple";

/// Renders announcement text.
///
/// Output depends only on the device, statement and timestamp passed in,
/// plus the hashtag table fixed at construction.
#[derive(Debug, Clone, Default)]
pub struct MessageFormat {
    hashtags: BTreeMap<Device, Vec<String>>,
}

impl MessageFormat {
    pub fn new(hashtags: BTreeMap<Device, Vec<String>>) -> Self {
        Self { hashtags }
    }

    pub fn format(&self, device: &Device, statement: &str, timestamp: i64) -> String {
        let when = DateTime::from_timestamp(timestamp, 0)
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| timestamp.to_string());
        format!(
            "{device} release available!\n{statement}\n{when}\n{}",
            self.tags_for(device).join(" ")
        )
    }

    fn tags_for(&self, device: &Device) -> Vec<String> {
        match self.hashtags.get(device) {
            Some(tags) => tags.clone(),
            None => vec![format!("#{device}"), DEFAULT_VENDOR_TAG.to_string()],
        }
    }
}

/// Apply every change in order and report one outcome per change.
///
/// A failure for one device never stops the others. The store write comes
/// first; the notifier is only called once the new version is persisted.
pub async fn apply_changes(
    changes: &[Change],
    store: &dyn ReleaseStore,
    notifier: Option<&dyn Notifier>,
    format: &MessageFormat,
    timestamp: i64,
) -> Vec<(Device, Outcome)> {
    let mut outcomes = Vec::with_capacity(changes.len());

    for change in changes {
        let device = &change.device;
        let outcome = match store
            .update(device, &change.new_version, &change.statement)
            .await
        {
            Err(e) => {
                error!("Failed to store {} {}: {}", device, change.new_version, e);
                Outcome::UpdateFailed(e.to_string())
            }
            Ok(()) => {
                info!(
                    "Stored {} {} (was {})",
                    device,
                    change.new_version,
                    change.old_version.as_deref().unwrap_or("unknown")
                );
                match notifier {
                    None => Outcome::Updated,
                    Some(_) if change.statement.is_empty() => {
                        warn!("No release statement for {}; skipping notification", device);
                        Outcome::Updated
                    }
                    Some(notifier) => {
                        let message = format.format(device, &change.statement, timestamp);
                        match notifier.post(&message).await {
                            Ok(()) => {
                                info!("Announced {} {}", device, change.new_version);
                                Outcome::Updated
                            }
                            Err(e) => {
                                error!("Failed to announce {}: {}", device, e);
                                Outcome::UpdatedButNotifyFailed(e.to_string())
                            }
                        }
                    }
                }
            }
        };
        outcomes.push((device.clone(), outcome));
    }

    outcomes
}
