//! Announcing releases from store change-stream events.
//!
//! When the store publishes a change stream, notification can be
//! decoupled from the check run: the check only writes, and each stream
//! record carrying a new image is announced here.  Records are processed
//! independently; a malformed record or a failed post never stops the
//! rest of the batch.

use anyhow::Context;
use log::{error, info, warn};
use serde::Deserialize;
use serde_json::Value;

use crate::driver::MessageFormat;
use crate::notifier::Notifier;
use crate::types::Device;

/// A change-stream batch as delivered by the trigger.
#[derive(Debug, Default, Deserialize)]
pub struct StreamEvent {
    #[serde(rename = "Records", default)]
    pub records: Vec<Value>,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct AnnounceReport {
    pub posted: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// The statement (and device, if present) carried by one record.
#[derive(Debug, PartialEq, Eq)]
struct Announcement {
    device: Option<Device>,
    statement: String,
}

fn string_attribute<'a>(image: &'a Value, name: &str) -> Option<&'a str> {
    image.get(name)?.get("S")?.as_str()
}

fn announcement(record: &Value) -> Result<Announcement, &'static str> {
    let image = record
        .get("dynamodb")
        .and_then(|d| d.get("NewImage"))
        .ok_or("record has no new image")?;
    let statement = string_attribute(image, "ReleaseStatement")
        .filter(|s| !s.trim().is_empty())
        .ok_or("record has no release statement")?;
    Ok(Announcement {
        device: string_attribute(image, "device").map(Device::from),
        statement: statement.to_string(),
    })
}

/// Post one announcement per usable record.
pub async fn announce(
    event: &StreamEvent,
    devices: &[Device],
    notifier: &dyn Notifier,
    format: &MessageFormat,
    timestamp: i64,
) -> AnnounceReport {
    let mut report = AnnounceReport::default();

    for (index, record) in event.records.iter().enumerate() {
        let item = match announcement(record) {
            Ok(item) => item,
            Err(reason) => {
                warn!("Skipping record {}: {}", index, reason);
                report.skipped += 1;
                continue;
            }
        };

        let message = match &item.device {
            Some(device) if !devices.contains(device) => {
                warn!("Skipping record {}: untracked device {}", index, device);
                report.skipped += 1;
                continue;
            }
            Some(device) => format.format(device, &item.statement, timestamp),
            None => item.statement.clone(),
        };

        match notifier.post(&message).await {
            Ok(()) => {
                info!(
                    "Announced record {} ({})",
                    index,
                    item.device.as_ref().map_or("no device", Device::as_str)
                );
                report.posted += 1;
            }
            Err(e) => {
                error!("Failed to announce record {}: {}", index, e);
                report.failed += 1;
            }
        }
    }

    report
}

/// Parse a raw event and announce it.
///
/// `build` is only called when the event carries records, so an empty
/// batch never needs credentials. Any failed post makes the whole call an
/// error once the batch has been processed.
pub async fn handle_event<N, F>(
    raw: &str,
    devices: &[Device],
    format: &MessageFormat,
    timestamp: i64,
    build: F,
) -> anyhow::Result<AnnounceReport>
where
    N: Notifier,
    F: FnOnce() -> anyhow::Result<N>,
{
    let event: StreamEvent = serde_json::from_str(raw).context("Event is not valid JSON")?;
    if event.records.is_empty() {
        warn!("Event contains no records");
        return Ok(AnnounceReport::default());
    }

    let notifier = build()?;
    let report = announce(&event, devices, &notifier, format, timestamp).await;
    info!(
        "Announce complete: {} posted, {} skipped, {} failed",
        report.posted, report.skipped, report.failed
    );
    if report.failed > 0 {
        anyhow::bail!("{} announcements failed", report.failed);
    }
    Ok(report)
}
