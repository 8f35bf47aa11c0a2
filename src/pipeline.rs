//! One scheduled check: fetch, diff against the store, apply.

use std::collections::HashMap;

use log::{info, warn};

use crate::config::Config;
use crate::diff::compute_changes;
use crate::driver::{apply_changes, MessageFormat};
use crate::error::{DegradedRun, RunError, SnapshotError};
use crate::notifier::Notifier;
use crate::source::ReleaseSource;
use crate::store::ReleaseStore;
use crate::types::{Device, Outcome};

/// Settings for a check run that are not collaborators.
pub struct CheckOptions<'a> {
    pub devices: &'a [Device],
    pub require_all_devices: bool,
    pub format: &'a MessageFormat,
    pub timestamp: i64,
}

impl<'a> CheckOptions<'a> {
    pub fn from_config(cfg: &'a Config, format: &'a MessageFormat, timestamp: i64) -> Self {
        Self {
            devices: &cfg.devices,
            require_all_devices: cfg.require_all_devices,
            format,
            timestamp,
        }
    }
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub outcomes: Vec<(Device, Outcome)>,
}

impl RunReport {
    pub fn failures(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| o.is_failure()).count()
    }

    /// At least one device update or announcement failed.
    pub fn is_degraded(&self) -> bool {
        self.failures() > 0
    }

    /// Turn a degraded run into an error so the process exits non-zero.
    pub fn ensure_complete(&self) -> Result<(), DegradedRun> {
        match self.failures() {
            0 => Ok(()),
            failed => Err(DegradedRun {
                failed,
                total: self.outcomes.len(),
            }),
        }
    }
}

/// Run one check.
///
/// Every error returned here happens before the first store write, so an
/// aborted run leaves persisted state untouched. Per-device failures after
/// that point are reported in the [`RunReport`] instead.
pub async fn run_check(
    source: &dyn ReleaseSource,
    store: &dyn ReleaseStore,
    notifier: Option<&dyn Notifier>,
    opts: &CheckOptions<'_>,
) -> Result<RunReport, RunError> {
    let fresh = source.fetch_latest().await?;
    info!("Fetched {} release versions", fresh.len());

    let missing = fresh.missing(opts.devices);
    if !missing.is_empty() {
        let names = missing
            .iter()
            .map(|d| d.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        if opts.require_all_devices {
            return Err(SnapshotError::MissingDevices(names).into());
        }
        warn!("Source did not report: {}", names);
    }

    let mut persisted = HashMap::new();
    for device in opts.devices {
        match store.get(device).await {
            Ok(Some(record)) => {
                persisted.insert(device.clone(), record);
            }
            Ok(None) => info!("No stored release for {}", device),
            Err(source) => {
                return Err(RunError::StoreReadFailed {
                    device: device.clone(),
                    source,
                })
            }
        }
    }

    let changes = compute_changes(opts.devices, &fresh, &persisted)?;
    if changes.is_empty() {
        info!("No new releases");
        return Ok(RunReport::default());
    }
    info!("{} device(s) changed", changes.len());

    let outcomes = apply_changes(&changes, store, notifier, opts.format, opts.timestamp).await;
    Ok(RunReport { outcomes })
}
