//! Diff engine: decides which devices changed since the last run.

use std::collections::{HashMap, HashSet};

use crate::error::SnapshotError;
use crate::types::{Change, Device, ReleaseRecord, ReleaseSnapshot};

/// Compare a fresh snapshot against persisted records.
///
/// Iterates `devices` in declared order so output is deterministic. A
/// device missing from `persisted` counts as changed; a device missing
/// from `fresh` is ignored, so a partial scrape never looks like a revert.
/// Versions are compared by string equality only. A device listed twice
/// is reported once, at its first position.
pub fn compute_changes(
    devices: &[Device],
    fresh: &ReleaseSnapshot,
    persisted: &HashMap<Device, ReleaseRecord>,
) -> Result<Vec<Change>, SnapshotError> {
    if fresh.is_empty() {
        return Err(SnapshotError::Empty);
    }

    let mut seen = HashSet::new();
    let changes = devices
        .iter()
        .filter(|device| seen.insert(*device))
        .filter_map(|device| {
            let new_version = fresh.version(device)?;
            let old = persisted.get(device);
            if old.is_some_and(|record| record.version == new_version) {
                return None;
            }
            Some(Change {
                device: device.clone(),
                old_version: old.map(|record| record.version.clone()),
                new_version: new_version.to_string(),
                statement: fresh.statement(device).to_string(),
            })
        })
        .collect();

    Ok(changes)
}
