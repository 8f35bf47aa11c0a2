//! Data structures shared by the check and announce paths.
//!
//! A [`ReleaseSnapshot`] is what one fetch of the vendor page produced.
//! [`ReleaseRecord`] is the persisted last-known state for a device and
//! [`Change`] is the derived difference between the two.  Changes only
//! live for the duration of a single run; nothing here is written to the
//! store directly.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SnapshotError;

/// A tracked software platform such as `iOS` or `macOS`.
///
/// The set of devices is configuration, so this is a thin wrapper around
/// the name rather than an enum.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Device(String);

impl Device {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Device {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Current versions and announcement statements as fetched from the source.
///
/// Construction validates the contents, so a snapshot in hand always has
/// at least one device and only well-formed version strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseSnapshot {
    versions: HashMap<Device, String>,
    statements: HashMap<Device, String>,
}

impl ReleaseSnapshot {
    pub fn new(
        versions: HashMap<Device, String>,
        statements: HashMap<Device, String>,
    ) -> Result<Self, SnapshotError> {
        if versions.is_empty() {
            return Err(SnapshotError::Empty);
        }
        for (device, version) in &versions {
            if !is_dotted_version(version) {
                return Err(SnapshotError::MalformedVersion {
                    device: device.clone(),
                    version: version.clone(),
                });
            }
        }
        Ok(Self {
            versions,
            statements,
        })
    }

    pub fn version(&self, device: &Device) -> Option<&str> {
        self.versions.get(device).map(String::as_str)
    }

    /// The statement for `device`, or an empty string when the source
    /// reported a version without one.
    pub fn statement(&self, device: &Device) -> &str {
        self.statements.get(device).map(String::as_str).unwrap_or("")
    }

    pub fn contains(&self, device: &Device) -> bool {
        self.versions.contains_key(device)
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    /// Tracked devices that this snapshot does not report, in `devices` order.
    pub fn missing<'a>(&self, devices: &'a [Device]) -> Vec<&'a Device> {
        devices.iter().filter(|d| !self.contains(d)).collect()
    }
}

/// `"16.3.2"`, `"17"`; no empty components, no signs, no suffixes.
fn is_dotted_version(version: &str) -> bool {
    !version.is_empty()
        && version
            .split('.')
            .all(|part| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit()))
}

/// The persisted state for one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseRecord {
    pub version: String,
    #[serde(default)]
    pub statement: String,
}

/// A detected version difference for one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub device: Device,
    /// `None` when the store had no record for the device yet.
    pub old_version: Option<String>,
    pub new_version: String,
    pub statement: String,
}

/// Result of applying one [`Change`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Updated,
    UpdateFailed(String),
    UpdatedButNotifyFailed(String),
}

impl Outcome {
    pub fn is_failure(&self) -> bool {
        !matches!(self, Outcome::Updated)
    }
}
