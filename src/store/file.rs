use super::ReleaseStore;
use crate::error::StoreError;
use crate::types::{Device, ReleaseRecord};
use async_trait::async_trait;
use log::debug;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Release records kept in one JSON object keyed by device name.
///
/// A missing file is an empty store. Writes go to a sibling temp file
/// that is renamed over the original, so readers never see a torn file.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<BTreeMap<Device, ReleaseRecord>, StoreError> {
        match fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, records: &BTreeMap<Device, ReleaseRecord>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, serde_json::to_vec_pretty(records)?).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl ReleaseStore for JsonFileStore {
    async fn get(&self, device: &Device) -> Result<Option<ReleaseRecord>, StoreError> {
        Ok(self.load().await?.remove(device))
    }

    async fn update(
        &self,
        device: &Device,
        version: &str,
        statement: &str,
    ) -> Result<(), StoreError> {
        let mut records = self.load().await?;
        let record = ReleaseRecord {
            version: version.to_string(),
            statement: statement.to_string(),
        };
        if records.get(device) == Some(&record) {
            debug!("{} already at {}", device, version);
            return Ok(());
        }
        records.insert(device.clone(), record);
        self.save(&records).await?;
        debug!("Wrote {} {} to {}", device, version, self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_missing_file_is_empty_store() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("releases.json"));

        assert_eq!(store.get(&"iOS".into()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_update_creates_then_overwrites() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("state").join("releases.json"));
        let ios = Device::from("iOS");

        store.update(&ios, "17.0", "first").await.unwrap();
        store.update(&"macOS".into(), "14.1", "mac").await.unwrap();
        store.update(&ios, "17.1", "second").await.unwrap();

        assert_eq!(
            store.get(&ios).await.unwrap(),
            Some(ReleaseRecord {
                version: "17.1".to_string(),
                statement: "second".to_string(),
            })
        );
        assert_eq!(store.get(&"macOS".into()).await.unwrap().unwrap().version, "14.1");
        assert!(!dir.path().join("state").join("releases.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_repeated_update_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("releases.json");
        let store = JsonFileStore::new(&path);
        let tvos = Device::from("tvOS");

        store.update(&tvos, "17.1", "s").await.unwrap();
        let first = std::fs::read_to_string(&path).unwrap();
        store.update(&tvos, "17.1", "s").await.unwrap();
        let second = std::fs::read_to_string(&path).unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_reads_hand_written_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("releases.json");
        std::fs::write(&path, r#"{"watchOS": {"version": "10.1"}}"#).unwrap();
        let store = JsonFileStore::new(&path);

        let record = store.get(&"watchOS".into()).await.unwrap().unwrap();
        assert_eq!(record.version, "10.1");
        assert_eq!(record.statement, "");
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("releases.json");
        std::fs::write(&path, "not json").unwrap();
        let store = JsonFileStore::new(&path);

        assert!(matches!(
            store.get(&"iOS".into()).await,
            Err(StoreError::Corrupt(_))
        ));
        assert!(matches!(
            store.update(&"iOS".into(), "17.1", "s").await,
            Err(StoreError::Corrupt(_))
        ));
    }
}
