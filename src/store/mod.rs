use crate::error::StoreError;
use crate::types::{Device, ReleaseRecord};
use async_trait::async_trait;

pub mod file;
pub use file::JsonFileStore;

#[async_trait]
pub trait ReleaseStore: Send + Sync {
    async fn get(&self, device: &Device) -> Result<Option<ReleaseRecord>, StoreError>;

    /// Upsert keyed by device. Calling it again with the same arguments
    /// leaves the store unchanged.
    async fn update(
        &self,
        device: &Device,
        version: &str,
        statement: &str,
    ) -> Result<(), StoreError>;
}
