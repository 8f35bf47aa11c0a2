use crate::error::SourceError;
use crate::types::ReleaseSnapshot;
use async_trait::async_trait;

pub mod support_page;
pub use support_page::SupportPageSource;

#[async_trait]
pub trait ReleaseSource: Send + Sync {
    /// Fetch the current versions and statements for the tracked devices.
    /// Failure is always explicit; an empty snapshot is never returned.
    async fn fetch_latest(&self) -> Result<ReleaseSnapshot, SourceError>;
}
