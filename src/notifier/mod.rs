use crate::error::NotifyError;
use async_trait::async_trait;

pub mod twitter;
pub use twitter::TwitterNotifier;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn post(&self, message: &str) -> Result<(), NotifyError>;
}
