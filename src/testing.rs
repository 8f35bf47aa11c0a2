//! In-memory collaborators for unit tests.

use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{NotifyError, SourceError, StoreError};
use crate::notifier::Notifier;
use crate::source::ReleaseSource;
use crate::store::ReleaseStore;
use crate::types::{Device, ReleaseRecord, ReleaseSnapshot};

#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<Device, ReleaseRecord>>,
    updates: Mutex<Vec<(Device, String, String)>>,
    failing_writes: HashSet<Device>,
    failing_reads: HashSet<Device>,
}

impl MemoryStore {
    pub fn with_records(records: &[(&str, &str, &str)]) -> Self {
        let records = records
            .iter()
            .map(|(device, version, statement)| {
                (
                    Device::from(*device),
                    ReleaseRecord {
                        version: version.to_string(),
                        statement: statement.to_string(),
                    },
                )
            })
            .collect();
        Self {
            records: Mutex::new(records),
            ..Default::default()
        }
    }

    pub fn fail_writes_for(mut self, device: &str) -> Self {
        self.failing_writes.insert(Device::from(device));
        self
    }

    pub fn fail_reads_for(mut self, device: &str) -> Self {
        self.failing_reads.insert(Device::from(device));
        self
    }

    /// Every update call seen, including failed ones.
    pub fn updates(&self) -> Vec<(Device, String, String)> {
        self.updates.lock().unwrap().clone()
    }

    pub fn record(&self, device: &str) -> Option<ReleaseRecord> {
        self.records.lock().unwrap().get(&Device::from(device)).cloned()
    }
}

#[async_trait]
impl ReleaseStore for MemoryStore {
    async fn get(&self, device: &Device) -> Result<Option<ReleaseRecord>, StoreError> {
        if self.failing_reads.contains(device) {
            return Err(io::Error::other(format!("read refused for {device}")).into());
        }
        Ok(self.records.lock().unwrap().get(device).cloned())
    }

    async fn update(
        &self,
        device: &Device,
        version: &str,
        statement: &str,
    ) -> Result<(), StoreError> {
        self.updates.lock().unwrap().push((
            device.clone(),
            version.to_string(),
            statement.to_string(),
        ));
        if self.failing_writes.contains(device) {
            return Err(io::Error::other(format!("write refused for {device}")).into());
        }
        self.records.lock().unwrap().insert(
            device.clone(),
            ReleaseRecord {
                version: version.to_string(),
                statement: statement.to_string(),
            },
        );
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    posts: Mutex<Vec<String>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    /// Every post attempt, including failed ones.
    pub fn posts(&self) -> Vec<String> {
        self.posts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn post(&self, message: &str) -> Result<(), NotifyError> {
        self.posts.lock().unwrap().push(message.to_string());
        if self.fail {
            return Err(NotifyError::Rejected {
                status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
                body: "unavailable".to_string(),
            });
        }
        Ok(())
    }
}

pub enum StubSource {
    Snapshot(ReleaseSnapshot),
    Unreachable,
}

impl StubSource {
    pub fn with_versions(pairs: &[(&str, &str, &str)]) -> Self {
        let versions = pairs
            .iter()
            .map(|(d, v, _)| (Device::from(*d), v.to_string()))
            .collect();
        let statements = pairs
            .iter()
            .map(|(d, _, s)| (Device::from(*d), s.to_string()))
            .collect();
        Self::Snapshot(ReleaseSnapshot::new(versions, statements).unwrap())
    }
}

#[async_trait]
impl ReleaseSource for StubSource {
    async fn fetch_latest(&self) -> Result<ReleaseSnapshot, SourceError> {
        match self {
            StubSource::Snapshot(snapshot) => Ok(snapshot.clone()),
            StubSource::Unreachable => Err(SourceError::NoStatements),
        }
    }
}

pub fn devices(names: &[&str]) -> Vec<Device> {
    names.iter().map(|name| Device::from(*name)).collect()
}

/// Serve a single canned HTTP response on a random local port and return
/// its base URL.
pub async fn serve_once(status: &str, body: &str) -> String {
    serve_once_capturing(status, body).await.0
}

/// Like [`serve_once`], also handing back the raw request once answered.
pub async fn serve_once_capturing(
    status: &str,
    body: &str,
) -> (String, tokio::sync::oneshot::Receiver<String>) {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let response = format!(
        "HTTP/1.1 {status}\r\ncontent-type: text/html\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
        body.len()
    );
    let (tx, rx) = tokio::sync::oneshot::channel();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
            if request_complete(&request) {
                break;
            }
        }
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();
        let _ = tx.send(String::from_utf8_lossy(&request).into_owned());
    });

    (format!("http://{addr}/"), rx)
}

/// Headers received and, if a content-length was sent, the whole body.
fn request_complete(request: &[u8]) -> bool {
    let text = String::from_utf8_lossy(request);
    let Some(header_end) = text.find("\r\n\r\n") else {
        return false;
    };
    let content_length = text[..header_end]
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    request.len() >= header_end + 4 + content_length
}
