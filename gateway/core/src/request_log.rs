//! Request/Response Logging
//!
//! Every chat request, chat response and health check produces a
//! [`LogEntry`]. Entries go to a [`RequestLog`] sink:
//!
//! - [`TracingRequestLog`]: structured `tracing` events (default)
//! - [`JsonLinesRequestLog`]: one JSON object per line in a file, written by a
//!   background task so request handlers never block on disk
//! - [`MemoryRequestLog`]: kept in memory, for tests
//!
//! Logging never fails a request. Write errors are reported through `tracing`
//! and the entry is dropped.

use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Kind of logged event
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogEvent {
    /// A chat request was accepted
    Request,
    /// A chat answer was returned
    Response,
    /// The health endpoint was hit
    HealthCheck,
}

/// One request log record
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Session the entry belongs to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Prompt text, for request entries
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    /// Answer text, for response entries
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    /// RFC 3339 UTC timestamp
    pub timestamp: String,
    /// Caller address
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    /// What happened
    pub event: LogEvent,
}

impl LogEntry {
    fn new(event: LogEvent, ip_address: Option<&str>) -> Self {
        Self {
            session_id: None,
            prompt: None,
            response: None,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            ip_address: ip_address.map(str::to_string),
            event,
        }
    }

    /// Entry for an accepted chat request
    #[must_use]
    pub fn request(session_id: &str, prompt: &str, ip_address: Option<&str>) -> Self {
        Self {
            session_id: Some(session_id.to_string()),
            prompt: Some(prompt.to_string()),
            ..Self::new(LogEvent::Request, ip_address)
        }
    }

    /// Entry for a returned chat answer
    #[must_use]
    pub fn response(session_id: &str, response: &str, ip_address: Option<&str>) -> Self {
        Self {
            session_id: Some(session_id.to_string()),
            response: Some(response.to_string()),
            ..Self::new(LogEvent::Response, ip_address)
        }
    }

    /// Entry for a health check
    #[must_use]
    pub fn health_check(ip_address: Option<&str>) -> Self {
        Self::new(LogEvent::HealthCheck, ip_address)
    }
}

/// Destination for request log entries
pub trait RequestLog: Send + Sync {
    /// Record one entry; must not block or fail the caller
    fn record(&self, entry: LogEntry);
}

/// Emits entries as structured `tracing` events
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingRequestLog;

impl RequestLog for TracingRequestLog {
    fn record(&self, entry: LogEntry) {
        tracing::info!(
            target: "gateway_core::request_log",
            event = ?entry.event,
            session_id = entry.session_id.as_deref().unwrap_or("-"),
            ip_address = entry.ip_address.as_deref().unwrap_or("-"),
            prompt_len = entry.prompt.as_ref().map_or(0, String::len),
            response_len = entry.response.as_ref().map_or(0, String::len),
            timestamp = %entry.timestamp,
            "request log"
        );
    }
}

/// Keeps entries in memory
#[derive(Debug, Default)]
pub struct MemoryRequestLog {
    entries: Mutex<Vec<LogEntry>>,
}

impl MemoryRequestLog {
    /// Create an empty log
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of recorded entries
    #[must_use]
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().clone()
    }

    /// Recorded entries of one kind
    #[must_use]
    pub fn events(&self, event: LogEvent) -> Vec<LogEntry> {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.event == event)
            .cloned()
            .collect()
    }
}

impl RequestLog for MemoryRequestLog {
    fn record(&self, entry: LogEntry) {
        self.entries.lock().push(entry);
    }
}

/// Channel capacity between handlers and the file writer
const WRITER_CAPACITY: usize = 1024;

/// Appends entries as JSON lines to a file
///
/// The file is opened in append mode. A background task owns it and writes
/// entries in arrival order. Call [`JsonLinesRequestLog::shutdown`] to flush
/// before exit.
pub struct JsonLinesRequestLog {
    path: PathBuf,
    tx: mpsc::Sender<LogEntry>,
    writer: Mutex<Option<JoinHandle<()>>>,
}

impl JsonLinesRequestLog {
    /// Open (or create) `path` and start the writer task
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or its parent directory
    /// cannot be created.
    pub async fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        let (tx, rx) = mpsc::channel(WRITER_CAPACITY);
        let writer = tokio::spawn(write_entries(file, rx, path.clone()));

        tracing::info!(path = %path.display(), "Request log opened");

        Ok(Self {
            path,
            tx,
            writer: Mutex::new(Some(writer)),
        })
    }

    /// Path of the log file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stop accepting entries and wait until queued ones are written
    pub async fn shutdown(self) {
        let Self { tx, writer, .. } = self;
        drop(tx);
        let handle = writer.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Request log writer task failed");
            }
        }
    }
}

impl RequestLog for JsonLinesRequestLog {
    fn record(&self, entry: LogEntry) {
        if let Err(e) = self.tx.try_send(entry) {
            tracing::warn!(error = %e, path = %self.path.display(), "Dropping request log entry");
        }
    }
}

impl std::fmt::Debug for JsonLinesRequestLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonLinesRequestLog")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

async fn write_entries(mut file: tokio::fs::File, mut rx: mpsc::Receiver<LogEntry>, path: PathBuf) {
    while let Some(entry) = rx.recv().await {
        let mut line = match serde_json::to_vec(&entry) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize request log entry");
                continue;
            }
        };
        line.push(b'\n');

        if let Err(e) = file.write_all(&line).await {
            tracing::warn!(error = %e, path = %path.display(), "Failed to write request log entry");
        }
    }

    if let Err(e) = file.flush().await {
        tracing::warn!(error = %e, path = %path.display(), "Failed to flush request log");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_request_entry_serialization() {
        let entry = LogEntry::request("s-1", "What is X?", Some("10.0.0.1"));
        let json = serde_json::to_value(&entry).unwrap();

        assert_eq!(json["session_id"], "s-1");
        assert_eq!(json["prompt"], "What is X?");
        assert_eq!(json["ip_address"], "10.0.0.1");
        assert_eq!(json["event"], "request");
        assert!(json.get("response").is_none());
        assert!(json["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn test_health_check_entry() {
        let entry = LogEntry::health_check(None);
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["event"], "health_check");
        assert!(json.get("session_id").is_none());
    }

    #[test]
    fn test_memory_log_filters_events() {
        let log = MemoryRequestLog::new();
        log.record(LogEntry::request("s", "p", None));
        log.record(LogEntry::response("s", "r", None));
        log.record(LogEntry::health_check(None));

        assert_eq!(log.entries().len(), 3);
        assert_eq!(log.events(LogEvent::Response)[0].response.as_deref(), Some("r"));
    }

    #[tokio::test]
    async fn test_json_lines_log_appends_entries() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("logs").join("requests.jsonl");

        let log = JsonLinesRequestLog::open(&path).await.unwrap();
        log.record(LogEntry::request("s-1", "hello", Some("127.0.0.1")));
        log.record(LogEntry::response("s-1", "hi", Some("127.0.0.1")));
        log.shutdown().await;

        let content = tokio::fs::read_to_string(&path).await.unwrap();
        let entries: Vec<LogEntry> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].event, LogEvent::Request);
        assert_eq!(entries[1].response.as_deref(), Some("hi"));
    }
}
