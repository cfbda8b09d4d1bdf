use crate::fetch::types::{LogRecord, TimeWindow};
use std::path::PathBuf;

/// Destination for fetched log records.
///
/// Implementations must make each call durable before returning, since the
/// fetcher never rolls back what it has already written.
pub trait LogSink: Send {
    /// Marks the start of a fetch session for the requested window.
    fn write_session_header(&mut self, window: &TimeWindow) -> Result<(), SinkError>;

    fn append_record(&mut self, record: &LogRecord) -> Result<(), SinkError>;
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("failed to open '{}': {source}", .path.display())]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write to '{}': {source}", .path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}
