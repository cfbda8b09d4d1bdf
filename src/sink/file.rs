use super::traits::{LogSink, SinkError};
use crate::fetch::types::{format_record, format_session_header, LogRecord, TimeWindow};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Append-only text file sink.
///
/// The file is never truncated: every session appends a header followed by
/// one `[<timestamp>] <text>` line per record. Each line is flushed before
/// the call returns.
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl FileSink {
    pub fn open(path: &Path) -> Result<Self, SinkError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|source| SinkError::Open {
                    path: path.to_path_buf(),
                    source,
                })?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| SinkError::Open {
                path: path.to_path_buf(),
                source,
            })?;

        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_line(&mut self, line: &str) -> Result<(), SinkError> {
        self.writer
            .write_all(line.as_bytes())
            .and_then(|_| self.writer.flush())
            .map_err(|source| SinkError::Write {
                path: self.path.clone(),
                source,
            })
    }
}

impl LogSink for FileSink {
    fn write_session_header(&mut self, window: &TimeWindow) -> Result<(), SinkError> {
        self.write_line(&format_session_header(window))
    }

    fn append_record(&mut self, record: &LogRecord) -> Result<(), SinkError> {
        self.write_line(&format_record(record))
    }
}
