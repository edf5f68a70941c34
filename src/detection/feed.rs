//! Newline-delimited JSON frame feed.

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::warn;

use super::types::FrameReport;

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("Failed to read detector output: {0}")]
    Io(#[from] std::io::Error),
}

/// Reads one `FrameReport` per line from a detector stream or a recording.
pub struct FrameFeed<R> {
    reader: R,
    buf: Vec<u8>,
    line_number: u64,
    skipped: u64,
}

impl<R: AsyncBufRead + Unpin> FrameFeed<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            line_number: 0,
            skipped: 0,
        }
    }

    /// Returns the next report, or `None` at end of input.
    ///
    /// Blank lines are ignored. Lines that are not valid UTF-8 or not valid
    /// reports are logged and skipped.
    pub async fn next_report(&mut self) -> Result<Option<FrameReport>, FeedError> {
        loop {
            // Bytes stay in `buf` if a caller drops this future mid-line.
            let read = self.reader.read_until(b'\n', &mut self.buf).await?;
            if read == 0 && self.buf.is_empty() {
                return Ok(None);
            }
            let bytes = std::mem::take(&mut self.buf);
            self.line_number += 1;

            let Ok(line) = std::str::from_utf8(&bytes) else {
                self.skipped += 1;
                warn!("Skipping undecodable frame report on line {}", self.line_number);
                continue;
            };

            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match serde_json::from_str::<FrameReport>(line) {
                Ok(report) => return Ok(Some(report)),
                Err(e) => {
                    self.skipped += 1;
                    warn!("Skipping malformed frame report on line {}: {}", self.line_number, e);
                }
            }
        }
    }

    /// Number of malformed lines skipped so far.
    pub const fn skipped(&self) -> u64 {
        self.skipped
    }
}
