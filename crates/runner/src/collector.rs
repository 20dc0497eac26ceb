//! Capture and reporting of the update command's stderr.
//!
//! Each run gets its own [`OutputCollector`]. The run hands one clone to the
//! task copying the child's stderr and keeps another for the drain step, so
//! no buffer outlives its run and nothing is shared between runs.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, warn};

/// Banner line written around reported stderr.
const SEPARATOR: &str = "--------------------------------------------------";

/// Header line written after the opening separator.
const HEADER: &str = "update command stderr:";

/// Append-only byte buffer fed by a subprocess's stderr.
#[derive(Debug, Clone, Default)]
pub struct OutputCollector {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl OutputCollector {
    /// Creates an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends raw bytes.
    pub fn append(&self, bytes: &[u8]) {
        self.lock().extend_from_slice(bytes);
    }

    /// Number of bytes captured and not yet drained.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` if nothing is waiting to be drained.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies `reader` into the buffer until EOF and returns the number of
    /// bytes copied.
    ///
    /// A read error ends the copy; whatever arrived before it stays in the
    /// buffer.
    pub async fn copy_from<R>(&self, mut reader: R) -> usize
    where
        R: AsyncRead + Unpin,
    {
        let mut chunk = [0u8; 4096];
        let mut total = 0;
        loop {
            match reader.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => {
                    self.append(&chunk[..n]);
                    total += n;
                }
                Err(e) => {
                    debug!(error = %e, "stderr copy ended with a read error");
                    break;
                }
            }
        }
        total
    }

    /// Logs every captured line between two separator lines and empties the
    /// buffer. Returns the number of lines logged.
    ///
    /// The buffer is taken before anything is logged, so it is empty on
    /// return even if a subscriber panics partway. An empty buffer logs
    /// nothing, not even the banner.
    pub fn drain(&self) -> usize {
        let captured = std::mem::take(&mut *self.lock());
        let lines = split_lines(&captured);
        if lines.is_empty() {
            return 0;
        }

        warn!("{SEPARATOR}");
        warn!("{HEADER}");
        let _closing = ClosingSeparator;
        for line in &lines {
            warn!("{line}");
        }
        lines.len()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<u8>> {
        // A panic while holding the lock cannot leave the bytes half-written
        // in a way that matters for reporting.
        self.buf.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Writes the closing separator when the drain scope ends.
struct ClosingSeparator;

impl Drop for ClosingSeparator {
    fn drop(&mut self) {
        warn!("{SEPARATOR}");
    }
}

/// Splits captured bytes into lines.
///
/// Lines end at `\n`; a trailing `\r` is dropped. A final line without a
/// newline is kept, a final empty segment is not. Invalid UTF-8 is replaced.
pub(crate) fn split_lines(bytes: &[u8]) -> Vec<String> {
    if bytes.is_empty() {
        return Vec::new();
    }
    let body = bytes.strip_suffix(b"\n").unwrap_or(bytes);
    body.split(|b| *b == b'\n')
        .map(|line| {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            String::from_utf8_lossy(line).into_owned()
        })
        .collect()
}
