//! Transcript buffering and durable dictation storage.
//!
//! Passive mode and dictation mode both accumulate timestamped
//! transcripts, but with different lifecycles: the passive buffer is
//! flushed (and cleared) into a single prompt when the user addresses
//! the assistant, while the dictation log is append-only: dispatch
//! reads a bounded tail for context and never clears it.

use crate::error::{Result, SessionError};
use chrono::{DateTime, Local};
use std::io::Write;
use std::path::{Path, PathBuf};

/// One transcript line with its arrival timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedLine {
    /// When the line arrived.
    pub at: DateTime<Local>,
    /// The transcript text.
    pub text: String,
}

impl TimedLine {
    /// Stamp a line with the current local time.
    #[must_use]
    pub fn now(text: impl Into<String>) -> Self {
        Self {
            at: Local::now(),
            text: text.into(),
        }
    }
}

/// An ordered, append-only sequence of timestamped transcripts.
///
/// Entries are strictly ordered by arrival; there is no way to insert
/// in the middle.
#[derive(Debug, Default)]
pub struct TranscriptBuffer {
    lines: Vec<TimedLine>,
}

impl TranscriptBuffer {
    /// Create an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a line, stamped now.
    pub fn push(&mut self, text: impl Into<String>) {
        self.lines.push(TimedLine::now(text));
    }

    /// Number of buffered lines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Whether the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Take every buffered line, leaving the buffer empty.
    pub fn drain(&mut self) -> Vec<TimedLine> {
        std::mem::take(&mut self.lines)
    }

    /// The last `n` lines, oldest first.
    #[must_use]
    pub fn tail(&self, n: usize) -> &[TimedLine] {
        let start = self.lines.len().saturating_sub(n);
        &self.lines[start..]
    }
}

/// Durable dictation storage boundary.
///
/// The underlying storage is an external concern; implementations only
/// promise that appended lines survive and that a bounded tail can be
/// read back in order.
pub trait DictationLog: Send {
    /// Append one transcript line.
    ///
    /// # Errors
    ///
    /// Returns an error if the line cannot be persisted.
    fn append(&mut self, line: TimedLine) -> Result<()>;

    /// The last `n` appended lines, oldest first.
    fn tail(&self, n: usize) -> Vec<TimedLine>;

    /// Total number of lines appended so far.
    fn len(&self) -> usize;

    /// Whether nothing has been appended yet.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory dictation log. Used when no durable storage is wired up,
/// and by tests.
#[derive(Debug, Default)]
pub struct MemoryDictationLog {
    lines: Vec<TimedLine>,
}

impl MemoryDictationLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl DictationLog for MemoryDictationLog {
    fn append(&mut self, line: TimedLine) -> Result<()> {
        self.lines.push(line);
        Ok(())
    }

    fn tail(&self, n: usize) -> Vec<TimedLine> {
        let start = self.lines.len().saturating_sub(n);
        self.lines[start..].to_vec()
    }

    fn len(&self) -> usize {
        self.lines.len()
    }
}

/// File-backed dictation log: one tab-separated `timestamp\ttext` line
/// per entry, appended and flushed as it arrives. A full in-memory
/// mirror serves tail reads.
pub struct FileDictationLog {
    path: PathBuf,
    file: std::fs::File,
    lines: Vec<TimedLine>,
}

impl FileDictationLog {
    /// Open (or create) a dictation log file in `dir`, named by the
    /// session start time.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be created.
    pub fn create_in(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .map_err(|e| SessionError::Dictation(format!("cannot create log dir: {e}")))?;
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        let path = dir.join(format!("dictation_{stamp}.log"));
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| {
                SessionError::Dictation(format!("cannot open {}: {e}", path.display()))
            })?;
        Ok(Self {
            path,
            file,
            lines: Vec::new(),
        })
    }

    /// The log file's path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Default dictation log directory (`<data_dir>/iris/dictation`).
    #[must_use]
    pub fn default_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("iris")
            .join("dictation")
    }
}

impl DictationLog for FileDictationLog {
    fn append(&mut self, line: TimedLine) -> Result<()> {
        writeln!(self.file, "{}\t{}", line.at.to_rfc3339(), line.text)
            .map_err(|e| SessionError::Dictation(format!("write failed: {e}")))?;
        self.file
            .flush()
            .map_err(|e| SessionError::Dictation(format!("flush failed: {e}")))?;
        self.lines.push(line);
        Ok(())
    }

    fn tail(&self, n: usize) -> Vec<TimedLine> {
        let start = self.lines.len().saturating_sub(n);
        self.lines[start..].to_vec()
    }

    fn len(&self) -> usize {
        self.lines.len()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn buffer_preserves_arrival_order() {
        let mut buf = TranscriptBuffer::new();
        buf.push("one");
        buf.push("two");
        buf.push("three");
        let lines = buf.drain();
        let texts: Vec<&str> = lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, ["one", "two", "three"]);
        assert!(lines.windows(2).all(|w| w[0].at <= w[1].at));
        assert!(buf.is_empty());
    }

    #[test]
    fn buffer_tail_is_bounded() {
        let mut buf = TranscriptBuffer::new();
        for i in 0..10 {
            buf.push(format!("line {i}"));
        }
        let tail = buf.tail(3);
        assert_eq!(tail.len(), 3);
        assert_eq!(tail[0].text, "line 7");
        assert_eq!(tail[2].text, "line 9");
        // Tail reads do not truncate the buffer.
        assert_eq!(buf.len(), 10);
    }

    #[test]
    fn buffer_tail_larger_than_len() {
        let mut buf = TranscriptBuffer::new();
        buf.push("only");
        assert_eq!(buf.tail(100).len(), 1);
    }

    #[test]
    fn memory_log_tail_and_len() {
        let mut log = MemoryDictationLog::new();
        for i in 0..150 {
            log.append(TimedLine::now(format!("line {i}"))).unwrap();
        }
        assert_eq!(log.len(), 150);
        let tail = log.tail(100);
        assert_eq!(tail.len(), 100);
        assert_eq!(tail[0].text, "line 50");
        assert_eq!(tail[99].text, "line 149");
    }

    #[test]
    fn file_log_persists_lines() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = FileDictationLog::create_in(dir.path()).unwrap();
        log.append(TimedLine::now("first")).unwrap();
        log.append(TimedLine::now("second")).unwrap();

        let contents = std::fs::read_to_string(log.path()).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("\tfirst"));
        assert!(lines[1].ends_with("\tsecond"));
        assert_eq!(log.tail(10).len(), 2);
    }
}
