//! Circular buffer for worker output

use chrono::{DateTime, Local};
use std::collections::VecDeque;

/// A single output line
#[derive(Debug, Clone)]
pub struct LogLine {
    /// The content of the line, without the trailing newline
    pub content: String,
    /// Timestamp when the line was started
    pub timestamp: DateTime<Local>,
}

/// Circular buffer of output lines.
///
/// Worker output arrives as arbitrary chunks, so a chunk that does not end in a
/// newline leaves the last line open and the next chunk continues it.
#[derive(Debug)]
pub struct LogBuffer {
    lines: VecDeque<LogLine>,
    max_lines: usize,
    /// Whether the last line is still waiting for its newline
    open_line: bool,
}

impl LogBuffer {
    /// Create a new log buffer with the given capacity
    pub fn new(max_lines: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(max_lines.min(1024)),
            max_lines: max_lines.max(1),
            open_line: false,
        }
    }

    /// Append a chunk of raw output
    pub fn push_chunk(&mut self, chunk: &str) {
        if chunk.is_empty() {
            return;
        }

        let mut segments = chunk.split('\n').peekable();
        while let Some(segment) = segments.next() {
            let is_last = segments.peek().is_none();
            let segment = segment.strip_suffix('\r').unwrap_or(segment);

            if is_last && segment.is_empty() {
                // Chunk ended with a newline
                self.open_line = false;
                break;
            }

            if self.open_line {
                if let Some(last) = self.lines.back_mut() {
                    last.content.push_str(segment);
                }
            } else {
                self.push_new(segment);
            }
            self.open_line = is_last;
        }
    }

    /// Append a complete line
    pub fn push_line(&mut self, content: &str) {
        self.push_new(content);
        self.open_line = false;
    }

    fn push_new(&mut self, content: &str) {
        if self.lines.len() >= self.max_lines {
            self.lines.pop_front();
        }

        self.lines.push_back(LogLine {
            content: content.to_string(),
            timestamp: Local::now(),
        });
    }

    /// Get all lines
    pub fn lines(&self) -> impl Iterator<Item = &LogLine> {
        self.lines.iter()
    }

    /// Get the number of lines
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Check if the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Clear the buffer
    pub fn clear(&mut self) {
        self.lines.clear();
        self.open_line = false;
    }

    /// Plain text of all lines, for the clipboard
    pub fn text(&self) -> String {
        self.lines
            .iter()
            .map(|l| l.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Export with timestamps
    pub fn export(&self) -> String {
        self.lines
            .iter()
            .map(|l| format!("[{}] {}", l.timestamp.format("%H:%M:%S"), l.content))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new(10000)
    }
}
