//! Capture of script `print` output.

use std::fmt;

/// Appended once when output is cut off at the byte limit.
pub const TRUNCATION_MARKER: &str = "\n[output truncated]\n";

/// A per-invocation buffer for text printed by the script.
///
/// Output past `limit` bytes is dropped; the script keeps running.
#[derive(Clone, Debug)]
pub struct CapturedOutput {
    buffer: String,
    limit: usize,
    truncated: bool,
}

impl CapturedOutput {
    /// Create a new captured output buffer holding at most `limit` bytes.
    pub fn new(limit: usize) -> Self {
        Self {
            buffer: String::new(),
            limit,
            truncated: false,
        }
    }

    /// Append text, cutting at a character boundary once the limit is reached.
    pub fn push(&mut self, text: &str) {
        if self.truncated {
            return;
        }
        let room = self.limit.saturating_sub(self.buffer.len());
        if text.len() <= room {
            self.buffer.push_str(text);
            return;
        }
        let mut cut = room;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        self.buffer.push_str(&text[..cut]);
        self.buffer.push_str(TRUNCATION_MARKER);
        self.truncated = true;
    }

    /// Whether output was dropped.
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn as_str(&self) -> &str {
        &self.buffer
    }

    /// Take the captured text, leaving the buffer empty.
    pub fn take(&mut self) -> String {
        std::mem::take(&mut self.buffer)
    }

    /// Get the length of captured data.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

impl fmt::Write for CapturedOutput {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.push(s);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt::Write;

    #[test]
    fn test_captured_output() {
        let mut output = CapturedOutput::new(64);
        write!(output, "hello ").unwrap();
        output.push("world");
        assert_eq!(output.as_str(), "hello world");
        assert!(!output.is_truncated());
    }

    #[test]
    fn test_truncates_at_char_boundary() {
        let mut output = CapturedOutput::new(4);
        output.push("ab");
        output.push("cé!");
        assert_eq!(output.as_str(), format!("abc{TRUNCATION_MARKER}"));
        assert!(output.is_truncated());

        output.push("more");
        assert_eq!(output.take(), format!("abc{TRUNCATION_MARKER}"));
        assert!(output.is_empty());
    }
}
