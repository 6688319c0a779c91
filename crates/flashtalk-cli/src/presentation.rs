//! Incremental terminal rendering of one streaming answer.

use std::io::{self, Write};

/// Prints an answer as it grows, emitting only the new suffix.
///
/// When the content is replaced rather than extended (a recovery stream
/// replaying `existing_content`, or an authoritative `complete`), the
/// full text is reprinted on a fresh line.
#[derive(Debug, Default)]
pub struct TranscriptPrinter {
    printed: String,
}

impl TranscriptPrinter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with text the user has already seen.
    pub fn with_printed(printed: impl Into<String>) -> Self {
        Self {
            printed: printed.into(),
        }
    }

    pub fn update(&mut self, out: &mut impl Write, content: &str) -> io::Result<()> {
        if content == self.printed {
            return Ok(());
        }
        if let Some(suffix) = content.strip_prefix(self.printed.as_str()) {
            out.write_all(suffix.as_bytes())?;
        } else {
            if !self.printed.is_empty() {
                writeln!(out)?;
            }
            out.write_all(content.as_bytes())?;
        }
        out.flush()?;
        self.printed = content.to_string();
        Ok(())
    }

    /// Terminate the transcript line.
    pub fn finish(&self, out: &mut impl Write) -> io::Result<()> {
        if !self.printed.is_empty() {
            writeln!(out)?;
        }
        out.flush()
    }
}
