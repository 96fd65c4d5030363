//! Word-by-word text output.

use std::io::Write;

use crate::error::Result;

/// Receives a reply one word at a time.
pub trait TextSink: Send {
    /// Start a new reply attributed to `speaker`.
    fn begin(&mut self, speaker: &str) -> Result<()>;

    /// Show the next word.
    fn word(&mut self, word: &str) -> Result<()>;

    /// The reply is complete.
    fn finish(&mut self) -> Result<()>;
}

/// Indent applied to reply lines.
const INDENT: &str = "  ";

/// Writes replies to a terminal, wrapping at a fixed width.
#[derive(Debug)]
pub struct TerminalSink<W> {
    out: W,
    line_width: usize,
    column: usize,
}

impl TerminalSink<std::io::Stdout> {
    /// A sink writing to standard output.
    pub fn stdout(line_width: usize) -> Self {
        Self::new(std::io::stdout(), line_width)
    }
}

impl<W: Write + Send> TerminalSink<W> {
    /// Wrap `out`, breaking lines before they exceed `line_width` columns.
    pub fn new(out: W, line_width: usize) -> Self {
        Self {
            out,
            line_width: line_width.max(1),
            column: 0,
        }
    }

    /// Consume the sink and return the writer.
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> TextSink for TerminalSink<W> {
    fn begin(&mut self, speaker: &str) -> Result<()> {
        writeln!(self.out, "\n{speaker}:")?;
        self.out.write_all(INDENT.as_bytes())?;
        self.column = 0;
        self.out.flush()?;
        Ok(())
    }

    fn word(&mut self, word: &str) -> Result<()> {
        let len = word.chars().count();
        if self.column > 0 {
            if self.column + 1 + len > self.line_width {
                write!(self.out, "\n{INDENT}")?;
                self.column = 0;
            } else {
                self.out.write_all(b" ")?;
                self.column += 1;
            }
        }
        self.out.write_all(word.as_bytes())?;
        self.column += len;
        self.out.flush()?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        writeln!(self.out)?;
        self.column = 0;
        self.out.flush()?;
        Ok(())
    }
}
