//! Helpers for writing generated source text.
use std::fmt;
use std::fmt::Write;

const INDENTATION: &str = "  ";

/// An append-only sink for generated source.
///
/// Lines written through [`fmt::Write`] are indented according to the current nesting level,
/// which is controlled with [`open`](Self::open) and [`close`](Self::close).
#[derive(Debug, Clone)]
pub struct SourceWriter {
    buffer: String,
    level: usize,
    at_line_start: bool,
    comments: bool,
}

impl Default for SourceWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceWriter {
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
            level: 0,
            at_line_start: true,
            comments: true,
        }
    }

    /// Enables or disables the output of [`comment`](Self::comment) lines.
    pub fn with_comments(self, comments: bool) -> Self {
        Self { comments, ..self }
    }

    /// Writes `line` and increases the nesting level.
    pub fn open(&mut self, line: &str) -> fmt::Result {
        writeln!(self, "{}", line)?;
        self.level += 1;
        Ok(())
    }

    /// Decreases the nesting level and writes `line`.
    pub fn close(&mut self, line: &str) -> fmt::Result {
        self.level = self.level.saturating_sub(1);
        writeln!(self, "{}", line)
    }

    pub fn comment(&mut self, text: &str) -> fmt::Result {
        if self.comments {
            writeln!(self, "// {}", text)?;
        }
        Ok(())
    }

    /// Writes verbatim user code at the current nesting level, keeping its relative indentation.
    pub fn code(&mut self, text: &str) -> fmt::Result {
        let lines: Vec<&str> = text.lines().skip_while(|l| l.trim().is_empty()).collect();
        let margin = lines
            .iter()
            .filter(|l| !l.trim().is_empty())
            .map(|l| l.chars().take_while(|c| c.is_whitespace()).count())
            .min()
            .unwrap_or(0);
        let end = lines
            .iter()
            .rposition(|l| !l.trim().is_empty())
            .map_or(0, |i| i + 1);
        for line in &lines[..end] {
            if line.trim().is_empty() {
                writeln!(self)?;
            } else {
                let unindented: String = line.chars().skip(margin).collect();
                writeln!(self, "{}", unindented.trim_end())?;
            }
        }
        Ok(())
    }

    pub fn as_str(&self) -> &str {
        &self.buffer
    }

    pub fn finish(self) -> String {
        self.buffer
    }
}

impl Write for SourceWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for c in s.chars() {
            if self.at_line_start && c != '\n' {
                for _ in 0..self.level {
                    self.buffer.push_str(INDENTATION);
                }
                self.at_line_start = false;
            }
            self.buffer.push(c);
            if c == '\n' {
                self.at_line_start = true;
            }
        }
        Ok(())
    }
}

/// Formats a floating-point number as a literal of generated code.
pub fn real_literal(x: f64) -> String {
    format!("{:?}", x)
}
