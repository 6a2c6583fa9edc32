// src/orchestrator/output.rs

//! The shared output path.
//!
//! Every formatted chunk, whichever command produced it, goes through one
//! [`SinkWriter`]. The writer remembers the last character it wrote so a
//! new chunk only gets a leading prefix when it starts a fresh line.

use std::fmt;
use std::io::{self, Write};

use crate::color::reset_code;
use crate::errors::TandemError;

/// Destination for multiplexed output.
pub trait OutputSink: Send {
    fn write(&mut self, text: &str) -> io::Result<()>;
}

/// Writes to the process's stdout, flushing after every chunk.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

impl OutputSink for StdoutSink {
    fn write(&mut self, text: &str) -> io::Result<()> {
        let mut out = io::stdout().lock();
        out.write_all(text.as_bytes())?;
        out.flush()
    }
}

pub struct SinkWriter {
    sink: Box<dyn OutputSink>,
    last_char: Option<char>,
}

impl SinkWriter {
    pub fn new(sink: Box<dyn OutputSink>) -> Self {
        Self {
            sink,
            last_char: None,
        }
    }

    /// True before the first write and after any write ending in `\n`.
    pub fn at_line_start(&self) -> bool {
        self.last_char.is_none_or(|c| c == '\n')
    }

    pub fn write(&mut self, text: &str) -> io::Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        self.sink.write(text)?;
        self.last_char = text.chars().next_back();
        Ok(())
    }
}

impl fmt::Debug for SinkWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SinkWriter")
            .field("last_char", &self.last_char)
            .finish_non_exhaustive()
    }
}

/// What `Orchestrator::log` is asked to write.
#[derive(Debug)]
pub enum LogMessage {
    Text(String),
    /// Never written; handed back to the caller as an error.
    Error(TandemError),
}

impl From<&str> for LogMessage {
    fn from(text: &str) -> Self {
        LogMessage::Text(text.to_string())
    }
}

impl From<String> for LogMessage {
    fn from(text: String) -> Self {
        LogMessage::Text(text)
    }
}

impl From<TandemError> for LogMessage {
    fn from(err: TandemError) -> Self {
        LogMessage::Error(err)
    }
}

/// Per-chunk formatting switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChunkStyle {
    pub raw: bool,
    pub condensed: bool,
    pub at_line_start: bool,
}

/// Format one chunk of output. Returns `None` when nothing is left to write.
///
/// Interior lines of a multi-line chunk get `prefix` plus a color reset. The
/// first line only gets the prefix when the sink is at the start of a line;
/// the last segment (usually the empty rest after a trailing newline) never
/// does.
pub fn format_chunk(text: &str, prefix: &str, style: ChunkStyle) -> Option<String> {
    if style.raw {
        return (!text.is_empty()).then(|| text.to_string());
    }

    let text = text.replace('\u{2026}', "...");
    let mut lines: Vec<&str> = text.split('\n').collect();

    if style.condensed {
        let last = lines.len() - 1;
        let mut index = 0;
        lines.retain(|line| {
            let keep = index == last
                || !line.trim().is_empty()
                || (index == 0 && !style.at_line_start);
            index += 1;
            keep
        });
        if lines.len() == 1 && lines[0].trim().is_empty() {
            return None;
        }
    }

    let last = lines.len() - 1;
    let reset = reset_code();
    let mut out = String::with_capacity(text.len() + prefix.len() * lines.len());
    for (i, line) in lines.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let leading = (i == 0 && style.at_line_start) || (i > 0 && i < last);
        if leading && !prefix.is_empty() {
            out.push_str(prefix);
            if i > 0 {
                out.push_str(reset);
            }
            out.push(' ');
        }
        out.push_str(line);
    }

    (!out.is_empty()).then_some(out)
}
