//! Prompt CSV reading.

use crate::error::{Result, WidefillError};
use std::io::Read;
use std::path::Path;

/// One row of the prompt CSV.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptRecord {
    /// 1-based row number in the file; also the output file stem.
    pub line: usize,
    /// First column, trimmed. Empty for blank rows.
    pub prompt: String,
}

impl PromptRecord {
    /// Creates a record, trimming the prompt.
    pub fn new(line: usize, prompt: impl AsRef<str>) -> Self {
        Self {
            line,
            prompt: prompt.as_ref().trim().to_string(),
        }
    }

    /// True if there is nothing to generate.
    pub fn is_empty(&self) -> bool {
        self.prompt.is_empty()
    }

    /// First 60 characters of the prompt, for log lines.
    pub fn preview(&self) -> String {
        const PREVIEW_CHARS: usize = 60;
        if self.prompt.chars().count() > PREVIEW_CHARS {
            let cut: String = self.prompt.chars().take(PREVIEW_CHARS).collect();
            format!("{cut}...")
        } else {
            self.prompt.clone()
        }
    }
}

/// Reads every row of the CSV at `path`.
pub fn read_prompts(path: impl AsRef<Path>) -> Result<Vec<PromptRecord>> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(WidefillError::InputNotFound(path.to_path_buf()));
    }
    let file = std::fs::File::open(path)?;
    parse_prompts(file)
}

/// Parses headerless CSV; only the first column is used.
///
/// Blank lines keep their line number so output names line up with the file.
pub fn parse_prompts<R: Read>(mut reader: R) -> Result<Vec<PromptRecord>> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf)?;

    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(buf.as_slice());

    let mut records = Vec::new();
    let mut next_line = 1;
    for row in csv_reader.records() {
        let row = row?;
        // The csv crate skips empty lines without reporting them.
        let line = row
            .position()
            .map(|p| first_line_at(&buf, p.byte() as usize))
            .unwrap_or(next_line);
        while next_line < line {
            records.push(PromptRecord::new(next_line, ""));
            next_line += 1;
        }
        records.push(PromptRecord::new(line, row.get(0).unwrap_or_default()));
        next_line = line + 1;
    }

    let total_lines = count_lines(&buf);
    while next_line <= total_lines {
        records.push(PromptRecord::new(next_line, ""));
        next_line += 1;
    }
    Ok(records)
}

/// 1-based line of the first content byte at or after `offset`.
///
/// A record's byte offset may point at the line terminators that precede it.
fn first_line_at(buf: &[u8], offset: usize) -> usize {
    let start = buf[offset.min(buf.len())..]
        .iter()
        .position(|b| *b != b'\r' && *b != b'\n')
        .map_or(buf.len(), |i| offset + i);
    1 + buf[..start].iter().filter(|b| **b == b'\n').count()
}

/// Number of physical lines; a missing final newline still counts.
fn count_lines(buf: &[u8]) -> usize {
    let newlines = buf.iter().filter(|b| **b == b'\n').count();
    match buf.last() {
        Some(b'\n') | None => newlines,
        Some(_) => newlines + 1,
    }
}
