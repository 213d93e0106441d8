//! Newline-separated pool files
//!
//! Identity and key pools can be pre-generated (see the `idgen`/`keygen`
//! binaries) and loaded from plain text, one value per line.

use crate::Result;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::debug;

/// Read every non-blank line of `path`, trimmed, in file order
pub fn read_lines(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let lines = read_lines_from(BufReader::new(file))?;
    debug!("Read {} entries from {:?}", lines.len(), path);
    Ok(lines)
}

/// Read every non-blank line of `reader`, trimmed, in order
pub fn read_lines_from<R: BufRead>(reader: R) -> Result<Vec<String>> {
    let mut lines = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            lines.push(trimmed.to_string());
        }
    }
    Ok(lines)
}
