//! The symbol list: a newline-delimited text file.

use std::{
    fs::{self, OpenOptions},
    io::{BufRead, ErrorKind, Write},
    path::Path,
};

use anyhow::Context;
use indexmap::IndexSet;

/// Trimmed, de-duplicated, non-blank lines in first-seen order.
pub fn parse_symbols(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect::<IndexSet<_>>()
        .into_iter()
        .collect()
}

/// Reads the symbol file. A missing file is an empty list.
pub fn load_symbols(path: &Path) -> anyhow::Result<Vec<String>> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(parse_symbols(&text)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e).with_context(|| format!("could not read {}", path.display())),
    }
}

/// Appends `symbols`, one per line, creating the file and its directory if needed.
pub fn append_symbols(path: &Path, symbols: &[String]) -> anyhow::Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).with_context(|| format!("could not create {}", dir.display()))?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("could not open {}", path.display()))?;
    for symbol in symbols {
        writeln!(file, "{symbol}")?;
    }
    Ok(())
}

/// Asks for symbols one per line until a blank line or end of input.
pub fn prompt_symbols(input: impl BufRead, mut output: impl Write) -> anyhow::Result<Vec<String>> {
    writeln!(output, "No symbols configured. Enter one per line, blank line to finish:")?;
    let mut symbols = IndexSet::new();
    for line in input.lines() {
        let line = line?;
        let symbol = line.trim();
        if symbol.is_empty() {
            break;
        }
        symbols.insert(symbol.to_string());
    }
    Ok(symbols.into_iter().collect())
}
