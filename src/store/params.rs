// src/store/params.rs

//! Key/value environment overrides persisted as `KEY=value` lines.
//!
//! Keys must look like environment variable names (`[A-Za-z_][A-Za-z0-9_]+`)
//! and are upper-cased; anything else is dropped silently. Carriage returns
//! and newlines inside values are escaped as `\r` / `\n` so every entry stays
//! on one line. Backslashes are escaped as `\\` so values survive a
//! save/load cycle unchanged.

use std::collections::BTreeMap;
use std::fs;
use std::io::{BufWriter, ErrorKind, Write};
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use tracing::debug;

/// Parameter mapping, ordered so files are written deterministically.
pub type Params = BTreeMap<String, String>;

static KEY_FORMAT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]+$").expect("static key pattern"));

/// True if `key` is acceptable as a parameter name.
pub fn is_valid_key(key: &str) -> bool {
    KEY_FORMAT.is_match(key)
}

/// Normalize a raw mapping: drop invalid keys, upper-case the rest.
pub fn normalize<I, K, V>(params: I) -> Params
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Into<String>,
{
    params
        .into_iter()
        .filter(|(k, _)| is_valid_key(k.as_ref()))
        .map(|(k, v)| (k.as_ref().to_uppercase(), v.into()))
        .collect()
}

pub fn escape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            other => out.push(other),
        }
    }
    out
}

pub fn unescape_value(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some('\\') => out.push('\\'),
            // Unknown escapes are kept verbatim.
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Write `params` to `path`, replacing any previous content.
///
/// An empty mapping removes the file, so a later [`load`] yields nothing.
pub fn save(path: &Path, params: &Params) -> Result<()> {
    if params.is_empty() {
        return match fs::remove_file(path) {
            Err(err) if err.kind() != ErrorKind::NotFound => {
                Err(err).with_context(|| format!("removing params file {:?}", path))
            }
            _ => Ok(()),
        };
    }

    let file = fs::File::create(path)
        .with_context(|| format!("creating params file {:?}", path))?;
    let mut writer = BufWriter::new(file);
    for (key, value) in params {
        writeln!(writer, "{}={}", key, escape_value(value))
            .with_context(|| format!("writing params file {:?}", path))?;
    }
    writer
        .flush()
        .with_context(|| format!("flushing params file {:?}", path))?;
    Ok(())
}

/// Read a params file. A missing or unreadable file yields an empty mapping.
pub fn load(path: &Path) -> Params {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) => {
            if err.kind() != ErrorKind::NotFound {
                debug!(path = ?path, error = %err, "could not read params file");
            }
            return Params::new();
        }
    };

    parse(&contents)
}

/// Parse the `KEY=value` line format.
pub fn parse(contents: &str) -> Params {
    normalize(contents.lines().filter_map(|line| {
        let line = line.trim_start();
        let (key, value) = line.split_once('=')?;
        Some((key.trim_end().to_string(), unescape_value(value)))
    }))
}
