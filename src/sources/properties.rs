//! The `key=value` properties text format.

use super::Loader;
use crate::core::PropertyMap;
use crate::error::{ConfigError, Result};
use std::io::{Read, Write};

/// Loader for `.properties` text.
///
/// Accepts every URI, so it is registered last as the fallback format.
///
/// Supported syntax: `#` and `!` comments, `=`, `:` or whitespace
/// separators, backslash line continuations, and the `\t \n \r \f \uXXXX`
/// escapes. Any other escaped character stands for itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct PropertiesLoader;

impl Loader for PropertiesLoader {
    fn accept(&self, _uri: &str) -> bool {
        true
    }

    fn load(&self, map: &mut PropertyMap, input: &mut dyn Read) -> Result<()> {
        let mut text = String::new();
        input.read_to_string(&mut text)?;
        parse_properties(&text, map)
    }

    fn name(&self) -> String {
        "properties".to_string()
    }
}

/// Parse properties text into `map`. Later duplicates overwrite earlier ones.
///
/// # Errors
///
/// Returns [`ConfigError::ParseError`] on a malformed `\u` escape.
pub fn parse_properties(text: &str, map: &mut PropertyMap) -> Result<()> {
    let mut logical = String::new();
    let mut continuing = false;

    for (number, raw) in text.lines().enumerate() {
        let line = raw.trim_start_matches([' ', '\t', '\x0c']);

        if !continuing {
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                continue;
            }
            logical.clear();
        }

        continuing = ends_with_odd_backslashes(line);
        if continuing {
            logical.push_str(&line[..line.len() - 1]);
            continue;
        }
        logical.push_str(line);

        let (key, value) = split_pair(&logical);
        let key = unescape(key).map_err(|e| parse_error(number, e))?;
        let value = unescape(value).map_err(|e| parse_error(number, e))?;
        map.insert(key, value);
    }

    // Continuation on the last line.
    if continuing {
        let last = text.lines().count().saturating_sub(1);
        let (key, value) = split_pair(&logical);
        let key = unescape(key).map_err(|e| parse_error(last, e))?;
        let value = unescape(value).map_err(|e| parse_error(last, e))?;
        map.insert(key, value);
    }

    Ok(())
}

fn parse_error(line: usize, err: ConfigError) -> ConfigError {
    ConfigError::ParseError(format!("line {}: {}", line + 1, err))
}

fn ends_with_odd_backslashes(line: &str) -> bool {
    line.bytes().rev().take_while(|b| *b == b'\\').count() % 2 == 1
}

/// Split a logical line into raw (still escaped) key and value.
fn split_pair(line: &str) -> (&str, &str) {
    let mut escaped = false;
    let mut key_end = line.len();

    for (i, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '=' | ':' | ' ' | '\t' | '\x0c' => {
                key_end = i;
                break;
            }
            _ => {}
        }
    }

    let key = &line[..key_end];
    let rest = line[key_end..].trim_start_matches([' ', '\t', '\x0c']);
    let rest = rest
        .strip_prefix(['=', ':'])
        .map(|r| r.trim_start_matches([' ', '\t', '\x0c']))
        .unwrap_or(rest);
    (key, rest)
}

fn unescape(raw: &str) -> Result<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('f') => out.push('\x0c'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                let decoded = u32::from_str_radix(&hex, 16)
                    .ok()
                    .filter(|_| hex.len() == 4)
                    .and_then(char::from_u32)
                    .ok_or_else(|| {
                        ConfigError::ParseError(format!("malformed \\u escape: \\u{}", hex))
                    })?;
                out.push(decoded);
            }
            Some(other) => out.push(other),
            None => {}
        }
    }

    Ok(out)
}

/// Write `map` in properties format, optionally preceded by a comment line.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_properties<W: Write + ?Sized>(
    map: &PropertyMap,
    comment: Option<&str>,
    writer: &mut W,
) -> Result<()> {
    if let Some(comment) = comment {
        for line in comment.lines() {
            writeln!(writer, "#{}", line)?;
        }
    }
    for (key, value) in map {
        writeln!(writer, "{}={}", escape(key, true), escape(value, false))?;
    }
    writer.flush()?;
    Ok(())
}

fn escape(text: &str, is_key: bool) -> String {
    let mut out = String::with_capacity(text.len());
    for (i, c) in text.chars().enumerate() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\x0c' => out.push_str("\\f"),
            ' ' if is_key || i == 0 => out.push_str("\\ "),
            '=' | ':' | '#' | '!' if is_key => {
                out.push('\\');
                out.push(c);
            }
            '#' | '!' if i == 0 => {
                out.push('\\');
                out.push(c);
            }
            c if c.is_control() => out.push_str(&format!("\\u{:04X}", c as u32)),
            c => out.push(c),
        }
    }
    out
}
