/*!
 * Filename Parsing
 *
 * `[<digits>_]<protein>[_<variant>].<ext>`: an optional numeric ordering
 * prefix, then the stem split once on `_`.
 */

use super::types::{NameError, ParsedName};
use std::path::Path;

/// Parse a queue filename. Total: every input yields a name or an error.
pub fn parse_name(file_name: &str) -> Result<ParsedName, NameError> {
    let stem = Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("");
    if stem.trim().is_empty() {
        return Err(NameError::EmptyStem);
    }

    let (key, rest) = split_prefix(stem)?;
    let mut parts = rest.splitn(2, '_');
    let protein = parts.next().unwrap_or("").trim();
    if protein.is_empty() {
        return Err(NameError::EmptyProtein);
    }
    let variant = parts
        .next()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string);

    Ok(ParsedName {
        key,
        protein: protein.to_string(),
        variant,
    })
}

fn split_prefix(stem: &str) -> Result<(Option<u64>, &str), NameError> {
    let digits = stem.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 || stem.as_bytes().get(digits) != Some(&b'_') {
        return Ok((None, stem));
    }
    let key = stem[..digits]
        .parse::<u64>()
        .map_err(|_| NameError::KeyOverflow)?;
    Ok((Some(key), &stem[digits + 1..]))
}
