//! Reversible escaping of field names, lookup paths and whole documents.
//!
//! The store reserves `$`-prefixed keys and treats `.` as a path separator,
//! so arbitrary field names have to be rewritten before they are stored and
//! restored when they are read back. This module never fails: inconsistent
//! input is mapped best-effort instead of rejected.

use bson::{Bson, Document};
use chrono::NaiveDateTime;

use crate::types::VERSION_FIELD;

/// Replacement for the empty-string key, which the store cannot represent.
/// A key that literally equals this sentinel is not round-trippable.
pub const EMPTY_KEY: &str = "__empty__";

/// Escapes a single key name: a leading `$` becomes `\$`, backslashes are
/// doubled and a literal `.` becomes the `\_` marker unless it is directly
/// followed by `$` (operator-style suffixes such as `meta.views.$gt` stay
/// usable).
#[must_use]
pub fn serialize_key(key: &str) -> String {
    if key.is_empty() {
        return EMPTY_KEY.to_string();
    }
    let chars: Vec<char> = key.chars().collect();
    let mut out = String::with_capacity(key.len());
    for (i, &c) in chars.iter().enumerate() {
        match c {
            '\\' => out.push_str("\\\\"),
            '$' if i == 0 => out.push_str("\\$"),
            '.' if chars.get(i + 1) != Some(&'$') => out.push_str("\\_"),
            _ => out.push(c),
        }
    }
    out
}

/// Reverses [`serialize_key`]. Doubled backslashes carry the escape depth,
/// so an escaped dot marker never collides with a literal underscore.
#[must_use]
pub fn normalize_key(key: &str) -> String {
    if key == EMPTY_KEY {
        return String::new();
    }
    let mut out = String::with_capacity(key.len());
    let mut chars = key.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('_') => out.push('.'),
            Some('$') => out.push('$'),
            // Dangling escape: keep both characters rather than fail.
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Escapes a dotted lookup path, keeping `.` as the segment separator.
/// Segments after the first that start with `$` pass through untouched so
/// operator suffixes survive.
#[must_use]
pub fn serialize_path(path: &str) -> String {
    path.split('.')
        .enumerate()
        .map(|(i, seg)| {
            if i > 0 && seg.starts_with('$') { seg.to_string() } else { serialize_key(seg) }
        })
        .collect::<Vec<_>>()
        .join(".")
}

/// Recursively rewrites a document tree for storage.
///
/// Keys are escaped via [`serialize_key`]; `Undefined` fields are dropped
/// unless `keep_undefined` is set (update-by-diff callers rely on them);
/// any top-level field whose value is a one-key `{"$inc": N}` document is
/// lifted out of the body into a merged sibling `$inc` operator map keyed by
/// the escaped field name. Arrays map element-wise, scalars pass through.
#[must_use]
pub fn serialize_item(value: &Bson, keep_undefined: bool) -> Bson {
    match value {
        Bson::Document(doc) => {
            let mut out = Document::new();
            let mut inc = Document::new();
            for (key, v) in doc {
                if matches!(v, Bson::Undefined) && !keep_undefined {
                    continue;
                }
                if let Some(amount) = as_inc_value(v) {
                    inc.insert(serialize_key(key), amount);
                    continue;
                }
                out.insert(serialize_key(key), serialize_value(v, keep_undefined));
            }
            if !inc.is_empty() {
                out.insert("$inc", inc);
            }
            Bson::Document(out)
        }
        other => serialize_value(other, keep_undefined),
    }
}

/// Reverses [`serialize_item`] key escaping and strips the reserved
/// [`VERSION_FIELD`] counter wherever it appears.
#[must_use]
pub fn normalize_item(value: &Bson) -> Bson {
    match value {
        Bson::Document(doc) => {
            let mut out = Document::new();
            for (key, v) in doc {
                if key == VERSION_FIELD {
                    continue;
                }
                out.insert(normalize_key(key), normalize_item(v));
            }
            Bson::Document(out)
        }
        Bson::Array(items) => Bson::Array(items.iter().map(normalize_item).collect()),
        other => other.clone(),
    }
}

fn serialize_value(value: &Bson, keep_undefined: bool) -> Bson {
    match value {
        Bson::Document(doc) => {
            let mut out = Document::new();
            for (key, v) in doc {
                if matches!(v, Bson::Undefined) && !keep_undefined {
                    continue;
                }
                out.insert(serialize_key(key), serialize_value(v, keep_undefined));
            }
            Bson::Document(out)
        }
        Bson::Array(items) => {
            Bson::Array(items.iter().map(|v| serialize_value(v, keep_undefined)).collect())
        }
        other => other.clone(),
    }
}

fn as_inc_value(value: &Bson) -> Option<Bson> {
    let doc = value.as_document()?;
    if doc.len() != 1 {
        return None;
    }
    let (key, amount) = doc.iter().next()?;
    if key == "$inc" { Some(amount.clone()) } else { None }
}

/// Parses an ISO-8601 date-time string into a store date. Sub-second
/// precision and a numeric or `Z` offset are optional; a missing offset is
/// read as UTC. Anything that does not look like a full date-time yields
/// `None`.
#[must_use]
pub fn parse_iso_date(s: &str) -> Option<bson::DateTime> {
    let b = s.as_bytes();
    if b.len() < 19 || b[4] != b'-' || b[7] != b'-' || b[10] != b'T' {
        return None;
    }
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Some(bson::DateTime::from_millis(dt.timestamp_millis()));
    }
    // Numeric offset without a colon, e.g. "+0200".
    if let Ok(dt) = chrono::DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(bson::DateTime::from_millis(dt.timestamp_millis()));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(bson::DateTime::from_millis(naive.and_utc().timestamp_millis()));
    }
    None
}

/// Formats a store date back into the ISO-8601 form used by the cursor
/// token grammar.
#[must_use]
pub fn format_iso_date(dt: bson::DateTime) -> String {
    let utc = chrono::DateTime::<chrono::Utc>::from_timestamp_millis(dt.timestamp_millis())
        .unwrap_or_default();
    utc.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
