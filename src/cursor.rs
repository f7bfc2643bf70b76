//! Opaque continuation tokens for stateless cursor pagination.
//!
//! A token encodes the anchor of the last row of a page plus the sort
//! boundary needed to resume after it, for both flat result sets (scalar
//! identifier anchor) and grouped result sets (compound group-key anchor).
//! The internal grammar is pipe-delimited and base64-wrapped; external
//! consumers must treat the token as opaque.
//!
//! Only the first entry of a multi-field sort is encoded, so ties on the
//! remaining sort fields lose tie-break precision. Documented limitation.

use base64::{Engine as _, engine::general_purpose::STANDARD_NO_PAD};
use bson::{Bson, Document};
use log::debug;

use crate::aggregate::Stage;
use crate::escape::{format_iso_date, normalize_key, parse_iso_date};
use crate::query::QueryObject;
use crate::types::{ID_FIELD, Order, STORE_ID_FIELD, SortSpec};

/// A decoded continuation token: the anchor (scalar identifier or compound
/// group key, discriminated by `is_agg`) plus the synthesized range
/// predicates to feed the filter compiler as its lowest-precedence source.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPageCursor {
    pub id: Bson,
    pub filter: Vec<QueryObject>,
    pub is_agg: bool,
}

/// Encodes a continuation token from the last item of a page. Returns
/// `None` when the item carries no usable anchor or sort boundary value.
#[must_use]
pub fn encode(last: &Document, sort: Option<&[SortSpec]>, stages: Option<&[Stage]>) -> Option<String> {
    let grouped = stages.is_some_and(has_group);
    let raw = if grouped { encode_grouped(last, sort)? } else { encode_flat(last, sort)? };
    Some(STANDARD_NO_PAD.encode(raw))
}

/// Decodes a continuation token. A malformed or foreign token yields
/// `None`, meaning "start of data", never an error.
#[must_use]
pub fn decode(token: Option<&str>) -> Option<ParsedPageCursor> {
    let token = token?;
    if token.is_empty() {
        return None;
    }
    let bytes = STANDARD_NO_PAD.decode(token.trim_end_matches('=')).ok()?;
    let raw = String::from_utf8(bytes).ok()?;
    let parsed = match raw.split_once("||") {
        Some((head, suffix)) => decode_grouped(head, suffix),
        None => decode_flat(&raw),
    };
    if parsed.is_none() {
        debug!("discarding malformed page cursor");
    }
    parsed
}

/// Caller-side page-fill rule: an exactly-full page emits the next token,
/// a short page suppresses it.
#[must_use]
pub fn next_token(
    items: &[Document],
    page_size: usize,
    sort: Option<&[SortSpec]>,
    stages: Option<&[Stage]>,
) -> Option<String> {
    if page_size == 0 || items.len() < page_size {
        return None;
    }
    encode(items.last()?, sort, stages)
}

fn has_group(stages: &[Stage]) -> bool {
    stages.iter().any(|s| matches!(s, Stage::Group { .. }))
}

fn encode_flat(last: &Document, sort: Option<&[SortSpec]>) -> Option<String> {
    let id = last.get(ID_FIELD).or_else(|| last.get(STORE_ID_FIELD))?;
    let mut out = encode_value(id)?;
    out.push('|');
    match sort.and_then(<[SortSpec]>::first) {
        Some(spec) => {
            out.push_str(&spec.field);
            out.push(spec.order.arrow());
            out.push_str(&encode_value(lookup_path(last, &spec.field)?)?);
        }
        None => out.push(Order::Asc.arrow()),
    }
    Some(out)
}

fn encode_grouped(last: &Document, sort: Option<&[SortSpec]>) -> Option<String> {
    let key = last.get_document(STORE_ID_FIELD).ok()?;
    if key.is_empty() {
        return None;
    }
    let mut out = String::new();
    for (field, value) in key {
        out.push_str(field);
        out.push('|');
        out.push_str(&encode_value(value)?);
        out.push('|');
    }
    // Trailing empty segment: the double pipe structurally marks a
    // compound anchor.
    out.push('|');
    match sort.and_then(<[SortSpec]>::first) {
        // Sorting on the synthetic identity collapses to a bare arrow.
        Some(spec) if spec.field == ID_FIELD || spec.field == STORE_ID_FIELD => {
            out.push(spec.order.arrow());
        }
        Some(spec) => {
            out.push_str(&spec.field);
            out.push(spec.order.arrow());
            out.push_str(&encode_value(lookup_path(last, &spec.field)?)?);
        }
        None => out.push(Order::Asc.arrow()),
    }
    Some(out)
}

fn decode_flat(raw: &str) -> Option<ParsedPageCursor> {
    let (anchor, suffix) = raw.split_once('|')?;
    let id = parse_value(anchor)?;
    let (field, op, value) = split_suffix(suffix)?;
    let filter = if field.is_empty() {
        vec![QueryObject::cmp(ID_FIELD, op, id.clone())]
    } else {
        vec![QueryObject::cmp(field, op, parse_value(value)?)]
    };
    Some(ParsedPageCursor { id, filter, is_agg: false })
}

fn decode_grouped(head: &str, suffix: &str) -> Option<ParsedPageCursor> {
    let segments: Vec<&str> = head.split('|').collect();
    if segments.is_empty() || segments.len() % 2 != 0 {
        return None;
    }
    let mut key = Document::new();
    for pair in segments.chunks(2) {
        if pair[0].is_empty() {
            return None;
        }
        key.insert(pair[0], parse_value(pair[1])?);
    }
    let (field, op, value) = split_suffix(suffix)?;
    let filter = if field.is_empty() {
        // Bare arrow: bound every compound-identity field by its anchor.
        // The anchor carries the stored (escaped) key names; predicates
        // carry logical paths, which the filter compiler escapes itself.
        key.iter().map(|(f, v)| QueryObject::cmp(normalize_key(f), op, v.clone())).collect()
    } else {
        vec![QueryObject::cmp(field, op, parse_value(value)?)]
    };
    Some(ParsedPageCursor { id: Bson::Document(key), filter, is_agg: true })
}

/// Splits a sort suffix into `(field, range-op, encoded value)`. The field
/// is empty for the bare-arrow identity form.
fn split_suffix(suffix: &str) -> Option<(&str, &'static str, &str)> {
    let idx = suffix.find(['>', '<'])?;
    let op = if suffix.as_bytes()[idx] == b'>' { "gte" } else { "lte" };
    Some((&suffix[..idx], op, &suffix[idx + 1..]))
}

fn encode_value(value: &Bson) -> Option<String> {
    match value {
        Bson::String(s) => Some(format!("\"{}\"", uri_encode(s))),
        Bson::DateTime(dt) => Some(format_iso_date(*dt)),
        Bson::Int32(i) => Some(i.to_string()),
        Bson::Int64(i) => Some(i.to_string()),
        Bson::Double(f) => Some(f.to_string()),
        Bson::Boolean(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Parses one encoded value. Quoted text is URI-decoded verbatim so
/// operator punctuation inside it never confuses the parser; unquoted text
/// goes through boolean/numeric/date coercion before falling back to a
/// plain string.
fn parse_value(raw: &str) -> Option<Bson> {
    if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
        return Some(Bson::String(uri_decode(&raw[1..raw.len() - 1])?));
    }
    if raw.is_empty() {
        return None;
    }
    match raw {
        "true" => return Some(Bson::Boolean(true)),
        "false" => return Some(Bson::Boolean(false)),
        _ => {}
    }
    if let Ok(i) = raw.parse::<i32>() {
        return Some(Bson::Int32(i));
    }
    if let Ok(i) = raw.parse::<i64>() {
        return Some(Bson::Int64(i));
    }
    if let Ok(f) = raw.parse::<f64>() {
        return Some(Bson::Double(f));
    }
    if let Some(dt) = parse_iso_date(raw) {
        return Some(Bson::DateTime(dt));
    }
    Some(Bson::String(raw.to_string()))
}

/// Dotted-path lookup into the last item of a page.
fn lookup_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Bson> {
    if path.is_empty() {
        return None;
    }
    let mut cur = doc;
    let mut parts = path.split('.').peekable();
    while let Some(part) = parts.next() {
        match cur.get(part) {
            Some(Bson::Document(d)) if parts.peek().is_some() => cur = d,
            Some(v) if parts.peek().is_none() => return Some(v),
            _ => return None,
        }
    }
    None
}

fn uri_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'!' | b'~' | b'*' | b'\'' | b'(' | b')') {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

fn uri_decode(s: &str) -> Option<String> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = bytes.get(i + 1..i + 3)?;
            let hex = std::str::from_utf8(hex).ok()?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}
