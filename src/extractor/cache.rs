//! Per-event decode cache.
//!
//! Hosts usually ask for several fields of the same event back to back, so the
//! last parsed document is kept together with the event number it came from.

use crate::error::{JevtError, Result};
use serde::Deserialize;
use serde_json::Value;
use std::borrow::Cow;
use tracing::{debug, trace};

/// Deepest nesting of objects and arrays accepted in an event.
pub const MAX_NESTING_DEPTH: usize = 300;

/// Written in place of a `\u` escape of an unpaired UTF-16 surrogate.
const REPLACEMENT_ESCAPE: &[u8] = b"\\ufffd";

#[derive(Debug)]
struct CachedDocument {
    event_id: u64,
    value: Value,
}

#[derive(Debug, Default)]
pub struct DecodeCache {
    entry: Option<CachedDocument>,
    parses: u64,
    hits: u64,
}

impl DecodeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the document for `event_id`, parsing `raw` only when the cache
    /// holds a different event (or nothing).
    ///
    /// On a parse error the previous entry is kept as it was, so the failing
    /// event is never marked as parsed.
    pub fn ensure_parsed(&mut self, event_id: u64, raw: &[u8]) -> Result<&Value> {
        let entry = match self.entry.take() {
            Some(cached) if cached.event_id == event_id => {
                trace!(event_id, "decode cache hit");
                self.hits += 1;
                cached
            }
            previous => match decode(raw) {
                Ok(value) => {
                    debug!(event_id, bytes = raw.len(), "parsed event");
                    self.parses += 1;
                    CachedDocument { event_id, value }
                }
                Err(err) => {
                    self.entry = previous;
                    return Err(err);
                }
            },
        };

        Ok(&self.entry.insert(entry).value)
    }

    /// Event number of the cached document, `None` before the first
    /// successful parse.
    pub fn event_id(&self) -> Option<u64> {
        self.entry.as_ref().map(|c| c.event_id)
    }

    pub fn document(&self) -> Option<&Value> {
        self.entry.as_ref().map(|c| &c.value)
    }

    /// Number of times raw bytes were actually parsed.
    pub fn parse_count(&self) -> u64 {
        self.parses
    }

    pub fn hit_count(&self) -> u64 {
        self.hits
    }
}

/// Parse one event.
///
/// Nesting is capped at [`MAX_NESTING_DEPTH`] instead of serde_json's
/// default of 128. Escapes of unpaired surrogates, which serde_json refuses
/// to decode, are read as U+FFFD so the rest of the event stays usable.
fn decode(raw: &[u8]) -> Result<Value> {
    let depth = nesting_depth(raw);
    if depth > MAX_NESTING_DEPTH {
        return Err(JevtError::TooDeep {
            depth,
            limit: MAX_NESTING_DEPTH,
        });
    }

    match parse_value(raw) {
        Ok(value) => Ok(value),
        Err(err) => match replace_lone_surrogates(raw) {
            Cow::Owned(patched) => parse_value(&patched),
            Cow::Borrowed(_) => Err(err),
        },
    }
}

fn parse_value(raw: &[u8]) -> Result<Value> {
    let mut de = serde_json::Deserializer::from_slice(raw);
    de.disable_recursion_limit();
    let value = Value::deserialize(&mut de)?;
    de.end()?;
    Ok(value)
}

/// Deepest bracket nesting in `raw`, ignoring brackets inside strings.
fn nesting_depth(raw: &[u8]) -> usize {
    let mut depth = 0usize;
    let mut deepest = 0;
    let mut in_string = false;
    let mut escaped = false;

    for &byte in raw {
        if in_string {
            match byte {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' | b'[' => {
                depth += 1;
                deepest = deepest.max(depth);
            }
            b'}' | b']' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    deepest
}

fn hex_escape(raw: &[u8], at: usize) -> Option<u16> {
    let digits = raw.get(at..at + 6)?.strip_prefix(b"\\u")?;
    let text = std::str::from_utf8(digits).ok()?;
    u16::from_str_radix(text, 16).ok()
}

fn is_high_surrogate(unit: u16) -> bool {
    (0xD800..0xDC00).contains(&unit)
}

fn is_low_surrogate(unit: u16) -> bool {
    (0xDC00..0xE000).contains(&unit)
}

/// Rewrite `\uXXXX` escapes of unpaired surrogates as `\ufffd`.
///
/// Returns the input unchanged when there is nothing to rewrite.
fn replace_lone_surrogates(raw: &[u8]) -> Cow<'_, [u8]> {
    let mut patched: Option<Vec<u8>> = None;
    let mut copied = 0;
    let mut i = 0;

    while i < raw.len() {
        if raw[i] != b'\\' {
            i += 1;
            continue;
        }
        let Some(unit) = hex_escape(raw, i) else {
            // Some other escape, skip it whole so `\\u` is not misread
            i += 2;
            continue;
        };

        let paired = is_high_surrogate(unit)
            && hex_escape(raw, i + 6).is_some_and(is_low_surrogate);
        if paired {
            i += 12;
        } else if is_high_surrogate(unit) || is_low_surrogate(unit) {
            let out = patched.get_or_insert_with(|| Vec::with_capacity(raw.len()));
            out.extend_from_slice(&raw[copied..i]);
            out.extend_from_slice(REPLACEMENT_ESCAPE);
            i += 6;
            copied = i;
        } else {
            i += 6;
        }
    }

    match patched {
        Some(mut out) => {
            out.extend_from_slice(&raw[copied..]);
            Cow::Owned(out)
        }
        None => Cow::Borrowed(raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::JevtError;
    use serde_json::json;

    #[test]
    fn test_same_event_parsed_once() {
        let mut cache = DecodeCache::new();
        let raw = br#"{"a":"1"}"#;

        assert_eq!(cache.ensure_parsed(1, raw).unwrap(), &json!({"a": "1"}));
        assert_eq!(cache.ensure_parsed(1, raw).unwrap(), &json!({"a": "1"}));
        assert_eq!(cache.parse_count(), 1);
        assert_eq!(cache.hit_count(), 1);
    }

    #[test]
    fn test_cached_event_ignores_new_bytes() {
        let mut cache = DecodeCache::new();
        cache.ensure_parsed(1, br#"{"a":"first"}"#).unwrap();

        // Same event number: the bytes are not looked at again
        let doc = cache.ensure_parsed(1, b"garbage").unwrap();
        assert_eq!(doc, &json!({"a": "first"}));
    }

    #[test]
    fn test_new_event_reparses_identical_bytes() {
        let mut cache = DecodeCache::new();
        let raw = br#"{"a":"1"}"#;

        cache.ensure_parsed(1, raw).unwrap();
        cache.ensure_parsed(2, raw).unwrap();
        assert_eq!(cache.parse_count(), 2);
        assert_eq!(cache.event_id(), Some(2));
    }

    #[test]
    fn test_event_zero_is_not_preparsed() {
        let mut cache = DecodeCache::new();
        assert_eq!(cache.event_id(), None);
        assert!(cache.ensure_parsed(0, b"{}").is_ok());
        assert_eq!(cache.parse_count(), 1);
    }

    #[test]
    fn test_parse_failure_keeps_previous_entry() {
        let mut cache = DecodeCache::new();
        cache.ensure_parsed(1, br#"{"a":"1"}"#).unwrap();

        let err = cache.ensure_parsed(2, b"{broken").unwrap_err();
        assert!(matches!(err, JevtError::Parse(_)));
        assert_eq!(cache.event_id(), Some(1));
        assert_eq!(cache.document(), Some(&json!({"a": "1"})));

        // Retrying the failed event with good bytes parses it
        let doc = cache.ensure_parsed(2, br#"{"a":"2"}"#).unwrap();
        assert_eq!(doc, &json!({"a": "2"}));
        assert_eq!(cache.parse_count(), 2);
    }

    #[test]
    fn test_parse_failure_on_empty_cache() {
        let mut cache = DecodeCache::new();
        assert!(cache.ensure_parsed(5, b"not json").is_err());
        assert_eq!(cache.event_id(), None);
        assert_eq!(cache.parse_count(), 0);
    }

    #[test]
    fn test_deep_documents_within_limit() {
        let depth = 200;
        let raw = format!("{}\"leaf\"{}", "{\"a\":".repeat(depth), "}".repeat(depth));
        let mut cache = DecodeCache::new();

        let mut value = cache.ensure_parsed(1, raw.as_bytes()).unwrap();
        for _ in 0..depth {
            value = &value["a"];
        }
        assert_eq!(value, "leaf");

        let at_limit = format!("{}{}", "[".repeat(MAX_NESTING_DEPTH), "]".repeat(MAX_NESTING_DEPTH));
        assert!(cache.ensure_parsed(2, at_limit.as_bytes()).is_ok());
    }

    #[test]
    fn test_too_deep_document_is_rejected() {
        let depth = MAX_NESTING_DEPTH + 1;
        let raw = format!("{}{}", "[".repeat(depth), "]".repeat(depth));
        let mut cache = DecodeCache::new();

        let err = cache.ensure_parsed(1, raw.as_bytes()).unwrap_err();
        assert!(matches!(err, JevtError::TooDeep { depth: 301, limit: 300 }));
        assert_eq!(cache.event_id(), None);
    }

    #[test]
    fn test_brackets_in_strings_do_not_count() {
        assert_eq!(nesting_depth(br#"{"a":"[[[{{{\"[["}"#), 1);
        assert_eq!(nesting_depth(b"[[],[[]]]"), 3);
        assert_eq!(nesting_depth(b"\"plain\""), 0);
    }

    #[test]
    fn test_lone_surrogate_keeps_event_usable() {
        let mut cache = DecodeCache::new();
        let doc = cache
            .ensure_parsed(1, br#"{"u":"\u00e9\/x","s":"\ud800","t":"a\udc00b"}"#)
            .unwrap();
        assert_eq!(doc["u"], "\u{e9}/x");
        assert_eq!(doc["s"], "\u{fffd}");
        assert_eq!(doc["t"], "a\u{fffd}b");
    }

    #[test]
    fn test_replace_lone_surrogates() {
        let paired = br#""\ud83d\ude00""#;
        assert!(matches!(replace_lone_surrogates(paired), Cow::Borrowed(_)));

        let escaped_backslash = br#""\\ud800""#;
        assert!(matches!(replace_lone_surrogates(escaped_backslash), Cow::Borrowed(_)));

        assert_eq!(
            replace_lone_surrogates(br#"["\ud800\ud800\udc00"]"#).as_ref(),
            br#"["\ufffd\ud800\udc00"]"#
        );
    }

    #[test]
    fn test_parse_is_logged_at_debug_and_hit_at_trace() {
        use std::io;
        use std::sync::{Arc, Mutex};

        #[derive(Clone, Default)]
        struct Capture(Arc<Mutex<Vec<u8>>>);

        impl io::Write for Capture {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(buf);
                Ok(buf.len())
            }

            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let capture = Capture::default();
        let writer = capture.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let mut cache = DecodeCache::new();
            cache.ensure_parsed(1, b"{}").unwrap();
            cache.ensure_parsed(1, b"{}").unwrap();
        });

        let logs = String::from_utf8(capture.0.lock().unwrap().clone()).unwrap();
        assert!(logs.contains("DEBUG"));
        assert!(logs.contains("parsed event"));
        assert!(!logs.contains("decode cache hit"));
    }
}
