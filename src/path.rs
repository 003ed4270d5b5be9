//! Slash-delimited path lookup over a parsed JSON document.
//!
//! A path such as `/user/name` addresses `root["user"]["name"]`. The leading
//! separator is optional. Every segment is an object member key, including
//! empty segments produced by `//` or by an empty path, so `""` and `"/"`
//! both look up the member `""` of the root object.

use serde_json::Value;

pub const PATH_SEPARATOR: char = '/';

/// Split a path into its key segments, after dropping one leading separator.
///
/// Always yields at least one segment.
pub fn path_segments(path: &str) -> impl Iterator<Item = &str> {
    path.strip_prefix(PATH_SEPARATOR)
        .unwrap_or(path)
        .split(PATH_SEPARATOR)
}

/// Walk `document` along `path` and return the value found there, if any.
///
/// Only objects are descended into; arrays are not indexable.
pub fn lookup<'v>(document: &'v Value, path: &str) -> Option<&'v Value> {
    path_segments(path).try_fold(document, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        _ => None,
    })
}

/// Return the string at `path`, or `None` when the path does not resolve or
/// ends on anything other than a JSON string.
pub fn extract_by_path<'v>(document: &'v Value, path: &str) -> Option<&'v str> {
    lookup(document, path).and_then(Value::as_str)
}
