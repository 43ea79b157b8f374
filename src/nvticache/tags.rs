//! Decoding of the tag blob.
//!
//! The blob is a `|` separated list of `key=value` segments. Only the
//! first `=` of a segment separates the key from the value, so values may
//! hold `=`, `:`, `/` or new lines.

use std::collections::HashMap;

use log::warn;

use crate::errors::CacheError;

/// The segment separator.
pub const TAG_SEPARATOR: char = '|';

/// Splits a blob into its segments, each decoded on its own.
/// Empty segments are left out.
pub fn decode_segments(blob: &str) -> Vec<Result<(String, String), CacheError>> {
    blob.split(TAG_SEPARATOR)
        .filter(|segment| !segment.is_empty())
        .map(|segment| match segment.split_once('=') {
            Some((key, value)) => Ok((key.to_string(), value.to_string())),
            None => Err(CacheError::MalformedTag(segment.to_string())),
        })
        .collect()
}

/// Decodes a blob into a map. Malformed segments are logged and skipped,
/// the last of duplicated keys wins.
pub fn parse_tags(oid: &str, blob: &str) -> HashMap<String, String> {
    let mut tags = HashMap::new();
    for segment in decode_segments(blob) {
        match segment {
            Ok((key, value)) => {
                tags.insert(key, value);
            }
            Err(e) => warn!("Skipping a tag of {}: {}", oid, e),
        }
    }
    tags
}
