//! Typed libpod resource operations
//!
//! Each submodule adds `impl Client` blocks for one resource kind. Names and
//! ids in paths are escaped as a single path segment.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use podwire_core::api::API_PREFIX;

pub mod container;
pub mod image;
pub mod network;
pub mod secret;

/// Characters escaped in a path segment: everything except the unreserved
/// set and the sub-delimiters allowed inside a segment
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b',')
    .remove(b':')
    .remove(b';')
    .remove(b'=')
    .remove(b'@');

/// Escape `value` so it stays one path segment
pub fn escape_segment(value: &str) -> String {
    utf8_percent_encode(value, PATH_SEGMENT).to_string()
}

/// `{API_PREFIX}/{kind}/{escaped name}{suffix}`
pub(crate) fn resource_path(kind: &str, name: &str, suffix: &str) -> String {
    format!("{}/{}/{}{}", API_PREFIX, kind, escape_segment(name), suffix)
}

/// Form-encode query pairs in the given order
pub(crate) fn query(pairs: &[(&str, &str)]) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in pairs {
        serializer.append_pair(key, value);
    }
    serializer.finish()
}
