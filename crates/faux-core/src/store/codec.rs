//! String encodings for values kept in a [`super::BackingStore`].
//!
//! Every encoding writes the type's "unset" value as an empty string, so
//! storing it deletes the key, and every decoding falls back to that value
//! when the raw string is empty or malformed. Hand-edited or outdated data
//! never fails to load.

use std::collections::BTreeMap;

/// A value with a canonical string encoding.
///
/// Lists are only encoded for `String` elements. An element type whose unset
/// value encodes as empty would vanish from the list on the next decode, so
/// other element types go through [`list_to_string_with`] with an encoder
/// that never yields an empty segment.
pub trait Codec: Sized {
    /// The stored form. Empty means "unset".
    fn encode(&self) -> String;

    /// Parse a stored value, falling back to the unset value.
    fn decode(raw: &str) -> Self;
}

/// `true` becomes `"True"`, `false` becomes empty.
pub fn bool_to_string(value: bool) -> String {
    if value {
        "True".to_string()
    } else {
        String::new()
    }
}

/// Case-insensitive `true`/`false`; anything else is `false`.
pub fn string_to_bool(raw: &str) -> bool {
    raw.trim().eq_ignore_ascii_case("true")
}

/// Zero becomes empty.
pub fn int_to_string(value: i32) -> String {
    if value == 0 {
        String::new()
    } else {
        value.to_string()
    }
}

pub fn string_to_int(raw: &str) -> i32 {
    raw.trim().parse().unwrap_or(0)
}

/// Comma-join the encoded elements; an empty slice becomes empty.
///
/// `encode` must not return an empty string for an element that should
/// survive a decode.
pub fn list_to_string_with<T>(values: &[T], encode: impl Fn(&T) -> String) -> String {
    values.iter().map(encode).collect::<Vec<_>>().join(",")
}

/// Split on commas, trim, drop empty segments and decode the rest.
pub fn string_to_list_with<T>(raw: &str, decode: impl Fn(&str) -> T) -> Vec<T> {
    raw.split(',')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(decode)
        .collect()
}

/// Comma-join strings. Empty elements are lost on decode.
pub fn list_to_string(values: &[String]) -> String {
    list_to_string_with(values, String::clone)
}

/// Split a comma-joined list, dropping empty segments.
pub fn string_to_list(raw: &str) -> Vec<String> {
    string_to_list_with(raw, str::to_string)
}

/// `key=value` pairs joined by commas; an empty map becomes empty.
pub fn dict_to_string_with<V>(
    values: &BTreeMap<String, V>,
    encode: impl Fn(&V) -> String,
) -> String {
    values
        .iter()
        .map(|(key, value)| format!("{key}={}", encode(value)))
        .collect::<Vec<_>>()
        .join(",")
}

/// Inverse of [`dict_to_string_with`].
///
/// Segments without `=` or with an empty key are skipped. A repeated key keeps
/// its last value.
pub fn string_to_dict_with<V>(raw: &str, decode: impl Fn(&str) -> V) -> BTreeMap<String, V> {
    raw.split(',')
        .filter_map(|segment| segment.split_once('='))
        .map(|(key, value)| (key.trim(), value.trim()))
        .filter(|(key, _)| !key.is_empty())
        .map(|(key, value)| (key.to_string(), decode(value)))
        .collect()
}

pub fn dict_to_string(values: &BTreeMap<String, String>) -> String {
    dict_to_string_with(values, String::clone)
}

pub fn string_to_dict(raw: &str) -> BTreeMap<String, String> {
    string_to_dict_with(raw, str::to_string)
}

impl Codec for bool {
    fn encode(&self) -> String {
        bool_to_string(*self)
    }

    fn decode(raw: &str) -> Self {
        string_to_bool(raw)
    }
}

impl Codec for i32 {
    fn encode(&self) -> String {
        int_to_string(*self)
    }

    fn decode(raw: &str) -> Self {
        string_to_int(raw)
    }
}

impl Codec for String {
    fn encode(&self) -> String {
        self.clone()
    }

    fn decode(raw: &str) -> Self {
        raw.to_string()
    }
}

impl Codec for Vec<String> {
    fn encode(&self) -> String {
        list_to_string(self)
    }

    fn decode(raw: &str) -> Self {
        string_to_list(raw)
    }
}

impl<V: Codec> Codec for BTreeMap<String, V> {
    fn encode(&self) -> String {
        dict_to_string_with(self, V::encode)
    }

    fn decode(raw: &str) -> Self {
        string_to_dict_with(raw, V::decode)
    }
}
