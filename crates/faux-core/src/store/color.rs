use std::fmt;

use super::Codec;

/// An RGBA color packed into a `u32` with red in the low byte.
///
/// Opaque black is the "unset" value: it encodes to an empty string, and
/// anything that does not decode falls back to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PackedColor(pub u32);

const NAMED: &[(&str, PackedColor)] = &[
    ("black", PackedColor::BLACK),
    ("white", PackedColor::WHITE),
    ("red", PackedColor::rgba(255, 0, 0, 255)),
    ("lime", PackedColor::rgba(0, 255, 0, 255)),
    ("green", PackedColor::rgba(0, 128, 0, 255)),
    ("blue", PackedColor::rgba(0, 0, 255, 255)),
    ("yellow", PackedColor::rgba(255, 255, 0, 255)),
    ("orange", PackedColor::rgba(255, 165, 0, 255)),
    ("purple", PackedColor::rgba(128, 0, 128, 255)),
    ("gray", PackedColor::rgba(128, 128, 128, 255)),
    ("brown", PackedColor::rgba(165, 42, 42, 255)),
    ("transparent", PackedColor::rgba(0, 0, 0, 0)),
];

impl PackedColor {
    pub const BLACK: Self = Self::rgba(0, 0, 0, 255);
    pub const WHITE: Self = Self::rgba(255, 255, 255, 255);

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self((r as u32) | ((g as u32) << 8) | ((b as u32) << 16) | ((a as u32) << 24))
    }

    pub const fn r(self) -> u8 {
        self.0 as u8
    }

    pub const fn g(self) -> u8 {
        (self.0 >> 8) as u8
    }

    pub const fn b(self) -> u8 {
        (self.0 >> 16) as u8
    }

    pub const fn a(self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// Parse a packed integer, a color name, `#RRGGBB[AA]`, or `R G B [A]`.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if let Ok(packed) = raw.parse::<u32>() {
            return Some(Self(packed));
        }
        if let Some(hex) = raw.strip_prefix('#') {
            return parse_hex(hex);
        }
        if let Some((_, color)) = NAMED.iter().find(|(name, _)| name.eq_ignore_ascii_case(raw)) {
            return Some(*color);
        }
        parse_components(raw)
    }
}

fn parse_hex(hex: &str) -> Option<PackedColor> {
    if !matches!(hex.len(), 6 | 8) || !hex.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    let alpha = if hex.len() == 8 { channel(6)? } else { 255 };
    Some(PackedColor::rgba(channel(0)?, channel(2)?, channel(4)?, alpha))
}

fn parse_components(raw: &str) -> Option<PackedColor> {
    let parts = raw
        .split_whitespace()
        .map(|part| part.parse::<u8>().ok())
        .collect::<Option<Vec<_>>>()?;
    match parts[..] {
        [r, g, b] => Some(PackedColor::rgba(r, g, b, 255)),
        [r, g, b, a] => Some(PackedColor::rgba(r, g, b, a)),
        _ => None,
    }
}

impl Default for PackedColor {
    fn default() -> Self {
        Self::BLACK
    }
}

impl fmt::Display for PackedColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Codec for PackedColor {
    fn encode(&self) -> String {
        if *self == Self::BLACK {
            String::new()
        } else {
            self.to_string()
        }
    }

    fn decode(raw: &str) -> Self {
        Self::parse(raw).unwrap_or_default()
    }
}
