//! Typed, cached access to string-keyed dictionaries.
//!
//! Mods persist their per-object data (chest options, mod data on items) as
//! flat `String -> String` maps. [`TypedStore`] layers typed getters and
//! setters on top of any [`BackingStore`], parsing a value only when its raw
//! string has changed since the last read.

mod backing;
pub mod codec;
mod color;
mod overlay;

pub use backing::{BackingStore, MemoryStore};
pub use codec::Codec;
pub use color::PackedColor;
pub use overlay::TypedStore;
