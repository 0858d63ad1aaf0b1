//! Shared infrastructure for Faux mods.
//!
//! Two pieces are meant to be reused by every mod in the family: a
//! priority-ordered, type-keyed [`EventBus`](bus::EventBus) that decouples
//! initialization order between independently loaded components, and a
//! cached [`TypedStore`](store::TypedStore) overlay that gives strongly typed
//! access to data persisted as flat string dictionaries.

pub mod bus;
pub mod error;
pub mod event;
pub mod logging;
pub mod store;

pub use bus::{handler, EventBus, Handler, Priority, DEFAULT_PRIORITY};
pub use error::StoreError;
pub use event::{ConfigChanged, Signal};
pub use store::{BackingStore, Codec, MemoryStore, PackedColor, TypedStore};
