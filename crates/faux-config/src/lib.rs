//! Configuration for Faux mods.
//!
//! Owns the mod manifest schema and the load/save/reset lifecycle of a mod's
//! options, announcing every change on the shared event bus.

pub mod log_amount;
pub mod manager;
pub mod manifest;

pub use log_amount::{ConfigWithLogAmount, LogAmount};
pub use manager::{data_dir, ConfigManager};
pub use manifest::ModManifest;
