use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use faux_core::{ConfigChanged, EventBus};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::manifest::ModManifest;

const CONFIG_FILE: &str = "config.toml";
const BACKUP_FILE: &str = "config.json";

/// Root directory for per-mod global data such as config backups.
///
/// `FAUX_DATA_DIR` wins; otherwise `<platform data dir>/faux`.
pub fn data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("FAUX_DATA_DIR") {
        return PathBuf::from(dir);
    }
    match dirs::data_dir() {
        Some(data) => data.join("faux"),
        None => PathBuf::from("data"),
    }
}

/// Loads, saves and resets a mod's options, publishing
/// [`ConfigChanged<C>`] on the bus after every change.
///
/// The options live in `<config dir>/config.toml`. Every save also writes a
/// JSON backup under the global data directory, which is used when the
/// primary file is missing or unreadable.
pub struct ConfigManager<C> {
    manifest: ModManifest,
    config_path: PathBuf,
    backup_path: PathBuf,
    bus: Arc<EventBus>,
    config: Option<C>,
    initialized: bool,
}

impl<C> ConfigManager<C>
where
    C: Serialize + DeserializeOwned + Default + Clone + 'static,
{
    /// Manage the options of `manifest`'s mod, stored under `config_dir`.
    ///
    /// Nothing is read until the options are first needed.
    pub fn new(manifest: ModManifest, config_dir: impl AsRef<Path>, bus: Arc<EventBus>) -> Self {
        let backup_path = data_dir().join(&manifest.id).join(BACKUP_FILE);
        Self {
            config_path: config_dir.as_ref().join(CONFIG_FILE),
            backup_path,
            manifest,
            bus,
            config: None,
            initialized: false,
        }
    }

    /// Keep backups under `dir` instead of [`data_dir`].
    pub fn with_data_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.backup_path = dir.as_ref().join(&self.manifest.id).join(BACKUP_FILE);
        self
    }

    /// The mod this manager belongs to.
    pub fn manifest(&self) -> &ModManifest {
        &self.manifest
    }

    /// Location of the primary config file.
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Location of the JSON backup.
    pub fn backup_path(&self) -> &Path {
        &self.backup_path
    }

    /// The saved options, from the config file or else the backup.
    pub fn existing(&self) -> Option<C> {
        match read_toml(&self.config_path) {
            Ok(config) => return Some(config),
            Err(err) => debug!(mod_id = %self.manifest.id, "config file unusable: {err:#}"),
        }
        match read_json(&self.backup_path) {
            Ok(config) => {
                info!(mod_id = %self.manifest.id, "restored config from backup");
                Some(config)
            }
            Err(err) => {
                debug!(mod_id = %self.manifest.id, "config backup unusable, using defaults: {err:#}");
                None
            }
        }
    }

    /// Current options, loading them on first access.
    pub fn config(&mut self) -> &C {
        if self.config.is_none() {
            self.config = Some(self.existing().unwrap_or_default());
        }
        self.config.get_or_insert_with(C::default)
    }

    /// Announce the initial options once. Returns `false` on repeat calls.
    pub fn init(&mut self) -> bool {
        if self.initialized {
            return false;
        }
        self.initialized = true;
        self.publish();
        true
    }

    /// Persist `config`, make it current and announce it.
    pub fn save(&mut self, config: C) -> Result<()> {
        write_toml(&self.config_path, &config)?;
        if let Err(err) = write_json(&self.backup_path, &config) {
            warn!(mod_id = %self.manifest.id, "failed to write config backup: {err:#}");
        }
        self.config = Some(config);
        info!(mod_id = %self.manifest.id, path = %self.config_path.display(), "config saved");
        self.publish();
        Ok(())
    }

    /// Replace the current options with defaults and announce them.
    ///
    /// Nothing is written; call [`Self::save`] to persist.
    pub fn reset(&mut self) {
        self.config = Some(C::default());
        self.publish();
    }

    fn publish(&mut self) {
        let config = self.config().clone();
        self.bus.publish(&ConfigChanged::new(config));
    }
}

fn read_toml<C: DeserializeOwned>(path: &Path) -> Result<C> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

fn read_json<C: DeserializeOwned>(path: &Path) -> Result<C> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

fn write_toml<C: Serialize>(path: &Path, config: &C) -> Result<()> {
    let raw = toml::to_string_pretty(config).context("failed to serialize config as TOML")?;
    write_file(path, &raw)
}

fn write_json<C: Serialize>(path: &Path, config: &C) -> Result<()> {
    let raw = serde_json::to_string_pretty(config).context("failed to serialize config as JSON")?;
    write_file(path, &raw)
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))
}
