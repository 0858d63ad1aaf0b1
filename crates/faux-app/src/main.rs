use std::cell::RefCell;
use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use faux_config::{ConfigManager, ConfigWithLogAmount, LogAmount, ModManifest};
use faux_core::{handler, logging, ConfigChanged, EventBus, MemoryStore, PackedColor, Signal};

mod storage;

use storage::StorageOptions;

const DEFAULT_MANIFEST: &str = r#"
id = "faux.Chests"
name = "Faux Chests"
version = "0.1.0"
"#;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct AppConfig {
    log_amount: LogAmount,
    default_capacity: i32,
    default_categories: Vec<String>,
    auto_organize: bool,
}

impl ConfigWithLogAmount for AppConfig {
    fn log_amount(&self) -> LogAmount {
        self.log_amount
    }
}

/// Startup milestones announced as [`Signal`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    ConfigReady,
    ChestReady,
}

/// Published after a chest option is written.
#[derive(Debug)]
struct OptionChanged {
    field: &'static str,
}

fn load_manifest(dir: &std::path::Path) -> Result<ModManifest> {
    let path = dir.join("manifest.toml");
    if path.exists() {
        ModManifest::from_path(&path)
    } else {
        ModManifest::from_toml_str(DEFAULT_MANIFEST).context("built-in manifest is invalid")
    }
}

fn main() -> Result<()> {
    let logs = logging::init(LogAmount::default().default_filter())?;

    let config_dir = env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let manifest = load_manifest(&config_dir)?;

    let bus = Arc::new(EventBus::new());
    let mut manager: ConfigManager<AppConfig> =
        ConfigManager::new(manifest.clone(), &config_dir, Arc::clone(&bus));
    let config = manager.config().clone();
    logs.set_default_level(config.log_amount().default_filter())?;
    info!(mod_id = %manifest.id, version = %manifest.version, "starting up");

    // Theme and integrations must see config before anything reads it.
    bus.subscribe_with_priority(
        handler(|ev: &ConfigChanged<AppConfig>| {
            info!(log_amount = %ev.config.log_amount, "applying config");
            Ok(())
        }),
        10,
    );
    bus.subscribe(handler(|ev: &ConfigChanged<AppConfig>| {
        info!(capacity = ev.config.default_capacity, "chest defaults updated");
        Ok(())
    }));
    bus.subscribe(handler(|signal: &Signal<Lifecycle>| {
        info!(stage = ?signal.value(), "lifecycle");
        Ok(())
    }));
    bus.subscribe(handler(|ev: &OptionChanged| {
        info!(field = ev.field, "chest option changed");
        Ok(())
    }));
    manager.init();
    bus.publish(&Signal(Lifecycle::ConfigReady));

    let mod_data = Rc::new(RefCell::new(MemoryStore::new()));
    let mut chest = StorageOptions::new(mod_data, manifest.data_prefix());
    chest.set_capacity(config.default_capacity)?;
    bus.publish(&OptionChanged { field: "Capacity" });
    chest.set_categories(config.default_categories.clone())?;
    bus.publish(&OptionChanged { field: "Categories" });
    chest.set_auto_organize(config.auto_organize)?;
    bus.publish(&OptionChanged { field: "AutoOrganize" });
    chest.set_tint(PackedColor::rgba(139, 69, 19, 255))?;
    bus.publish(&OptionChanged { field: "Tint" });
    chest.set_stack_limits(BTreeMap::from([("Stone".to_string(), 999)]))?;
    bus.publish(&OptionChanged { field: "StackLimits" });
    chest.set_label(&manifest.name);
    bus.publish(&Signal(Lifecycle::ChestReady));

    if let Err(err) = manager.save(config) {
        warn!("could not save config: {err:#}");
    }

    let mut entries: Vec<(String, String)> = chest
        .store()
        .borrow()
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    entries.sort();
    for (key, value) in entries {
        println!("{key} = {value}");
    }

    let warnings = logs
        .buffer()
        .lock()
        .map(|buf| buf.iter().filter(|e| e.level >= logging::LogLevel::Warn).count())
        .unwrap_or(0);
    println!(
        "{}: {warnings} warning(s), capacity {}, {} stack limit(s)",
        chest.label(),
        chest.capacity()?,
        chest.stack_limits()?.len()
    );
    Ok(())
}
