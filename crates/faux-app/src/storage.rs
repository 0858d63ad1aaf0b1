use std::collections::BTreeMap;

use faux_core::store::codec;
use faux_core::{BackingStore, PackedColor, StoreError, TypedStore};

/// Per-chest options persisted in the chest's mod data dictionary.
pub struct StorageOptions<S> {
    data: TypedStore<S>,
}

impl<S: BackingStore> StorageOptions<S> {
    pub fn new(store: S, prefix: impl Into<String>) -> Self {
        Self {
            data: TypedStore::new(store, prefix),
        }
    }

    pub fn capacity(&mut self) -> Result<i32, StoreError> {
        self.data.get("Capacity", 0)
    }

    pub fn set_capacity(&mut self, value: i32) -> Result<(), StoreError> {
        self.data.set("Capacity", value)
    }

    pub fn auto_organize(&mut self) -> Result<bool, StoreError> {
        self.data.get("AutoOrganize", false)
    }

    pub fn set_auto_organize(&mut self, value: bool) -> Result<(), StoreError> {
        self.data.set("AutoOrganize", value)
    }

    pub fn tint(&mut self) -> Result<PackedColor, StoreError> {
        self.data.get("Tint", PackedColor::BLACK)
    }

    pub fn set_tint(&mut self, value: PackedColor) -> Result<(), StoreError> {
        self.data.set("Tint", value)
    }

    pub fn categories(&mut self) -> Result<Vec<String>, StoreError> {
        self.data.get("Categories", Vec::new())
    }

    pub fn set_categories(&mut self, value: Vec<String>) -> Result<(), StoreError> {
        self.data.set("Categories", value)
    }

    /// Item id to stack limit. Limits are stored as plain integers.
    pub fn stack_limits(&mut self) -> Result<BTreeMap<String, i32>, StoreError> {
        self.data.get_typed(
            "StackLimits",
            |raw| codec::string_to_dict_with(raw, codec::string_to_int),
            BTreeMap::new(),
        )
    }

    pub fn set_stack_limits(&mut self, value: BTreeMap<String, i32>) -> Result<(), StoreError> {
        self.data.set_typed("StackLimits", value, |limits| {
            codec::dict_to_string_with(limits, |n| n.to_string())
        })
    }

    pub fn label(&self) -> String {
        self.data.get_raw("Label", None)
    }

    pub fn set_label(&mut self, value: &str) {
        self.data.set_raw("Label", value);
    }

    pub fn store(&self) -> &S {
        self.data.store()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use faux_core::MemoryStore;

    #[test]
    fn options_round_trip_through_mod_data() {
        let mut options = StorageOptions::new(MemoryStore::new(), "faux.Chests/");
        options.set_capacity(70).unwrap();
        options.set_auto_organize(true).unwrap();
        options.set_categories(vec!["Minerals".into(), "Fish".into()]).unwrap();
        options.set_label("Basement");

        let data = options.store();
        assert_eq!(data.try_get_value("faux.Chests/Capacity").as_deref(), Some("70"));
        assert_eq!(data.try_get_value("faux.Chests/AutoOrganize").as_deref(), Some("True"));
        assert_eq!(
            data.try_get_value("faux.Chests/Categories").as_deref(),
            Some("Minerals,Fish")
        );
        assert_eq!(options.label(), "Basement");
        assert_eq!(options.categories().unwrap(), vec!["Minerals", "Fish"]);
    }

    #[test]
    fn stack_limits_keep_zero_entries() {
        let mut options = StorageOptions::new(MemoryStore::new(), "c/");
        let limits = BTreeMap::from([("Wood".to_string(), 0), ("Stone".to_string(), 999)]);
        options.set_stack_limits(limits.clone()).unwrap();
        assert_eq!(
            options.store().try_get_value("c/StackLimits").as_deref(),
            Some("Stone=999,Wood=0")
        );
        assert_eq!(options.stack_limits().unwrap(), limits);
    }

    #[test]
    fn unset_options_read_defaults() {
        let mut options = StorageOptions::new(MemoryStore::new(), "c/");
        assert_eq!(options.capacity().unwrap(), 0);
        assert!(!options.auto_organize().unwrap());
        assert_eq!(options.tint().unwrap(), PackedColor::BLACK);
        assert!(options.stack_limits().unwrap().is_empty());
        assert_eq!(options.label(), "");
    }
}
