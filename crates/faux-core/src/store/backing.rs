use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::{Arc, Mutex, PoisonError};

/// The string dictionary a [`super::TypedStore`] reads and writes.
///
/// Writing an empty value removes the key: an absent key and an empty value
/// are the same logical state.
pub trait BackingStore {
    /// Whether `key` holds a non-empty value.
    fn contains_key(&self, key: &str) -> bool;

    /// The stored value, or `None` when the key is absent.
    fn try_get_value(&self, key: &str) -> Option<String>;

    /// Store `value` under `key`. An empty value deletes the key.
    fn set_value(&mut self, key: &str, value: &str);
}

/// An in-memory dictionary. Blank (empty or whitespace-only) writes delete.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryStore {
    data: HashMap<String, String>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys holding a value.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Iterate over `(key, value)` pairs in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.data.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// The underlying map.
    pub fn into_inner(self) -> HashMap<String, String> {
        self.data
    }
}

impl From<HashMap<String, String>> for MemoryStore {
    fn from(data: HashMap<String, String>) -> Self {
        let mut store = Self::new();
        for (key, value) in data {
            store.set_value(&key, &value);
        }
        store
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MemoryStore {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut store = Self::new();
        for (key, value) in iter {
            store.set_value(&key.into(), &value.into());
        }
        store
    }
}

impl BackingStore for MemoryStore {
    fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    fn try_get_value(&self, key: &str) -> Option<String> {
        self.data.get(key).cloned()
    }

    fn set_value(&mut self, key: &str, value: &str) {
        if value.trim().is_empty() {
            self.data.remove(key);
        } else {
            self.data.insert(key.to_string(), value.to_string());
        }
    }
}

/// A dictionary that may not exist yet: reads see nothing, writes are dropped.
impl<S: BackingStore> BackingStore for Option<S> {
    fn contains_key(&self, key: &str) -> bool {
        self.as_ref().is_some_and(|s| s.contains_key(key))
    }

    fn try_get_value(&self, key: &str) -> Option<String> {
        self.as_ref().and_then(|s| s.try_get_value(key))
    }

    fn set_value(&mut self, key: &str, value: &str) {
        if let Some(s) = self {
            s.set_value(key, value);
        }
    }
}

impl<S: BackingStore + ?Sized> BackingStore for &mut S {
    fn contains_key(&self, key: &str) -> bool {
        (**self).contains_key(key)
    }

    fn try_get_value(&self, key: &str) -> Option<String> {
        (**self).try_get_value(key)
    }

    fn set_value(&mut self, key: &str, value: &str) {
        (**self).set_value(key, value);
    }
}

impl<S: BackingStore + ?Sized> BackingStore for Box<S> {
    fn contains_key(&self, key: &str) -> bool {
        (**self).contains_key(key)
    }

    fn try_get_value(&self, key: &str) -> Option<String> {
        (**self).try_get_value(key)
    }

    fn set_value(&mut self, key: &str, value: &str) {
        (**self).set_value(key, value);
    }
}

/// Shared by several overlays on one thread.
impl<S: BackingStore> BackingStore for Rc<RefCell<S>> {
    fn contains_key(&self, key: &str) -> bool {
        self.borrow().contains_key(key)
    }

    fn try_get_value(&self, key: &str) -> Option<String> {
        self.borrow().try_get_value(key)
    }

    fn set_value(&mut self, key: &str, value: &str) {
        self.borrow_mut().set_value(key, value);
    }
}

/// Shared by overlays living on different threads.
impl<S: BackingStore> BackingStore for Arc<Mutex<S>> {
    fn contains_key(&self, key: &str) -> bool {
        self.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    fn try_get_value(&self, key: &str) -> Option<String> {
        self.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .try_get_value(key)
    }

    fn set_value(&mut self, key: &str, value: &str) {
        self.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .set_value(key, value);
    }
}
