use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;

use tracing::{debug, error};

use super::{BackingStore, Codec};
use crate::error::StoreError;

/// A parsed value and the raw string it was parsed from.
struct CacheEntry<T> {
    raw: String,
    value: T,
}

struct FieldType {
    id: TypeId,
    name: &'static str,
    evict: fn(&mut (dyn Any + Send), &str),
}

fn evict<T: Send + 'static>(arena: &mut (dyn Any + Send), field: &str) {
    if let Some(arena) = arena.downcast_mut::<HashMap<String, CacheEntry<T>>>() {
        arena.remove(field);
    }
}

/// Per-field cache, partitioned by value type.
///
/// Each field is bound to one type the first time it is cached; its entry then
/// lives in that type's arena, so lookups never guess at a type.
#[derive(Default)]
struct CacheTable {
    types: HashMap<String, FieldType>,
    arenas: HashMap<TypeId, Box<dyn Any + Send>>,
}

impl CacheTable {
    /// Fail if `field` is already bound to a type other than `T`.
    fn check<T: 'static>(&self, field: &str) -> Result<(), &'static str> {
        match self.types.get(field) {
            Some(bound) if bound.id != TypeId::of::<T>() => Err(bound.name),
            _ => Ok(()),
        }
    }

    fn get<T: Send + 'static>(&self, field: &str) -> Option<&CacheEntry<T>> {
        self.arenas
            .get(&TypeId::of::<T>())?
            .downcast_ref::<HashMap<String, CacheEntry<T>>>()?
            .get(field)
    }

    fn insert<T: Send + 'static>(&mut self, field: &str, entry: CacheEntry<T>) {
        let arena = self
            .arenas
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(HashMap::<String, CacheEntry<T>>::new()));
        if let Some(arena) = arena.downcast_mut::<HashMap<String, CacheEntry<T>>>() {
            arena.insert(field.to_string(), entry);
            self.types.entry(field.to_string()).or_insert(FieldType {
                id: TypeId::of::<T>(),
                name: type_name::<T>(),
                evict: evict::<T>,
            });
        }
    }

    fn remove(&mut self, field: &str) {
        let Some(bound) = self.types.remove(field) else {
            return;
        };
        if let Some(arena) = self.arenas.get_mut(&bound.id) {
            (bound.evict)(arena.as_mut(), field);
        }
    }

    fn clear(&mut self) {
        self.types.clear();
        self.arenas.clear();
    }
}

/// Typed, memoized fields over a string-keyed [`BackingStore`].
///
/// Every field name is prefixed with the overlay's prefix to form the backing
/// key, so overlays with disjoint prefixes can share one store. A parsed value
/// is reused for as long as the backing store still holds the raw string it
/// was parsed from; writes made behind the overlay's back are picked up on
/// the next read.
///
/// The cache is not synchronized. Use one overlay per thread, or share it
/// behind a lock such as `Arc<Mutex<TypedStore<_>>>`; the overlay is `Send`
/// whenever its backing store is.
pub struct TypedStore<S> {
    store: S,
    prefix: String,
    cache: CacheTable,
}

impl<S: BackingStore> TypedStore<S> {
    /// Overlay `store`, reading and writing keys under `prefix`.
    pub fn new(store: S, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            cache: CacheTable::default(),
        }
    }

    /// Prepended to every field name to form its backing key.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The backing store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Mutable access to the backing store. Cached fields revalidate against
    /// whatever is written here.
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Drop the cache and hand back the backing store.
    pub fn into_inner(self) -> S {
        self.store
    }

    fn key(&self, field: &str) -> String {
        format!("{}{field}", self.prefix)
    }

    /// Whether the backing store holds a value for `field`.
    pub fn has_value(&self, field: &str) -> bool {
        self.store.contains_key(&self.key(field))
    }

    /// The raw backing value, or `default` (empty when `None`) if unset.
    pub fn get_raw(&self, field: &str, default: Option<&str>) -> String {
        self.store
            .try_get_value(&self.key(field))
            .unwrap_or_else(|| default.unwrap_or_default().to_string())
    }

    /// Write a raw value without touching the cache. Empty deletes the key.
    pub fn set_raw(&mut self, field: &str, value: &str) {
        let key = self.key(field);
        self.store.set_value(&key, value);
    }

    /// Read `field` as a `T`, parsing only if the raw value changed.
    ///
    /// Returns `default` when the key is absent. Fails with
    /// [`StoreError::TypeMismatch`] if the field is already cached as another
    /// type.
    pub fn get_typed<T: Clone + Send + 'static>(
        &mut self,
        field: &str,
        parse: impl FnOnce(&str) -> T,
        default: T,
    ) -> Result<T, StoreError> {
        let key = self.key(field);
        let Some(raw) = self.store.try_get_value(&key) else {
            return Ok(default);
        };

        self.check_type::<T>(field, &key)?;
        if let Some(entry) = self.cache.get::<T>(field) {
            if entry.raw == raw {
                return Ok(entry.value.clone());
            }
        }

        debug!(key = %key, "parsing field");
        let value = parse(&raw);
        self.cache.insert(
            field,
            CacheEntry {
                raw,
                value: value.clone(),
            },
        );
        Ok(value)
    }

    /// Serialize and store `value`, caching it so the next read skips parsing.
    ///
    /// An empty serialization deletes the key.
    pub fn set_typed<T: Send + 'static>(
        &mut self,
        field: &str,
        value: T,
        serialize: impl FnOnce(&T) -> String,
    ) -> Result<(), StoreError> {
        let key = self.key(field);
        self.check_type::<T>(field, &key)?;

        let raw = serialize(&value);
        self.store.set_value(&key, &raw);
        self.cache.insert(field, CacheEntry { raw, value });
        Ok(())
    }

    /// [`Self::get_typed`] using the type's [`Codec`].
    pub fn get<T: Codec + Clone + Send + 'static>(
        &mut self,
        field: &str,
        default: T,
    ) -> Result<T, StoreError> {
        self.get_typed(field, T::decode, default)
    }

    /// [`Self::set_typed`] using the type's [`Codec`].
    pub fn set<T: Codec + Send + 'static>(&mut self, field: &str, value: T) -> Result<(), StoreError> {
        self.set_typed(field, value, T::encode)
    }

    /// Forget the cached value and type binding of `field`.
    pub fn invalidate(&mut self, field: &str) {
        self.cache.remove(field);
    }

    /// Forget every cached value and type binding.
    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    fn check_type<T: 'static>(&self, field: &str, key: &str) -> Result<(), StoreError> {
        self.cache.check::<T>(field).map_err(|cached| {
            let err = StoreError::TypeMismatch {
                key: key.to_string(),
                cached,
                requested: type_name::<T>(),
            };
            error!("{err}");
            err
        })
    }
}
