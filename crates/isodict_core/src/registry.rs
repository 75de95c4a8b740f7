//! Per-value-type dictionary registry.

use crate::config::StoreConfig;
use crate::context::DictionaryContext;
use crate::dictionary::IsolatedDictionary;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

type AnyDictionary = Arc<dyn Any + Send + Sync>;

/// Holds at most one [`IsolatedDictionary`] per value type.
///
/// Dictionaries are looked up by the value type's [`TypeId`], so a lookup
/// can never return a dictionary of the wrong type.
#[derive(Debug, Default)]
pub struct StoreRegistry {
    dictionaries: RwLock<HashMap<TypeId, AnyDictionary>>,
}

impl StoreRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a dictionary for `V`, returning the one it replaces.
    pub fn register<V>(
        &self,
        dictionary: Arc<IsolatedDictionary<V>>,
    ) -> Option<Arc<IsolatedDictionary<V>>>
    where
        V: Send + Sync + 'static,
    {
        self.dictionaries
            .write()
            .insert(TypeId::of::<V>(), dictionary)
            .and_then(|previous| previous.downcast().ok())
    }

    /// Returns the dictionary registered for `V`.
    #[must_use]
    pub fn store<V>(&self) -> Option<Arc<IsolatedDictionary<V>>>
    where
        V: Send + Sync + 'static,
    {
        self.dictionaries
            .read()
            .get(&TypeId::of::<V>())
            .cloned()
            .and_then(|dictionary| dictionary.downcast().ok())
    }

    /// Returns the dictionary for `V`, creating it with `config` if absent.
    pub fn get_or_create<V>(&self, config: StoreConfig) -> Arc<IsolatedDictionary<V>>
    where
        V: Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        if let Some(existing) = self.store::<V>() {
            return existing;
        }

        let mut dictionaries = self.dictionaries.write();
        if let Some(existing) = dictionaries
            .get(&TypeId::of::<V>())
            .cloned()
            .and_then(|dictionary| dictionary.downcast().ok())
        {
            return existing;
        }
        let dictionary = Arc::new(IsolatedDictionary::<V>::new(config));
        dictionaries.insert(TypeId::of::<V>(), Arc::clone(&dictionary) as AnyDictionary);
        dictionary
    }

    /// Opens a context on the dictionary for `V`, if one is registered.
    #[must_use]
    pub fn context<V>(&self) -> Option<DictionaryContext<V>>
    where
        V: Send + Sync + 'static,
    {
        self.store::<V>().map(DictionaryContext::new)
    }

    /// Returns the number of registered dictionaries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.dictionaries.read().len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dictionaries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Order {
        total: u32,
    }

    #[test]
    fn one_dictionary_per_type() {
        let registry = StoreRegistry::new();
        let orders = registry.get_or_create::<Order>(StoreConfig::default());
        let again = registry.get_or_create::<Order>(StoreConfig::default());
        registry.get_or_create::<String>(StoreConfig::default());

        assert!(Arc::ptr_eq(&orders, &again));
        assert_eq!(registry.len(), 2);
        assert!(registry.store::<u64>().is_none());
    }

    #[test]
    fn register_replaces() {
        let registry = StoreRegistry::new();
        let first = Arc::new(IsolatedDictionary::<Order>::new(StoreConfig::default()));
        let second = Arc::new(IsolatedDictionary::<Order>::new(StoreConfig::default()));

        assert!(registry.register(Arc::clone(&first)).is_none());
        let replaced = registry.register(Arc::clone(&second)).unwrap();

        assert!(Arc::ptr_eq(&replaced, &first));
        assert!(Arc::ptr_eq(&registry.store::<Order>().unwrap(), &second));
    }

    #[test]
    fn contexts_share_the_registered_dictionary() {
        let registry = StoreRegistry::new();
        registry.get_or_create::<Order>(StoreConfig::default());

        let mut writer = registry.context::<Order>().unwrap();
        writer.add_or_update("o-1", Order { total: 10 }).unwrap();
        writer.commit().unwrap();

        let mut reader = registry.context::<Order>().unwrap();
        assert_eq!(reader.get("o-1").unwrap(), Some(Order { total: 10 }));
        assert!(registry.context::<String>().is_none());
    }
}
