//! In-memory registry store
//!
//! Backs tests and dry runs. Clones share the same underlying state, so a
//! caller can hand one clone to a [`crate::backup::BackupManager`] and keep
//! another to inspect or mutate values.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use super::value::{RegistryHive, RegistryValue};
use super::RegistryStore;
use crate::error::{KeepsakeError, KeepsakeResult};

#[derive(Debug, Default)]
struct MemoryState {
    values: BTreeMap<(String, String), RegistryValue>,
    denied_keys: BTreeSet<String>,
}

/// Registry store held in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryRegistry {
    state: Rc<RefCell<MemoryState>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value directly, bypassing access checks
    pub fn insert(&self, key_path: &str, value_name: &str, value: RegistryValue) {
        if let Ok(key) = normalize(key_path, value_name) {
            self.state.borrow_mut().values.insert(key, value);
        }
    }

    /// Current value, if any, bypassing access checks
    pub fn get(&self, key_path: &str, value_name: &str) -> Option<RegistryValue> {
        let key = normalize(key_path, value_name).ok()?;
        self.state.borrow().values.get(&key).cloned()
    }

    /// Make every read and write under `key_path` fail with access denied
    pub fn deny(&self, key_path: &str) {
        if let Ok((key, _)) = normalize(key_path, "") {
            self.state.borrow_mut().denied_keys.insert(key);
        }
    }

    pub fn len(&self) -> usize {
        self.state.borrow().values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_access(&self, key: &str, key_path: &str) -> KeepsakeResult<()> {
        if self.state.borrow().denied_keys.contains(key) {
            return Err(KeepsakeError::Registry(format!(
                "Access denied to {}",
                key_path
            )));
        }
        Ok(())
    }
}

impl RegistryStore for MemoryRegistry {
    fn read_value(&self, key_path: &str, value_name: &str) -> KeepsakeResult<RegistryValue> {
        let key = normalize(key_path, value_name)?;
        self.check_access(&key.0, key_path)?;

        self.state
            .borrow()
            .values
            .get(&key)
            .cloned()
            .ok_or_else(|| {
                KeepsakeError::Registry(format!("Value {}\\{} not found", key_path, value_name))
            })
    }

    fn write_value(
        &self,
        key_path: &str,
        value_name: &str,
        value: &RegistryValue,
    ) -> KeepsakeResult<()> {
        let key = normalize(key_path, value_name)?;
        self.check_access(&key.0, key_path)?;

        self.state.borrow_mut().values.insert(key, value.clone());
        Ok(())
    }
}

/// Registry names are case-insensitive and hives have short aliases
fn normalize(key_path: &str, value_name: &str) -> KeepsakeResult<(String, String)> {
    let (hive, subkey) = RegistryHive::split_key_path(key_path)?;
    Ok((
        format!("{}\\{}", hive.canonical_name(), subkey.to_ascii_lowercase()),
        value_name.to_ascii_lowercase(),
    ))
}
