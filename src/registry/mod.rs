//! Registry access for snapshots
//!
//! Snapshots read and write registry values through [`RegistryStore`]. On
//! Windows [`system_registry`] returns a store backed by the Win32 registry
//! API; elsewhere it returns a store that rejects every access, and tests use
//! [`MemoryRegistry`].

mod memory;
pub mod value;
#[cfg(windows)]
mod windows;

pub use memory::MemoryRegistry;
pub use value::{RegistryHive, RegistryValue, RegistryValueType};

use crate::error::{KeepsakeError, KeepsakeResult};

/// Source and destination of captured registry values
pub trait RegistryStore {
    /// Read a value with its type, without modifying it
    fn read_value(&self, key_path: &str, value_name: &str) -> KeepsakeResult<RegistryValue>;

    /// Write a value, creating the key if needed
    fn write_value(
        &self,
        key_path: &str,
        value_name: &str,
        value: &RegistryValue,
    ) -> KeepsakeResult<()>;
}

/// Registry store of the host system
pub fn system_registry() -> Box<dyn RegistryStore> {
    #[cfg(windows)]
    {
        Box::new(windows::WindowsRegistry)
    }
    #[cfg(not(windows))]
    {
        Box::new(UnavailableRegistry)
    }
}

/// Store used on platforms without a registry
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableRegistry;

impl RegistryStore for UnavailableRegistry {
    fn read_value(&self, key_path: &str, value_name: &str) -> KeepsakeResult<RegistryValue> {
        Err(KeepsakeError::Registry(format!(
            "Cannot read {}\\{}: the registry is only available on Windows",
            key_path, value_name
        )))
    }

    fn write_value(
        &self,
        key_path: &str,
        value_name: &str,
        _value: &RegistryValue,
    ) -> KeepsakeResult<()> {
        Err(KeepsakeError::Registry(format!(
            "Cannot write {}\\{}: the registry is only available on Windows",
            key_path, value_name
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_registry_rejects_access() {
        let store = UnavailableRegistry;
        assert!(matches!(
            store.read_value(r"HKCU\Software\X", "V"),
            Err(KeepsakeError::Registry(_))
        ));
        assert!(store
            .write_value(r"HKCU\Software\X", "V", &RegistryValue::Dword(1))
            .is_err());
    }
}
