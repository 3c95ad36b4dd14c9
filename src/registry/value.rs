//! Typed registry values and key paths

use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};

use crate::error::{KeepsakeError, KeepsakeResult};

/// Root hive a key path starts with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegistryHive {
    LocalMachine,
    CurrentUser,
    ClassesRoot,
    Users,
}

impl RegistryHive {
    pub fn canonical_name(&self) -> &'static str {
        match self {
            RegistryHive::LocalMachine => "HKEY_LOCAL_MACHINE",
            RegistryHive::CurrentUser => "HKEY_CURRENT_USER",
            RegistryHive::ClassesRoot => "HKEY_CLASSES_ROOT",
            RegistryHive::Users => "HKEY_USERS",
        }
    }

    /// Split `HKLM\SOFTWARE\Vendor` into the hive and `SOFTWARE\Vendor`
    pub fn split_key_path(key_path: &str) -> KeepsakeResult<(RegistryHive, &str)> {
        let (root, rest) = match key_path.split_once('\\') {
            Some((root, rest)) => (root, rest.trim_matches('\\')),
            None => (key_path, ""),
        };

        let hive = match root.to_ascii_uppercase().as_str() {
            "HKEY_LOCAL_MACHINE" | "HKLM" => RegistryHive::LocalMachine,
            "HKEY_CURRENT_USER" | "HKCU" => RegistryHive::CurrentUser,
            "HKEY_CLASSES_ROOT" | "HKCR" => RegistryHive::ClassesRoot,
            "HKEY_USERS" | "HKU" => RegistryHive::Users,
            _ => {
                return Err(KeepsakeError::Registry(format!(
                    "Unknown registry hive in '{}'",
                    key_path
                )))
            }
        };

        if rest.is_empty() {
            return Err(KeepsakeError::Registry(format!(
                "Key path '{}' names a hive without a subkey",
                key_path
            )));
        }

        Ok((hive, rest))
    }
}

/// Registry value type as stored in snapshot metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistryValueType {
    #[serde(rename = "REG_SZ")]
    String,
    #[serde(rename = "REG_EXPAND_SZ")]
    ExpandString,
    #[serde(rename = "REG_MULTI_SZ")]
    MultiString,
    #[serde(rename = "REG_DWORD")]
    Dword,
    #[serde(rename = "REG_QWORD")]
    Qword,
    #[serde(rename = "REG_BINARY")]
    Binary,
}

impl fmt::Display for RegistryValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RegistryValueType::String => "REG_SZ",
            RegistryValueType::ExpandString => "REG_EXPAND_SZ",
            RegistryValueType::MultiString => "REG_MULTI_SZ",
            RegistryValueType::Dword => "REG_DWORD",
            RegistryValueType::Qword => "REG_QWORD",
            RegistryValueType::Binary => "REG_BINARY",
        };
        f.write_str(name)
    }
}

/// A registry value with its type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryValue {
    String(String),
    ExpandString(String),
    MultiString(Vec<String>),
    Dword(u32),
    Qword(u64),
    Binary(Vec<u8>),
}

impl RegistryValue {
    pub fn value_type(&self) -> RegistryValueType {
        match self {
            RegistryValue::String(_) => RegistryValueType::String,
            RegistryValue::ExpandString(_) => RegistryValueType::ExpandString,
            RegistryValue::MultiString(_) => RegistryValueType::MultiString,
            RegistryValue::Dword(_) => RegistryValueType::Dword,
            RegistryValue::Qword(_) => RegistryValueType::Qword,
            RegistryValue::Binary(_) => RegistryValueType::Binary,
        }
    }

    /// JSON form of the data; binary data is base64 encoded
    pub fn data_to_json(&self) -> serde_json::Value {
        match self {
            RegistryValue::String(s) | RegistryValue::ExpandString(s) => s.clone().into(),
            RegistryValue::MultiString(items) => items.clone().into(),
            RegistryValue::Dword(n) => (*n).into(),
            RegistryValue::Qword(n) => (*n).into(),
            RegistryValue::Binary(bytes) => STANDARD.encode(bytes).into(),
        }
    }

    /// Rebuild a value from its metadata type and JSON data
    pub fn from_json(
        value_type: RegistryValueType,
        data: &serde_json::Value,
    ) -> KeepsakeResult<Self> {
        let mismatch = || {
            KeepsakeError::Json(format!(
                "value_data {} does not match value_type {}",
                data, value_type
            ))
        };

        Ok(match value_type {
            RegistryValueType::String => {
                RegistryValue::String(data.as_str().ok_or_else(mismatch)?.to_string())
            }
            RegistryValueType::ExpandString => {
                RegistryValue::ExpandString(data.as_str().ok_or_else(mismatch)?.to_string())
            }
            RegistryValueType::MultiString => {
                let items = data.as_array().ok_or_else(mismatch)?;
                let strings = items
                    .iter()
                    .map(|item| item.as_str().map(str::to_string).ok_or_else(mismatch))
                    .collect::<KeepsakeResult<Vec<_>>>()?;
                RegistryValue::MultiString(strings)
            }
            RegistryValueType::Dword => {
                let n = data.as_u64().ok_or_else(mismatch)?;
                RegistryValue::Dword(u32::try_from(n).map_err(|_| mismatch())?)
            }
            RegistryValueType::Qword => RegistryValue::Qword(data.as_u64().ok_or_else(mismatch)?),
            RegistryValueType::Binary => {
                let encoded = data.as_str().ok_or_else(mismatch)?;
                RegistryValue::Binary(STANDARD.decode(encoded).map_err(|_| mismatch())?)
            }
        })
    }
}
