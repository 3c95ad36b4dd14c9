//! Win32 registry store

use std::ffi::OsStr;
use std::os::windows::ffi::OsStrExt;
use std::ptr;

use windows_sys::Win32::Foundation::{ERROR_FILE_NOT_FOUND, ERROR_MORE_DATA, ERROR_SUCCESS};
use windows_sys::Win32::System::Registry::{
    RegCloseKey, RegCreateKeyExW, RegOpenKeyExW, RegQueryValueExW, RegSetValueExW, HKEY,
    HKEY_CLASSES_ROOT, HKEY_CURRENT_USER, HKEY_LOCAL_MACHINE, HKEY_USERS, KEY_READ,
    KEY_WOW64_64KEY, KEY_WRITE, REG_BINARY, REG_DWORD, REG_EXPAND_SZ, REG_MULTI_SZ,
    REG_OPTION_NON_VOLATILE, REG_QWORD, REG_SZ, REG_VALUE_TYPE,
};

use super::value::{RegistryHive, RegistryValue};
use super::RegistryStore;
use crate::error::{KeepsakeError, KeepsakeResult};

/// Registry store backed by the Win32 API (64-bit view)
#[derive(Debug, Clone, Copy, Default)]
pub struct WindowsRegistry;

/// Open key handle, closed on drop
struct KeyHandle(HKEY);

impl Drop for KeyHandle {
    fn drop(&mut self) {
        unsafe {
            // Safe because the handle was returned by RegOpenKeyExW/RegCreateKeyExW.
            RegCloseKey(self.0);
        }
    }
}

fn root_handle(hive: RegistryHive) -> HKEY {
    match hive {
        RegistryHive::LocalMachine => HKEY_LOCAL_MACHINE,
        RegistryHive::CurrentUser => HKEY_CURRENT_USER,
        RegistryHive::ClassesRoot => HKEY_CLASSES_ROOT,
        RegistryHive::Users => HKEY_USERS,
    }
}

fn wide(s: &str) -> Vec<u16> {
    OsStr::new(s).encode_wide().chain(std::iter::once(0)).collect()
}

fn win32_error(action: &str, key_path: &str, code: u32) -> KeepsakeError {
    let io = std::io::Error::from_raw_os_error(code as i32);
    KeepsakeError::Registry(format!("Failed to {} {}: {}", action, key_path, io))
}

fn open_key(key_path: &str) -> KeepsakeResult<KeyHandle> {
    let (hive, subkey) = RegistryHive::split_key_path(key_path)?;
    let subkey = wide(subkey);
    let mut handle: HKEY = ptr::null_mut();

    let status = unsafe {
        // Safe because `subkey` is NUL-terminated and `handle` is writable.
        RegOpenKeyExW(
            root_handle(hive),
            subkey.as_ptr(),
            0,
            KEY_READ | KEY_WOW64_64KEY,
            &mut handle,
        )
    };
    if status != ERROR_SUCCESS {
        return Err(win32_error("open", key_path, status));
    }
    Ok(KeyHandle(handle))
}

fn create_key(key_path: &str) -> KeepsakeResult<KeyHandle> {
    let (hive, subkey) = RegistryHive::split_key_path(key_path)?;
    let subkey = wide(subkey);
    let mut handle: HKEY = ptr::null_mut();

    let status = unsafe {
        // Safe because all pointers are valid or null where the API allows null.
        RegCreateKeyExW(
            root_handle(hive),
            subkey.as_ptr(),
            0,
            ptr::null(),
            REG_OPTION_NON_VOLATILE,
            KEY_WRITE | KEY_WOW64_64KEY,
            ptr::null(),
            &mut handle,
            ptr::null_mut(),
        )
    };
    if status != ERROR_SUCCESS {
        return Err(win32_error("create", key_path, status));
    }
    Ok(KeyHandle(handle))
}

fn utf16_from_bytes(bytes: &[u8]) -> Vec<u16> {
    bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

fn decode_string(bytes: &[u8]) -> String {
    let units = utf16_from_bytes(bytes);
    let end = units.iter().position(|&u| u == 0).unwrap_or(units.len());
    String::from_utf16_lossy(&units[..end])
}

/// Items are NUL-terminated and the list ends with one more NUL
///
/// Empty items between other items are kept.
fn decode_multi_string(bytes: &[u8]) -> Vec<String> {
    let mut units = utf16_from_bytes(bytes);
    // List terminator, then the terminator of the last item
    for _ in 0..2 {
        if units.last() == Some(&0) {
            units.pop();
        }
    }
    if units.is_empty() {
        return Vec::new();
    }
    units
        .split(|&u| u == 0)
        .map(String::from_utf16_lossy)
        .collect()
}

fn encode_utf16_bytes(units: impl Iterator<Item = u16>) -> Vec<u8> {
    units.flat_map(|u| u.to_le_bytes()).collect()
}

fn encode_value(value: &RegistryValue) -> (REG_VALUE_TYPE, Vec<u8>) {
    match value {
        RegistryValue::String(s) => (REG_SZ, encode_utf16_bytes(wide(s).into_iter())),
        RegistryValue::ExpandString(s) => (REG_EXPAND_SZ, encode_utf16_bytes(wide(s).into_iter())),
        RegistryValue::MultiString(items) => {
            let mut units: Vec<u16> = Vec::new();
            for item in items {
                units.extend(OsStr::new(item).encode_wide());
                units.push(0);
            }
            units.push(0);
            (REG_MULTI_SZ, encode_utf16_bytes(units.into_iter()))
        }
        RegistryValue::Dword(n) => (REG_DWORD, n.to_le_bytes().to_vec()),
        RegistryValue::Qword(n) => (REG_QWORD, n.to_le_bytes().to_vec()),
        RegistryValue::Binary(bytes) => (REG_BINARY, bytes.clone()),
    }
}

impl RegistryStore for WindowsRegistry {
    fn read_value(&self, key_path: &str, value_name: &str) -> KeepsakeResult<RegistryValue> {
        let key = open_key(key_path)?;
        let name = wide(value_name);

        let mut value_type: REG_VALUE_TYPE = 0;
        let mut size: u32 = 0;
        let mut data: Vec<u8> = Vec::new();

        loop {
            let status = unsafe {
                // Safe because `data` has `size` writable bytes (or is null for the size query).
                RegQueryValueExW(
                    key.0,
                    name.as_ptr(),
                    ptr::null(),
                    &mut value_type,
                    if data.is_empty() {
                        ptr::null_mut()
                    } else {
                        data.as_mut_ptr()
                    },
                    &mut size,
                )
            };

            match status {
                ERROR_SUCCESS if data.is_empty() && size > 0 => data.resize(size as usize, 0),
                ERROR_SUCCESS => {
                    data.truncate(size as usize);
                    break;
                }
                ERROR_MORE_DATA => data.resize(size as usize, 0),
                ERROR_FILE_NOT_FOUND => {
                    return Err(KeepsakeError::Registry(format!(
                        "Value {}\\{} not found",
                        key_path, value_name
                    )))
                }
                code => return Err(win32_error("read", key_path, code)),
            }
        }

        let value = match value_type {
            REG_SZ => RegistryValue::String(decode_string(&data)),
            REG_EXPAND_SZ => RegistryValue::ExpandString(decode_string(&data)),
            REG_MULTI_SZ => RegistryValue::MultiString(decode_multi_string(&data)),
            REG_DWORD if data.len() >= 4 => {
                RegistryValue::Dword(u32::from_le_bytes([data[0], data[1], data[2], data[3]]))
            }
            REG_QWORD if data.len() >= 8 => {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(&data[..8]);
                RegistryValue::Qword(u64::from_le_bytes(buf))
            }
            REG_BINARY => RegistryValue::Binary(data),
            other => {
                return Err(KeepsakeError::Registry(format!(
                    "Value {}\\{} has unsupported type {}",
                    key_path, value_name, other
                )))
            }
        };

        Ok(value)
    }

    fn write_value(
        &self,
        key_path: &str,
        value_name: &str,
        value: &RegistryValue,
    ) -> KeepsakeResult<()> {
        let key = create_key(key_path)?;
        let name = wide(value_name);
        let (value_type, data) = encode_value(value);

        let status = unsafe {
            // Safe because `data` is a valid buffer of the given length.
            RegSetValueExW(
                key.0,
                name.as_ptr(),
                0,
                value_type,
                data.as_ptr(),
                data.len() as u32,
            )
        };
        if status != ERROR_SUCCESS {
            return Err(win32_error("write", key_path, status));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn multi(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_multi_string_round_trip() {
        for items in [
            multi(&["alpha", "beta"]),
            multi(&["alpha", "", "beta"]),
            multi(&["alpha", ""]),
            multi(&["only"]),
            Vec::new(),
        ] {
            let (kind, bytes) = encode_value(&RegistryValue::MultiString(items.clone()));
            assert_eq!(kind, REG_MULTI_SZ);
            assert_eq!(decode_multi_string(&bytes), items, "{items:?}");
        }
    }

    #[test]
    fn test_multi_string_without_terminators() {
        let bytes = encode_utf16_bytes("a\0b".encode_utf16());
        assert_eq!(decode_multi_string(&bytes), multi(&["a", "b"]));
    }
}
