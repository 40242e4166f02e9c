//! Case-insensitive key/value store flushed to a native settings object.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tether_native::{NativeApi, Owned, SettingsHandle};
use tracing::debug;

use crate::error::{SettingsError, SettingsResult};
use crate::listen::ListenInterface;

/// Key under which listen interfaces are stored.
pub const LISTEN_INTERFACES_KEY: &str = "listen_interfaces";

/// Type tag of a [`SettingValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// 32-bit signed integer.
    Int,
    /// Boolean flag.
    Bool,
    /// UTF-8 string.
    Str,
}

impl ValueKind {
    /// Lower-case label used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::Bool => "bool",
            Self::Str => "str",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single staged setting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingValue {
    /// Integer setting.
    Int(i32),
    /// Boolean setting.
    Bool(bool),
    /// String setting.
    Str(String),
}

impl SettingValue {
    /// Type tag of the value.
    #[must_use]
    pub const fn kind(&self) -> ValueKind {
        match self {
            Self::Int(_) => ValueKind::Int,
            Self::Bool(_) => ValueKind::Bool,
            Self::Str(_) => ValueKind::Str,
        }
    }
}

impl From<i32> for SettingValue {
    fn from(value: i32) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for SettingValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<String> for SettingValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<&str> for SettingValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

/// Types that can be read back out of a [`SettingsPack`].
pub trait FromSettingValue: Sized {
    /// Type tag this reader accepts.
    const KIND: ValueKind;

    /// Extract the value when the stored type matches.
    fn from_setting(value: &SettingValue) -> Option<Self>;
}

impl FromSettingValue for i32 {
    const KIND: ValueKind = ValueKind::Int;

    fn from_setting(value: &SettingValue) -> Option<Self> {
        match value {
            SettingValue::Int(value) => Some(*value),
            _ => None,
        }
    }
}

impl FromSettingValue for bool {
    const KIND: ValueKind = ValueKind::Bool;

    fn from_setting(value: &SettingValue) -> Option<Self> {
        match value {
            SettingValue::Bool(value) => Some(*value),
            _ => None,
        }
    }
}

impl FromSettingValue for String {
    const KIND: ValueKind = ValueKind::Str;

    fn from_setting(value: &SettingValue) -> Option<Self> {
        match value {
            SettingValue::Str(value) => Some(value.clone()),
            _ => None,
        }
    }
}

/// Engine settings staged on the Rust side.
///
/// Keys compare case-insensitively and the last write wins. Which keys exist
/// and what type each expects is only checked by the engine, in [`SettingsPack::build`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsPack {
    entries: BTreeMap<String, SettingValue>,
}

fn normalise(key: &str) -> String {
    key.to_ascii_lowercase()
}

impl SettingsPack {
    /// Empty pack.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store or overwrite `key`.
    pub fn set(&mut self, key: &str, value: impl Into<SettingValue>) -> &mut Self {
        self.entries.insert(normalise(key), value.into());
        self
    }

    /// Read a string setting.
    ///
    /// # Errors
    /// Returns [`SettingsError::TypeMismatch`] when `key` holds another type.
    pub fn get_str(&self, key: &str) -> SettingsResult<Option<&str>> {
        let key = normalise(key);
        match self.entries.get(&key) {
            None => Ok(None),
            Some(SettingValue::Str(value)) => Ok(Some(value.as_str())),
            Some(other) => Err(SettingsError::TypeMismatch {
                key,
                expected: ValueKind::Str,
                found: other.kind(),
            }),
        }
    }

    /// Read a typed setting.
    ///
    /// # Errors
    /// Returns [`SettingsError::TypeMismatch`] when `key` holds another type.
    pub fn get<T: FromSettingValue>(&self, key: &str) -> SettingsResult<Option<T>> {
        let key = normalise(key);
        let Some(value) = self.entries.get(&key) else {
            return Ok(None);
        };
        T::from_setting(value)
            .map(Some)
            .ok_or_else(|| SettingsError::TypeMismatch {
                key,
                expected: T::KIND,
                found: value.kind(),
            })
    }

    /// Raw stored value.
    #[must_use]
    pub fn value(&self, key: &str) -> Option<&SettingValue> {
        self.entries.get(&normalise(key))
    }

    /// Remove `key`, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<SettingValue> {
        self.entries.remove(&normalise(key))
    }

    /// Number of staged keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is staged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Staged entries in key order; keys are lower-case.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SettingValue)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    /// Copy every entry of `other` over this pack.
    pub fn merge(&mut self, other: &Self) -> &mut Self {
        self.entries
            .extend(other.entries.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// Render `interfaces` into the `listen_interfaces` key.
    ///
    /// An empty iterator leaves the pack untouched.
    pub fn use_listen_interfaces<I>(&mut self, interfaces: I) -> &mut Self
    where
        I: IntoIterator<Item = ListenInterface>,
    {
        let rendered: Vec<String> = interfaces.into_iter().map(|i| i.to_string()).collect();
        if !rendered.is_empty() {
            self.set(LISTEN_INTERFACES_KEY, rendered.join(","));
        }
        self
    }

    /// Create a native settings object holding every staged entry.
    ///
    /// # Errors
    /// Returns [`SettingsError::PackUnavailable`] when the native object cannot
    /// be allocated, or [`SettingsError::Rejected`] for the first key the engine
    /// refuses. On error no native object is left alive.
    pub fn build(&self, api: &Arc<dyn NativeApi>) -> SettingsResult<Owned<SettingsHandle>> {
        let handle = api
            .create_settings_pack()
            .ok_or(SettingsError::PackUnavailable)?;
        let owned = Owned::new(Arc::clone(api), handle);

        for (key, value) in &self.entries {
            let accepted = match value {
                SettingValue::Int(value) => api.settings_set_int(handle, key, *value),
                SettingValue::Bool(value) => api.settings_set_bool(handle, key, *value),
                SettingValue::Str(value) => api.settings_set_str(handle, key, value),
            };
            if !accepted {
                debug!(key = %key, kind = %value.kind(), "native settings rejected key");
                owned.release();
                return Err(SettingsError::Rejected {
                    key: key.clone(),
                    kind: value.kind(),
                });
            }
        }

        Ok(owned)
    }
}

impl<K: AsRef<str>, V: Into<SettingValue>> FromIterator<(K, V)> for SettingsPack {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut pack = Self::new();
        for (key, value) in iter {
            pack.set(key.as_ref(), value);
        }
        pack
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_case_insensitive_and_last_write_wins() {
        let mut pack = SettingsPack::new();
        pack.set("User_Agent", "first").set("user_agent", "second");

        assert_eq!(pack.len(), 1);
        assert_eq!(pack.get_str("USER_AGENT"), Ok(Some("second")));
    }

    #[test]
    fn typed_reads_round_trip() {
        let mut pack = SettingsPack::new();
        pack.set("connections_limit", 50)
            .set("enable_dht", false)
            .set("user_agent", String::from("tether"));

        assert_eq!(pack.get::<i32>("connections_limit"), Ok(Some(50)));
        assert_eq!(pack.get::<bool>("enable_dht"), Ok(Some(false)));
        assert_eq!(pack.get::<String>("user_agent"), Ok(Some("tether".to_owned())));
        assert_eq!(pack.get::<i32>("missing"), Ok(None));
        assert_eq!(pack.get_str("missing"), Ok(None));
    }

    #[test]
    fn cross_type_reads_fail() {
        let mut pack = SettingsPack::new();
        pack.set("connections_limit", 50).set("user_agent", "tether");

        assert_eq!(
            pack.get::<bool>("connections_limit"),
            Err(SettingsError::TypeMismatch {
                key: "connections_limit".into(),
                expected: ValueKind::Bool,
                found: ValueKind::Int,
            })
        );
        assert!(matches!(
            pack.get_str("connections_limit"),
            Err(SettingsError::TypeMismatch { .. })
        ));
        assert!(matches!(
            pack.get::<i32>("user_agent"),
            Err(SettingsError::TypeMismatch { found: ValueKind::Str, .. })
        ));
    }

    #[test]
    fn remove_and_iterate() {
        let mut pack: SettingsPack = [("B", 2), ("a", 1)].into_iter().collect();
        let keys: Vec<&str> = pack.iter().map(|(key, _)| key).collect();
        assert_eq!(keys, ["a", "b"]);

        assert_eq!(pack.remove("A"), Some(SettingValue::Int(1)));
        assert_eq!(pack.len(), 1);
        assert!(!pack.is_empty());
    }
}
