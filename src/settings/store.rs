//! Provisioning Settings
//!
//! Ordered key/value bag with a per-entry encryption flag. Encrypted values
//! are stored as ciphertext and never appear in `Debug` output.

use crate::domain::ports::SecretCipher;
use crate::error::{Error, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Placeholder printed instead of an encrypted value
const MASK: &str = "********";

// =============================================================================
// Setting
// =============================================================================

/// A single settings entry
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Setting {
    /// Stored value (ciphertext when `encrypted`)
    pub value: String,
    /// Whether `value` is ciphertext
    #[serde(default)]
    pub encrypted: bool,
}

impl Setting {
    pub fn plain(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            encrypted: false,
        }
    }

    pub fn encrypted(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            encrypted: true,
        }
    }
}

impl fmt::Debug for Setting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.encrypted {
            write!(f, "{}", MASK)
        } else {
            write!(f, "{:?}", self.value)
        }
    }
}

// =============================================================================
// Provisioning Settings
// =============================================================================

/// Persisted state of one instance
///
/// Created by the host for each provisioning request, mutated by actions and
/// handed back to the host after every poll. Insertion order is preserved so
/// the host sees a stable layout.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProvisioningSettings {
    entries: IndexMap<String, Setting>,
}

impl ProvisioningSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a value (ciphertext for encrypted entries)
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(|s| s.value.as_str())
    }

    /// Get a non-blank value
    pub fn get_non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|v| !v.trim().is_empty())
    }

    /// Get a value that must be present and non-blank
    pub fn require(&self, key: &str) -> Result<&str> {
        self.get_non_empty(key).ok_or_else(|| Error::MissingSetting {
            key: key.to_string(),
        })
    }

    /// Parse an unsigned integer value; absent yields `None`
    pub fn get_u64(&self, key: &str) -> Result<Option<u64>> {
        match self.get_non_empty(key) {
            None => Ok(None),
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .map(Some)
                .map_err(|e| Error::InvalidSetting {
                    key: key.to_string(),
                    reason: e.to_string(),
                }),
        }
    }

    /// Interpret a value as a flag ("true", "yes", "1")
    pub fn get_bool(&self, key: &str) -> bool {
        matches!(
            self.get(key).map(|v| v.trim().to_ascii_lowercase()).as_deref(),
            Some("true") | Some("yes") | Some("1")
        )
    }

    /// Set a plain value, replacing any previous entry
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), Setting::plain(value));
    }

    /// Set an already encrypted value
    pub fn set_encrypted(&mut self, key: impl Into<String>, ciphertext: impl Into<String>) {
        self.entries.insert(key.into(), Setting::encrypted(ciphertext));
    }

    /// Encrypt a plaintext secret and store it
    pub fn store_secret(
        &mut self,
        key: impl Into<String>,
        plaintext: &str,
        cipher: &dyn SecretCipher,
    ) -> Result<()> {
        let ciphertext = cipher.encrypt(plaintext)?;
        self.set_encrypted(key, ciphertext);
        Ok(())
    }

    /// Read a secret in plaintext
    ///
    /// Entries not flagged as encrypted are returned as stored.
    pub fn reveal(&self, key: &str, cipher: &dyn SecretCipher) -> Result<Option<String>> {
        match self.entries.get(key) {
            None => Ok(None),
            Some(s) if s.encrypted => cipher.decrypt(&s.value).map(Some),
            Some(s) => Ok(Some(s.value.clone())),
        }
    }

    /// Encrypt every listed key that is still stored in plaintext
    pub fn seal(&mut self, keys: &[&str], cipher: &dyn SecretCipher) -> Result<()> {
        for key in keys {
            if let Some(entry) = self.entries.get_mut(*key) {
                if !entry.encrypted {
                    entry.value = cipher.encrypt(&entry.value)?;
                    entry.encrypted = true;
                }
            }
        }
        Ok(())
    }

    pub fn remove(&mut self, key: &str) -> Option<Setting> {
        self.entries.shift_remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn is_encrypted(&self, key: &str) -> bool {
        self.entries.get(key).map(|s| s.encrypted).unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Setting)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl fmt::Debug for ProvisioningSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.entries.iter()).finish()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ProvisioningSettings {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut settings = Self::new();
        for (k, v) in iter {
            settings.set(k, v);
        }
        settings
    }
}
