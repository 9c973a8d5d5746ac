//! Secret store interface.
//!
//! The crypto itself (AES-GCM session key, RSA-wrapped account
//! credentials, 24-hour rotation with pre-rotation backups) belongs to
//! the store implementation; this module only defines the keyed
//! `get`/`set`/`delete` surface the client calls and a keyring-backed
//! implementation of it. In-memory erasure of secret material on close
//! is best-effort on any platform.

use chrono::{DateTime, Utc};
use keyring::Entry;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Keyring service name.
const SERVICE_NAME: &str = "openmail";

/// Error type for secret store operations.
#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    /// Platform keyring failure.
    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    /// Stored value could not be decoded.
    #[error("Malformed stored value: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Result alias for secret store operations.
pub type SecretResult<T> = std::result::Result<T, SecretError>;

/// Enumerated keys the store accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecretKey {
    /// AES-GCM session key (rotated daily by the store).
    AesGcmCipherKey,
    /// Backup of the previous session key.
    AesGcmCipherKeyBackup,
    /// RSA public key, PEM.
    PublicPem,
    /// Backup of the previous public key.
    PublicPemBackup,
    /// RSA private key, PEM.
    PrivatePem,
    /// Backup of the previous private key.
    PrivatePemBackup,
    /// RSA-wrapped account credentials.
    Accounts,
    /// Backup of the previous account blob.
    AccountsBackup,
}

impl SecretKey {
    /// Stable identifier used as the keyring entry name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AesGcmCipherKey => "aesgcm_cipher_key",
            Self::AesGcmCipherKeyBackup => "aesgcm_cipher_key_backup",
            Self::PublicPem => "public_pem",
            Self::PublicPemBackup => "public_pem_backup",
            Self::PrivatePem => "private_pem",
            Self::PrivatePemBackup => "private_pem_backup",
            Self::Accounts => "accounts",
            Self::AccountsBackup => "accounts_backup",
        }
    }
}

/// Kind tag carried with each stored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretKind {
    /// Symmetric key material.
    AesGcmCipherKey,
    /// PEM key material.
    Pem,
    /// RSA-encrypted payload.
    RsaEncryptedKey,
    /// Anything else.
    Plain,
}

/// A stored secret with its bookkeeping fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretRecord {
    /// The secret value.
    pub value: String,
    /// What the value is.
    pub kind: SecretKind,
    /// When the record was first written.
    pub created_at: DateTime<Utc>,
    /// When the record was last overwritten.
    pub last_updated_at: DateTime<Utc>,
}

impl SecretRecord {
    /// Creates a fresh record stamped now.
    #[must_use]
    pub fn new(value: impl Into<String>, kind: SecretKind) -> Self {
        let now = Utc::now();
        Self {
            value: value.into(),
            kind,
            created_at: now,
            last_updated_at: now,
        }
    }
}

/// Keyed secret storage. Rotation and envelope encryption are the
/// implementation's concern; callers only get, set and delete.
pub trait SecretStore {
    /// Reads a record, `None` when absent.
    ///
    /// # Errors
    ///
    /// Returns an error on backend failure.
    fn get(&self, key: SecretKey) -> SecretResult<Option<SecretRecord>>;

    /// Writes a record, preserving `created_at` of an existing one.
    ///
    /// # Errors
    ///
    /// Returns an error on backend failure.
    fn set(&self, key: SecretKey, value: &str, kind: SecretKind) -> SecretResult<()>;

    /// Deletes a record; deleting a missing record is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error on backend failure.
    fn delete(&self, key: SecretKey) -> SecretResult<()>;

    /// Releases backend handles. Erasure of copies the platform made
    /// is best-effort.
    fn close(&mut self) {}
}

/// Secret store backed by the platform keyring.
///
/// Linux: Secret Service (GNOME Keyring, KWallet). macOS: Keychain.
/// Windows: Credential Manager.
#[derive(Debug, Default)]
pub struct KeyringSecretStore;

impl KeyringSecretStore {
    /// Creates the store.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn entry(key: SecretKey) -> SecretResult<Entry> {
        Ok(Entry::new(SERVICE_NAME, key.as_str())?)
    }
}

impl SecretStore for KeyringSecretStore {
    fn get(&self, key: SecretKey) -> SecretResult<Option<SecretRecord>> {
        match Self::entry(key)?.get_password() {
            Ok(json) => Ok(Some(serde_json::from_str(&json)?)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: SecretKey, value: &str, kind: SecretKind) -> SecretResult<()> {
        let record = match self.get(key)? {
            Some(existing) => SecretRecord {
                value: value.to_string(),
                kind,
                created_at: existing.created_at,
                last_updated_at: Utc::now(),
            },
            None => SecretRecord::new(value, kind),
        };

        Self::entry(key)?.set_password(&serde_json::to_string(&record)?)?;
        debug!(key = key.as_str(), "Stored secret");
        Ok(())
    }

    fn delete(&self, key: SecretKey) -> SecretResult<()> {
        match Self::entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// In-memory store for exercising the trait surface.
    #[derive(Default)]
    struct MemoryStore {
        records: RefCell<HashMap<SecretKey, SecretRecord>>,
    }

    impl SecretStore for MemoryStore {
        fn get(&self, key: SecretKey) -> SecretResult<Option<SecretRecord>> {
            Ok(self.records.borrow().get(&key).cloned())
        }

        fn set(&self, key: SecretKey, value: &str, kind: SecretKind) -> SecretResult<()> {
            let mut records = self.records.borrow_mut();
            let record = match records.get(&key) {
                Some(existing) => SecretRecord {
                    value: value.to_string(),
                    kind,
                    created_at: existing.created_at,
                    last_updated_at: Utc::now(),
                },
                None => SecretRecord::new(value, kind),
            };
            records.insert(key, record);
            Ok(())
        }

        fn delete(&self, key: SecretKey) -> SecretResult<()> {
            self.records.borrow_mut().remove(&key);
            Ok(())
        }
    }

    #[test]
    fn key_identifiers_are_stable() {
        assert_eq!(SecretKey::AesGcmCipherKey.as_str(), "aesgcm_cipher_key");
        assert_eq!(SecretKey::Accounts.as_str(), "accounts");
        assert_eq!(SecretKey::AccountsBackup.as_str(), "accounts_backup");
        assert_eq!(SecretKey::PrivatePemBackup.as_str(), "private_pem_backup");
    }

    #[test]
    fn set_get_delete_round_trip() {
        let store = MemoryStore::default();
        store
            .set(SecretKey::Accounts, "blob", SecretKind::RsaEncryptedKey)
            .unwrap();

        let record = store.get(SecretKey::Accounts).unwrap().unwrap();
        assert_eq!(record.value, "blob");
        assert_eq!(record.kind, SecretKind::RsaEncryptedKey);

        store.delete(SecretKey::Accounts).unwrap();
        assert!(store.get(SecretKey::Accounts).unwrap().is_none());
    }

    #[test]
    fn overwrite_preserves_created_at() {
        let store = MemoryStore::default();
        store
            .set(SecretKey::PublicPem, "v1", SecretKind::Pem)
            .unwrap();
        let created = store.get(SecretKey::PublicPem).unwrap().unwrap().created_at;

        store
            .set(SecretKey::PublicPem, "v2", SecretKind::Pem)
            .unwrap();
        let record = store.get(SecretKey::PublicPem).unwrap().unwrap();
        assert_eq!(record.value, "v2");
        assert_eq!(record.created_at, created);
    }

    #[test]
    fn delete_missing_is_ok() {
        let store = MemoryStore::default();
        assert!(store.delete(SecretKey::PrivatePem).is_ok());
    }

    #[test]
    fn record_serialises_with_kind_tag() {
        let record = SecretRecord::new("x", SecretKind::RsaEncryptedKey);
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("rsa_encrypted_key"));
    }
}
