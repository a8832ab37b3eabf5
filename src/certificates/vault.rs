// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Encrypted document store for certificates.
//!
//! Each certificate is kept twice: the plaintext original under
//! `certificates/originals/` and a copy encrypted for its recipient under
//! `certificates/encrypted/`.
//!
//! ## Key Derivation
//!
//! `key = PBKDF2-HMAC-SHA256(recipient identity, configured salt, iterations)`
//!
//! The salt is shared by all recipients and comes from configuration. Only
//! someone who can present the same recipient identity re-derives the key.
//!
//! ## File Format
//!
//! ```text
//! [version: 1 byte][nonce: 12 bytes][AES-256-GCM ciphertext + 16-byte tag]
//! ```

use std::num::NonZeroU32;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};
use serde::Serialize;
use utoipa::ToSchema;

use crate::config::MIN_KDF_ITERATIONS;
use crate::storage::{FileStorage, StorageError};

const FORMAT_VERSION: u8 = 1;
const KEY_LEN: usize = 32;
const HEADER_LEN: usize = 1 + NONCE_LEN;

#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Wrong key, tampered file or unknown format.
    #[error("certificate could not be decrypted")]
    Decryption,

    #[error("encryption failed: {0}")]
    Crypto(String),

    #[error("invalid vault configuration: {0}")]
    InvalidConfig(String),
}

pub type VaultResult<T> = Result<T, VaultError>;

/// Locations of one issued certificate.
///
/// The recipient is named by member id; the identity the key is derived
/// from is never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct CertificateArtifact {
    pub plaintext_path: String,
    pub encrypted_path: String,
    pub recipient_id: u64,
    pub created_at: DateTime<Utc>,
}

/// Plaintext and encrypted certificate storage.
#[derive(Clone)]
pub struct EncryptedDocumentStore {
    storage: FileStorage,
    salt: Vec<u8>,
    iterations: NonZeroU32,
    rng: SystemRandom,
}

impl std::fmt::Debug for EncryptedDocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedDocumentStore")
            .field("iterations", &self.iterations)
            .finish_non_exhaustive()
    }
}

impl EncryptedDocumentStore {
    /// Create a store. `iterations` below the production floor is rejected.
    pub fn new(storage: FileStorage, salt: &str, iterations: u32) -> VaultResult<Self> {
        if iterations < MIN_KDF_ITERATIONS {
            return Err(VaultError::InvalidConfig(format!(
                "at least {MIN_KDF_ITERATIONS} PBKDF2 iterations required"
            )));
        }
        Self::build(storage, salt, iterations)
    }

    /// Store with a reduced iteration count so tests stay fast.
    #[cfg(test)]
    pub(crate) fn for_tests(storage: FileStorage, salt: &str) -> Self {
        match Self::build(storage, salt, 1_000) {
            Ok(store) => store,
            Err(e) => panic!("test vault: {e}"),
        }
    }

    fn build(storage: FileStorage, salt: &str, iterations: u32) -> VaultResult<Self> {
        if salt.trim().is_empty() {
            return Err(VaultError::InvalidConfig("salt must not be empty".to_string()));
        }
        let iterations = NonZeroU32::new(iterations)
            .ok_or_else(|| VaultError::InvalidConfig("iterations must be positive".to_string()))?;
        Ok(Self {
            storage,
            salt: salt.as_bytes().to_vec(),
            iterations,
            rng: SystemRandom::new(),
        })
    }

    /// Write the plaintext original for a share.
    pub fn store(&self, share_id: u64, document: &[u8]) -> VaultResult<PathBuf> {
        let path = self.storage.paths().certificate_original(share_id);
        self.storage.write_raw(&path, document)?;
        Ok(path)
    }

    /// Encrypt a stored original for one recipient.
    ///
    /// The output file name embeds the share id and the recipient id.
    pub fn encrypt_for(
        &self,
        share_id: u64,
        plaintext_path: &Path,
        recipient_id: u64,
        recipient_identity: &str,
    ) -> VaultResult<PathBuf> {
        let plaintext = self.storage.read_raw(plaintext_path)?;
        let sealed = self.seal(&plaintext, recipient_identity)?;

        let path = self
            .storage
            .paths()
            .certificate_encrypted(share_id, recipient_id);
        self.storage.write_raw(&path, &sealed)?;
        Ok(path)
    }

    /// Store a rendered certificate and its copy encrypted for the recipient.
    pub fn issue(
        &self,
        share_id: u64,
        document: &[u8],
        recipient_id: u64,
        recipient_identity: &str,
        now: DateTime<Utc>,
    ) -> VaultResult<CertificateArtifact> {
        let original = self.store(share_id, document)?;
        let encrypted = self.encrypt_for(share_id, &original, recipient_id, recipient_identity)?;
        Ok(CertificateArtifact {
            plaintext_path: original.to_string_lossy().into_owned(),
            encrypted_path: encrypted.to_string_lossy().into_owned(),
            recipient_id,
            created_at: now,
        })
    }

    /// Decrypt an encrypted copy with a candidate recipient identity.
    ///
    /// Fails with [`VaultError::Decryption`] on a wrong identity or a
    /// damaged file; never returns partial output.
    pub fn decrypt_for(&self, encrypted_path: &Path, recipient_identity: &str) -> VaultResult<Vec<u8>> {
        let sealed = self.storage.read_raw(encrypted_path)?;
        self.open(sealed, recipient_identity)
    }

    /// Read any stored certificate file as is.
    pub fn read(&self, path: &Path) -> VaultResult<Vec<u8>> {
        Ok(self.storage.read_raw(path)?)
    }

    /// Delete originals and encrypted copies last modified before `now - older_than`.
    pub fn cleanup(&self, older_than: Duration, now: DateTime<Utc>) -> VaultResult<usize> {
        let cutoff = now - older_than;
        let paths = self.storage.paths();
        let mut removed = 0;

        for (dir, extension) in [
            (paths.certificate_originals_dir(), "pdf"),
            (paths.certificate_encrypted_dir(), "enc"),
        ] {
            for entry in self.storage.list_entries(&dir, extension)? {
                if DateTime::<Utc>::from(entry.modified) < cutoff
                    && self.storage.delete_if_exists(&entry.path)?
                {
                    removed += 1;
                }
            }
        }

        Ok(removed)
    }

    fn seal(&self, plaintext: &[u8], recipient_identity: &str) -> VaultResult<Vec<u8>> {
        let key = self.derive_key(recipient_identity)?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| VaultError::Crypto("secure random unavailable".to_string()))?;

        let mut in_out = plaintext.to_vec();
        key.seal_in_place_append_tag(
            Nonce::assume_unique_for_key(nonce_bytes),
            Aad::from([FORMAT_VERSION]),
            &mut in_out,
        )
        .map_err(|_| VaultError::Crypto("AES-GCM seal failed".to_string()))?;

        let mut out = Vec::with_capacity(HEADER_LEN + in_out.len());
        out.push(FORMAT_VERSION);
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&in_out);
        Ok(out)
    }

    fn open(&self, sealed: Vec<u8>, recipient_identity: &str) -> VaultResult<Vec<u8>> {
        if sealed.len() < HEADER_LEN + AES_256_GCM.tag_len() || sealed[0] != FORMAT_VERSION {
            return Err(VaultError::Decryption);
        }

        let mut nonce_bytes = [0u8; NONCE_LEN];
        nonce_bytes.copy_from_slice(&sealed[1..HEADER_LEN]);
        let mut in_out = sealed[HEADER_LEN..].to_vec();

        let key = self.derive_key(recipient_identity)?;
        let plaintext_len = key
            .open_in_place(
                Nonce::assume_unique_for_key(nonce_bytes),
                Aad::from([FORMAT_VERSION]),
                &mut in_out,
            )
            .map_err(|_| VaultError::Decryption)?
            .len();
        in_out.truncate(plaintext_len);
        Ok(in_out)
    }

    fn derive_key(&self, recipient_identity: &str) -> VaultResult<LessSafeKey> {
        let mut key_bytes = [0u8; KEY_LEN];
        pbkdf2::derive(
            pbkdf2::PBKDF2_HMAC_SHA256,
            self.iterations,
            &self.salt,
            recipient_identity.trim().as_bytes(),
            &mut key_bytes,
        );
        let unbound = UnboundKey::new(&AES_256_GCM, &key_bytes)
            .map_err(|_| VaultError::Crypto("invalid AES-256 key".to_string()))?;
        Ok(LessSafeKey::new(unbound))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StoragePaths;
    use tempfile::TempDir;

    fn setup() -> (TempDir, EncryptedDocumentStore) {
        let temp = TempDir::new().unwrap();
        let mut storage = FileStorage::new(StoragePaths::new(temp.path()));
        storage.initialize().unwrap();
        (temp, EncryptedDocumentStore::for_tests(storage, "club-salt"))
    }

    #[test]
    fn round_trip_for_recipient() {
        let (_temp, vault) = setup();
        let original = vault.store(1, b"%PDF-1.4 certificate").unwrap();
        assert!(original.ends_with("certificates/originals/certificate_1.pdf"));

        let encrypted = vault.encrypt_for(1, &original, 7, "0912345678").unwrap();
        assert!(encrypted.ends_with("certificates/encrypted/certificate_1_member_7.enc"));

        let sealed = vault.read(&encrypted).unwrap();
        assert_ne!(&sealed[HEADER_LEN..], b"%PDF-1.4 certificate");

        let opened = vault.decrypt_for(&encrypted, "0912345678").unwrap();
        assert_eq!(opened, b"%PDF-1.4 certificate");
    }

    #[test]
    fn issue_reports_both_copies() {
        let (_temp, vault) = setup();
        let now = Utc::now();
        let artifact = vault
            .issue(4, b"%PDF-1.4 certificate", 7, "0912345678", now)
            .unwrap();

        assert_eq!(artifact.recipient_id, 7);
        assert_eq!(artifact.created_at, now);
        assert!(artifact.plaintext_path.ends_with("certificate_4.pdf"));
        assert!(artifact.encrypted_path.ends_with("certificate_4_member_7.enc"));

        let opened = vault
            .decrypt_for(Path::new(&artifact.encrypted_path), "0912345678")
            .unwrap();
        assert_eq!(opened, b"%PDF-1.4 certificate");
    }

    #[test]
    fn wrong_recipient_fails() {
        let (_temp, vault) = setup();
        let original = vault.store(1, b"secret").unwrap();
        let encrypted = vault.encrypt_for(1, &original, 7, "0912345678").unwrap();

        assert!(matches!(
            vault.decrypt_for(&encrypted, "0999999999"),
            Err(VaultError::Decryption)
        ));
    }

    #[test]
    fn different_salt_fails() {
        let (temp, vault) = setup();
        let original = vault.store(1, b"secret").unwrap();
        let encrypted = vault.encrypt_for(1, &original, 7, "id").unwrap();

        let mut storage = FileStorage::new(StoragePaths::new(temp.path()));
        storage.initialize().unwrap();
        let other = EncryptedDocumentStore::for_tests(storage, "other-salt");
        assert!(matches!(
            other.decrypt_for(&encrypted, "id"),
            Err(VaultError::Decryption)
        ));
    }

    #[test]
    fn tampered_file_fails() {
        let (temp, vault) = setup();
        let original = vault.store(1, b"secret").unwrap();
        let encrypted = vault.encrypt_for(1, &original, 7, "id").unwrap();

        let mut bytes = std::fs::read(&encrypted).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        std::fs::write(&encrypted, &bytes).unwrap();
        assert!(matches!(vault.decrypt_for(&encrypted, "id"), Err(VaultError::Decryption)));

        let short = temp.path().join("short.enc");
        std::fs::write(&short, [FORMAT_VERSION, 0, 0]).unwrap();
        assert!(matches!(vault.decrypt_for(&short, "id"), Err(VaultError::Decryption)));
    }

    #[test]
    fn rejects_weak_configuration() {
        let temp = TempDir::new().unwrap();
        let storage = FileStorage::new(StoragePaths::new(temp.path()));
        assert!(matches!(
            EncryptedDocumentStore::new(storage.clone(), "salt", 1_000),
            Err(VaultError::InvalidConfig(_))
        ));
        assert!(matches!(
            EncryptedDocumentStore::new(storage, "  ", MIN_KDF_ITERATIONS),
            Err(VaultError::InvalidConfig(_))
        ));
    }

    #[test]
    fn cleanup_removes_old_files_only() {
        let (_temp, vault) = setup();
        let original = vault.store(1, b"doc").unwrap();
        vault.encrypt_for(1, &original, 7, "id").unwrap();

        let now = Utc::now();
        assert_eq!(vault.cleanup(Duration::days(30), now).unwrap(), 0);
        assert_eq!(
            vault.cleanup(Duration::days(30), now + Duration::days(31)).unwrap(),
            2
        );
        assert!(!original.exists());
    }
}
