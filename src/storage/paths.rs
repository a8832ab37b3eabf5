// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Path constants and utilities for the storage layout.

use std::path::{Path, PathBuf};

/// Base directory for all persistent storage.
pub const DATA_ROOT: &str = "/data";

/// Storage path utilities.
#[derive(Debug, Clone)]
pub struct StoragePaths {
    root: PathBuf,
}

impl Default for StoragePaths {
    fn default() -> Self {
        Self::new(DATA_ROOT)
    }
}

impl StoragePaths {
    /// Create a new StoragePaths with a custom root (useful for testing).
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Root directory for all data.
    pub fn root(&self) -> &Path {
        &self.root
    }

    // ========== Pending Payment Paths ==========

    /// Directory containing pending payment records.
    pub fn pending_dir(&self) -> PathBuf {
        self.root.join("pending")
    }

    /// Path to a pending payment record.
    ///
    /// `reference` must already be validated as a reference token.
    pub fn pending(&self, reference: &str) -> PathBuf {
        self.pending_dir().join(format!("{reference}.json"))
    }

    // ========== Certificate Paths ==========

    pub fn certificates_dir(&self) -> PathBuf {
        self.root.join("certificates")
    }

    /// Plaintext originals.
    pub fn certificate_originals_dir(&self) -> PathBuf {
        self.certificates_dir().join("originals")
    }

    pub fn certificate_original(&self, share_id: u64) -> PathBuf {
        self.certificate_originals_dir()
            .join(format!("certificate_{share_id}.pdf"))
    }

    /// Copies encrypted for a recipient.
    pub fn certificate_encrypted_dir(&self) -> PathBuf {
        self.certificates_dir().join("encrypted")
    }

    pub fn certificate_encrypted(&self, share_id: u64, recipient_id: u64) -> PathBuf {
        self.certificate_encrypted_dir()
            .join(format!("certificate_{share_id}_member_{recipient_id}.enc"))
    }

    // ========== Directory Paths ==========

    pub fn members_dir(&self) -> PathBuf {
        self.root.join("members")
    }

    pub fn member(&self, member_id: u64) -> PathBuf {
        self.members_dir().join(format!("{member_id}.json"))
    }

    pub fn plans_dir(&self) -> PathBuf {
        self.root.join("plans")
    }

    pub fn plan(&self, plan_id: u64) -> PathBuf {
        self.plans_dir().join(format!("{plan_id}.json"))
    }

    // ========== Ledger ==========

    /// redb database holding shares and payments.
    pub fn ledger_db(&self) -> PathBuf {
        self.root.join("ledger.redb")
    }

    // ========== Audit Log Paths ==========

    /// Directory containing audit logs.
    pub fn audit_dir(&self) -> PathBuf {
        self.root.join("audit")
    }

    /// Directory for a specific date's audit logs.
    pub fn audit_date_dir(&self, date: &str) -> PathBuf {
        self.audit_dir().join(date)
    }

    /// Path to a daily audit events file (JSONL format).
    pub fn audit_events_file(&self, date: &str) -> PathBuf {
        self.audit_date_dir(date).join("events.jsonl")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_paths_use_data_root() {
        let paths = StoragePaths::default();
        assert_eq!(paths.root(), Path::new("/data"));
    }

    #[test]
    fn custom_root_for_testing() {
        let paths = StoragePaths::new("/tmp/test-data");
        assert_eq!(
            paths.pending("abc"),
            PathBuf::from("/tmp/test-data/pending/abc.json")
        );
    }

    #[test]
    fn certificate_paths_embed_share_and_recipient() {
        let paths = StoragePaths::default();
        assert_eq!(
            paths.certificate_original(42),
            PathBuf::from("/data/certificates/originals/certificate_42.pdf")
        );
        assert_eq!(
            paths.certificate_encrypted(42, 7),
            PathBuf::from("/data/certificates/encrypted/certificate_42_member_7.enc")
        );
    }

    #[test]
    fn directory_paths_are_correct() {
        let paths = StoragePaths::default();
        assert_eq!(paths.member(3), PathBuf::from("/data/members/3.json"));
        assert_eq!(paths.plan(9), PathBuf::from("/data/plans/9.json"));
        assert_eq!(paths.ledger_db(), PathBuf::from("/data/ledger.redb"));
    }

    #[test]
    fn audit_paths_are_correct() {
        let paths = StoragePaths::default();
        assert_eq!(paths.audit_dir(), PathBuf::from("/data/audit"));
        assert_eq!(
            paths.audit_events_file("2026-01-15"),
            PathBuf::from("/data/audit/2026-01-15/events.jsonl")
        );
    }
}
