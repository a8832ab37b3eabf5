// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Member directory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::super::{FileStorage, StorageError, StorageResult};

/// A club member ("socio").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Member {
    pub member_id: u64,
    pub full_name: String,
    /// National identity document number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Repository for member records.
pub struct MemberRepository<'a> {
    storage: &'a FileStorage,
}

impl<'a> MemberRepository<'a> {
    pub fn new(storage: &'a FileStorage) -> Self {
        Self { storage }
    }

    /// Get member by ID.
    pub fn get(&self, member_id: u64) -> StorageResult<Member> {
        self.find(member_id)?
            .ok_or_else(|| StorageError::NotFound(format!("Member {member_id}")))
    }

    pub fn find(&self, member_id: u64) -> StorageResult<Option<Member>> {
        self.storage
            .read_json_opt(self.storage.paths().member(member_id))
    }

    /// Insert or replace, preserving the original creation time.
    pub fn upsert(
        &self,
        member_id: u64,
        full_name: String,
        identity_number: Option<String>,
        contact_email: Option<String>,
    ) -> StorageResult<Member> {
        let now = Utc::now();
        let created_at = self
            .find(member_id)?
            .map(|existing| existing.created_at)
            .unwrap_or(now);

        let member = Member {
            member_id,
            full_name,
            identity_number,
            contact_email,
            created_at,
            updated_at: now,
        };
        self.storage
            .write_json(self.storage.paths().member(member_id), &member)?;
        Ok(member)
    }

    /// All members ordered by id.
    pub fn list(&self) -> StorageResult<Vec<Member>> {
        let mut members = Vec::new();
        for stem in self.storage.list_files(self.storage.paths().members_dir(), "json")? {
            let Ok(member_id) = stem.parse::<u64>() else {
                continue;
            };
            if let Some(member) = self.find(member_id)? {
                members.push(member);
            }
        }
        members.sort_by_key(|m| m.member_id);
        Ok(members)
    }
}
