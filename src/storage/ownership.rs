// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ownership enforcement for member-owned records.
//!
//! Shares, pending payments and certificates belong to a club member. A user
//! may act on them when their token maps to that member, or when they are an
//! admin. Staff roles get read-only visibility through
//! [`OwnershipEnforcer::verify_read_access`].

use crate::auth::AuthenticatedUser;

use super::{StorageError, StorageResult};

/// Trait for resources owned by a club member.
pub trait OwnedResource {
    /// Member id of the owner.
    fn owner_member_id(&self) -> u64;

    /// Short label used in permission errors.
    fn resource_label(&self) -> String;
}

/// Trait for enforcing ownership on storage operations.
pub trait OwnershipEnforcer {
    /// Owner or admin.
    ///
    /// # Errors
    /// Returns `StorageError::PermissionDenied` otherwise.
    fn verify_ownership(&self, user: &AuthenticatedUser) -> StorageResult<()>;

    /// Owner, or any staff role that may inspect the ledger.
    fn verify_read_access(&self, user: &AuthenticatedUser) -> StorageResult<()>;
}

impl<T: OwnedResource> OwnershipEnforcer for T {
    fn verify_ownership(&self, user: &AuthenticatedUser) -> StorageResult<()> {
        if user.is_admin() || user.member_id == Some(self.owner_member_id()) {
            Ok(())
        } else {
            Err(denied(user, self))
        }
    }

    fn verify_read_access(&self, user: &AuthenticatedUser) -> StorageResult<()> {
        if user.role.can_view_ledger() || user.member_id == Some(self.owner_member_id()) {
            Ok(())
        } else {
            Err(denied(user, self))
        }
    }
}

fn denied<T: OwnedResource>(user: &AuthenticatedUser, resource: &T) -> StorageError {
    StorageError::PermissionDenied {
        user_id: user.user_id.clone(),
        resource: resource.resource_label(),
    }
}

/// Extension trait for checking ownership on lookups.
pub trait OwnershipCheck<T> {
    /// Verify ownership and return the resource if authorized.
    fn verify_owner(self, user: &AuthenticatedUser) -> StorageResult<T>;
}

impl<T: OwnedResource> OwnershipCheck<T> for Option<T> {
    fn verify_owner(self, user: &AuthenticatedUser) -> StorageResult<T> {
        match self {
            Some(resource) => {
                resource.verify_ownership(user)?;
                Ok(resource)
            }
            None => Err(StorageError::NotFound("resource".to_string())),
        }
    }
}
