// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User roles for authorization.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// User roles for authorization.
///
/// ## Role Hierarchy
///
/// - `Admin` - Full access, including certificate plaintext for any share
/// - `Treasurer` - Confirms manual payments and records installments
/// - `Member` - Buys shares and accesses their own certificates
/// - `Auditor` - Read-only access to the ledger and audit logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Full administrative access
    Admin,
    /// Treasury staff
    Treasurer,
    /// Club member (least privilege)
    #[default]
    Member,
    /// Read-only oversight
    Auditor,
}

impl Role {
    /// Check if this role has at least the privileges of the required role.
    pub fn has_privilege(&self, required: Role) -> bool {
        match (self, required) {
            (Role::Admin, _) => true,
            (Role::Treasurer, Role::Treasurer) => true,
            (Role::Member, Role::Member) => true,
            (Role::Auditor, Role::Auditor) => true,
            _ => false,
        }
    }

    /// Admins and treasurers.
    pub fn is_treasury_staff(&self) -> bool {
        matches!(self, Role::Admin | Role::Treasurer)
    }

    /// Roles allowed to inspect any share and its payments.
    pub fn can_view_ledger(&self) -> bool {
        matches!(self, Role::Admin | Role::Treasurer | Role::Auditor)
    }

    /// Parse role from string (case-insensitive).
    /// Used when extracting roles from token public metadata.
    pub fn from_str(s: &str) -> Option<Role> {
        match s.to_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "treasurer" | "tesorero" => Some(Role::Treasurer),
            "member" | "socio" => Some(Role::Member),
            "auditor" => Some(Role::Auditor),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Role::Admin => "admin",
            Role::Treasurer => "treasurer",
            Role::Member => "member",
            Role::Auditor => "auditor",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_has_all_privileges() {
        assert!(Role::Admin.has_privilege(Role::Admin));
        assert!(Role::Admin.has_privilege(Role::Treasurer));
        assert!(Role::Admin.has_privilege(Role::Member));
        assert!(Role::Admin.has_privilege(Role::Auditor));
    }

    #[test]
    fn member_only_has_member_privilege() {
        assert!(!Role::Member.has_privilege(Role::Admin));
        assert!(Role::Member.has_privilege(Role::Member));
        assert!(!Role::Member.has_privilege(Role::Treasurer));
    }

    #[test]
    fn staff_groupings() {
        assert!(Role::Treasurer.is_treasury_staff());
        assert!(!Role::Auditor.is_treasury_staff());
        assert!(Role::Auditor.can_view_ledger());
        assert!(!Role::Member.can_view_ledger());
    }

    #[test]
    fn from_str_parses_correctly() {
        assert_eq!(Role::from_str("admin"), Some(Role::Admin));
        assert_eq!(Role::from_str("TREASURER"), Some(Role::Treasurer));
        assert_eq!(Role::from_str("socio"), Some(Role::Member));
        assert_eq!(Role::from_str("unknown"), None);
    }

    #[test]
    fn default_role_is_member() {
        assert_eq!(Role::default(), Role::Member);
    }
}
