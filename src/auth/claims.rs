// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JWT claims and authenticated user representation.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::roles::Role;

/// Claims carried by an identity-provider JWT.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenClaims {
    /// Subject (user ID)
    pub sub: String,

    /// Expiration timestamp
    #[serde(default)]
    pub exp: i64,

    /// Issuer
    #[serde(default)]
    pub iss: String,

    /// Session ID
    #[serde(default)]
    pub sid: Option<String>,

    /// Public metadata carrying role and member link
    #[serde(default, rename = "publicMetadata")]
    pub public_metadata: Option<PublicMetadata>,
}

/// Application metadata attached to the user at the identity provider.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct PublicMetadata {
    #[serde(default)]
    pub role: Option<String>,

    /// Club member id this account acts for. Accepts a number or numeric string.
    #[serde(default, deserialize_with = "deserialize_member_id")]
    pub member_id: Option<u64>,
}

fn deserialize_member_id<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Number(n)) => Ok(Some(n)),
        Some(Raw::Text(s)) => s
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

/// Authenticated user information extracted from JWT.
///
/// This is the primary type used throughout the application to represent
/// the authenticated user making a request.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuthenticatedUser {
    /// Canonical user ID (`sub` claim)
    pub user_id: String,

    /// User's role
    pub role: Role,

    /// Club member this user acts for, if linked
    #[serde(skip_serializing_if = "Option::is_none")]
    pub member_id: Option<u64>,

    /// Session ID (if available)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// Original issuer
    #[serde(skip)]
    pub issuer: String,

    /// Token expiration (Unix timestamp)
    #[serde(skip)]
    pub expires_at: i64,
}

impl AuthenticatedUser {
    /// Create from verified claims.
    pub fn from_claims(claims: TokenClaims) -> Self {
        let metadata = claims.public_metadata.unwrap_or_default();
        let role = metadata
            .role
            .as_deref()
            .and_then(Role::from_str)
            .unwrap_or_default();

        Self {
            user_id: claims.sub,
            role,
            member_id: metadata.member_id,
            session_id: claims.sid,
            issuer: claims.iss,
            expires_at: claims.exp,
        }
    }

    /// Check if the user has the required role.
    pub fn has_role(&self, required: Role) -> bool {
        self.role.has_privilege(required)
    }

    /// Check if this user is an admin.
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// True when the user may act for `member_id` (self or admin).
    pub fn acts_for(&self, member_id: u64) -> bool {
        self.is_admin() || self.member_id == Some(member_id)
    }
}
