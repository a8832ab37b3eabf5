// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractors for authenticated users.
//!
//! ```rust,ignore
//! async fn my_handler(Auth(user): Auth) -> impl IntoResponse {
//!     // user is AuthenticatedUser
//! }
//! ```

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use jsonwebtoken::{decode, decode_header, errors::ErrorKind, Validation};

use super::{claims::TokenClaims, AuthError, AuthenticatedUser, JwksManager};
use crate::state::{AppState, AuthConfig};

/// Clock skew tolerance (60 seconds).
const CLOCK_SKEW_LEEWAY: u64 = 60;

/// Extractor for authenticated users.
///
/// ## Authentication Modes
///
/// - **Production** (`AUTH_JWKS_URL` set): signature, expiry, issuer and
///   audience verified against the JWKS.
/// - **Development** (no JWKS, built with the `dev` feature or under test):
///   claims decoded without signature verification.
///
/// Without a JWKS outside development builds every request is rejected.
pub struct Auth(pub AuthenticatedUser);

impl FromRequestParts<AppState> for Auth {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthenticatedUser>().cloned() {
            return Ok(Auth(user));
        }

        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or(AuthError::MissingAuthHeader)?
            .to_str()
            .map_err(|_| AuthError::InvalidAuthHeader)?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or(AuthError::InvalidAuthHeader)?;

        let user = verify_jwt(token, &state.auth_config).await?;
        parts.extensions.insert(user.clone());

        Ok(Auth(user))
    }
}

async fn verify_jwt(token: &str, auth_config: &AuthConfig) -> Result<AuthenticatedUser, AuthError> {
    match auth_config.jwks {
        Some(ref jwks) => verify_jwt_production(token, jwks, auth_config).await,
        None => verify_jwt_development(token),
    }
}

async fn verify_jwt_production(
    token: &str,
    jwks: &JwksManager,
    auth_config: &AuthConfig,
) -> Result<AuthenticatedUser, AuthError> {
    let header = decode_header(token).map_err(|_| AuthError::MalformedToken)?;

    let (decoding_key, algorithm) = match &header.kid {
        Some(kid) => jwks.get_decoding_key(kid).await?,
        None => jwks.get_any_decoding_key().await?,
    };

    let mut validation = Validation::new(algorithm);
    validation.leeway = CLOCK_SKEW_LEEWAY;

    if let Some(ref issuer) = auth_config.issuer {
        validation.set_issuer(&[issuer]);
    }

    match auth_config.audience {
        Some(ref audience) => validation.set_audience(&[audience]),
        None => validation.validate_aud = false,
    }

    let token_data = decode::<TokenClaims>(token, &decoding_key, &validation).map_err(|e| {
        match e.kind() {
            ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            ErrorKind::InvalidSignature => AuthError::InvalidSignature,
            ErrorKind::InvalidIssuer => AuthError::InvalidIssuer,
            ErrorKind::InvalidAudience => AuthError::InvalidAudience,
            ErrorKind::ImmatureSignature => AuthError::TokenNotYetValid,
            _ => AuthError::MalformedToken,
        }
    })?;

    Ok(AuthenticatedUser::from_claims(token_data.claims))
}

/// Decode without signature verification. Development builds only.
#[cfg(any(test, feature = "dev"))]
fn verify_jwt_development(token: &str) -> Result<AuthenticatedUser, AuthError> {
    let token_data = jsonwebtoken::dangerous::insecure_decode::<TokenClaims>(token)
        .map_err(|_| AuthError::MalformedToken)?;
    let claims = token_data.claims;

    let now = chrono::Utc::now().timestamp();
    if claims.exp > 0 && claims.exp < now - CLOCK_SKEW_LEEWAY as i64 {
        return Err(AuthError::TokenExpired);
    }

    Ok(AuthenticatedUser::from_claims(claims))
}

#[cfg(not(any(test, feature = "dev")))]
fn verify_jwt_development(_token: &str) -> Result<AuthenticatedUser, AuthError> {
    Err(AuthError::VerificationUnavailable)
}

/// Extractor that requires admin role.
pub struct AdminOnly(pub AuthenticatedUser);

impl FromRequestParts<AppState> for AdminOnly {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Auth(user) = Auth::from_request_parts(parts, state).await?;

        if !user.is_admin() {
            return Err(AuthError::InsufficientPermissions);
        }

        Ok(AdminOnly(user))
    }
}

/// Extractor that requires treasury staff (admin or treasurer).
pub struct TreasuryStaff(pub AuthenticatedUser);

impl FromRequestParts<AppState> for TreasuryStaff {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Auth(user) = Auth::from_request_parts(parts, state).await?;

        if !user.role.is_treasury_staff() {
            return Err(AuthError::InsufficientPermissions);
        }

        Ok(TreasuryStaff(user))
    }
}

/// Extractor for roles that may read the whole ledger (admin, treasurer, auditor).
pub struct LedgerViewer(pub AuthenticatedUser);

impl FromRequestParts<AppState> for LedgerViewer {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Auth(user) = Auth::from_request_parts(parts, state).await?;

        if !user.role.can_view_ledger() {
            return Err(AuthError::InsufficientPermissions);
        }

        Ok(LedgerViewer(user))
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::create_test_jwt;
    use super::*;
    use crate::auth::Role;
    use crate::state::test_support::test_state;
    use axum::http::Request;

    fn parts_with(token: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/test");
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[tokio::test]
    async fn auth_extractor_requires_auth_header() {
        let (state, _temp_dir) = test_state();
        let mut parts = parts_with(None);

        let result = Auth::from_request_parts(&mut parts, &state).await;
        assert!(matches!(result, Err(AuthError::MissingAuthHeader)));
    }

    #[tokio::test]
    async fn auth_extractor_rejects_non_bearer_scheme() {
        let (state, _temp_dir) = test_state();
        let mut parts = Request::builder()
            .uri("/test")
            .header("Authorization", "Basic dXNlcjpwYXNz")
            .body(())
            .unwrap()
            .into_parts()
            .0;

        let result = Auth::from_request_parts(&mut parts, &state).await;
        assert!(matches!(result, Err(AuthError::InvalidAuthHeader)));
    }

    #[tokio::test]
    async fn auth_extractor_succeeds_with_jwt() {
        let (state, _temp_dir) = test_state();
        let token = create_test_jwt("user_123", "member", Some(5));
        let mut parts = parts_with(Some(&token));

        let Auth(user) = Auth::from_request_parts(&mut parts, &state).await.unwrap();
        assert_eq!(user.user_id, "user_123");
        assert_eq!(user.role, Role::Member);
        assert_eq!(user.member_id, Some(5));
    }

    #[tokio::test]
    async fn auth_extractor_prefers_extensions() {
        let (state, _temp_dir) = test_state();
        let mut parts = parts_with(None);

        parts.extensions.insert(AuthenticatedUser {
            user_id: "user_from_extension".to_string(),
            role: Role::Admin,
            member_id: None,
            session_id: None,
            issuer: "test".to_string(),
            expires_at: 0,
        });

        let Auth(user) = Auth::from_request_parts(&mut parts, &state).await.unwrap();
        assert_eq!(user.user_id, "user_from_extension");
    }

    #[tokio::test]
    async fn admin_only_rejects_non_admin() {
        let (state, _temp_dir) = test_state();
        let token = create_test_jwt("user_123", "treasurer", None);
        let mut parts = parts_with(Some(&token));

        let result = AdminOnly::from_request_parts(&mut parts, &state).await;
        assert!(matches!(result, Err(AuthError::InsufficientPermissions)));
    }

    #[tokio::test]
    async fn treasury_staff_accepts_treasurer_and_rejects_member() {
        let (state, _temp_dir) = test_state();

        let token = create_test_jwt("t1", "treasurer", None);
        let mut parts = parts_with(Some(&token));
        assert!(TreasuryStaff::from_request_parts(&mut parts, &state).await.is_ok());

        let token = create_test_jwt("m1", "member", Some(1));
        let mut parts = parts_with(Some(&token));
        assert!(matches!(
            TreasuryStaff::from_request_parts(&mut parts, &state).await,
            Err(AuthError::InsufficientPermissions)
        ));
    }

    #[tokio::test]
    async fn ledger_viewer_accepts_auditor() {
        let (state, _temp_dir) = test_state();
        let token = create_test_jwt("a1", "auditor", None);
        let mut parts = parts_with(Some(&token));
        assert!(LedgerViewer::from_request_parts(&mut parts, &state).await.is_ok());
    }

    #[tokio::test]
    async fn malformed_token_is_rejected() {
        let (state, _temp_dir) = test_state();
        let mut parts = parts_with(Some("not-a-jwt"));
        let result = Auth::from_request_parts(&mut parts, &state).await;
        assert!(matches!(result, Err(AuthError::MalformedToken)));
    }
}
