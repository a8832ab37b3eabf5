// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Member directory and payment plan catalogue.

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    auth::{AdminOnly, Auth, LedgerViewer, TreasuryStaff},
    error::ApiError,
    models::Money,
    state::AppState,
    storage::{
        AuditEvent, AuditEventType, AuditRepository, Member, MemberRepository, PaymentPlan,
        PlanRepository,
    },
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpsertMemberRequest {
    pub full_name: String,
    /// National identity document number. Also the certificate password.
    #[serde(default)]
    pub identity_number: Option<String>,
    #[serde(default)]
    pub contact_email: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpsertPlanRequest {
    pub name: String,
    pub nominal_value: Money,
    pub share_type: String,
    #[serde(default)]
    pub installments: Option<u32>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MemberListResponse {
    pub members: Vec<Member>,
    pub total: usize,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PlanListResponse {
    pub plans: Vec<PaymentPlan>,
    pub total: usize,
}

/// List all members.
#[utoipa::path(
    get,
    path = "/v1/members",
    tag = "Directory",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Members", body = MemberListResponse),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Not authorized (ledger access required)")
    )
)]
pub async fn list_members(
    LedgerViewer(_user): LedgerViewer,
    State(state): State<AppState>,
) -> Result<Json<MemberListResponse>, ApiError> {
    let members = MemberRepository::new(state.storage()).list()?;
    Ok(Json(MemberListResponse {
        total: members.len(),
        members,
    }))
}

/// Get a member. Members may read their own record.
#[utoipa::path(
    get,
    path = "/v1/members/{member_id}",
    tag = "Directory",
    params(("member_id" = u64, Path, description = "Member id")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Member", body = Member),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Not allowed"),
        (status = 404, description = "Member not found")
    )
)]
pub async fn get_member(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(member_id): Path<u64>,
) -> Result<Json<Member>, ApiError> {
    if !user.acts_for(member_id) && !user.role.can_view_ledger() {
        return Err(ApiError::forbidden("Cannot read another member's record"));
    }
    Ok(Json(MemberRepository::new(state.storage()).get(member_id)?))
}

/// Create or update a member. Treasury staff only.
#[utoipa::path(
    put,
    path = "/v1/members/{member_id}",
    tag = "Directory",
    params(("member_id" = u64, Path, description = "Member id")),
    request_body = UpsertMemberRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Member saved", body = Member),
        (status = 400, description = "Invalid member data"),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Not authorized (treasury staff required)")
    )
)]
pub async fn upsert_member(
    TreasuryStaff(user): TreasuryStaff,
    State(state): State<AppState>,
    Path(member_id): Path<u64>,
    Json(request): Json<UpsertMemberRequest>,
) -> Result<Json<Member>, ApiError> {
    let full_name = request.full_name.trim();
    if full_name.is_empty() {
        return Err(ApiError::bad_request("full_name is required"));
    }
    let contact_email = non_blank(request.contact_email);
    if contact_email.as_deref().is_some_and(|e| !e.contains('@')) {
        return Err(ApiError::bad_request("contact_email is not an email address"));
    }

    let storage = state.storage();
    let member = MemberRepository::new(storage).upsert(
        member_id,
        full_name.to_string(),
        non_blank(request.identity_number),
        contact_email,
    )?;

    AuditRepository::new(storage).record(
        AuditEvent::new(AuditEventType::MemberUpserted)
            .with_user(&user.user_id)
            .with_resource("member", member_id.to_string()),
    );
    Ok(Json(member))
}

/// List payment plans.
#[utoipa::path(
    get,
    path = "/v1/plans",
    tag = "Directory",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Payment plans", body = PlanListResponse),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn list_plans(
    Auth(_user): Auth,
    State(state): State<AppState>,
) -> Result<Json<PlanListResponse>, ApiError> {
    let plans = PlanRepository::new(state.storage()).list()?;
    Ok(Json(PlanListResponse {
        total: plans.len(),
        plans,
    }))
}

/// Create or update a payment plan. Admin only.
#[utoipa::path(
    put,
    path = "/v1/plans/{plan_id}",
    tag = "Directory",
    params(("plan_id" = u64, Path, description = "Plan id")),
    request_body = UpsertPlanRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Plan saved", body = PaymentPlan),
        (status = 400, description = "Invalid plan data"),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Not authorized (admin required)")
    )
)]
pub async fn upsert_plan(
    AdminOnly(user): AdminOnly,
    State(state): State<AppState>,
    Path(plan_id): Path<u64>,
    Json(request): Json<UpsertPlanRequest>,
) -> Result<Json<PaymentPlan>, ApiError> {
    if request.name.trim().is_empty() || request.share_type.trim().is_empty() {
        return Err(ApiError::bad_request("name and share_type are required"));
    }
    if !request.nominal_value.is_positive() {
        return Err(ApiError::bad_request("nominal_value must be positive"));
    }
    if request.installments == Some(0) {
        return Err(ApiError::bad_request("installments must be at least 1"));
    }

    let plan = PaymentPlan {
        plan_id,
        name: request.name.trim().to_string(),
        nominal_value: request.nominal_value,
        share_type: request.share_type.trim().to_string(),
        installments: request.installments,
        updated_at: Utc::now(),
    };
    let storage = state.storage();
    PlanRepository::new(storage).upsert(&plan)?;

    AuditRepository::new(storage).record(
        AuditEvent::new(AuditEventType::PlanUpserted)
            .with_user(&user.user_id)
            .with_resource("plan", plan_id.to_string()),
    );
    Ok(Json(plan))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use crate::api::router;
    use crate::api::test_helpers::{json, send, ADMIN, AUDITOR, MEMBER_7, MEMBER_8, TREASURER};
    use crate::state::test_support::test_state;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn member_reads_own_record_only() {
        let (state, _temp) = test_state();
        let app = router(state);

        let (status, body) = send(&app, "GET", "/v1/members/7", MEMBER_7, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json(&body)["full_name"], "Ana Pérez");

        let (status, _) = send(&app, "GET", "/v1/members/7", MEMBER_8, None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = send(&app, "GET", "/v1/members/7", AUDITOR, None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(&app, "GET", "/v1/members/404", ADMIN, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&app, "GET", "/v1/members", MEMBER_7, None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, body) = send(&app, "GET", "/v1/members", AUDITOR, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json(&body)["total"], 2);
    }

    #[tokio::test]
    async fn treasurer_registers_member() {
        let (state, _temp) = test_state();
        let app = router(state);
        let member = json!({
            "full_name": "  Rosa Vera ",
            "identity_number": "1710034065",
            "contact_email": "rosa@example.com"
        });

        let (status, _) = send(&app, "PUT", "/v1/members/9", MEMBER_7, Some(member.clone())).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = send(&app, "PUT", "/v1/members/9", TREASURER, Some(member)).await;
        assert_eq!(status, StatusCode::OK);
        let saved = json(&body);
        assert_eq!(saved["full_name"], "Rosa Vera");
        assert_eq!(saved["member_id"], 9);

        let (status, _) = send(
            &app,
            "PUT",
            "/v1/members/9",
            TREASURER,
            Some(json!({ "full_name": " " })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn admin_manages_plans() {
        let (state, _temp) = test_state();
        let app = router(state);
        let plan = json!({
            "name": "Doce cuotas",
            "nominal_value": "600.00",
            "share_type": "Acción Patrimonial",
            "installments": 12
        });

        let (status, _) = send(&app, "PUT", "/v1/plans/4", TREASURER, Some(plan.clone())).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = send(&app, "PUT", "/v1/plans/4", ADMIN, Some(plan)).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(
            &app,
            "PUT",
            "/v1/plans/5",
            ADMIN,
            Some(json!({ "name": "Gratis", "nominal_value": "0.00", "share_type": "X" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(&app, "GET", "/v1/plans", MEMBER_7, None).await;
        assert_eq!(status, StatusCode::OK);
        let plans = json(&body);
        assert_eq!(plans["total"], 2);
        assert_eq!(plans["plans"][1]["installments"], 12);
    }
}
