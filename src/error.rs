// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::payments::GatewayError;
use crate::purchase::PurchaseError;
use crate::storage::StorageError;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn unprocessable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
    }
}

impl From<PurchaseError> for ApiError {
    fn from(e: PurchaseError) -> Self {
        match e {
            PurchaseError::StorageUnavailable(_) => {
                tracing::error!(error = %e, "Storage failure");
                ApiError::service_unavailable("Storage is temporarily unavailable")
            }
            PurchaseError::ReferenceExpiredOrNotFound => ApiError::not_found(e.to_string()),
            PurchaseError::InvalidAmount(_) => ApiError::bad_request(e.to_string()),
            PurchaseError::Render(_) => {
                tracing::error!(error = %e, "Certificate rendering failed");
                ApiError::internal(e.to_string())
            }
            PurchaseError::Decryption => ApiError::bad_request(e.to_string()),
            PurchaseError::Forbidden(_) => ApiError::forbidden(e.to_string()),
            PurchaseError::NotFound(_) => ApiError::not_found(e.to_string()),
            PurchaseError::GatewayUnavailable(_) => ApiError::service_unavailable(e.to_string()),
            PurchaseError::Gateway(GatewayError::InvalidSignature(_)) => {
                ApiError::unauthorized("Invalid webhook signature")
            }
            PurchaseError::Gateway(GatewayError::Unsupported(_)) => {
                ApiError::bad_request(e.to_string())
            }
            PurchaseError::Gateway(_) => {
                tracing::warn!(error = %e, "Payment provider error");
                ApiError::bad_gateway(e.to_string())
            }
            PurchaseError::AwaitingManualConfirmation | PurchaseError::PaymentNotCompleted(_) => {
                ApiError::conflict(e.to_string())
            }
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        PurchaseError::from(e).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}
