// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Audit logging for purchase, certificate and administrative operations.
//!
//! Events are appended to `audit/{date}/events.jsonl`, one JSON object per
//! line. Failures to write an audit line never fail the audited operation.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{FileStorage, StorageError, StorageResult};

/// User id recorded for events raised by background tasks.
pub const SYSTEM_ACTOR: &str = "system";

/// Types of auditable events.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    // Purchase events
    PurchaseInitiated,
    PurchaseConfirmed,

    // Certificate events
    CertificateIssued,
    CertificateIssueFailed,
    CertificateDownloaded,
    CertificateDecrypted,

    // Ledger events
    InstallmentRecorded,
    ShareStatusChanged,

    // Directory events
    MemberUpserted,
    PlanUpserted,

    // Maintenance events
    PendingSwept,
    CertificatesCleaned,

    // Auth events
    PermissionDenied,
}

impl AuditEventType {
    /// Parse from the snake_case wire name.
    pub fn from_str(s: &str) -> Option<Self> {
        serde_json::from_value(serde_json::Value::String(s.to_string())).ok()
    }
}

/// An audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuditEvent {
    /// Unique event ID.
    pub event_id: String,
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
    /// Type of event.
    pub event_type: AuditEventType,
    /// User who triggered the event (if known).
    pub user_id: Option<String>,
    /// Resource affected (share id, reference, member id...).
    pub resource_id: Option<String>,
    /// Resource type (share, pending_payment, member...).
    pub resource_type: Option<String>,
    /// Additional details as JSON.
    #[schema(value_type = Option<Object>)]
    pub details: Option<serde_json::Value>,
    /// Whether the operation succeeded.
    pub success: bool,
    /// Error message if operation failed.
    pub error: Option<String>,
}

impl AuditEvent {
    /// Create a new audit event.
    pub fn new(event_type: AuditEventType) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type,
            user_id: None,
            resource_id: None,
            resource_type: None,
            details: None,
            success: true,
            error: None,
        }
    }

    /// Set the user ID.
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Set the resource.
    pub fn with_resource(
        mut self,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
    ) -> Self {
        self.resource_type = Some(resource_type.into());
        self.resource_id = Some(resource_id.into());
        self
    }

    /// Add details.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Mark as failed with error message.
    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.success = false;
        self.error = Some(error.into());
        self
    }
}

/// Filter for [`AuditRepository::query`].
#[derive(Debug, Clone)]
pub struct AuditQuery {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub event_type: Option<AuditEventType>,
    pub user_id: Option<String>,
    pub resource_id: Option<String>,
    pub limit: usize,
}

/// Repository for audit events.
pub struct AuditRepository<'a> {
    storage: &'a FileStorage,
}

impl<'a> AuditRepository<'a> {
    /// Create a new audit repository.
    pub fn new(storage: &'a FileStorage) -> Self {
        Self { storage }
    }

    /// Append an event to its day's log.
    pub fn log(&self, event: &AuditEvent) -> StorageResult<()> {
        let date = event.timestamp.format("%Y-%m-%d").to_string();
        let path = self.storage.paths().audit_events_file(&date);

        let line = serde_json::to_string(event).map_err(|e| {
            StorageError::SerializationError(format!("Failed to serialize audit event: {e}"))
        })?;

        self.storage.append_line(&path, &line)
    }

    /// Log an event, reporting failures to tracing only.
    pub fn record(&self, event: AuditEvent) {
        if let Err(e) = self.log(&event) {
            tracing::warn!(
                event_type = ?event.event_type,
                error = %e,
                "Failed to write audit event"
            );
        }
    }

    /// Read audit events for a specific date. Missing days are empty.
    pub fn read_events(&self, date: &str) -> StorageResult<Vec<AuditEvent>> {
        let path = self.storage.paths().audit_events_file(date);
        let content = match self.storage.read_raw(&path) {
            Ok(content) => content,
            Err(StorageError::NotFound(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let content_str = String::from_utf8(content).map_err(|e| {
            StorageError::SerializationError(format!("Invalid UTF-8 in audit log: {e}"))
        })?;

        let mut events = Vec::new();
        for line in content_str.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let event: AuditEvent = serde_json::from_str(line).map_err(|e| {
                StorageError::SerializationError(format!("Failed to deserialize audit event: {e}"))
            })?;
            events.push(event);
        }

        Ok(events)
    }

    /// Filtered read across a date range, newest first.
    pub fn query(&self, query: &AuditQuery) -> StorageResult<Vec<AuditEvent>> {
        if query.from > query.to {
            return Err(StorageError::SerializationError(
                "Start date is after end date".to_string(),
            ));
        }

        let mut matched = Vec::new();
        let mut current = query.to;
        loop {
            let mut day = self.read_events(&current.format("%Y-%m-%d").to_string())?;
            day.reverse();
            for event in day {
                if query.event_type.is_some_and(|t| t != event.event_type) {
                    continue;
                }
                if query
                    .user_id
                    .as_deref()
                    .is_some_and(|u| event.user_id.as_deref() != Some(u))
                {
                    continue;
                }
                if query
                    .resource_id
                    .as_deref()
                    .is_some_and(|r| event.resource_id.as_deref() != Some(r))
                {
                    continue;
                }
                matched.push(event);
                if matched.len() >= query.limit {
                    return Ok(matched);
                }
            }

            if current <= query.from {
                break;
            }
            current = current.pred_opt().ok_or_else(|| {
                StorageError::SerializationError("Date overflow".to_string())
            })?;
        }

        Ok(matched)
    }
}

/// Helper macro for logging audit events on behalf of a user.
#[macro_export]
macro_rules! audit_log {
    ($storage:expr, $event_type:expr, $user:expr) => {{
        $crate::storage::AuditRepository::new($storage)
            .record($crate::storage::AuditEvent::new($event_type).with_user(&$user.user_id));
    }};
    ($storage:expr, $event_type:expr, $user:expr, $resource_type:expr, $resource_id:expr) => {{
        $crate::storage::AuditRepository::new($storage).record(
            $crate::storage::AuditEvent::new($event_type)
                .with_user(&$user.user_id)
                .with_resource($resource_type, $resource_id),
        );
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StoragePaths;
    use tempfile::TempDir;

    fn setup() -> (TempDir, FileStorage) {
        let temp = TempDir::new().unwrap();
        let mut storage = FileStorage::new(StoragePaths::new(temp.path()));
        storage.initialize().unwrap();
        (temp, storage)
    }

    fn today() -> NaiveDate {
        Utc::now().date_naive()
    }

    fn all_today(limit: usize) -> AuditQuery {
        AuditQuery {
            from: today(),
            to: today(),
            event_type: None,
            user_id: None,
            resource_id: None,
            limit,
        }
    }

    #[test]
    fn create_audit_event() {
        let event = AuditEvent::new(AuditEventType::PurchaseInitiated)
            .with_user("user_123")
            .with_resource("pending_payment", "ref_abc");

        assert_eq!(event.event_type, AuditEventType::PurchaseInitiated);
        assert_eq!(event.user_id, Some("user_123".to_string()));
        assert_eq!(event.resource_type, Some("pending_payment".to_string()));
        assert!(event.success);
    }

    #[test]
    fn failed_event() {
        let event = AuditEvent::new(AuditEventType::CertificateIssueFailed)
            .with_user(SYSTEM_ACTOR)
            .failed("renderer missing member name");

        assert!(!event.success);
        assert_eq!(event.error, Some("renderer missing member name".to_string()));
    }

    #[test]
    fn event_type_parses_wire_name() {
        assert_eq!(
            AuditEventType::from_str("certificate_decrypted"),
            Some(AuditEventType::CertificateDecrypted)
        );
        assert_eq!(AuditEventType::from_str("invoice_paid"), None);
    }

    #[test]
    fn log_and_read_events() {
        let (_temp, storage) = setup();
        let repo = AuditRepository::new(&storage);

        repo.log(&AuditEvent::new(AuditEventType::PurchaseInitiated).with_user("user_1"))
            .unwrap();
        repo.log(&AuditEvent::new(AuditEventType::PurchaseConfirmed).with_user("user_1"))
            .unwrap();

        let events = repo
            .read_events(&today().format("%Y-%m-%d").to_string())
            .unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, AuditEventType::PurchaseInitiated);
        assert_eq!(events[1].event_type, AuditEventType::PurchaseConfirmed);
    }

    #[test]
    fn missing_day_reads_empty() {
        let (_temp, storage) = setup();
        let repo = AuditRepository::new(&storage);
        assert!(repo.read_events("1999-01-01").unwrap().is_empty());
    }

    #[test]
    fn query_filters_and_orders_newest_first() {
        let (_temp, storage) = setup();
        let repo = AuditRepository::new(&storage);

        repo.record(
            AuditEvent::new(AuditEventType::CertificateDownloaded)
                .with_user("user_target")
                .with_resource("share", "1"),
        );
        repo.record(
            AuditEvent::new(AuditEventType::CertificateDownloaded)
                .with_user("user_other")
                .with_resource("share", "2"),
        );
        repo.record(
            AuditEvent::new(AuditEventType::CertificateDecrypted)
                .with_user("user_target")
                .with_resource("share", "1"),
        );

        let mut query = all_today(10);
        query.user_id = Some("user_target".to_string());
        let events = repo.query(&query).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, AuditEventType::CertificateDecrypted);

        let mut query = all_today(10);
        query.event_type = Some(AuditEventType::CertificateDownloaded);
        query.resource_id = Some("2".to_string());
        let events = repo.query(&query).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].user_id.as_deref(), Some("user_other"));

        assert_eq!(repo.query(&all_today(1)).unwrap().len(), 1);
    }
}
