// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Payment plan directory.
//!
//! A plan describes what one share is worth and how it may be paid: the
//! nominal value printed on the certificate, the share type label and an
//! optional number of installments.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::super::{FileStorage, StorageError, StorageResult};
use crate::models::Money;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PaymentPlan {
    pub plan_id: u64,
    pub name: String,
    /// Nominal value of one share under this plan.
    pub nominal_value: Money,
    pub share_type: String,
    /// Number of installments, `None` for single payment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installments: Option<u32>,
    pub updated_at: DateTime<Utc>,
}

/// Repository for payment plans.
pub struct PlanRepository<'a> {
    storage: &'a FileStorage,
}

impl<'a> PlanRepository<'a> {
    pub fn new(storage: &'a FileStorage) -> Self {
        Self { storage }
    }

    pub fn get(&self, plan_id: u64) -> StorageResult<PaymentPlan> {
        self.find(plan_id)?
            .ok_or_else(|| StorageError::NotFound(format!("Payment plan {plan_id}")))
    }

    pub fn find(&self, plan_id: u64) -> StorageResult<Option<PaymentPlan>> {
        self.storage.read_json_opt(self.storage.paths().plan(plan_id))
    }

    pub fn upsert(&self, plan: &PaymentPlan) -> StorageResult<()> {
        self.storage
            .write_json(self.storage.paths().plan(plan.plan_id), plan)
    }

    pub fn list(&self) -> StorageResult<Vec<PaymentPlan>> {
        let mut plans = Vec::new();
        for stem in self.storage.list_files(self.storage.paths().plans_dir(), "json")? {
            let Ok(plan_id) = stem.parse::<u64>() else {
                continue;
            };
            if let Some(plan) = self.find(plan_id)? {
                plans.push(plan);
            }
        }
        plans.sort_by_key(|p| p.plan_id);
        Ok(plans)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StoragePaths;
    use tempfile::TempDir;

    fn plan(id: u64) -> PaymentPlan {
        PaymentPlan {
            plan_id: id,
            name: "Contado".to_string(),
            nominal_value: Money::from_minor(5_000),
            share_type: "Acción Patrimonial".to_string(),
            installments: None,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn upsert_get_and_list() {
        let temp = TempDir::new().unwrap();
        let mut storage = FileStorage::new(StoragePaths::new(temp.path()));
        storage.initialize().unwrap();
        let repo = PlanRepository::new(&storage);

        repo.upsert(&plan(2)).unwrap();
        let mut financed = plan(1);
        financed.installments = Some(12);
        repo.upsert(&financed).unwrap();

        assert_eq!(repo.get(1).unwrap().installments, Some(12));
        assert_eq!(repo.list().unwrap().len(), 2);
        assert!(matches!(repo.get(5), Err(StorageError::NotFound(_))));
    }
}
