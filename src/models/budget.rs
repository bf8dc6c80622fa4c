//! # Budget Model
//!
//! Planned vs actual money for a period or event, with a submit/review/
//! approve workflow. The `version` column backs optimistic locking in the
//! transaction manager; approval ordering itself is enforced by database
//! constraints, not here.

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::repository::entity::{Entity, NewEntity, SoftDeletable, Versioned};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "budget_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BudgetType {
    Annual,
    Event,
    Project,
    Special,
    Emergency,
    Monthly,
    Quarterly,
}

impl BudgetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BudgetType::Annual => "annual",
            BudgetType::Event => "event",
            BudgetType::Project => "project",
            BudgetType::Special => "special",
            BudgetType::Emergency => "emergency",
            BudgetType::Monthly => "monthly",
            BudgetType::Quarterly => "quarterly",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "budget_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BudgetStatus {
    Draft,
    Submitted,
    UnderReview,
    Approved,
    Rejected,
    Active,
    Completed,
    Cancelled,
}

impl BudgetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BudgetStatus::Draft => "draft",
            BudgetStatus::Submitted => "submitted",
            BudgetStatus::UnderReview => "under_review",
            BudgetStatus::Approved => "approved",
            BudgetStatus::Rejected => "rejected",
            BudgetStatus::Active => "active",
            BudgetStatus::Completed => "completed",
            BudgetStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "approval_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Budget {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub event_id: Option<Uuid>,
    pub created_by: Uuid,
    pub reviewed_by: Option<Uuid>,
    pub approved_by: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub budget_type: BudgetType,
    pub status: BudgetStatus,
    pub approval_status: ApprovalStatus,
    pub budget_year: i32,
    pub budget_period: Option<i32>,
    pub period_start_date: NaiveDate,
    pub period_end_date: NaiveDate,
    pub total_income_amount: Decimal,
    pub total_expense_amount: Decimal,
    pub total_actual_income: Decimal,
    pub total_actual_expense: Decimal,
    pub currency: String,
    pub submitted_at: Option<NaiveDateTime>,
    pub reviewed_at: Option<NaiveDateTime>,
    pub approved_at: Option<NaiveDateTime>,
    pub review_notes: Option<String>,
    pub approval_notes: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub version: i32,
    pub is_final: bool,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub deleted_at: Option<NaiveDateTime>,
}

impl Budget {
    pub fn net_amount(&self) -> Decimal {
        self.total_income_amount - self.total_expense_amount
    }

    pub fn actual_net_amount(&self) -> Decimal {
        self.total_actual_income - self.total_actual_expense
    }

    pub fn is_over_budget(&self) -> bool {
        self.total_actual_expense > self.total_expense_amount
    }

    /// Percentage of the planned expense already spent. `None` when nothing
    /// was planned.
    pub fn execution_rate(&self) -> Option<Decimal> {
        if self.total_expense_amount.is_zero() {
            return None;
        }
        Some(self.total_actual_expense / self.total_expense_amount * Decimal::from(100))
    }

    pub fn can_be_modified(&self) -> bool {
        matches!(self.status, BudgetStatus::Draft | BudgetStatus::Rejected) && !self.is_final
    }

    pub fn can_be_submitted(&self) -> bool {
        self.status == BudgetStatus::Draft && !self.is_final
    }

    pub fn can_be_approved(&self) -> bool {
        matches!(
            self.status,
            BudgetStatus::Submitted | BudgetStatus::UnderReview
        ) && self.approval_status == ApprovalStatus::Pending
    }
}

impl Entity for Budget {
    const TABLE: &'static str = "budgets";
    type Id = Uuid;

    fn id(&self) -> &Uuid {
        &self.id
    }
}

impl SoftDeletable for Budget {}

impl Versioned for Budget {
    fn version(&self) -> i32 {
        self.version
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBudget {
    pub organization_id: Uuid,
    pub event_id: Option<Uuid>,
    pub created_by: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub budget_type: BudgetType,
    pub budget_year: i32,
    pub budget_period: Option<i32>,
    pub period_start_date: NaiveDate,
    pub period_end_date: NaiveDate,
    pub total_income_amount: Decimal,
    pub total_expense_amount: Decimal,
    pub currency: String,
}

impl NewEntity for NewBudget {
    type Entity = Budget;

    fn columns(&self) -> Vec<&'static str> {
        vec![
            "organization_id",
            "event_id",
            "created_by",
            "title",
            "description",
            "budget_type",
            "status",
            "approval_status",
            "budget_year",
            "budget_period",
            "period_start_date",
            "period_end_date",
            "total_income_amount",
            "total_expense_amount",
            "total_actual_income",
            "total_actual_expense",
            "currency",
            "version",
            "is_final",
            "is_active",
        ]
    }

    fn values(&self) -> Vec<serde_json::Value> {
        vec![
            serde_json::Value::String(self.organization_id.to_string()),
            self.event_id
                .map(|id| serde_json::Value::String(id.to_string()))
                .unwrap_or(serde_json::Value::Null),
            serde_json::Value::String(self.created_by.to_string()),
            serde_json::Value::String(self.title.clone()),
            self.description
                .clone()
                .map(serde_json::Value::String)
                .unwrap_or(serde_json::Value::Null),
            serde_json::Value::String(self.budget_type.as_str().to_string()),
            serde_json::Value::String(BudgetStatus::Draft.as_str().to_string()),
            serde_json::Value::String(ApprovalStatus::Pending.as_str().to_string()),
            serde_json::Value::Number(self.budget_year.into()),
            self.budget_period
                .map(|p| serde_json::Value::Number(p.into()))
                .unwrap_or(serde_json::Value::Null),
            serde_json::Value::String(self.period_start_date.to_string()),
            serde_json::Value::String(self.period_end_date.to_string()),
            serde_json::Value::String(self.total_income_amount.to_string()),
            serde_json::Value::String(self.total_expense_amount.to_string()),
            serde_json::Value::String("0".to_string()),
            serde_json::Value::String("0".to_string()),
            serde_json::Value::String(self.currency.clone()),
            serde_json::Value::Number(1.into()),
            serde_json::Value::Bool(false),
            serde_json::Value::Bool(true),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(value: i64) -> Decimal {
        Decimal::from(value)
    }

    fn budget(planned_expense: Decimal, actual_expense: Decimal) -> Budget {
        let now = chrono::Utc::now().naive_utc();
        Budget {
            id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            event_id: None,
            created_by: Uuid::new_v4(),
            reviewed_by: None,
            approved_by: None,
            title: "2025 annual budget".to_string(),
            description: None,
            budget_type: BudgetType::Annual,
            status: BudgetStatus::Active,
            approval_status: ApprovalStatus::Approved,
            budget_year: 2025,
            budget_period: None,
            period_start_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            period_end_date: NaiveDate::from_ymd_opt(2025, 12, 31).unwrap(),
            total_income_amount: dec(1000),
            total_expense_amount: planned_expense,
            total_actual_income: dec(800),
            total_actual_expense: actual_expense,
            currency: "KRW".to_string(),
            submitted_at: None,
            reviewed_at: None,
            approved_at: None,
            review_notes: None,
            approval_notes: None,
            metadata: None,
            version: 1,
            is_final: false,
            is_active: true,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    #[test]
    fn over_budget_detection() {
        assert!(budget(dec(500), dec(600)).is_over_budget());
        assert!(!budget(dec(500), dec(400)).is_over_budget());
    }

    #[test]
    fn execution_rate_math() {
        let b = budget(dec(500), dec(400));
        assert_eq!(b.execution_rate(), Some(dec(80)));
    }

    #[test]
    fn execution_rate_undefined_without_plan() {
        let b = budget(Decimal::ZERO, dec(400));
        assert_eq!(b.execution_rate(), None);
    }

    #[test]
    fn approval_gating() {
        let mut b = budget(dec(500), Decimal::ZERO);
        b.status = BudgetStatus::Submitted;
        b.approval_status = ApprovalStatus::Pending;
        assert!(b.can_be_approved());

        b.approval_status = ApprovalStatus::Approved;
        assert!(!b.can_be_approved());
    }

    #[test]
    fn new_budget_columns_align_with_values() {
        let payload = NewBudget {
            organization_id: Uuid::new_v4(),
            event_id: None,
            created_by: Uuid::new_v4(),
            title: "Retreat budget".to_string(),
            description: None,
            budget_type: BudgetType::Event,
            budget_year: 2025,
            budget_period: None,
            period_start_date: NaiveDate::from_ymd_opt(2025, 8, 1).unwrap(),
            period_end_date: NaiveDate::from_ymd_opt(2025, 8, 3).unwrap(),
            total_income_amount: dec(300),
            total_expense_amount: dec(300),
            currency: "KRW".to_string(),
        };
        assert_eq!(payload.columns().len(), payload.values().len());
    }
}
