//! # Budget Repository
//!
//! Approval-workflow and execution-tracking queries for the `budgets`
//! table: search over type/status/amount filters, one-query statistics with
//! execution rates, pending-approval and at-risk listings.

use std::ops::Deref;

use rust_decimal::Decimal;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use super::base::Repository;
use crate::error::{CoreError, Result};
use crate::models::budget::{ApprovalStatus, Budget, BudgetStatus, BudgetType};
use crate::query::{Page, PageRequest, WhereClause};
use crate::transaction::TransactionManager;

/// Search filter for budgets; every field optional.
#[derive(Debug, Clone, Default)]
pub struct BudgetSearchFilter {
    pub query: Option<String>,
    pub organization_id: Option<Uuid>,
    pub event_id: Option<Uuid>,
    pub budget_types: Vec<BudgetType>,
    pub statuses: Vec<BudgetStatus>,
    pub approval_statuses: Vec<ApprovalStatus>,
    pub budget_year: Option<i32>,
    pub budget_period: Option<i32>,
    pub created_by: Option<Uuid>,
    pub approved_by: Option<Uuid>,
    pub min_amount: Option<Decimal>,
    pub max_amount: Option<Decimal>,
    pub is_over_budget: Option<bool>,
    pub is_final: Option<bool>,
    pub tags: Vec<String>,
}

/// One-query aggregate over budget state and execution.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BudgetStatistics {
    pub total: i64,
    pub draft: i64,
    pub submitted: i64,
    pub under_review: i64,
    pub approved: i64,
    pub rejected: i64,
    pub active: i64,
    pub completed: i64,
    pub over_budget: i64,
    pub total_planned_income: f64,
    pub total_planned_expense: f64,
    pub total_actual_income: f64,
    pub total_actual_expense: f64,
    /// Mean of per-budget spent/planned percentages, over budgets that
    /// planned a nonzero expense.
    pub average_execution_rate: f64,
}

pub struct BudgetRepository {
    base: Repository<Budget>,
}

impl Deref for BudgetRepository {
    type Target = Repository<Budget>;

    fn deref(&self) -> &Repository<Budget> {
        &self.base
    }
}

impl BudgetRepository {
    pub fn new(pool: &PgPool, transactions: &TransactionManager) -> Self {
        Self {
            base: Repository::new(pool, transactions),
        }
    }

    /// An organization's budgets, newest first.
    pub async fn find_by_organization(
        &self,
        organization_id: &Uuid,
        request: PageRequest,
    ) -> Result<Page<Budget>> {
        let builder = self
            .query()
            .where_eq("organization_id", json!(organization_id.to_string()))
            .where_clause(WhereClause::is_null("deleted_at"))
            .order_desc("created_at");

        let total = builder.count(self.pool()).await? as u64;
        let data = builder
            .paginate(request.page, request.limit)
            .fetch_all(self.pool())
            .await?;
        Ok(Page::from_parts(data, total, request.page, request.limit))
    }

    /// The budget attached to one event, if any.
    pub async fn find_by_event(&self, event_id: &Uuid) -> Result<Option<Budget>> {
        sqlx::query_as::<_, Budget>(
            "SELECT * FROM budgets WHERE event_id = $1 AND deleted_at IS NULL",
        )
        .bind(event_id)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| CoreError::from_sqlx("failed to find budget by event", e))
    }

    /// Combined text/type/status/amount search.
    pub async fn search(
        &self,
        filter: &BudgetSearchFilter,
        request: PageRequest,
    ) -> Result<Page<Budget>> {
        let optimizer = self.optimizer();
        let mut builder = self
            .query()
            .where_clause(WhereClause::is_null("deleted_at"))
            .order_desc("created_at");

        if let Some(query) = &filter.query {
            builder = optimizer.full_text_search(builder, &["title", "description"], query);
        }

        builder = optimizer.apply_filters(
            builder,
            &[
                (
                    "organization_id",
                    opt_uuid(filter.organization_id.as_ref()),
                ),
                ("event_id", opt_uuid(filter.event_id.as_ref())),
                (
                    "budget_type",
                    json_array(filter.budget_types.iter().map(|t| t.as_str())),
                ),
                (
                    "status",
                    json_array(filter.statuses.iter().map(|s| s.as_str())),
                ),
                (
                    "approval_status",
                    json_array(filter.approval_statuses.iter().map(|s| s.as_str())),
                ),
                (
                    "budget_year",
                    filter.budget_year.map(|y| json!(y)).unwrap_or(json!(null)),
                ),
                (
                    "budget_period",
                    filter.budget_period.map(|p| json!(p)).unwrap_or(json!(null)),
                ),
                ("created_by", opt_uuid(filter.created_by.as_ref())),
                ("approved_by", opt_uuid(filter.approved_by.as_ref())),
                (
                    "is_final",
                    filter.is_final.map(|v| json!(v)).unwrap_or(json!(null)),
                ),
            ],
        );

        if let Some(min) = filter.min_amount {
            builder = builder.where_clause(WhereClause::simple(
                "total_income_amount",
                ">=",
                json!(min.to_string()),
            ));
        }
        if let Some(max) = filter.max_amount {
            builder = builder.where_clause(WhereClause::simple(
                "total_income_amount",
                "<=",
                json!(max.to_string()),
            ));
        }

        match filter.is_over_budget {
            Some(true) => {
                builder = builder.where_raw("total_actual_expense > total_expense_amount");
            }
            Some(false) => {
                builder = builder.where_raw("total_actual_expense <= total_expense_amount");
            }
            None => {}
        }

        if !filter.tags.is_empty() {
            builder = builder.where_clause(WhereClause::json_has_any_keys(
                "metadata->'tags'",
                filter.tags.clone(),
            ));
        }

        let total = builder.count(self.pool()).await? as u64;
        let data = builder
            .paginate(request.page, request.limit)
            .fetch_all(self.pool())
            .await?;
        Ok(Page::from_parts(data, total, request.page, request.limit))
    }

    /// Budget-state aggregate in one query, optionally scoped to an
    /// organization and/or a budget year.
    pub async fn statistics(
        &self,
        organization_id: Option<&Uuid>,
        year: Option<i32>,
    ) -> Result<BudgetStatistics> {
        let mut sql = String::from(
            "SELECT COUNT(*) AS total, \
             COUNT(*) FILTER (WHERE status = 'draft') AS draft, \
             COUNT(*) FILTER (WHERE status = 'submitted') AS submitted, \
             COUNT(*) FILTER (WHERE status = 'under_review') AS under_review, \
             COUNT(*) FILTER (WHERE status = 'approved') AS approved, \
             COUNT(*) FILTER (WHERE status = 'rejected') AS rejected, \
             COUNT(*) FILTER (WHERE status = 'active') AS active, \
             COUNT(*) FILTER (WHERE status = 'completed') AS completed, \
             COUNT(*) FILTER (WHERE total_actual_expense > total_expense_amount) AS over_budget, \
             COALESCE(SUM(total_income_amount), 0)::float8 AS total_planned_income, \
             COALESCE(SUM(total_expense_amount), 0)::float8 AS total_planned_expense, \
             COALESCE(SUM(total_actual_income), 0)::float8 AS total_actual_income, \
             COALESCE(SUM(total_actual_expense), 0)::float8 AS total_actual_expense, \
             COALESCE(AVG(CASE WHEN total_expense_amount > 0 \
                          THEN total_actual_expense / total_expense_amount * 100 END), 0)::float8 \
                 AS average_execution_rate \
             FROM budgets WHERE deleted_at IS NULL",
        );

        // Two optional bind positions, appended in order.
        let mut bind_index = 0;
        if organization_id.is_some() {
            bind_index += 1;
            sql.push_str(&format!(" AND organization_id = ${bind_index}"));
        }
        if year.is_some() {
            bind_index += 1;
            sql.push_str(&format!(" AND budget_year = ${bind_index}"));
        }

        let mut query = sqlx::query_as::<_, BudgetStatistics>(&sql);
        if let Some(org) = organization_id {
            query = query.bind(org);
        }
        if let Some(year) = year {
            query = query.bind(year);
        }

        query
            .fetch_one(self.pool())
            .await
            .map_err(|e| CoreError::from_sqlx("failed to get budget statistics", e))
    }

    /// Budgets waiting on a decision, oldest submission first.
    pub async fn find_pending_approval(
        &self,
        organization_id: Option<&Uuid>,
    ) -> Result<Vec<Budget>> {
        let mut builder = self
            .query()
            .where_eq("approval_status", json!(ApprovalStatus::Pending.as_str()))
            .where_in(
                "status",
                vec![
                    json!(BudgetStatus::Submitted.as_str()),
                    json!(BudgetStatus::UnderReview.as_str()),
                ],
            )
            .where_clause(WhereClause::is_null("deleted_at"))
            .order_asc("submitted_at");

        if let Some(org) = organization_id {
            builder = builder.where_eq("organization_id", json!(org.to_string()));
        }

        builder.fetch_all(self.pool()).await
    }

    /// Active budgets whose actual spend has reached `threshold_percent` of
    /// the plan — the ones worth a warning before they go over.
    pub async fn find_at_risk(
        &self,
        organization_id: Option<&Uuid>,
        threshold_percent: u32,
    ) -> Result<Vec<Budget>> {
        let mut builder = self
            .query()
            .where_eq("status", json!(BudgetStatus::Active.as_str()))
            .where_raw("total_expense_amount > 0")
            .where_raw(&format!(
                "total_actual_expense >= total_expense_amount * {}.0 / 100.0",
                threshold_percent
            ))
            .where_clause(WhereClause::is_null("deleted_at"))
            .order_desc("total_actual_expense");

        if let Some(org) = organization_id {
            builder = builder.where_eq("organization_id", json!(org.to_string()));
        }

        builder.fetch_all(self.pool()).await
    }
}

fn opt_uuid(value: Option<&Uuid>) -> serde_json::Value {
    value
        .map(|id| json!(id.to_string()))
        .unwrap_or(json!(null))
}

fn json_array<'a>(values: impl Iterator<Item = &'a str>) -> serde_json::Value {
    let collected: Vec<serde_json::Value> = values.map(|v| json!(v)).collect();
    serde_json::Value::Array(collected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optional_uuid_filters_render_as_null_or_string() {
        assert_eq!(opt_uuid(None), json!(null));
        let id = Uuid::nil();
        assert_eq!(
            opt_uuid(Some(&id)),
            json!("00000000-0000-0000-0000-000000000000")
        );
    }
}
