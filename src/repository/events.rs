//! # Event Repository
//!
//! Scheduling-oriented queries for the `events` table: calendar overlap,
//! upcoming/ongoing windows, tag matching, and one-query statistics.

use std::ops::Deref;

use chrono::NaiveDate;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use super::base::Repository;
use crate::error::{CoreError, Result};
use crate::models::event::{Event, EventStatus, EventType, EventVisibility};
use crate::query::{Page, PageRequest, WhereClause};
use crate::transaction::TransactionManager;

/// Search filter for events; every field optional.
#[derive(Debug, Clone, Default)]
pub struct EventSearchFilter {
    pub query: Option<String>,
    pub event_types: Vec<EventType>,
    pub statuses: Vec<EventStatus>,
    pub visibility: Option<EventVisibility>,
    pub organization_id: Option<Uuid>,
    /// Overlap window: events whose date range intersects `[from, to]`.
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub include_cancelled: bool,
    pub tags: Vec<String>,
}

/// Slim projection for calendar rendering.
#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct CalendarEvent {
    pub id: Uuid,
    pub title: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub event_type: EventType,
    pub status: EventStatus,
    pub location: Option<String>,
    pub current_participants: i32,
    pub max_participants: Option<i32>,
}

/// One-query aggregate over event state.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EventStatistics {
    pub total: i64,
    pub draft: i64,
    pub planned: i64,
    pub approved: i64,
    pub in_progress: i64,
    pub completed: i64,
    pub cancelled: i64,
    pub postponed: i64,
    pub upcoming: i64,
    pub ongoing: i64,
    pub past: i64,
    pub fully_booked: i64,
    pub recent: i64,
    pub total_participants: i64,
    pub average_participants: f64,
}

pub struct EventRepository {
    base: Repository<Event>,
}

impl Deref for EventRepository {
    type Target = Repository<Event>;

    fn deref(&self) -> &Repository<Event> {
        &self.base
    }
}

impl EventRepository {
    pub fn new(pool: &PgPool, transactions: &TransactionManager) -> Self {
        Self {
            base: Repository::new(pool, transactions),
        }
    }

    /// An organization's events, most recent start first.
    pub async fn find_by_organization(
        &self,
        organization_id: &Uuid,
        request: PageRequest,
    ) -> Result<Page<Event>> {
        let builder = self
            .query()
            .where_eq("organization_id", json!(organization_id.to_string()))
            .where_clause(WhereClause::is_null("deleted_at"))
            .order_desc("start_date");

        let total = builder.count(self.pool()).await? as u64;
        let data = builder
            .paginate(request.page, request.limit)
            .fetch_all(self.pool())
            .await?;
        Ok(Page::from_parts(data, total, request.page, request.limit))
    }

    /// Combined text/type/status/window search.
    pub async fn search(
        &self,
        filter: &EventSearchFilter,
        request: PageRequest,
    ) -> Result<Page<Event>> {
        let optimizer = self.optimizer();
        let mut builder = self
            .query()
            .where_clause(WhereClause::is_null("deleted_at"))
            .order_desc("start_date");

        if let Some(query) = &filter.query {
            builder =
                optimizer.full_text_search(builder, &["title", "description", "location"], query);
        }

        builder = optimizer.apply_filters(
            builder,
            &[
                (
                    "event_type",
                    json_array(filter.event_types.iter().map(|t| t.as_str())),
                ),
                (
                    "status",
                    json_array(filter.statuses.iter().map(|s| s.as_str())),
                ),
                (
                    "visibility",
                    filter
                        .visibility
                        .map(|v| json!(v.as_str()))
                        .unwrap_or(json!(null)),
                ),
                (
                    "organization_id",
                    filter
                        .organization_id
                        .map(|id| json!(id.to_string()))
                        .unwrap_or(json!(null)),
                ),
            ],
        );

        if !filter.include_cancelled {
            builder = builder.where_eq("is_cancelled", json!(false));
        }

        // Date-range overlap: starts before the window ends, ends after it
        // starts.
        if let Some(to) = filter.to {
            builder =
                builder.where_clause(WhereClause::simple("start_date", "<=", json!(to.to_string())));
        }
        if let Some(from) = filter.from {
            builder = builder
                .where_clause(WhereClause::simple("end_date", ">=", json!(from.to_string())));
        }

        if !filter.tags.is_empty() {
            builder = builder
                .where_clause(WhereClause::json_has_any_keys("metadata->'tags'", filter.tags.clone()));
        }

        let total = builder.count(self.pool()).await? as u64;
        let data = builder
            .paginate(request.page, request.limit)
            .fetch_all(self.pool())
            .await?;
        Ok(Page::from_parts(data, total, request.page, request.limit))
    }

    /// Events overlapping `[from, to]` for calendar views. Cancelled events
    /// excluded, ordered by start date.
    pub async fn find_for_calendar(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        organization_id: Option<&Uuid>,
    ) -> Result<Vec<CalendarEvent>> {
        let mut builder = self
            .query()
            .select(&[
                "id",
                "title",
                "start_date",
                "end_date",
                "event_type",
                "status",
                "location",
                "current_participants",
                "max_participants",
            ])
            .where_clause(WhereClause::simple("start_date", "<=", json!(to.to_string())))
            .where_clause(WhereClause::simple("end_date", ">=", json!(from.to_string())))
            .where_eq("is_cancelled", json!(false))
            .order_asc("start_date");

        if let Some(org) = organization_id {
            builder = builder.where_eq("organization_id", json!(org.to_string()));
        }

        builder.fetch_all(self.pool()).await
    }

    /// Event-state aggregate in one query.
    pub async fn statistics(&self, organization_id: Option<&Uuid>) -> Result<EventStatistics> {
        let base = "SELECT COUNT(*) AS total, \
             COUNT(*) FILTER (WHERE status = 'draft') AS draft, \
             COUNT(*) FILTER (WHERE status = 'planned') AS planned, \
             COUNT(*) FILTER (WHERE status = 'approved') AS approved, \
             COUNT(*) FILTER (WHERE status = 'in_progress') AS in_progress, \
             COUNT(*) FILTER (WHERE status = 'completed') AS completed, \
             COUNT(*) FILTER (WHERE status = 'cancelled') AS cancelled, \
             COUNT(*) FILTER (WHERE status = 'postponed') AS postponed, \
             COUNT(*) FILTER (WHERE start_date > CURRENT_DATE AND NOT is_cancelled) AS upcoming, \
             COUNT(*) FILTER (WHERE start_date <= CURRENT_DATE AND end_date >= CURRENT_DATE \
                              AND NOT is_cancelled) AS ongoing, \
             COUNT(*) FILTER (WHERE end_date < CURRENT_DATE) AS past, \
             COUNT(*) FILTER (WHERE max_participants IS NOT NULL \
                              AND current_participants >= max_participants) AS fully_booked, \
             COUNT(*) FILTER (WHERE created_at >= NOW() - INTERVAL '30 days') AS recent, \
             COALESCE(SUM(current_participants), 0) AS total_participants, \
             COALESCE(AVG(current_participants), 0)::float8 AS average_participants \
             FROM events WHERE deleted_at IS NULL";

        let result = match organization_id {
            Some(org) => {
                let sql = format!("{base} AND organization_id = $1");
                sqlx::query_as::<_, EventStatistics>(&sql)
                    .bind(org)
                    .fetch_one(self.pool())
                    .await
            }
            None => {
                sqlx::query_as::<_, EventStatistics>(base)
                    .fetch_one(self.pool())
                    .await
            }
        };

        result.map_err(|e| CoreError::from_sqlx("failed to get event statistics", e))
    }

    /// Events starting within the next `within_days` days.
    pub async fn find_upcoming(
        &self,
        organization_id: Option<&Uuid>,
        within_days: u32,
        limit: u32,
    ) -> Result<Vec<Event>> {
        let mut builder = self
            .query()
            .where_raw("start_date > CURRENT_DATE")
            .where_raw(&format!(
                "start_date <= CURRENT_DATE + INTERVAL '{within_days} days'"
            ))
            .where_eq("is_cancelled", json!(false))
            .where_clause(WhereClause::is_null("deleted_at"))
            .order_asc("start_date")
            .limit(limit);

        if let Some(org) = organization_id {
            builder = builder.where_eq("organization_id", json!(org.to_string()));
        }

        builder.fetch_all(self.pool()).await
    }

    /// Events running today.
    pub async fn find_ongoing(&self, organization_id: Option<&Uuid>) -> Result<Vec<Event>> {
        let mut builder = self
            .query()
            .where_raw("start_date <= CURRENT_DATE")
            .where_raw("end_date >= CURRENT_DATE")
            .where_eq("is_cancelled", json!(false))
            .where_clause(WhereClause::is_null("deleted_at"))
            .order_asc("start_date");

        if let Some(org) = organization_id {
            builder = builder.where_eq("organization_id", json!(org.to_string()));
        }

        builder.fetch_all(self.pool()).await
    }

    /// Events carrying any of the given tags in `metadata->'tags'`.
    pub async fn find_by_tags(
        &self,
        tags: &[String],
        organization_id: Option<&Uuid>,
    ) -> Result<Vec<Event>> {
        if tags.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder = self
            .query()
            .where_clause(WhereClause::json_has_any_keys(
                "metadata->'tags'",
                tags.to_vec(),
            ))
            .where_clause(WhereClause::is_null("deleted_at"))
            .order_desc("start_date");

        if let Some(org) = organization_id {
            builder = builder.where_eq("organization_id", json!(org.to_string()));
        }

        builder.fetch_all(self.pool()).await
    }
}

fn json_array<'a>(values: impl Iterator<Item = &'a str>) -> serde_json::Value {
    let collected: Vec<serde_json::Value> = values.map(|v| json!(v)).collect();
    serde_json::Value::Array(collected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_array_builds_in_filter_input() {
        let value = json_array(["draft", "planned"].into_iter());
        assert_eq!(value, json!(["draft", "planned"]));
        // Empty arrays are skipped by the filter DSL rather than rendered.
        assert_eq!(json_array(std::iter::empty::<&str>()), json!([]));
    }
}
