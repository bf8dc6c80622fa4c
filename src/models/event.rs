//! # Event Model
//!
//! Organization events: retreats, services, fundraisers. Carries schedule,
//! capacity, and approval state; budgets and settlements reference events.
//!
//! Maps to the `events` table. Tags live under `metadata->'tags'` as a JSON
//! array and are matched with the JSONB `?|` operator.

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::repository::entity::{Entity, NewEntity, SoftDeletable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "event_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Regular,
    Special,
    Fundraising,
    Worship,
    Fellowship,
    Education,
    Outreach,
    Service,
    Retreat,
    Conference,
    Other,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Regular => "regular",
            EventType::Special => "special",
            EventType::Fundraising => "fundraising",
            EventType::Worship => "worship",
            EventType::Fellowship => "fellowship",
            EventType::Education => "education",
            EventType::Outreach => "outreach",
            EventType::Service => "service",
            EventType::Retreat => "retreat",
            EventType::Conference => "conference",
            EventType::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "event_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Draft,
    Planned,
    Approved,
    InProgress,
    Completed,
    Cancelled,
    Postponed,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Draft => "draft",
            EventStatus::Planned => "planned",
            EventStatus::Approved => "approved",
            EventStatus::InProgress => "in_progress",
            EventStatus::Completed => "completed",
            EventStatus::Cancelled => "cancelled",
            EventStatus::Postponed => "postponed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "event_visibility", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EventVisibility {
    Public,
    Private,
    MembersOnly,
}

impl EventVisibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventVisibility::Public => "public",
            EventVisibility::Private => "private",
            EventVisibility::MembersOnly => "members_only",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Event {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub created_by: Option<Uuid>,
    pub approved_by: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub event_type: EventType,
    pub status: EventStatus,
    pub visibility: EventVisibility,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub location: Option<String>,
    pub estimated_cost: Option<Decimal>,
    pub max_participants: Option<i32>,
    pub current_participants: i32,
    pub currency: String,
    pub metadata: Option<serde_json::Value>,
    pub notes: Option<String>,
    pub approved_at: Option<NaiveDateTime>,
    pub is_cancelled: bool,
    pub cancellation_reason: Option<String>,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub deleted_at: Option<NaiveDateTime>,
}

impl Event {
    pub fn duration_in_days(&self) -> i64 {
        (self.end_date - self.start_date).num_days() + 1
    }

    pub fn is_upcoming(&self, today: NaiveDate) -> bool {
        self.start_date > today && !self.is_cancelled
    }

    pub fn is_ongoing(&self, today: NaiveDate) -> bool {
        self.start_date <= today && today <= self.end_date && !self.is_cancelled
    }

    pub fn is_past(&self, today: NaiveDate) -> bool {
        self.end_date < today
    }

    pub fn is_fully_booked(&self) -> bool {
        self.max_participants
            .map(|max| self.current_participants >= max)
            .unwrap_or(false)
    }

    /// Remaining capacity; `None` means unbounded.
    pub fn available_slots(&self) -> Option<i32> {
        self.max_participants
            .map(|max| (max - self.current_participants).max(0))
    }

    pub fn can_register(&self, today: NaiveDate) -> bool {
        self.status == EventStatus::Approved
            && !self.is_cancelled
            && !self.is_fully_booked()
            && !self.is_past(today)
    }
}

impl Entity for Event {
    const TABLE: &'static str = "events";
    type Id = Uuid;

    fn id(&self) -> &Uuid {
        &self.id
    }
}

impl SoftDeletable for Event {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEvent {
    pub organization_id: Uuid,
    pub created_by: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub event_type: EventType,
    pub visibility: EventVisibility,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub location: Option<String>,
    pub estimated_cost: Option<Decimal>,
    pub max_participants: Option<i32>,
    pub currency: String,
}

impl NewEntity for NewEvent {
    type Entity = Event;

    fn columns(&self) -> Vec<&'static str> {
        vec![
            "organization_id",
            "created_by",
            "title",
            "description",
            "event_type",
            "status",
            "visibility",
            "start_date",
            "end_date",
            "location",
            "estimated_cost",
            "max_participants",
            "current_participants",
            "currency",
            "is_cancelled",
            "is_active",
        ]
    }

    fn values(&self) -> Vec<serde_json::Value> {
        vec![
            serde_json::Value::String(self.organization_id.to_string()),
            self.created_by
                .map(|id| serde_json::Value::String(id.to_string()))
                .unwrap_or(serde_json::Value::Null),
            serde_json::Value::String(self.title.clone()),
            self.description
                .clone()
                .map(serde_json::Value::String)
                .unwrap_or(serde_json::Value::Null),
            serde_json::Value::String(self.event_type.as_str().to_string()),
            serde_json::Value::String(EventStatus::Draft.as_str().to_string()),
            serde_json::Value::String(self.visibility.as_str().to_string()),
            serde_json::Value::String(self.start_date.to_string()),
            serde_json::Value::String(self.end_date.to_string()),
            self.location
                .clone()
                .map(serde_json::Value::String)
                .unwrap_or(serde_json::Value::Null),
            self.estimated_cost
                .map(|cost| serde_json::Value::String(cost.to_string()))
                .unwrap_or(serde_json::Value::Null),
            self.max_participants
                .map(|max| serde_json::Value::Number(max.into()))
                .unwrap_or(serde_json::Value::Null),
            serde_json::Value::Number(0.into()),
            serde_json::Value::String(self.currency.clone()),
            serde_json::Value::Bool(false),
            serde_json::Value::Bool(true),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(start: NaiveDate, end: NaiveDate) -> Event {
        let now = chrono::Utc::now().naive_utc();
        Event {
            id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            created_by: None,
            approved_by: None,
            title: "Summer retreat".to_string(),
            description: None,
            event_type: EventType::Retreat,
            status: EventStatus::Approved,
            visibility: EventVisibility::MembersOnly,
            start_date: start,
            end_date: end,
            start_time: None,
            end_time: None,
            location: None,
            estimated_cost: None,
            max_participants: Some(40),
            current_participants: 0,
            currency: "KRW".to_string(),
            metadata: None,
            notes: None,
            approved_at: None,
            is_cancelled: false,
            cancellation_reason: None,
            is_active: true,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    #[test]
    fn temporal_predicates() {
        let today = NaiveDate::from_ymd_opt(2025, 7, 15).unwrap();
        let upcoming = event(
            NaiveDate::from_ymd_opt(2025, 8, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 8, 3).unwrap(),
        );
        assert!(upcoming.is_upcoming(today));
        assert!(!upcoming.is_ongoing(today));
        assert!(!upcoming.is_past(today));

        let ongoing = event(
            NaiveDate::from_ymd_opt(2025, 7, 14).unwrap(),
            NaiveDate::from_ymd_opt(2025, 7, 16).unwrap(),
        );
        assert!(ongoing.is_ongoing(today));
        assert_eq!(ongoing.duration_in_days(), 3);
    }

    #[test]
    fn cancelled_event_is_never_upcoming() {
        let today = NaiveDate::from_ymd_opt(2025, 7, 15).unwrap();
        let mut cancelled = event(
            NaiveDate::from_ymd_opt(2025, 8, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 8, 3).unwrap(),
        );
        cancelled.is_cancelled = true;
        assert!(!cancelled.is_upcoming(today));
        assert!(!cancelled.can_register(today));
    }

    #[test]
    fn capacity_accounting() {
        let today = NaiveDate::from_ymd_opt(2025, 7, 15).unwrap();
        let mut full = event(
            NaiveDate::from_ymd_opt(2025, 8, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 8, 3).unwrap(),
        );
        full.current_participants = 40;
        assert!(full.is_fully_booked());
        assert_eq!(full.available_slots(), Some(0));
        assert!(!full.can_register(today));

        let mut unbounded = full.clone();
        unbounded.max_participants = None;
        assert!(!unbounded.is_fully_booked());
        assert_eq!(unbounded.available_slots(), None);
    }
}
