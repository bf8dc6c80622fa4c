//! # User Model
//!
//! Organization members: account state, role, login bookkeeping, and the
//! verification/reset token columns the user repository manages.
//!
//! Maps to the `users` table. Rows are soft-deleted (`deleted_at`); account
//! lockout is driven by `failed_login_attempts`/`locked_until`.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::repository::entity::{Entity, NewEntity, SoftDeletable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    Active,
    Inactive,
    Suspended,
    PendingVerification,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Active => "active",
            UserStatus::Inactive => "inactive",
            UserStatus::Suspended => "suspended",
            UserStatus::PendingVerification => "pending_verification",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    SuperAdmin,
    OrganizationAdmin,
    Treasurer,
    Accountant,
    Member,
    Guest,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::SuperAdmin => "super_admin",
            UserRole::OrganizationAdmin => "organization_admin",
            UserRole::Treasurer => "treasurer",
            UserRole::Accountant => "accountant",
            UserRole::Member => "member",
            UserRole::Guest => "guest",
        }
    }
}

/// Failed logins before the account locks.
pub const FAILED_LOGIN_LOCK_THRESHOLD: i32 = 5;
/// How long a lock lasts.
pub const LOCKOUT_MINUTES: i64 = 30;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub phone: Option<String>,
    pub status: UserStatus,
    pub role: UserRole,
    pub profile_image_url: Option<String>,
    pub last_login_at: Option<NaiveDateTime>,
    pub last_login_ip: Option<String>,
    pub email_verified_at: Option<NaiveDateTime>,
    pub email_verification_token: Option<String>,
    pub password_reset_token: Option<String>,
    pub password_reset_expires_at: Option<NaiveDateTime>,
    pub failed_login_attempts: i32,
    pub locked_until: Option<NaiveDateTime>,
    pub is_active: bool,
    pub preferences: Option<serde_json::Value>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub deleted_at: Option<NaiveDateTime>,
}

impl User {
    pub fn is_email_verified(&self) -> bool {
        self.email_verified_at.is_some()
    }

    pub fn is_locked(&self, now: NaiveDateTime) -> bool {
        self.locked_until.map(|until| until > now).unwrap_or(false)
    }

    /// Whether this account may authenticate right now.
    pub fn can_login(&self, now: NaiveDateTime) -> bool {
        self.status == UserStatus::Active && self.is_active && !self.is_locked(now)
    }
}

impl Entity for User {
    const TABLE: &'static str = "users";
    type Id = Uuid;

    fn id(&self) -> &Uuid {
        &self.id
    }
}

impl SoftDeletable for User {}

/// Insert payload for `users`. Email is normalized to lowercase so lookups
/// and uniqueness behave the same regardless of input casing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub phone: Option<String>,
    pub role: UserRole,
}

impl NewEntity for NewUser {
    type Entity = User;

    fn columns(&self) -> Vec<&'static str> {
        vec![
            "email",
            "password_hash",
            "name",
            "phone",
            "status",
            "role",
            "failed_login_attempts",
            "is_active",
        ]
    }

    fn values(&self) -> Vec<serde_json::Value> {
        vec![
            serde_json::Value::String(self.email.trim().to_lowercase()),
            serde_json::Value::String(self.password_hash.clone()),
            serde_json::Value::String(self.name.clone()),
            self.phone
                .clone()
                .map(serde_json::Value::String)
                .unwrap_or(serde_json::Value::Null),
            serde_json::Value::String(UserStatus::PendingVerification.as_str().to_string()),
            serde_json::Value::String(self.role.as_str().to_string()),
            serde_json::Value::Number(0.into()),
            serde_json::Value::Bool(true),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn user() -> User {
        let now = Utc::now().naive_utc();
        User {
            id: Uuid::new_v4(),
            email: "anna@parish.org".to_string(),
            password_hash: "hash".to_string(),
            name: "Anna".to_string(),
            phone: None,
            status: UserStatus::Active,
            role: UserRole::Member,
            profile_image_url: None,
            last_login_at: None,
            last_login_ip: None,
            email_verified_at: Some(now),
            email_verification_token: None,
            password_reset_token: None,
            password_reset_expires_at: None,
            failed_login_attempts: 0,
            locked_until: None,
            is_active: true,
            preferences: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    #[test]
    fn active_unlocked_user_can_login() {
        let now = Utc::now().naive_utc();
        assert!(user().can_login(now));
    }

    #[test]
    fn locked_user_cannot_login() {
        let now = Utc::now().naive_utc();
        let mut locked = user();
        locked.locked_until = Some(now + chrono::Duration::minutes(10));
        assert!(locked.is_locked(now));
        assert!(!locked.can_login(now));
    }

    #[test]
    fn expired_lock_no_longer_applies() {
        let now = Utc::now().naive_utc();
        let mut unlocked = user();
        unlocked.locked_until = Some(now - chrono::Duration::minutes(1));
        assert!(!unlocked.is_locked(now));
    }

    #[test]
    fn suspended_user_cannot_login() {
        let now = Utc::now().naive_utc();
        let mut suspended = user();
        suspended.status = UserStatus::Suspended;
        assert!(!suspended.can_login(now));
    }

    #[test]
    fn new_user_normalizes_email() {
        let payload = NewUser {
            email: " Anna@Parish.ORG ".to_string(),
            password_hash: "hash".to_string(),
            name: "Anna".to_string(),
            phone: None,
            role: UserRole::Member,
        };
        assert_eq!(
            payload.values()[0],
            serde_json::Value::String("anna@parish.org".to_string())
        );
        assert_eq!(payload.columns().len(), payload.values().len());
    }
}
