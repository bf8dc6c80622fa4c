//! # User Repository
//!
//! Account lookup, membership paging, search, statistics, and login
//! bookkeeping for the `users` table.

use std::ops::Deref;

use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use super::base::Repository;
use super::entity::ChangeSet;
use crate::error::{CoreError, Result};
use crate::models::user::{User, UserRole, UserStatus, FAILED_LOGIN_LOCK_THRESHOLD, LOCKOUT_MINUTES};
use crate::query::{Condition, Page, PageRequest, WhereClause};
use crate::transaction::TransactionManager;

/// Search filter for users; every field optional, empty filter matches all.
#[derive(Debug, Clone, Default)]
pub struct UserSearchFilter {
    pub query: Option<String>,
    pub status: Option<UserStatus>,
    pub role: Option<UserRole>,
    pub organization_id: Option<Uuid>,
    pub is_active: Option<bool>,
    pub is_email_verified: Option<bool>,
    pub is_locked: Option<bool>,
    pub has_recent_login: Option<bool>,
}

/// One-query aggregate over account state.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserStatistics {
    pub total: i64,
    pub active: i64,
    pub inactive: i64,
    pub suspended: i64,
    pub pending_verification: i64,
    pub email_verified: i64,
    pub recent_logins: i64,
    pub locked_accounts: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RoleCount {
    pub role: UserRole,
    pub count: i64,
}

pub struct UserRepository {
    base: Repository<User>,
}

impl Deref for UserRepository {
    type Target = Repository<User>;

    fn deref(&self) -> &Repository<User> {
        &self.base
    }
}

impl UserRepository {
    pub fn new(pool: &PgPool, transactions: &TransactionManager) -> Self {
        Self {
            base: Repository::new(pool, transactions),
        }
    }

    /// Lookup for login. Email matching is case-insensitive by
    /// normalization; inserts lowercase too.
    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let sql = "SELECT * FROM users WHERE email = $1";
        sqlx::query_as::<_, User>(sql)
            .bind(normalize_email(email))
            .fetch_optional(self.pool())
            .await
            .map_err(|e| CoreError::from_sqlx("failed to find user by email", e))
    }

    /// The login-eligible variant: row must be active and not locked out.
    pub async fn find_active_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = self.find_by_email(email).await?;
        let now = chrono::Utc::now().naive_utc();
        Ok(user.filter(|u| u.can_login(now)))
    }

    /// Uniqueness probe, optionally excluding one user (for profile
    /// updates).
    pub async fn is_email_taken(&self, email: &str, exclude_id: Option<&Uuid>) -> Result<bool> {
        let mut conditions = vec![Condition::eq("email", json!(normalize_email(email)))];
        if let Some(id) = exclude_id {
            conditions.push(Condition::Simple {
                field: "id".to_string(),
                operator: "<>".to_string(),
                value: json!(id.to_string()),
            });
        }
        self.exists(conditions).await
    }

    /// Members of one organization, newest first.
    pub async fn find_by_organization(
        &self,
        organization_id: &Uuid,
        request: PageRequest,
    ) -> Result<Page<User>> {
        let builder = self
            .query()
            .select(&["users.*"])
            .inner_join("user_organizations uo", "uo.user_id = users.id")
            .where_eq("uo.organization_id", json!(organization_id.to_string()))
            .where_clause(WhereClause::is_null("users.deleted_at"))
            .order_desc("users.created_at");

        let total = builder.count(self.pool()).await? as u64;
        let data = builder
            .paginate(request.page, request.limit)
            .fetch_all(self.pool())
            .await?;
        Ok(Page::from_parts(data, total, request.page, request.limit))
    }

    /// Text search over name/email combined with account-state filters.
    pub async fn search(
        &self,
        filter: &UserSearchFilter,
        request: PageRequest,
    ) -> Result<Page<User>> {
        let optimizer = self.optimizer();
        let mut builder = self.query().order_desc("created_at");

        if let Some(query) = &filter.query {
            builder = optimizer.full_text_search(builder, &["name", "email"], query);
        }

        builder = optimizer.apply_filters(
            builder,
            &[
                ("status", opt_str(filter.status.map(|s| s.as_str()))),
                ("role", opt_str(filter.role.map(|r| r.as_str()))),
                (
                    "is_active",
                    filter.is_active.map(|v| json!(v)).unwrap_or(json!(null)),
                ),
            ],
        );

        if let Some(verified) = filter.is_email_verified {
            builder = builder.where_clause(if verified {
                WhereClause::is_not_null("email_verified_at")
            } else {
                WhereClause::is_null("email_verified_at")
            });
        }

        if let Some(locked) = filter.is_locked {
            builder = builder.where_raw(if locked {
                "locked_until > NOW()"
            } else {
                "(locked_until IS NULL OR locked_until <= NOW())"
            });
        }

        if let Some(recent) = filter.has_recent_login {
            builder = builder.where_raw(if recent {
                "last_login_at >= NOW() - INTERVAL '30 days'"
            } else {
                "(last_login_at IS NULL OR last_login_at < NOW() - INTERVAL '30 days')"
            });
        }

        if let Some(org) = &filter.organization_id {
            builder = builder.where_exists(&format!(
                "SELECT 1 FROM user_organizations uo \
                 WHERE uo.user_id = users.id AND uo.organization_id = '{org}'"
            ));
        }

        let total = builder.count(self.pool()).await? as u64;
        let data = builder
            .paginate(request.page, request.limit)
            .fetch_all(self.pool())
            .await?;
        Ok(Page::from_parts(data, total, request.page, request.limit))
    }

    /// Account-state aggregate in one query, optionally scoped to an
    /// organization's membership.
    pub async fn statistics(&self, organization_id: Option<&Uuid>) -> Result<UserStatistics> {
        let base = "SELECT COUNT(*) AS total, \
             COUNT(*) FILTER (WHERE status = 'active') AS active, \
             COUNT(*) FILTER (WHERE status = 'inactive') AS inactive, \
             COUNT(*) FILTER (WHERE status = 'suspended') AS suspended, \
             COUNT(*) FILTER (WHERE status = 'pending_verification') AS pending_verification, \
             COUNT(*) FILTER (WHERE email_verified_at IS NOT NULL) AS email_verified, \
             COUNT(*) FILTER (WHERE last_login_at >= NOW() - INTERVAL '30 days') AS recent_logins, \
             COUNT(*) FILTER (WHERE locked_until > NOW()) AS locked_accounts \
             FROM users WHERE deleted_at IS NULL";

        let result = match organization_id {
            Some(org) => {
                let sql = format!(
                    "{base} AND EXISTS (SELECT 1 FROM user_organizations uo \
                     WHERE uo.user_id = users.id AND uo.organization_id = $1)"
                );
                sqlx::query_as::<_, UserStatistics>(&sql)
                    .bind(org)
                    .fetch_one(self.pool())
                    .await
            }
            None => {
                sqlx::query_as::<_, UserStatistics>(base)
                    .fetch_one(self.pool())
                    .await
            }
        };

        result.map_err(|e| CoreError::from_sqlx("failed to get user statistics", e))
    }

    /// Member count per role.
    pub async fn role_distribution(&self) -> Result<Vec<RoleCount>> {
        sqlx::query_as::<_, RoleCount>(
            "SELECT role, COUNT(*) AS count FROM users \
             WHERE deleted_at IS NULL GROUP BY role ORDER BY count DESC",
        )
        .fetch_all(self.pool())
        .await
        .map_err(|e| CoreError::from_sqlx("failed to get role distribution", e))
    }

    /// Accounts at or past the failed-login threshold.
    pub async fn find_with_failed_logins(&self, threshold: i32) -> Result<Vec<User>> {
        self.query()
            .where_clause(WhereClause::simple(
                "failed_login_attempts",
                ">=",
                json!(threshold),
            ))
            .order_desc("failed_login_attempts")
            .fetch_all(self.pool())
            .await
    }

    pub async fn find_by_email_verification_token(&self, token: &str) -> Result<Option<User>> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE email_verification_token = $1")
            .bind(token)
            .fetch_optional(self.pool())
            .await
            .map_err(|e| CoreError::from_sqlx("failed to find user by verification token", e))
    }

    pub async fn find_by_password_reset_token(&self, token: &str) -> Result<Option<User>> {
        sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE password_reset_token = $1 \
             AND password_reset_expires_at > NOW()",
        )
        .bind(token)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| CoreError::from_sqlx("failed to find user by reset token", e))
    }

    /// Stamp a successful login: reset the failure counter, clear any lock,
    /// record time and source address.
    pub async fn record_successful_login(
        &self,
        id: &Uuid,
        ip: Option<&str>,
    ) -> Result<Option<User>> {
        let changes = ChangeSet::new()
            .set_raw("last_login_at", "NOW()")
            .set(
                "last_login_ip",
                ip.map(|v| json!(v)).unwrap_or(json!(null)),
            )
            .set("failed_login_attempts", json!(0))
            .set("locked_until", json!(null))
            .set_raw("updated_at", "NOW()");
        self.update(id, &changes).await
    }

    /// Count a failed login; the account locks for [`LOCKOUT_MINUTES`] once
    /// the attempt counter reaches [`FAILED_LOGIN_LOCK_THRESHOLD`].
    pub async fn record_failed_login(&self, id: &Uuid) -> Result<Option<User>> {
        let lock_expression = format!(
            "CASE WHEN failed_login_attempts + 1 >= {FAILED_LOGIN_LOCK_THRESHOLD} \
             THEN NOW() + INTERVAL '{LOCKOUT_MINUTES} minutes' ELSE locked_until END"
        );
        let changes = ChangeSet::new()
            .set_raw("failed_login_attempts", "failed_login_attempts + 1")
            .set_raw("locked_until", &lock_expression)
            .set_raw("updated_at", "NOW()");
        self.update(id, &changes).await
    }

    /// Clear stale password-reset tokens; periodic maintenance. Returns the
    /// number of accounts cleaned.
    pub async fn cleanup_expired_tokens(&self) -> Result<u64> {
        let changes = ChangeSet::new()
            .set("password_reset_token", json!(null))
            .set("password_reset_expires_at", json!(null));
        self.update_many(
            vec![Condition::Raw {
                sql: "password_reset_expires_at < NOW()".to_string(),
            }],
            &changes,
        )
        .await
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn opt_str(value: Option<&str>) -> serde_json::Value {
    value.map(|v| json!(v)).unwrap_or(json!(null))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_normalization() {
        assert_eq!(normalize_email(" Anna@Parish.ORG "), "anna@parish.org");
    }

    #[test]
    fn optional_enum_filters_render_as_null_or_string() {
        assert_eq!(opt_str(None), json!(null));
        assert_eq!(opt_str(Some("active")), json!("active"));
    }
}
