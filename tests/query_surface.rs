//! Exercises the public query-building surface the way the repositories use
//! it, without touching a live database: SQL assembly, the conditional
//! filter DSL, page-metadata derivation, and the diagnostics plumbing.

use std::time::Duration;

use parish_ledger::query::{
    Condition, MetricsRecorder, Page, PageRequest, QueryBuilder, QueryMetrics,
    QueryOptimizationOptions, QueryOptimizer, Relation, WhereClause,
};
use parish_ledger::repository::ChangeSet;
use parish_ledger::transaction::{IsolationLevel, TransactionManager, TransactionOptions};
use parish_ledger::CoreError;
use serde_json::json;

fn lazy_pool() -> sqlx::PgPool {
    sqlx::postgres::PgPoolOptions::new()
        .connect_lazy("postgresql://localhost/parish_ledger_test")
        .expect("lazy pool")
}

#[tokio::test]
async fn budget_search_shape_end_to_end() {
    let optimizer = QueryOptimizer::new(lazy_pool());

    let builder = QueryBuilder::new("budgets")
        .where_clause(WhereClause::is_null("deleted_at"))
        .order_desc("created_at");
    let builder = optimizer.full_text_search(builder, &["title", "description"], "retreat");
    let builder = optimizer.apply_filters(
        builder,
        &[
            ("status", json!(["submitted", "under_review"])),
            ("budget_year", json!(2025)),
            ("event_id", json!(null)),
        ],
    );
    let builder = optimizer.paginate(builder, 2, 10);

    let sql = builder.build_sql();
    assert!(sql.starts_with("SELECT * FROM budgets WHERE deleted_at IS NULL"));
    assert!(sql.contains("(title ILIKE '%retreat%' OR description ILIKE '%retreat%')"));
    assert!(sql.contains("status IN ('submitted', 'under_review')"));
    assert!(sql.contains("budget_year = 2025"));
    assert!(!sql.contains("event_id"));
    assert!(sql.contains("ORDER BY created_at DESC"));
    assert!(sql.ends_with("LIMIT 10 OFFSET 10"));
}

#[tokio::test]
async fn relation_loading_joins_once_per_relation() {
    let optimizer = QueryOptimizer::new(lazy_pool());
    let options = QueryOptimizationOptions {
        enable_query_cache: true,
        prevent_n_plus_one: true,
        ..Default::default()
    };

    let builder = optimizer.create_optimized_query("budgets", &options);
    let builder = optimizer.with_relations(
        builder,
        &[
            Relation::new("event", "events", "events.id = budgets.event_id"),
            Relation::new(
                "organization",
                "organizations",
                "organizations.id = budgets.organization_id",
            ),
        ],
    );

    let sql = builder.build_sql();
    assert_eq!(sql.matches("LEFT JOIN").count(), 2);
    assert!(builder.cache_ttl().is_some());
}

#[tokio::test]
async fn pagination_metadata_for_spec_scenario() {
    // 25 backing rows, page 2, limit 10.
    let data: Vec<i32> = (11..=20).collect();
    let page = Page::from_parts(data, 25, 2, 10);
    assert_eq!(page.data.len(), 10);
    assert_eq!(page.total, 25);
    assert_eq!(page.total_pages, 3);
    assert!(page.has_next_page);
    assert!(page.has_previous_page);
}

#[tokio::test]
async fn page_request_offset_override() {
    let request = PageRequest {
        page: 5,
        limit: 10,
        offset: Some(3),
    };
    assert_eq!(request.skip(), 3);
    assert_eq!(PageRequest::new(5, 10).skip(), 40);
}

#[tokio::test]
async fn changeset_drives_update_sql() {
    let changes = ChangeSet::new()
        .set("status", json!("submitted"))
        .set_raw("submitted_at", "NOW()")
        .set("review_notes", json!(null));
    assert_eq!(
        changes.to_set_sql(),
        "status = 'submitted', submitted_at = NOW(), review_notes = NULL"
    );
}

#[tokio::test]
async fn conditions_compose_with_or_groups() {
    let clause = WhereClause::or(vec![
        Condition::eq("status", json!("approved")),
        Condition::Raw {
            sql: "approved_at IS NOT NULL".to_string(),
        },
    ]);
    assert_eq!(
        clause.to_sql(),
        "(status = 'approved' OR approved_at IS NOT NULL)"
    );
}

#[tokio::test]
async fn metrics_recorder_feeds_performance_report() {
    let recorder = MetricsRecorder::new();
    for ms in [20, 700, 1200] {
        recorder.record(QueryMetrics {
            execution_time_ms: ms,
            query_text: "SELECT 1".to_string(),
            row_count: 0,
            cache_hit: false,
            recorded_at: chrono::Utc::now(),
        });
    }
    let report = recorder.report();
    assert_eq!(report.total_queries, 3);
    assert_eq!(report.slow_queries.len(), 2);
    assert_eq!(report.slow_queries[0].execution_time_ms, 1200);
}

#[tokio::test]
async fn transaction_defaults_and_diagnostics() {
    let manager = TransactionManager::new(lazy_pool());
    assert!(manager.active_transactions().is_empty());
    assert!(manager
        .long_running_transactions(Duration::from_secs(300))
        .is_empty());

    let options = TransactionOptions::new()
        .isolation(IsolationLevel::Serializable)
        .retries(3)
        .label("settlement close");
    assert_eq!(options.retry_attempts, 3);
    assert_eq!(
        options.isolation_level.unwrap().set_statement(),
        "SET TRANSACTION ISOLATION LEVEL SERIALIZABLE"
    );
}

#[tokio::test]
async fn transient_classification_gates_retries() {
    let transient = CoreError::from_sqlx("commit", sqlx::Error::PoolTimedOut);
    assert!(transient.is_transient());

    let permanent = CoreError::from_sqlx("fetch", sqlx::Error::RowNotFound);
    assert!(!permanent.is_transient());

    let conflict = CoreError::LockConflict("budgets version changed".to_string());
    assert!(!conflict.is_transient());
}
