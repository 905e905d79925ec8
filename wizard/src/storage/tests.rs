use chrono::{Duration, Utc};
use futures::StreamExt;
use rstest::{fixture, rstest};
use serde_json::{Map, json};

use crate::db::models::configs::ConfigBackup;
use crate::db::models::issues::{IssueKey, IssueListQuery, IssueReport, IssueSort, IssueType, ScopeType, Severity};
use crate::db::models::metadata::{MetadataFilter, MetricMetadata};
use crate::storage::Stores;

fn metadata(value: serde_json::Value) -> MetricMetadata {
    serde_json::from_value(value).unwrap()
}

fn report(issue_type: IssueType, scope: &str, severity: Severity) -> IssueReport {
    let key = IssueKey::metric(issue_type, scope);
    let now = Utc::now();
    IssueReport {
        id: key.id(),
        issue_type,
        scope_type: ScopeType::Metric,
        scope: scope.to_string(),
        severity,
        first_detection_date: now,
        date: now,
        fields: Map::new(),
    }
}

/// Fixture that returns the in-memory store set
#[fixture]
fn in_memory_stores() -> Stores {
    Stores::in_memory()
}

async fn run_test_metadata_roundtrip_and_listing(stores: &Stores) {
    let store = &stores.metadata;
    store
        .put("room.a.power", metadata(json!({"historic": true, "source": "source-a", "rate": 1.0})))
        .await
        .unwrap();
    store
        .put("room.b.power", metadata(json!({"historic": false, "source": "source-b"})))
        .await
        .unwrap();
    store.put("hall.power", metadata(json!({"source": "source-a"}))).await.unwrap();

    let fetched = store.get("room.a.power").await.unwrap().unwrap();
    assert_eq!(fetched.rate(), Some(1.0));
    assert!(store.get("missing").await.unwrap().is_none());

    let all = MetadataFilter {
        limit: 100,
        ..MetadataFilter::default()
    };
    assert_eq!(store.list(&all).await.unwrap(), ["hall.power", "room.a.power", "room.b.power"]);

    let room = MetadataFilter {
        prefix: Some("room.".to_string()),
        limit: 100,
        ..MetadataFilter::default()
    };
    assert_eq!(store.list(&room).await.unwrap(), ["room.a.power", "room.b.power"]);

    let historic = MetadataFilter {
        historic: Some(true),
        limit: 100,
        ..MetadataFilter::default()
    };
    assert_eq!(store.list(&historic).await.unwrap(), ["room.a.power"]);

    let non_historic_a = MetadataFilter {
        historic: Some(false),
        source: Some("source-a".to_string()),
        limit: 100,
        ..MetadataFilter::default()
    };
    assert_eq!(store.list(&non_historic_a).await.unwrap(), ["hall.power"]);

    let limited = MetadataFilter {
        limit: 1,
        ..MetadataFilter::default()
    };
    assert_eq!(store.list(&limited).await.unwrap(), ["hall.power"]);

    let streamed: Vec<_> = store.stream().map(|entry| entry.unwrap().0).collect().await;
    assert_eq!(streamed, ["hall.power", "room.a.power", "room.b.power"]);

    assert!(store.delete("hall.power").await.unwrap());
    assert!(!store.delete("hall.power").await.unwrap());
}

#[rstest]
#[tokio::test]
async fn test_metadata_roundtrip_and_listing(in_memory_stores: Stores) {
    run_test_metadata_roundtrip_and_listing(&in_memory_stores).await;
}

#[cfg(feature = "postgres-tests")]
#[sqlx::test]
async fn test_metadata_roundtrip_and_listing_postgres(pool: sqlx::PgPool) {
    run_test_metadata_roundtrip_and_listing(&Stores::postgres(pool)).await;
}

async fn run_test_issue_upsert_keeps_first_detection(stores: &Stores) {
    let store = &stores.issues;
    let mut first = report(IssueType::Dead, "foo.bar", Severity::Error);
    let original_detection = Utc::now() - Duration::hours(3);
    first.first_detection_date = original_detection;
    first.fields.insert("source".to_string(), json!("source-foo"));
    store.upsert(&first).await.unwrap();

    let mut second = report(IssueType::Dead, "foo.bar", Severity::Error);
    second.fields.insert("last_timestamp".to_string(), json!("2024-01-01T00:00:00Z"));
    let stored = store.upsert(&second).await.unwrap();

    // Postgres stores microseconds
    let drift = (stored.first_detection_date - original_detection).num_milliseconds().abs();
    assert!(drift < 1, "first_detection_date was overwritten");
    assert!(stored.date > stored.first_detection_date);
    assert_eq!(stored.fields.get("last_timestamp"), Some(&json!("2024-01-01T00:00:00Z")));

    let fetched = store.get("dead-metric-foo.bar").await.unwrap().unwrap();
    assert_eq!(fetched.first_detection_date, stored.first_detection_date);

    assert!(store.delete("dead-metric-foo.bar").await.unwrap());
    assert!(!store.delete("dead-metric-foo.bar").await.unwrap());
    assert!(store.get("dead-metric-foo.bar").await.unwrap().is_none());
}

#[rstest]
#[tokio::test]
async fn test_issue_upsert_keeps_first_detection(in_memory_stores: Stores) {
    run_test_issue_upsert_keeps_first_detection(&in_memory_stores).await;
}

#[cfg(feature = "postgres-tests")]
#[sqlx::test]
async fn test_issue_upsert_keeps_first_detection_postgres(pool: sqlx::PgPool) {
    run_test_issue_upsert_keeps_first_detection(&Stores::postgres(pool)).await;
}

async fn run_test_issue_listing(stores: &Stores) {
    let store = &stores.issues;
    for r in [
        report(IssueType::Infinite, "b.x", Severity::Info),
        report(IssueType::Dead, "c.x", Severity::Error),
        report(IssueType::Timeout, "a.x", Severity::Warning),
        report(IssueType::Dead, "a.x", Severity::Error),
    ] {
        store.upsert(&r).await.unwrap();
    }

    let (page, total) = store.list(&IssueListQuery::default()).await.unwrap();
    assert_eq!(total, 4);
    let ids: Vec<_> = page.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, ["dead-metric-a.x", "dead-metric-c.x", "infinite-metric-b.x", "timeout-metric-a.x"]);

    let by_severity = IssueListQuery {
        sort: IssueSort::Severity,
        skip: 1,
        limit: 2,
        ..IssueListQuery::default()
    };
    let (page, total) = store.list(&by_severity).await.unwrap();
    assert_eq!(total, 4);
    let ids: Vec<_> = page.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, ["dead-metric-c.x", "timeout-metric-a.x"]);

    let by_scope_desc = IssueListQuery {
        sort: IssueSort::Scope,
        descending: true,
        ..IssueListQuery::default()
    };
    let (page, _) = store.list(&by_scope_desc).await.unwrap();
    assert_eq!(page[0].scope, "c.x");
    assert_eq!(page[3].id, "dead-metric-a.x");

    let only_dead = IssueListQuery {
        issue_type: Some(IssueType::Dead),
        ..IssueListQuery::default()
    };
    let (page, total) = store.list(&only_dead).await.unwrap();
    assert_eq!(total, 2);
    assert!(page.iter().all(|r| r.issue_type == IssueType::Dead));

    let only_warnings = IssueListQuery {
        severity: Some(Severity::Warning),
        ..IssueListQuery::default()
    };
    assert_eq!(store.list(&only_warnings).await.unwrap().1, 1);

    let for_a: Vec<_> = store
        .find_by_scope(ScopeType::Metric, "a.x")
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(for_a, ["dead-metric-a.x", "timeout-metric-a.x"]);

    assert_eq!(store.scopes(ScopeType::Metric).await.unwrap(), ["a.x", "b.x", "c.x"]);
}

#[rstest]
#[tokio::test]
async fn test_issue_listing(in_memory_stores: Stores) {
    run_test_issue_listing(&in_memory_stores).await;
}

#[cfg(feature = "postgres-tests")]
#[sqlx::test]
async fn test_issue_listing_postgres(pool: sqlx::PgPool) {
    run_test_issue_listing(&Stores::postgres(pool)).await;
}

async fn run_test_config_documents_and_backups(stores: &Stores) {
    let store = &stores.configs;
    let mut config = Map::new();
    config.insert("rate".to_string(), json!(10));
    store.replace("source-b", config.clone()).await.unwrap();
    store.replace("source-a", Map::new()).await.unwrap();

    assert_eq!(store.tokens().await.unwrap(), ["source-a", "source-b"]);
    assert_eq!(store.get("source-b").await.unwrap(), Some(config.clone()));
    assert!(store.get("unknown").await.unwrap().is_none());

    let older = ConfigBackup::new("source-b", config.clone(), Utc::now() - Duration::minutes(5));
    let newer = ConfigBackup::new("source-b", Map::new(), Utc::now());
    store.save_backup(&newer).await.unwrap();
    store.save_backup(&older).await.unwrap();

    assert_eq!(store.backups("source-b").await.unwrap(), [older.id.clone(), newer.id.clone()]);
    assert!(store.backups("source-a").await.unwrap().is_empty());

    let fetched = store.get_backup(&older.id).await.unwrap().unwrap();
    assert_eq!(fetched.token, "source-b");
    assert_eq!(fetched.config, config);
    assert!(store.get_backup("backup-nope").await.unwrap().is_none());
}

#[rstest]
#[tokio::test]
async fn test_config_documents_and_backups(in_memory_stores: Stores) {
    run_test_config_documents_and_backups(&in_memory_stores).await;
}

#[cfg(feature = "postgres-tests")]
#[sqlx::test]
async fn test_config_documents_and_backups_postgres(pool: sqlx::PgPool) {
    run_test_config_documents_and_backups(&Stores::postgres(pool)).await;
}
