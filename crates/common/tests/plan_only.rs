//! Integration tests for plan-only runs and request validation

mod common;

use ::common::prelude::*;

#[tokio::test]
async fn test_plan_only_reports_mapping_without_provider_calls() {
    let provider = MemoryStorageProvider::new();
    provider.seed_bucket("logs.prod", BucketSettingsSnapshot::default());
    provider.seed_bucket("assets", BucketSettingsSnapshot::default());

    let mut request = common::request(&["logs.prod", "assets"], false);
    request.plan_only = true;
    let report = common::run(&provider, &request).await;

    assert!(report.outcomes.is_none());
    assert!(report.is_success());
    assert_eq!(provider.mutations(), 0);
    assert!(!provider.has_bucket("logs-prod"));

    let mapping: Vec<_> = report.plan.mapping().collect();
    assert_eq!(mapping, vec![("logs.prod", "logs-prod"), ("assets", "assets")]);

    let rendered = report.render();
    assert_eq!(rendered.json["mode"], "plan");
    assert_eq!(rendered.json["plan_only"], true);
    for bucket in rendered.json["buckets"].as_array().unwrap() {
        assert_eq!(bucket["copy_status"], "not requested");
    }
    assert!(rendered.text.contains("logs.prod -> logs-prod"));
}

#[tokio::test]
async fn test_plan_only_with_copy_requested_marks_copy_skipped() {
    let provider = MemoryStorageProvider::new();

    let mut request = common::request(&["media.eu"], true);
    request.plan_only = true;
    let report = common::run(&provider, &request).await;

    let rendered = report.render();
    assert_eq!(rendered.json["buckets"][0]["copy_status"], "skipped");
    assert_eq!(provider.mutations(), 0);
}

#[tokio::test]
async fn test_mapping_keys_keep_request_order() {
    let provider = MemoryStorageProvider::new();
    let mut request = common::request(&["z.last", "a.first", "m.middle"], false);
    request.plan_only = true;

    let report = common::run(&provider, &request).await;
    let json = report.render().json;
    let keys: Vec<_> = json["mapping"].as_object().unwrap().keys().cloned().collect();
    assert_eq!(keys, vec!["z.last", "a.first", "m.middle"]);
}

#[tokio::test]
async fn test_duplicate_targets_abort_before_any_change() {
    let provider = MemoryStorageProvider::new();
    provider.seed_bucket("a.b", BucketSettingsSnapshot::default());
    provider.seed_bucket("a-b", BucketSettingsSnapshot::default());

    let err = common::migrator(&provider)
        .migrate(&NamingPolicy::default(), &common::request(&["a.b", "a-b"], true))
        .await
        .unwrap_err();

    let MigrateError::Naming(naming) = err;
    assert!(matches!(naming, NamingError::DuplicateTarget(_)));
    assert!(naming.to_string().contains("a-b"));
    assert_eq!(provider.mutations(), 0);
}

#[tokio::test]
async fn test_invalid_target_name_aborts_run() {
    let provider = MemoryStorageProvider::new();
    provider.seed_bucket("ok.bucket", BucketSettingsSnapshot::default());

    let err = common::migrator(&provider)
        .migrate(
            &NamingPolicy::default(),
            &common::request(&["ok.bucket", "Bad.Name"], false),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, MigrateError::Naming(NamingError::InvalidNames(_))));
    assert!(!provider.has_bucket("ok-bucket"));
}
