//! Integration tests for object copy within migration runs

mod common;

use std::sync::Arc;
use std::time::Duration;

use ::common::prelude::*;

const OBJECTS: &[(&str, &str)] = &[
    ("index.html", "<html></html>"),
    ("css/site.css", "body {}"),
    ("img/logo.png", "png-bytes"),
    ("img/icons/a.svg", "<svg/>"),
    ("data/2024/01.json", "{}"),
    ("data/2024/02.json", "{\"n\": 2}"),
];

fn seeded() -> MemoryStorageProvider {
    let provider = MemoryStorageProvider::new();
    common::seed_bucket_with_objects(
        &provider,
        "www.example",
        BucketSettingsSnapshot::default(),
        OBJECTS,
    );
    provider
}

#[tokio::test]
async fn test_copy_transfers_every_object() {
    let provider = seeded();

    let report = common::run(&provider, &common::request(&["www.example"], true)).await;
    assert!(report.is_success());

    let outcome = &report.outcomes.as_ref().unwrap()[0];
    let result = match &outcome.copy {
        CopyStatus::Succeeded(result) => result,
        other => panic!("unexpected copy status: {other:?}"),
    };
    assert_eq!(result.objects_copied, OBJECTS.len() as u64);
    assert_eq!(result.objects_skipped, 0);
    assert_eq!(provider.objects("www-example"), provider.objects("www.example"));

    let json = report.render().json;
    assert_eq!(json["buckets"][0]["copy_status"], "succeeded");
    assert_eq!(json["buckets"][0]["objects_copied"], OBJECTS.len() as u64);
}

#[tokio::test]
async fn test_copy_rerun_skips_identical_objects() {
    let provider = seeded();
    let request = common::request(&["www.example"], true);
    common::run(&provider, &request).await;

    provider.seed_object("www.example", "index.html", "<html>v2</html>");
    let before = provider.mutations();

    let report = common::run(&provider, &request).await;
    assert!(report.is_success());

    let result = report.outcomes.as_ref().unwrap()[0].copy.result().unwrap().clone();
    assert_eq!(result.objects_copied, 1);
    assert_eq!(result.objects_skipped, OBJECTS.len() as u64 - 1);
    assert_eq!(provider.mutations(), before + 1);
    assert_eq!(
        provider.objects("www-example").get("index.html").unwrap().as_ref(),
        b"<html>v2</html>"
    );
}

#[tokio::test]
async fn test_interrupted_copy_is_retried_to_completion() {
    let provider = seeded();
    provider.fail_copy_after("www.example", 2);

    let report = common::run(&provider, &common::request(&["www.example"], true)).await;
    assert!(report.is_success());

    let result = report.outcomes.as_ref().unwrap()[0].copy.result().unwrap().clone();
    assert!(result.succeeded);
    assert_eq!(
        result.objects_copied + result.objects_skipped,
        OBJECTS.len() as u64
    );
    assert_eq!(provider.objects("www-example"), provider.objects("www.example"));
}

#[tokio::test]
async fn test_failed_copy_converges_on_next_run() {
    let provider = seeded();
    provider.fail_copy_after("www.example", 2);

    let single_attempt = MigrationConfig {
        copy_attempts: 1,
        ..common::fast_config()
    };
    let request = common::request(&["www.example"], true);
    let report = Migrator::new(Arc::new(provider.clone()), single_attempt)
        .migrate(&NamingPolicy::default(), &request)
        .await
        .unwrap();

    let outcome = &report.outcomes.as_ref().unwrap()[0];
    assert_eq!(outcome.status, BucketStatus::PartiallyApplied);
    assert!(matches!(outcome.copy, CopyStatus::Failed(_)));
    assert!(matches!(outcome.error, Some(BucketError::CopyFailure(_))));
    assert_eq!(report.render().json["buckets"][0]["copy_status"], "failed");

    let rerun = common::run(&provider, &request).await;
    assert!(rerun.is_success());
    assert_eq!(provider.objects("www-example"), provider.objects("www.example"));
}

#[tokio::test]
async fn test_objects_from_earlier_attempts_stay_reported() {
    let provider = seeded();
    provider.fail_copy_after("www.example", 2);
    let observed = common::ObservedProvider::new(provider.clone()).revoke_source_on_copy_failure();

    let config = MigrationConfig {
        object_concurrency: 1,
        ..common::fast_config()
    };
    let report = Migrator::new(Arc::new(observed), config)
        .migrate(
            &NamingPolicy::default(),
            &common::request(&["www.example"], true),
        )
        .await
        .unwrap();

    let outcome = &report.outcomes.as_ref().unwrap()[0];
    assert_eq!(outcome.status, BucketStatus::PartiallyApplied);
    assert!(matches!(
        outcome.error,
        Some(BucketError::Precondition { ref bucket, .. }) if bucket == "www.example"
    ));
    let result = match &outcome.copy {
        CopyStatus::Failed(result) => result,
        other => panic!("unexpected copy status: {other:?}"),
    };
    assert_eq!(result.objects_copied, 2);
    assert_eq!(provider.objects("www-example").len(), 2);
    assert!(result.error_detail.as_deref().unwrap().contains("www.example"));

    let json = report.render().json;
    assert_eq!(json["buckets"][0]["copy_status"], "failed");
    assert_eq!(json["buckets"][0]["objects_copied"], 2);
}

#[tokio::test]
async fn test_copy_not_requested_leaves_target_empty() {
    let provider = seeded();

    let report = common::run(&provider, &common::request(&["www.example"], false)).await;
    assert!(report.is_success());
    assert_eq!(
        report.outcomes.as_ref().unwrap()[0].copy,
        CopyStatus::NotRequested
    );
    assert!(provider.has_bucket("www-example"));
    assert!(provider.objects("www-example").is_empty());
}

#[tokio::test]
async fn test_many_buckets_under_a_small_concurrency_cap() {
    let provider = MemoryStorageProvider::new();
    let names: Vec<String> = (0..10).map(|i| format!("bucket.{i:02}")).collect();
    for name in &names {
        common::seed_bucket_with_objects(
            &provider,
            name,
            BucketSettingsSnapshot::default(),
            &[("a", "1"), ("b", "2")],
        );
    }

    let config = MigrationConfig {
        concurrency: 2,
        ..common::fast_config()
    };
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let report = Migrator::new(Arc::new(provider.clone()), config)
        .migrate(&NamingPolicy::default(), &common::request(&refs, true))
        .await
        .unwrap();

    assert!(report.is_success());
    let targets: Vec<_> = report
        .outcomes
        .as_ref()
        .unwrap()
        .iter()
        .map(|o| o.mapping.target.as_str().to_string())
        .collect();
    let expected: Vec<_> = names.iter().map(|n| n.replace('.', "-")).collect();
    assert_eq!(targets, expected);
    for target in &expected {
        assert_eq!(provider.objects(target).len(), 2);
    }
}

#[tokio::test(start_paused = true)]
async fn test_concurrency_cap_bounds_active_pipelines() {
    let provider = MemoryStorageProvider::new();
    let names: Vec<String> = (0..8).map(|i| format!("slow.{i}")).collect();
    for name in &names {
        provider.seed_bucket(name, BucketSettingsSnapshot::default());
    }
    let observed = Arc::new(
        common::ObservedProvider::new(provider.clone()).with_read_delay(Duration::from_millis(50)),
    );

    let config = MigrationConfig {
        concurrency: 2,
        ..common::fast_config()
    };
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let report = Migrator::new(observed.clone(), config)
        .migrate(&NamingPolicy::default(), &common::request(&refs, false))
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(observed.peak_reading(), 2);
}
