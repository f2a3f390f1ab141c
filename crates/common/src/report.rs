//! Plan and run reports
//!
//! [`render`] is pure formatting: given a plan and, optionally, the
//! outcomes of running it, it produces a text rendering for people and a
//! JSON document for machines. Without outcomes the report is in "plan"
//! mode; with them, "applied" mode adds each bucket's status, locator and
//! object counts.

use serde_json::{json, Map, Value};

use crate::migrate::{BucketOutcome, BucketStatus, CopyStatus};
use crate::plan::{MigrationPlan, PlanEntry};
use crate::settings::FacetKind;

#[derive(Debug, Clone)]
pub struct RenderedReport {
    pub text: String,
    pub json: Value,
}

/// Render `plan`, in applied mode when `outcomes` is given.
///
/// `outcomes` must be in plan order, one per entry.
pub fn render(plan: &MigrationPlan, outcomes: Option<&[BucketOutcome]>) -> RenderedReport {
    match outcomes {
        None => render_plan(plan),
        Some(outcomes) => render_applied(plan, outcomes),
    }
}

fn facet_names(kinds: &[FacetKind]) -> Vec<String> {
    kinds.iter().map(|k| k.to_string()).collect()
}

fn copy_intention(entry: &PlanEntry) -> CopyStatus {
    if entry.copy_requested {
        CopyStatus::Skipped("plan only".to_string())
    } else {
        CopyStatus::NotRequested
    }
}

fn mapping_json(plan: &MigrationPlan) -> Value {
    let mapping: Map<String, Value> = plan
        .mapping()
        .map(|(source, target)| (source.to_string(), Value::String(target.to_string())))
        .collect();
    Value::Object(mapping)
}

fn render_plan(plan: &MigrationPlan) -> RenderedReport {
    let mut text = format!(
        "Migration plan: {} bucket(s), region {}{}\n",
        plan.len(),
        plan.region(),
        if plan.is_plan_only() { " (plan only)" } else { "" }
    );

    let mut buckets = Vec::with_capacity(plan.len());
    for entry in plan.entries() {
        let facets = facet_names(&entry.facets.facets());
        let copy = copy_intention(entry);
        let intention = match &copy {
            CopyStatus::Skipped(reason) => format!("requested, {} ({})", copy.marker(), reason),
            other => other.marker().to_string(),
        };

        text.push_str(&format!(
            "  {} -> {}\n    facets: {}\n    copy:   {}\n",
            entry.mapping.source,
            entry.mapping.target,
            facets.join(", "),
            intention
        ));

        buckets.push(json!({
            "source": entry.mapping.source.as_str(),
            "target": entry.mapping.target.as_str(),
            "facets": facets,
            "copy_requested": entry.copy_requested,
            "copy_status": copy.marker(),
        }));
    }

    let json = json!({
        "mode": "plan",
        "region": plan.region(),
        "plan_only": plan.is_plan_only(),
        "tags": plan.tags(),
        "mapping": mapping_json(plan),
        "buckets": buckets,
    });

    RenderedReport { text, json }
}

fn render_applied(plan: &MigrationPlan, outcomes: &[BucketOutcome]) -> RenderedReport {
    let count = |status: BucketStatus| outcomes.iter().filter(|o| o.status == status).count();
    let succeeded = count(BucketStatus::Succeeded);
    let partial = count(BucketStatus::PartiallyApplied);
    let failed = count(BucketStatus::Failed);
    let cancelled = count(BucketStatus::Cancelled);

    let mut text = format!(
        "Migration report: {} bucket(s), region {}: {} succeeded, {} partially applied, {} failed, {} cancelled\n",
        outcomes.len(),
        plan.region(),
        succeeded,
        partial,
        failed,
        cancelled
    );

    let mut buckets = Vec::with_capacity(outcomes.len());
    for outcome in outcomes {
        text.push_str(&format!(
            "  {} -> {} [{}]\n    locator:  {}\n",
            outcome.mapping.source,
            outcome.mapping.target,
            outcome.status.as_str(),
            outcome.locator
        ));

        if let Some(provisioning) = &outcome.provisioning {
            let mut line = String::new();
            if provisioning.created {
                line.push_str("created; ");
            }
            line.push_str(&format!(
                "applied: {}; unchanged: {}",
                join_or_none(&facet_names(&provisioning.applied)),
                join_or_none(&facet_names(&provisioning.unchanged)),
            ));
            text.push_str(&format!("    settings: {}\n", line));
        }

        let copy_line = match &outcome.copy {
            CopyStatus::Succeeded(result) | CopyStatus::Failed(result) => format!(
                "{} ({} copied, {} skipped)",
                outcome.copy.marker(),
                result.objects_copied,
                result.objects_skipped
            ),
            CopyStatus::Skipped(reason) => format!("skipped ({})", reason),
            CopyStatus::NotRequested => outcome.copy.marker().to_string(),
        };
        text.push_str(&format!("    copy:     {}\n", copy_line));

        if let Some(error) = &outcome.error {
            text.push_str(&format!("    error:    {}\n", error));
        }

        let copy_result = outcome.copy.result();
        buckets.push(json!({
            "source": outcome.mapping.source.as_str(),
            "target": outcome.mapping.target.as_str(),
            "locator": outcome.locator,
            "status": outcome.status,
            "snapshot": outcome.snapshot,
            "provisioning": outcome.provisioning,
            "copy_status": outcome.copy.marker(),
            "objects_copied": copy_result.map(|r| r.objects_copied),
            "objects_skipped": copy_result.map(|r| r.objects_skipped),
            "copy_detail": match &outcome.copy {
                CopyStatus::Skipped(reason) => Some(reason.clone()),
                other => other.result().and_then(|r| r.error_detail.clone()),
            },
            "error": outcome.error.as_ref().map(|e| json!({
                "kind": e.kind(),
                "message": e.to_string(),
            })),
        }));
    }

    let json = json!({
        "mode": "applied",
        "region": plan.region(),
        "tags": plan.tags(),
        "mapping": mapping_json(plan),
        "summary": {
            "succeeded": succeeded,
            "partially_applied": partial,
            "failed": failed,
            "cancelled": cancelled,
        },
        "buckets": buckets,
    });

    RenderedReport { text, json }
}

fn join_or_none(names: &[String]) -> String {
    if names.is_empty() {
        "none".to_string()
    } else {
        names.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BucketError;
    use crate::naming::{NamingPolicy, SourceName};
    use crate::plan::MigrationRequest;
    use crate::provider::{ProviderError, Tags};
    use crate::replicator::CopyResult;
    use crate::settings::FacetSelection;

    fn plan(copy_data: bool, plan_only: bool) -> MigrationPlan {
        MigrationPlan::build(
            &NamingPolicy::default(),
            &MigrationRequest {
                sources: vec![
                    SourceName::from("my.company.logs"),
                    SourceName::from("dev.application.data"),
                ],
                copy_data,
                plan_only,
                region: "us-east-1".to_string(),
                tags: Tags::new(),
                facets: FacetSelection {
                    lifecycle: true,
                    cors: false,
                },
            },
        )
        .unwrap()
    }

    #[test]
    fn test_plan_mode() {
        let report = render(&plan(false, true), None);

        assert_eq!(report.json["mode"], "plan");
        assert_eq!(
            report.json["mapping"],
            json!({
                "my.company.logs": "my-company-logs",
                "dev.application.data": "dev-application-data",
            })
        );
        let keys: Vec<_> = report.json["mapping"]
            .as_object()
            .unwrap()
            .keys()
            .cloned()
            .collect();
        assert_eq!(keys, vec!["my.company.logs", "dev.application.data"]);
        assert_eq!(report.json["buckets"][0]["copy_status"], "not requested");
        assert_eq!(
            report.json["buckets"][1]["facets"],
            json!(["versioning", "encryption", "public-access-block", "lifecycle"])
        );

        assert!(report.text.contains("my.company.logs -> my-company-logs"));
        assert!(report.text.contains("copy:   not requested"));
        assert!(report.text.contains("(plan only)"));
    }

    #[test]
    fn test_plan_mode_with_copy_requested() {
        let report = render(&plan(true, true), None);
        assert_eq!(report.json["buckets"][0]["copy_requested"], true);
        assert!(report.text.contains("copy:   requested"));
    }

    #[test]
    fn test_applied_mode() {
        let plan = plan(true, false);
        let entries = plan.entries();
        let outcomes = vec![
            BucketOutcome {
                mapping: entries[0].mapping.clone(),
                locator: "arn:aws:s3:::my-company-logs".to_string(),
                status: BucketStatus::Succeeded,
                snapshot: None,
                provisioning: None,
                copy: CopyStatus::Succeeded(CopyResult {
                    succeeded: true,
                    objects_copied: 12,
                    objects_skipped: 3,
                    error_detail: None,
                }),
                error: None,
            },
            BucketOutcome {
                mapping: entries[1].mapping.clone(),
                locator: "arn:aws:s3:::dev-application-data".to_string(),
                status: BucketStatus::Failed,
                snapshot: None,
                provisioning: None,
                copy: CopyStatus::Skipped("not reached".to_string()),
                error: Some(BucketError::SourceUnavailable {
                    bucket: "dev.application.data".to_string(),
                    cause: ProviderError::BucketNotFound("dev.application.data".to_string()),
                }),
            },
        ];

        let report = render(&plan, Some(&outcomes));
        assert_eq!(report.json["mode"], "applied");
        assert_eq!(report.json["summary"]["succeeded"], 1);
        assert_eq!(report.json["summary"]["failed"], 1);
        assert_eq!(report.json["buckets"][0]["objects_copied"], 12);
        assert_eq!(report.json["buckets"][0]["status"], "succeeded");
        assert_eq!(
            report.json["buckets"][1]["error"]["kind"],
            "source_unavailable"
        );
        assert_eq!(report.json["buckets"][1]["copy_status"], "skipped");

        assert!(report.text.contains("[succeeded]"));
        assert!(report.text.contains("succeeded (12 copied, 3 skipped)"));
        assert!(report.text.contains("locator:  arn:aws:s3:::dev-application-data"));
    }
}
