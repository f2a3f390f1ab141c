use serde::Serialize;

use crate::naming::{NameMapping, NamingError, NamingPolicy, SourceName};
use crate::provider::Tags;
use crate::settings::FacetSelection;

/// Everything a caller asks of one run.
#[derive(Debug, Clone)]
pub struct MigrationRequest {
    /// Source bucket names, in the order they should be reported
    pub sources: Vec<SourceName>,
    pub copy_data: bool,
    /// Compute and report the mapping without touching any bucket
    pub plan_only: bool,
    /// Region new buckets are created in
    pub region: String,
    /// Tags merged into every target bucket
    pub tags: Tags,
    pub facets: FacetSelection,
}

/// One bucket's share of a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanEntry {
    pub mapping: NameMapping,
    pub facets: FacetSelection,
    pub copy_requested: bool,
}

/// The validated, ordered set of work for a run. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationPlan {
    entries: Vec<PlanEntry>,
    region: String,
    tags: Tags,
    plan_only: bool,
}

impl MigrationPlan {
    /// Validate the request's names and build the plan.
    ///
    /// Fails on any naming problem, before a single provider call.
    pub fn build(policy: &NamingPolicy, request: &MigrationRequest) -> Result<Self, NamingError> {
        let mappings = policy.map_batch(&request.sources)?;
        let entries = mappings
            .into_iter()
            .map(|mapping| PlanEntry {
                mapping,
                facets: request.facets,
                copy_requested: request.copy_data,
            })
            .collect();

        Ok(Self {
            entries,
            region: request.region.clone(),
            tags: request.tags.clone(),
            plan_only: request.plan_only,
        })
    }

    pub fn entries(&self) -> &[PlanEntry] {
        &self.entries
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn tags(&self) -> &Tags {
        &self.tags
    }

    pub fn is_plan_only(&self) -> bool {
        self.plan_only
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(source, target)` pairs in input order.
    pub fn mapping(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|e| (e.mapping.source.as_str(), e.mapping.target.as_str()))
    }
}
