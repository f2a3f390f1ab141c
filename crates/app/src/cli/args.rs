pub use clap::Parser;

use std::path::{Path, PathBuf};

use clap::ValueEnum;
use common::prelude::{FacetSelection, RenderedReport, SourceName, Tags};

use crate::state::AppConfig;

#[derive(Parser, Debug)]
#[command(name = "rebucket")]
#[command(about = "Rename buckets by recreating them with their settings and data")]
#[command(version)]
pub struct Args {
    /// Path to the rebucket config directory (defaults to ~/.rebucket)
    #[arg(long, global = true)]
    pub config_path: Option<PathBuf>,

    /// How reports are printed
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: crate::Command,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl OutputFormat {
    pub fn render(&self, report: &RenderedReport) -> String {
        match self {
            OutputFormat::Text => report.text.clone(),
            OutputFormat::Json => serde_json::to_string_pretty(&report.json)
                .unwrap_or_else(|_| report.json.to_string()),
        }
    }
}

/// Source bucket names, from the command line and/or a file.
#[derive(clap::Args, Debug, Clone)]
pub struct BucketNames {
    /// Source bucket names
    pub names: Vec<String>,

    /// File with one source bucket name per line; `#` starts a comment
    #[arg(long)]
    pub names_file: Option<PathBuf>,
}

impl BucketNames {
    /// Command-line names first, then the file's, in order.
    pub fn load(&self) -> std::io::Result<Vec<SourceName>> {
        let mut names: Vec<SourceName> = self.names.iter().map(SourceName::new).collect();
        if let Some(path) = &self.names_file {
            names.extend(read_names_file(path)?);
        }
        Ok(names)
    }
}

fn read_names_file(path: &Path) -> std::io::Result<Vec<SourceName>> {
    let contents = std::fs::read_to_string(path)?;
    Ok(parse_names(&contents))
}

fn parse_names(contents: &str) -> Vec<SourceName> {
    contents
        .lines()
        .map(|line| line.split('#').next().unwrap_or_default().trim())
        .filter(|line| !line.is_empty())
        .map(SourceName::new)
        .collect()
}

/// What new buckets receive beyond the source's settings. Shared by `plan`
/// and `migrate` so a plan shows exactly what a run would apply.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct TargetOptions {
    /// Extra tag for every new bucket, as key=value (repeatable)
    #[arg(long = "tag", value_parser = parse_tag)]
    pub tags: Vec<(String, String)>,

    /// Leave lifecycle rules off the new buckets
    #[arg(long)]
    pub skip_lifecycle: bool,

    /// Leave CORS rules off the new buckets
    #[arg(long)]
    pub skip_cors: bool,
}

impl TargetOptions {
    /// Configured tags with the flag tags layered on top.
    pub fn tags(&self, config: &AppConfig) -> Tags {
        let mut tags = config.tags.clone();
        tags.extend(self.tags.iter().cloned());
        tags
    }

    pub fn facets(&self, config: &AppConfig) -> FacetSelection {
        let mut facets = config.facet_selection();
        facets.lifecycle &= !self.skip_lifecycle;
        facets.cors &= !self.skip_cors;
        facets
    }
}

/// Parse a `key=value` tag argument.
fn parse_tag(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("expected key=value, got '{}'", raw)),
    }
}
