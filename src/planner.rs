//! Plan building: turning scanned files and a profile into concrete
//! source → destination operations.
//!
//! Planning is a pure function of the records, the profile and the size
//! tiers, so a preview computed now matches what execution will do later
//! (as long as the filesystem does not change in between).

use crate::rule::Profile;
use crate::scan::FileRecord;
use crate::tags::SizeTiers;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Whether a file is duplicated into place or relocated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    #[default]
    Copy,
    Move,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Copy => f.write_str("copy"),
            OperationKind::Move => f.write_str("move"),
        }
    }
}

/// A single file could not be planned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("destination '{rendered}' for {} escapes the output root", path.display())]
    PathEscape { path: PathBuf, rendered: String },
}

/// One resolved source → destination operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedOperation {
    pub source: FileRecord,
    /// Name of the rule that routed this file.
    pub rule: String,
    /// Destination relative to the output root, including the file name.
    pub relative: PathBuf,
    /// `relative` joined under the output root.
    pub destination: PathBuf,
    pub kind: OperationKind,
}

/// A record that was left out of the plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanRejection {
    /// Position of the record in the planner's input.
    pub index: usize,
    pub source: PathBuf,
    pub rule: String,
    pub reason: String,
    #[serde(skip)]
    pub error: PlanError,
}

/// Ordered operations plus the records that could not be planned.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Plan {
    pub output_root: PathBuf,
    pub operations: Vec<PlannedOperation>,
    pub rejected: Vec<PlanRejection>,
}

impl Plan {
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Operation counts per top-level destination folder.
    pub fn summary(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for op in &self.operations {
            let folder = match op.relative.components().count() {
                0 | 1 => ".".to_string(),
                _ => op
                    .relative
                    .components()
                    .next()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .unwrap_or_default(),
            };
            *counts.entry(folder).or_insert(0) += 1;
        }
        counts
    }

    /// Destinations targeted by more than one operation.
    pub fn shared_destinations(&self) -> Vec<&Path> {
        let mut seen: HashMap<&Path, usize> = HashMap::new();
        for op in &self.operations {
            *seen.entry(op.destination.as_path()).or_insert(0) += 1;
        }
        let mut shared: Vec<&Path> = seen
            .into_iter()
            .filter(|(_, count)| *count > 1)
            .map(|(path, _)| path)
            .collect();
        shared.sort();
        shared
    }
}

#[derive(Debug, Clone)]
pub struct PlanOptions {
    pub output_root: PathBuf,
    pub operation: OperationKind,
}

/// Applies a [`Profile`] to scanned records.
pub struct Planner<'a> {
    profile: &'a Profile,
    tiers: &'a SizeTiers,
    options: PlanOptions,
}

impl<'a> Planner<'a> {
    pub fn new(profile: &'a Profile, tiers: &'a SizeTiers, options: PlanOptions) -> Self {
        Self {
            profile,
            tiers,
            options,
        }
    }

    /// Plans a single record.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError::PathEscape`] if the rendered destination would
    /// leave the output root.
    pub fn plan_record(&self, record: &FileRecord) -> Result<PlannedOperation, PlanError> {
        let rule = self.profile.select_rule(record);
        let rendered = rule.render(record, self.tiers);

        let folder = normalize_relative(&rendered).ok_or_else(|| PlanError::PathEscape {
            path: record.path.clone(),
            rendered: rendered.clone(),
        })?;
        let relative = folder.join(&record.file_name);
        let destination = self.options.output_root.join(&relative);

        debug!(
            source = %record.path.display(),
            rule = rule.name(),
            destination = %relative.display(),
            "planned"
        );

        Ok(PlannedOperation {
            source: record.clone(),
            rule: rule.name().to_string(),
            relative,
            destination,
            kind: self.options.operation,
        })
    }

    /// Plans every record in parallel, preserving input order.
    pub fn plan(&self, records: &[FileRecord]) -> Plan {
        let results: Vec<Result<PlannedOperation, PlanError>> = records
            .par_iter()
            .map(|record| self.plan_record(record))
            .collect();

        let mut plan = Plan {
            output_root: self.options.output_root.clone(),
            ..Default::default()
        };
        for (index, (record, result)) in records.iter().zip(results).enumerate() {
            match result {
                Ok(op) => plan.operations.push(op),
                Err(error) => {
                    warn!("{error}");
                    plan.rejected.push(PlanRejection {
                        index,
                        source: record.path.clone(),
                        rule: self.profile.select_rule(record).name().to_string(),
                        reason: error.to_string(),
                        error,
                    });
                }
            }
        }

        info!(
            profile = self.profile.name(),
            planned = plan.operations.len(),
            rejected = plan.rejected.len(),
            "plan built"
        );
        plan
    }
}

/// Normalizes a rendered folder path into a relative path without `..`.
///
/// Empty and `.` segments are dropped, `..` removes the previous segment.
/// Returns `None` if the path would climb above its root or contains a
/// segment that is not a plain file name (such as a drive prefix).
pub fn normalize_relative(rendered: &str) -> Option<PathBuf> {
    let mut parts: Vec<&str> = Vec::new();
    for part in rendered.split(['/', '\\']) {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            _ => {
                let plain = Path::new(part)
                    .components()
                    .all(|c| matches!(c, Component::Normal(_)));
                if !plain {
                    return None;
                }
                parts.push(part);
            }
        }
    }
    Some(parts.iter().collect())
}
