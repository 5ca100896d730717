//! Rewrite report types for tracking what a filter or remap run did.
//!
//! Mirrors the structure of the other reports in this crate: counts per split
//! plus a list of issues, printable as text or serializable as JSON.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

use super::{PairOutcome, SkipReason};

/// A report generated by a filter or remap run.
#[derive(Clone, Debug, Default, Serialize)]
pub struct RewriteReport {
    /// Operation name (`filter` or `remap`).
    pub operation: String,
    /// Dataset root that was read.
    pub source: PathBuf,
    /// Dataset root that was written (equal to `source` for in-place runs).
    pub output: PathBuf,
    pub in_place: bool,
    pub dry_run: bool,
    /// Class names of the output manifest; position is the class ID.
    pub class_names: Vec<String>,
    /// Manifest that was (or would be) written.
    pub manifest: Option<PathBuf>,
    /// Per-split tallies, in processing order.
    pub splits: Vec<SplitTally>,
    /// Issues discovered during the run.
    pub issues: Vec<RewriteIssue>,
}

impl RewriteReport {
    /// Create a new empty report.
    pub fn new(operation: impl Into<String>, source: PathBuf, output: PathBuf) -> Self {
        Self {
            operation: operation.into(),
            in_place: source == output,
            source,
            output,
            ..Default::default()
        }
    }

    /// Add an issue to the report.
    pub fn add(&mut self, issue: RewriteIssue) {
        self.issues.push(issue);
    }

    /// Tally for `split`, if it was processed.
    pub fn split(&self, split: &str) -> Option<&SplitTally> {
        self.splits.iter().find(|tally| tally.split == split)
    }

    pub fn total_kept(&self) -> usize {
        self.splits.iter().map(|tally| tally.kept).sum()
    }

    /// Pairs that could not be processed because of I/O errors.
    pub fn failed_count(&self) -> usize {
        self.splits.iter().map(|tally| tally.failed).sum()
    }

    /// Every pair looked at, whatever happened to it.
    pub fn total_pairs(&self) -> usize {
        self.splits.iter().map(SplitTally::total).sum()
    }

    pub fn warning_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == RewriteSeverity::Warning)
            .count()
    }
}

impl fmt::Display for RewriteReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Summary:")?;
        for tally in &self.splits {
            writeln!(f, "  {}", tally)?;
        }

        if !self.issues.is_empty() {
            writeln!(f)?;
            for issue in &self.issues {
                writeln!(f, "{}", issue)?;
            }
        }

        writeln!(f)?;
        let verb = if self.dry_run { "would be" } else { "was" };
        if self.in_place {
            writeln!(f, "Dataset {} rewritten in place: {}", verb, self.output.display())?;
        } else {
            writeln!(f, "Dataset {} written to: {}", verb, self.output.display())?;
        }
        if let Some(manifest) = &self.manifest {
            writeln!(f, "   New YAML: {}", manifest.display())?;
        }
        writeln!(
            f,
            "   Classes ({}): {}",
            self.class_names.len(),
            self.class_names.join(", ")
        )?;

        Ok(())
    }
}

/// Counts for one split.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SplitTally {
    pub split: String,
    /// Pairs written with at least one surviving label line.
    pub kept: usize,
    /// Images without a label file.
    pub missing_label: usize,
    /// Label files without a matching image (copy mode only).
    pub missing_image: usize,
    /// Label files with no surviving lines (copy mode: nothing written).
    pub empty: usize,
    /// Label files deleted because no lines survived (in-place mode).
    pub removed: usize,
    /// Pairs that failed with an I/O error.
    pub failed: usize,
}

impl SplitTally {
    pub fn new(split: impl Into<String>) -> Self {
        Self {
            split: split.into(),
            ..Default::default()
        }
    }

    /// Record the outcome of one pair.
    pub fn record(&mut self, outcome: PairOutcome) {
        match outcome {
            PairOutcome::Kept => self.kept += 1,
            PairOutcome::Removed => self.removed += 1,
            PairOutcome::Skipped(SkipReason::MissingLabel) => self.missing_label += 1,
            PairOutcome::Skipped(SkipReason::MissingImage) => self.missing_image += 1,
            PairOutcome::Skipped(SkipReason::EmptyAfterTransform) => self.empty += 1,
        }
    }

    /// Pairs that produced no output, for whatever reason.
    pub fn skipped(&self) -> usize {
        self.missing_label + self.missing_image + self.empty + self.failed
    }

    pub fn total(&self) -> usize {
        self.kept + self.removed + self.skipped()
    }
}

impl fmt::Display for SplitTally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.removed > 0 {
            write!(
                f,
                "{}: kept {}, removed empty {}",
                self.split, self.kept, self.removed
            )?;
        } else {
            write!(
                f,
                "{}: kept {} images, skipped {}",
                self.split,
                self.kept,
                self.skipped()
            )?;
        }
        if self.failed > 0 {
            write!(f, " ({} failed)", self.failed)?;
        }
        Ok(())
    }
}

/// A single issue discovered during a rewrite.
#[derive(Clone, Debug, Serialize)]
pub struct RewriteIssue {
    pub severity: RewriteSeverity,
    pub code: RewriteIssueCode,
    pub message: String,
}

impl RewriteIssue {
    pub fn warning(code: RewriteIssueCode, message: impl Into<String>) -> Self {
        Self {
            severity: RewriteSeverity::Warning,
            code,
            message: message.into(),
        }
    }

    pub fn info(code: RewriteIssueCode, message: impl Into<String>) -> Self {
        Self {
            severity: RewriteSeverity::Info,
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for RewriteIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = match self.severity {
            RewriteSeverity::Warning => "WARN",
            RewriteSeverity::Info => "NOTE",
        };
        write!(f, "[{}] {}", severity, self.message)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RewriteSeverity {
    Warning,
    Info,
}

/// Stable issue codes for programmatic consumption.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RewriteIssueCode {
    /// The class selection that was applied.
    ClassSelection,
    /// A requested split does not exist and was not processed.
    SplitSkipped,
    /// A pair could not be read or written.
    PairFailed,
    /// Kept class IDs were not renumbered and do not index the new names.
    IdsNotRenumbered,
    /// No files were written or deleted.
    DryRun,
}
