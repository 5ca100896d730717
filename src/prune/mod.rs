//! Removing images that have no label file.
//!
//! [`plan_split`] only looks at the filesystem and lists what is unlabeled;
//! [`apply_prune`] deletes the listed files and logs each deletion.

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::YoloprepError;
use crate::layout::{
    file_stem_string, list_files, SplitDirs, SplitLayout, IMAGE_EXTENSIONS, LABEL_EXTENSION,
};
use crate::rewrite::require_root;

/// Options for [`prune_unlabeled`].
#[derive(Clone, Debug)]
pub struct PruneOptions {
    pub root: PathBuf,
    pub splits: Vec<String>,
    pub layout: Option<SplitLayout>,
    pub dry_run: bool,
}

/// Unlabeled images found in one split.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SplitPrunePlan {
    pub split: String,
    pub images: usize,
    pub labels: usize,
    /// Stems with at least one image but no label file.
    pub unlabeled_stems: Vec<String>,
    /// Every image file carrying an unlabeled stem.
    pub to_delete: Vec<PathBuf>,
    /// Stems with a label file but no image.
    pub orphan_labels: Vec<String>,
}

/// Compute what pruning `split` would delete.
pub fn plan_split(split: &SplitDirs) -> Result<SplitPrunePlan, YoloprepError> {
    let image_files = list_files(&split.images_dir, &IMAGE_EXTENSIONS)?;
    let label_files = list_files(&split.labels_dir, &[LABEL_EXTENSION])?;

    let image_stems: BTreeSet<String> = image_files
        .iter()
        .filter_map(|path| file_stem_string(path))
        .collect();
    let label_stems: BTreeSet<String> = label_files
        .iter()
        .filter_map(|path| file_stem_string(path))
        .collect();

    let unlabeled: BTreeSet<String> = image_stems.difference(&label_stems).cloned().collect();
    let to_delete = image_files
        .into_iter()
        .filter(|path| has_stem_in(path, &unlabeled))
        .collect();

    Ok(SplitPrunePlan {
        split: split.name.clone(),
        images: image_stems.len(),
        labels: label_stems.len(),
        unlabeled_stems: unlabeled.into_iter().collect(),
        to_delete,
        orphan_labels: label_stems.difference(&image_stems).cloned().collect(),
    })
}

/// Delete the files listed in `plan`. Returns how many were deleted; a file
/// that cannot be deleted is logged and counted in `failed`.
pub fn apply_prune(plan: &SplitPrunePlan, failed: &mut Vec<String>) -> usize {
    let mut deleted = 0;
    for path in &plan.to_delete {
        match fs::remove_file(path) {
            Ok(()) => {
                tracing::info!(split = %plan.split, image = %path.display(), "deleted unlabeled image");
                deleted += 1;
            }
            Err(err) => {
                let message = format!("Error deleting {}: {}", path.display(), err);
                tracing::warn!("{}", message);
                failed.push(message);
            }
        }
    }
    deleted
}

/// Result of pruning one split.
#[derive(Clone, Debug, Default, Serialize)]
pub struct SplitPruneSummary {
    #[serde(flatten)]
    pub plan: SplitPrunePlan,
    pub deleted: usize,
}

impl SplitPruneSummary {
    /// Image stems left after deletion.
    pub fn remaining(&self) -> usize {
        self.plan.images - self.plan.unlabeled_stems.len()
    }
}

/// What a prune run did.
#[derive(Clone, Debug, Default, Serialize)]
pub struct PruneReport {
    pub root: PathBuf,
    pub dry_run: bool,
    pub splits: Vec<SplitPruneSummary>,
    pub skipped_splits: Vec<String>,
    pub failures: Vec<String>,
}

impl PruneReport {
    pub fn split(&self, split: &str) -> Option<&SplitPruneSummary> {
        self.splits.iter().find(|summary| summary.plan.split == split)
    }

    pub fn total_deleted(&self) -> usize {
        self.splits.iter().map(|summary| summary.deleted).sum()
    }
}

impl fmt::Display for PruneReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Cleanup in: {}", self.root.display())?;
        for split in &self.skipped_splits {
            writeln!(
                f,
                "[WARN] Skipping split '{}': missing images or labels directory.",
                split
            )?;
        }

        for summary in &self.splits {
            let plan = &summary.plan;
            writeln!(f)?;
            writeln!(
                f,
                "[{}] Found {} images and {} label files.",
                plan.split, plan.images, plan.labels
            )?;
            if plan.unlabeled_stems.is_empty() {
                writeln!(f, "  All images have label files. No action needed.")?;
            } else if self.dry_run {
                writeln!(
                    f,
                    "  Would delete {} file(s) for {} unlabeled image(s):",
                    plan.to_delete.len(),
                    plan.unlabeled_stems.len()
                )?;
                for path in &plan.to_delete {
                    writeln!(f, "    {}", path.display())?;
                }
            } else {
                writeln!(f, "  Total deleted: {}", summary.deleted)?;
                writeln!(f, "  Remaining images: {}", summary.remaining())?;
            }
            if !plan.orphan_labels.is_empty() {
                writeln!(
                    f,
                    "  [WARN] {} label file(s) have no image: {}",
                    plan.orphan_labels.len(),
                    plan.orphan_labels.join(", ")
                )?;
            }
        }

        for failure in &self.failures {
            writeln!(f, "[WARN] {}", failure)?;
        }
        Ok(())
    }
}

/// Delete unlabeled images from every requested split.
pub fn prune_unlabeled(opts: &PruneOptions) -> Result<PruneReport, YoloprepError> {
    require_root(&opts.root)?;

    let mut report = PruneReport {
        root: opts.root.clone(),
        dry_run: opts.dry_run,
        ..Default::default()
    };

    for split_name in &opts.splits {
        let split = SplitDirs::resolve(&opts.root, split_name, opts.layout)
            .filter(|dirs| dirs.images_dir.is_dir() && dirs.labels_dir.is_dir());
        let Some(split) = split else {
            tracing::warn!(split = %split_name, "skipping split without images or labels directory");
            report.skipped_splits.push(split_name.clone());
            continue;
        };

        let plan = plan_split(&split)?;
        let deleted = if opts.dry_run {
            0
        } else {
            apply_prune(&plan, &mut report.failures)
        };
        report.splits.push(SplitPruneSummary { plan, deleted });
    }

    Ok(report)
}

fn has_stem_in(path: &Path, stems: &BTreeSet<String>) -> bool {
    file_stem_string(path).is_some_and(|stem| stems.contains(&stem))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dirs");
        }
        fs::write(path, b"x").expect("write file");
    }

    #[test]
    fn plan_lists_every_extension_of_unlabeled_stems() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let split = SplitDirs::new(temp.path(), "train", SplitLayout::Nested);
        touch(&split.images_dir.join("a.jpg"));
        touch(&split.images_dir.join("b.jpg"));
        touch(&split.images_dir.join("b.png"));
        touch(&split.labels_dir.join("a.txt"));
        touch(&split.labels_dir.join("c.txt"));

        let plan = plan_split(&split).expect("plan split");
        assert_eq!(plan.images, 2);
        assert_eq!(plan.labels, 2);
        assert_eq!(plan.unlabeled_stems, ["b"]);
        assert_eq!(
            plan.to_delete,
            vec![split.images_dir.join("b.jpg"), split.images_dir.join("b.png")]
        );
        assert_eq!(plan.orphan_labels, ["c"]);
    }

    #[test]
    fn non_image_files_are_never_planned_for_deletion() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let split = SplitDirs::new(temp.path(), "train", SplitLayout::Nested);
        touch(&split.images_dir.join("a.jpg"));
        touch(&split.images_dir.join(".DS_Store"));
        touch(&split.images_dir.join("README"));
        touch(&split.images_dir.join("notes.md"));
        touch(&split.labels_dir.join("a.txt"));

        let plan = plan_split(&split).expect("plan split");
        assert_eq!(plan.images, 1);
        assert!(plan.unlabeled_stems.is_empty());
        assert!(plan.to_delete.is_empty());

        let mut failures = Vec::new();
        assert_eq!(apply_prune(&plan, &mut failures), 0);
        assert!(split.images_dir.join(".DS_Store").is_file());
        assert!(split.images_dir.join("README").is_file());
        assert!(split.images_dir.join("notes.md").is_file());
    }

    #[test]
    fn apply_deletes_planned_files() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let split = SplitDirs::new(temp.path(), "valid", SplitLayout::Flat);
        touch(&split.images_dir.join("keep.jpg"));
        touch(&split.images_dir.join("drop.jpg"));
        touch(&split.labels_dir.join("keep.txt"));

        let plan = plan_split(&split).expect("plan split");
        let mut failures = Vec::new();
        assert_eq!(apply_prune(&plan, &mut failures), 1);
        assert!(failures.is_empty());
        assert!(split.images_dir.join("keep.jpg").is_file());
        assert!(!split.images_dir.join("drop.jpg").exists());
    }
}
