//! Merging a second dataset into a base dataset, oversampling `train`.
//!
//! Pairs are copied from `new_root/<split>/{images,labels}` into the base
//! dataset's split directories under a filename prefix, so they cannot collide
//! with existing files. In `train` every pair is copied `oversample` times.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::YoloprepError;
use crate::layout::{collect_image_pairs, SplitDirs, SplitLayout, DEFAULT_SPLITS, LABEL_EXTENSION};
use crate::rewrite::require_root;

/// The split that gets oversampled.
pub const OVERSAMPLED_SPLIT: &str = "train";

/// Options for [`merge_datasets`].
#[derive(Clone, Debug)]
pub struct MergeOptions {
    pub new_root: PathBuf,
    pub base_root: PathBuf,
    /// Copies made of each `train` pair. Must be at least 1.
    pub oversample: usize,
    pub prefix: String,
    pub splits: Vec<String>,
    /// Delete stale Ultralytics label caches in the base dataset.
    pub clear_cache: bool,
    pub dry_run: bool,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            new_root: PathBuf::new(),
            base_root: PathBuf::new(),
            oversample: 2,
            prefix: "f1_".to_string(),
            splits: DEFAULT_SPLITS.iter().map(|s| s.to_string()).collect(),
            clear_cache: false,
            dry_run: false,
        }
    }
}

/// What a merge did.
#[derive(Clone, Debug, Default, Serialize)]
pub struct MergeReport {
    pub new_root: PathBuf,
    pub base_root: PathBuf,
    pub oversample: usize,
    pub prefix: String,
    pub dry_run: bool,
    pub splits: Vec<MergeSplitSummary>,
    pub warnings: Vec<String>,
    /// Label caches that are now stale (or were, before `clear_cache`).
    pub stale_caches: Vec<PathBuf>,
    pub cleared_caches: Vec<PathBuf>,
}

impl MergeReport {
    pub fn split(&self, split: &str) -> Option<&MergeSplitSummary> {
        self.splits.iter().find(|summary| summary.split == split)
    }

    pub fn total_copied(&self) -> usize {
        self.splits.iter().map(|summary| summary.copied).sum()
    }

    pub fn failed_count(&self) -> usize {
        self.splits.iter().map(|summary| summary.failed).sum()
    }

    pub fn total_pairs(&self) -> usize {
        self.splits
            .iter()
            .map(|summary| summary.copied + summary.unlabeled + summary.failed)
            .sum()
    }

    fn warn(&mut self, message: String) {
        tracing::warn!("{}", message);
        self.warnings.push(message);
    }
}

impl fmt::Display for MergeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "New dataset root : {}", self.new_root.display())?;
        writeln!(f, "Base dataset root: {}", self.base_root.display())?;
        writeln!(f, "Oversample factor ({}): {}", OVERSAMPLED_SPLIT, self.oversample)?;
        writeln!(f)?;

        for warning in &self.warnings {
            writeln!(f, "[WARN] {}", warning)?;
        }
        for summary in &self.splits {
            writeln!(f, "[OK] {}", summary)?;
        }

        if !self.cleared_caches.is_empty() {
            writeln!(f)?;
            writeln!(f, "Removed stale label caches:")?;
            for cache in &self.cleared_caches {
                writeln!(f, "  {}", cache.display())?;
            }
        } else if !self.stale_caches.is_empty() {
            writeln!(f)?;
            writeln!(
                f,
                "[NOTE] Delete these label caches so training sees the new data (or rerun with --clear-cache):"
            )?;
            for cache in &self.stale_caches {
                writeln!(f, "  rm {}", cache.display())?;
            }
        }

        if self.dry_run {
            writeln!(f)?;
            writeln!(f, "Dry run: nothing was copied or deleted.")?;
        }
        Ok(())
    }
}

/// Counts for one merged split.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MergeSplitSummary {
    pub split: String,
    /// Copies per source pair in this split.
    pub repeat: usize,
    /// Image+label pairs written (counting every oversampled copy).
    pub copied: usize,
    /// Source images skipped because they have no label file.
    pub unlabeled: usize,
    pub failed: usize,
}

impl fmt::Display for MergeSplitSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let factor = if self.split == OVERSAMPLED_SPLIT {
            format!("x{}", self.repeat)
        } else {
            "no oversample".to_string()
        };
        write!(
            f,
            "Split '{}': copied {} image+label pairs ({})",
            self.split, self.copied, factor
        )?;
        if self.unlabeled > 0 {
            write!(f, ", {} unlabeled skipped", self.unlabeled)?;
        }
        if self.failed > 0 {
            write!(f, ", {} failed", self.failed)?;
        }
        Ok(())
    }
}

/// File stem of the `copy_index`-th copy: `<prefix><stem>`, then
/// `<prefix><stem>_dup1`, `<prefix><stem>_dup2`, ...
pub fn merged_stem(prefix: &str, stem: &str, copy_index: usize) -> String {
    if copy_index == 0 {
        format!("{prefix}{stem}")
    } else {
        format!("{prefix}{stem}_dup{copy_index}")
    }
}

/// Ultralytics caches the parsed labels of a split next to its labels dir.
pub fn label_cache_path(root: &Path, split: &str, layout: SplitLayout) -> PathBuf {
    match layout {
        SplitLayout::Flat => root.join("labels").join(format!("{split}.cache")),
        SplitLayout::Nested => root.join(split).join("labels.cache"),
    }
}

/// Merge `new_root` into `base_root`.
pub fn merge_datasets(opts: &MergeOptions) -> Result<MergeReport, YoloprepError> {
    if opts.oversample == 0 {
        return Err(YoloprepError::InvalidArguments {
            message: "--oversample must be at least 1".to_string(),
        });
    }
    require_root(&opts.new_root)?;
    require_root(&opts.base_root)?;

    let mut report = MergeReport {
        new_root: opts.new_root.clone(),
        base_root: opts.base_root.clone(),
        oversample: opts.oversample,
        prefix: opts.prefix.clone(),
        dry_run: opts.dry_run,
        ..Default::default()
    };

    for split in &opts.splits {
        let source = SplitDirs::resolve(&opts.new_root, split, None)
            .filter(|dirs| dirs.images_dir.is_dir() && dirs.labels_dir.is_dir());
        let Some(source) = source else {
            report.warn(format!(
                "Skipping split '{split}': missing images or labels folder."
            ));
            continue;
        };

        let base_layout = SplitLayout::detect(&opts.base_root, split).unwrap_or(SplitLayout::Flat);
        let target = SplitDirs::new(&opts.base_root, split, base_layout);
        let repeat = if split == OVERSAMPLED_SPLIT {
            opts.oversample
        } else {
            1
        };

        let summary = merge_split(&source, &target, repeat, opts, &mut report)?;
        report.splits.push(summary);

        let cache = label_cache_path(&opts.base_root, split, base_layout);
        if cache.is_file() {
            report.stale_caches.push(cache);
        }
    }

    if opts.clear_cache && !opts.dry_run {
        for cache in &report.stale_caches {
            fs::remove_file(cache).map_err(|e| YoloprepError::io_at(cache, e))?;
            tracing::info!(cache = %cache.display(), "removed stale label cache");
        }
        report.cleared_caches = report.stale_caches.clone();
    }

    Ok(report)
}

fn merge_split(
    source: &SplitDirs,
    target: &SplitDirs,
    repeat: usize,
    opts: &MergeOptions,
    report: &mut MergeReport,
) -> Result<MergeSplitSummary, YoloprepError> {
    if !opts.dry_run {
        fs::create_dir_all(&target.images_dir)
            .map_err(|e| YoloprepError::io_at(&target.images_dir, e))?;
        fs::create_dir_all(&target.labels_dir)
            .map_err(|e| YoloprepError::io_at(&target.labels_dir, e))?;
    }

    let mut summary = MergeSplitSummary {
        split: source.name.clone(),
        repeat,
        ..Default::default()
    };

    for pair in collect_image_pairs(&source.images_dir, &source.labels_dir)? {
        let (Some(image), Some(label)) = (&pair.image, &pair.label) else {
            let name = pair
                .image
                .as_deref()
                .and_then(Path::file_name)
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| pair.stem.clone());
            report.warn(format!("No label for {name}, skipping."));
            summary.unlabeled += 1;
            continue;
        };
        let ext = image
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();

        for copy_index in 0..repeat {
            let stem = merged_stem(&opts.prefix, &pair.stem, copy_index);
            let image_dst = target.images_dir.join(format!("{stem}{ext}"));
            let label_dst = target.labels_dir.join(format!("{stem}.{LABEL_EXTENSION}"));

            if opts.dry_run {
                summary.copied += 1;
                continue;
            }

            let copied = fs::copy(image, &image_dst)
                .map_err(|e| YoloprepError::io_at(&image_dst, e))
                .and_then(|_| {
                    fs::copy(label, &label_dst).map_err(|e| YoloprepError::io_at(&label_dst, e))
                });
            match copied {
                Ok(_) => summary.copied += 1,
                Err(err) => {
                    summary.failed += 1;
                    report.warn(format!("[{}] {}: {}", source.name, stem, err));
                }
            }
        }
    }

    Ok(summary)
}
