//! The dataset split rewriter.
//!
//! Every label file of a split is run through a [`ClassTransform`]; pairs
//! with surviving lines are kept, the rest are dropped. Work per pair is split
//! into [`plan_pair`], which only reads, and [`apply_action`], which performs
//! the writes, copies and deletions, so a dry run can stop after planning.

pub mod report;

pub use report::{RewriteIssue, RewriteIssueCode, RewriteReport, RewriteSeverity, SplitTally};

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::YoloprepError;
use crate::label::{process_label_text, render_label_lines, ClassTransform};
use crate::layout::{
    collect_image_pairs, collect_label_pairs, SamplePair, SplitDirs, SplitLayout,
    LABEL_EXTENSION,
};
use crate::manifest::{fresh_manifest, Manifest, ManifestPaths, MANIFEST_FILE};
use crate::policy::ClassPolicy;

/// Splits the filter looks for, in order. `val` is dropped when `valid`
/// exists too.
pub const FILTER_CANDIDATE_SPLITS: [&str; 4] = ["train", "valid", "val", "test"];

/// Where kept pairs go.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Destination {
    /// Overwrite label files where they are; delete the ones that end up empty.
    InPlace,
    /// Copy images and write labels into these directories.
    Copy {
        images_dir: PathBuf,
        labels_dir: PathBuf,
    },
}

impl Destination {
    /// Flat-layout destination for `split` under `root`.
    pub fn copy_into(root: &Path, split: &str) -> Self {
        Destination::Copy {
            images_dir: SplitLayout::Flat.images_dir(root, split),
            labels_dir: SplitLayout::Flat.labels_dir(root, split),
        }
    }
}

/// Why a pair produced no output.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    MissingLabel,
    MissingImage,
    EmptyAfterTransform,
}

/// What happened (or would happen) to one pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PairOutcome {
    Kept,
    /// In-place label file deleted because nothing survived.
    Removed,
    Skipped(SkipReason),
}

/// The effect a pair will have, computed without touching the output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PairAction {
    Write {
        /// `(source, destination)` of the image copy; `None` in place.
        image_copy: Option<(PathBuf, PathBuf)>,
        label_path: PathBuf,
        contents: String,
    },
    RemoveLabel {
        label_path: PathBuf,
    },
    Skip(SkipReason),
}

impl PairAction {
    pub fn outcome(&self) -> PairOutcome {
        match self {
            PairAction::Write { .. } => PairOutcome::Kept,
            PairAction::RemoveLabel { .. } => PairOutcome::Removed,
            PairAction::Skip(reason) => PairOutcome::Skipped(*reason),
        }
    }
}

/// Read a pair's label file and decide what to do with it.
pub fn plan_pair<T>(
    pair: &SamplePair,
    transform: &T,
    destination: &Destination,
) -> Result<PairAction, YoloprepError>
where
    T: ClassTransform + ?Sized,
{
    let Some(label) = &pair.label else {
        return Ok(PairAction::Skip(SkipReason::MissingLabel));
    };

    let text = fs::read_to_string(label).map_err(|e| YoloprepError::io_at(label, e))?;
    let lines = process_label_text(&text, transform);

    match destination {
        Destination::InPlace if lines.is_empty() => Ok(PairAction::RemoveLabel {
            label_path: label.clone(),
        }),
        Destination::InPlace => Ok(PairAction::Write {
            image_copy: None,
            label_path: label.clone(),
            contents: render_label_lines(&lines),
        }),
        Destination::Copy { .. } if lines.is_empty() => {
            Ok(PairAction::Skip(SkipReason::EmptyAfterTransform))
        }
        Destination::Copy {
            images_dir,
            labels_dir,
        } => {
            let Some(image) = &pair.image else {
                return Ok(PairAction::Skip(SkipReason::MissingImage));
            };
            let image_name = image.file_name().ok_or_else(|| {
                YoloprepError::io_at(
                    image,
                    std::io::Error::new(std::io::ErrorKind::InvalidInput, "image has no file name"),
                )
            })?;
            Ok(PairAction::Write {
                image_copy: Some((image.clone(), images_dir.join(image_name))),
                label_path: labels_dir.join(format!("{}.{}", pair.stem, LABEL_EXTENSION)),
                contents: render_label_lines(&lines),
            })
        }
    }
}

/// Carry out a planned action.
pub fn apply_action(action: &PairAction) -> Result<PairOutcome, YoloprepError> {
    match action {
        PairAction::Write {
            image_copy,
            label_path,
            contents,
        } => {
            if let Some((src, dst)) = image_copy {
                fs::copy(src, dst).map_err(|e| YoloprepError::io_at(dst, e))?;
            }
            fs::write(label_path, contents).map_err(|e| YoloprepError::io_at(label_path, e))?;
        }
        PairAction::RemoveLabel { label_path } => {
            fs::remove_file(label_path).map_err(|e| YoloprepError::io_at(label_path, e))?;
            tracing::info!(label = %label_path.display(), "removed label file with no surviving lines");
        }
        PairAction::Skip(reason) => {
            tracing::debug!(?reason, "pair skipped");
        }
    }
    Ok(action.outcome())
}

/// Process one (image, label) pair: plan it and, unless `dry_run`, apply it.
pub fn process_pair<T>(
    pair: &SamplePair,
    transform: &T,
    destination: &Destination,
    dry_run: bool,
) -> Result<PairOutcome, YoloprepError>
where
    T: ClassTransform + ?Sized,
{
    let action = plan_pair(pair, transform, destination)?;
    if dry_run {
        return Ok(action.outcome());
    }
    apply_action(&action)
}

/// Rewrite every pair of one split.
///
/// In copy mode the split's images drive the pass (an image without a label
/// is skipped); in place, its label files do. A failing pair is recorded in
/// `report` and does not stop the pass.
pub fn rewrite_split<T>(
    split: &SplitDirs,
    transform: &T,
    destination: &Destination,
    dry_run: bool,
    report: &mut RewriteReport,
) -> Result<SplitTally, YoloprepError>
where
    T: ClassTransform + ?Sized,
{
    let pairs = match destination {
        Destination::InPlace => collect_label_pairs(&split.images_dir, &split.labels_dir)?,
        Destination::Copy {
            images_dir,
            labels_dir,
        } => {
            if !dry_run {
                fs::create_dir_all(images_dir).map_err(|e| YoloprepError::io_at(images_dir, e))?;
                fs::create_dir_all(labels_dir).map_err(|e| YoloprepError::io_at(labels_dir, e))?;
            }
            collect_image_pairs(&split.images_dir, &split.labels_dir)?
        }
    };

    tracing::info!(split = %split.name, pairs = pairs.len(), "rewriting split");

    let mut tally = SplitTally::new(&split.name);
    for pair in &pairs {
        match process_pair(pair, transform, destination, dry_run) {
            Ok(outcome) => tally.record(outcome),
            Err(err) => {
                tracing::warn!(split = %split.name, stem = %pair.stem, error = %err, "pair failed");
                tally.failed += 1;
                report.add(RewriteIssue::warning(
                    RewriteIssueCode::PairFailed,
                    format!("[{}] {}: {}", split.name, pair.stem, err),
                ));
            }
        }
    }

    Ok(tally)
}

/// Produce the manifest of the rewritten dataset.
///
/// With `preserve_document` the source manifest's other keys are kept;
/// otherwise the result holds only split paths, `nc` and `names`.
pub fn rewrite_manifest(
    manifest: &Manifest,
    policy: &ClassPolicy,
    paths: &ManifestPaths,
    preserve_document: bool,
) -> Manifest {
    let names = policy.target_names(manifest);
    if preserve_document {
        let mut rewritten = manifest.clone();
        rewritten.apply_paths(paths);
        rewritten.set_names(names);
        rewritten
    } else {
        fresh_manifest(names, paths)
    }
}

/// Options for [`filter_dataset`].
#[derive(Clone, Debug, Default)]
pub struct FilterOptions {
    /// Dataset root holding `data.yaml` and the split directories.
    pub root: PathBuf,
    /// Class names to keep.
    pub keep: Vec<String>,
    /// Output root; defaults to `<root>_filtered`.
    pub output: Option<PathBuf>,
    /// Compact kept IDs to `0..k`.
    pub renumber: bool,
    pub dry_run: bool,
}

/// Copy a dataset, keeping only label lines of the requested classes.
///
/// Images whose labels end up empty are left out. The output uses the flat
/// layout and gets a fresh `data.yaml` listing only the kept classes.
pub fn filter_dataset(opts: &FilterOptions) -> Result<RewriteReport, YoloprepError> {
    let root = &opts.root;
    require_root(root)?;

    let manifest = Manifest::read(&root.join(MANIFEST_FILE))?;
    let policy = ClassPolicy::keep_names(&manifest, &opts.keep, opts.renumber)?;

    let splits = discover_filter_splits(root)?;
    let out_root = match &opts.output {
        Some(output) => output.clone(),
        None => default_filter_output(root)?,
    };
    reject_same_root(root, &out_root)?;

    let mut report = RewriteReport::new("filter", root.clone(), out_root.clone());
    report.dry_run = opts.dry_run;

    let mut kept_ids: Vec<usize> = opts
        .keep
        .iter()
        .filter_map(|name| manifest.class_id(name))
        .collect();
    kept_ids.sort_unstable();
    kept_ids.dedup();
    report.add(RewriteIssue::info(
        RewriteIssueCode::ClassSelection,
        format!("Keeping classes: {:?} (ids: {:?})", opts.keep, kept_ids),
    ));

    for split in &splits {
        let destination = Destination::copy_into(&out_root, &split.name);
        let tally = rewrite_split(split, &policy, &destination, opts.dry_run, &mut report)?;
        report.splits.push(tally);
    }

    let has = |name: &str| splits.iter().any(|split| split.name == name);
    let val_split = if has("valid") { "valid" } else { "val" };
    let paths = ManifestPaths {
        train: Some(SplitLayout::Flat.images_dir(&out_root, "train")),
        val: Some(SplitLayout::Flat.images_dir(&out_root, val_split)),
        test: has("test").then(|| SplitLayout::Flat.images_dir(&out_root, "test")),
    };
    let new_manifest = rewrite_manifest(&manifest, &policy, &paths, false);

    if !policy.ids_match_names() {
        tracing::warn!("kept class IDs do not index the filtered names; consider --renumber");
        report.add(RewriteIssue::warning(
            RewriteIssueCode::IdsNotRenumbered,
            "label files keep their original class IDs, which do not match positions in the \
             new names list; rerun with --renumber to compact them",
        ));
    }

    finish(&mut report, &new_manifest, &out_root, opts.dry_run)?;
    Ok(report)
}

/// Options for [`remap_dataset`].
#[derive(Clone, Debug)]
pub struct RemapOptions {
    pub root: PathBuf,
    pub policy: ClassPolicy,
    pub splits: Vec<String>,
    /// Fixed layout, or `None` to detect it per split.
    pub layout: Option<SplitLayout>,
    /// Write a remapped copy here instead of rewriting in place.
    pub output: Option<PathBuf>,
    pub dry_run: bool,
}

/// Remap class IDs of a dataset, in place or into a copy.
///
/// In place, label files are overwritten and the ones left empty are deleted;
/// images are never touched. The manifest keeps its other keys and gets the
/// target taxonomy.
pub fn remap_dataset(opts: &RemapOptions) -> Result<RewriteReport, YoloprepError> {
    let root = &opts.root;
    require_root(root)?;

    let manifest_path = root.join(MANIFEST_FILE);
    let manifest = Manifest::read(&manifest_path)?;

    if let Some(output) = &opts.output {
        reject_same_root(root, output)?;
    }
    let out_root = opts.output.clone().unwrap_or_else(|| root.clone());
    let mut report = RewriteReport::new("remap", root.clone(), out_root.clone());
    report.dry_run = opts.dry_run;

    let mut processed: Vec<SplitDirs> = Vec::new();
    for split_name in &opts.splits {
        let Some(split) = SplitDirs::resolve(root, split_name, opts.layout) else {
            skip_split(&mut report, split_name, "split not found");
            continue;
        };
        if !split.labels_dir.is_dir() {
            let reason = format!("labels folder not found at {}", split.labels_dir.display());
            skip_split(&mut report, split_name, &reason);
            continue;
        }

        let destination = match &opts.output {
            None => Destination::InPlace,
            Some(output) => {
                if !split.images_dir.is_dir() {
                    let reason =
                        format!("images folder not found at {}", split.images_dir.display());
                    skip_split(&mut report, split_name, &reason);
                    continue;
                }
                Destination::copy_into(output, split_name)
            }
        };

        let tally = rewrite_split(&split, &opts.policy, &destination, opts.dry_run, &mut report)?;
        report.splits.push(tally);
        processed.push(split);
    }

    let images_dir_of = |name: &str| {
        processed
            .iter()
            .find(|split| split.name == name)
            .map(|split| match &opts.output {
                None => split.images_dir.clone(),
                Some(output) => SplitLayout::Flat.images_dir(output, name),
            })
    };
    let paths = ManifestPaths {
        train: images_dir_of("train"),
        val: images_dir_of("valid").or_else(|| images_dir_of("val")),
        test: images_dir_of("test"),
    };
    let new_manifest = rewrite_manifest(&manifest, &opts.policy, &paths, true);

    finish(&mut report, &new_manifest, &out_root, opts.dry_run)?;
    Ok(report)
}

fn finish(
    report: &mut RewriteReport,
    manifest: &Manifest,
    out_root: &Path,
    dry_run: bool,
) -> Result<(), YoloprepError> {
    let manifest_path = out_root.join(MANIFEST_FILE);
    if dry_run {
        report.add(RewriteIssue::info(
            RewriteIssueCode::DryRun,
            "dry run: no files were written or deleted",
        ));
    } else {
        fs::create_dir_all(out_root).map_err(|e| YoloprepError::io_at(out_root, e))?;
        manifest.write(&manifest_path)?;
        tracing::info!(manifest = %manifest_path.display(), "wrote manifest");
    }
    report.class_names = manifest.names().to_vec();
    report.manifest = Some(manifest_path);
    Ok(())
}

fn skip_split(report: &mut RewriteReport, split: &str, reason: &str) {
    tracing::warn!(split, reason, "skipping split");
    report.add(RewriteIssue::info(
        RewriteIssueCode::SplitSkipped,
        format!("Skipping missing split: {split} ({reason})"),
    ));
}

pub(crate) fn require_root(root: &Path) -> Result<(), YoloprepError> {
    if root.is_dir() {
        Ok(())
    } else {
        Err(YoloprepError::DatasetRootNotFound {
            path: root.to_path_buf(),
        })
    }
}

fn reject_same_root(root: &Path, output: &Path) -> Result<(), YoloprepError> {
    let same = match (root.canonicalize(), output.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => root == output,
    };
    if same {
        return Err(YoloprepError::InvalidArguments {
            message: format!(
                "output directory '{}' is the dataset root itself",
                output.display()
            ),
        });
    }
    Ok(())
}

/// Splits under `root` that have an `images/` directory; `train` is required.
fn discover_filter_splits(root: &Path) -> Result<Vec<SplitDirs>, YoloprepError> {
    let mut splits: Vec<SplitDirs> = FILTER_CANDIDATE_SPLITS
        .iter()
        .filter_map(|name| SplitDirs::resolve(root, name, None))
        .filter(|split| split.images_dir.is_dir())
        .collect();

    if splits.iter().any(|split| split.name == "valid") {
        splits.retain(|split| split.name != "val");
    }
    if !splits.iter().any(|split| split.name == "train") {
        return Err(YoloprepError::MissingSplit {
            root: root.to_path_buf(),
            split: "train".to_string(),
        });
    }
    Ok(splits)
}

/// `<root>_filtered`, next to `root`.
fn default_filter_output(root: &Path) -> Result<PathBuf, YoloprepError> {
    let name = root
        .file_name()
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty() && *name != "." && *name != "..")
        .ok_or_else(|| YoloprepError::InvalidArguments {
            message: format!(
                "cannot derive an output directory from '{}'; pass --output",
                root.display()
            ),
        })?;
    Ok(root.with_file_name(format!("{name}_filtered")))
}
