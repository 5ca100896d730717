//! Dataset directory conventions and image/label pairing.
//!
//! Two layouts are in common use for YOLO datasets:
//!
//! - nested: `root/<split>/images` + `root/<split>/labels` (Roboflow exports)
//! - flat: `root/images/<split>` + `root/labels/<split>` (Ultralytics default)
//!
//! Images and labels pair by file stem: `images/.../a.jpg` <-> `labels/.../a.txt`.

use std::path::{Path, PathBuf};

use serde::Serialize;
use walkdir::WalkDir;

use crate::error::YoloprepError;

pub const IMAGE_EXTENSIONS: [&str; 7] = ["jpg", "jpeg", "png", "bmp", "webp", "tif", "tiff"];
pub const LABEL_EXTENSION: &str = "txt";

/// Splits processed when the caller does not name any.
pub const DEFAULT_SPLITS: [&str; 3] = ["train", "valid", "test"];

/// Where a split keeps its `images/` and `labels/` directories.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitLayout {
    /// `root/<split>/images`
    Nested,
    /// `root/images/<split>`
    Flat,
}

impl SplitLayout {
    pub fn images_dir(self, root: &Path, split: &str) -> PathBuf {
        match self {
            SplitLayout::Nested => root.join(split).join("images"),
            SplitLayout::Flat => root.join("images").join(split),
        }
    }

    pub fn labels_dir(self, root: &Path, split: &str) -> PathBuf {
        match self {
            SplitLayout::Nested => root.join(split).join("labels"),
            SplitLayout::Flat => root.join("labels").join(split),
        }
    }

    /// Guess the layout of `split` under `root`. Nested wins when both exist.
    pub fn detect(root: &Path, split: &str) -> Option<Self> {
        [SplitLayout::Nested, SplitLayout::Flat]
            .into_iter()
            .find(|layout| {
                layout.images_dir(root, split).is_dir() || layout.labels_dir(root, split).is_dir()
            })
    }
}

/// Resolved directories of one split.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SplitDirs {
    pub name: String,
    pub layout: SplitLayout,
    pub images_dir: PathBuf,
    pub labels_dir: PathBuf,
}

impl SplitDirs {
    pub fn new(root: &Path, split: &str, layout: SplitLayout) -> Self {
        Self {
            name: split.to_string(),
            layout,
            images_dir: layout.images_dir(root, split),
            labels_dir: layout.labels_dir(root, split),
        }
    }

    /// Resolve a split with a fixed layout, or detect one when `layout` is
    /// `None`. Returns `None` when nothing for the split exists on disk.
    pub fn resolve(root: &Path, split: &str, layout: Option<SplitLayout>) -> Option<Self> {
        let layout = match layout {
            Some(layout) => layout,
            None => SplitLayout::detect(root, split)?,
        };
        let dirs = Self::new(root, split, layout);
        (dirs.images_dir.is_dir() || dirs.labels_dir.is_dir()).then_some(dirs)
    }
}

/// An image and/or label file sharing one stem within a split.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SamplePair {
    pub stem: String,
    pub image: Option<PathBuf>,
    pub label: Option<PathBuf>,
}

/// One pair per image in `images_dir`, sorted by file name, each with its
/// label file when `labels_dir/<stem>.txt` exists.
pub fn collect_image_pairs(
    images_dir: &Path,
    labels_dir: &Path,
) -> Result<Vec<SamplePair>, YoloprepError> {
    let images = list_files(images_dir, &IMAGE_EXTENSIONS)?;
    Ok(images
        .into_iter()
        .filter_map(|image| {
            let stem = file_stem_string(&image)?;
            let label = labels_dir.join(format!("{stem}.{LABEL_EXTENSION}"));
            Some(SamplePair {
                label: label.is_file().then_some(label),
                image: Some(image),
                stem,
            })
        })
        .collect())
}

/// One pair per label file in `labels_dir`, sorted by file name, each with
/// its image when one with a known extension exists in `images_dir`.
pub fn collect_label_pairs(
    images_dir: &Path,
    labels_dir: &Path,
) -> Result<Vec<SamplePair>, YoloprepError> {
    let labels = list_files(labels_dir, &[LABEL_EXTENSION])?;
    Ok(labels
        .into_iter()
        .filter_map(|label| {
            let stem = file_stem_string(&label)?;
            Some(SamplePair {
                image: find_image(images_dir, &stem),
                label: Some(label),
                stem,
            })
        })
        .collect())
}

/// Find the image for `stem`, trying extensions in [`IMAGE_EXTENSIONS`] order.
pub fn find_image(images_dir: &Path, stem: &str) -> Option<PathBuf> {
    IMAGE_EXTENSIONS
        .iter()
        .flat_map(|ext| [ext.to_string(), ext.to_ascii_uppercase()])
        .map(|ext| images_dir.join(format!("{stem}.{ext}")))
        .find(|candidate| candidate.is_file())
}

/// Regular files directly inside `dir` with one of `extensions`
/// (case-insensitive), sorted by file name.
pub fn list_files(dir: &Path, extensions: &[&str]) -> Result<Vec<PathBuf>, YoloprepError> {
    let mut files = Vec::new();

    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).follow_links(true) {
        let entry = entry.map_err(|source| {
            let path = source
                .path()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| dir.to_path_buf());
            let io = source
                .into_io_error()
                .unwrap_or_else(|| std::io::Error::other("directory traversal failed"));
            YoloprepError::io_at(path, io)
        })?;

        if entry.file_type().is_file() && has_extension(entry.path(), extensions) {
            files.push(entry.into_path());
        }
    }

    files.sort();
    Ok(files)
}

pub fn has_extension(path: &Path, allowed: &[&str]) -> bool {
    let Some(ext) = path.extension().and_then(|ext| ext.to_str()) else {
        return false;
    };

    allowed
        .iter()
        .any(|allowed_ext| ext.eq_ignore_ascii_case(allowed_ext))
}

pub fn file_stem_string(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map(str::to_string)
}
