#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

/// Split directory conventions used by the fixtures.
#[derive(Clone, Copy, Debug)]
pub enum Layout {
    /// root/<split>/images, root/<split>/labels
    Nested,
    /// root/images/<split>, root/labels/<split>
    Flat,
}

pub fn images_dir(root: &Path, split: &str, layout: Layout) -> PathBuf {
    match layout {
        Layout::Nested => root.join(split).join("images"),
        Layout::Flat => root.join("images").join(split),
    }
}

pub fn labels_dir(root: &Path, split: &str, layout: Layout) -> PathBuf {
    match layout {
        Layout::Nested => root.join(split).join("labels"),
        Layout::Flat => root.join("labels").join(split),
    }
}

pub fn write_file(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent dir");
    }
    fs::write(path, contents).expect("write file");
}

pub fn read_file(path: &Path) -> String {
    fs::read_to_string(path).unwrap_or_else(|e| panic!("read {}: {e}", path.display()))
}

/// Sorted file names in `dir`.
pub fn file_names(dir: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .map(|entry| entry.expect("read dir entry").file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// Builds a small YOLO dataset on disk.
pub struct DatasetBuilder {
    root: PathBuf,
    layout: Layout,
}

impl DatasetBuilder {
    pub fn new(root: impl Into<PathBuf>, layout: Layout) -> Self {
        let root = root.into();
        fs::create_dir_all(&root).expect("create dataset root");
        Self { root, layout }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn images_dir(&self, split: &str) -> PathBuf {
        images_dir(&self.root, split, self.layout)
    }

    pub fn labels_dir(&self, split: &str) -> PathBuf {
        labels_dir(&self.root, split, self.layout)
    }

    /// Write `data.yaml` with a names list and optional extra YAML lines.
    pub fn manifest(&self, names: &[&str], extra: &str) -> &Self {
        let list = names
            .iter()
            .map(|name| format!("'{name}'"))
            .collect::<Vec<_>>()
            .join(", ");
        let yaml = format!("{extra}nc: {}\nnames: [{list}]\n", names.len());
        write_file(&self.root.join("data.yaml"), &yaml);
        self
    }

    pub fn image(&self, split: &str, file_name: &str) -> &Self {
        write_file(&self.images_dir(split).join(file_name), "image-bytes");
        self
    }

    pub fn label(&self, split: &str, stem: &str, contents: &str) -> &Self {
        write_file(&self.labels_dir(split).join(format!("{stem}.txt")), contents);
        self
    }

    /// A `.jpg` image plus its label file.
    pub fn pair(&self, split: &str, stem: &str, contents: &str) -> &Self {
        self.image(split, &format!("{stem}.jpg"));
        self.label(split, stem, contents)
    }

    /// Make sure both directories of a split exist, even if empty.
    pub fn split_dirs(&self, split: &str) -> &Self {
        fs::create_dir_all(self.images_dir(split)).expect("create images dir");
        fs::create_dir_all(self.labels_dir(split)).expect("create labels dir");
        self
    }
}

/// A nested dataset whose train split has one good pair (`y`) and one pair
/// (`x`) whose label file is not valid UTF-8 and cannot be read.
pub fn dataset_with_unreadable_label(root: &Path) -> DatasetBuilder {
    let dataset = DatasetBuilder::new(root, Layout::Nested);
    dataset.manifest(&["stop", "yield"], "");
    dataset.pair("train", "y", "0 0.5 0.5 0.2 0.2\n");
    dataset.image("train", "x.jpg");
    let label = dataset.labels_dir("train").join("x.txt");
    fs::write(&label, b"0 0.5 0.5 \xff\xfe 0.2\n").expect("write non-utf8 label");
    dataset
}

/// Traffic-sign taxonomy used across the tests.
pub const SIGN_NAMES: [&str; 5] = ["speedLimit", "stop", "yield", "crosswalk", "trafficLight"];

/// A nested-layout dataset with a train split of 10 images: 7 have labels and
/// 3 of those hold only `speedLimit` (class 0) boxes. Valid has 2 pairs.
pub fn sign_dataset(root: &Path) -> DatasetBuilder {
    let dataset = DatasetBuilder::new(root, Layout::Nested);
    dataset.manifest(&SIGN_NAMES, "train: ../train/images\nval: ../valid/images\n");

    dataset
        .pair("train", "img01", "1 0.5 0.5 0.2 0.2\n")
        .pair("train", "img02", "2 0.1 0.1 0.05 0.05\n0 0.3 0.3 0.1 0.1\n")
        .pair("train", "img03", "0 0.5 0.5 0.2 0.2\n1 0.6 0.6 0.1 0.1\n2 0.2 0.2 0.1 0.1\n")
        .pair("train", "img04", "1 0.4 0.4 0.3 0.3\n")
        .pair("train", "img05", "0 0.5 0.5 0.2 0.2\n")
        .pair("train", "img06", "0 0.1 0.1 0.1 0.1\n0 0.9 0.9 0.1 0.1\n")
        .pair("train", "img07", "0 0.2 0.2 0.1 0.1\n")
        .image("train", "img08.jpg")
        .image("train", "img09.png")
        .image("train", "img10.jpg");

    dataset
        .pair("valid", "val01", "2 0.5 0.5 0.2 0.2\n")
        .pair("valid", "val02", "3 0.5 0.5 0.2 0.2\n");

    dataset
}
