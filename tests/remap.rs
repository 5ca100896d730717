//! Integration tests for class ID remapping.

use std::collections::BTreeMap;
use std::path::Path;

use yoloprep::layout::SplitLayout;
use yoloprep::manifest::Manifest;
use yoloprep::policy::ClassPolicy;
use yoloprep::rewrite::{remap_dataset, RemapOptions};
use yoloprep::YoloprepError;

mod common;
use common::{file_names, read_file, write_file, DatasetBuilder, Layout};

const TARGET: [&str; 3] = ["stop", "yield", "crosswalk"];

fn policy() -> ClassPolicy {
    let mapping = BTreeMap::from([(1, 0), (2, 1), (3, 2)]);
    ClassPolicy::remap(mapping, TARGET.iter().map(|s| s.to_string()).collect())
        .expect("build remap policy")
}

fn options(root: &Path) -> RemapOptions {
    RemapOptions {
        root: root.to_path_buf(),
        policy: policy(),
        splits: vec!["train".into(), "valid".into(), "test".into()],
        layout: None,
        output: None,
        dry_run: false,
    }
}

fn flat_dataset(root: &Path) -> DatasetBuilder {
    let dataset = DatasetBuilder::new(root, Layout::Flat);
    dataset.manifest(
        &common::SIGN_NAMES,
        "path: /datasets/signs\ntrain: images/train\nval: images/valid\n",
    );
    dataset
        .pair("train", "a", "1 0.5 0.5 0.2 0.2\n3 0.25 0.25 0.1 0.1\n")
        .pair("train", "b", "0 0.5 0.5 0.2 0.2\n4 0.1 0.1 0.1 0.1\n")
        .pair("train", "c", "2   0.5 0.5   0.2 0.2\n")
        .pair("valid", "v", "0 0.5 0.5 0.2 0.2\n3 0.4 0.4 0.1 0.1\n");
    dataset
}

#[test]
fn remap_in_place_rewrites_ids_and_removes_empty_labels() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let dataset = flat_dataset(temp.path());

    let report = remap_dataset(&options(temp.path())).expect("remap");

    assert!(report.in_place);
    assert_eq!(
        read_file(&dataset.labels_dir("train").join("a.txt")),
        "0 0.5 0.5 0.2 0.2\n2 0.25 0.25 0.1 0.1\n"
    );
    assert_eq!(
        read_file(&dataset.labels_dir("train").join("c.txt")),
        "1 0.5 0.5 0.2 0.2\n"
    );
    assert!(!dataset.labels_dir("train").join("b.txt").exists());
    assert_eq!(
        read_file(&dataset.labels_dir("valid").join("v.txt")),
        "2 0.4 0.4 0.1 0.1\n"
    );

    // Images are never touched in place.
    assert_eq!(
        file_names(&dataset.images_dir("train")),
        ["a.jpg", "b.jpg", "c.jpg"]
    );

    let train = report.split("train").expect("train tally");
    assert_eq!(train.kept, 2);
    assert_eq!(train.removed, 1);
}

#[test]
fn remap_updates_manifest_and_preserves_other_keys() {
    let temp = tempfile::tempdir().expect("create temp dir");
    flat_dataset(temp.path());

    remap_dataset(&options(temp.path())).expect("remap");

    let manifest = Manifest::read(&temp.path().join("data.yaml")).expect("read manifest");
    assert_eq!(manifest.names(), TARGET);
    assert_eq!(manifest.get("nc").and_then(|v| v.as_u64()), Some(3));
    assert_eq!(
        manifest.get("path").and_then(|v| v.as_str()),
        Some("/datasets/signs")
    );
    let train = manifest
        .get("train")
        .and_then(|v| v.as_str())
        .expect("train path");
    assert!(train.ends_with("images/train"), "train path: {train}");
}

#[test]
fn remap_skips_missing_splits_with_a_note() {
    let temp = tempfile::tempdir().expect("create temp dir");
    flat_dataset(temp.path());

    let report = remap_dataset(&options(temp.path())).expect("remap");

    assert!(report.split("test").is_none());
    assert!(report
        .issues
        .iter()
        .any(|issue| issue.message.contains("Skipping missing split: test")));
}

#[test]
fn remap_into_copy_leaves_source_untouched() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let root = temp.path().join("src");
    let out = temp.path().join("remapped");
    let dataset = flat_dataset(&root);
    let before = read_file(&dataset.labels_dir("train").join("a.txt"));

    let mut opts = options(&root);
    opts.output = Some(out.clone());
    let report = remap_dataset(&opts).expect("remap");

    assert!(!report.in_place);
    assert_eq!(read_file(&dataset.labels_dir("train").join("a.txt")), before);
    assert!(dataset.labels_dir("train").join("b.txt").is_file());

    assert_eq!(file_names(&out.join("images/train")), ["a.jpg", "c.jpg"]);
    assert_eq!(file_names(&out.join("labels/train")), ["a.txt", "c.txt"]);
    let manifest = Manifest::read(&out.join("data.yaml")).expect("read output manifest");
    assert_eq!(manifest.names(), TARGET);
}

#[test]
fn remap_handles_nested_layout() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let dataset = DatasetBuilder::new(temp.path(), Layout::Nested);
    dataset.manifest(&common::SIGN_NAMES, "");
    dataset.pair("train", "x", "3 0.5 0.5 0.2 0.2\n");

    let mut opts = options(temp.path());
    opts.layout = Some(SplitLayout::Nested);
    remap_dataset(&opts).expect("remap");

    assert_eq!(
        read_file(&temp.path().join("train/labels/x.txt")),
        "2 0.5 0.5 0.2 0.2\n"
    );
}

#[test]
fn remap_without_manifest_is_fatal_and_changes_nothing() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let dataset = flat_dataset(temp.path());
    std::fs::remove_file(temp.path().join("data.yaml")).expect("remove manifest");

    let err = remap_dataset(&options(temp.path())).unwrap_err();
    assert!(matches!(err, YoloprepError::ManifestNotFound { .. }));
    assert_eq!(
        read_file(&dataset.labels_dir("train").join("b.txt")),
        "0 0.5 0.5 0.2 0.2\n4 0.1 0.1 0.1 0.1\n"
    );
}

#[test]
fn remap_dry_run_changes_nothing() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let dataset = flat_dataset(temp.path());
    let manifest_before = read_file(&temp.path().join("data.yaml"));

    let mut opts = options(temp.path());
    opts.dry_run = true;
    let report = remap_dataset(&opts).expect("remap");

    assert_eq!(report.split("train").map(|t| t.removed), Some(1));
    assert!(dataset.labels_dir("train").join("b.txt").is_file());
    assert_eq!(
        read_file(&dataset.labels_dir("train").join("a.txt")),
        "1 0.5 0.5 0.2 0.2\n3 0.25 0.25 0.1 0.1\n"
    );
    assert_eq!(read_file(&temp.path().join("data.yaml")), manifest_before);
}

#[test]
fn remap_ignores_malformed_lines() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let dataset = flat_dataset(temp.path());
    write_file(
        &dataset.labels_dir("train").join("a.txt"),
        "garbage\n\n-1 0.5 0.5 0.1 0.1\n1 0.5 0.5 0.2 0.2\n",
    );

    remap_dataset(&options(temp.path())).expect("remap");

    assert_eq!(
        read_file(&dataset.labels_dir("train").join("a.txt")),
        "0 0.5 0.5 0.2 0.2\n"
    );
}
