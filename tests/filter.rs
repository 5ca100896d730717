//! Integration tests for class filtering.

use std::path::Path;

use yoloprep::manifest::Manifest;
use yoloprep::rewrite::{filter_dataset, FilterOptions, RewriteIssueCode};
use yoloprep::YoloprepError;

mod common;
use common::{file_names, read_file, sign_dataset};

fn keep(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

fn options(root: &Path, output: &Path, names: &[&str]) -> FilterOptions {
    FilterOptions {
        root: root.to_path_buf(),
        keep: keep(names),
        output: Some(output.to_path_buf()),
        ..Default::default()
    }
}

#[test]
fn filter_keeps_only_pairs_with_surviving_lines() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let root = temp.path().join("signs");
    let out = temp.path().join("out");
    sign_dataset(&root);

    let report = filter_dataset(&options(&root, &out, &["stop", "yield"])).expect("filter");

    let train = report.split("train").expect("train tally");
    assert_eq!(train.kept, 4);
    assert_eq!(train.skipped(), 6);
    assert_eq!(train.missing_label, 3);
    assert_eq!(train.empty, 3);

    let valid = report.split("valid").expect("valid tally");
    assert_eq!(valid.kept, 1);
    assert_eq!(valid.skipped(), 1);

    assert_eq!(
        file_names(&out.join("images/train")),
        ["img01.jpg", "img02.jpg", "img03.jpg", "img04.jpg"]
    );
    assert_eq!(
        file_names(&out.join("labels/train")),
        ["img01.txt", "img02.txt", "img03.txt", "img04.txt"]
    );
    assert_eq!(file_names(&out.join("images/valid")), ["val01.jpg"]);
}

#[test]
fn filter_keeps_surviving_lines_byte_for_byte() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let root = temp.path().join("signs");
    let out = temp.path().join("out");
    sign_dataset(&root);

    filter_dataset(&options(&root, &out, &["stop", "yield"])).expect("filter");

    assert_eq!(
        read_file(&out.join("labels/train/img02.txt")),
        "2 0.1 0.1 0.05 0.05\n"
    );
    assert_eq!(
        read_file(&out.join("labels/train/img03.txt")),
        "1 0.6 0.6 0.1 0.1\n2 0.2 0.2 0.1 0.1\n"
    );
}

#[test]
fn filter_writes_fresh_manifest_with_kept_names() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let root = temp.path().join("signs");
    let out = temp.path().join("out");
    sign_dataset(&root);

    let report = filter_dataset(&options(&root, &out, &["yield", "stop"])).expect("filter");

    let manifest = Manifest::read(&out.join("data.yaml")).expect("read output manifest");
    assert_eq!(manifest.names(), ["stop", "yield"]);
    assert_eq!(manifest.get("nc").and_then(|v| v.as_u64()), Some(2));
    let train = manifest
        .get("train")
        .and_then(|v| v.as_str())
        .expect("train path");
    assert!(train.ends_with("images/train"), "train path: {train}");
    let val = manifest.get("val").and_then(|v| v.as_str()).expect("val path");
    assert!(val.ends_with("images/valid"), "val path: {val}");
    assert!(manifest.get("test").is_none());

    assert_eq!(report.class_names, ["stop", "yield"]);
    assert_eq!(report.warning_count(), 1, "ids 1,2 do not index [stop, yield]");
}

#[test]
fn filter_with_renumber_compacts_ids() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let root = temp.path().join("signs");
    let out = temp.path().join("out");
    sign_dataset(&root);

    let mut opts = options(&root, &out, &["stop", "yield"]);
    opts.renumber = true;
    let report = filter_dataset(&opts).expect("filter");

    assert_eq!(report.warning_count(), 0);
    assert_eq!(
        read_file(&out.join("labels/train/img03.txt")),
        "0 0.6 0.6 0.1 0.1\n1 0.2 0.2 0.1 0.1\n"
    );
}

#[test]
fn filter_defaults_output_to_sibling_directory() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let root = temp.path().join("signs");
    sign_dataset(&root);

    let opts = FilterOptions {
        root: root.clone(),
        keep: keep(&["stop"]),
        ..Default::default()
    };
    let report = filter_dataset(&opts).expect("filter");

    let expected = temp.path().join("signs_filtered");
    assert_eq!(report.output, expected);
    assert!(expected.join("data.yaml").is_file());
    assert!(!report.in_place);
}

#[test]
fn filter_rejects_unknown_class_names() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let root = temp.path().join("signs");
    let out = temp.path().join("out");
    sign_dataset(&root);

    let err = filter_dataset(&options(&root, &out, &["stop", "unicorn"])).unwrap_err();
    match err {
        YoloprepError::UnknownClassNames { missing, known } => {
            assert_eq!(missing, ["unicorn"]);
            assert_eq!(known.len(), 5);
        }
        other => panic!("expected UnknownClassNames, got {other:?}"),
    }
    assert!(!out.exists(), "nothing is written on a fatal error");
}

#[test]
fn filter_requires_manifest_and_train_split() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let root = temp.path().join("bare");
    std::fs::create_dir_all(root.join("valid/images")).expect("create valid dir");

    let err = filter_dataset(&options(&root, &temp.path().join("out"), &["a"])).unwrap_err();
    assert!(matches!(err, YoloprepError::ManifestNotFound { .. }));

    common::write_file(&root.join("data.yaml"), "names: [a]\n");
    let err = filter_dataset(&options(&root, &temp.path().join("out"), &["a"])).unwrap_err();
    assert!(matches!(err, YoloprepError::MissingSplit { .. }));
}

#[test]
fn filter_dry_run_writes_nothing() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let root = temp.path().join("signs");
    let out = temp.path().join("out");
    sign_dataset(&root);

    let mut opts = options(&root, &out, &["stop", "yield"]);
    opts.dry_run = true;
    let report = filter_dataset(&opts).expect("filter");

    assert_eq!(report.split("train").map(|t| t.kept), Some(4));
    assert!(!out.exists());
}

#[test]
fn filter_records_failing_pair_and_keeps_going() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let root = temp.path().join("broken");
    let out = temp.path().join("out");
    common::dataset_with_unreadable_label(&root);

    let report = filter_dataset(&options(&root, &out, &["stop"])).expect("filter");

    let train = report.split("train").expect("train tally");
    assert_eq!(train.kept, 1);
    assert_eq!(train.failed, 1);
    assert_eq!(report.failed_count(), 1);
    assert_eq!(report.total_pairs(), 2);
    assert!(report
        .issues
        .iter()
        .any(|issue| issue.code == RewriteIssueCode::PairFailed && issue.message.contains("x")));

    assert_eq!(file_names(&out.join("images/train")), ["y.jpg"]);
    assert!(out.join("data.yaml").is_file());
}
