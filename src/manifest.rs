//! Reading and writing the `data.yaml` dataset manifest.
//!
//! The manifest is kept as the full YAML mapping so that keys this crate does
//! not understand (`roboflow`, `license`, ...) survive an in-place update. The
//! class names are parsed out of it once and kept in sync on every change.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde_yaml::{Mapping, Value};

use crate::error::YoloprepError;

/// File name of the manifest inside a dataset root.
pub const MANIFEST_FILE: &str = "data.yaml";

const NAMES_KEY: &str = "names";
const NC_KEY: &str = "nc";

/// Split path keys understood by Ultralytics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SplitKey {
    Train,
    Val,
    Test,
}

impl SplitKey {
    pub fn as_str(self) -> &'static str {
        match self {
            SplitKey::Train => "train",
            SplitKey::Val => "val",
            SplitKey::Test => "test",
        }
    }
}

/// Image directories the manifest should point at after a rewrite.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ManifestPaths {
    pub train: Option<PathBuf>,
    pub val: Option<PathBuf>,
    pub test: Option<PathBuf>,
}

impl ManifestPaths {
    fn entries(&self) -> [(SplitKey, Option<&PathBuf>); 3] {
        [
            (SplitKey::Train, self.train.as_ref()),
            (SplitKey::Val, self.val.as_ref()),
            (SplitKey::Test, self.test.as_ref()),
        ]
    }
}

/// A parsed `data.yaml`: ordered class names plus the rest of the document.
#[derive(Clone, Debug, PartialEq)]
pub struct Manifest {
    names: Vec<String>,
    document: Mapping,
}

impl Manifest {
    /// Create a manifest holding only `nc` and `names`.
    pub fn new(names: Vec<String>) -> Self {
        let mut manifest = Self {
            names: Vec::new(),
            document: Mapping::new(),
        };
        manifest.set_names(names);
        manifest
    }

    /// Read and parse a manifest file.
    pub fn read(path: &Path) -> Result<Self, YoloprepError> {
        if !path.is_file() {
            return Err(YoloprepError::ManifestNotFound {
                path: path.to_path_buf(),
            });
        }
        let text = fs::read_to_string(path).map_err(|e| YoloprepError::io_at(path, e))?;
        Self::from_yaml_str(&text, path)
    }

    /// Parse manifest text; `path` is only used in error messages.
    pub fn from_yaml_str(text: &str, path: &Path) -> Result<Self, YoloprepError> {
        let value: Value =
            serde_yaml::from_str(text).map_err(|source| YoloprepError::ManifestParse {
                path: path.to_path_buf(),
                source,
            })?;

        let document = match value {
            Value::Mapping(mapping) => mapping,
            _ => {
                return Err(YoloprepError::ManifestInvalid {
                    path: path.to_path_buf(),
                    message: "expected a YAML mapping at the top level".to_string(),
                })
            }
        };

        let names = match document.get(NAMES_KEY) {
            Some(value) => parse_names(value, path)?,
            None => Vec::new(),
        };
        if names.is_empty() {
            return Err(YoloprepError::ManifestInvalid {
                path: path.to_path_buf(),
                message: "could not read class names (missing or empty 'names')".to_string(),
            });
        }

        if let Some(nc) = document.get(NC_KEY).and_then(Value::as_u64) {
            if nc as usize != names.len() {
                tracing::warn!(
                    manifest = %path.display(),
                    nc,
                    names = names.len(),
                    "manifest nc does not match the number of names"
                );
            }
        }

        Ok(Self { names, document })
    }

    /// Ordered class names; the position is the class ID.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn class_count(&self) -> usize {
        self.names.len()
    }

    /// Look up the ID of a class by exact name.
    pub fn class_id(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Replace the class list, updating `nc` alongside it.
    pub fn set_names(&mut self, names: Vec<String>) {
        self.document
            .insert(Value::from(NC_KEY), Value::from(names.len() as u64));
        self.document.insert(
            Value::from(NAMES_KEY),
            Value::Sequence(names.iter().cloned().map(Value::from).collect()),
        );
        self.names = names;
    }

    /// The path stored under a split key, if it is a string.
    pub fn split_path(&self, key: SplitKey) -> Option<&str> {
        self.document.get(key.as_str()).and_then(Value::as_str)
    }

    pub fn set_split_path(&mut self, key: SplitKey, path: &Path) {
        self.document.insert(
            Value::from(key.as_str()),
            Value::from(path.to_string_lossy().into_owned()),
        );
    }

    /// Point the manifest at new split directories. Keys absent from `paths`
    /// are left as they were.
    pub fn apply_paths(&mut self, paths: &ManifestPaths) {
        for (key, path) in paths.entries() {
            if let Some(path) = path {
                self.set_split_path(key, path);
            }
        }
    }

    /// Number of top-level keys in the document.
    pub fn key_count(&self) -> usize {
        self.document.len()
    }

    /// Raw access to a top-level key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.document.get(key)
    }

    pub fn to_yaml_string(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(&self.document)
    }

    /// Serialize and write the manifest to `path`.
    pub fn write(&self, path: &Path) -> Result<(), YoloprepError> {
        let yaml = self
            .to_yaml_string()
            .map_err(|source| YoloprepError::ManifestWrite {
                path: path.to_path_buf(),
                source,
            })?;
        fs::write(path, yaml).map_err(|e| YoloprepError::io_at(path, e))
    }
}

/// Build a fresh manifest with split paths first, then `nc` and `names`.
pub fn fresh_manifest(names: Vec<String>, paths: &ManifestPaths) -> Manifest {
    let mut manifest = Manifest {
        names: Vec::new(),
        document: Mapping::new(),
    };
    manifest.apply_paths(paths);
    manifest.set_names(names);
    manifest
}

fn parse_names(value: &Value, path: &Path) -> Result<Vec<String>, YoloprepError> {
    let invalid = |message: String| YoloprepError::ManifestInvalid {
        path: path.to_path_buf(),
        message,
    };

    match value {
        Value::Null => Ok(Vec::new()),
        Value::Sequence(items) => items
            .iter()
            .enumerate()
            .map(|(idx, item)| {
                scalar_to_string(item)
                    .ok_or_else(|| invalid(format!("names[{idx}] is not a scalar")))
            })
            .collect(),
        Value::Mapping(mapping) => {
            let mut by_id = BTreeMap::new();
            for (key, item) in mapping {
                let id = key_to_id(key)
                    .ok_or_else(|| invalid(format!("names key {key:?} is not a class ID")))?;
                let name = scalar_to_string(item)
                    .ok_or_else(|| invalid(format!("names[{id}] is not a scalar")))?;
                by_id.insert(id, name);
            }
            names_from_id_map(by_id, path)
        }
        _ => Err(invalid(
            "'names' must be a list or an ID-keyed mapping".to_string(),
        )),
    }
}

/// Gaps allowed in an ID-keyed `names` map beyond twice the number of names.
const NAME_GAP_SLACK: usize = 16;

fn names_from_id_map(
    by_id: BTreeMap<usize, String>,
    path: &Path,
) -> Result<Vec<String>, YoloprepError> {
    let Some(max_id) = by_id.keys().next_back().copied() else {
        return Ok(Vec::new());
    };

    let class_count = max_id
        .checked_add(1)
        .filter(|count| *count <= by_id.len() * 2 + NAME_GAP_SLACK)
        .ok_or_else(|| YoloprepError::ManifestInvalid {
            path: path.to_path_buf(),
            message: format!(
                "names map has {} entries but class ID {max_id}; IDs must be dense",
                by_id.len()
            ),
        })?;

    let mut names = Vec::with_capacity(class_count);
    for id in 0..class_count {
        match by_id.get(&id) {
            Some(name) if !name.trim().is_empty() => names.push(name.clone()),
            _ => {
                tracing::warn!(
                    manifest = %path.display(),
                    id,
                    "no class name for ID, using placeholder"
                );
                names.push(format!("class_{id}"));
            }
        }
    }
    Ok(names)
}

fn key_to_id(key: &Value) -> Option<usize> {
    match key {
        Value::Number(n) => n.as_u64().and_then(|n| usize::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
