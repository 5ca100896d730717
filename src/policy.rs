//! Class-ID transform policies and the class names they produce.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::Deserialize;

use crate::error::YoloprepError;
use crate::label::ClassTransform;
use crate::manifest::Manifest;

/// How label class IDs are rewritten, and which taxonomy the output uses.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClassPolicy {
    /// Keep only `keep` IDs. With `renumber`, kept IDs are compacted to their
    /// rank in `keep` so they line up with the filtered name list.
    KeepSet {
        keep: BTreeSet<usize>,
        renumber: bool,
    },
    /// Substitute IDs through `mapping`, dropping unmapped ones. The output
    /// taxonomy is `target_names`.
    Remap {
        mapping: BTreeMap<usize, usize>,
        target_names: Vec<String>,
    },
}

impl ClassPolicy {
    /// Build a keep-set policy from class names listed in `manifest`.
    ///
    /// Every requested name must exist in the manifest.
    pub fn keep_names(
        manifest: &Manifest,
        keep: &[String],
        renumber: bool,
    ) -> Result<Self, YoloprepError> {
        let missing: Vec<String> = keep
            .iter()
            .filter(|name| manifest.class_id(name).is_none())
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(YoloprepError::UnknownClassNames {
                missing,
                known: manifest.names().to_vec(),
            });
        }

        let keep = keep
            .iter()
            .filter_map(|name| manifest.class_id(name))
            .collect();
        Ok(ClassPolicy::KeepSet { keep, renumber })
    }

    /// Build a remap policy. Targets must index into `target_names`.
    pub fn remap(
        mapping: BTreeMap<usize, usize>,
        target_names: Vec<String>,
    ) -> Result<Self, YoloprepError> {
        if target_names.is_empty() {
            return Err(YoloprepError::InvalidMapping {
                message: "target class names must not be empty".to_string(),
            });
        }
        if mapping.is_empty() {
            return Err(YoloprepError::InvalidMapping {
                message: "mapping must contain at least one OLD:NEW entry".to_string(),
            });
        }
        if let Some((old, new)) = mapping.iter().find(|(_, new)| **new >= target_names.len()) {
            return Err(YoloprepError::InvalidMapping {
                message: format!(
                    "{old}:{new} targets class {new}, but only {} target name(s) are defined",
                    target_names.len()
                ),
            });
        }
        Ok(ClassPolicy::Remap {
            mapping,
            target_names,
        })
    }

    /// Class names of the output dataset, given the source manifest.
    pub fn target_names(&self, source: &Manifest) -> Vec<String> {
        match self {
            ClassPolicy::KeepSet { keep, .. } => source
                .names()
                .iter()
                .enumerate()
                .filter(|(id, _)| keep.contains(id))
                .map(|(_, name)| name.clone())
                .collect(),
            ClassPolicy::Remap { target_names, .. } => target_names.clone(),
        }
    }

    /// True when output label IDs index into [`ClassPolicy::target_names`].
    ///
    /// A keep-set without renumbering keeps the source IDs, which only line
    /// up with the filtered names when the kept IDs are `0..k`.
    pub fn ids_match_names(&self) -> bool {
        match self {
            ClassPolicy::KeepSet { keep, renumber } => {
                *renumber || keep.iter().copied().eq(0..keep.len())
            }
            ClassPolicy::Remap { .. } => true,
        }
    }
}

impl ClassTransform for ClassPolicy {
    fn apply(&self, class_id: usize) -> Option<usize> {
        match self {
            ClassPolicy::KeepSet { keep, renumber } => {
                if !keep.contains(&class_id) {
                    None
                } else if *renumber {
                    Some(keep.range(..class_id).count())
                } else {
                    Some(class_id)
                }
            }
            ClassPolicy::Remap { mapping, .. } => mapping.get(&class_id).copied(),
        }
    }
}

/// Parse a `OLD:NEW` mapping entry as given on the command line.
pub fn parse_mapping_entry(raw: &str) -> Result<(usize, usize), YoloprepError> {
    let invalid = || YoloprepError::InvalidMapping {
        message: format!("'{raw}' is not an OLD:NEW pair of class IDs"),
    };
    let (old, new) = raw.split_once(':').ok_or_else(invalid)?;
    let old = old.trim().parse().map_err(|_| invalid())?;
    let new = new.trim().parse().map_err(|_| invalid())?;
    Ok((old, new))
}

/// Collect `OLD:NEW` entries, rejecting a source ID listed twice.
pub fn parse_mapping_entries<S: AsRef<str>>(
    entries: &[S],
) -> Result<BTreeMap<usize, usize>, YoloprepError> {
    let mut mapping = BTreeMap::new();
    for entry in entries {
        let (old, new) = parse_mapping_entry(entry.as_ref())?;
        if mapping.insert(old, new).is_some() {
            return Err(YoloprepError::InvalidMapping {
                message: format!("source class {old} is mapped more than once"),
            });
        }
    }
    Ok(mapping)
}

/// Remap table and target names stored in a YAML file:
///
/// ```yaml
/// mapping:
///   3: 0   # stop
///   4: 1   # yield
/// names: [stop, yield]
/// ```
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct RemapConfig {
    #[serde(default)]
    pub mapping: BTreeMap<usize, usize>,
    #[serde(default)]
    pub names: Vec<String>,
}

impl RemapConfig {
    pub fn read(path: &Path) -> Result<Self, YoloprepError> {
        let text = std::fs::read_to_string(path).map_err(|e| YoloprepError::io_at(path, e))?;
        serde_yaml::from_str(&text).map_err(|source| YoloprepError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }
}
