//! Global feature-name registry.
//!
//! Training runs discover feature names and give each a dense index starting
//! at 1 (SVM-light has no feature 0).  Inference runs only look names up, so an
//! unseen name is dropped instead of widening the feature space.

use std::collections::BTreeMap;
use std::path::Path;

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::errors::{RelfeatError, RelfeatResult};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureSet {
    names: IndexSet<String>,
}

#[derive(Serialize, Deserialize)]
struct PersistedFeatureSet {
    fingerprint: String,
    names: Vec<String>,
}

impl FeatureSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.get_index_of(name).map(|i| i + 1)
    }

    pub fn name_of(&self, index: usize) -> Option<&str> {
        index
            .checked_sub(1)
            .and_then(|i| self.names.get_index(i))
            .map(String::as_str)
    }

    pub fn contains_index(&self, index: usize) -> bool {
        index >= 1 && index <= self.names.len()
    }

    /// Index of `name`, registering it first if it is new.
    pub fn get_or_register(&mut self, name: &str) -> usize {
        if let Some(index) = self.index_of(name) {
            return index;
        }
        let (i, _) = self.names.insert_full(name.to_string());
        i + 1
    }

    /// Registration when training, lookup otherwise.
    pub fn resolve(&mut self, name: &str, is_train: bool) -> Option<usize> {
        if is_train {
            Some(self.get_or_register(name))
        } else {
            self.index_of(name)
        }
    }

    /// Store `value` for `name` in an edge's feature map.  Returns whether the
    /// feature was kept.
    pub fn add_to_edge(
        &mut self,
        edge_features: &mut BTreeMap<usize, f64>,
        name: &str,
        value: f64,
        is_train: bool,
    ) -> bool {
        match self.resolve(name, is_train) {
            Some(index) => {
                edge_features.insert(index, value);
                true
            }
            None => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.names
            .iter()
            .enumerate()
            .map(|(i, name)| (i + 1, name.as_str()))
    }

    /// SHA-256 over the ordered names; equal fingerprints mean equal index spaces.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for name in &self.names {
            hasher.update(name.as_bytes());
            hasher.update(b"\n");
        }
        format!("{:x}", hasher.finalize())
    }

    pub fn to_json_string(&self) -> RelfeatResult<String> {
        let persisted = PersistedFeatureSet {
            fingerprint: self.fingerprint(),
            names: self.names.iter().cloned().collect(),
        };
        Ok(serde_json::to_string(&persisted)?)
    }

    pub fn from_json_str(json: &str) -> RelfeatResult<Self> {
        let persisted: PersistedFeatureSet = serde_json::from_str(json)?;
        let set = Self {
            names: persisted.names.into_iter().collect(),
        };
        let found = set.fingerprint();
        if found != persisted.fingerprint {
            return Err(RelfeatError::FeatureSpaceMismatch {
                expected: persisted.fingerprint,
                found,
            });
        }
        Ok(set)
    }

    pub fn save(&self, path: &Path) -> RelfeatResult<()> {
        std::fs::write(path, self.to_json_string()?)?;
        info!("Saved {} feature names to {}", self.len(), path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> RelfeatResult<Self> {
        let set = Self::from_json_str(&std::fs::read_to_string(path)?)?;
        debug!("Loaded {} feature names from {}", set.len(), path.display());
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_are_dense_and_one_based() {
        let mut set = FeatureSet::new();
        assert_eq!(set.get_or_register("a"), 1);
        assert_eq!(set.get_or_register("b"), 2);
        assert_eq!(set.get_or_register("a"), 1);
        assert_eq!(set.len(), 2);
        assert_eq!(set.name_of(2), Some("b"));
        assert_eq!(set.name_of(0), None);
        assert!(set.contains_index(1));
        assert!(!set.contains_index(0));
        assert!(!set.contains_index(3));
    }

    #[test]
    fn inference_never_registers() {
        let mut set = FeatureSet::new();
        set.get_or_register("known");
        let mut features = BTreeMap::new();
        assert!(set.add_to_edge(&mut features, "known", 1.0, false));
        assert!(!set.add_to_edge(&mut features, "unknown", 1.0, false));
        assert_eq!(set.len(), 1);
        assert_eq!(features.len(), 1);
        assert_eq!(features[&1], 1.0);
    }

    #[test]
    fn training_overwrites_value() {
        let mut set = FeatureSet::new();
        let mut features = BTreeMap::new();
        set.add_to_edge(&mut features, "count", 3.0, true);
        set.add_to_edge(&mut features, "count", 4.0, true);
        assert_eq!(features.get(&1), Some(&4.0));
    }

    #[test]
    fn fingerprint_depends_on_order() {
        let mut ab = FeatureSet::new();
        ab.get_or_register("a");
        ab.get_or_register("b");
        let mut ba = FeatureSet::new();
        ba.get_or_register("b");
        ba.get_or_register("a");
        assert_ne!(ab.fingerprint(), ba.fingerprint());
        assert_eq!(ab.fingerprint(), ab.clone().fingerprint());
    }

    #[test]
    fn save_and_load_keep_indices() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("features.json");
        let mut set = FeatureSet::new();
        set.get_or_register("LD_lemma_1_gram_[bind]");
        set.get_or_register("LD_pos_1_gram_[VBZ]");
        set.save(&path).unwrap();

        let loaded = FeatureSet::load(&path).unwrap();
        assert_eq!(loaded, set);
        assert_eq!(loaded.index_of("LD_pos_1_gram_[VBZ]"), Some(2));
    }

    #[test]
    fn tampered_file_is_rejected() {
        let json = r#"{"fingerprint":"abc","names":["a"]}"#;
        let err = FeatureSet::from_json_str(json).unwrap_err();
        assert!(matches!(err, RelfeatError::FeatureSpaceMismatch { .. }));
    }
}
