//! Run configuration for feature generation and the SVM-light bridge.
//!
//! Every option has a default, so an empty JSON object is a valid
//! configuration.  `RELFEAT_SVMLIGHT_DIR` and `RELFEAT_TREE_KERNEL` override
//! the solver settings when set.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{RelfeatError, RelfeatResult};
use crate::features::naming::FAMILY_PLACEHOLDER;
use crate::features::window::WindowFamily;
use crate::models::NEGATIVE_LABEL;

pub const SVMLIGHT_DIR_ENV: &str = "RELFEAT_SVMLIGHT_DIR";
pub const TREE_KERNEL_ENV: &str = "RELFEAT_TREE_KERNEL";

fn default_grams() -> Vec<usize> {
    vec![1, 2, 3, 4]
}

/// Name templates of the dependency sub-features; `None` disables one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureTemplates {
    pub lemma_n_gram: Option<String>,
    pub pos_n_gram: Option<String>,
    pub tokens_count_n_gram: Option<String>,
    pub tokens_count_without_punct_n_gram: Option<String>,
    /// Only read for the parse-dependency window.
    pub undirected_edges_n_gram: Option<String>,
}

impl Default for FeatureTemplates {
    fn default() -> Self {
        Self {
            lemma_n_gram: Some("XX_lemma_N_gram".to_string()),
            pos_n_gram: Some("XX_pos_N_gram".to_string()),
            tokens_count_n_gram: Some("XX_tokens_count_N_gram".to_string()),
            tokens_count_without_punct_n_gram: Some(
                "XX_tokens_count_without_punct_N_gram".to_string(),
            ),
            undirected_edges_n_gram: Some("XX_undirected_edges_N_gram".to_string()),
        }
    }
}

impl FeatureTemplates {
    pub fn disabled() -> Self {
        Self {
            lemma_n_gram: None,
            pos_n_gram: None,
            tokens_count_n_gram: None,
            tokens_count_without_punct_n_gram: None,
            undirected_edges_n_gram: None,
        }
    }

    fn all(&self) -> [(&'static str, Option<&str>); 5] {
        [
            ("lemma_n_gram", self.lemma_n_gram.as_deref()),
            ("pos_n_gram", self.pos_n_gram.as_deref()),
            ("tokens_count_n_gram", self.tokens_count_n_gram.as_deref()),
            (
                "tokens_count_without_punct_n_gram",
                self.tokens_count_without_punct_n_gram.as_deref(),
            ),
            (
                "undirected_edges_n_gram",
                self.undirected_edges_n_gram.as_deref(),
            ),
        ]
    }
}

/// Hyper-parameters of the dependency feature generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DependencyConfig {
    /// Outer window size, in tokens.
    pub ow_size: usize,
    /// Inner window size, in tokens.
    pub iw_size: usize,
    pub ow_grams: Vec<usize>,
    pub iw_grams: Vec<usize>,
    pub ld_grams: Vec<usize>,
    pub pd_grams: Vec<usize>,
    pub templates: FeatureTemplates,
    /// Compute edge features on the rayon pool.
    pub parallel: bool,
}

impl Default for DependencyConfig {
    fn default() -> Self {
        Self {
            ow_size: 4,
            iw_size: 4,
            ow_grams: default_grams(),
            iw_grams: default_grams(),
            ld_grams: default_grams(),
            pd_grams: default_grams(),
            templates: FeatureTemplates::default(),
            parallel: false,
        }
    }
}

impl DependencyConfig {
    pub fn grams(&self, family: WindowFamily) -> &[usize] {
        match family {
            WindowFamily::OuterWindow => &self.ow_grams,
            WindowFamily::InnerWindow => &self.iw_grams,
            WindowFamily::LinearDependency => &self.ld_grams,
            WindowFamily::ParseDependency => &self.pd_grams,
        }
    }

    pub fn validate(&self) -> RelfeatResult<()> {
        let families = [
            WindowFamily::OuterWindow,
            WindowFamily::InnerWindow,
            WindowFamily::LinearDependency,
            WindowFamily::ParseDependency,
        ];
        for family in families {
            if self.grams(family).contains(&0) {
                return Err(RelfeatError::Config(format!(
                    "n-gram size 0 configured for {}",
                    family.code()
                )));
            }
        }
        for (option, template) in self.templates.all() {
            if let Some(template) = template {
                if !template.contains(FAMILY_PLACEHOLDER) {
                    return Err(RelfeatError::Config(format!(
                        "template {option} = {template:?} lacks the \
                         {FAMILY_PLACEHOLDER} placeholder"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Settings of the SVM-light bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SvmConfig {
    /// Directory holding `svm_learn` / `svm_classify`; also the default
    /// location of the input, model and prediction files.
    pub directory: PathBuf,
    /// Defaults to `<directory>/model`.
    pub model_path: Option<PathBuf>,
    pub use_tree_kernel: bool,
    /// Regularization constant passed as `-c`.
    pub c: f64,
    /// Probability of keeping a minority-label edge in the training file.
    pub undersampling: f64,
    pub minority_class: i32,
    /// Seed for the undersampling draw; random when unset.
    pub seed: Option<u64>,
}

impl Default for SvmConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
            model_path: None,
            use_tree_kernel: true,
            c: 0.5,
            undersampling: 0.4,
            minority_class: NEGATIVE_LABEL,
            seed: None,
        }
    }
}

impl SvmConfig {
    pub fn validate(&self) -> RelfeatResult<()> {
        if !(0.0..=1.0).contains(&self.undersampling) {
            return Err(RelfeatError::Config(format!(
                "undersampling must be within [0, 1], got {}",
                self.undersampling
            )));
        }
        if !(self.c.is_finite() && self.c > 0.0) {
            return Err(RelfeatError::Config(format!(
                "regularization constant must be positive, got {}",
                self.c
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelfeatConfig {
    pub dependency: DependencyConfig,
    pub svm: SvmConfig,
}

impl RelfeatConfig {
    pub fn from_json_str(json: &str) -> RelfeatResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> RelfeatResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> RelfeatResult<()> {
        self.dependency.validate()?;
        self.svm.validate()
    }

    /// Apply the `RELFEAT_*` environment overrides.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(
            std::env::var(SVMLIGHT_DIR_ENV).ok(),
            std::env::var(TREE_KERNEL_ENV).ok(),
        )
    }

    fn with_overrides(mut self, directory: Option<String>, tree_kernel: Option<String>) -> Self {
        if let Some(dir) = directory.filter(|d| !d.trim().is_empty()) {
            self.svm.directory = PathBuf::from(dir);
        }
        if let Some(flag) = tree_kernel {
            let v = flag.trim().to_lowercase();
            self.svm.use_tree_kernel = !matches!(v.as_str(), "0" | "false" | "no" | "off");
        }
        self
    }
}
