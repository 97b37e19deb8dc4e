//! Python surface of the `_relfeat_core` extension module.
//!
//! Corpora cross the boundary as JSON documents in the `Dataset` layout, the
//! same way query results travel as JSON elsewhere in the pipeline.

use std::path::PathBuf;

use pyo3::prelude::*;

use crate::config::RelfeatConfig;
use crate::features::dependency::DependencyFeatureGenerator;
use crate::features::registry::FeatureSet;
use crate::learning::svmlight::{Mode, SvmLightTreeKernels, POSITIVE_THRESHOLD};
use crate::models::Dataset;

// ---------------------------------------------------------------------------
// FeatureSet
// ---------------------------------------------------------------------------

#[pyclass(name = "FeatureSet")]
#[derive(Default)]
pub struct PyFeatureSet {
    inner: FeatureSet,
}

#[pymethods]
impl PyFeatureSet {
    #[new]
    fn new() -> Self {
        Self::default()
    }

    fn __len__(&self) -> usize {
        self.inner.len()
    }

    fn __contains__(&self, name: &str) -> bool {
        self.inner.index_of(name).is_some()
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.inner.index_of(name)
    }

    fn name_of(&self, index: usize) -> Option<String> {
        self.inner.name_of(index).map(str::to_string)
    }

    fn fingerprint(&self) -> String {
        self.inner.fingerprint()
    }

    fn save(&self, path: PathBuf) -> PyResult<()> {
        Ok(self.inner.save(&path)?)
    }

    #[staticmethod]
    fn load(path: PathBuf) -> PyResult<Self> {
        Ok(Self {
            inner: FeatureSet::load(&path)?,
        })
    }

    fn __repr__(&self) -> String {
        format!("FeatureSet(len={})", self.inner.len())
    }
}

// ---------------------------------------------------------------------------
// Feature generation
// ---------------------------------------------------------------------------

/// Generate dependency features for every edge of a JSON dataset.
///
/// Returns the updated dataset JSON and the positions of the edges whose
/// features could not be generated.
#[pyfunction]
#[pyo3(signature = (dataset_json, feature_set, is_train, config_json=None))]
pub fn generate_dependency_features(
    dataset_json: &str,
    mut feature_set: PyRefMut<'_, PyFeatureSet>,
    is_train: bool,
    config_json: Option<&str>,
) -> PyResult<(String, Vec<usize>)> {
    let config = match config_json {
        Some(json) => RelfeatConfig::from_json_str(json)?,
        None => RelfeatConfig::default(),
    };
    let generator = DependencyFeatureGenerator::new(config.dependency)?;
    let mut dataset = Dataset::from_json_str(dataset_json)?;
    let report = generator.generate(&mut dataset, &mut feature_set.inner, is_train);
    Ok((dataset.to_json_string()?, report.failed_positions()))
}

// ---------------------------------------------------------------------------
// SVM-light bridge
// ---------------------------------------------------------------------------

#[pyclass(name = "SvmLightTreeKernels")]
pub struct PySvmLightTreeKernels {
    inner: SvmLightTreeKernels,
}

#[pymethods]
impl PySvmLightTreeKernels {
    /// Solver settings come from the `svm` section of `config_json` plus the
    /// `RELFEAT_*` environment overrides; `directory` replaces both.
    #[new]
    #[pyo3(signature = (directory=None, config_json=None))]
    fn new(directory: Option<PathBuf>, config_json: Option<&str>) -> PyResult<Self> {
        let config = match config_json {
            Some(json) => RelfeatConfig::from_json_str(json)?,
            None => RelfeatConfig::default(),
        };
        let mut svm = config.with_env_overrides().svm;
        if let Some(directory) = directory {
            svm.directory = directory;
        }
        Ok(Self {
            inner: SvmLightTreeKernels::from_config(&svm)?,
        })
    }

    #[pyo3(signature = (
        dataset_json, mode, feature_set, undersampling=None, minority_class=None, file=None
    ))]
    fn create_input_file(
        &mut self,
        dataset_json: &str,
        mode: &str,
        feature_set: PyRef<'_, PyFeatureSet>,
        undersampling: Option<f64>,
        minority_class: Option<i32>,
        file: Option<PathBuf>,
    ) -> PyResult<usize> {
        let dataset = Dataset::from_json_str(dataset_json)?;
        let mode: Mode = mode.parse()?;
        Ok(self.inner.create_input_file(
            &dataset,
            mode,
            &feature_set.inner,
            undersampling,
            minority_class,
            file.as_deref(),
        )?)
    }

    #[pyo3(signature = (file=None, c=None))]
    fn learn(&mut self, file: Option<PathBuf>, c: Option<f64>) -> PyResult<()> {
        Ok(self.inner.learn(file.as_deref(), c)?)
    }

    #[pyo3(signature = (file=None, mode="predict", output=None))]
    fn tag(
        &mut self,
        file: Option<PathBuf>,
        mode: &str,
        output: Option<PathBuf>,
    ) -> PyResult<()> {
        let mode: Mode = mode.parse()?;
        Ok(self.inner.tag(file.as_deref(), mode, output.as_deref())?)
    }

    /// Returns the dataset JSON with predicted targets and relations.
    #[pyo3(signature = (dataset_json, predictions=None))]
    fn read_predictions(
        &mut self,
        dataset_json: &str,
        predictions: Option<PathBuf>,
    ) -> PyResult<String> {
        let mut dataset = Dataset::from_json_str(dataset_json)?;
        self.inner.read_predictions(&mut dataset, predictions.as_deref())?;
        Ok(dataset.to_json_string()?)
    }

    fn reset(&mut self) {
        self.inner.reset();
    }

    #[getter]
    fn state(&self) -> String {
        format!("{:?}", self.inner.state())
    }

    #[getter]
    fn model_path(&self) -> PathBuf {
        self.inner.model_path().to_path_buf()
    }
}

pub fn register(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyFeatureSet>()?;
    m.add_class::<PySvmLightTreeKernels>()?;
    m.add_function(wrap_pyfunction!(generate_dependency_features, m)?)?;
    m.add("POSITIVE_THRESHOLD", POSITIVE_THRESHOLD)?;
    Ok(())
}
