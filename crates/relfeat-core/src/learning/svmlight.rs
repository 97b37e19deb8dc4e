//! Bridge to Alessandro Moschitti's Tree Kernels in SVM-light.
//!
//! Edges are written one per line in the solver's text format, the external
//! `svm_learn` / `svm_classify` executables are run, and the scores are read
//! back onto the edges.  The input format carries no edge identifier: the n-th
//! prediction belongs to the n-th edge of `Dataset::edges()`, so serialization
//! for classification and read-back must see the dataset in the same state.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use crate::config::SvmConfig;
use crate::errors::{RelfeatError, RelfeatResult};
use crate::features::registry::FeatureSet;
use crate::learning::backend::{
    SolverBackend, SolverCommand, SubprocessSolver, SVM_CLASSIFY, SVM_LEARN,
};
use crate::models::{is_class_label, Dataset, Edge, NEGATIVE_LABEL, POSITIVE_LABEL};

/// Scores at or above this value are read back as the positive class.
pub const POSITIVE_THRESHOLD: f64 = -0.1;

pub const TREE_BEGIN: &str = "|BT|";
pub const TREE_END: &str = "|ET|";
/// Target written for edges whose label is unknown.
pub const UNKNOWN_TARGET: &str = "?";
pub const PREDICTIONS_FILE: &str = "predictions";
pub const MODEL_FILE: &str = "model";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Train,
    Test,
    Predict,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Train => "train",
            Mode::Test => "test",
            Mode::Predict => "predict",
        }
    }
}

impl FromStr for Mode {
    type Err = RelfeatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "train" => Ok(Mode::Train),
            "test" => Ok(Mode::Test),
            "predict" => Ok(Mode::Predict),
            other => Err(RelfeatError::Config(format!("unknown mode: {other}"))),
        }
    }
}

/// Progress of one solver run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Serialized,
    Trained,
    Classified,
    ReadBack,
    /// A step failed; nothing else runs until `reset()`.
    Failed,
}

/// States a new input file may be written from: any but `Failed`.
const SERIALIZE_FROM: &[RunState] = &[
    RunState::Idle,
    RunState::Serialized,
    RunState::Trained,
    RunState::Classified,
    RunState::ReadBack,
];
const LEARN_FROM: &[RunState] = &[RunState::Serialized];
const CLASSIFY_FROM: &[RunState] = &[RunState::Serialized, RunState::Trained];
const READ_BACK_FROM: &[RunState] = &[RunState::Classified];

/// Map a solver score onto a class label.
pub fn score_to_label(score: f64) -> i32 {
    if score >= POSITIVE_THRESHOLD {
        POSITIVE_LABEL
    } else {
        NEGATIVE_LABEL
    }
}

/// Parse a predictions file: one float per line.
pub fn parse_predictions(text: &str) -> RelfeatResult<Vec<f64>> {
    text.lines()
        .enumerate()
        .map(|(i, line)| {
            line.trim()
                .parse::<f64>()
                .map_err(|_| RelfeatError::MalformedPrediction {
                    line: i + 1,
                    content: line.to_string(),
                })
        })
        .collect()
}

/// RNG for the undersampling draw, seeded when a seed is given.
pub fn undersampling_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

fn write_instance(
    out: &mut String,
    target: &str,
    tree: Option<&str>,
    edge: &Edge,
    features: &FeatureSet,
) {
    out.push_str(target);
    if let Some(tree) = tree {
        out.push_str(&format!(" {TREE_BEGIN} {tree} {TREE_END}"));
    }
    for (&index, value) in &edge.features {
        if features.contains_index(index) {
            out.push_str(&format!(" {index}:{value}"));
        }
    }
    out.push('\n');
}

/// Render the solver input for `dataset`.  Returns the text and the number of
/// instances in it.
///
/// Train and test lines need a `+1`/`-1` target; predict lines always carry
/// `?`.  In train mode an edge of `minority_class` is kept only when the draw
/// falls below `undersampling`.
pub fn render_input<R: Rng>(
    dataset: &Dataset,
    mode: Mode,
    features: &FeatureSet,
    use_tree_kernel: bool,
    undersampling: f64,
    minority_class: i32,
    rng: &mut R,
) -> RelfeatResult<(String, usize)> {
    let mut out = String::new();
    let mut written = 0;
    for (position, ctx) in dataset.edge_contexts().enumerate() {
        let edge = ctx.edge;
        if mode != Mode::Predict && !is_class_label(edge.target) {
            return Err(RelfeatError::InvalidTarget {
                position,
                target: edge.target,
            });
        }
        if mode == Mode::Train
            && edge.target == minority_class
            && rng.gen::<f64>() >= undersampling
        {
            continue;
        }
        let tree = if use_tree_kernel {
            Some(ctx.parse_tree()?)
        } else {
            None
        };
        let target = match mode {
            Mode::Train | Mode::Test => format!("{:+}", edge.target),
            Mode::Predict => UNKNOWN_TARGET.to_string(),
        };
        write_instance(&mut out, &target, tree, edge, features);
        written += 1;
    }
    Ok((out, written))
}

pub struct SvmLightTreeKernels<B: SolverBackend = SubprocessSolver> {
    directory: PathBuf,
    model_path: PathBuf,
    use_tree_kernel: bool,
    c: f64,
    undersampling: f64,
    minority_class: i32,
    svm_learn_call: PathBuf,
    svm_classify_call: PathBuf,
    backend: B,
    rng: StdRng,
    state: RunState,
}

impl SvmLightTreeKernels<SubprocessSolver> {
    /// Bridge with the default solver settings.
    pub fn new(
        directory: impl Into<PathBuf>,
        model_path: Option<PathBuf>,
        use_tree_kernel: bool,
    ) -> Self {
        let config = SvmConfig {
            directory: directory.into(),
            model_path,
            use_tree_kernel,
            ..SvmConfig::default()
        };
        Self::with_backend(&config, SubprocessSolver)
    }

    pub fn from_config(config: &SvmConfig) -> RelfeatResult<Self> {
        config.validate()?;
        Ok(Self::with_backend(config, SubprocessSolver))
    }
}

impl<B: SolverBackend> SvmLightTreeKernels<B> {
    /// Bridge over `backend`; `config` is taken as given, without validation.
    pub fn with_backend(config: &SvmConfig, backend: B) -> Self {
        let directory = config.directory.clone();
        let executable =
            |name: &str| directory.join(format!("{name}{}", std::env::consts::EXE_SUFFIX));
        Self {
            svm_learn_call: executable(SVM_LEARN),
            svm_classify_call: executable(SVM_CLASSIFY),
            model_path: config
                .model_path
                .clone()
                .unwrap_or_else(|| directory.join(MODEL_FILE)),
            use_tree_kernel: config.use_tree_kernel,
            c: config.c,
            undersampling: config.undersampling,
            minority_class: config.minority_class,
            rng: undersampling_rng(config.seed),
            directory,
            backend,
            state: RunState::Idle,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    pub fn use_tree_kernel(&self) -> bool {
        self.use_tree_kernel
    }

    /// Regularization constant used when `learn` is given none.
    pub fn c(&self) -> f64 {
        self.c
    }

    pub fn undersampling(&self) -> f64 {
        self.undersampling
    }

    pub fn minority_class(&self) -> i32 {
        self.minority_class
    }

    /// Start a new run after a failure.
    pub fn reset(&mut self) {
        self.state = RunState::Idle;
    }

    /// Default input file of `mode` inside the working directory.
    pub fn default_file(&self, mode: Mode) -> PathBuf {
        self.directory.join(mode.as_str())
    }

    fn ensure_state(&self, step: &str, allowed: &[RunState]) -> RelfeatResult<()> {
        if self.state == RunState::Failed {
            return Err(RelfeatError::InvalidState(format!(
                "cannot {step}: a previous step of this run failed"
            )));
        }
        if !allowed.contains(&self.state) {
            return Err(RelfeatError::InvalidState(format!(
                "cannot {step} in state {:?}",
                self.state
            )));
        }
        Ok(())
    }

    fn track<T>(&mut self, result: RelfeatResult<T>, next: RunState) -> RelfeatResult<T> {
        self.state = if result.is_ok() { next } else { RunState::Failed };
        result
    }

    /// Render the solver input for `dataset` with this bridge's kernel choice.
    pub fn input_text<R: Rng>(
        &self,
        dataset: &Dataset,
        mode: Mode,
        features: &FeatureSet,
        undersampling: f64,
        minority_class: i32,
        rng: &mut R,
    ) -> RelfeatResult<(String, usize)> {
        render_input(
            dataset,
            mode,
            features,
            self.use_tree_kernel,
            undersampling,
            minority_class,
            rng,
        )
    }

    /// Write the solver input for `dataset` to `file` (default
    /// `<directory>/<mode>`), replacing its content.  `undersampling` and
    /// `minority_class` fall back to the configured values; the draw uses the
    /// bridge's RNG.
    pub fn create_input_file(
        &mut self,
        dataset: &Dataset,
        mode: Mode,
        features: &FeatureSet,
        undersampling: Option<f64>,
        minority_class: Option<i32>,
        file: Option<&Path>,
    ) -> RelfeatResult<usize> {
        self.ensure_state("serialize", SERIALIZE_FROM)?;
        let undersampling = undersampling.unwrap_or(self.undersampling);
        if !(0.0..=1.0).contains(&undersampling) {
            return Err(RelfeatError::Config(format!(
                "undersampling must be within [0, 1], got {undersampling}"
            )));
        }
        let minority_class = minority_class.unwrap_or(self.minority_class);
        let file = file.map_or_else(|| self.default_file(mode), Path::to_path_buf);

        let result = render_input(
            dataset,
            mode,
            features,
            self.use_tree_kernel,
            undersampling,
            minority_class,
            &mut self.rng,
        )
        .and_then(|(text, written)| {
            self.backend.write_input(&file, &text)?;
            Ok(written)
        });
        if let Ok(written) = &result {
            info!(
                "Wrote {written} of {} instances to {} ({})",
                dataset.edge_count(),
                file.display(),
                mode.as_str()
            );
        }
        self.track(result, RunState::Serialized)
    }

    pub fn learn_command(&self, file: &Path, c: f64) -> SolverCommand {
        let command = SolverCommand::new(&self.svm_learn_call);
        let command = if self.use_tree_kernel {
            command
                .args(["-v", "0", "-t", "5", "-T", "1", "-W", "S", "-V", "S", "-C", "+"])
                .arg("-c")
                .arg(c.to_string())
        } else {
            command.arg("-c").arg(c.to_string()).args(["-v", "0"])
        };
        command.arg(file).arg(&self.model_path)
    }

    pub fn classify_command(&self, file: &Path, output: &Path) -> SolverCommand {
        SolverCommand::new(&self.svm_classify_call)
            .args(["-v", "0"])
            .arg(file)
            .arg(&self.model_path)
            .arg(output)
    }

    /// Train a model from `file` (default `<directory>/train`) once an input
    /// file has been written.  `c` defaults to the configured constant.
    pub fn learn(&mut self, file: Option<&Path>, c: Option<f64>) -> RelfeatResult<()> {
        self.ensure_state("learn", LEARN_FROM)?;
        let file = file.map_or_else(|| self.default_file(Mode::Train), Path::to_path_buf);
        let command = self.learn_command(&file, c.unwrap_or(self.c));
        let result = self.backend.run(&command);
        if result.is_ok() {
            info!("Trained model {}", self.model_path.display());
        }
        self.track(result, RunState::Trained)
    }

    /// Classify `file` (default `<directory>/<mode>`) into `output` (default
    /// `<directory>/predictions`).
    pub fn tag(
        &mut self,
        file: Option<&Path>,
        mode: Mode,
        output: Option<&Path>,
    ) -> RelfeatResult<()> {
        self.ensure_state("classify", CLASSIFY_FROM)?;
        let file = file.map_or_else(|| self.default_file(mode), Path::to_path_buf);
        let output =
            output.map_or_else(|| self.directory.join(PREDICTIONS_FILE), Path::to_path_buf);
        let command = self.classify_command(&file, &output);
        let result = self.backend.run(&command);
        self.track(result, RunState::Classified)
    }

    /// Assign the scores of `predictions` (default `<directory>/predictions`)
    /// to the dataset's edges in iteration order, then rebuild the predicted
    /// relations.  Only allowed right after `tag`.  Returns the number of
    /// positive edges.
    pub fn read_predictions(
        &mut self,
        dataset: &mut Dataset,
        predictions: Option<&Path>,
    ) -> RelfeatResult<usize> {
        self.ensure_state("read predictions", READ_BACK_FROM)?;
        let predictions = predictions
            .map_or_else(|| self.directory.join(PREDICTIONS_FILE), Path::to_path_buf);
        let result = self.assign_predictions(dataset, &predictions);
        self.track(result, RunState::ReadBack)
    }

    fn assign_predictions(
        &self,
        dataset: &mut Dataset,
        predictions: &Path,
    ) -> RelfeatResult<usize> {
        let text = self.backend.read_predictions(predictions)?;
        let labels: Vec<i32> = parse_predictions(&text)?
            .into_iter()
            .map(score_to_label)
            .collect();

        let edges = dataset.edge_count();
        if labels.len() != edges {
            warn!(
                "{} holds {} scores for {edges} edges",
                predictions.display(),
                labels.len()
            );
            return Err(RelfeatError::PredictionCountMismatch {
                predictions: labels.len(),
                edges,
            });
        }

        for (edge, label) in dataset.edges_mut().zip(&labels) {
            edge.target = *label;
        }
        dataset.form_predicted_relations();

        let positives = labels.iter().filter(|&&l| l == POSITIVE_LABEL).count();
        debug!("Read {} predictions, {positives} positive", labels.len());
        Ok(positives)
    }
}
