//! relfeat core library: dependency-window features for relation extraction
//! and the bridge to the SVM-light tree-kernel solver.
//!
//! The feature generator turns every candidate edge of a corpus into named
//! n-gram features; the solver bridge serializes those edges, runs the
//! external `svm_learn` / `svm_classify` executables and reads predictions
//! back.  With the `python` feature the crate also builds the `_relfeat_core`
//! extension module used by the Python pipeline.

pub mod config;
pub mod errors;
pub mod features;
pub mod graphs;
pub mod learning;
pub mod models;

#[cfg(feature = "python")]
pub mod python;

#[cfg(test)]
mod fixtures;

#[cfg(feature = "python")]
use pyo3::prelude::*;

// ---------------------------------------------------------------------------
// Top-level Python module: _relfeat_core
// ---------------------------------------------------------------------------

#[cfg(feature = "python")]
#[pymodule]
fn _relfeat_core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    // -- Features, registry and solver bridge -------------------------------
    python::register(m)?;

    // -- Window codes -------------------------------------------------------
    m.add("FAMILY_PLACEHOLDER", features::naming::FAMILY_PLACEHOLDER)?;
    m.add("NGRAM_PLACEHOLDER", features::naming::NGRAM_PLACEHOLDER)?;

    Ok(())
}
