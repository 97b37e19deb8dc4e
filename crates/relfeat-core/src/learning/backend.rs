//! Execution backends for the SVM-light executables.
//!
//! The bridge only ever writes an input file, runs a command, and reads the
//! predictions back.  [`SubprocessSolver`] does this against the filesystem
//! and real child processes; [`InMemorySolver`] keeps files in memory and
//! emulates the two executables so the serialize/read-back contract can be
//! tested without them.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::errors::{RelfeatError, RelfeatResult};

pub const SVM_LEARN: &str = "svm_learn";
pub const SVM_CLASSIFY: &str = "svm_classify";

/// A program plus its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolverCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl SolverCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl AsRef<std::ffi::OsStr>) -> Self {
        self.args.push(arg.as_ref().to_string_lossy().into_owned());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        for arg in args {
            self = self.arg(arg);
        }
        self
    }

    /// Executable name without directory or platform suffix.
    pub fn program_stem(&self) -> String {
        self.program
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

impl fmt::Display for SolverCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

pub trait SolverBackend {
    /// Replace the content of `path` with `contents`.
    fn write_input(&self, path: &Path, contents: &str) -> RelfeatResult<()>;

    fn read_predictions(&self, path: &Path) -> RelfeatResult<String>;

    /// Run `command` to completion; a non-zero exit is an error.
    fn run(&self, command: &SolverCommand) -> RelfeatResult<()>;
}

// ---------------------------------------------------------------------------
// Subprocess backend
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct SubprocessSolver;

impl SolverBackend for SubprocessSolver {
    fn write_input(&self, path: &Path, contents: &str) -> RelfeatResult<()> {
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn read_predictions(&self, path: &Path) -> RelfeatResult<String> {
        Ok(std::fs::read_to_string(path)?)
    }

    fn run(&self, command: &SolverCommand) -> RelfeatResult<()> {
        info!("Running {command}");
        let status = Command::new(&command.program)
            .args(&command.args)
            .status()
            .map_err(|source| RelfeatError::SolverSpawn {
                command: command.to_string(),
                source,
            })?;
        if !status.success() {
            return Err(RelfeatError::SolverFailed {
                command: command.to_string(),
                status: status.to_string(),
            });
        }
        debug!("{} finished: {status}", command.program_stem());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// In-memory backend
// ---------------------------------------------------------------------------

/// Backend that keeps files in memory and answers classification requests
/// with scripted prediction lines.
#[derive(Debug, Default)]
pub struct InMemorySolver {
    files: Mutex<HashMap<PathBuf, String>>,
    predictions: Mutex<Vec<String>>,
    commands: Mutex<Vec<SolverCommand>>,
    failing: Mutex<HashSet<String>>,
}

impl InMemorySolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines written to the output file by the next `svm_classify` runs.
    pub fn with_predictions<I, S>(self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *self.predictions.lock() = lines.into_iter().map(Into::into).collect();
        self
    }

    /// Make every run of `program` (e.g. `svm_learn`) exit with status 1.
    pub fn failing(self, program: &str) -> Self {
        self.failing.lock().insert(program.to_string());
        self
    }

    pub fn file(&self, path: &Path) -> Option<String> {
        self.files.lock().get(path).cloned()
    }

    pub fn put_file(&self, path: &Path, contents: &str) {
        self.files.lock().insert(path.to_path_buf(), contents.to_string());
    }

    pub fn commands(&self) -> Vec<SolverCommand> {
        self.commands.lock().clone()
    }

    fn require(&self, path: &str, command: &SolverCommand) -> RelfeatResult<()> {
        if self.files.lock().contains_key(Path::new(path)) {
            Ok(())
        } else {
            Err(RelfeatError::SolverFailed {
                command: command.to_string(),
                status: format!("exit status: 1 (missing {path})"),
            })
        }
    }
}

impl SolverBackend for InMemorySolver {
    fn write_input(&self, path: &Path, contents: &str) -> RelfeatResult<()> {
        self.put_file(path, contents);
        Ok(())
    }

    fn read_predictions(&self, path: &Path) -> RelfeatResult<String> {
        self.file(path).ok_or_else(|| {
            RelfeatError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} not found", path.display()),
            ))
        })
    }

    fn run(&self, command: &SolverCommand) -> RelfeatResult<()> {
        self.commands.lock().push(command.clone());
        let program = command.program_stem();
        if self.failing.lock().contains(&program) {
            return Err(RelfeatError::SolverFailed {
                command: command.to_string(),
                status: "exit status: 1".to_string(),
            });
        }

        let n = command.args.len();
        match program.as_str() {
            SVM_LEARN if n >= 2 => {
                self.require(&command.args[n - 2], command)?;
                self.put_file(Path::new(&command.args[n - 1]), "SVM-light model (in memory)\n");
            }
            SVM_CLASSIFY if n >= 3 => {
                self.require(&command.args[n - 3], command)?;
                self.require(&command.args[n - 2], command)?;
                let mut output = self.predictions.lock().join("\n");
                if !output.is_empty() {
                    output.push('\n');
                }
                self.put_file(Path::new(&command.args[n - 1]), &output);
            }
            _ => {
                return Err(RelfeatError::SolverFailed {
                    command: command.to_string(),
                    status: "exit status: 127 (unknown program)".to_string(),
                })
            }
        }
        Ok(())
    }
}
