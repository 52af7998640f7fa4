//! Per-fixture verification pipeline.
//!
//! ```ignore
//! use symqemu_harness::{EmulatorRunner, Fixture, Harness};
//!
//! let harness = Harness::new(EmulatorRunner::new("build/qemu-x86_64"));
//! let fixture = Fixture::load("tests/symqemu/binaries".as_ref(), "simple")?;
//! let verdict = harness.verify(&fixture)?;
//! assert!(verdict.passed(), "{}", verdict.report());
//! ```
//!
//! Each run gets its own output directory: a fresh scratch directory that is
//! removed when the run ends (on success and on failure), or the fixture's
//! `generated_outputs/` when outputs are kept for inspection.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::collector::{collect, OutputSet};
use crate::compare::{Comparator, ComparisonPolicy, ComparisonResult};
use crate::config::Config;
use crate::diff::{DiffReporter, FileDiff};
use crate::error::{HarnessError, Result};
use crate::fixture::Fixture;
use crate::runner::{EmulatorRunner, RunOutcome};

/// Where a run's test cases are written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputMode {
    /// Fresh temporary directory, removed afterwards.
    #[default]
    Scratch,
    /// `<fixture>/generated_outputs`, recreated before each run and kept.
    Persist,
}

/// An output directory owned by one run.
enum OutputDir {
    Scratch(TempDir),
    Persisted(PathBuf),
}

impl OutputDir {
    fn path(&self) -> &Path {
        match self {
            OutputDir::Scratch(dir) => dir.path(),
            OutputDir::Persisted(path) => path,
        }
    }

    fn persisted(&self) -> Option<PathBuf> {
        match self {
            OutputDir::Scratch(_) => None,
            OutputDir::Persisted(path) => Some(path.clone()),
        }
    }
}

/// Verdict for one fixture whose run and collection succeeded.
#[derive(Debug)]
pub struct Verdict {
    pub fixture: String,
    pub result: ComparisonResult,
    /// Rendered diffs for content mismatches (filename policy only).
    pub diffs: Vec<FileDiff>,
    pub run: RunOutcome,
    /// Set when outputs were kept in `generated_outputs/`. Otherwise the
    /// generated paths in `result` point into a directory that no longer exists.
    pub output_dir: Option<PathBuf>,
}

impl Verdict {
    pub fn passed(&self) -> bool {
        self.result.passed()
    }

    /// `Err(ComparisonMismatch)` for a failing verdict.
    pub fn into_result(self) -> Result<Self> {
        if self.passed() {
            return Ok(self);
        }
        Err(HarnessError::ComparisonMismatch {
            fixture: self.fixture.clone(),
            missing: self.result.missing_paths(),
            unexpected: self.result.unexpected_paths(),
            mismatched: self.result.mismatched_paths(),
        })
    }

    /// Comparison report followed by any rendered diffs.
    pub fn report(&self) -> String {
        let mut report = format!("{}: {}", self.fixture, self.result.report());
        for diff in &self.diffs {
            report.push_str(&diff.text);
        }
        report
    }
}

/// Runs fixtures and judges their output.
#[derive(Debug, Clone)]
pub struct Harness {
    runner: EmulatorRunner,
    comparator: Comparator,
    reporter: DiffReporter,
    output_mode: OutputMode,
    /// Parent of scratch directories; system temp dir when unset.
    scratch_root: Option<PathBuf>,
}

impl Harness {
    /// Create a harness with the default content policy and scratch outputs.
    pub fn new(runner: EmulatorRunner) -> Self {
        Self {
            runner,
            comparator: Comparator::default(),
            reporter: DiffReporter::from_env(),
            output_mode: OutputMode::Scratch,
            scratch_root: None,
        }
    }

    /// Build a harness from loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        let runner = EmulatorRunner::new(config.emulator()).with_timeout(config.timeout());
        let mode = if config.keep_outputs() {
            OutputMode::Persist
        } else {
            OutputMode::Scratch
        };
        let mut harness = Self::new(runner)
            .with_policy(config.policy())
            .with_output_mode(mode);
        harness.scratch_root = config.scratch_dir();
        harness
    }

    pub fn with_policy(mut self, policy: ComparisonPolicy) -> Self {
        self.comparator = Comparator::new(policy);
        self
    }

    pub fn with_output_mode(mut self, mode: OutputMode) -> Self {
        self.output_mode = mode;
        self
    }

    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(root.into());
        self
    }

    pub fn with_reporter(mut self, reporter: DiffReporter) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn runner(&self) -> &EmulatorRunner {
        &self.runner
    }

    pub fn policy(&self) -> ComparisonPolicy {
        self.comparator.policy()
    }

    /// Run a fixture and compare its test cases against `expected_outputs/`.
    ///
    /// Run and collection failures are returned as errors; a mismatch is a
    /// failing [`Verdict`], not an error.
    pub fn verify(&self, fixture: &Fixture) -> Result<Verdict> {
        let expected = collect(&fixture.expected_outputs_dir())?;
        let output = self.prepare_output_dir(fixture)?;

        let run = self.runner.run_fixture(fixture, output.path())?;
        let generated = collect(output.path())?;

        let result = self.comparator.compare(&expected, &generated);
        let diffs = if result.mismatched.is_empty() {
            Vec::new()
        } else {
            self.reporter.render_all(&result)
        };

        if result.passed() {
            log::info!("{}: {} test cases match", fixture.name, result.matched.len());
        } else {
            log::warn!(
                "{}: {} missing, {} unexpected, {} mismatched",
                fixture.name,
                result.missing.len(),
                result.unexpected.len(),
                result.mismatched.len()
            );
        }

        Ok(Verdict {
            fixture: fixture.name.clone(),
            result,
            diffs,
            run,
            output_dir: output.persisted(),
        })
    }

    /// Record a fresh baseline by running straight into `expected_outputs/`.
    ///
    /// Refuses to touch an existing baseline. The new directory is removed
    /// again if the run or the collection fails.
    pub fn seed_expected(&self, fixture: &Fixture) -> Result<OutputSet> {
        let dir = fixture.expected_outputs_dir();
        if dir.exists() {
            return Err(HarnessError::ExpectedOutputsExist { path: dir });
        }
        std::fs::create_dir(&dir).map_err(|source| HarnessError::OutputDir {
            path: dir.clone(),
            source,
        })?;

        let seeded = self
            .runner
            .run_fixture(fixture, &dir)
            .and_then(|_| collect(&dir));
        let set = match seeded {
            Ok(set) => set,
            Err(e) => {
                discard_baseline(&dir);
                return Err(e);
            }
        };
        log::info!(
            "Expected outputs for {} generated in {} ({} test cases)",
            fixture.name,
            dir.display(),
            set.len()
        );
        Ok(set)
    }

    fn prepare_output_dir(&self, fixture: &Fixture) -> Result<OutputDir> {
        match self.output_mode {
            OutputMode::Scratch => {
                let prefix = format!("symqemu-{}-", fixture.name);
                let mut builder = tempfile::Builder::new();
                builder.prefix(&prefix);
                let created = match &self.scratch_root {
                    Some(root) => builder.tempdir_in(root),
                    None => builder.tempdir(),
                };
                let dir = created.map_err(|source| HarnessError::OutputDir {
                    path: self
                        .scratch_root
                        .clone()
                        .unwrap_or_else(std::env::temp_dir),
                    source,
                })?;
                log::debug!("scratch output directory {}", dir.path().display());
                Ok(OutputDir::Scratch(dir))
            }
            OutputMode::Persist => {
                let path = fixture.generated_outputs_dir();
                let io_err = |source: std::io::Error| HarnessError::OutputDir {
                    path: path.clone(),
                    source,
                };
                if path.exists() {
                    std::fs::remove_dir_all(&path).map_err(io_err)?;
                }
                std::fs::create_dir_all(&path).map_err(io_err)?;
                Ok(OutputDir::Persisted(path))
            }
        }
    }
}

/// Remove a half-written baseline, including one the run replaced with a symlink.
fn discard_baseline(dir: &Path) {
    let removed = match std::fs::symlink_metadata(dir) {
        Ok(meta) if meta.is_dir() => std::fs::remove_dir_all(dir),
        Ok(_) => std::fs::remove_file(dir),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    };
    if let Err(e) = removed {
        log::warn!("failed to remove {}: {}", dir.display(), e);
    }
}
