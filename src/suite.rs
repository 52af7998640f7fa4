//! Fixture suite: discovery, sequential execution, summary report.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{HarnessError, Result};
use crate::fixture::{self, Fixture};
use crate::harness::{Harness, Verdict};

/// Result of running a single fixture.
#[derive(Debug)]
pub enum FixtureOutcome {
    /// Generated test cases match the baseline.
    Pass { matched: usize, elapsed: Duration },
    /// The run succeeded but its test cases differ from the baseline.
    Mismatch { verdict: Box<Verdict> },
    /// The emulator exited non-zero or could not be started.
    RunFailed { error: HarnessError },
    /// The emulator was killed after the timeout.
    Timeout { error: HarnessError },
    /// The fixture or one of its directories could not be read.
    LoadError { error: HarnessError },
}

impl FixtureOutcome {
    /// Classify the result of [`Harness::verify`].
    pub fn from_result(result: Result<Verdict>) -> Self {
        match result {
            Ok(verdict) if verdict.passed() => FixtureOutcome::Pass {
                matched: verdict.result.matched.len(),
                elapsed: verdict.run.elapsed,
            },
            Ok(verdict) => FixtureOutcome::Mismatch {
                verdict: Box::new(verdict),
            },
            Err(error) => Self::from_error(error),
        }
    }

    fn from_error(error: HarnessError) -> Self {
        match error {
            HarnessError::EmulatorTimedOut { .. } => FixtureOutcome::Timeout { error },
            HarnessError::EmulatorRunFailed { .. } | HarnessError::EmulatorSpawnFailed { .. } => {
                FixtureOutcome::RunFailed { error }
            }
            error => FixtureOutcome::LoadError { error },
        }
    }

    /// Check if the fixture passed.
    pub fn is_pass(&self) -> bool {
        matches!(self, FixtureOutcome::Pass { .. })
    }
}

/// Summary of a suite run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SuiteResult {
    /// Total number of fixtures.
    pub total: usize,
    /// Number of passed fixtures.
    pub passed: usize,
    /// Number of fixtures whose test cases differ from the baseline.
    pub mismatched: usize,
    /// Number of fixtures whose emulator run failed.
    pub run_failed: usize,
    /// Number of fixtures that timed out.
    pub timeout: usize,
    /// Number of fixtures that failed to load.
    pub load_error: usize,
}

impl SuiteResult {
    /// Get pass rate as a percentage.
    pub fn pass_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.passed as f64 / self.total as f64) * 100.0
        }
    }

    pub fn all_passed(&self) -> bool {
        self.passed == self.total
    }
}

/// Fixtures under one binaries root, run one after another.
pub struct Suite {
    root: PathBuf,
    /// Fixture names, in run order.
    names: Vec<String>,
    harness: Harness,
    /// Results from completed fixtures.
    results: Vec<(String, FixtureOutcome)>,
}

impl Suite {
    /// Discover every fixture under `root`.
    pub fn discover(root: impl AsRef<Path>, harness: Harness) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let names = fixture::discover(&root)?;
        log::info!("discovered {} fixtures in {}", names.len(), root.display());
        Ok(Self {
            root,
            names,
            harness,
            results: Vec::new(),
        })
    }

    /// Restrict the suite to `names`, in the given order. Repeated names
    /// run once, at their first position.
    ///
    /// Fails on a name that was not discovered.
    pub fn select(&mut self, names: &[String]) -> Result<()> {
        if names.is_empty() {
            return Ok(());
        }
        let mut selected: Vec<String> = Vec::with_capacity(names.len());
        for name in names {
            if !self.names.contains(name) {
                return Err(HarnessError::fixture(
                    self.root.join(name),
                    "no such fixture",
                ));
            }
            if !selected.contains(name) {
                selected.push(name.clone());
            }
        }
        self.names = selected;
        Ok(())
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Get the number of fixtures.
    pub fn fixture_count(&self) -> usize {
        self.names.len()
    }

    /// Run one fixture by name.
    pub fn run_single(&self, name: &str) -> FixtureOutcome {
        let fixture = match Fixture::load(&self.root, name) {
            Ok(f) => f,
            Err(error) => return FixtureOutcome::LoadError { error },
        };
        FixtureOutcome::from_result(self.harness.verify(&fixture))
    }

    /// Run all fixtures and return summary.
    pub fn run_all(&mut self) -> SuiteResult {
        let mut result = SuiteResult {
            total: self.names.len(),
            ..Default::default()
        };
        self.results.clear();

        for name in &self.names {
            log::info!("running fixture {}", name);
            let outcome = self.run_single(name);

            match &outcome {
                FixtureOutcome::Pass { .. } => result.passed += 1,
                FixtureOutcome::Mismatch { .. } => result.mismatched += 1,
                FixtureOutcome::RunFailed { .. } => result.run_failed += 1,
                FixtureOutcome::Timeout { .. } => result.timeout += 1,
                FixtureOutcome::LoadError { .. } => result.load_error += 1,
            }

            self.results.push((name.clone(), outcome));
        }

        result
    }

    /// Get all fixture results.
    pub fn results(&self) -> &[(String, FixtureOutcome)] {
        &self.results
    }

    /// Generate a summary report.
    pub fn summary_report(&self, result: &SuiteResult) -> String {
        let mut report = String::new();

        report.push_str("=== SymQEMU Regression Results ===\n\n");
        report.push_str(&format!(
            "Total: {}, Passed: {}, Mismatched: {}, Run Failed: {}, Timeout: {}, Load Error: {}\n\n",
            result.total,
            result.passed,
            result.mismatched,
            result.run_failed,
            result.timeout,
            result.load_error
        ));

        if !result.all_passed() {
            report.push_str("--- Failed Fixtures ---\n");
            for (name, outcome) in &self.results {
                match outcome {
                    FixtureOutcome::Mismatch { verdict } => {
                        report.push_str(&format!("{}: MISMATCH - {}", name, verdict.result.report()));
                        for diff in &verdict.diffs {
                            report.push_str(&diff.text);
                        }
                    }
                    FixtureOutcome::RunFailed { error } => {
                        report.push_str(&format!("{}: RUN FAILED - {}\n", name, error));
                    }
                    FixtureOutcome::Timeout { error } => {
                        report.push_str(&format!("{}: TIMEOUT - {}\n", name, error));
                    }
                    FixtureOutcome::LoadError { error } => {
                        report.push_str(&format!("{}: LOAD ERROR - {}\n", name, error));
                    }
                    FixtureOutcome::Pass { .. } => {}
                }
            }
            report.push('\n');
        }

        if result.passed > 0 {
            report.push_str("--- Passed Fixtures ---\n");
            for (name, outcome) in &self.results {
                if let FixtureOutcome::Pass { matched, elapsed } = outcome {
                    report.push_str(&format!(
                        "{}: PASS ({} test cases, {:.2}s)\n",
                        name,
                        matched,
                        elapsed.as_secs_f64()
                    ));
                }
            }
            report.push('\n');
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discover_empty_dir() {
        let root = tempfile::tempdir().unwrap();
        let harness = Harness::new(crate::runner::EmulatorRunner::new("/bin/sh"));

        let suite = Suite::discover(root.path(), harness).unwrap();
        assert_eq!(suite.fixture_count(), 0);
    }

    #[test]
    fn test_suite_result_pass_rate() {
        let result = SuiteResult {
            total: 10,
            passed: 7,
            mismatched: 1,
            run_failed: 1,
            timeout: 1,
            load_error: 0,
        };
        assert!((result.pass_rate() - 70.0).abs() < 0.01);
        assert!(!result.all_passed());
        assert_eq!(SuiteResult::default().pass_rate(), 0.0);
    }

    #[test]
    fn test_outcome_classification() {
        let timeout = FixtureOutcome::from_result(Err(HarnessError::EmulatorTimedOut {
            command: "x".to_string(),
            timeout: Duration::from_secs(1),
        }));
        assert!(matches!(timeout, FixtureOutcome::Timeout { .. }));

        let failed = FixtureOutcome::from_result(Err(HarnessError::EmulatorRunFailed {
            command: "x".to_string(),
            exit_code: Some(1),
            stderr: String::new(),
        }));
        assert!(matches!(failed, FixtureOutcome::RunFailed { .. }));

        let load = FixtureOutcome::from_result(Err(HarnessError::fixture("/x", "missing")));
        assert!(matches!(load, FixtureOutcome::LoadError { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_all_mixed() {
        use crate::harness::tests::{sh_harness, write_fixture};

        let root = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        write_fixture(
            root.path(),
            "simple",
            "printf 'D' > \"$SYMCC_OUTPUT_DIR/a\"\n",
            &[("b", "D")],
        );
        write_fixture(
            root.path(),
            "printf",
            "printf 'D1' > \"$SYMCC_OUTPUT_DIR/a\"\n",
            &[("a", "D1"), ("b", "D2")],
        );
        write_fixture(root.path(), "crash", "exit 1\n", &[("a", "D")]);

        let mut suite = Suite::discover(root.path(), sh_harness(scratch.path())).unwrap();
        assert_eq!(suite.names(), ["crash", "printf", "simple"]);

        let result = suite.run_all();
        assert_eq!(result.total, 3);
        assert_eq!(result.passed, 1);
        assert_eq!(result.mismatched, 1);
        assert_eq!(result.run_failed, 1);

        let report = suite.summary_report(&result);
        assert!(report.contains("crash: RUN FAILED"));
        assert!(report.contains("printf: MISMATCH"));
        assert!(report.contains("simple: PASS (1 test cases"));
    }

    #[cfg(unix)]
    #[test]
    fn test_select_unknown_fixture() {
        use crate::harness::tests::{sh_harness, write_fixture};

        let root = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        write_fixture(root.path(), "simple", "exit 0\n", &[]);

        let mut suite = Suite::discover(root.path(), sh_harness(scratch.path())).unwrap();
        suite.select(&["simple".to_string()]).unwrap();
        assert_eq!(suite.fixture_count(), 1);

        let err = suite.select(&["nope".to_string()]).unwrap_err();
        assert!(matches!(err, HarnessError::FixtureLoad { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_select_runs_repeated_name_once() {
        use crate::harness::tests::{sh_harness, write_fixture};

        let root = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        write_fixture(root.path(), "a", "exit 0\n", &[]);
        write_fixture(root.path(), "b", "exit 0\n", &[]);

        let mut suite = Suite::discover(root.path(), sh_harness(scratch.path())).unwrap();
        let picked: Vec<String> = ["b", "a", "b"].iter().map(|s| s.to_string()).collect();
        suite.select(&picked).unwrap();
        assert_eq!(suite.names(), ["b", "a"]);

        let result = suite.run_all();
        assert_eq!(result.total, 2);
        assert!(result.all_passed());
        let ran: Vec<&str> = suite.results().iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(ran, ["b", "a"]);
    }
}
