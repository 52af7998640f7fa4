//! symqemu-harness library
//!
//! Differential regression harness for the SymQEMU concolic emulator: run a
//! test binary under the emulator with a seed input, collect the test cases
//! it generates, and compare them by content against a recorded baseline.

pub mod collector;
pub mod compare;
pub mod config;
pub mod diff;
pub mod digest;
pub mod error;
pub mod fixture;
pub mod harness;
pub mod runner;
pub mod suite;

pub use collector::{collect, OutputFile, OutputSet};
pub use compare::{Comparator, ComparisonPolicy, ComparisonResult};
pub use config::Config;
pub use diff::DiffReporter;
pub use digest::ContentDigest;
pub use error::{HarnessError, Result};
pub use fixture::{ArgumentTemplate, Fixture, INPUT_PLACEHOLDER};
pub use harness::{Harness, OutputMode, Verdict};
pub use runner::{EmulatorRunner, RunOutcome, RunRequest};
pub use suite::{FixtureOutcome, Suite, SuiteResult};
