//! Fixture model: one test binary and its baseline.
//!
//! A fixture lives in its own directory under the binaries root:
//!
//! ```text
//! <root>/<name>/
//!   binary             the executable to run under the emulator
//!   args               whitespace-separated argument template ('@@' = seed input)
//!   input              seed input bytes
//!   expected_outputs/  reference set of emitted test cases
//!   generated_outputs/ last persisted run (optional)
//! ```

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::error::{HarnessError, Result};

/// Argument token replaced by the seed-input path.
pub const INPUT_PLACEHOLDER: &str = "@@";

pub const BINARY_FILE: &str = "binary";
pub const ARGS_FILE: &str = "args";
pub const INPUT_FILE: &str = "input";
pub const EXPECTED_OUTPUTS_DIR: &str = "expected_outputs";
pub const GENERATED_OUTPUTS_DIR: &str = "generated_outputs";

/// Ordered argument tokens as read from an `args` file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArgumentTemplate {
    tokens: Vec<String>,
}

impl ArgumentTemplate {
    /// Split on any run of whitespace. Blank text yields an empty template.
    pub fn parse(text: &str) -> Self {
        Self {
            tokens: text.split_whitespace().map(str::to_string).collect(),
        }
    }

    pub fn from_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tokens: tokens.into_iter().map(Into::into).collect(),
        }
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Number of placeholder occurrences.
    pub fn placeholder_count(&self) -> usize {
        self.tokens
            .iter()
            .filter(|t| t.as_str() == INPUT_PLACEHOLDER)
            .count()
    }

    /// Substitute every token exactly equal to `@@` with `input`.
    ///
    /// Tokens that merely contain `@@` (e.g. `--file=@@`) are left alone.
    pub fn resolve(&self, input: &Path) -> Vec<OsString> {
        self.tokens
            .iter()
            .map(|token| {
                if token == INPUT_PLACEHOLDER {
                    input.as_os_str().to_os_string()
                } else {
                    OsString::from(token)
                }
            })
            .collect()
    }
}

/// One test binary with its invocation and baseline.
#[derive(Debug, Clone)]
pub struct Fixture {
    /// Fixture name (directory name).
    pub name: String,
    /// Fixture directory.
    pub dir: PathBuf,
    /// Executable run under the emulator.
    pub executable: PathBuf,
    /// Argument template.
    pub args: ArgumentTemplate,
    /// Seed input, symbolically tagged by the emulator.
    pub input: PathBuf,
}

impl Fixture {
    /// Load the fixture called `name` from a binaries root.
    pub fn load(root: &Path, name: &str) -> Result<Self> {
        let dir = root.join(name);
        if !dir.is_dir() {
            return Err(HarnessError::fixture(&dir, "directory does not exist"));
        }
        Self::from_dir(&dir)
    }

    /// Load a fixture from its directory.
    ///
    /// Paths are made absolute because the emulator may run from another
    /// working directory. A missing `args` file means no arguments.
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let dir = std::path::absolute(dir)
            .map_err(|e| HarnessError::fixture(dir, format!("cannot resolve path: {}", e)))?;

        let name = dir
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "unknown".to_string());

        let executable = dir.join(BINARY_FILE);
        if !executable.is_file() {
            return Err(HarnessError::fixture(&dir, "missing `binary`"));
        }

        let input = dir.join(INPUT_FILE);
        if !input.is_file() {
            return Err(HarnessError::fixture(&dir, "missing `input`"));
        }

        let args_path = dir.join(ARGS_FILE);
        let args = if args_path.exists() {
            let text = std::fs::read_to_string(&args_path)
                .map_err(|e| HarnessError::fixture(&dir, format!("cannot read `args`: {}", e)))?;
            ArgumentTemplate::parse(&text)
        } else {
            log::debug!("{}: no args file, running without arguments", name);
            ArgumentTemplate::default()
        };

        Ok(Self {
            name,
            dir,
            executable,
            args,
            input,
        })
    }

    /// Arguments with the placeholder replaced by this fixture's seed input.
    pub fn resolved_args(&self) -> Vec<OsString> {
        self.args.resolve(&self.input)
    }

    pub fn expected_outputs_dir(&self) -> PathBuf {
        self.dir.join(EXPECTED_OUTPUTS_DIR)
    }

    pub fn generated_outputs_dir(&self) -> PathBuf {
        self.dir.join(GENERATED_OUTPUTS_DIR)
    }

    pub fn has_baseline(&self) -> bool {
        self.expected_outputs_dir().is_dir()
    }
}

/// Find every fixture directory (one containing a `binary`) directly under `root`.
///
/// Returned names are sorted for a stable run order.
pub fn discover(root: &Path) -> Result<Vec<String>> {
    let entries = std::fs::read_dir(root).map_err(|e| {
        HarnessError::fixture(root, format!("cannot read binaries root: {}", e))
    })?;

    let mut names = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() && path.join(BINARY_FILE).is_file() {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
    }
    names.sort();
    Ok(names)
}
