//! Configuration management for symqemu-harness.
//!
//! Configuration is loaded from multiple sources in priority order:
//! 1. Environment variables (SYMQEMU_EMULATOR, etc.)
//! 2. Project-local config file (`./symqemu-harness.toml`)
//! 3. User config file (`~/.config/symqemu-harness/config.toml`)
//! 4. Built-in defaults
//!
//! Command-line flags override all of these.
//!
//! # Config File Format
//!
//! ```toml
//! # symqemu-harness.toml
//!
//! # Emulator executable
//! emulator = "build/qemu-x86_64"
//!
//! # Directory holding one subdirectory per test binary
//! binaries_dir = "tests/symqemu/binaries"
//! ```

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::compare::ComparisonPolicy;

/// Global cached configuration.
static CONFIG: OnceLock<Config> = OnceLock::new();

const DEFAULT_EMULATOR: &str = "build/qemu-x86_64";
const DEFAULT_BINARIES_DIR: &str = "tests/symqemu/binaries";
const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// symqemu-harness configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Path to the emulator executable.
    pub emulator: Option<String>,

    /// Root directory of the fixture corpus.
    pub binaries_dir: Option<String>,

    /// Kill the emulator after this many seconds. 0 disables the timeout.
    pub timeout_secs: Option<u64>,

    /// Parent directory for per-run scratch output directories.
    /// Defaults to the system temp directory.
    pub scratch_dir: Option<String>,

    /// How generated files are matched against the baseline.
    pub policy: Option<ComparisonPolicy>,

    /// Keep each run's output in `<fixture>/generated_outputs`.
    pub keep_outputs: Option<bool>,
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. Project-local `symqemu-harness.toml`
    /// 3. User config `~/.config/symqemu-harness/config.toml`
    /// 4. Defaults
    pub fn load() -> Self {
        let mut config = Self::default();

        if let Some(user_config) = Self::load_user_config() {
            config.merge(user_config);
        }

        if let Some(local_config) = Self::load_local_config() {
            config.merge(local_config);
        }

        config.apply_env_overrides();

        config
    }

    /// Get the cached global configuration.
    ///
    /// Loads configuration on first call and caches it.
    pub fn get() -> &'static Config {
        CONFIG.get_or_init(|| {
            let config = Self::load();
            log::debug!("Loaded configuration: {:?}", config);
            config
        })
    }

    /// Emulator path, with fallback to `build/qemu-x86_64`.
    pub fn emulator(&self) -> PathBuf {
        PathBuf::from(self.emulator.as_deref().unwrap_or(DEFAULT_EMULATOR))
    }

    /// Binaries root, with fallback to `tests/symqemu/binaries`.
    pub fn binaries_dir(&self) -> PathBuf {
        PathBuf::from(self.binaries_dir.as_deref().unwrap_or(DEFAULT_BINARIES_DIR))
    }

    /// Run timeout; `None` when disabled with 0.
    pub fn timeout(&self) -> Option<Duration> {
        match self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS) {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn scratch_dir(&self) -> Option<PathBuf> {
        self.scratch_dir.as_ref().map(PathBuf::from)
    }

    pub fn policy(&self) -> ComparisonPolicy {
        self.policy.unwrap_or_default()
    }

    pub fn keep_outputs(&self) -> bool {
        self.keep_outputs.unwrap_or(false)
    }

    /// Load user configuration from ~/.config/symqemu-harness/config.toml
    fn load_user_config() -> Option<Self> {
        let config_path = Self::user_config_path()?;
        Self::load_from_file(&config_path)
    }

    /// Load project-local configuration from ./symqemu-harness.toml
    fn load_local_config() -> Option<Self> {
        let local_path = Path::new("symqemu-harness.toml");
        if let Some(config) = Self::load_from_file(local_path) {
            return Some(config);
        }

        if let Ok(manifest_dir) = std::env::var("CARGO_MANIFEST_DIR") {
            let project_path = Path::new(&manifest_dir).join("symqemu-harness.toml");
            if let Some(config) = Self::load_from_file(&project_path) {
                return Some(config);
            }
        }

        None
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    log::info!("Loaded config from {}", path.display());
                    Some(config)
                }
                Err(e) => {
                    log::warn!("Failed to parse {}: {}", path.display(), e);
                    None
                }
            },
            Err(e) => {
                log::warn!("Failed to read {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Merge another config into this one.
    /// Only overrides fields that are Some in the other config.
    pub fn merge(&mut self, other: Self) {
        if other.emulator.is_some() {
            self.emulator = other.emulator;
        }
        if other.binaries_dir.is_some() {
            self.binaries_dir = other.binaries_dir;
        }
        if other.timeout_secs.is_some() {
            self.timeout_secs = other.timeout_secs;
        }
        if other.scratch_dir.is_some() {
            self.scratch_dir = other.scratch_dir;
        }
        if other.policy.is_some() {
            self.policy = other.policy;
        }
        if other.keep_outputs.is_some() {
            self.keep_outputs = other.keep_outputs;
        }
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("SYMQEMU_EMULATOR") {
            log::info!("Using SYMQEMU_EMULATOR from environment: {}", path);
            self.emulator = Some(path);
        }
        if let Ok(path) = std::env::var("SYMQEMU_BINARIES_DIR") {
            log::info!("Using SYMQEMU_BINARIES_DIR from environment: {}", path);
            self.binaries_dir = Some(path);
        }
        if let Ok(value) = std::env::var("SYMQEMU_TIMEOUT_SECS") {
            match value.parse() {
                Ok(secs) => self.timeout_secs = Some(secs),
                Err(e) => log::warn!("Ignoring SYMQEMU_TIMEOUT_SECS={}: {}", value, e),
            }
        }
        if let Ok(path) = std::env::var("SYMQEMU_SCRATCH_DIR") {
            log::info!("Using SYMQEMU_SCRATCH_DIR from environment: {}", path);
            self.scratch_dir = Some(path);
        }
    }

    /// Get the path to the user config file (for display/creation).
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("symqemu-harness").join("config.toml"))
    }

    /// Generate a sample config file content.
    pub fn sample_config() -> String {
        r#"# symqemu-harness configuration
# Place this file at ~/.config/symqemu-harness/config.toml or ./symqemu-harness.toml

# Emulator executable (SymQEMU user-mode build)
emulator = "build/qemu-x86_64"

# Directory with one subdirectory per test binary
binaries_dir = "tests/symqemu/binaries"

# Kill a run after this many seconds (0 = wait forever)
# timeout_secs = 300

# Parent directory for scratch output directories (defaults to the system temp dir)
# scratch_dir = "/tmp"

# "content" compares test cases by SHA-256; "filename" pairs them by name and prints hex diffs
# policy = "content"

# Persist each run's test cases to <fixture>/generated_outputs
# keep_outputs = false
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.emulator(), PathBuf::from("build/qemu-x86_64"));
        assert_eq!(config.binaries_dir(), PathBuf::from("tests/symqemu/binaries"));
        assert_eq!(config.timeout(), Some(Duration::from_secs(300)));
        assert_eq!(config.policy(), ComparisonPolicy::Content);
        assert!(!config.keep_outputs());
        assert!(config.scratch_dir().is_none());
    }

    #[test]
    fn test_zero_timeout_disables() {
        let config = Config {
            timeout_secs: Some(0),
            ..Default::default()
        };
        assert_eq!(config.timeout(), None);
    }

    #[test]
    fn test_config_merge() {
        let mut base = Config {
            emulator: Some("/base/qemu-x86_64".to_string()),
            binaries_dir: None,
            timeout_secs: Some(10),
            ..Default::default()
        };

        let overlay = Config {
            emulator: None,
            binaries_dir: Some("/overlay/binaries".to_string()),
            timeout_secs: Some(20),
            policy: Some(ComparisonPolicy::Filename),
            ..Default::default()
        };

        base.merge(overlay);

        // emulator unchanged (overlay was None)
        assert_eq!(base.emulator, Some("/base/qemu-x86_64".to_string()));
        // binaries_dir set from overlay
        assert_eq!(base.binaries_dir, Some("/overlay/binaries".to_string()));
        // timeout overridden by overlay
        assert_eq!(base.timeout_secs, Some(20));
        assert_eq!(base.policy(), ComparisonPolicy::Filename);
    }

    #[test]
    fn test_sample_config_parses() {
        let sample = Config::sample_config();
        let config: Config = toml::from_str(&sample).expect("Sample config should parse");
        assert_eq!(config.emulator(), PathBuf::from("build/qemu-x86_64"));
    }

    #[test]
    fn test_policy_from_toml() {
        let config: Config = toml::from_str("policy = \"filename\"\n").unwrap();
        assert_eq!(config.policy(), ComparisonPolicy::Filename);
    }
}
