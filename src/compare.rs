//! Content comparator.
//!
//! The emulator names test cases non-deterministically, so the default
//! policy compares the two sets by content digest and ignores names. The
//! filename-aligned policy pairs files by name instead; it is kept for
//! baselines whose names are stable and feeds the diff reporter.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::collector::{OutputFile, OutputSet};
use crate::digest::ContentDigest;

/// How generated files are matched against expected ones.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComparisonPolicy {
    /// Set comparison by digest.
    #[default]
    #[serde(alias = "digest")]
    Content,
    /// Pair files by name, then compare digests.
    #[serde(alias = "name")]
    Filename,
}

impl FromStr for ComparisonPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "content" | "digest" => Ok(ComparisonPolicy::Content),
            "filename" | "name" => Ok(ComparisonPolicy::Filename),
            other => Err(format!(
                "unknown comparison policy `{}` (expected `content` or `filename`)",
                other
            )),
        }
    }
}

impl fmt::Display for ComparisonPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComparisonPolicy::Content => write!(f, "content"),
            ComparisonPolicy::Filename => write!(f, "filename"),
        }
    }
}

/// A generated file accounted for by the baseline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedFile {
    pub generated: PathBuf,
    pub expected: PathBuf,
    pub digest: ContentDigest,
}

/// Same name on both sides, different bytes (filename policy only).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentMismatch {
    pub name: String,
    pub expected: PathBuf,
    pub generated: PathBuf,
}

/// Which side of the comparison a duplicate group belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Expected,
    Generated,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Expected => write!(f, "expected"),
            Side::Generated => write!(f, "generated"),
        }
    }
}

/// Several files in one set with identical content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateGroup {
    pub side: Side,
    pub digest: ContentDigest,
    pub paths: Vec<PathBuf>,
}

/// Outcome of comparing a generated set against its baseline.
#[derive(Debug, Clone)]
pub struct ComparisonResult {
    pub policy: ComparisonPolicy,
    pub matched: Vec<MatchedFile>,
    /// Expected files with no generated counterpart.
    pub missing: Vec<OutputFile>,
    /// Generated files the baseline does not account for.
    pub unexpected: Vec<OutputFile>,
    /// Filename policy only.
    pub mismatched: Vec<ContentMismatch>,
    /// Diagnostic only; never fails a comparison.
    pub duplicates: Vec<DuplicateGroup>,
}

impl ComparisonResult {
    pub(crate) fn new(policy: ComparisonPolicy) -> Self {
        Self {
            policy,
            matched: Vec::new(),
            missing: Vec::new(),
            unexpected: Vec::new(),
            mismatched: Vec::new(),
            duplicates: Vec::new(),
        }
    }

    /// Pass iff nothing is missing, unexpected or mismatched.
    pub fn passed(&self) -> bool {
        self.missing.is_empty() && self.unexpected.is_empty() && self.mismatched.is_empty()
    }

    pub fn missing_paths(&self) -> Vec<PathBuf> {
        self.missing.iter().map(|f| f.path.clone()).collect()
    }

    pub fn unexpected_paths(&self) -> Vec<PathBuf> {
        self.unexpected.iter().map(|f| f.path.clone()).collect()
    }

    pub fn mismatched_paths(&self) -> Vec<PathBuf> {
        self.mismatched.iter().map(|m| m.generated.clone()).collect()
    }

    /// Multi-line description of every failure, plus duplicate notes.
    pub fn report(&self) -> String {
        let mut report = String::new();
        report.push_str(&format!(
            "{} matched, {} missing, {} unexpected",
            self.matched.len(),
            self.missing.len(),
            self.unexpected.len()
        ));
        if self.policy == ComparisonPolicy::Filename {
            report.push_str(&format!(", {} mismatched", self.mismatched.len()));
        }
        report.push('\n');

        for file in &self.missing {
            report.push_str(&format!(
                "  missing:    {} ({})\n",
                file.path.display(),
                file.digest.short()
            ));
        }
        for file in &self.unexpected {
            report.push_str(&format!(
                "  unexpected: {} ({})\n",
                file.path.display(),
                file.digest.short()
            ));
        }
        for mismatch in &self.mismatched {
            report.push_str(&format!("  differs:    {}\n", mismatch.name));
        }
        for group in &self.duplicates {
            report.push_str(&format!(
                "  note: {} {} files share digest {}\n",
                group.paths.len(),
                group.side,
                group.digest.short()
            ));
        }
        report
    }
}

/// Compares a generated set against an expected set under one policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct Comparator {
    policy: ComparisonPolicy,
}

impl Comparator {
    pub fn new(policy: ComparisonPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> ComparisonPolicy {
        self.policy
    }

    /// Classify every file of both sets.
    pub fn compare(&self, expected: &OutputSet, generated: &OutputSet) -> ComparisonResult {
        let mut result = match self.policy {
            ComparisonPolicy::Content => compare_by_content(expected, generated),
            ComparisonPolicy::Filename => compare_by_name(expected, generated),
        };
        result.duplicates = duplicate_groups(Side::Expected, expected);
        result
            .duplicates
            .extend(duplicate_groups(Side::Generated, generated));

        log::debug!(
            "{} comparison: {} matched, {} missing, {} unexpected, {} mismatched",
            self.policy,
            result.matched.len(),
            result.missing.len(),
            result.unexpected.len(),
            result.mismatched.len()
        );
        result
    }
}

fn compare_by_content(expected: &OutputSet, generated: &OutputSet) -> ComparisonResult {
    let mut result = ComparisonResult::new(ComparisonPolicy::Content);

    // digest -> (seen, first expected file with that content)
    let mut seen: BTreeMap<ContentDigest, (bool, &OutputFile)> = BTreeMap::new();
    for file in expected.files() {
        seen.entry(file.digest).or_insert((false, file));
    }

    for file in generated.files() {
        match seen.get_mut(&file.digest) {
            Some((flag, expected_file)) => {
                *flag = true;
                result.matched.push(MatchedFile {
                    generated: file.path.clone(),
                    expected: expected_file.path.clone(),
                    digest: file.digest,
                });
            }
            None => result.unexpected.push(file.clone()),
        }
    }

    for file in expected.files() {
        if matches!(seen.get(&file.digest), Some((false, _))) {
            result.missing.push(file.clone());
        }
    }

    result
}

fn compare_by_name(expected: &OutputSet, generated: &OutputSet) -> ComparisonResult {
    let mut result = ComparisonResult::new(ComparisonPolicy::Filename);
    let expected_by_name = expected.by_name();
    let generated_by_name = generated.by_name();

    for file in generated.files() {
        let name = file.name();
        match expected_by_name.get(&name) {
            Some(expected_file) if expected_file.digest == file.digest => {
                result.matched.push(MatchedFile {
                    generated: file.path.clone(),
                    expected: expected_file.path.clone(),
                    digest: file.digest,
                });
            }
            Some(expected_file) => result.mismatched.push(ContentMismatch {
                name,
                expected: expected_file.path.clone(),
                generated: file.path.clone(),
            }),
            None => result.unexpected.push(file.clone()),
        }
    }

    for file in expected.files() {
        if !generated_by_name.contains_key(&file.name()) {
            result.missing.push(file.clone());
        }
    }

    result
}

fn duplicate_groups(side: Side, set: &OutputSet) -> Vec<DuplicateGroup> {
    set.by_digest()
        .into_iter()
        .filter(|(_, files)| files.len() > 1)
        .map(|(digest, files)| DuplicateGroup {
            side,
            digest,
            paths: files.iter().map(|f| f.path.clone()).collect(),
        })
        .collect()
}
