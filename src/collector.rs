//! Output collector.
//!
//! Each regular file directly inside an output directory is one emitted test
//! case. Files are identified by their content digest; names only serve
//! diagnostics.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::digest::ContentDigest;
use crate::error::{HarnessError, Result};

/// One emitted test case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFile {
    pub path: PathBuf,
    pub digest: ContentDigest,
}

impl OutputFile {
    /// File name for display.
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// The collected contents of one output directory.
#[derive(Debug, Clone, Default)]
pub struct OutputSet {
    /// Directory the set was collected from.
    pub dir: PathBuf,
    /// Files in name order.
    files: Vec<OutputFile>,
}

impl OutputSet {
    /// Build a set from already-digested files.
    pub fn from_files(dir: impl Into<PathBuf>, mut files: Vec<OutputFile>) -> Self {
        files.sort_by(|a, b| a.path.cmp(&b.path));
        Self {
            dir: dir.into(),
            files,
        }
    }

    pub fn files(&self) -> &[OutputFile] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Digest → every file holding that content.
    pub fn by_digest(&self) -> BTreeMap<ContentDigest, Vec<&OutputFile>> {
        let mut map: BTreeMap<ContentDigest, Vec<&OutputFile>> = BTreeMap::new();
        for file in &self.files {
            map.entry(file.digest).or_default().push(file);
        }
        map
    }

    /// File name → file.
    pub fn by_name(&self) -> BTreeMap<String, &OutputFile> {
        self.files.iter().map(|f| (f.name(), f)).collect()
    }
}

/// Collect the direct regular files of `dir`.
///
/// Subdirectories and symlinks are skipped. An empty directory is an empty
/// set; a missing or unreadable one is [`HarnessError::CollectionIo`].
pub fn collect(dir: &Path) -> Result<OutputSet> {
    let entries = std::fs::read_dir(dir).map_err(|e| HarnessError::collection(dir, e))?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| HarnessError::collection(dir, e))?;
        let file_type = entry
            .file_type()
            .map_err(|e| HarnessError::collection(entry.path(), e))?;
        if !file_type.is_file() {
            log::debug!("skipping non-file entry {}", entry.path().display());
            continue;
        }

        let path = entry.path();
        let digest =
            ContentDigest::of_file(&path).map_err(|e| HarnessError::collection(&path, e))?;
        log::trace!("{} -> {}", path.display(), digest.short());
        files.push(OutputFile { path, digest });
    }

    log::debug!("collected {} test cases from {}", files.len(), dir.display());
    Ok(OutputSet::from_files(dir, files))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        let set = collect(dir.path()).unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn test_collect_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let err = collect(&missing).unwrap_err();
        match err {
            HarnessError::CollectionIo { path, .. } => assert_eq!(path, missing),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_collect_is_not_recursive() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("000001"), b"one").unwrap();
        std::fs::write(dir.path().join("000000"), b"zero").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested").join("inner"), b"inner").unwrap();

        let set = collect(dir.path()).unwrap();
        let names: Vec<String> = set.files().iter().map(OutputFile::name).collect();
        assert_eq!(names, vec!["000000", "000001"]);
        assert_eq!(set.files()[0].digest, ContentDigest::of_bytes(b"zero"));
    }

    #[test]
    fn test_by_digest_groups_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a"), b"same").unwrap();
        std::fs::write(dir.path().join("b"), b"same").unwrap();
        std::fs::write(dir.path().join("c"), b"other").unwrap();

        let set = collect(dir.path()).unwrap();
        let groups = set.by_digest();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[&ContentDigest::of_bytes(b"same")].len(), 2);

        let names = set.by_name();
        assert_eq!(names.len(), 3);
        assert_eq!(names["c"].digest, ContentDigest::of_bytes(b"other"));
    }

    #[cfg(unix)]
    #[test]
    fn test_collect_skips_symlinks() {
        let dir = tempfile::tempdir().unwrap();
        let target = tempfile::NamedTempFile::new().unwrap();
        std::os::unix::fs::symlink(target.path(), dir.path().join("link")).unwrap();
        std::fs::write(dir.path().join("real"), b"x").unwrap();

        let set = collect(dir.path()).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.files()[0].name(), "real");
    }
}
