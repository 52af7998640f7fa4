//! Diff reporter for filename-aligned content mismatches.
//!
//! Both files are rendered as hex dumps and diffed word by word, in the
//! style of `git diff --word-diff`: removed words as `[-..-]`, added words
//! as `{+..+}`. Output is purely diagnostic and never affects a verdict.

use std::path::Path;

use crate::compare::{ComparisonResult, ContentMismatch};
use crate::error::{HarnessError, Result};

const BYTES_PER_LINE: usize = 16;

/// Largest LCS table (in cells) computed before giving up on a fine diff.
const MAX_LCS_CELLS: usize = 4_000_000;

const RED: &str = "\u{1b}[31m";
const GREEN: &str = "\u{1b}[32m";
const BOLD: &str = "\u{1b}[1m";
const RESET: &str = "\u{1b}[0m";

/// Line separator token inside a word stream.
const NEWLINE: &str = "\n";

/// Render bytes as `OOOOOOOO: xx xx ..` lines, 16 bytes per line.
pub fn hex_dump(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 3 + data.len() / BYTES_PER_LINE * 11);
    for (line, chunk) in data.chunks(BYTES_PER_LINE).enumerate() {
        out.push_str(&format!("{:08x}:", line * BYTES_PER_LINE));
        for byte in chunk {
            out.push_str(&format!(" {:02x}", byte));
        }
        out.push('\n');
    }
    out
}

/// One step of a word diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffOp<'a> {
    Equal(&'a str),
    Delete(&'a str),
    Insert(&'a str),
}

/// Split text into words, keeping line breaks as [`NEWLINE`] tokens.
fn tokenize(text: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    for line in text.lines() {
        tokens.extend(line.split_whitespace());
        tokens.push(NEWLINE);
    }
    tokens
}

/// Word-level diff of two texts.
pub fn word_diff<'a>(old: &'a str, new: &'a str) -> Vec<DiffOp<'a>> {
    diff_tokens(&tokenize(old), &tokenize(new))
}

fn diff_tokens<'a>(old: &[&'a str], new: &[&'a str]) -> Vec<DiffOp<'a>> {
    let prefix = old
        .iter()
        .zip(new.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let suffix = old[prefix..]
        .iter()
        .rev()
        .zip(new[prefix..].iter().rev())
        .take_while(|(a, b)| a == b)
        .count();

    let old_mid = &old[prefix..old.len() - suffix];
    let new_mid = &new[prefix..new.len() - suffix];

    let mut ops: Vec<DiffOp<'a>> = old[..prefix].iter().map(|&t| DiffOp::Equal(t)).collect();

    if old_mid.len().saturating_mul(new_mid.len()) > MAX_LCS_CELLS {
        log::debug!(
            "word diff too large ({} x {} words), reporting as one replacement",
            old_mid.len(),
            new_mid.len()
        );
        ops.extend(old_mid.iter().map(|&t| DiffOp::Delete(t)));
        ops.extend(new_mid.iter().map(|&t| DiffOp::Insert(t)));
    } else {
        ops.extend(lcs_diff(old_mid, new_mid));
    }

    ops.extend(old[old.len() - suffix..].iter().map(|&t| DiffOp::Equal(t)));
    ops
}

fn lcs_diff<'a>(old: &[&'a str], new: &[&'a str]) -> Vec<DiffOp<'a>> {
    let (n, m) = (old.len(), new.len());
    let width = m + 1;
    // table[i * width + j] = LCS length of old[i..] and new[j..]
    let mut table = vec![0u32; (n + 1) * width];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            table[i * width + j] = if old[i] == new[j] {
                table[(i + 1) * width + j + 1] + 1
            } else {
                table[(i + 1) * width + j].max(table[i * width + j + 1])
            };
        }
    }

    let mut ops = Vec::with_capacity(n + m);
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if old[i] == new[j] {
            ops.push(DiffOp::Equal(old[i]));
            i += 1;
            j += 1;
        } else if table[(i + 1) * width + j] >= table[i * width + j + 1] {
            ops.push(DiffOp::Delete(old[i]));
            i += 1;
        } else {
            ops.push(DiffOp::Insert(new[j]));
            j += 1;
        }
    }
    ops.extend(old[i..].iter().map(|&t| DiffOp::Delete(t)));
    ops.extend(new[j..].iter().map(|&t| DiffOp::Insert(t)));
    ops
}

/// Accumulates rendered words, tracking line starts.
struct Renderer {
    out: String,
    at_line_start: bool,
    color: bool,
}

impl Renderer {
    fn word(&mut self, word: &str) {
        if !self.at_line_start {
            self.out.push(' ');
        }
        self.out.push_str(word);
        self.at_line_start = false;
    }

    fn newline(&mut self) {
        self.out.push('\n');
        self.at_line_start = true;
    }

    fn marked(&mut self, words: &[&str], open: &str, close: &str, color: &str) {
        if words.is_empty() {
            return;
        }
        let body = words.join(" ");
        if self.color {
            self.word(&format!("{}{}{}{}{}", color, open, body, close, RESET));
        } else {
            self.word(&format!("{}{}{}", open, body, close));
        }
    }
}

/// Render diff ops. Deleted line breaks are dropped so removed words stay
/// inline with a following insertion; inserted line breaks are kept.
pub fn render_word_diff(ops: &[DiffOp<'_>], color: bool) -> String {
    let mut r = Renderer {
        out: String::new(),
        at_line_start: true,
        color,
    };

    let mut i = 0;
    while i < ops.len() {
        match ops[i] {
            DiffOp::Equal(token) => {
                if token == NEWLINE {
                    r.newline();
                } else {
                    r.word(token);
                }
                i += 1;
            }
            DiffOp::Delete(_) => {
                let mut words = Vec::new();
                let mut removed_break = false;
                while let Some(DiffOp::Delete(token)) = ops.get(i) {
                    if *token == NEWLINE {
                        removed_break = true;
                    } else {
                        words.push(*token);
                    }
                    i += 1;
                }
                r.marked(&words, "[-", "-]", RED);
                // A removed line still ends its own line unless an insertion takes its place.
                if removed_break && !matches!(ops.get(i), Some(DiffOp::Insert(_))) {
                    r.newline();
                }
            }
            DiffOp::Insert(_) => {
                let mut words = Vec::new();
                while let Some(DiffOp::Insert(token)) = ops.get(i) {
                    if *token == NEWLINE {
                        r.marked(&words, "{+", "+}", GREEN);
                        words.clear();
                        r.newline();
                    } else {
                        words.push(*token);
                    }
                    i += 1;
                }
                r.marked(&words, "{+", "+}", GREEN);
            }
        }
    }
    r.out
}

/// A rendered diff for one mismatched file.
#[derive(Debug, Clone)]
pub struct FileDiff {
    pub name: String,
    pub text: String,
}

/// Renders hex word diffs for content mismatches.
#[derive(Debug, Clone, Copy)]
pub struct DiffReporter {
    color: bool,
}

impl DiffReporter {
    pub fn new(color: bool) -> Self {
        Self { color }
    }

    /// Color unless `NO_COLOR` is set.
    pub fn from_env() -> Self {
        Self::new(std::env::var_os("NO_COLOR").is_none())
    }

    /// Render a block for two files known to differ.
    pub fn render_files(&self, name: &str, expected: &Path, generated: &Path) -> Result<String> {
        let expected_bytes =
            std::fs::read(expected).map_err(|e| HarnessError::collection(expected, e))?;
        let generated_bytes =
            std::fs::read(generated).map_err(|e| HarnessError::collection(generated, e))?;
        Ok(self.render_bytes(name, expected, generated, &expected_bytes, &generated_bytes))
    }

    fn render_bytes(
        &self,
        name: &str,
        expected_path: &Path,
        generated_path: &Path,
        expected: &[u8],
        generated: &[u8],
    ) -> String {
        let old = hex_dump(expected);
        let new = hex_dump(generated);
        let ops = word_diff(&old, &new);

        let mut block = String::new();
        if self.color {
            block.push_str(&format!("{}=== {} ==={}\n", BOLD, name, RESET));
        } else {
            block.push_str(&format!("=== {} ===\n", name));
        }
        block.push_str(&format!(
            "--- expected:  {} ({} bytes)\n",
            expected_path.display(),
            expected.len()
        ));
        block.push_str(&format!(
            "+++ generated: {} ({} bytes)\n",
            generated_path.display(),
            generated.len()
        ));
        block.push_str(&render_word_diff(&ops, self.color));
        block
    }

    pub fn render_mismatch(&self, mismatch: &ContentMismatch) -> Result<FileDiff> {
        let text = self.render_files(&mismatch.name, &mismatch.expected, &mismatch.generated)?;
        Ok(FileDiff {
            name: mismatch.name.clone(),
            text,
        })
    }

    /// Render every content mismatch of a comparison. A file that can no
    /// longer be read gets a note instead of a diff.
    pub fn render_all(&self, result: &ComparisonResult) -> Vec<FileDiff> {
        result
            .mismatched
            .iter()
            .map(|mismatch| match self.render_mismatch(mismatch) {
                Ok(diff) => diff,
                Err(e) => {
                    log::warn!("cannot render diff for {}: {}", mismatch.name, e);
                    FileDiff {
                        name: mismatch.name.clone(),
                        text: format!("=== {} ===\n(diff unavailable: {})\n", mismatch.name, e),
                    }
                }
            })
            .collect()
    }
}

impl Default for DiffReporter {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_dump_layout() {
        let data: Vec<u8> = (0u8..18).collect();
        let dump = hex_dump(&data);
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0],
            "00000000: 00 01 02 03 04 05 06 07 08 09 0a 0b 0c 0d 0e 0f"
        );
        assert_eq!(lines[1], "00000010: 10 11");
        assert_eq!(hex_dump(&[]), "");
    }

    #[test]
    fn test_identical_texts_are_all_equal() {
        let ops = word_diff("a b\nc\n", "a b\nc\n");
        assert!(ops.iter().all(|op| matches!(op, DiffOp::Equal(_))));
    }

    #[test]
    fn test_single_word_change() {
        let ops = word_diff("00000000: 41 42 43\n", "00000000: 41 58 43\n");
        assert_eq!(
            ops,
            vec![
                DiffOp::Equal("00000000:"),
                DiffOp::Equal("41"),
                DiffOp::Delete("42"),
                DiffOp::Insert("58"),
                DiffOp::Equal("43"),
                DiffOp::Equal(NEWLINE),
            ]
        );
        assert_eq!(render_word_diff(&ops, false), "00000000: 41 [-42-] {+58+} 43\n");
    }

    #[test]
    fn test_appended_words() {
        let ops = word_diff("x: 01\n", "x: 01 02 03\n");
        assert_eq!(render_word_diff(&ops, false), "x: 01 {+02 03+}\n");
    }

    #[test]
    fn test_inserted_line_keeps_break() {
        let ops = word_diff("a\n", "a\nb\n");
        assert_eq!(render_word_diff(&ops, false), "a\n{+b+}\n");
    }

    #[test]
    fn test_colored_markers() {
        let ops = word_diff("a\n", "b\n");
        let rendered = render_word_diff(&ops, true);
        assert!(rendered.contains("\u{1b}[31m[-a-]\u{1b}[0m"));
        assert!(rendered.contains("\u{1b}[32m{+b+}\u{1b}[0m"));
    }

    #[test]
    fn test_render_files_block() {
        let dir = tempfile::tempdir().unwrap();
        let expected = dir.path().join("expected");
        let generated = dir.path().join("generated");
        std::fs::write(&expected, b"ABC").unwrap();
        std::fs::write(&generated, b"AXC").unwrap();

        let text = DiffReporter::new(false)
            .render_files("000001", &expected, &generated)
            .unwrap();
        assert!(text.starts_with("=== 000001 ===\n"));
        assert!(text.contains("(3 bytes)"));
        assert!(text.ends_with("00000000: 41 [-42-] {+58+} 43\n"));
    }

    #[test]
    fn test_truncated_file_ends_with_newline() {
        let expected = hex_dump(&[0u8; 17]);
        let generated = hex_dump(&[0u8; 16]);
        let rendered = render_word_diff(&word_diff(&expected, &generated), false);
        assert!(rendered.ends_with("[-00000010: 00-]\n"), "{:?}", rendered);
    }

    #[test]
    fn test_deleted_middle_line_keeps_break() {
        let ops = word_diff("a\nb\nc\n", "a\nc\n");
        assert_eq!(render_word_diff(&ops, false), "a\n[-b-]\nc\n");
    }

    #[test]
    fn test_render_all_notes_unreadable_file() {
        use crate::compare::ComparisonPolicy;

        let dir = tempfile::tempdir().unwrap();
        let expected = dir.path().join("expected");
        let generated = dir.path().join("generated");
        std::fs::write(&expected, b"ABC").unwrap();
        std::fs::write(&generated, b"AXC").unwrap();

        let mut result = ComparisonResult::new(ComparisonPolicy::Filename);
        result.mismatched.push(ContentMismatch {
            name: "000000".to_string(),
            expected,
            generated: generated.clone(),
        });
        std::fs::remove_file(&generated).unwrap();

        let diffs = DiffReporter::new(false).render_all(&result);
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].name, "000000");
        assert!(diffs[0].text.starts_with("=== 000000 ===\n(diff unavailable: "));
        assert!(diffs[0].text.ends_with(")\n"));
    }

    #[test]
    fn test_render_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = DiffReporter::new(false)
            .render_files("x", &dir.path().join("a"), &dir.path().join("b"))
            .unwrap_err();
        assert!(matches!(err, HarnessError::CollectionIo { .. }));
    }
}
