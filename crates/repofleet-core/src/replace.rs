//! Content-replacement engine: literal substring substitution across a
//! working tree.
//!
//! Rules are applied strictly in declared order, one rule across all eligible
//! files before the next begins, so rule *i+1* observes text produced by rule
//! *i*. Files are walked in sorted order; given an identical tree and rule
//! list the output tree is byte-identical.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::domain::error::{ConfigError, FleetError, Result};
use crate::domain::model::ReplacementRule;

/// Bytes sniffed from the head of a file for the binary heuristic.
const SNIFF_WINDOW: usize = 8192;

/// Maximum excerpt length recorded per matched line.
const EXCERPT_MAX: usize = 100;

/// Compiled file-name filter. An empty pattern list matches everything.
pub struct FilePatterns {
    set: Option<GlobSet>,
}

impl FilePatterns {
    pub fn build(patterns: &[String]) -> std::result::Result<Self, ConfigError> {
        let effective: Vec<&String> = patterns.iter().filter(|p| *p != "*").collect();
        if effective.is_empty() {
            return Ok(Self { set: None });
        }
        let mut builder = GlobSetBuilder::new();
        for pattern in &effective {
            let glob = Glob::new(pattern).map_err(|e| ConfigError::Invalid {
                path: String::new(),
                reason: format!("file pattern {pattern:?}: {e}"),
            })?;
            builder.add(glob);
        }
        let set = builder.build().map_err(|e| ConfigError::Invalid {
            path: String::new(),
            reason: format!("file patterns: {e}"),
        })?;
        Ok(Self { set: Some(set) })
    }

    /// Match the tree-relative path, falling back to the bare file name so
    /// that simple patterns like `*.md` match at any depth.
    pub fn matches(&self, relative: &Path) -> bool {
        let Some(set) = &self.set else { return true };
        if set.is_match(relative) {
            return true;
        }
        relative
            .file_name()
            .map(|name| set.is_match(Path::new(name)))
            .unwrap_or(false)
    }
}

/// One matched line recorded for audit purposes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchRecord {
    pub line: usize,
    pub excerpt: String,
}

/// All occurrences of one rule within one file.
#[derive(Debug, Clone)]
pub struct FileChange {
    pub path: PathBuf,
    pub rule_index: usize,
    pub occurrences: usize,
    pub matches: Vec<MatchRecord>,
}

/// Per-rule tally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuleStats {
    pub files_modified: usize,
    pub occurrences: usize,
}

/// Result of applying all rules to one working tree.
#[derive(Debug, Default)]
pub struct ReplacementReport {
    pub files_searched: usize,
    pub rule_stats: Vec<RuleStats>,
    pub changes: Vec<FileChange>,
    pub skipped_binary: Vec<PathBuf>,
}

impl ReplacementReport {
    /// Sum of per-rule modified-file counts. A file touched by several rules
    /// counts once per rule, so this can exceed the distinct-file count.
    pub fn files_modified_total(&self) -> usize {
        self.rule_stats.iter().map(|s| s.files_modified).sum()
    }

    pub fn occurrences_total(&self) -> usize {
        self.rule_stats.iter().map(|s| s.occurrences).sum()
    }

    pub fn any_changes(&self) -> bool {
        self.files_modified_total() > 0
    }
}

/// Applies an ordered rule list to every eligible file under a tree root.
pub struct ReplacementEngine {
    rules: Vec<ReplacementRule>,
    patterns: FilePatterns,
    case_sensitive: bool,
}

impl ReplacementEngine {
    pub fn new(
        rules: Vec<ReplacementRule>,
        patterns: &[String],
        case_sensitive: bool,
    ) -> std::result::Result<Self, ConfigError> {
        Ok(Self {
            rules,
            patterns: FilePatterns::build(patterns)?,
            case_sensitive,
        })
    }

    /// Apply every rule, in order, to every eligible file under `root`.
    pub fn apply(&self, root: &Path) -> Result<ReplacementReport> {
        let (files, skipped_binary) = self.collect_candidates(root)?;
        let mut report = ReplacementReport {
            files_searched: files.len(),
            skipped_binary,
            ..Default::default()
        };
        info!(
            files = report.files_searched,
            rules = self.rules.len(),
            case_sensitive = self.case_sensitive,
            "performing replacements"
        );

        for (rule_index, rule) in self.rules.iter().enumerate() {
            let mut stats = RuleStats::default();
            for file in &files {
                let content = std::fs::read_to_string(file)?;
                let Some((updated, change)) =
                    self.apply_rule(&content, rule, rule_index, file, root)
                else {
                    continue;
                };
                std::fs::write(file, updated)?;
                stats.files_modified += 1;
                stats.occurrences += change.occurrences;
                report.changes.push(change);
            }
            info!(
                event = "rule.applied",
                rule = rule_index + 1,
                search = %rule.search,
                files = stats.files_modified,
                occurrences = stats.occurrences,
            );
            report.rule_stats.push(stats);
        }

        info!(
            files_searched = report.files_searched,
            files_modified = report.files_modified_total(),
            occurrences = report.occurrences_total(),
            "replacement summary"
        );
        Ok(report)
    }

    /// Walk the tree once, in sorted order, classifying candidates.
    ///
    /// A file is eligible when it is not under the VCS metadata directory,
    /// matches the configured patterns, and passes the text heuristic.
    fn collect_candidates(&self, root: &Path) -> Result<(Vec<PathBuf>, Vec<PathBuf>)> {
        let mut files = Vec::new();
        // BTreeSet: a file failing the sniff is reported once, sorted.
        let mut binary = BTreeSet::new();

        let walker = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.file_name() != ".git");
        for entry in walker {
            let entry = entry.map_err(|e| FleetError::Io(std::io::Error::other(e)))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(root)
                .unwrap_or(entry.path())
                .to_path_buf();
            if !self.patterns.matches(&relative) {
                continue;
            }
            if is_text_file(entry.path())? {
                files.push(entry.path().to_path_buf());
            } else {
                warn!(event = "file.skipped_binary", path = %relative.display());
                binary.insert(relative);
            }
        }
        Ok((files, binary.into_iter().collect()))
    }

    fn apply_rule(
        &self,
        content: &str,
        rule: &ReplacementRule,
        rule_index: usize,
        file: &Path,
        root: &Path,
    ) -> Option<(String, FileChange)> {
        let offsets = find_matches(content, &rule.search, self.case_sensitive);
        if offsets.is_empty() {
            return None;
        }

        let matches = audit_matches(content, &offsets);
        let relative = file.strip_prefix(root).unwrap_or(file).to_path_buf();
        debug!(
            path = %relative.display(),
            occurrences = offsets.len(),
            rule = rule_index + 1,
            "replacing"
        );

        let mut updated = String::with_capacity(content.len());
        let mut cursor = 0;
        for &offset in &offsets {
            updated.push_str(&content[cursor..offset]);
            updated.push_str(&rule.replace);
            cursor = offset + rule.search.len();
        }
        updated.push_str(&content[cursor..]);

        let change = FileChange {
            path: relative,
            rule_index,
            occurrences: offsets.len(),
            matches,
        };
        Some((updated, change))
    }
}

/// Byte offsets of non-overlapping matches, left to right.
///
/// Case-insensitive mode scans over ASCII-lowercased text (length-preserving,
/// locale-independent) but the caller substitutes the replacement verbatim —
/// there is no case-preserving substitution.
fn find_matches(content: &str, search: &str, case_sensitive: bool) -> Vec<usize> {
    if search.is_empty() {
        return Vec::new();
    }
    if case_sensitive {
        content.match_indices(search).map(|(i, _)| i).collect()
    } else {
        let folded_content = content.to_ascii_lowercase();
        let folded_search = search.to_ascii_lowercase();
        folded_content
            .match_indices(&folded_search)
            .map(|(i, _)| i)
            .collect()
    }
}

/// Line number and truncated line content for each match offset.
fn audit_matches(content: &str, offsets: &[usize]) -> Vec<MatchRecord> {
    offsets
        .iter()
        .map(|&offset| {
            let line = content[..offset].matches('\n').count() + 1;
            let start = content[..offset].rfind('\n').map(|i| i + 1).unwrap_or(0);
            let end = content[offset..]
                .find('\n')
                .map(|i| offset + i)
                .unwrap_or(content.len());
            let full = content[start..end].trim();
            let excerpt = if full.len() > EXCERPT_MAX {
                let mut cut = EXCERPT_MAX;
                while !full.is_char_boundary(cut) {
                    cut -= 1;
                }
                format!("{}...", &full[..cut])
            } else {
                full.to_string()
            };
            MatchRecord { line, excerpt }
        })
        .collect()
}

/// Text heuristic: no NUL byte in the sniff window and valid UTF-8 overall.
fn is_text_file(path: &Path) -> Result<bool> {
    let bytes = std::fs::read(path)?;
    let window = &bytes[..bytes.len().min(SNIFF_WINDOW)];
    if window.contains(&0) {
        return Ok(false);
    }
    Ok(std::str::from_utf8(&bytes).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(rules: &[(&str, &str)], patterns: &[&str], case_sensitive: bool) -> ReplacementEngine {
        let rules = rules
            .iter()
            .map(|(s, r)| ReplacementRule::new(*s, *r))
            .collect();
        let patterns: Vec<String> = patterns.iter().map(|p| p.to_string()).collect();
        ReplacementEngine::new(rules, &patterns, case_sensitive).expect("engine")
    }

    fn tree_with(files: &[(&str, &str)]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (name, content) in files {
            let path = dir.path().join(name);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(path, content).unwrap();
        }
        dir
    }

    #[test]
    fn test_case_insensitive_replaces_verbatim() {
        let tree = tree_with(&[("doc.txt", "API Api aPi normal")]);
        let report = engine(&[("API", "api")], &[], false)
            .apply(tree.path())
            .unwrap();
        let content = std::fs::read_to_string(tree.path().join("doc.txt")).unwrap();
        assert_eq!(content, "api api api normal");
        assert_eq!(report.occurrences_total(), 3);
    }

    #[test]
    fn test_case_sensitive_matches_exactly() {
        let tree = tree_with(&[("doc.txt", "API api")]);
        let report = engine(&[("API", "sdk")], &[], true)
            .apply(tree.path())
            .unwrap();
        let content = std::fs::read_to_string(tree.path().join("doc.txt")).unwrap();
        assert_eq!(content, "sdk api");
        assert_eq!(report.occurrences_total(), 1);
    }

    #[test]
    fn test_chained_rules_apply_sequentially() {
        // ["foo|bar", "bar|baz"] on "foo" must give "baz", not "bar".
        let tree = tree_with(&[("a.txt", "foo")]);
        engine(&[("foo", "bar"), ("bar", "baz")], &[], true)
            .apply(tree.path())
            .unwrap();
        let content = std::fs::read_to_string(tree.path().join("a.txt")).unwrap();
        assert_eq!(content, "baz");
    }

    #[test]
    fn test_no_changes_when_nothing_matches() {
        let tree = tree_with(&[("a.txt", "untouched")]);
        let report = engine(&[("absent", "x")], &[], true)
            .apply(tree.path())
            .unwrap();
        assert!(!report.any_changes());
        assert_eq!(report.files_searched, 1);
    }

    #[test]
    fn test_binary_file_skipped_and_unmodified() {
        let tree = tree_with(&[("a.txt", "target")]);
        let binary = b"targ\x00et\xff\xfe".to_vec();
        std::fs::write(tree.path().join("blob.bin"), &binary).unwrap();

        let report = engine(&[("target", "replaced")], &[], true)
            .apply(tree.path())
            .unwrap();

        assert_eq!(report.skipped_binary, vec![PathBuf::from("blob.bin")]);
        assert_eq!(std::fs::read(tree.path().join("blob.bin")).unwrap(), binary);
        let text = std::fs::read_to_string(tree.path().join("a.txt")).unwrap();
        assert_eq!(text, "replaced");
    }

    #[test]
    fn test_invalid_utf8_without_nul_is_skipped() {
        let tree = tree_with(&[]);
        std::fs::write(tree.path().join("latin1.txt"), b"caf\xe9").unwrap();
        let report = engine(&[("caf", "bar")], &[], true)
            .apply(tree.path())
            .unwrap();
        assert_eq!(report.skipped_binary.len(), 1);
        assert!(!report.any_changes());
    }

    #[test]
    fn test_git_directory_excluded() {
        let tree = tree_with(&[(".git/config", "target"), ("a.txt", "target")]);
        let report = engine(&[("target", "x")], &[], true)
            .apply(tree.path())
            .unwrap();
        assert_eq!(report.files_searched, 1);
        let untouched = std::fs::read_to_string(tree.path().join(".git/config")).unwrap();
        assert_eq!(untouched, "target");
    }

    #[test]
    fn test_file_patterns_filter_by_name_at_any_depth() {
        let tree = tree_with(&[
            ("README.md", "target"),
            ("docs/guide.md", "target"),
            ("src/main.rs", "target"),
        ]);
        let report = engine(&[("target", "x")], &["*.md"], true)
            .apply(tree.path())
            .unwrap();
        assert_eq!(report.files_searched, 2);
        let untouched = std::fs::read_to_string(tree.path().join("src/main.rs")).unwrap();
        assert_eq!(untouched, "target");
    }

    #[test]
    fn test_star_pattern_matches_everything() {
        let tree = tree_with(&[("a.txt", "t"), ("b/c.rs", "t")]);
        let report = engine(&[("t", "u")], &["*"], true).apply(tree.path()).unwrap();
        assert_eq!(report.files_searched, 2);
    }

    #[test]
    fn test_files_modified_counted_once_per_rule() {
        let tree = tree_with(&[("a.txt", "one two")]);
        let report = engine(&[("one", "1"), ("two", "2")], &[], true)
            .apply(tree.path())
            .unwrap();
        // One distinct file, but each rule modified it.
        assert_eq!(report.files_modified_total(), 2);
        assert_eq!(report.rule_stats.len(), 2);
        assert_eq!(report.rule_stats[0].files_modified, 1);
    }

    #[test]
    fn test_audit_records_line_numbers_and_excerpts() {
        let tree = tree_with(&[("a.txt", "first\nsecond target line\nthird target")]);
        let report = engine(&[("target", "x")], &[], true)
            .apply(tree.path())
            .unwrap();
        let change = &report.changes[0];
        assert_eq!(change.occurrences, 2);
        assert_eq!(change.matches[0].line, 2);
        assert_eq!(change.matches[0].excerpt, "second target line");
        assert_eq!(change.matches[1].line, 3);
    }

    #[test]
    fn test_audit_excerpt_truncated() {
        let long_line = format!("{} target", "x".repeat(200));
        let tree = tree_with(&[("a.txt", long_line.as_str())]);
        let report = engine(&[("target", "y")], &[], true)
            .apply(tree.path())
            .unwrap();
        let excerpt = &report.changes[0].matches[0].excerpt;
        assert!(excerpt.len() <= EXCERPT_MAX + 3);
        assert!(excerpt.ends_with("..."));
    }

    #[test]
    fn test_idempotent_when_replacement_disjoint_from_search() {
        let tree = tree_with(&[("a.txt", "foo foo")]);
        let eng = engine(&[("foo", "bar")], &[], true);
        let first = eng.apply(tree.path()).unwrap();
        assert_eq!(first.occurrences_total(), 2);
        let second = eng.apply(tree.path()).unwrap();
        assert_eq!(second.occurrences_total(), 0);
        assert!(!second.any_changes());
    }

    #[test]
    fn test_deterministic_output() {
        let files = &[("b.txt", "alpha beta"), ("a.txt", "beta alpha")];
        let rules = &[("alpha", "A"), ("beta", "B")];

        let tree1 = tree_with(files);
        let tree2 = tree_with(files);
        engine(rules, &[], true).apply(tree1.path()).unwrap();
        engine(rules, &[], true).apply(tree2.path()).unwrap();

        for (name, _) in files {
            let c1 = std::fs::read(tree1.path().join(name)).unwrap();
            let c2 = std::fs::read(tree2.path().join(name)).unwrap();
            assert_eq!(c1, c2);
        }
    }

    #[test]
    fn test_empty_replacement_deletes_matches() {
        let tree = tree_with(&[("a.txt", "keep-drop-keep")]);
        engine(&[("-drop", "")], &[], true).apply(tree.path()).unwrap();
        let content = std::fs::read_to_string(tree.path().join("a.txt")).unwrap();
        assert_eq!(content, "keep-keep");
    }
}
