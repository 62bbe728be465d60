//! Fleet model: repository identity and replacement rules.

use serde::{Deserialize, Serialize};

use crate::domain::error::ConfigError;

/// Identifies one repository to process, by bare name.
///
/// The clone URL is derived, never stored: `base_url ⊕ "/" ⊕ name ⊕ ".git"`.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct RepoSpec {
    /// Repository name as listed in the repo-list file, e.g. "billing-api".
    pub name: String,
}

impl RepoSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Derive the clone URL from the configured base URL.
    ///
    /// Works for both SSH-style (`git@host:owner`) and HTTPS-style
    /// (`https://host/owner`) base URLs; both append `/<name>.git`.
    pub fn clone_url(&self, base_url: &str) -> String {
        format!("{}/{}.git", base_url.trim_end_matches('/'), self.name)
    }
}

/// One literal text-replacement rule.
///
/// Rules form an ordered sequence: rule *i*'s replacement text is visible to
/// rule *i+1*'s matcher. Order is observable and must be preserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplacementRule {
    pub search: String,
    pub replace: String,
}

impl ReplacementRule {
    pub fn new(search: impl Into<String>, replace: impl Into<String>) -> Self {
        Self {
            search: search.into(),
            replace: replace.into(),
        }
    }

    /// Parse a `"search|replace"` pair, splitting on the first `|`.
    ///
    /// There is no escaping mechanism: `|` cannot appear in the search text,
    /// but may appear in the replacement text.
    pub fn parse(raw: &str, index: usize) -> Result<Self, ConfigError> {
        let Some((search, replace)) = raw.split_once('|') else {
            return Err(ConfigError::Rule {
                index,
                reason: format!("missing '|' separator in {raw:?}"),
            });
        };
        if search.is_empty() {
            return Err(ConfigError::Rule {
                index,
                reason: "empty search text".to_string(),
            });
        }
        Ok(Self::new(search, replace))
    }
}

/// Parse the repo-list format: one name per line, `#` comments and blank
/// lines ignored, surrounding whitespace trimmed.
pub fn parse_repo_list(content: &str) -> Vec<RepoSpec> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(RepoSpec::new)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clone_url_https_base() {
        let repo = RepoSpec::new("billing-api");
        assert_eq!(
            repo.clone_url("https://github.com/acme"),
            "https://github.com/acme/billing-api.git"
        );
    }

    #[test]
    fn test_clone_url_ssh_base() {
        let repo = RepoSpec::new("billing-api");
        assert_eq!(
            repo.clone_url("git@github.com:acme"),
            "git@github.com:acme/billing-api.git"
        );
    }

    #[test]
    fn test_clone_url_trailing_slash() {
        let repo = RepoSpec::new("r1");
        assert_eq!(
            repo.clone_url("https://github.com/acme/"),
            "https://github.com/acme/r1.git"
        );
    }

    #[test]
    fn test_rule_parse_splits_on_first_pipe() {
        let rule = ReplacementRule::parse("old|new|er", 0).expect("parse");
        assert_eq!(rule.search, "old");
        assert_eq!(rule.replace, "new|er");
    }

    #[test]
    fn test_rule_parse_empty_replace_allowed() {
        let rule = ReplacementRule::parse("remove-me|", 0).expect("parse");
        assert_eq!(rule.search, "remove-me");
        assert_eq!(rule.replace, "");
    }

    #[test]
    fn test_rule_parse_rejects_missing_separator() {
        let err = ReplacementRule::parse("no-separator", 3).unwrap_err();
        assert!(err.to_string().contains("rule 3"));
    }

    #[test]
    fn test_rule_parse_rejects_empty_search() {
        assert!(ReplacementRule::parse("|something", 0).is_err());
    }

    #[test]
    fn test_parse_repo_list_skips_comments_and_blanks() {
        let content = "# fleet\nr1\n\n  r2  \n# disabled\n#r3\nr4";
        let repos = parse_repo_list(content);
        assert_eq!(
            repos,
            vec![RepoSpec::new("r1"), RepoSpec::new("r2"), RepoSpec::new("r4")]
        );
    }

    #[test]
    fn test_parse_repo_list_empty_input() {
        assert!(parse_repo_list("# only comments\n\n").is_empty());
    }
}
