//! Run configuration: loading, validation, and the fatal pre-loop checks.
//!
//! Configuration is loaded once from a TOML file and never mutated during a
//! run. Everything that would make the whole run meaningless (missing repo
//! list, unknown platform, token auth without a token) is rejected here,
//! before any repository is touched.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::error::ConfigError;
use crate::domain::model::{parse_repo_list, RepoSpec, ReplacementRule};

/// Hosting platform for pull-request creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Github,
    Gitlab,
    Bitbucket,
}

impl std::str::FromStr for Platform {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "github" => Ok(Platform::Github),
            "gitlab" => Ok(Platform::Gitlab),
            "bitbucket" => Ok(Platform::Bitbucket),
            other => Err(ConfigError::UnknownPlatform(other.to_string())),
        }
    }
}

/// How git operations authenticate against the remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
    /// HTTPS token via a scoped credential-store file.
    #[default]
    Token,
    /// SSH key already loaded in the user's agent.
    Ssh,
    /// No authentication (public repositories).
    None,
}

/// Policy when the mutation branch already exists in a clone.
///
/// `Fail` is the safe default: reusing an existing branch can mix unrelated
/// prior content into a new pull request. `Reuse` checks the branch out and
/// continues, which enables reruns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnExistingBranch {
    #[default]
    Fail,
    Reuse,
}

/// Pull-request settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrConfig {
    /// Whether to open a pull request after a successful push.
    #[serde(default)]
    pub create: bool,

    #[serde(default = "default_platform")]
    pub platform: Platform,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub body: String,

    /// Target branch of the pull request.
    #[serde(default = "default_pr_base")]
    pub base_branch: String,

    /// Override the platform API base URL (primarily for tests).
    #[serde(default)]
    pub api_base_url: Option<String>,
}

impl Default for PrConfig {
    fn default() -> Self {
        Self {
            create: false,
            platform: default_platform(),
            title: String::new(),
            body: String::new(),
            base_branch: default_pr_base(),
            api_base_url: None,
        }
    }
}

/// Credential settings consumed by [`crate::auth::AuthContext`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub method: AuthMethod,

    #[serde(default)]
    pub username: String,

    /// API/git token. May be omitted in the file and supplied via the
    /// `REPOFLEET_TOKEN` environment variable at the CLI boundary.
    #[serde(default)]
    pub token: Option<String>,
}

/// Global immutable run configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Path to the repo-list file (one name per line).
    pub repo_list: PathBuf,

    /// Base URL that repository names are appended to.
    pub base_url: String,

    /// Directory that per-repository working trees are cloned under.
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// Path the outcome ledger is written to.
    #[serde(default = "default_ledger_path")]
    pub ledger_path: PathBuf,

    /// Mutation branch created in every repository.
    #[serde(default = "default_branch_name")]
    pub branch_name: String,

    /// Branch to cut the mutation branch from; empty means the clone's
    /// default branch.
    #[serde(default)]
    pub source_branch: Option<String>,

    #[serde(default = "default_commit_message")]
    pub commit_message: String,

    /// Raw `"search|replace"` rule pairs, applied in declared order.
    pub replacements: Vec<String>,

    /// File-name globs; empty means match everything.
    #[serde(default)]
    pub file_patterns: Vec<String>,

    #[serde(default = "default_true")]
    pub case_sensitive: bool,

    #[serde(default)]
    pub on_existing_branch: OnExistingBranch,

    /// Repositories processed concurrently. 1 preserves the strictly
    /// sequential default.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,

    /// Per-operation timeout for clone/fetch/pull/push/PR calls. 0 disables.
    #[serde(default)]
    pub operation_timeout_secs: u64,

    /// Keep working trees on disk after processing, for inspection.
    #[serde(default)]
    pub keep_work_dir: bool,

    #[serde(default)]
    pub pr: PrConfig,

    #[serde(default)]
    pub auth: AuthConfig,
}

fn default_platform() -> Platform {
    Platform::Github
}

fn default_pr_base() -> String {
    "main".to_string()
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("./repos_temp")
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from("./batch_update_log.txt")
}

fn default_branch_name() -> String {
    "update-strings".to_string()
}

fn default_commit_message() -> String {
    "Batch update: automated text replacements".to_string()
}

fn default_true() -> bool {
    true
}

fn default_parallelism() -> usize {
    1
}

impl RunConfig {
    /// Load and validate a configuration file. Any error here is fatal for
    /// the whole run.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::parse_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse without validating, for callers that overlay values (e.g. a
    /// token from the environment) before the fatal pre-loop checks run.
    pub fn parse_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Unreadable {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Invalid {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// Fatal pre-loop validation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.is_empty() {
            return Err(ConfigError::Invalid {
                path: String::new(),
                reason: "base_url must not be empty".to_string(),
            });
        }
        if self.branch_name.is_empty() {
            return Err(ConfigError::Invalid {
                path: String::new(),
                reason: "branch_name must not be empty".to_string(),
            });
        }
        if self.replacements.is_empty() {
            return Err(ConfigError::Invalid {
                path: String::new(),
                reason: "at least one replacement rule is required".to_string(),
            });
        }
        self.parsed_rules()?;
        if self.parallelism == 0 {
            return Err(ConfigError::Invalid {
                path: String::new(),
                reason: "parallelism must be at least 1".to_string(),
            });
        }
        if self.auth.method == AuthMethod::Token {
            if self.auth.token.as_deref().unwrap_or("").is_empty() {
                return Err(ConfigError::Auth(
                    "auth method is 'token' but no token is configured".to_string(),
                ));
            }
            if !self.base_url.starts_with("https://") {
                return Err(ConfigError::Auth(
                    "token auth requires an https:// base_url".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Parse the declared rules, preserving order.
    pub fn parsed_rules(&self) -> Result<Vec<ReplacementRule>, ConfigError> {
        self.replacements
            .iter()
            .enumerate()
            .map(|(i, raw)| ReplacementRule::parse(raw, i))
            .collect()
    }

    /// Read and parse the repo-list file. An empty effective list is fatal.
    pub fn load_repo_list(&self) -> Result<Vec<RepoSpec>, ConfigError> {
        let content =
            std::fs::read_to_string(&self.repo_list).map_err(|e| ConfigError::RepoList {
                path: self.repo_list.display().to_string(),
                reason: e.to_string(),
            })?;
        let repos = parse_repo_list(&content);
        if repos.is_empty() {
            return Err(ConfigError::RepoList {
                path: self.repo_list.display().to_string(),
                reason: "no repositories listed".to_string(),
            });
        }
        Ok(repos)
    }

    /// Owner path derived from the base URL: text after the colon for
    /// SSH-style URLs, final path segment for HTTPS-style URLs.
    pub fn owner_path(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if let Some(rest) = base.strip_prefix("git@") {
            rest.split_once(':')
                .map(|(_, owner)| owner)
                .unwrap_or(rest)
                .to_string()
        } else {
            base.rsplit('/').next().unwrap_or(base).to_string()
        }
    }
}
