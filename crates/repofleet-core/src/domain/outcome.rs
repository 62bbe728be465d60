//! Per-repository outcomes and failure classification.
//!
//! Exactly one [`RepoOutcome`] is produced per processed repository; it is the
//! unit of failure isolation and the unit of ledger logging.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Pipeline step at which a repository failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureStep {
    Clone,
    SourceBranch,
    CreateBranch,
    CheckoutBranch,
    Replace,
    Commit,
    Push,
}

impl FailureStep {
    fn label(&self) -> &'static str {
        match self {
            FailureStep::Clone => "Clone error",
            FailureStep::SourceBranch => "Source branch error",
            FailureStep::CreateBranch => "Branch creation error",
            FailureStep::CheckoutBranch => "Branch checkout error",
            FailureStep::Replace => "Replacement error",
            FailureStep::Commit => "Commit error",
            FailureStep::Push => "Push error",
        }
    }
}

/// Cause class, recovered by inspecting the failure message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureCause {
    Authentication,
    NotFound,
    Permission,
    HostResolution,
    BranchExists,
    RemoteRejected,
    Timeout,
    Other,
}

impl FailureCause {
    fn label(&self) -> Option<&'static str> {
        match self {
            FailureCause::Authentication => Some("authentication"),
            FailureCause::NotFound => Some("not found"),
            FailureCause::Permission => Some("permission denied"),
            FailureCause::HostResolution => Some("host resolution"),
            FailureCause::BranchExists => Some("branch already exists"),
            FailureCause::RemoteRejected => Some("remote rejected"),
            FailureCause::Timeout => Some("timed out"),
            FailureCause::Other => None,
        }
    }
}

/// Classify a git/HTTP failure message into a [`FailureCause`].
///
/// Pattern order matters: SSH auth failures also mention "denied", so
/// authentication phrases are checked before permission phrases.
pub fn classify_failure(message: &str) -> FailureCause {
    let lower = message.to_ascii_lowercase();
    if lower.contains("timed out") {
        FailureCause::Timeout
    } else if lower.contains("authentication failed")
        || lower.contains("could not read username")
        || lower.contains("invalid credentials")
        || lower.contains("publickey")
    {
        FailureCause::Authentication
    } else if lower.contains("could not resolve host")
        || lower.contains("name or service not known")
        || lower.contains("failure in name resolution")
    {
        FailureCause::HostResolution
    } else if lower.contains("already exists") {
        FailureCause::BranchExists
    } else if lower.contains("not found") || lower.contains("does not exist") {
        FailureCause::NotFound
    } else if lower.contains("permission denied") || lower.contains("access denied") {
        FailureCause::Permission
    } else if lower.contains("rejected")
        || lower.contains("failed to push some refs")
        || lower.contains("non-fast-forward")
    {
        FailureCause::RemoteRejected
    } else {
        FailureCause::Other
    }
}

/// A classified, human-readable failure for one repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReason {
    pub step: FailureStep,
    pub cause: FailureCause,
    /// First line of the underlying message, truncated for the ledger.
    pub detail: String,
}

const DETAIL_MAX: usize = 120;

impl FailureReason {
    /// Build a reason from a step and the raw failure message, classifying
    /// the cause from the message text.
    pub fn from_message(step: FailureStep, message: &str) -> Self {
        let first_line = message.lines().next().unwrap_or("").trim();
        let detail = if first_line.len() > DETAIL_MAX {
            let mut end = DETAIL_MAX;
            while !first_line.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}...", &first_line[..end])
        } else {
            first_line.to_string()
        };
        Self {
            step,
            cause: classify_failure(message),
            detail,
        }
    }

    pub fn new(step: FailureStep, cause: FailureCause, detail: impl Into<String>) -> Self {
        Self {
            step,
            cause,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.step.label())?;
        if let Some(cause) = self.cause.label() {
            write!(f, " ({cause})")?;
        }
        if !self.detail.is_empty() {
            write!(f, ": {}", self.detail)?;
        }
        Ok(())
    }
}

/// Why a pushed branch ended up without a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrSkip {
    /// PR creation disabled in configuration.
    Disabled,
    /// No credential configured for the platform API; soft-skip, not a failure.
    MissingCredential,
    /// The PR API call failed after a successful push.
    CreationFailed(String),
}

/// Terminal outcome for one repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RepoOutcome {
    /// Branch pushed and a pull request opened.
    PullRequestCreated { url: String },
    /// Branch pushed; no pull request exists (disabled, skipped, or failed).
    BranchPushedNoPr { skip: PrSkip },
    /// No replacement rule matched any eligible content.
    NoChanges,
    /// The pipeline failed at some step; the fleet run continues.
    Failed { reason: FailureReason },
}

impl RepoOutcome {
    pub fn failed(step: FailureStep, message: &str) -> Self {
        RepoOutcome::Failed {
            reason: FailureReason::from_message(step, message),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, RepoOutcome::Failed { .. })
    }

    /// Render the fixed ledger result vocabulary.
    pub fn ledger_result(&self) -> String {
        match self {
            RepoOutcome::PullRequestCreated { url } => url.clone(),
            RepoOutcome::BranchPushedNoPr {
                skip: PrSkip::CreationFailed(_),
            } => "Branch pushed (PR creation failed)".to_string(),
            RepoOutcome::BranchPushedNoPr { .. } => "Branch pushed (PR not created)".to_string(),
            RepoOutcome::NoChanges => {
                "No changes (replacements did not match any content)".to_string()
            }
            RepoOutcome::Failed { reason } => format!("Failed: {reason}"),
        }
    }
}
