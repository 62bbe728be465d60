//! Repofleet core: fleet-wide batch source mutation.
//!
//! Given a repository list, an ordered set of literal text-replacement rules,
//! and branch/PR metadata, this library clones each repository, cuts a
//! mutation branch from a resolved source branch, applies every rule, commits
//! and pushes the result, opens a pull request on the configured platform,
//! and records exactly one outcome per repository in an append-only ledger.
//! One repository's failure never stops the fleet run.

pub mod auth;
pub mod config;
pub mod domain;
pub mod git;
pub mod ledger;
pub mod obs;
pub mod orchestrator;
pub mod pr;
pub mod replace;
pub mod sync;

pub use auth::AuthContext;
pub use config::{AuthMethod, OnExistingBranch, Platform, RunConfig};
pub use domain::error::{ConfigError, FleetError, Result};
pub use domain::model::{parse_repo_list, RepoSpec, ReplacementRule};
pub use domain::outcome::{FailureCause, FailureReason, FailureStep, PrSkip, RepoOutcome};
pub use git::{GitCli, GitClient};
pub use ledger::{LedgerEntry, ResultLedger, RunSummary};
pub use orchestrator::{FleetOrchestrator, FleetReport};
pub use pr::{backend_for, PullRequestBackend};
pub use replace::{ReplacementEngine, ReplacementReport};
pub use sync::{BranchSyncResolver, SyncDisposition};
