//! Per-repository mutation pipeline and fleet-level driver.
//!
//! One repository walks the state machine
//! `Cloned → SourceBranchReady → WorkingBranchReady → Replaced → Committed →
//! Pushed → PRResolved → Done`; every terminal state, success or failure,
//! becomes exactly one [`RepoOutcome`]. Nothing thrown inside one
//! repository's pipeline crosses into another's: the fleet run always
//! continues to the next repository.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tracing::{info, warn, Instrument};

use crate::auth::AuthContext;
use crate::config::{OnExistingBranch, RunConfig};
use crate::domain::error::ConfigError;
use crate::domain::model::RepoSpec;
use crate::domain::outcome::{FailureStep, PrSkip, RepoOutcome};
use crate::git::{GitCli, GitClient};
use crate::ledger::ResultLedger;
use crate::obs::{emit_repo_finished, emit_repo_started, emit_run_summary, repo_span, run_span};
use crate::pr::{backend_for, open_pull_request, PullRequestBackend};
use crate::replace::ReplacementEngine;
use crate::sync::BranchSyncResolver;

/// Everything a finished run produces.
pub struct FleetReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub ledger: ResultLedger,
}

/// Drives the mutation pipeline across the whole repository list.
pub struct FleetOrchestrator {
    config: Arc<RunConfig>,
    engine: Arc<ReplacementEngine>,
    backend: Arc<dyn PullRequestBackend>,
    auth: AuthContext,
}

impl FleetOrchestrator {
    /// Build the run: parse rules, compile file patterns, select the PR
    /// backend once. All errors here are fatal pre-loop errors.
    pub fn new(config: RunConfig, auth: AuthContext) -> Result<Self, ConfigError> {
        let rules = config.parsed_rules()?;
        let engine = ReplacementEngine::new(rules, &config.file_patterns, config.case_sensitive)?;
        let backend: Arc<dyn PullRequestBackend> = Arc::from(backend_for(&config));
        Ok(Self {
            config: Arc::new(config),
            engine: Arc::new(engine),
            backend,
            auth,
        })
    }

    /// Process every repository and return the completed ledger.
    ///
    /// With `parallelism == 1` repositories are processed strictly in list
    /// order. With more, up to that many repositories run concurrently on
    /// independent working trees; outcomes are still recorded in list order
    /// so the ledger is identical in both modes.
    pub async fn run(&self, repos: &[RepoSpec]) -> FleetReport {
        let run_id = uuid::Uuid::new_v4();
        self.run_inner(repos).instrument(run_span(&run_id)).await
    }

    async fn run_inner(&self, repos: &[RepoSpec]) -> FleetReport {
        let started_at = Utc::now();
        let total = repos.len();
        info!(total, parallelism = self.config.parallelism, "starting fleet run");

        let mut ledger = ResultLedger::new();
        if self.config.parallelism <= 1 {
            for (index, repo) in repos.iter().enumerate() {
                let outcome = self.process_repo(repo, index, total).await;
                ledger.record(repo.name.clone(), outcome);
            }
        } else {
            let mut indexed: Vec<(usize, RepoOutcome)> = stream::iter(
                repos.iter().enumerate().map(|(index, repo)| {
                    let this = &*self;
                    async move { (index, this.process_repo(repo, index, total).await) }
                }),
            )
            .buffer_unordered(self.config.parallelism)
            .collect()
            .await;
            indexed.sort_by_key(|(index, _)| *index);
            for (index, outcome) in indexed {
                ledger.record(repos[index].name.clone(), outcome);
            }
        }

        emit_run_summary(&ledger.summary(), &self.config.ledger_path);
        FleetReport {
            started_at,
            finished_at: Utc::now(),
            ledger,
        }
    }

    /// Run one repository through the state machine. Never returns an error:
    /// every failure becomes a `Failed` outcome for this repository alone.
    async fn process_repo(&self, repo: &RepoSpec, index: usize, total: usize) -> RepoOutcome {
        self.process_repo_inner(repo, index, total)
            .instrument(repo_span(&repo.name))
            .await
    }

    async fn process_repo_inner(&self, repo: &RepoSpec, index: usize, total: usize) -> RepoOutcome {
        emit_repo_started(&repo.name, index, total);

        let work_tree = self.config.work_dir.join(&repo.name);
        let outcome = self.mutate(repo, &work_tree).await;

        if !self.config.keep_work_dir && work_tree.exists() {
            if let Err(e) = std::fs::remove_dir_all(&work_tree) {
                warn!(path = %work_tree.display(), error = %e, "failed to remove working tree");
            }
        }

        emit_repo_finished(&repo.name, &outcome.ledger_result(), outcome.is_failure());
        outcome
    }

    async fn mutate(&self, repo: &RepoSpec, work_tree: &Path) -> RepoOutcome {
        let config = &self.config;
        let git = GitCli::new(
            work_tree,
            self.auth.git_config_args(),
            config.operation_timeout_secs,
        );

        // Cloned. A leftover tree from an aborted earlier run would make the
        // clone fail, so clear it first.
        if work_tree.exists() {
            if let Err(e) = std::fs::remove_dir_all(work_tree) {
                return RepoOutcome::failed(FailureStep::Clone, &format!("stale tree: {e}"));
            }
        }
        if let Err(e) = std::fs::create_dir_all(&config.work_dir) {
            return RepoOutcome::failed(FailureStep::Clone, &format!("work dir: {e}"));
        }
        let url = repo.clone_url(&config.base_url);
        info!(url = %url, "cloning");
        if let Err(e) = git.clone_repo(&url, work_tree).await {
            return RepoOutcome::failed(FailureStep::Clone, &e.to_string());
        }

        // SourceBranchReady.
        if let Err(e) = BranchSyncResolver::resolve(&git, config.source_branch.as_deref()).await {
            return RepoOutcome::failed(FailureStep::SourceBranch, &e.to_string());
        }

        // WorkingBranchReady.
        if let Err(e) = git.checkout_new_branch(&config.branch_name).await {
            let message = e.to_string();
            let exists = message.contains("already exists");
            match (exists, config.on_existing_branch) {
                (true, OnExistingBranch::Reuse) => {
                    warn!(branch = %config.branch_name, "branch exists; reusing");
                    if let Err(e) = git.checkout_branch(&config.branch_name).await {
                        return RepoOutcome::failed(FailureStep::CheckoutBranch, &e.to_string());
                    }
                }
                _ => return RepoOutcome::failed(FailureStep::CreateBranch, &message),
            }
        }

        // Replaced.
        let report = match self.engine.apply(work_tree) {
            Ok(report) => report,
            Err(e) => return RepoOutcome::failed(FailureStep::Replace, &e.to_string()),
        };
        if !report.any_changes() {
            info!("no replacement matched; skipping commit, push, and PR");
            return RepoOutcome::NoChanges;
        }

        // Committed.
        if let Err(e) = git.stage_all().await {
            return RepoOutcome::failed(FailureStep::Commit, &e.to_string());
        }
        match git.has_staged_changes().await {
            // A rule can rewrite text to its original form; the engine saw
            // matches but the tree is unchanged. Same terminal as NoChanges.
            Ok(false) => {
                info!("nothing staged despite reported matches; treating as no changes");
                return RepoOutcome::NoChanges;
            }
            Ok(true) => {}
            Err(e) => return RepoOutcome::failed(FailureStep::Commit, &e.to_string()),
        }
        if let Err(e) = git.commit(&config.commit_message).await {
            return RepoOutcome::failed(FailureStep::Commit, &e.to_string());
        }

        // Pushed.
        if let Err(e) = git.push(&config.branch_name).await {
            return RepoOutcome::failed(FailureStep::Push, &e.to_string());
        }

        // PRResolved. A push that succeeded is never downgraded to a failure
        // by anything that happens here.
        if !config.pr.create {
            return RepoOutcome::BranchPushedNoPr {
                skip: PrSkip::Disabled,
            };
        }
        let owner_repo = format!("{}/{}", config.owner_path(), repo.name);
        match open_pull_request(&*self.backend, &config.pr, &owner_repo, &config.branch_name).await
        {
            Ok(Some(url)) => RepoOutcome::PullRequestCreated { url },
            Ok(None) => RepoOutcome::BranchPushedNoPr {
                skip: PrSkip::MissingCredential,
            },
            Err(e) => RepoOutcome::BranchPushedNoPr {
                skip: PrSkip::CreationFailed(e.to_string()),
            },
        }
    }
}
