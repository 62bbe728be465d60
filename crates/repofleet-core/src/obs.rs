//! Structured observability hooks for fleet-run lifecycle events.
//!
//! Events are emitted at `info!` level (configurable via the `REPOFLEET_LOG`
//! env var at the CLI boundary; `--json` switches to JSON lines).

use tracing::info;

use crate::ledger::RunSummary;

/// Repo-scoped span for one repository's pipeline. Attach with
/// `tracing::Instrument` so it survives await points intact.
pub fn repo_span(repo: &str) -> tracing::Span {
    tracing::info_span!("fleet.repo", repo = %repo)
}

/// Run-scoped span carrying the run id.
pub fn run_span(run_id: &uuid::Uuid) -> tracing::Span {
    tracing::info_span!("fleet.run", run_id = %run_id)
}

/// Emit event: repository pipeline started.
pub fn emit_repo_started(repo: &str, index: usize, total: usize) {
    info!(event = "repo.started", repo = %repo, index = index + 1, total = total);
}

/// Emit event: repository pipeline reached its terminal outcome.
pub fn emit_repo_finished(repo: &str, result: &str, failed: bool) {
    info!(event = "repo.finished", repo = %repo, result = %result, failed = failed);
}

/// Emit event: whole run finished.
pub fn emit_run_summary(summary: &RunSummary, ledger_path: &std::path::Path) {
    info!(
        event = "run.summary",
        total = summary.total,
        succeeded = summary.succeeded,
        failed = summary.failed,
        ledger = %ledger_path.display(),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_constructors() {
        let _repo = repo_span("acme/r1");
        let _run = run_span(&uuid::Uuid::new_v4());
    }
}
