//! Source-branch synchronization: put the working tree on the correct
//! starting point before the mutation branch is cut.

use tracing::{info, warn};

use crate::domain::error::{FleetError, Result};
use crate::git::GitClient;

/// What the resolver did to the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDisposition {
    /// No source branch configured; the clone's default branch is used as-is.
    DefaultBranch,
    /// Local was behind only; fast-forwarded to the remote.
    FastForwarded,
    /// Local and remote have both moved; left unsynced deliberately.
    Diverged { ahead: usize, behind: usize },
    /// Local already matches (or is ahead of) the remote.
    UpToDate,
    /// Fetch failed; proceeding on best-effort local state.
    FetchSkipped,
}

/// Resolves the configured source branch against its remote state.
///
/// Checkout failures are fatal for the repository (the source branch is
/// missing); fetch and pull problems are warnings only, because failing an
/// unattended batch over transient remote state is worse than proceeding on
/// the local view. A diverged branch is never pulled: a merge here could
/// introduce conflicts with nobody watching.
pub struct BranchSyncResolver;

impl BranchSyncResolver {
    pub async fn resolve(
        git: &dyn GitClient,
        source_branch: Option<&str>,
    ) -> Result<SyncDisposition> {
        let branch = match source_branch {
            Some(b) if !b.is_empty() => b,
            _ => return Ok(SyncDisposition::DefaultBranch),
        };

        git.checkout_branch(branch)
            .await
            .map_err(|e| FleetError::SourceBranchMissing(format!("{branch}: {e}")))?;

        if let Err(e) = git.fetch(branch).await {
            warn!(branch, error = %e, "fetch failed; continuing with local state");
            return Ok(SyncDisposition::FetchSkipped);
        }

        let (ahead, behind) = git.ahead_behind(branch).await?;
        if behind > 0 && ahead == 0 {
            if let Err(e) = git.pull().await {
                warn!(branch, error = %e, "fast-forward pull failed; continuing");
                return Ok(SyncDisposition::FetchSkipped);
            }
            info!(branch, behind, "fast-forwarded source branch");
            Ok(SyncDisposition::FastForwarded)
        } else if behind > 0 && ahead > 0 {
            warn!(
                event = "sync.diverged",
                branch,
                ahead,
                behind,
                "source branch diverged from remote; not pulling"
            );
            Ok(SyncDisposition::Diverged { ahead, behind })
        } else {
            Ok(SyncDisposition::UpToDate)
        }
    }
}
