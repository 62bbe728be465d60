//! Outcome ledger: the durable, authoritative record of a fleet run.
//!
//! Append-only; one entry per processed repository; tab-separated with a
//! fixed result vocabulary. Console output is advisory, this file is not.

use std::io::Write;
use std::path::Path;

use crate::domain::outcome::RepoOutcome;

/// One recorded outcome.
#[derive(Debug, Clone)]
pub struct LedgerEntry {
    pub repo: String,
    pub outcome: RepoOutcome,
}

/// Aggregate counts over a completed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Append-only per-repository result log.
#[derive(Debug, Default)]
pub struct ResultLedger {
    entries: Vec<LedgerEntry>,
}

impl ResultLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, repo: impl Into<String>, outcome: RepoOutcome) {
        self.entries.push(LedgerEntry {
            repo: repo.into(),
            outcome,
        });
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    /// A soft-skip (no changes, PR not created) counts as success; only
    /// `Failed` outcomes count as failures.
    pub fn summary(&self) -> RunSummary {
        let failed = self
            .entries
            .iter()
            .filter(|e| e.outcome.is_failure())
            .count();
        RunSummary {
            total: self.entries.len(),
            succeeded: self.entries.len() - failed,
            failed,
        }
    }

    /// Render the tab-separated ledger: one header line, then one line per
    /// repository.
    pub fn render(&self) -> String {
        let mut out = String::from("Repository\tResult\n");
        for entry in &self.entries {
            out.push_str(&entry.repo);
            out.push('\t');
            out.push_str(&entry.outcome.ledger_result());
            out.push('\n');
        }
        out
    }

    pub fn write_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut file = std::fs::File::create(path)?;
        file.write_all(self.render().as_bytes())?;
        Ok(())
    }
}
