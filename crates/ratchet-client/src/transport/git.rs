//! Git commit-history transport.
//!
//! The repository's authentication history is itself the mirror list:
//! sources are commit identifiers rather than URLs, ordered from the
//! client's current head forward. A per-filename cursor records which
//! commit last satisfied each file, so already-validated history is never
//! re-scanned on later refreshes.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use time::OffsetDateTime;
use tracing::{debug, info};

use ratchet_core::{RatchetError, RatchetResult};

use crate::git::{CommitId, GitHistory, GitRemote};
use crate::transport::Source;

pub struct GitCommitHandler {
    /// Scratch clone of the authentication repository.
    validation: Box<dyn GitHistory>,
    /// The client's head followed by every commit after it, oldest first.
    commits: Vec<CommitId>,
    /// filename -> index of the first commit still worth scanning.
    cursors: HashMap<String, usize>,
    /// Tree path metadata files live under, like a mirror's
    /// `metadata_path`.
    metadata_path: String,
    /// Tree path target files live under.
    targets_path: String,
    expiration_floor: Option<OffsetDateTime>,
}

impl fmt::Debug for GitCommitHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitCommitHandler")
            .field("commits", &self.commits)
            .field("cursors", &self.cursors)
            .field("metadata_path", &self.metadata_path)
            .field("targets_path", &self.targets_path)
            .field("expiration_floor", &self.expiration_floor)
            .finish_non_exhaustive()
    }
}

impl GitCommitHandler {
    /// Build the handler from an already-materialized scratch clone and
    /// the client's checkout. The first scan for every file starts at the
    /// client's own head: the working copy counts as a source too.
    pub fn new(
        validation: Box<dyn GitHistory>,
        client: &dyn GitHistory,
    ) -> RatchetResult<Self> {
        if !client.is_repository() {
            return Err(RatchetError::git("client path is not a git repository"));
        }

        let head = client.head_commit()?;
        let newer = validation.commits_since(&head)?;
        info!(head = %head, pending = newer.len(), "git transport ready");

        let mut commits = Vec::with_capacity(newer.len() + 1);
        commits.push(head);
        commits.extend(newer);

        Ok(Self {
            validation,
            commits,
            cursors: HashMap::new(),
            metadata_path: "metadata".to_string(),
            targets_path: String::new(),
            expiration_floor: None,
        })
    }

    /// Override where metadata and target files sit inside the tree.
    pub fn with_layout(
        mut self,
        metadata_path: impl Into<String>,
        targets_path: impl Into<String>,
    ) -> Self {
        self.metadata_path = metadata_path.into();
        self.targets_path = targets_path.into();
        self
    }

    /// Clone the authentication repository into a scratch bare clone and
    /// build the handler, optionally pinning a validation branch.
    pub fn bootstrap<R: GitRemote + 'static>(
        url: &str,
        scratch: &Path,
        branch: Option<&str>,
        client: &dyn GitHistory,
    ) -> RatchetResult<Self> {
        let mut validation = R::clone_into(url, scratch)?;
        validation.fetch_all()?;
        if let Some(branch) = branch {
            validation.checkout_branch(branch)?;
        }
        Self::new(Box::new(validation), client)
    }

    /// Pin the earliest-valid-expiration boundary, e.g. to the head
    /// commit's author time, instead of the wall clock.
    pub fn pin_expiration_floor(&mut self, floor: OffsetDateTime) {
        self.expiration_floor = Some(floor);
    }

    pub(crate) fn earliest_valid_expiration(&self) -> OffsetDateTime {
        self.expiration_floor.unwrap_or_else(OffsetDateTime::now_utc)
    }

    /// The suffix of the commit list still worth scanning for `filename`.
    pub(crate) fn source_list(&self, filename: &str) -> Vec<Source> {
        let start = self.cursors.get(filename).copied().unwrap_or(0);
        self.commits[start.min(self.commits.len())..]
            .iter()
            .cloned()
            .map(Source::Commit)
            .collect()
    }

    pub(crate) fn fetch_metadata(
        &self,
        commit: &CommitId,
        filename: &str,
        cap: u64,
    ) -> RatchetResult<Vec<u8>> {
        self.fetch(commit, &tree_path(&self.metadata_path, filename), cap)
    }

    pub(crate) fn fetch_target(
        &self,
        commit: &CommitId,
        filepath: &str,
        cap: u64,
    ) -> RatchetResult<Vec<u8>> {
        self.fetch(commit, &tree_path(&self.targets_path, filepath), cap)
    }

    fn fetch(&self, commit: &CommitId, path: &str, cap: u64) -> RatchetResult<Vec<u8>> {
        let files = self.validation.list_files_at(commit)?;
        if !files.contains(path) {
            return Err(RatchetError::git(format!(
                "'{path}' not present at commit {commit}"
            )));
        }

        let bytes = self.validation.show_file_at(commit, path)?;
        ratchet_core::verify::check_soft_length(path, bytes.len() as u64, cap)?;
        Ok(bytes)
    }

    /// Advance `filename`'s cursor past the commit that satisfied it.
    pub(crate) fn advance(&mut self, filename: &str, commit: &CommitId) {
        if let Some(pos) = self.commits.iter().position(|c| c == commit) {
            debug!(filename, commit = %commit, "advancing commit cursor");
            self.cursors.insert(filename.to_string(), pos + 1);
        }
    }
}

fn tree_path(prefix: &str, name: &str) -> String {
    let prefix = prefix.trim_matches('/');
    let name = name.trim_start_matches('/');
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}/{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tree_paths_join_cleanly() {
        assert_eq!(tree_path("metadata", "root.json"), "metadata/root.json");
        assert_eq!(tree_path("", "targets/app.bin"), "targets/app.bin");
        assert_eq!(tree_path("/files/", "a/b"), "files/a/b");
    }
}
