//! Read-only git query surface.
//!
//! The git transport never shells out or links libgit2 itself: the
//! embedder supplies an implementation of these traits (low-level
//! plumbing is the host's concern), and the transport restricts itself to
//! the minimal read-only queries below. This keeps the trusted surface of
//! the client small and makes the transport fully testable with an
//! in-memory history.

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

use ratchet_core::{RatchetError, RatchetResult};

/// An opaque commit identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CommitId(pub String);

impl CommitId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CommitId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Read-only queries over one git repository's commit history.
pub trait GitHistory: Send {
    /// Whether the path this instance was opened on is a git repository.
    fn is_repository(&self) -> bool;

    /// Switch the working view to `name`.
    fn checkout_branch(&mut self, name: &str) -> RatchetResult<()>;

    /// The commit the repository currently points at.
    fn head_commit(&self) -> RatchetResult<CommitId>;

    /// Commits strictly after `commit`, oldest first.
    fn commits_since(&self, commit: &CommitId) -> RatchetResult<Vec<CommitId>>;

    /// Paths present in the tree at `commit`.
    fn list_files_at(&self, commit: &CommitId) -> RatchetResult<BTreeSet<String>>;

    /// File content at a given commit (show-file-at-revision).
    fn show_file_at(&self, commit: &CommitId, path: &str) -> RatchetResult<Vec<u8>>;
}

/// A bare scratch clone of the authentication repository.
pub trait GitRemote: GitHistory {
    /// Clone `url` into `scratch` as a bare repository.
    fn clone_into(url: &str, scratch: &Path) -> RatchetResult<Self>
    where
        Self: Sized;

    /// Fetch all remote refs into the scratch clone.
    fn fetch_all(&mut self) -> RatchetResult<()>;
}

/// Default implementation used when no git backend is wired up; every
/// query fails. Mirrors the host-adapter convention: the interface lives
/// here, the plumbing lives in the embedder.
pub struct UnavailableGitHistory;

impl GitHistory for UnavailableGitHistory {
    fn is_repository(&self) -> bool {
        false
    }

    fn checkout_branch(&mut self, _name: &str) -> RatchetResult<()> {
        Err(unavailable())
    }

    fn head_commit(&self) -> RatchetResult<CommitId> {
        Err(unavailable())
    }

    fn commits_since(&self, _commit: &CommitId) -> RatchetResult<Vec<CommitId>> {
        Err(unavailable())
    }

    fn list_files_at(&self, _commit: &CommitId) -> RatchetResult<BTreeSet<String>> {
        Err(unavailable())
    }

    fn show_file_at(&self, _commit: &CommitId, _path: &str) -> RatchetResult<Vec<u8>> {
        Err(unavailable())
    }
}

fn unavailable() -> RatchetError {
    RatchetError::git("no git backend available; supply a GitHistory implementation")
}
