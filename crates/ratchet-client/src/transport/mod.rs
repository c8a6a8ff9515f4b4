//! Transport handlers.
//!
//! Metadata and target bytes can come from networked mirrors or from a
//! local git commit history. The two handlers form a closed set behind a
//! single capability surface; callers hold a [`Transport`], never a
//! concrete handler.
//!
//! The shared failover policy lives in [`download_verified`]: sources are
//! tried strictly in order, the first one that both downloads and passes
//! verification wins, and per-source failures are accumulated into an
//! error map. There is no retry against a single source — resilience
//! comes from trying the next one.

pub mod git;
pub mod remote;

use std::collections::BTreeMap;
use std::fmt;

use time::OffsetDateTime;
use tracing::{debug, error};

use ratchet_core::{RatchetError, RatchetResult};

pub use self::git::GitCommitHandler;
pub use self::remote::RemoteMirrorHandler;
use crate::git::CommitId;

/// What kind of file is being resolved; mirrors lay metadata and targets
/// out under different paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Metadata,
    Target,
}

/// One location a file may be fetched from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Url(String),
    Commit(CommitId),
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Url(url) => f.write_str(url),
            Source::Commit(commit) => write!(f, "commit {commit}"),
        }
    }
}

/// The closed set of transport handlers.
#[derive(Debug)]
pub enum Transport {
    Remote(RemoteMirrorHandler),
    Git(GitCommitHandler),
}

impl Transport {
    /// Ordered list of sources for a logical file name.
    pub fn get_mirrors(&self, kind: FileKind, path: &str) -> Vec<Source> {
        match self {
            Transport::Remote(handler) => handler.source_list(kind, path),
            Transport::Git(handler) => handler.source_list(path),
        }
    }

    /// Fetch a metadata file, reading at most `upper_bound` bytes.
    pub fn get_metadata_file(
        &self,
        source: &Source,
        filename: &str,
        upper_bound: u64,
    ) -> RatchetResult<Vec<u8>> {
        match (self, source) {
            (Transport::Remote(handler), Source::Url(url)) => {
                handler.fetch(url, filename, upper_bound)
            }
            (Transport::Git(handler), Source::Commit(commit)) => {
                handler.fetch_metadata(commit, filename, upper_bound)
            }
            _ => Err(RatchetError::format("source does not belong to this transport")),
        }
    }

    /// Fetch a target file. With `safely` the trusted `length` is an
    /// exact bound; otherwise it is treated as a soft cap.
    pub fn get_target_file(
        &self,
        source: &Source,
        filepath: &str,
        length: u64,
        safely: bool,
    ) -> RatchetResult<Vec<u8>> {
        // The byte cap is identical either way; `safely` marks whether
        // the caller will follow with a hard length check.
        let _ = safely;
        match (self, source) {
            (Transport::Remote(handler), Source::Url(url)) => {
                handler.fetch(url, filepath, length)
            }
            (Transport::Git(handler), Source::Commit(commit)) => {
                handler.fetch_target(commit, filepath, length)
            }
            _ => Err(RatchetError::format("source does not belong to this transport")),
        }
    }

    /// Record that `filename` was satisfied by `source`. The git handler
    /// advances that file's commit cursor; mirrors keep no state.
    pub fn on_successful_update(&mut self, filename: &str, source: &Source) {
        if let (Transport::Git(handler), Source::Commit(commit)) = (self, source) {
            handler.advance(filename, commit);
        }
    }

    /// Record that every source for `filename` failed.
    pub fn on_unsuccessful_update(&self, filename: &str) {
        error!(filename, "failed to update from all sources");
    }

    /// The boundary time metadata must expire strictly after. Wall clock
    /// for remote mirrors; the git handler may pin it to a commit time.
    pub fn earliest_valid_expiration(&self) -> OffsetDateTime {
        match self {
            Transport::Remote(_) => OffsetDateTime::now_utc(),
            Transport::Git(handler) => handler.earliest_valid_expiration(),
        }
    }
}

/// A successful download plus the failures that preceded it.
#[derive(Debug)]
pub struct DownloadOutcome {
    pub bytes: Vec<u8>,
    pub source: Source,
    /// Sources that failed before the winning one, by rendered source.
    pub failures: BTreeMap<String, RatchetError>,
}

/// Shared mirror-failover download.
///
/// Tries each source in order; the first whose bytes also pass `verify`
/// wins and the handler is notified. Exhausting every source raises
/// [`RatchetError::NoWorkingMirror`] carrying the full per-source error
/// map, which is what lets an operator tell a partial outage from
/// tampering.
pub fn download_verified(
    transport: &mut Transport,
    kind: FileKind,
    name: &str,
    cap: u64,
    verify: impl Fn(&[u8]) -> RatchetResult<()>,
) -> RatchetResult<DownloadOutcome> {
    let sources = transport.get_mirrors(kind, name);
    let mut failures = BTreeMap::new();

    for source in sources {
        let fetched = match kind {
            FileKind::Metadata => transport.get_metadata_file(&source, name, cap),
            FileKind::Target => transport.get_target_file(&source, name, cap, true),
        };
        let outcome = fetched.and_then(|bytes| {
            verify(&bytes)?;
            Ok(bytes)
        });

        match outcome {
            Ok(bytes) => {
                debug!(name, %source, "download verified");
                transport.on_successful_update(name, &source);
                return Ok(DownloadOutcome {
                    bytes,
                    source,
                    failures,
                });
            }
            Err(err) => {
                debug!(name, %source, %err, "source failed, trying next");
                failures.insert(source.to_string(), err);
            }
        }
    }

    transport.on_unsuccessful_update(name);
    Err(RatchetError::NoWorkingMirror {
        name: name.to_string(),
        errors: failures,
    })
}
