//! Git transport behavior: forward-only commit scanning with per-file
//! cursors, and the shared mirror-failover error accounting.

mod common;

use assert_matches::assert_matches;
use tempfile::tempdir;

use common::{engine_with_cache, git_transport, FakeHistory, TestRepo};
use ratchet_client::git::CommitId;
use ratchet_client::transport::{download_verified, GitCommitHandler};
use ratchet_client::{FileKind, Source, Transport};
use ratchet_core::metadata::Metadata;
use ratchet_core::RatchetError;

#[test]
fn cursor_resumes_after_the_winning_commit() {
    let repo = TestRepo::new();
    let v1 = repo.state(1, &[("targets/a.bin", b"alpha")], None);
    let v2 = repo.state(2, &[("targets/a.bin", b"alpha2")], None);

    // c1 is a mid-publish state: the new timestamp is in, but snapshot
    // and targets still carry v1. The v2 snapshot first appears at c2.
    let mut mid = v1.clone();
    mid.insert(
        "metadata/timestamp.json".to_string(),
        v2["metadata/timestamp.json"].clone(),
    );
    let trailing = v2.clone();

    let dir = tempdir().unwrap();
    let mut engine = engine_with_cache(
        dir.path(),
        &[("root.json", repo.root_bytes(1))],
        git_transport(vec![("c0", v1), ("c1", mid), ("c2", v2), ("c3", trailing)]),
    )
    .unwrap();

    engine.refresh().unwrap();
    assert_eq!(engine.trusted_snapshot().unwrap().version, 2);

    // snapshot.json was found at c2, so the next scan for it starts at
    // c3 only.
    let sources = engine
        .transport()
        .get_mirrors(FileKind::Metadata, "snapshot.json");
    assert_eq!(sources, vec![Source::Commit(CommitId::from("c3"))]);
}

#[test]
fn failover_accumulates_exactly_the_failed_sources() {
    let repo = TestRepo::new();
    let good = repo.state(1, &[], None);
    let good_timestamp = good["metadata/timestamp.json"].clone();

    let mut garbage1 = good.clone();
    garbage1.insert("metadata/timestamp.json".to_string(), b"junk-1".to_vec());
    let mut garbage2 = good.clone();
    garbage2.insert("metadata/timestamp.json".to_string(), b"junk-2".to_vec());

    let mut transport = git_transport(vec![("c0", garbage1), ("c1", garbage2), ("c2", good)]);

    let outcome = download_verified(
        &mut transport,
        FileKind::Metadata,
        "timestamp.json",
        16 * 1024,
        |bytes| Metadata::from_bytes(bytes).map(|_| ()),
    )
    .unwrap();

    assert_eq!(outcome.bytes, good_timestamp);
    assert_eq!(outcome.source, Source::Commit(CommitId::from("c2")));
    assert_eq!(outcome.failures.len(), 2);
    assert!(outcome.failures.contains_key("commit c0"));
    assert!(outcome.failures.contains_key("commit c1"));
}

#[test]
fn exhausting_every_source_raises_the_full_error_map() {
    let repo = TestRepo::new();
    let good = repo.state(1, &[], None);

    let mut garbage1 = good.clone();
    garbage1.insert("metadata/timestamp.json".to_string(), b"junk-1".to_vec());
    let mut garbage2 = good;
    garbage2.insert("metadata/timestamp.json".to_string(), b"junk-2".to_vec());

    let mut transport = git_transport(vec![("c0", garbage1), ("c1", garbage2)]);

    let err = download_verified(
        &mut transport,
        FileKind::Metadata,
        "timestamp.json",
        16 * 1024,
        |bytes| Metadata::from_bytes(bytes).map(|_| ()),
    )
    .unwrap_err();

    assert_matches!(&err, RatchetError::NoWorkingMirror { name, errors } => {
        assert_eq!(name, "timestamp.json");
        assert_eq!(errors.len(), 2);
        assert!(errors
            .values()
            .all(|cause| matches!(cause, RatchetError::Format(_))));
    });
}

#[test]
fn files_missing_from_a_commit_are_that_commits_failure() {
    let repo = TestRepo::new();
    let mut state = repo.state(1, &[], None);
    state.remove("metadata/timestamp.json");

    let mut transport = git_transport(vec![("c0", state)]);
    let err = download_verified(
        &mut transport,
        FileKind::Metadata,
        "timestamp.json",
        16 * 1024,
        |bytes| Metadata::from_bytes(bytes).map(|_| ()),
    )
    .unwrap_err();

    assert_matches!(&err, RatchetError::NoWorkingMirror { errors, .. } => {
        assert!(errors
            .values()
            .all(|cause| matches!(cause, RatchetError::Git(_))));
    });
}

#[test]
fn the_client_head_is_the_first_source_scanned() {
    let repo = TestRepo::new();
    let v1 = repo.state(1, &[], None);
    let v2 = repo.state(2, &[], None);

    let validation = FakeHistory::new(vec![("c0", v1), ("c1", v2)]);
    let client = FakeHistory {
        commits: vec![validation.commits[0].clone()],
        head: 0,
    };
    let handler = GitCommitHandler::new(Box::new(validation), &client).unwrap();
    let transport = Transport::Git(handler);

    let sources = transport.get_mirrors(FileKind::Metadata, "root.json");
    assert_eq!(
        sources,
        vec![
            Source::Commit(CommitId::from("c0")),
            Source::Commit(CommitId::from("c1")),
        ]
    );
}
