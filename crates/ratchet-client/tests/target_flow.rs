//! Target download and pruning: hard integrity checks, consistent-snapshot
//! path rewriting, atomic placement, and obsolete-target removal.

mod common;

use std::fs;

use assert_matches::assert_matches;
use tempfile::tempdir;

use common::{engine_with_cache, git_transport, sha256_hex, TestRepo};
use ratchet_core::RatchetError;

#[test]
fn download_then_prune_obsolete_targets() {
    let repo = TestRepo::new();
    let v1 = repo.state(
        1,
        &[("targets/a.bin", b"alpha"), ("targets/b.bin", b"bravo")],
        None,
    );
    let v2 = repo.state(2, &[("targets/a.bin", b"alpha")], None);

    // The client trusted v1 in a prior session; b.bin is on disk.
    let cached = [
        ("root.json", v1["metadata/root.json"].clone()),
        ("timestamp.json", v1["metadata/timestamp.json"].clone()),
        ("snapshot.json", v1["metadata/snapshot.json"].clone()),
        ("targets.json", v1["metadata/targets.json"].clone()),
    ];

    let metadata_dir = tempdir().unwrap();
    let destination = tempdir().unwrap();
    fs::create_dir_all(destination.path().join("targets")).unwrap();
    fs::write(destination.path().join("targets/b.bin"), b"bravo").unwrap();

    let mut engine = engine_with_cache(
        metadata_dir.path(),
        &cached,
        git_transport(vec![("c0", v1), ("c1", v2)]),
    )
    .unwrap();
    engine.refresh().unwrap();

    let descriptor = engine.target_info("targets/a.bin").unwrap();
    assert_eq!(descriptor.info.length, 5);
    let written = engine
        .download_target(&descriptor, destination.path())
        .unwrap();
    assert_eq!(fs::read(&written).unwrap(), b"alpha");

    // previous listed {a, b}, current lists {a}: b goes, a stays.
    let removed = engine.remove_obsolete_targets(destination.path()).unwrap();
    assert_eq!(removed, vec![destination.path().join("targets/b.bin")]);
    assert!(!destination.path().join("targets/b.bin").exists());
    assert!(destination.path().join("targets/a.bin").is_file());

    // A second pruning pass finds nothing left to do.
    assert!(engine
        .remove_obsolete_targets(destination.path())
        .unwrap()
        .is_empty());
}

#[test]
fn consistent_snapshot_rewrites_fetch_paths() {
    let mut repo = TestRepo::new();
    repo.consistent = true;
    let payload: &[u8] = b"consistent payload";
    let state = repo.state(1, &[("targets/app.bin", payload)], None);

    // The tree only carries the digest-prefixed target name.
    let digest = sha256_hex(payload);
    assert!(state.contains_key(&format!("targets/{digest}.app.bin")));
    assert!(!state.contains_key("targets/app.bin"));

    let metadata_dir = tempdir().unwrap();
    let destination = tempdir().unwrap();
    let mut engine = engine_with_cache(
        metadata_dir.path(),
        &[("root.json", repo.root_bytes(1))],
        git_transport(vec![("c0", state)]),
    )
    .unwrap();
    assert!(engine.consistent_snapshot());

    engine.refresh().unwrap();

    // The file is fetched under its digest name but lands at its logical
    // path.
    let descriptor = engine.target_info("targets/app.bin").unwrap();
    let written = engine
        .download_target(&descriptor, destination.path())
        .unwrap();
    assert_eq!(written, destination.path().join("targets/app.bin"));
    assert_eq!(fs::read(&written).unwrap(), payload);
}

#[test]
fn tampered_target_content_never_reaches_the_destination() {
    let repo = TestRepo::new();
    let mut state = repo.state(1, &[("targets/a.bin", b"alpha")], None);
    state.insert("targets/a.bin".to_string(), b"evil!".to_vec());

    let metadata_dir = tempdir().unwrap();
    let destination = tempdir().unwrap();
    let mut engine = engine_with_cache(
        metadata_dir.path(),
        &[("root.json", repo.root_bytes(1))],
        git_transport(vec![("c0", state)]),
    )
    .unwrap();
    engine.refresh().unwrap();

    let descriptor = engine.target_info("targets/a.bin").unwrap();
    let err = engine
        .download_target(&descriptor, destination.path())
        .unwrap_err();
    assert_matches!(&err, RatchetError::NoWorkingMirror { errors, .. } => {
        assert!(errors
            .values()
            .any(|cause| matches!(cause, RatchetError::BadHash { .. })));
    });
    assert!(!destination.path().join("targets/a.bin").exists());
}

#[test]
fn unknown_targets_are_reported_as_such() {
    let repo = TestRepo::new();
    let state = repo.state(1, &[("targets/a.bin", b"alpha")], None);

    let metadata_dir = tempdir().unwrap();
    let mut engine = engine_with_cache(
        metadata_dir.path(),
        &[("root.json", repo.root_bytes(1))],
        git_transport(vec![("c0", state)]),
    )
    .unwrap();
    engine.refresh().unwrap();

    assert_matches!(
        engine.target_info("targets/nope.bin"),
        Err(RatchetError::UnknownTarget(path)) if path == "targets/nope.bin"
    );
}
