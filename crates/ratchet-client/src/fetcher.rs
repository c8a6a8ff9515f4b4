//! Verified target download and obsolete-target pruning.
//!
//! Targets are never partially trusted: a download must match its
//! trusted length and every trusted hash exactly before anything touches
//! the destination directory. Bytes land in a scratch temporary file
//! that is only persisted into place after full verification, so the
//! destination never observes a partially-verified file.

use std::fs;
use std::path::{Component, Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use ratchet_core::hash::verify_hashes;
use ratchet_core::metadata::{consistent_path, naming_digest, TargetDescriptor};
use ratchet_core::verify;
use ratchet_core::{RatchetError, RatchetResult};

use crate::engine::TrustEngine;
use crate::transport::{download_verified, FileKind};

impl TrustEngine {
    /// Download one target into `destination_dir` and return its final
    /// path.
    ///
    /// With consistent snapshots active, the fetch path embeds the
    /// target's digest (`targets/app.bin` becomes
    /// `targets/<hash>.app.bin`) so the filename itself is
    /// content-addressed; the file is still written under its logical
    /// path. Intermediate directories are created as needed and a
    /// pre-existing directory is not an error.
    pub fn download_target(
        &mut self,
        descriptor: &TargetDescriptor,
        destination_dir: &Path,
    ) -> RatchetResult<PathBuf> {
        let relative = safe_relative_path(&descriptor.filepath)?;

        let fetch_path = if self.consistent_snapshot {
            match naming_digest(&descriptor.info.hashes) {
                Some(digest) => consistent_path(&descriptor.filepath, digest),
                None => descriptor.filepath.clone(),
            }
        } else {
            descriptor.filepath.clone()
        };

        let info = descriptor.info.clone();
        let outcome = download_verified(
            &mut self.transport,
            FileKind::Target,
            &fetch_path,
            info.length,
            |bytes| {
                verify::check_hard_length(bytes.len() as u64, info.length)?;
                verify_hashes(bytes, &info.hashes)
            },
        )?;

        let destination = destination_dir.join(relative);
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut scratch = NamedTempFile::new_in(destination_dir)?;
        std::io::Write::write_all(&mut scratch, &outcome.bytes)?;
        scratch
            .persist(&destination)
            .map_err(|e| RatchetError::Io(e.error))?;

        info!(
            target = %descriptor.filepath,
            bytes = outcome.bytes.len(),
            source = %outcome.source,
            "target downloaded and verified"
        );
        Ok(destination)
    }

    /// Delete files under `destination_dir` that a targets-family role
    /// listed in its `previous` metadata but no longer lists in
    /// `current`. A file already absent is logged, not an error. Returns
    /// the paths actually removed.
    pub fn remove_obsolete_targets(
        &self,
        destination_dir: &Path,
    ) -> RatchetResult<Vec<PathBuf>> {
        let mut removed = Vec::new();

        for (role, previous) in &self.previous_targets {
            let current_targets = self.targets.get(role);

            for filepath in previous.targets.keys() {
                let still_listed = current_targets
                    .is_some_and(|targets| targets.targets.contains_key(filepath));
                if still_listed {
                    continue;
                }

                let Ok(relative) = safe_relative_path(filepath) else {
                    warn!(target = %filepath, "obsolete target has an unsafe path, skipping");
                    continue;
                };
                let path = destination_dir.join(relative);
                if !path.is_file() {
                    debug!(target = %filepath, "obsolete target already absent");
                    continue;
                }

                fs::remove_file(&path)?;
                info!(role = %role, target = %filepath, "removed obsolete target");
                removed.push(path);
            }
        }
        Ok(removed)
    }
}

/// A target path must stay inside the destination directory: absolute
/// paths and `..` components are rejected.
fn safe_relative_path(filepath: &str) -> RatchetResult<PathBuf> {
    let trimmed = filepath.trim_start_matches('/');
    let path = Path::new(trimmed);
    for component in path.components() {
        match component {
            Component::Normal(_) => {}
            _ => {
                return Err(RatchetError::format(format!(
                    "unsafe target path: {filepath}"
                )))
            }
        }
    }
    if path.as_os_str().is_empty() {
        return Err(RatchetError::format("empty target path"));
    }
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn traversal_components_are_rejected() {
        assert!(safe_relative_path("targets/app.bin").is_ok());
        assert!(safe_relative_path("/targets/app.bin").is_ok());
        assert!(safe_relative_path("targets/../../etc/passwd").is_err());
        assert!(safe_relative_path("").is_err());
    }
}
