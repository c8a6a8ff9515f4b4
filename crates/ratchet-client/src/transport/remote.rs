//! Networked mirror transport.
//!
//! Sources are mirror URLs built from each configured mirror's
//! `url_prefix`/`metadata_path`/`targets_path`; a fetch is a blocking
//! HTTP GET that reads at most one byte past the caller's cap, so an
//! oversized malicious response costs bounded memory no matter what the
//! server claims.

use std::io::Read;

use tracing::debug;

use ratchet_core::verify::check_soft_length;
use ratchet_core::{RatchetError, RatchetResult};

use crate::config::MirrorSet;
use crate::transport::{FileKind, Source};

#[derive(Debug)]
pub struct RemoteMirrorHandler {
    mirrors: MirrorSet,
    client: reqwest::blocking::Client,
}

impl RemoteMirrorHandler {
    pub fn new(mirrors: MirrorSet) -> RatchetResult<Self> {
        if mirrors.is_empty() {
            return Err(RatchetError::repository("no mirrors configured"));
        }
        mirrors.validate()?;
        let client = reqwest::blocking::Client::builder()
            .build()
            .map_err(|e| RatchetError::network(format!("http client: {e}")))?;
        Ok(Self { mirrors, client })
    }

    pub(crate) fn source_list(&self, kind: FileKind, path: &str) -> Vec<Source> {
        let mut sources = Vec::new();
        for (name, mirror) in self.mirrors.iter() {
            let url = match kind {
                FileKind::Metadata => join_url(&mirror.url_prefix, &mirror.metadata_path, path),
                FileKind::Target => {
                    if !mirror.confines(path) {
                        debug!(mirror = %name, path, "target outside confined dirs, skipping");
                        continue;
                    }
                    join_url(&mirror.url_prefix, &mirror.targets_path, path)
                }
            };
            sources.push(Source::Url(url));
        }
        sources
    }

    pub(crate) fn fetch(&self, url: &str, name: &str, cap: u64) -> RatchetResult<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| RatchetError::network(format!("GET {url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RatchetError::network(format!("GET {url}: status {status}")));
        }

        bounded_read(response, name, cap)
    }
}

/// Read at most `cap` bytes from `reader`; one byte more means the
/// response exceeds the trusted bound and is rejected outright.
fn bounded_read(reader: impl Read, name: &str, cap: u64) -> RatchetResult<Vec<u8>> {
    let mut bytes = Vec::new();
    reader
        .take(cap.saturating_add(1))
        .read_to_end(&mut bytes)
        .map_err(|e| RatchetError::network(format!("reading {name}: {e}")))?;

    check_soft_length(name, bytes.len() as u64, cap)?;
    Ok(bytes)
}

fn join_url(prefix: &str, middle: &str, path: &str) -> String {
    let mut url = prefix.trim_end_matches('/').to_string();
    for part in [middle, path] {
        let part = part.trim_matches('/');
        if !part.is_empty() {
            url.push('/');
            url.push_str(part);
        }
    }
    url
}
