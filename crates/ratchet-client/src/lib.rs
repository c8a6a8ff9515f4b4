//! ratchet-client
//!
//! The stateful half of RATCHET: a client-side trust engine for consuming
//! a software/content repository whose transport (mirrors, CDNs, git
//! hosting) is untrusted.
//!
//! - `engine` — the sequential refresh state machine
//!   (root → timestamp → snapshot → targets → delegated targets)
//! - `transport` — the closed set of transport handlers: networked
//!   mirrors and a local git commit history
//! - `fetcher` — verified target download and obsolete-target pruning
//! - `git` — the minimal read-only git query surface the git transport
//!   needs; actual plumbing is supplied by the embedder
//! - `config` — mirror and refresh-limit configuration
//!
//! Refresh is single-threaded and strictly sequential per repository
//! instance. Refreshing the same repository from two threads is
//! unsupported and must be serialized by the caller; independent
//! repository instances may run concurrently.
//!
//! This crate emits `tracing` events but never installs a subscriber;
//! logging configuration belongs to the embedder.

pub mod config;
pub mod engine;
pub mod fetcher;
pub mod git;
pub mod transport;

pub use crate::config::{Mirror, MirrorSet, RefreshLimits};
pub use crate::engine::TrustEngine;
pub use crate::transport::{FileKind, Source, Transport};
pub use ratchet_core::{RatchetError, RatchetResult};
