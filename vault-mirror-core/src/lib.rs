#![doc = "vault-mirror-core: change detection and batched conversion for vault-mirror."]

//! Mirrors files changed in a git repository into a Markdown vault.
//!
//! The library holds the whole pipeline: config, collaborator traits and their
//! real implementations (git, extractors, lock probe), batching, path mapping,
//! the coordinator with its run gate, and commit watching. The `vault-mirror`
//! binary only parses arguments and prints reports.
//!
//! # Usage
//! Build a [`synchronise::PipelineCoordinator`] from a [`config::SharedConfig`] and feed it
//! [`synchronise::Trigger`]s, either directly or through [`watch::run_trigger_loop`].

pub mod availability;
pub mod batch;
pub mod config;
pub mod contract;
pub mod convert;
pub mod detect;
pub mod extract;
pub mod filter;
pub mod synchronise;
pub mod vault_path;
pub mod watch;
pub mod writer;
