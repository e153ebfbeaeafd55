//! Build-trigger bridge between a version-control server and a CI host.
//!
//! This library provides change detection for legacy changeset-based version
//! control (cloaked-path filtering and polling comparison), workspace mapping
//! reconciliation, service-hook event decoding for git pushes and pull-request
//! merges, and the correlation engine that turns decoded events into per-job
//! trigger decisions.

pub mod cloak;
pub mod correlate;
pub mod events;
pub mod polling;
pub mod server;
pub mod types;
pub mod workspace;
