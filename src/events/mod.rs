//! Inbound service-hook notifications.
//!
//! The version-control server pushes JSON notifications when someone pushes
//! to a git repository or merges a pull request. This module normalizes those
//! payloads into a canonical event the correlator can match against job
//! configurations, independent of which backend produced them.

pub mod decoder;
pub mod types;

pub use decoder::{decode_service_hook, DecodeError};
pub use types::{CanonicalPushEvent, ServiceHookEvent};
