//! Workspace configuration drift detection.
//!
//! A job's file-mapping configuration can change between two builds that land
//! on the same execution node. Building with the stale mapping already present
//! on the node would silently check out the wrong tree, so the previous
//! workspace must be removed from the node before the new configuration is
//! used. This module detects the drift and drives the removal.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::cloak::CloakedPaths;
use crate::types::NodeName;

/// A job's file-mapping configuration on one execution node.
///
/// One logical instance exists per (job, node) pair. All fields except
/// `exists` participate in value equality; `exists` is the only field ever
/// mutated in place, flipped to false once the mapping has been removed from
/// the node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// URL of the version-control server the workspace maps from.
    pub server_url: String,

    /// Name of the workspace on the server.
    pub workspace_name: String,

    /// Server path mapped into the workspace, e.g. `$/Project`.
    pub project_path: String,

    /// Path prefixes excluded from the mapping.
    pub cloaked_paths: CloakedPaths,

    /// Local directory the mapping materializes into.
    pub local_path: String,

    /// Whether the workspace still exists on the node.
    pub exists: bool,
}

impl WorkspaceConfig {
    /// Whether `self` and `other` describe the same mapping.
    ///
    /// Plain fields compare as strings; `cloaked_paths` compares as a
    /// case-insensitive set, since prefix order has no effect on matching.
    /// The existence flag is bookkeeping, not configuration, and is ignored.
    pub fn same_mapping(&self, other: &WorkspaceConfig) -> bool {
        self.server_url == other.server_url
            && self.workspace_name == other.workspace_name
            && self.project_path == other.project_path
            && self.local_path == other.local_path
            && cloak_set(&self.cloaked_paths) == cloak_set(&other.cloaked_paths)
    }
}

fn cloak_set(cloaked: &CloakedPaths) -> std::collections::BTreeSet<String> {
    cloaked.iter().map(str::to_lowercase).collect()
}

/// True iff the configuration changed between consecutive builds.
pub fn has_drifted(previous: &WorkspaceConfig, current: &WorkspaceConfig) -> bool {
    !previous.same_mapping(current)
}

/// Errors while reconciling a drifted workspace.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The node refused or failed the removal.
    #[error("failed to remove workspace {workspace} on {node}: {reason}")]
    RemovalFailed {
        node: NodeName,
        workspace: String,
        reason: String,
    },

    /// The updated configuration could not be persisted.
    #[error("failed to persist workspace configuration: {0}")]
    PersistFailed(String),
}

/// Removes a workspace mapping from an execution node.
///
/// Returns whether a workspace was actually removed (false when the node had
/// none by that name).
pub trait WorkspaceRemover {
    fn remove(&self, node: &NodeName, workspace_name: &str) -> Result<bool, ReconcileError>;
}

/// Persists workspace configurations across builds.
pub trait WorkspaceConfigStore {
    fn save(&self, node: &NodeName, config: &WorkspaceConfig) -> Result<(), ReconcileError>;
}

/// Reconciles a drifted configuration before the upcoming build.
///
/// If the configuration drifted and the previous workspace still exists on
/// `node`, instructs the remover to delete it, flips the previous
/// configuration's existence flag, and persists it. The upcoming build then
/// materializes a fresh workspace from `current`.
///
/// Returns whether a removal was performed.
pub fn reconcile(
    node: &NodeName,
    previous: &mut WorkspaceConfig,
    current: &WorkspaceConfig,
    remover: &dyn WorkspaceRemover,
    store: &dyn WorkspaceConfigStore,
) -> Result<bool, ReconcileError> {
    if !has_drifted(previous, current) {
        debug!(node = %node, workspace = %previous.workspace_name, "workspace configuration unchanged");
        return Ok(false);
    }
    if !previous.exists {
        debug!(node = %node, workspace = %previous.workspace_name, "previous workspace already removed");
        return Ok(false);
    }

    info!(
        node = %node,
        workspace = %previous.workspace_name,
        "workspace configuration drifted; removing stale mapping"
    );
    remover.remove(node, &previous.workspace_name)?;
    previous.exists = false;
    store.save(node, previous)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn config(cloaked: &[&str]) -> WorkspaceConfig {
        WorkspaceConfig {
            server_url: "https://tfs.example:8080/tfs".to_string(),
            workspace_name: "Hudson-job-MASTER".to_string(),
            project_path: "$/Proj".to_string(),
            cloaked_paths: CloakedPaths::new(cloaked.iter().copied()),
            local_path: "workspace".to_string(),
            exists: true,
        }
    }

    struct FakeRemover {
        removed: RefCell<Vec<(NodeName, String)>>,
    }

    impl FakeRemover {
        fn new() -> Self {
            FakeRemover {
                removed: RefCell::new(Vec::new()),
            }
        }
    }

    impl WorkspaceRemover for FakeRemover {
        fn remove(&self, node: &NodeName, workspace_name: &str) -> Result<bool, ReconcileError> {
            self.removed
                .borrow_mut()
                .push((node.clone(), workspace_name.to_string()));
            Ok(true)
        }
    }

    struct FakeStore {
        saved: RefCell<Vec<WorkspaceConfig>>,
    }

    impl FakeStore {
        fn new() -> Self {
            FakeStore {
                saved: RefCell::new(Vec::new()),
            }
        }
    }

    impl WorkspaceConfigStore for FakeStore {
        fn save(&self, _node: &NodeName, config: &WorkspaceConfig) -> Result<(), ReconcileError> {
            self.saved.borrow_mut().push(config.clone());
            Ok(())
        }
    }

    // ─── has_drifted ───

    #[test]
    fn identical_configs_have_not_drifted() {
        assert!(!has_drifted(&config(&["$/Proj/docs"]), &config(&["$/Proj/docs"])));
    }

    #[test]
    fn cloaked_path_order_is_irrelevant() {
        let a = config(&["$/Proj/docs", "$/Proj/tools"]);
        let b = config(&["$/Proj/tools", "$/Proj/docs"]);
        assert!(!has_drifted(&a, &b));
    }

    #[test]
    fn cloaked_path_case_is_irrelevant() {
        let a = config(&["$/Proj/Docs"]);
        let b = config(&["$/proj/docs"]);
        assert!(!has_drifted(&a, &b));
    }

    #[test]
    fn added_cloaked_path_is_drift() {
        let a = config(&["$/Proj/docs"]);
        let b = config(&["$/Proj/docs", "$/Proj/tools"]);
        assert!(has_drifted(&a, &b));
    }

    #[test]
    fn changed_project_path_is_drift() {
        let a = config(&[]);
        let mut b = config(&[]);
        b.project_path = "$/Other".to_string();
        assert!(has_drifted(&a, &b));
    }

    #[test]
    fn changed_server_url_is_drift() {
        let a = config(&[]);
        let mut b = config(&[]);
        b.server_url = "https://other.example/tfs".to_string();
        assert!(has_drifted(&a, &b));
    }

    #[test]
    fn existence_flag_is_not_drift() {
        let a = config(&[]);
        let mut b = config(&[]);
        b.exists = false;
        assert!(!has_drifted(&a, &b));
    }

    // ─── reconcile ───

    #[test]
    fn drifted_existing_workspace_is_removed_and_persisted() {
        let node = NodeName::new("agent-3");
        let mut previous = config(&["$/Proj/docs"]);
        let current = config(&[]);
        let remover = FakeRemover::new();
        let store = FakeStore::new();

        let removed = reconcile(&node, &mut previous, &current, &remover, &store).unwrap();

        assert!(removed);
        assert!(!previous.exists);
        assert_eq!(
            remover.removed.borrow()[0],
            (node.clone(), "Hudson-job-MASTER".to_string())
        );
        let saved = store.saved.borrow();
        assert_eq!(saved.len(), 1);
        assert!(!saved[0].exists);
    }

    #[test]
    fn unchanged_config_is_left_alone() {
        let node = NodeName::new("agent-3");
        let mut previous = config(&[]);
        let current = config(&[]);
        let remover = FakeRemover::new();
        let store = FakeStore::new();

        let removed = reconcile(&node, &mut previous, &current, &remover, &store).unwrap();

        assert!(!removed);
        assert!(previous.exists);
        assert!(remover.removed.borrow().is_empty());
        assert!(store.saved.borrow().is_empty());
    }

    #[test]
    fn already_removed_workspace_is_not_removed_again() {
        let node = NodeName::new("agent-3");
        let mut previous = config(&["$/Proj/docs"]);
        previous.exists = false;
        let current = config(&[]);
        let remover = FakeRemover::new();
        let store = FakeStore::new();

        let removed = reconcile(&node, &mut previous, &current, &remover, &store).unwrap();

        assert!(!removed);
        assert!(remover.removed.borrow().is_empty());
    }

    #[test]
    fn removal_failure_propagates_without_flipping_flag() {
        struct FailingRemover;
        impl WorkspaceRemover for FailingRemover {
            fn remove(&self, node: &NodeName, workspace_name: &str) -> Result<bool, ReconcileError> {
                Err(ReconcileError::RemovalFailed {
                    node: node.clone(),
                    workspace: workspace_name.to_string(),
                    reason: "node offline".to_string(),
                })
            }
        }

        let node = NodeName::new("agent-3");
        let mut previous = config(&["$/Proj/docs"]);
        let current = config(&[]);
        let store = FakeStore::new();

        let result = reconcile(&node, &mut previous, &current, &FailingRemover, &store);

        assert!(result.is_err());
        assert!(previous.exists, "flag must not flip when removal failed");
        assert!(store.saved.borrow().is_empty());
    }
}
