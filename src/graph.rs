//! Dependency graph resolver (spec.md §4.5).
//!
//! Walks `buf.lock` entries starting from a set of requested commits,
//! producing a deduplicated node/edge set. Implemented as an explicit
//! work-list instead of naive recursion so a pathological lock-file chain
//! can't blow the stack (SPEC_FULL.md §4.5 — a hardening, not a semantic
//! change: the spec's cycle-safety argument only requires dedup-by-key, not
//! any particular traversal strategy).

use std::collections::HashSet;

use crate::catalogue::Catalogue;
use crate::context::RequestContext;
use crate::error::RegistryError;
use crate::lockfile::LockEntry;
use crate::module_view::{DigestType, RegistryCommit};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct GraphNode {
    pub commit_id: String,
    pub registry_host: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GraphEdge {
    pub from: GraphNode,
    pub to: GraphNode,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Graph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

/// A node queued for lock-file expansion: local nodes (`registry_host ==
/// own_host`) carry the `RegistryCommit` already resolved against the
/// catalogue so we don't re-fetch it; foreign nodes are leaves and are never
/// queued.
struct QueueEntry {
    node: GraphNode,
    commit: RegistryCommit,
}

fn foreign_commit(entry: &LockEntry) -> RegistryCommit {
    RegistryCommit {
        id: entry.commit.clone(),
        owner_id: String::new(),
        module_id: String::new(),
        digest_type: DigestType::B4,
        digest_value: hex::decode(entry.digest_hex()).unwrap_or_default(),
    }
}

/// Resolves the transitive dependency graph reachable from `requested_ids`.
/// `own_host` is this registry's own hostname, used to decide whether a
/// lock entry names a module this process can resolve content for.
pub async fn resolve_graph(
    ctx: &RequestContext,
    catalogue: &Catalogue,
    own_host: &str,
    requested_ids: &[String],
) -> Result<Graph, RegistryError> {
    let mut graph = Graph::default();
    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut queue: Vec<QueueEntry> = Vec::new();

    for id in requested_ids {
        let module = catalogue.module_by_commit_id(ctx, id).await?;
        let commit = module.commit_by_id(ctx, id).await?;
        let node = GraphNode { commit_id: commit.id.clone(), registry_host: own_host.to_owned() };
        if seen.insert((node.registry_host.clone(), node.commit_id.clone())) {
            graph.nodes.push(node.clone());
        }
        queue.push(QueueEntry { node, commit });
    }

    while let Some(QueueEntry { node: from_node, commit }) = queue.pop() {
        let module = catalogue.module_by_commit_id(ctx, &commit.id).await?;
        let lock = match module.buf_lock_by_commit_id(ctx, &commit.id).await {
            Ok(lock) => lock,
            Err(RegistryError::NotFound(_)) => continue,
            Err(other) => return Err(other),
        };

        for dep in &lock.deps {
            let dep_node = GraphNode { commit_id: dep.commit.clone(), registry_host: dep.remote.clone() };
            let is_local = dep.remote == own_host;
            let first_seen = seen.insert((dep_node.registry_host.clone(), dep_node.commit_id.clone()));

            let dep_commit = if is_local {
                let dep_module = catalogue.module_by_commit_id(ctx, &dep.commit).await?;
                dep_module.commit_by_id(ctx, &dep.commit).await?
            } else {
                foreign_commit(dep)
            };

            if first_seen {
                graph.nodes.push(dep_node.clone());
            }
            graph.edges.push(GraphEdge { from: from_node.clone(), to: dep_node.clone() });

            if is_local && first_seen {
                queue.push(QueueEntry { node: dep_node, commit: dep_commit });
            }
        }
    }

    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lockfile::LockEntry;

    #[test]
    fn foreign_commit_strips_shake_prefix_and_decodes_hex() {
        let entry = LockEntry {
            remote: "other.example.com".to_owned(),
            owner: "acme".to_owned(),
            repository: "base".to_owned(),
            commit: "0123456789abcdef0123456789abcdef".to_owned(),
            digest: "shake256:deadbeef".to_owned(),
        };
        let commit = foreign_commit(&entry);
        assert_eq!(commit.id, entry.commit);
        assert_eq!(commit.digest_value, vec![0xde, 0xad, 0xbe, 0xef]);
    }
}
