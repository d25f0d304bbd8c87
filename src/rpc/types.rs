//! Wire message shapes (spec.md §6), serialized as JSON over HTTP rather
//! than compiled from a `.proto` — the CLI's actual schema is out of scope
//! (SPEC_FULL.md §4.6), so these are hand-written `serde` structs mirroring
//! the field names and nesting the spec names directly.

use serde::{Deserialize, Serialize};

use crate::graph::{Graph, GraphEdge, GraphNode};
use crate::identity::{ModuleIdentity, Owner};
use crate::module_view::{DigestedFile, DigestType, RegistryCommit};

/// `ResourceRef`: variant of `{id: string(32-hex)}` or
/// `{name: {owner, module, child: {label_name | ref}}}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ResourceRef {
    Id { id: String },
    Name { name: ModuleRefName },
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModuleRefName {
    pub owner: String,
    pub module: String,
    #[serde(flatten)]
    pub child: RefChild,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RefChild {
    LabelName { label_name: String },
    Ref { r#ref: String },
}

impl RefChild {
    pub fn as_str(&self) -> &str {
        match self {
            RefChild::LabelName { label_name } => label_name,
            RefChild::Ref { r#ref } => r#ref,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OwnerRef {
    Id { id: String },
    Name { name: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct GetOwnersRequest {
    pub owner_refs: Vec<OwnerRef>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OwnerWire {
    pub id: String,
    pub name: String,
    pub kind: &'static str,
}

impl From<Owner> for OwnerWire {
    fn from(owner: Owner) -> Self {
        OwnerWire { id: owner.id, name: owner.name, kind: "organization" }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GetOwnersResponse {
    pub owners: Vec<OwnerWire>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GetModulesRequest {
    pub module_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModuleWire {
    pub id: String,
    pub name: String,
    pub owner_id: String,
}

impl From<ModuleIdentity> for ModuleWire {
    fn from(module: ModuleIdentity) -> Self {
        ModuleWire { id: module.id, name: module.name, owner_id: module.owner_id }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GetModulesResponse {
    pub modules: Vec<ModuleWire>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GetCommitsRequest {
    pub resource_refs: Vec<ResourceRef>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DigestWire {
    pub r#type: &'static str,
    /// Hex-encoded digest bytes — the wire protocol's raw `bytes` field,
    /// canonicalised as hex over this JSON transport (spec.md §6).
    pub value: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommitWire {
    pub id: String,
    pub owner_id: String,
    pub module_id: String,
    pub digest: DigestWire,
}

impl From<RegistryCommit> for CommitWire {
    fn from(commit: RegistryCommit) -> Self {
        let DigestType::B4 = commit.digest_type;
        CommitWire {
            id: commit.id,
            owner_id: commit.owner_id,
            module_id: commit.module_id,
            digest: DigestWire { r#type: "B4", value: hex::encode(commit.digest_value) },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GetCommitsResponse {
    pub commits: Vec<CommitWire>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DownloadRequest {
    pub resource_ref: ResourceRef,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileWire {
    pub path: String,
    /// Hex-encoded raw file bytes (see [`DigestWire::value`] for the same
    /// hex-over-JSON convention).
    pub content: String,
}

impl From<&DigestedFile> for FileWire {
    fn from(file: &DigestedFile) -> Self {
        FileWire { path: file.name.clone(), content: hex::encode(&file.content) }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DownloadContentWire {
    pub commit: CommitWire,
    pub files: Vec<FileWire>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub v1_buf_yaml_file: Option<FileWire>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub v1_buf_lock_file: Option<FileWire>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DownloadResponse {
    pub contents: Vec<DownloadContentWire>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GetGraphRequest {
    pub resource_refs: Vec<ResourceRef>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphNodeWire {
    pub commit_id: String,
    pub registry: String,
}

impl From<&GraphNode> for GraphNodeWire {
    fn from(node: &GraphNode) -> Self {
        GraphNodeWire { commit_id: node.commit_id.clone(), registry: node.registry_host.clone() }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphEdgeWire {
    pub from: GraphNodeWire,
    pub to: GraphNodeWire,
}

impl From<&GraphEdge> for GraphEdgeWire {
    fn from(edge: &GraphEdge) -> Self {
        GraphEdgeWire { from: (&edge.from).into(), to: (&edge.to).into() }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphWire {
    pub commits: Vec<GraphNodeWire>,
    pub edges: Vec<GraphEdgeWire>,
}

impl From<Graph> for GraphWire {
    fn from(graph: Graph) -> Self {
        GraphWire {
            commits: graph.nodes.iter().map(Into::into).collect(),
            edges: graph.edges.iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GetGraphResponse {
    pub graph: GraphWire,
}
