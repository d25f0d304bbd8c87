//! RPC façade handlers (spec.md §4.6): translates the wire-level requests
//! into catalogue/module-view calls and formats the responses.

use axum::extract::State;
use axum::Json;

use crate::context::RequestContext;
use crate::error::RegistryError;
use crate::lockfile::LOCK_FILE_NAME;
use crate::rpc::types::*;
use crate::rpc::AppState;

/// **Owners.GetOwners**: accepts either an owner id or an owner name.
pub async fn get_owners(
    State(state): State<AppState>,
    Json(req): Json<GetOwnersRequest>,
) -> Result<Json<GetOwnersResponse>, RegistryError> {
    let mut owners = Vec::with_capacity(req.owner_refs.len());
    for owner_ref in req.owner_refs {
        let owner = match owner_ref {
            OwnerRef::Id { id } => state.identity.get_owner(&id).await?,
            OwnerRef::Name { name } => state.identity.get_owner_by_name(&name).await?,
        };
        let owner = owner.ok_or_else(|| RegistryError::not_found("owner not found"))?;
        owners.push(owner.into());
    }
    Ok(Json(GetOwnersResponse { owners }))
}

/// **Modules.GetModules**: accepts module ids; mutating RPCs are rejected
/// as `unimplemented` at the router level (spec.md §4.6).
pub async fn get_modules(
    State(state): State<AppState>,
    Json(req): Json<GetModulesRequest>,
) -> Result<Json<GetModulesResponse>, RegistryError> {
    let mut modules = Vec::with_capacity(req.module_ids.len());
    for id in req.module_ids {
        let module = state
            .identity
            .get_module(&id)
            .await?
            .ok_or_else(|| RegistryError::not_found("module not found"))?;
        modules.push(module.into());
    }
    Ok(Json(GetModulesResponse { modules }))
}

/// **Commits.GetCommits**: accepts names with a `LabelName` or `Ref` child;
/// `ResourceRef::Id` is explicitly rejected (spec.md §4.6).
pub async fn get_commits(
    State(state): State<AppState>,
    Json(req): Json<GetCommitsRequest>,
) -> Result<Json<GetCommitsResponse>, RegistryError> {
    let ctx = RequestContext::from_parent(&state.shutdown);
    let mut commits = Vec::with_capacity(req.resource_refs.len());
    for resource_ref in req.resource_refs {
        let name = match resource_ref {
            ResourceRef::Id { .. } => {
                return Err(RegistryError::invalid_argument(
                    "Commits.GetCommits requires a Name reference, not an Id",
                ))
            }
            ResourceRef::Name { name } => name,
        };
        let module = state.catalogue.module_by_name(&name.owner, &name.module)?;
        let commit = module.commit_by_ref(&ctx, name.child.as_str()).await?;
        commits.push(commit.into());
    }
    Ok(Json(GetCommitsResponse { commits }))
}

/// **Download.Download**: accepts `ResourceRef::Id` only.
pub async fn download(
    State(state): State<AppState>,
    Json(req): Json<DownloadRequest>,
) -> Result<Json<DownloadResponse>, RegistryError> {
    let ctx = RequestContext::from_parent(&state.shutdown);
    let id = match req.resource_ref {
        ResourceRef::Id { id } => id,
        ResourceRef::Name { .. } => {
            return Err(RegistryError::invalid_argument("Download.Download requires an Id reference, not a Name"))
        }
    };

    let module = state.catalogue.module_by_commit_id(&ctx, &id).await?;
    let commit = module.commit_by_id(&ctx, &id).await?;
    let snapshot = module.files_and_manifest_by_commit(&ctx, &id).await?;

    let files: Vec<FileWire> = snapshot.files.iter().map(Into::into).collect();
    let v1_buf_yaml_file = snapshot.file_named("buf.yaml").map(Into::into);
    let v1_buf_lock_file = snapshot.file_named(LOCK_FILE_NAME).map(Into::into);

    let content = DownloadContentWire { commit: commit.into(), files, v1_buf_yaml_file, v1_buf_lock_file };
    Ok(Json(DownloadResponse { contents: vec![content] }))
}

/// **Graph.GetGraph**: accepts `ResourceRef::Id` values only.
pub async fn get_graph(
    State(state): State<AppState>,
    Json(req): Json<GetGraphRequest>,
) -> Result<Json<GetGraphResponse>, RegistryError> {
    let ctx = RequestContext::from_parent(&state.shutdown);
    let mut ids = Vec::with_capacity(req.resource_refs.len());
    for resource_ref in req.resource_refs {
        match resource_ref {
            ResourceRef::Id { id } => ids.push(id),
            ResourceRef::Name { .. } => {
                return Err(RegistryError::invalid_argument("Graph.GetGraph requires Id references, not Names"))
            }
        }
    }

    let graph = crate::graph::resolve_graph(&ctx, &state.catalogue, &state.own_host, &ids).await?;
    Ok(Json(GetGraphResponse { graph: graph.into() }))
}

/// Legacy code-generation/plugin-sandbox and any write RPC: not part of the
/// core (spec.md §9 design note 4); always `unimplemented`.
pub async fn unimplemented() -> RegistryError {
    RegistryError::unimplemented("this RPC is not implemented by the core registry")
}

pub async fn readyz() -> &'static str {
    "ok"
}

pub async fn livez() -> &'static str {
    "ok"
}
