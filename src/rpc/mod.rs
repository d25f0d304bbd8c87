//! RPC façade (spec.md §4.6, §4.7): hosts the wire-level services over
//! axum/HTTP, translating requests into [`crate::catalogue::Catalogue`] and
//! [`crate::module_view::ModuleView`] calls.

pub mod auth;
pub mod handlers;
pub mod types;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

use crate::catalogue::Catalogue;
use crate::identity::IdentityStore;
use crate::rpc::auth::Principal;

/// Shared server state injected into every handler, matching design note §9
/// ("limit process-wide singletons to one — the server — and inject the
/// catalogue, credential resolver, and identity store explicitly through
/// its constructor").
#[derive(Clone)]
pub struct AppState {
    pub catalogue: Arc<Catalogue>,
    pub identity: Arc<dyn IdentityStore>,
    pub tokens: Arc<DashMap<String, Principal>>,
    pub own_host: String,
    /// Parent of every handler's [`crate::context::RequestContext`].
    /// Cancelling this token (driven by the server's graceful-shutdown
    /// future, see `src/cmds/main.rs`) cancels every outstanding request's
    /// context at once, aborting in-flight fetches and tree walks per
    /// spec.md §5.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        catalogue: Arc<Catalogue>,
        identity: Arc<dyn IdentityStore>,
        bearer_tokens: impl IntoIterator<Item = String>,
        own_host: impl Into<String>,
    ) -> Self {
        let tokens = Arc::new(DashMap::new());
        for token in bearer_tokens {
            tokens.insert(token.clone(), Principal { token });
        }
        Self { catalogue, identity, tokens, own_host: own_host.into(), shutdown: CancellationToken::new() }
    }
}

/// Builds the full router: the five core services behind the bearer-token
/// interceptor, plus the two plaintext health probes (spec.md §6) which are
/// deliberately left outside the auth layer.
pub fn router(state: AppState) -> Router {
    let authenticated = Router::new()
        .route("/buf.registry.owner.v1.OwnerService/GetOwners", post(handlers::get_owners))
        .route("/buf.registry.module.v1.ModuleService/GetModules", post(handlers::get_modules))
        .route(
            "/buf.registry.module.v1.ModuleService/CreateModules",
            post(handlers::unimplemented),
        )
        .route(
            "/buf.registry.module.v1.ModuleService/UpdateModules",
            post(handlers::unimplemented),
        )
        .route(
            "/buf.registry.module.v1.ModuleService/DeleteModules",
            post(handlers::unimplemented),
        )
        .route("/buf.registry.module.v1.CommitService/GetCommits", post(handlers::get_commits))
        .route("/buf.registry.module.v1.DownloadService/Download", post(handlers::download))
        .route("/buf.registry.module.v1.GraphService/GetGraph", post(handlers::get_graph))
        .route(
            "/buf.alpha.registry.v1alpha1.RepositoryService/GetRepository",
            post(handlers::unimplemented),
        )
        .route(
            "/buf.alpha.registry.v1alpha1.ResolveService/GetModulePins",
            post(handlers::unimplemented),
        )
        .fallback(handlers::unimplemented)
        .route_layer(axum::middleware::from_fn_with_state(state.clone(), auth::require_bearer_token))
        .with_state(state);

    Router::new()
        .route("/readyz", get(handlers::readyz))
        .route("/livez", get(handlers::livez))
        .merge(authenticated)
}
