//! Registry catalogue (spec.md §4.4).
//!
//! Static mapping of module key -> module view, built once at startup from
//! [`crate::config::RegistryConfig`]; the reverse index (registry commit id
//! -> module view) is populated eagerly as snapshots are produced and
//! lazily by scanning every module when an RPC presents an unseen commit id.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use sha2::{Digest, Sha256};

use crate::config::ModuleConfig;
use crate::context::RequestContext;
use crate::error::RegistryError;
use crate::module_view::{CommitIndex, ModuleKey, ModuleView};
use crate::remote::CredentialResolver;
use crate::repository::Repository;

fn module_key(owner: &str, name: &str) -> String {
    format!("{owner}/{name}")
}

/// Deterministic, collision-resistant directory name for a remote's on-disk
/// bare repository, so two modules sharing a remote share one [`Repository`]
/// and two different remotes never collide on disk.
fn repo_dir_name(remote_url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(remote_url.as_bytes());
    hex::encode(hasher.finalize())
}

pub struct Catalogue {
    modules_by_key: DashMap<String, Arc<ModuleView>>,
    modules_in_order: Vec<Arc<ModuleView>>,
    commit_index: CommitIndex,
}

impl Catalogue {
    pub fn builder(data_dir: impl Into<PathBuf>) -> CatalogueBuilder {
        CatalogueBuilder {
            data_dir: data_dir.into(),
            debounce: crate::repository::DEFAULT_DEBOUNCE,
            repositories_by_remote: HashMap::new(),
            modules_by_key: HashMap::new(),
            modules_in_order: Vec::new(),
            commit_index: Arc::new(DashMap::new()),
        }
    }

    /// `ModuleByName(ctx, owner, name) -> ModuleView | not-found`.
    pub fn module_by_name(&self, owner: &str, name: &str) -> Result<Arc<ModuleView>, RegistryError> {
        self.modules_by_key
            .get(&module_key(owner, name))
            .map(|entry| entry.clone())
            .ok_or_else(|| RegistryError::not_found(format!("module not found: {owner}/{name}")))
    }

    /// `ModuleByCommitId(ctx, id) -> ModuleView | not-found`: cache lookup,
    /// else iterate modules in registration order probing `HasCommitId`
    /// until one matches (spec.md §4.4, scenario S6).
    pub async fn module_by_commit_id(
        &self,
        ctx: &RequestContext,
        id: &str,
    ) -> Result<Arc<ModuleView>, RegistryError> {
        if let Some(key) = self.commit_index.get(id) {
            if let Some(module) = self.modules_by_key.get(&module_key(&key.owner, &key.name)) {
                return Ok(module.clone());
            }
        }

        for module in &self.modules_in_order {
            let (found, _full_hash) = module.has_commit_id(ctx, id).await;
            if found {
                self.remember_commit(id, module.owner(), module.name());
                return Ok(module.clone());
            }
        }

        Err(RegistryError::not_found(format!("commit not found: {id}")))
    }

    /// `RememberCommit(ctx, id, owner, name)`: idempotent insert into the
    /// reverse index.
    pub fn remember_commit(&self, id: &str, owner: &str, name: &str) {
        self.commit_index
            .entry(id.to_owned())
            .or_insert_with(|| ModuleKey { owner: owner.to_owned(), name: name.to_owned() });
    }

    pub fn modules(&self) -> &[Arc<ModuleView>] {
        &self.modules_in_order
    }
}

pub struct CatalogueBuilder {
    data_dir: PathBuf,
    debounce: Duration,
    repositories_by_remote: HashMap<String, Arc<Repository>>,
    modules_by_key: HashMap<String, Arc<ModuleView>>,
    modules_in_order: Vec<Arc<ModuleView>>,
    commit_index: CommitIndex,
}

impl CatalogueBuilder {
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    fn repository_for(&mut self, remote_url: &str, shallow: bool, resolver: &CredentialResolver) -> Arc<Repository> {
        if let Some(existing) = self.repositories_by_remote.get(remote_url) {
            return existing.clone();
        }
        let auth = resolver.resolve(remote_url);
        let path = self.data_dir.join(repo_dir_name(remote_url));
        let repo = Arc::new(
            Repository::new(path, remote_url.to_owned(), auth, shallow).with_debounce(self.debounce),
        );
        self.repositories_by_remote.insert(remote_url.to_owned(), repo.clone());
        repo
    }

    pub fn add_module(&mut self, cfg: &ModuleConfig, resolver: &CredentialResolver) -> Result<&mut Self, RegistryError> {
        let key = module_key(&cfg.owner, &cfg.name);
        if self.modules_by_key.contains_key(&key) {
            return Err(RegistryError::invalid_argument(format!("duplicate module {key}")));
        }

        let repository = self.repository_for(&cfg.remote_url, cfg.shallow, resolver);
        let view = Arc::new(ModuleView::new(
            cfg.owner.clone(),
            cfg.name.clone(),
            repository,
            cfg.subtree_root.clone(),
            &cfg.extra_filters,
            self.commit_index.clone(),
        )?);

        self.modules_by_key.insert(key, view.clone());
        self.modules_in_order.push(view);
        Ok(self)
    }

    pub fn build(self) -> Catalogue {
        Catalogue {
            modules_by_key: self.modules_by_key.into_iter().collect(),
            modules_in_order: self.modules_in_order,
            commit_index: self.commit_index,
        }
    }
}

/// Base directory a [`CatalogueBuilder`] creates per-remote bare repositories
/// under, creating it if absent.
pub fn ensure_data_dir(path: &Path) -> Result<(), RegistryError> {
    std::fs::create_dir_all(path).map_err(|e| RegistryError::internal(format!("failed to create data dir: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_dir_name_is_stable_and_distinct_per_remote() {
        let a = repo_dir_name("https://example.com/acme/base.git");
        let b = repo_dir_name("https://example.com/acme/base.git");
        let c = repo_dir_name("https://example.com/acme/other.git");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
