//! Synthetic owner/module identifiers and the abstract store that would back
//! them in a persisted deployment.
//!
//! Derivation is deterministic and must match across processes:
//! `owner_id = sha256_hex(owner_name)[:32]`,
//! `module_id = sha256_hex(owner_id + "/" + name)[:32]`.

use async_trait::async_trait;
use dashmap::DashMap;
use sha2::{Digest, Sha256};

use crate::error::RegistryError;

const TRUNCATE_LEN: usize = 32;

fn sha256_hex_truncated(data: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data.as_bytes());
    let full = hex::encode(hasher.finalize());
    full[..TRUNCATE_LEN].to_string()
}

pub fn owner_id(owner_name: &str) -> String {
    sha256_hex_truncated(owner_name)
}

pub fn module_id(owner_id: &str, module_name: &str) -> String {
    sha256_hex_truncated(&format!("{owner_id}/{module_name}"))
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Owner {
    pub id: String,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModuleIdentity {
    pub id: String,
    pub owner_id: String,
    pub name: String,
}

/// Abstract persisted owner/module store. An in-memory backend suffices for
/// test and for a single-process deployment; a clustered deployment would
/// back this with a real database instead.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn get_owner_by_name(&self, name: &str) -> Result<Option<Owner>, RegistryError>;
    async fn get_owner(&self, id: &str) -> Result<Option<Owner>, RegistryError>;
    async fn get_module_by_name(
        &self,
        owner_id: &str,
        name: &str,
    ) -> Result<Option<ModuleIdentity>, RegistryError>;
    async fn get_module(&self, id: &str) -> Result<Option<ModuleIdentity>, RegistryError>;
    async fn list_modules(&self, owner_id: &str) -> Result<Vec<ModuleIdentity>, RegistryError>;
}

/// Default in-memory backend. Owners and modules are registered once at
/// catalogue construction time and never removed.
#[derive(Default)]
pub struct InMemoryIdentityStore {
    owners_by_name: DashMap<String, Owner>,
    owners_by_id: DashMap<String, Owner>,
    modules_by_key: DashMap<(String, String), ModuleIdentity>,
    modules_by_id: DashMap<String, ModuleIdentity>,
    modules_by_owner: DashMap<String, Vec<ModuleIdentity>>,
}

impl InMemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_owner(&self, name: &str) -> Owner {
        if let Some(existing) = self.owners_by_name.get(name) {
            return existing.clone();
        }
        let owner = Owner { id: owner_id(name), name: name.to_owned() };
        self.owners_by_name.insert(name.to_owned(), owner.clone());
        self.owners_by_id.insert(owner.id.clone(), owner.clone());
        owner
    }

    pub fn register_module(&self, owner: &Owner, name: &str) -> ModuleIdentity {
        let key = (owner.id.clone(), name.to_owned());
        if let Some(existing) = self.modules_by_key.get(&key) {
            return existing.clone();
        }
        let module = ModuleIdentity {
            id: module_id(&owner.id, name),
            owner_id: owner.id.clone(),
            name: name.to_owned(),
        };
        self.modules_by_key.insert(key, module.clone());
        self.modules_by_id.insert(module.id.clone(), module.clone());
        self.modules_by_owner
            .entry(owner.id.clone())
            .or_default()
            .push(module.clone());
        module
    }

    /// Registers every module a [`crate::catalogue::Catalogue`] was built
    /// with, so `Owners.GetOwners`/`Modules.GetModules` can resolve them by
    /// id or name without a separate config pass.
    pub fn register_from_catalogue(&self, catalogue: &crate::catalogue::Catalogue) {
        for module in catalogue.modules() {
            let owner = self.register_owner(module.owner());
            self.register_module(&owner, module.name());
        }
    }
}

#[async_trait]
impl IdentityStore for InMemoryIdentityStore {
    async fn get_owner_by_name(&self, name: &str) -> Result<Option<Owner>, RegistryError> {
        Ok(self.owners_by_name.get(name).map(|o| o.clone()))
    }

    async fn get_owner(&self, id: &str) -> Result<Option<Owner>, RegistryError> {
        Ok(self.owners_by_id.get(id).map(|o| o.clone()))
    }

    async fn get_module_by_name(
        &self,
        owner_id: &str,
        name: &str,
    ) -> Result<Option<ModuleIdentity>, RegistryError> {
        let key = (owner_id.to_owned(), name.to_owned());
        Ok(self.modules_by_key.get(&key).map(|m| m.clone()))
    }

    async fn get_module(&self, id: &str) -> Result<Option<ModuleIdentity>, RegistryError> {
        Ok(self.modules_by_id.get(id).map(|m| m.clone()))
    }

    async fn list_modules(&self, owner_id: &str) -> Result<Vec<ModuleIdentity>, RegistryError> {
        Ok(self
            .modules_by_owner
            .get(owner_id)
            .map(|v| v.clone())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_deterministic_and_truncated() {
        let a = owner_id("acme");
        let b = owner_id("acme");
        assert_eq!(a, b);
        assert_eq!(a.len(), TRUNCATE_LEN);

        let m1 = module_id(&a, "widgets");
        let m2 = module_id(&a, "widgets");
        assert_eq!(m1, m2);
        assert_eq!(m1.len(), TRUNCATE_LEN);
    }

    #[test]
    fn different_names_yield_different_ids() {
        assert_ne!(owner_id("acme"), owner_id("acme2"));
        let a = owner_id("acme");
        assert_ne!(module_id(&a, "widgets"), module_id(&a, "gadgets"));
    }

    #[tokio::test]
    async fn in_memory_store_round_trips() {
        let store = InMemoryIdentityStore::new();
        let owner = store.register_owner("e2e");
        let module = store.register_module(&owner, "basic");

        assert_eq!(store.get_owner_by_name("e2e").await.unwrap(), Some(owner.clone()));
        assert_eq!(store.get_owner(&owner.id).await.unwrap(), Some(owner.clone()));
        assert_eq!(
            store.get_module_by_name(&owner.id, "basic").await.unwrap(),
            Some(module.clone())
        );
        assert_eq!(store.list_modules(&owner.id).await.unwrap(), vec![module]);
    }
}
