//! Module view (spec.md §3 "Module view", §4.3).
//!
//! Binds one registry module `(owner, name)` to a [`Repository`], a subtree
//! root, and a filter set; produces the canonical file list and manifest for
//! a commit and caches the result by ref string and by registry commit id.

use std::sync::Arc;

use dashmap::DashMap;
use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::context::RequestContext;
use crate::digest::{canonical_manifest_text, content_digest_hex, manifest_digest, ManifestEntry, Shake256Digest};
use crate::error::RegistryError;
use crate::identity;
use crate::lockfile::{self, LockFile};
use crate::repository::{File, Repository};

/// Glob patterns always installed on every module view, regardless of any
/// additional filters the module was configured with.
const DEFAULT_FILTERS: &[&str] = &["**/*.proto", "buf.yaml", "buf.lock"];

/// `(owner_id, name)` used as the reverse-index key shared between a
/// [`ModuleView`] and the owning catalogue. Kept non-owning — see design
/// note §9 "cyclic ownership": the module view never holds a strong
/// reference back to the catalogue, only to this shared map.
pub type CommitIndex = Arc<DashMap<String, ModuleKey>>;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ModuleKey {
    pub owner: String,
    pub name: String,
}

/// The wire-level digest type tag. The CLI's protocol names exactly one
/// variant (`B4`, SHAKE-256); kept as an enum of one for documentation value
/// and to give the RPC layer a stable thing to serialize.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub enum DigestType {
    B4,
}

/// The externally visible commit object (spec.md §3 "RegistryCommit").
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegistryCommit {
    pub id: String,
    pub owner_id: String,
    pub module_id: String,
    pub digest_type: DigestType,
    pub digest_value: Vec<u8>,
}

/// One file read out of a snapshot, paired with its content digest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DigestedFile {
    pub name: String,
    pub blob_sha: String,
    pub content: Vec<u8>,
    pub content_digest_hex: String,
}

/// `{git commit hash, canonical text, manifest_digest}` (spec.md §3).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Manifest {
    pub git_commit_hash: String,
    pub canonical_text: String,
    pub manifest_digest: Shake256Digest,
}

/// The result of reading one git commit through a module view. Immutable
/// once produced; cheap to share via `Arc` across cache slots keyed by
/// different ref strings that happen to resolve to the same commit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Snapshot {
    pub files: Vec<DigestedFile>,
    pub manifest: Manifest,
}

impl Snapshot {
    pub fn buf_lock_contents(&self) -> Option<&[u8]> {
        self.files
            .iter()
            .find(|f| f.name == lockfile::LOCK_FILE_NAME)
            .map(|f| f.content.as_slice())
    }

    pub fn file_named(&self, name: &str) -> Option<&DigestedFile> {
        self.files.iter().find(|f| f.name == name)
    }
}

fn build_filter_set(extra: &[String]) -> Result<GlobSet, RegistryError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in DEFAULT_FILTERS.iter().copied().chain(extra.iter().map(String::as_str)) {
        let glob = Glob::new(pattern)
            .map_err(|e| RegistryError::invalid_argument(format!("invalid filter glob '{pattern}': {e}")))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| RegistryError::internal(format!("failed to compile filter set: {e}")))
}

/// The binding of one registry module name to a repository, subtree root,
/// and filter set (spec.md §3 "Module view").
pub struct ModuleView {
    owner: String,
    name: String,
    owner_id: String,
    module_id: String,
    repository: Arc<Repository>,
    subtree_root: String,
    filters: GlobSet,
    ref_cache: DashMap<String, String>,
    id_cache: DashMap<String, Arc<Snapshot>>,
    content_digest_cache: DashMap<String, String>,
    commit_index: CommitIndex,
}

impl ModuleView {
    pub fn new(
        owner: impl Into<String>,
        name: impl Into<String>,
        repository: Arc<Repository>,
        subtree_root: impl Into<String>,
        extra_filters: &[String],
        commit_index: CommitIndex,
    ) -> Result<Self, RegistryError> {
        let owner = owner.into();
        let name = name.into();
        if owner.is_empty() || name.is_empty() {
            return Err(RegistryError::invalid_argument("module owner and name must be non-empty"));
        }
        let owner_id = identity::owner_id(&owner);
        let module_id = identity::module_id(&owner_id, &name);
        Ok(Self {
            owner,
            name,
            owner_id,
            module_id,
            repository,
            subtree_root: subtree_root.into(),
            filters: build_filter_set(extra_filters)?,
            ref_cache: DashMap::new(),
            id_cache: DashMap::new(),
            content_digest_cache: DashMap::new(),
            commit_index,
        })
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn module_id(&self) -> &str {
        &self.module_id
    }

    fn remember(&self, commit_id: &str) {
        self.commit_index
            .entry(commit_id.to_owned())
            .or_insert_with(|| ModuleKey { owner: self.owner.clone(), name: self.name.clone() });
    }

    fn digest_content(&self, file: &File) -> String {
        if let Some(cached) = self.content_digest_cache.get(&file.blob_sha) {
            return cached.clone();
        }
        let digest = content_digest_hex(&file.content);
        self.content_digest_cache.insert(file.blob_sha.clone(), digest.clone());
        digest
    }

    fn build_snapshot(&self, git_commit_hash: String, files: Vec<File>) -> Snapshot {
        let digested: Vec<DigestedFile> = files
            .into_iter()
            .map(|f| {
                let content_digest_hex = self.digest_content(&f);
                DigestedFile { name: f.name, blob_sha: f.blob_sha, content: f.content, content_digest_hex }
            })
            .collect();

        let canonical_text = canonical_manifest_text(
            digested.iter().map(|f| ManifestEntry { name: &f.name, content_digest_hex: &f.content_digest_hex }),
        );
        let digest = manifest_digest(&canonical_text);
        Snapshot { files: digested, manifest: Manifest { git_commit_hash, canonical_text, manifest_digest: digest } }
    }

    fn registry_commit_for(&self, snapshot: &Snapshot) -> RegistryCommit {
        let id = registry_commit_id(&snapshot.manifest.git_commit_hash);
        RegistryCommit {
            id,
            owner_id: self.owner_id.clone(),
            module_id: self.module_id.clone(),
            digest_type: DigestType::B4,
            digest_value: snapshot.manifest.manifest_digest.as_bytes().to_vec(),
        }
    }

    /// `CommitByRef(ref)`: consult the ref cache, else compute via
    /// `FilesAtRef`, populate both caches, return.
    pub async fn commit_by_ref(
        &self,
        ctx: &RequestContext,
        refname: &str,
    ) -> Result<RegistryCommit, RegistryError> {
        if let Some(id) = self.ref_cache.get(refname) {
            if let Some(snapshot) = self.id_cache.get(id.as_str()) {
                return Ok(self.registry_commit_for(&snapshot));
            }
        }

        let (git_commit_hash, files) =
            self.repository.files_at_ref(ctx, refname, &self.subtree_root, &self.filters).await?;
        let snapshot = Arc::new(self.build_snapshot(git_commit_hash, files));
        let commit = self.registry_commit_for(&snapshot);

        self.ref_cache.insert(refname.to_owned(), commit.id.clone());
        self.id_cache.insert(commit.id.clone(), snapshot);
        self.remember(&commit.id);
        Ok(commit)
    }

    /// `CommitById(registry_commit_id)`: consult the id cache, else compute
    /// via `FilesAtCommit`, populate both caches, return.
    pub async fn commit_by_id(
        &self,
        ctx: &RequestContext,
        id: &str,
    ) -> Result<RegistryCommit, RegistryError> {
        if let Some(snapshot) = self.id_cache.get(id) {
            return Ok(self.registry_commit_for(&snapshot));
        }

        let (git_commit_hash, files) =
            self.repository.files_at_commit(ctx, id, &self.subtree_root, &self.filters).await?;
        let snapshot = Arc::new(self.build_snapshot(git_commit_hash, files));
        let commit = self.registry_commit_for(&snapshot);

        self.id_cache.insert(commit.id.clone(), snapshot);
        self.remember(&commit.id);
        Ok(commit)
    }

    pub async fn files_and_manifest_by_ref(
        &self,
        ctx: &RequestContext,
        refname: &str,
    ) -> Result<Arc<Snapshot>, RegistryError> {
        let commit = self.commit_by_ref(ctx, refname).await?;
        self.id_cache
            .get(&commit.id)
            .map(|entry| entry.clone())
            .ok_or_else(|| RegistryError::internal("snapshot vanished from cache after insert"))
    }

    pub async fn files_and_manifest_by_commit(
        &self,
        ctx: &RequestContext,
        id: &str,
    ) -> Result<Arc<Snapshot>, RegistryError> {
        self.commit_by_id(ctx, id).await?;
        self.id_cache
            .get(id)
            .map(|entry| entry.clone())
            .ok_or_else(|| RegistryError::internal("snapshot vanished from cache after insert"))
    }

    /// `BufLockByCommitId(ctx, id) -> LockFile | not-found`.
    ///
    /// Per spec.md §9 open question 3, the historical source had a bug where
    /// this returned not-found even after a successful parse; that bug is
    /// not reproduced here — a successful parse is always returned.
    pub async fn buf_lock_by_commit_id(
        &self,
        ctx: &RequestContext,
        id: &str,
    ) -> Result<LockFile, RegistryError> {
        let snapshot = self.files_and_manifest_by_commit(ctx, id).await?;
        let contents = snapshot
            .buf_lock_contents()
            .ok_or_else(|| RegistryError::not_found(format!("no buf.lock in commit {id}")))?;
        let text = std::str::from_utf8(contents)
            .map_err(|e| RegistryError::internal(format!("buf.lock is not valid utf-8: {e}")))?;
        lockfile::parse(text).map_err(|e| RegistryError::internal(format!("failed to parse buf.lock: {e:#}")))
    }

    /// `HasCommitId(short_sha) -> (bool, full_hash)`; non-existence is not
    /// an error.
    pub async fn has_commit_id(&self, ctx: &RequestContext, short_sha: &str) -> (bool, Option<String>) {
        self.repository.has_commit_id(ctx, short_sha).await
    }
}

/// `registry_commit_id = lowercase_hex(git_commit_hash)[:32]` (spec.md §6).
pub fn registry_commit_id(git_commit_hash: &str) -> String {
    git_commit_hash.to_ascii_lowercase().chars().take(32).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_commit_id_truncates_to_32_hex() {
        let full = "0123456789abcdef0123456789abcdef01234567";
        let id = registry_commit_id(full);
        assert_eq!(id.len(), 32);
        assert_eq!(id, "0123456789abcdef0123456789abcdef");
    }

    #[test]
    fn default_filters_match_proto_and_manifests() {
        let set = build_filter_set(&[]).unwrap();
        assert!(set.is_match("basic/basic.proto"));
        assert!(set.is_match("buf.yaml"));
        assert!(set.is_match("buf.lock"));
        assert!(!set.is_match("README.md"));
    }

    #[test]
    fn extra_filters_are_additive() {
        let set = build_filter_set(&["**/*.md".to_owned()]).unwrap();
        assert!(set.is_match("README.md"));
        assert!(set.is_match("basic/basic.proto"));
    }
}
