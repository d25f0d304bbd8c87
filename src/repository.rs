//! The git-backed content source: a bare mirror of one remote repository,
//! fetched on demand and read back by tree walk or short-sha lookup.
//!
//! Every blocking `git2` call runs on a worker thread via
//! `tokio::task::spawn_blocking`, and a shared credential-callback cascade
//! (dispatching on [`crate::remote::AuthMethod`]) is used to build
//! `git2::FetchOptions`.
//!
//! Concurrency model: one exclusive async mutex serializes all fetches and
//! `last_fetch` updates on a given `Repository`; read-only tree walks and
//! short-sha scans open their own `git2::Repository` handle onto the same
//! on-disk path and never take the fetch mutex, so they may proceed
//! concurrently with each other and with an in-flight fetch.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use globset::GlobSet;

use crate::context::RequestContext;
use crate::error::RegistryError;
use crate::remote::{fetch_options, git2_credentials, remote_callbacks, AuthMethod};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(60);

/// One file read out of a tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct File {
    pub name: String,
    pub blob_sha: String,
    pub content: Vec<u8>,
}

enum RefKind {
    Head,
    Branch(String),
    Tag(String),
}

impl RefKind {
    fn fetch_refspec(&self) -> String {
        match self {
            RefKind::Head => "+HEAD:refs/remotes/origin/HEAD".to_owned(),
            RefKind::Branch(name) => format!("+refs/heads/{name}:refs/remotes/origin/{name}"),
            RefKind::Tag(name) => format!("+refs/tags/{name}:refs/tags/{name}"),
        }
    }

    fn local_ref(&self) -> String {
        match self {
            RefKind::Head => "refs/remotes/origin/HEAD".to_owned(),
            RefKind::Branch(name) => format!("refs/remotes/origin/{name}"),
            RefKind::Tag(name) => format!("refs/tags/{name}"),
        }
    }

    fn debounce_key(&self) -> String {
        self.fetch_refspec()
    }
}

/// One bare git object store on disk bound to exactly one remote.
pub struct Repository {
    path: PathBuf,
    remote_url: String,
    auth: Option<AuthMethod>,
    shallow: bool,
    debounce: Duration,
    last_fetch: DashMap<String, Instant>,
    short_sha_cache: DashMap<String, String>,
    fetch_gate: tokio::sync::Mutex<()>,
    initialized: AtomicBool,
}

impl Repository {
    pub fn new(path: PathBuf, remote_url: impl Into<String>, auth: Option<AuthMethod>, shallow: bool) -> Self {
        Self {
            path,
            remote_url: remote_url.into(),
            auth,
            shallow,
            debounce: DEFAULT_DEBOUNCE,
            last_fetch: DashMap::new(),
            short_sha_cache: DashMap::new(),
            fetch_gate: tokio::sync::Mutex::new(()),
            initialized: AtomicBool::new(false),
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    fn ensure_initialized(&self) -> Result<(), RegistryError> {
        if self.initialized.load(Ordering::Acquire) {
            return Ok(());
        }
        std::fs::create_dir_all(&self.path)
            .map_err(|e| RegistryError::internal(format!("failed to create repo dir: {e}")))?;
        let mut opts = git2::RepositoryInitOptions::new();
        opts.bare(true);
        opts.no_reinit(false);
        git2::Repository::init_opts(&self.path, &opts)
            .map_err(|e| RegistryError::internal(format!("failed to init bare repo: {e}")))?;
        self.initialized.store(true, Ordering::Release);
        Ok(())
    }

    /// Removes the on-disk state for this repository.
    pub fn delete(&self) -> Result<(), RegistryError> {
        if self.path.exists() {
            std::fs::remove_dir_all(&self.path)
                .map_err(|e| RegistryError::internal(format!("failed to delete repo: {e}")))?;
        }
        self.initialized.store(false, Ordering::Release);
        Ok(())
    }

    /// `FilesAtRef(ctx, ref, root, filters…) -> (git_commit, Files)`.
    pub async fn files_at_ref(
        &self,
        ctx: &RequestContext,
        refname: &str,
        root: &str,
        filters: &GlobSet,
    ) -> Result<(String, Vec<File>), RegistryError> {
        self.ensure_initialized()?;

        let full_hash = if refname.is_empty() {
            self.fetch_and_resolve(ctx, RefKind::Head).await?
        } else {
            match self.fetch_and_resolve(ctx, RefKind::Branch(refname.to_owned())).await {
                Ok(hash) => hash,
                Err(_) => self.fetch_and_resolve(ctx, RefKind::Tag(refname.to_owned())).await?,
            }
        };

        let files = self.read_tree(&full_hash, root, filters).await?;
        Ok((full_hash, files))
    }

    /// `FilesAtCommit(ctx, short_sha, root, filters…) -> (git_commit, Files)`.
    pub async fn files_at_commit(
        &self,
        ctx: &RequestContext,
        short_sha: &str,
        root: &str,
        filters: &GlobSet,
    ) -> Result<(String, Vec<File>), RegistryError> {
        self.ensure_initialized()?;
        let full_hash = self.commit_from_short(ctx, short_sha).await?;
        let files = self.read_tree(&full_hash, root, filters).await?;
        Ok((full_hash, files))
    }

    /// `CommitFromShort(ctx, short_sha) -> git_commit`, memoized.
    pub async fn commit_from_short(
        &self,
        ctx: &RequestContext,
        short_sha: &str,
    ) -> Result<String, RegistryError> {
        self.ensure_initialized()?;

        if let Some(full) = self.short_sha_cache.get(short_sha) {
            return Ok(full.clone());
        }

        if let Some(full) = self.scan_local_for_prefix(short_sha).await? {
            self.short_sha_cache.insert(short_sha.to_owned(), full.clone());
            return Ok(full);
        }

        if !self.shallow {
            self.fetch_ref(ctx, &RefKind::Head).await?;
        } else {
            let target_ref = self.find_remote_ref_by_prefix(ctx, short_sha).await?;
            self.fetch_raw_refspec(
                ctx,
                &format!("+{target_ref}:refs/remotes/origin/_shallow"),
                &format!("shallow:{short_sha}"),
                1,
            )
            .await?;
        }

        let full = self
            .scan_local_for_prefix(short_sha)
            .await?
            .ok_or_else(|| RegistryError::not_found(format!("commit not found: {short_sha}")))?;
        self.short_sha_cache.insert(short_sha.to_owned(), full.clone());
        Ok(full)
    }

    /// `HasCommitId(short_sha) -> (bool, full_hash)`; non-existence is not
    /// an error.
    pub async fn has_commit_id(&self, ctx: &RequestContext, short_sha: &str) -> (bool, Option<String>) {
        match self.commit_from_short(ctx, short_sha).await {
            Ok(full) => (true, Some(full)),
            Err(_) => (false, None),
        }
    }

    async fn fetch_and_resolve(&self, ctx: &RequestContext, kind: RefKind) -> Result<String, RegistryError> {
        self.fetch_ref(ctx, &kind).await?;
        self.resolve_local_ref(&kind).await
    }

    async fn fetch_ref(&self, ctx: &RequestContext, kind: &RefKind) -> Result<(), RegistryError> {
        let depth = if self.shallow { 1 } else { 0 };
        self.fetch_raw_refspec(ctx, &kind.fetch_refspec(), &kind.debounce_key(), depth).await
    }

    /// Core debounced fetch: holds the repository-wide mutex, consults
    /// `last_fetch[refspec]`, skips the network call within the debounce
    /// window, otherwise fetches and records `now` regardless of outcome, so
    /// a remote that is down doesn't get hammered on every request.
    async fn fetch_raw_refspec(
        &self,
        ctx: &RequestContext,
        refspec: &str,
        debounce_key: &str,
        depth: u32,
    ) -> Result<(), RegistryError> {
        let _guard = self.fetch_gate.lock().await;

        if let Some(last) = self.last_fetch.get(debounce_key) {
            if last.elapsed() < self.debounce {
                return Ok(());
            }
        }

        let path = self.path.clone();
        let remote_url = self.remote_url.clone();
        let refspec = refspec.to_owned();
        let credential = git2_credentials(self.auth.as_ref())
            .await
            .map_err(|e| RegistryError::internal(format!("failed to resolve credentials: {e}")))?;

        let handle = tokio::task::spawn_blocking(move || -> Result<(), RegistryError> {
            let repo = git2::Repository::open_bare(&path)
                .map_err(|e| RegistryError::internal(format!("failed to open repo: {e}")))?;

            let mut remote = repo
                .remote_anonymous(&remote_url)
                .map_err(|e| RegistryError::internal(format!("failed to create remote: {e}")))?;

            let mut opts = fetch_options(&credential)
                .map_err(|e| RegistryError::internal(format!("failed to build fetch options: {e}")))?;
            if depth > 0 {
                opts.depth(depth as i32);
            }
            opts.download_tags(git2::AutotagOption::None);

            match remote.fetch(&[refspec.as_str()], Some(&mut opts), None) {
                Ok(()) => Ok(()),
                Err(e) if e.message().to_lowercase().contains("up to date") => Ok(()),
                Err(e) => Err(classify_git_error(e)),
            }
        });

        let result = ctx.race(handle).await;
        self.last_fetch.insert(debounce_key.to_owned(), Instant::now());
        result
    }

    async fn resolve_local_ref(&self, kind: &RefKind) -> Result<String, RegistryError> {
        let path = self.path.clone();
        let local_ref = kind.local_ref();
        let handle = tokio::task::spawn_blocking(move || -> Result<String, RegistryError> {
            let repo = git2::Repository::open_bare(&path)
                .map_err(|e| RegistryError::internal(format!("failed to open repo: {e}")))?;
            let oid = repo
                .refname_to_id(&local_ref)
                .map_err(|_| RegistryError::not_found(format!("ref not found: {local_ref}")))?;
            // An annotated tag's ref points at a tag object, not a commit;
            // peel it down to the commit it ultimately targets. Peeling a
            // ref that already points at a commit (branches, lightweight
            // tags) is a no-op.
            let object = repo
                .find_object(oid, None)
                .map_err(|e| RegistryError::internal(format!("failed to load ref target: {e}")))?;
            let commit = object
                .peel(git2::ObjectType::Commit)
                .map_err(|_| RegistryError::not_found(format!("ref does not resolve to a commit: {local_ref}")))?;
            Ok(commit.id().to_string())
        });
        match handle.await {
            Ok(result) => result,
            Err(e) => Err(RegistryError::internal(format!("local ref resolution panicked: {e}"))),
        }
    }

    /// Lists remote refs (read-only network call) and returns the full
    /// refname of the first one whose target hash starts with `short_sha`.
    async fn find_remote_ref_by_prefix(
        &self,
        _ctx: &RequestContext,
        short_sha: &str,
    ) -> Result<String, RegistryError> {
        let path = self.path.clone();
        let remote_url = self.remote_url.clone();
        let short_sha = short_sha.to_owned();
        let credential = git2_credentials(self.auth.as_ref())
            .await
            .map_err(|e| RegistryError::internal(format!("failed to resolve credentials: {e}")))?;

        let handle = tokio::task::spawn_blocking(move || -> Result<String, RegistryError> {
            let repo = git2::Repository::open_bare(&path)
                .map_err(|e| RegistryError::internal(format!("failed to open repo: {e}")))?;
            let mut remote = repo
                .remote_anonymous(&remote_url)
                .map_err(|e| RegistryError::internal(format!("failed to create remote: {e}")))?;

            let connection = remote
                .connect_auth(git2::Direction::Fetch, Some(remote_callbacks(&credential)), None)
                .map_err(classify_git_error)?;

            let heads = connection.list().map_err(classify_git_error)?;
            let matching = heads
                .iter()
                .find(|head| head.oid().to_string().starts_with(&short_sha))
                .map(|head| head.name().to_owned());

            matching.ok_or_else(|| RegistryError::not_found(format!("no remote ref for short sha {short_sha}")))
        });

        match handle.await {
            Ok(result) => result,
            Err(e) => Err(RegistryError::internal(format!("remote ref listing panicked: {e}"))),
        }
    }

    async fn scan_local_for_prefix(&self, short_sha: &str) -> Result<Option<String>, RegistryError> {
        let path = self.path.clone();
        let short_sha = short_sha.to_owned();
        let handle = tokio::task::spawn_blocking(move || -> Result<Option<String>, RegistryError> {
            if short_sha.is_empty() || !short_sha.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(RegistryError::invalid_argument(format!("malformed short sha '{short_sha}'")));
            }
            let repo = git2::Repository::open_bare(&path)
                .map_err(|e| RegistryError::internal(format!("failed to open repo: {e}")))?;
            let odb = repo.odb().map_err(|e| RegistryError::internal(format!("failed to open odb: {e}")))?;

            let mut found = None;
            odb.foreach(|oid| {
                let hex = oid.to_string();
                if hex.starts_with(&short_sha) {
                    if let Ok(obj) = repo.find_object(*oid, Some(git2::ObjectType::Commit)) {
                        if obj.as_commit().is_some() {
                            found = Some(hex);
                            return false;
                        }
                    }
                }
                true
            })
            .map_err(|e| RegistryError::internal(format!("failed to scan objects: {e}")))?;

            Ok(found)
        });

        match handle.await {
            Ok(result) => result,
            Err(e) => Err(RegistryError::internal(format!("local scan panicked: {e}"))),
        }
    }

    /// Reads the commit's root tree, descends to `root` (must be a
    /// directory if non-empty), and returns every blob whose path matches
    /// at least one glob in `filters`, in sorted listing order.
    async fn read_tree(&self, commit_hash: &str, root: &str, filters: &GlobSet) -> Result<Vec<File>, RegistryError> {
        let path = self.path.clone();
        let commit_hash = commit_hash.to_owned();
        let root = root.to_owned();
        let filters = filters.clone();

        let handle = tokio::task::spawn_blocking(move || -> Result<Vec<File>, RegistryError> {
            let repo = git2::Repository::open_bare(&path)
                .map_err(|e| RegistryError::internal(format!("failed to open repo: {e}")))?;

            let oid = git2::Oid::from_str(&commit_hash)
                .map_err(|e| RegistryError::internal(format!("invalid commit hash: {e}")))?;
            let commit = repo
                .find_commit(oid)
                .map_err(|_| RegistryError::not_found(format!("commit not found: {commit_hash}")))?;
            let tree = commit
                .tree()
                .map_err(|e| RegistryError::internal(format!("failed to read tree: {e}")))?;

            let subtree = if root.is_empty() {
                tree
            } else {
                let entry = tree
                    .get_path(Path::new(&root))
                    .map_err(|_| RegistryError::invalid_argument(format!("root '{root}' does not exist")))?;
                if entry.kind() != Some(git2::ObjectType::Tree) {
                    return Err(RegistryError::invalid_argument(format!("root '{root}' is not a directory")));
                }
                entry
                    .to_object(&repo)
                    .map_err(|e| RegistryError::internal(format!("failed to load root tree: {e}")))?
                    .into_tree()
                    .map_err(|_| RegistryError::invalid_argument(format!("root '{root}' is not a directory")))?
            };

            let mut files = Vec::new();
            subtree
                .walk(git2::TreeWalkMode::PreOrder, |dir, entry| {
                    if entry.kind() != Some(git2::ObjectType::Blob) {
                        return git2::TreeWalkResult::Ok;
                    }
                    let name = match entry.name() {
                        Some(n) => n,
                        None => return git2::TreeWalkResult::Ok,
                    };
                    let rel_path = format!("{dir}{name}");
                    if !filters.is_match(&rel_path) {
                        return git2::TreeWalkResult::Ok;
                    }
                    if let Ok(obj) = entry.to_object(&repo) {
                        if let Some(blob) = obj.as_blob() {
                            files.push(File {
                                name: rel_path,
                                blob_sha: entry.id().to_string(),
                                content: blob.content().to_vec(),
                            });
                        }
                    }
                    git2::TreeWalkResult::Ok
                })
                .map_err(|e| RegistryError::internal(format!("failed to walk tree: {e}")))?;

            files.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(files)
        });

        match handle.await {
            Ok(result) => result,
            Err(e) => Err(RegistryError::internal(format!("tree walk panicked: {e}"))),
        }
    }
}

fn classify_git_error(err: git2::Error) -> RegistryError {
    use git2::ErrorClass;
    match err.class() {
        ErrorClass::Net | ErrorClass::Ssl | ErrorClass::Ssh | ErrorClass::Http => {
            RegistryError::unavailable(format!("git remote unreachable: {err}"))
        }
        _ => RegistryError::internal(format!("git operation failed: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ref_kind_refspecs_match_spec_layout() {
        assert_eq!(RefKind::Head.fetch_refspec(), "+HEAD:refs/remotes/origin/HEAD");
        assert_eq!(
            RefKind::Branch("main".into()).fetch_refspec(),
            "+refs/heads/main:refs/remotes/origin/main"
        );
        assert_eq!(RefKind::Tag("v1.0.0".into()).fetch_refspec(), "+refs/tags/v1.0.0:refs/tags/v1.0.0");
    }
}
