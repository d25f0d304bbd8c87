#![allow(dead_code)]

use std::path::Path;
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use buf_registry_core::catalogue::{ensure_data_dir, Catalogue};
use buf_registry_core::config::ModuleConfig;
use buf_registry_core::identity::InMemoryIdentityStore;
use buf_registry_core::remote::CredentialResolver;
use buf_registry_core::rpc::{router, AppState};

fn git(dir: &Path, args: &[&str]) {
    let output = Command::new("git")
        .current_dir(dir)
        .args(args)
        .env("GIT_AUTHOR_NAME", "registry-test")
        .env("GIT_AUTHOR_EMAIL", "registry-test@example.com")
        .env("GIT_COMMITTER_NAME", "registry-test")
        .env("GIT_COMMITTER_EMAIL", "registry-test@example.com")
        .output()
        .expect("failed to run git");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
}

/// Initializes a non-bare repository with a fixed default branch, so the
/// fixture doesn't depend on the host's `init.defaultBranch`.
pub fn init_source_repo(root: &Path) {
    std::fs::create_dir_all(root).expect("create repo root");
    git(root, &["init", "-q"]);
    git(root, &["symbolic-ref", "HEAD", "refs/heads/main"]);
}

/// Writes `relpath` (creating parent directories) and commits it, returning
/// the full commit hash.
pub fn commit_file(root: &Path, relpath: &str, contents: &str, message: &str) -> String {
    let path = root.join(relpath);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create file parent dir");
    }
    std::fs::write(&path, contents).expect("write fixture file");
    git(root, &["add", relpath]);
    git(root, &["commit", "-q", "-m", message]);
    rev_parse(root, "HEAD")
}

pub fn rev_parse(root: &Path, rev: &str) -> String {
    let output = Command::new("git")
        .current_dir(root)
        .args(["rev-parse", rev])
        .output()
        .expect("failed to run git rev-parse");
    assert!(output.status.success(), "git rev-parse {rev} failed");
    String::from_utf8(output.stdout).expect("commit hash is utf-8").trim().to_owned()
}

pub fn create_tag(root: &Path, tag: &str) {
    git(root, &["tag", tag]);
}

/// Creates an annotated tag object (as opposed to [`create_tag`]'s
/// lightweight tag), the kind many hosting providers and release tools
/// create by default — its ref points at a tag object, not a commit.
pub fn create_annotated_tag(root: &Path, tag: &str, message: &str) {
    git(root, &["tag", "-a", tag, "-m", message]);
}

pub fn create_branch(root: &Path, branch: &str, at: &str) {
    git(root, &["branch", branch, at]);
}

/// A registry server bound to an ephemeral local port, backed by real git
/// fixtures on disk. Aborts its accept loop when dropped.
pub struct TestServer {
    pub base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub struct ModuleFixture {
    pub owner: &'static str,
    pub name: &'static str,
    pub remote_path: std::path::PathBuf,
    pub subtree_root: &'static str,
    pub shallow: bool,
}

impl ModuleFixture {
    fn into_config(self) -> ModuleConfig {
        ModuleConfig {
            owner: self.owner.to_owned(),
            name: self.name.to_owned(),
            remote_url: self.remote_path.to_string_lossy().into_owned(),
            shallow: self.shallow,
            subtree_root: self.subtree_root.to_owned(),
            extra_filters: Vec::new(),
        }
    }
}

pub async fn spawn_server(
    data_dir: &Path,
    modules: Vec<ModuleFixture>,
    bearer_tokens: Vec<String>,
    own_host: &str,
) -> TestServer {
    ensure_data_dir(data_dir).expect("create data dir");

    let resolver = CredentialResolver::new();
    let mut builder = Catalogue::builder(data_dir).with_debounce(Duration::from_millis(1));
    for fixture in modules {
        builder.add_module(&fixture.into_config(), &resolver).expect("add module");
    }
    let catalogue = Arc::new(builder.build());

    let identity = Arc::new(InMemoryIdentityStore::new());
    identity.register_from_catalogue(&catalogue);

    let state = AppState::new(catalogue, identity, bearer_tokens, own_host.to_owned());
    let app = router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    TestServer { base_url: format!("http://{addr}"), handle }
}
