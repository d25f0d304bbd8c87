mod support;

use buf_registry_core::module_view::registry_commit_id;

#[tokio::test]
async fn download_resolves_a_commit_only_reachable_via_a_remote_branch_head() {
    let remote_dir = tempfile::tempdir().expect("tempdir");
    let remote_path = remote_dir.path().join("shallow-remote");
    support::init_source_repo(&remote_path);
    support::commit_file(&remote_path, "basic.proto", "syntax = \"proto3\";\n", "add basic proto");
    support::create_branch(&remote_path, "feature", "main");

    // Switch the working tree onto `feature` so the new commit lands there,
    // not on `main` — the registry has never seen this commit before the
    // shallow fetch the Download call triggers.
    let checkout = std::process::Command::new("git")
        .current_dir(&remote_path)
        .args(["checkout", "-q", "feature"])
        .status()
        .expect("checkout feature");
    assert!(checkout.success());

    support::commit_file(&remote_path, "feature.proto", "syntax = \"proto3\";\n", "add feature proto");
    let full_hash = support::rev_parse(&remote_path, "feature");
    let expected_id = registry_commit_id(&full_hash);

    let data_dir = tempfile::tempdir().expect("tempdir");
    let server = support::spawn_server(
        data_dir.path(),
        vec![support::ModuleFixture {
            owner: "e2e",
            name: "shallow-mod",
            remote_path,
            subtree_root: "",
            shallow: true,
        }],
        vec!["test-token".to_owned()],
        "buf.example.com",
    )
    .await;

    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/buf.registry.module.v1.DownloadService/Download", server.base_url))
        .bearer_auth("test-token")
        .json(&serde_json::json!({ "resource_ref": { "id": expected_id } }))
        .send()
        .await
        .expect("request failed");

    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body: serde_json::Value = response.json().await.expect("invalid json");
    let content = &body["contents"][0];
    assert_eq!(content["commit"]["id"], expected_id);

    let paths: Vec<&str> = content["files"].as_array().unwrap().iter().map(|f| f["path"].as_str().unwrap()).collect();
    assert!(paths.contains(&"feature.proto"), "expected feature.proto in snapshot, got {paths:?}");
}
