mod support;

#[tokio::test]
async fn missing_bearer_token_is_rejected_before_any_fetch() {
    let remote_dir = tempfile::tempdir().expect("tempdir");
    let remote_path = remote_dir.path().join("basic-remote");
    support::init_source_repo(&remote_path);
    support::commit_file(&remote_path, "basic.proto", "syntax = \"proto3\";\n", "add proto");

    let data_dir = tempfile::tempdir().expect("tempdir");
    let server = support::spawn_server(
        data_dir.path(),
        vec![support::ModuleFixture {
            owner: "e2e",
            name: "basic",
            remote_path,
            subtree_root: "",
            shallow: false,
        }],
        vec!["test-token".to_owned()],
        "buf.example.com",
    )
    .await;

    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/buf.registry.module.v1.CommitService/GetCommits", server.base_url))
        .json(&serde_json::json!({
            "resource_refs": [{"name": {"owner": "e2e", "module": "basic", "label_name": "main"}}]
        }))
        .send()
        .await
        .expect("request failed");

    assert_eq!(response.status(), reqwest::StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = response.json().await.expect("invalid json");
    assert_eq!(body["kind"], "unauthenticated");

    // No bare repository should have been created on disk, since the auth
    // layer rejects the call before the catalogue is ever touched.
    let mut entries = std::fs::read_dir(data_dir.path()).expect("read data dir");
    assert!(entries.next().is_none(), "expected no repositories to have been fetched");
}

#[tokio::test]
async fn wrong_token_is_rejected() {
    let remote_dir = tempfile::tempdir().expect("tempdir");
    let remote_path = remote_dir.path().join("basic-remote");
    support::init_source_repo(&remote_path);
    support::commit_file(&remote_path, "basic.proto", "syntax = \"proto3\";\n", "add proto");

    let data_dir = tempfile::tempdir().expect("tempdir");
    let server = support::spawn_server(
        data_dir.path(),
        vec![support::ModuleFixture {
            owner: "e2e",
            name: "basic",
            remote_path,
            subtree_root: "",
            shallow: false,
        }],
        vec!["test-token".to_owned()],
        "buf.example.com",
    )
    .await;

    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/buf.registry.owner.v1.OwnerService/GetOwners", server.base_url))
        .bearer_auth("not-the-right-token")
        .json(&serde_json::json!({ "owner_refs": [{"name": "e2e"}] }))
        .send()
        .await
        .expect("request failed");

    assert_eq!(response.status(), reqwest::StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn health_probes_do_not_require_authentication() {
    let data_dir = tempfile::tempdir().expect("tempdir");
    let server = support::spawn_server(data_dir.path(), vec![], vec!["test-token".to_owned()], "buf.example.com").await;

    let client = reqwest::Client::new();
    let ready = client.get(format!("{}/readyz", server.base_url)).send().await.expect("request failed");
    assert_eq!(ready.status(), reqwest::StatusCode::OK);

    let live = client.get(format!("{}/livez", server.base_url)).send().await.expect("request failed");
    assert_eq!(live.status(), reqwest::StatusCode::OK);
}
