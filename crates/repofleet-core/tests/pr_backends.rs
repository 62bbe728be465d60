//! Platform backend tests against a local mock HTTP server: auth headers,
//! payload shapes, URL encoding, and success/error response parsing.

use mockito::Matcher;
use serde_json::json;

use repofleet_core::pr::{BitbucketBackend, GithubBackend, GitlabBackend};
use repofleet_core::{FleetError, PullRequestBackend};

#[tokio::test]
async fn github_posts_expected_payload_and_parses_url() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/repos/acme/r1/pulls")
        .match_header("authorization", "token tok-123")
        .match_header("accept", "application/vnd.github.v3+json")
        .match_body(Matcher::Json(json!({
            "title": "Batch update",
            "body": "Automated replacements",
            "head": "update-strings",
            "base": "main",
        })))
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(r#"{"html_url": "https://github.com/acme/r1/pull/42"}"#)
        .create_async()
        .await;

    let backend = GithubBackend::new(Some("tok-123".to_string()), Some(server.url()), 0);
    let url = backend
        .create_pull_request(
            "acme/r1",
            "update-strings",
            "main",
            "Batch update",
            "Automated replacements",
        )
        .await
        .unwrap();

    assert_eq!(url.as_deref(), Some("https://github.com/acme/r1/pull/42"));
    mock.assert_async().await;
}

#[tokio::test]
async fn github_error_surfaces_message_field() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/repos/acme/r1/pulls")
        .with_status(422)
        .with_header("content-type", "application/json")
        .with_body(r#"{"message": "Validation Failed"}"#)
        .create_async()
        .await;

    let backend = GithubBackend::new(Some("tok".to_string()), Some(server.url()), 0);
    let err = backend
        .create_pull_request("acme/r1", "update-strings", "main", "t", "b")
        .await
        .unwrap_err();

    match err {
        FleetError::PullRequestRejected(message) => {
            assert!(message.contains("Validation Failed"), "{message}");
            assert!(message.contains("422"), "{message}");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn gitlab_percent_encodes_project_path() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/projects/acme%2Fr1/merge_requests")
        .match_header("private-token", "glpat-tok")
        .match_body(Matcher::Json(json!({
            "source_branch": "update-strings",
            "target_branch": "main",
            "title": "Batch update",
            "description": "Automated replacements",
        })))
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(r#"{"web_url": "https://gitlab.com/acme/r1/-/merge_requests/7"}"#)
        .create_async()
        .await;

    let backend = GitlabBackend::new(Some("glpat-tok".to_string()), Some(server.url()), 0);
    let url = backend
        .create_pull_request(
            "acme/r1",
            "update-strings",
            "main",
            "Batch update",
            "Automated replacements",
        )
        .await
        .unwrap();

    assert_eq!(
        url.as_deref(),
        Some("https://gitlab.com/acme/r1/-/merge_requests/7")
    );
    mock.assert_async().await;
}

#[tokio::test]
async fn gitlab_error_surfaces_message_field() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/projects/acme%2Fr1/merge_requests")
        .with_status(409)
        .with_header("content-type", "application/json")
        .with_body(r#"{"message": "Another open merge request already exists"}"#)
        .create_async()
        .await;

    let backend = GitlabBackend::new(Some("glpat-tok".to_string()), Some(server.url()), 0);
    let err = backend
        .create_pull_request("acme/r1", "update-strings", "main", "t", "b")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Another open merge request"));
}

#[tokio::test]
async fn bitbucket_uses_basic_auth_and_nested_payload() {
    let mut server = mockito::Server::new_async().await;
    // "bot:app-pass" base64-encoded.
    let mock = server
        .mock("POST", "/repositories/acme/r1/pullrequests")
        .match_header("authorization", "Basic Ym90OmFwcC1wYXNz")
        .match_body(Matcher::Json(json!({
            "title": "Batch update",
            "description": "Automated replacements",
            "source": { "branch": { "name": "update-strings" } },
            "destination": { "branch": { "name": "main" } },
        })))
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"links": {"html": {"href": "https://bitbucket.org/acme/r1/pull-requests/3"}}}"#,
        )
        .create_async()
        .await;

    let backend = BitbucketBackend::new(
        "bot".to_string(),
        Some("app-pass".to_string()),
        Some(server.url()),
        0,
    );
    let url = backend
        .create_pull_request(
            "acme/r1",
            "update-strings",
            "main",
            "Batch update",
            "Automated replacements",
        )
        .await
        .unwrap();

    assert_eq!(
        url.as_deref(),
        Some("https://bitbucket.org/acme/r1/pull-requests/3")
    );
    mock.assert_async().await;
}

#[tokio::test]
async fn bitbucket_error_descends_into_error_object() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/repositories/acme/r1/pullrequests")
        .with_status(400)
        .with_header("content-type", "application/json")
        .with_body(r#"{"error": {"message": "source branch not found"}}"#)
        .create_async()
        .await;

    let backend = BitbucketBackend::new(
        "bot".to_string(),
        Some("app-pass".to_string()),
        Some(server.url()),
        0,
    );
    let err = backend
        .create_pull_request("acme/r1", "update-strings", "main", "t", "b")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("source branch not found"));
}
