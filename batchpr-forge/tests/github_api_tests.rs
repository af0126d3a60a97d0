//! GitHub client tests against an in-process stub of the REST API.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use batchpr_core::ChangeDescription;
use batchpr_forge::{open_pull_request, GitHubClient, PullRequest, Visibility};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// Stub server
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
struct Stub {
    base: Arc<Mutex<String>>,
    pull_queries: Arc<Mutex<Vec<HashMap<String, String>>>>,
    auth_headers: Arc<Mutex<Vec<String>>>,
    existing_pull: bool,
}

fn repo_json(id: u64, name: &str, archived: bool) -> Value {
    json!({
        "id": id,
        "name": name,
        "owner": { "login": "acme" },
        "clone_url": format!("https://github.com/acme/{name}.git"),
        "archived": archived,
        "fork": false,
        "visibility": "public"
    })
}

async fn org_repos(
    State(stub): State<Stub>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let base = stub.base.lock().unwrap().clone();
    match params.get("page").map(String::as_str) {
        Some("2") => Json(json!([repo_json(3, "third", true)])).into_response(),
        _ => {
            assert_eq!(params.get("per_page").map(String::as_str), Some("100"));
            let mut headers = HeaderMap::new();
            headers.insert(
                "link",
                format!("<{base}/orgs/acme/repos?per_page=100&page=2>; rel=\"next\"")
                    .parse()
                    .unwrap(),
            );
            (
                headers,
                Json(json!([repo_json(1, "first", false), repo_json(2, "second", false)])),
            )
                .into_response()
        }
    }
}

async fn single_repo() -> Response {
    StatusCode::NOT_FOUND.into_response()
}

async fn create_pull(State(stub): State<Stub>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if let Some(auth) = headers.get("authorization") {
        stub.auth_headers
            .lock()
            .unwrap()
            .push(auth.to_str().unwrap().to_owned());
    }
    assert_eq!(body["head"], "add-codeowners");
    assert_eq!(body["base"], "main");
    if stub.existing_pull {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "message": "Validation Failed" })),
        )
            .into_response();
    }
    (
        StatusCode::CREATED,
        Json(json!({ "html_url": "https://github.com/acme/first/pull/1" })),
    )
        .into_response()
}

async fn list_pulls(
    State(stub): State<Stub>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    stub.pull_queries.lock().unwrap().push(params);
    Json(json!([{ "html_url": "https://github.com/acme/first/pull/9" }])).into_response()
}

async fn serve(stub: Stub) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    *stub.base.lock().unwrap() = base.clone();

    let app = Router::new()
        .route("/orgs/acme/repos", get(org_repos))
        .route("/repos/acme/missing", get(single_repo))
        .route("/repos/acme/first/pulls", get(list_pulls).post(create_pull))
        .with_state(stub);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    base
}

fn change() -> ChangeDescription {
    ChangeDescription::new("Add CODEOWNERS")
        .unwrap()
        .with_description("Owners for every path.")
}

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

#[tokio::test]
async fn organization_listing_follows_pagination() {
    let base = serve(Stub::default()).await;
    let client = GitHubClient::new(None).unwrap().with_api_url(&base);

    let projects = client.organization_projects("acme").await.unwrap();
    let names: Vec<_> = projects.iter().map(|p| p.name().to_owned()).collect();
    assert_eq!(names, vec!["acme/first", "acme/second", "acme/third"]);
    assert_eq!(projects[0].id().as_str(), "github:1");
    assert!(projects[2].attributes().archived);
    assert_eq!(
        projects[0].attributes().visibility,
        Some(Visibility::Public)
    );
}

#[tokio::test]
async fn missing_repository_yields_nothing() {
    let base = serve(Stub::default()).await;
    let client = GitHubClient::new(None).unwrap().with_api_url(&base);
    assert!(client
        .repository_project("acme", "missing")
        .await
        .unwrap()
        .is_none());
}

// ---------------------------------------------------------------------------
// Pull requests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_pull_request_returns_html_url_and_sends_token() {
    let stub = Stub::default();
    let base = serve(stub.clone()).await;
    let client = GitHubClient::new(Some("secret".into()))
        .unwrap()
        .with_api_url(&base);
    let change = change();

    let url = client
        .create_pull_request("acme", "first", &PullRequest::new("add-codeowners", "main", &change))
        .await
        .unwrap();
    assert_eq!(url.as_deref(), Some("https://github.com/acme/first/pull/1"));
    assert_eq!(
        stub.auth_headers.lock().unwrap().as_slice(),
        ["Bearer secret".to_string()]
    );
}

#[tokio::test]
async fn duplicate_pull_request_is_located() {
    let stub = Stub {
        existing_pull: true,
        ..Stub::default()
    };
    let base = serve(stub.clone()).await;
    let client = GitHubClient::new(None).unwrap().with_api_url(&base);
    let project = client
        .organization_projects("acme")
        .await
        .unwrap()
        .remove(0);
    let change = change();
    let pull_request = PullRequest::new("add-codeowners", "main", &change);

    let url = open_pull_request(project.backend(), &pull_request, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(url.as_deref(), Some("https://github.com/acme/first/pull/9"));

    let queries = stub.pull_queries.lock().unwrap();
    assert_eq!(queries.len(), 1);
    assert_eq!(queries[0]["state"], "open");
    assert_eq!(queries[0]["head"], "acme:add-codeowners");
    assert_eq!(queries[0]["base"], "main");
}
