//! Azure DevOps client tests against an in-process stub of the Git REST API.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use batchpr_core::ChangeDescription;
use batchpr_forge::{open_pull_request, AzureDevOpsClient, Project, PullRequest};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

const PULLS: &str = "/contoso/fabrikam-id/_apis/git/repositories/repo-1/pullrequests";

// ---------------------------------------------------------------------------
// Stub server
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
struct Stub {
    base: Arc<Mutex<String>>,
    created: Arc<Mutex<Vec<Value>>>,
    searches: Arc<Mutex<Vec<HashMap<String, String>>>>,
    auth_headers: Arc<Mutex<Vec<String>>>,
    /// Answer every create with 409.
    existing_pull: bool,
    /// Active pull requests returned by the search.
    active: Vec<u64>,
}

async fn repositories(
    State(stub): State<Stub>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    assert_eq!(params.get("api-version").map(String::as_str), Some("7.1"));
    let base = stub.base.lock().unwrap().clone();
    Json(json!({
        "count": 2,
        "value": [
            {
                "id": "repo-1",
                "name": "Fabrikam",
                "remoteUrl": format!("{base}/contoso/Fabrikam/_git/Fabrikam"),
                "webUrl": "https://dev.azure.test/contoso/Fabrikam/_git/Fabrikam",
                "project": { "id": "fabrikam-id", "name": "Fabrikam" }
            },
            {
                "id": "repo-2",
                "name": "Legacy",
                "remoteUrl": format!("{base}/contoso/Fabrikam/_git/Legacy"),
                "webUrl": "https://dev.azure.test/contoso/Fabrikam/_git/Legacy",
                "project": { "id": "fabrikam-id", "name": "Fabrikam" },
                "isDisabled": true
            }
        ]
    }))
    .into_response()
}

async fn create_pull(
    State(stub): State<Stub>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Some(auth) = headers.get("authorization") {
        stub.auth_headers
            .lock()
            .unwrap()
            .push(auth.to_str().unwrap().to_owned());
    }
    stub.created.lock().unwrap().push(body);
    if stub.existing_pull {
        return (
            StatusCode::CONFLICT,
            Json(json!({
                "message": "TF401179: An active pull request for the source and target branch already exists."
            })),
        )
            .into_response();
    }
    (StatusCode::CREATED, Json(json!({ "pullRequestId": 5 }))).into_response()
}

async fn search_pulls(
    State(stub): State<Stub>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    stub.searches.lock().unwrap().push(params);
    let value: Vec<Value> = stub
        .active
        .iter()
        .map(|id| json!({ "pullRequestId": id }))
        .collect();
    Json(json!({ "count": value.len(), "value": value })).into_response()
}

async fn serve(stub: Stub) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    *stub.base.lock().unwrap() = base.clone();

    let app = Router::new()
        .route("/contoso/_apis/git/repositories", get(repositories))
        .route(PULLS, get(search_pulls).post(create_pull))
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

async fn first_project(base: &str, token: Option<&str>) -> Project {
    AzureDevOpsClient::new(format!("{base}/contoso/"), token.map(str::to_owned))
        .accessible_projects()
        .await
        .unwrap()
        .remove(0)
}

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

#[tokio::test]
async fn collection_listing_maps_repositories() {
    let base = serve(Stub::default()).await;
    let projects = AzureDevOpsClient::new(format!("{base}/contoso"), None)
        .accessible_projects()
        .await
        .unwrap();

    let ids: Vec<_> = projects.iter().map(|p| p.id().as_str().to_owned()).collect();
    assert_eq!(ids, vec!["azuredevops:repo-1", "azuredevops:repo-2"]);
    assert_eq!(projects[0].name(), "Fabrikam");
    assert_eq!(projects[0].attributes().owner.as_deref(), Some("Fabrikam"));
    assert!(!projects[0].attributes().disabled);
    assert!(projects[1].attributes().disabled);
}

// ---------------------------------------------------------------------------
// Pull requests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_pull_request_uses_branch_refs_and_basic_auth() {
    let stub = Stub::default();
    let base = serve(stub.clone()).await;
    let project = first_project(&base, Some("pat")).await;
    let change = change();

    let url = open_pull_request(
        project.backend(),
        &PullRequest::new("add-codeowners", "main", &change),
        &CancellationToken::new(),
    )
    .await
    .unwrap();
    assert_eq!(
        url.as_deref(),
        Some("https://dev.azure.test/contoso/Fabrikam/_git/Fabrikam/pullrequest/5")
    );

    let created = stub.created.lock().unwrap();
    assert_eq!(created[0]["sourceRefName"], "refs/heads/add-codeowners");
    assert_eq!(created[0]["targetRefName"], "refs/heads/main");
    assert_eq!(created[0]["title"], "Add CODEOWNERS");
    assert_eq!(created[0]["description"], "Owners for every path.");
    // base64(":pat")
    assert_eq!(
        stub.auth_headers.lock().unwrap().as_slice(),
        ["Basic OnBhdA==".to_string()]
    );
    assert!(stub.searches.lock().unwrap().is_empty());
}

#[tokio::test]
async fn conflict_locates_active_pull_request() {
    let stub = Stub {
        existing_pull: true,
        active: vec![9, 3],
        ..Stub::default()
    };
    let base = serve(stub.clone()).await;
    let project = first_project(&base, None).await;
    let change = change();

    let url = open_pull_request(
        project.backend(),
        &PullRequest::new("add-codeowners", "main", &change),
        &CancellationToken::new(),
    )
    .await
    .unwrap();
    assert_eq!(
        url.as_deref(),
        Some("https://dev.azure.test/contoso/Fabrikam/_git/Fabrikam/pullrequest/9")
    );

    let searches = stub.searches.lock().unwrap();
    assert_eq!(searches.len(), 1);
    assert_eq!(
        searches[0]["searchCriteria.sourceRefName"],
        "refs/heads/add-codeowners"
    );
    assert_eq!(searches[0]["searchCriteria.targetRefName"], "refs/heads/main");
    assert_eq!(searches[0]["searchCriteria.status"], "active");
    assert_eq!(searches[0]["api-version"], "7.1");
}

#[tokio::test]
async fn conflict_without_active_pull_request_fails() {
    let stub = Stub {
        existing_pull: true,
        ..Stub::default()
    };
    let base = serve(stub.clone()).await;
    let project = first_project(&base, None).await;
    let change = change();

    let err = open_pull_request(
        project.backend(),
        &PullRequest::new("add-codeowners", "main", &change),
        &CancellationToken::new(),
    )
    .await
    .unwrap_err();
    assert!(err.is_conflict(), "got: {err}");
    assert_eq!(err.status(), Some(409));
    assert!(err.to_string().contains("TF401179"));
    assert_eq!(stub.searches.lock().unwrap().len(), 1);
}
