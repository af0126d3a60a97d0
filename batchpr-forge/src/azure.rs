//! Azure DevOps backend: repositories of a collection and pull requests over
//! the Git REST API.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use batchpr_repo::Git;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::ForgeError;
use crate::http::check_status;
use crate::project::{ChangelistBackend, Project, ProjectAttributes, PullRequest, EXTRA_HEADER};

const API_VERSION: &str = "7.1";

fn is_conflict(status: StatusCode) -> bool {
    status == StatusCode::CONFLICT
}

fn branch_ref(branch: &str) -> String {
    format!("refs/heads/{branch}")
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ValueList<T> {
    value: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct TeamProjectReference {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AzureRepository {
    id: String,
    name: String,
    remote_url: String,
    web_url: String,
    project: TeamProjectReference,
    #[serde(default)]
    is_disabled: Option<bool>,
    #[serde(default)]
    is_fork: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreatePullRequestBody<'a> {
    source_ref_name: String,
    target_ref_name: String,
    title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AzurePullRequest {
    pull_request_id: u64,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// REST client bound to one collection URL, e.g.
/// `https://dev.azure.com/contoso`. Cheap to clone.
#[derive(Debug, Clone)]
pub struct AzureDevOpsClient {
    http: reqwest::Client,
    collection_url: String,
    token: Option<String>,
}

impl AzureDevOpsClient {
    pub fn new(collection_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            collection_url: collection_url.into().trim_end_matches('/').to_owned(),
            token: token.filter(|t| !t.is_empty()),
        }
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .http
            .request(method, format!("{}/{}", self.collection_url, path))
            .query(&[("api-version", API_VERSION)]);
        match &self.token {
            Some(token) => builder.basic_auth("", Some(token)),
            None => builder,
        }
    }

    /// Every repository the credentials can see in the collection.
    pub async fn accessible_projects(&self) -> Result<Vec<Project>, ForgeError> {
        let response = self
            .request(Method::GET, "_apis/git/repositories")
            .send()
            .await?;
        let response = check_status(response, &Method::GET, is_conflict).await?;
        let list: ValueList<AzureRepository> = response.json().await?;
        Ok(list.value.into_iter().map(|r| self.project(r)).collect())
    }

    fn project(&self, repository: AzureRepository) -> Project {
        let attributes = ProjectAttributes {
            owner: Some(repository.project.name.clone()),
            archived: false,
            fork: repository.is_fork.unwrap_or(false),
            disabled: repository.is_disabled.unwrap_or(false),
            visibility: None,
        };
        let id = format!("azuredevops:{}", repository.id);
        let name = repository.name.clone();
        let backend = AzureDevOpsProject {
            client: self.clone(),
            project_id: repository.project.id,
            repository_id: repository.id,
            remote_url: repository.remote_url,
            web_url: repository.web_url,
        };
        Project::new(id, name, Arc::new(backend)).with_attributes(attributes)
    }
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct AzureDevOpsProject {
    client: AzureDevOpsClient,
    project_id: String,
    repository_id: String,
    remote_url: String,
    web_url: String,
}

impl AzureDevOpsProject {
    fn pull_requests_path(&self) -> String {
        format!(
            "{}/_apis/git/repositories/{}/pullrequests",
            self.project_id, self.repository_id
        )
    }

    fn review_url(&self, pull_request_id: u64) -> String {
        format!(
            "{}/pullrequest/{pull_request_id}",
            self.web_url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl ChangelistBackend for AzureDevOpsProject {
    fn clone_source(&self) -> &str {
        &self.remote_url
    }

    async fn clone_repository(
        &self,
        git: &Git,
        destination: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), ForgeError> {
        let Some(token) = self.client.token() else {
            git.clone_repository(&self.remote_url, destination, cancel)
                .await?;
            return Ok(());
        };
        let header = basic_auth_header(token);
        git.with_config(EXTRA_HEADER, header.as_str())
            .clone_repository(&self.remote_url, destination, cancel)
            .await?;
        git.set_config(destination, EXTRA_HEADER, &header, cancel)
            .await?;
        Ok(())
    }

    async fn create_pull_request(
        &self,
        request: &PullRequest<'_>,
    ) -> Result<Option<String>, ForgeError> {
        let body = CreatePullRequestBody {
            source_ref_name: branch_ref(request.source_branch),
            target_ref_name: branch_ref(request.target_branch),
            title: request.title,
            description: request.description.filter(|d| !d.is_empty()),
        };
        let response = self
            .client
            .request(Method::POST, &self.pull_requests_path())
            .json(&body)
            .send()
            .await?;
        let response = check_status(response, &Method::POST, is_conflict).await?;
        let pull: AzurePullRequest = response.json().await?;
        Ok(Some(self.review_url(pull.pull_request_id)))
    }

    async fn find_open_pull_request(
        &self,
        request: &PullRequest<'_>,
    ) -> Result<Option<String>, ForgeError> {
        let source = branch_ref(request.source_branch);
        let target = branch_ref(request.target_branch);
        let response = self
            .client
            .request(Method::GET, &self.pull_requests_path())
            .query(&[
                ("searchCriteria.sourceRefName", source.as_str()),
                ("searchCriteria.targetRefName", target.as_str()),
                ("searchCriteria.status", "active"),
            ])
            .send()
            .await?;
        let response = check_status(response, &Method::GET, is_conflict).await?;
        let list: ValueList<AzurePullRequest> = response.json().await?;
        Ok(list
            .value
            .first()
            .map(|pull| self.review_url(pull.pull_request_id)))
    }
}

/// `http.extraheader` value authenticating git with a personal access token.
pub fn basic_auth_header(token: &str) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(format!(":{token}"));
    format!("Authorization: Basic {encoded}")
}
