//! GitHub backend: repository discovery and pull requests over the REST API.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use batchpr_repo::Git;
use reqwest::header::ACCEPT;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::ForgeError;
use crate::http::{check_status, next_link};
use crate::project::{
    ChangelistBackend, Project, ProjectAttributes, PullRequest, Visibility, EXTRA_HEADER,
};

pub const GITHUB_API_URL: &str = "https://api.github.com";

const USER_AGENT: &str = concat!("batchpr/", env!("CARGO_PKG_VERSION"));
const ACCEPT_JSON: &str = "application/vnd.github+json";
const PAGE_SIZE: &str = "100";

/// GitHub reports "a pull request already exists" as 422 Unprocessable Entity.
fn is_conflict(status: StatusCode) -> bool {
    status == StatusCode::CONFLICT || status == StatusCode::UNPROCESSABLE_ENTITY
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct GitHubOwner {
    login: String,
}

#[derive(Debug, Deserialize)]
struct GitHubRepository {
    id: u64,
    name: String,
    owner: GitHubOwner,
    clone_url: String,
    #[serde(default)]
    archived: bool,
    #[serde(default)]
    fork: bool,
    #[serde(default)]
    disabled: bool,
    #[serde(default)]
    private: bool,
    #[serde(default)]
    visibility: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreatePullRequestBody<'a> {
    title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<&'a str>,
    head: &'a str,
    base: &'a str,
}

#[derive(Debug, Deserialize)]
struct GitHubPullRequest {
    html_url: Option<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Thin REST client. Cheap to clone.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    api_url: String,
    token: Option<String>,
}

impl GitHubClient {
    pub fn new(token: Option<String>) -> Result<Self, ForgeError> {
        let http = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            http,
            api_url: GITHUB_API_URL.to_owned(),
            token: token.filter(|t| !t.is_empty()),
        })
    }

    /// Point the client at a GitHub Enterprise (or test) API root.
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into().trim_end_matches('/').to_owned();
        self
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let url = if url.starts_with("http://") || url.starts_with("https://") {
            url.to_owned()
        } else {
            format!("{}/{}", self.api_url, url.trim_start_matches('/'))
        };
        let builder = self.http.request(method, url).header(ACCEPT, ACCEPT_JSON);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn get_all_pages<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, ForgeError> {
        let mut items = Vec::new();
        let first = self
            .request(Method::GET, path)
            .query(&[("per_page", PAGE_SIZE)])
            .send()
            .await?;
        let mut response = check_status(first, &Method::GET, is_conflict).await?;
        loop {
            let next = next_link(response.headers());
            let page: Vec<T> = response.json().await?;
            debug!(path, count = page.len(), "fetched page");
            items.extend(page);
            let Some(next) = next else {
                return Ok(items);
            };
            let sent = self.request(Method::GET, &next).send().await?;
            response = check_status(sent, &Method::GET, is_conflict).await?;
        }
    }

    /// Every repository owned by `user`.
    pub async fn user_projects(&self, user: &str) -> Result<Vec<Project>, ForgeError> {
        let repos: Vec<GitHubRepository> =
            self.get_all_pages(&format!("users/{user}/repos")).await?;
        Ok(repos.into_iter().map(|r| self.project(r)).collect())
    }

    /// Every repository of organization `org`.
    pub async fn organization_projects(&self, org: &str) -> Result<Vec<Project>, ForgeError> {
        let repos: Vec<GitHubRepository> =
            self.get_all_pages(&format!("orgs/{org}/repos")).await?;
        Ok(repos.into_iter().map(|r| self.project(r)).collect())
    }

    /// A single repository, or `None` when it does not exist.
    pub async fn repository_project(
        &self,
        owner: &str,
        repo: &str,
    ) -> Result<Option<Project>, ForgeError> {
        let response = self
            .request(Method::GET, &format!("repos/{owner}/{repo}"))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = check_status(response, &Method::GET, is_conflict).await?;
        let repository: GitHubRepository = response.json().await?;
        Ok(Some(self.project(repository)))
    }

    /// Open a pull request and return its `html_url`.
    pub async fn create_pull_request(
        &self,
        owner: &str,
        repo: &str,
        request: &PullRequest<'_>,
    ) -> Result<Option<String>, ForgeError> {
        let body = CreatePullRequestBody {
            title: request.title,
            body: request.description.filter(|d| !d.is_empty()),
            head: request.source_branch,
            base: request.target_branch,
        };
        let response = self
            .request(Method::POST, &format!("repos/{owner}/{repo}/pulls"))
            .json(&body)
            .send()
            .await?;
        let response = check_status(response, &Method::POST, is_conflict).await?;
        let pull: GitHubPullRequest = response.json().await?;
        Ok(pull.html_url)
    }

    /// `html_url` of the first open pull request from `owner:head` into `base`.
    pub async fn find_open_pull_request(
        &self,
        owner: &str,
        repo: &str,
        head: &str,
        base: &str,
    ) -> Result<Option<String>, ForgeError> {
        let head = format!("{owner}:{head}");
        let response = self
            .request(Method::GET, &format!("repos/{owner}/{repo}/pulls"))
            .query(&[("state", "open"), ("head", head.as_str()), ("base", base)])
            .send()
            .await?;
        let response = check_status(response, &Method::GET, is_conflict).await?;
        let pulls: Vec<GitHubPullRequest> = response.json().await?;
        Ok(pulls.into_iter().find_map(|p| p.html_url))
    }

    fn project(&self, repository: GitHubRepository) -> Project {
        let visibility = repository
            .visibility
            .as_deref()
            .and_then(Visibility::parse)
            .unwrap_or(if repository.private {
                Visibility::Private
            } else {
                Visibility::Public
            });
        let attributes = ProjectAttributes {
            owner: Some(repository.owner.login.clone()),
            archived: repository.archived,
            fork: repository.fork,
            disabled: repository.disabled,
            visibility: Some(visibility),
        };
        let id = format!("github:{}", repository.id);
        let name = format!("{}/{}", repository.owner.login, repository.name);
        let backend = GitHubProject {
            client: self.clone(),
            owner: repository.owner.login,
            repo: repository.name,
            clone_url: repository.clone_url,
        };
        Project::new(id, name, Arc::new(backend)).with_attributes(attributes)
    }
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct GitHubProject {
    client: GitHubClient,
    owner: String,
    repo: String,
    clone_url: String,
}

#[async_trait]
impl ChangelistBackend for GitHubProject {
    fn clone_source(&self) -> &str {
        &self.clone_url
    }

    /// With a token, the clone authenticates through `http.extraheader`, and
    /// the header is kept in the clone's local config for the push.
    async fn clone_repository(
        &self,
        git: &Git,
        destination: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), ForgeError> {
        let Some(token) = self.client.token() else {
            git.clone_repository(&self.clone_url, destination, cancel)
                .await?;
            return Ok(());
        };
        let credentials =
            base64::engine::general_purpose::STANDARD.encode(format!("x-access-token:{token}"));
        let header = format!("Authorization: Basic {credentials}");
        git.with_config(EXTRA_HEADER, header.as_str())
            .clone_repository(&self.clone_url, destination, cancel)
            .await?;
        git.set_config(destination, EXTRA_HEADER, &header, cancel)
            .await?;
        Ok(())
    }

    async fn create_pull_request(
        &self,
        request: &PullRequest<'_>,
    ) -> Result<Option<String>, ForgeError> {
        self.client
            .create_pull_request(&self.owner, &self.repo, request)
            .await
    }

    async fn find_open_pull_request(
        &self,
        request: &PullRequest<'_>,
    ) -> Result<Option<String>, ForgeError> {
        self.client
            .find_open_pull_request(
                &self.owner,
                &self.repo,
                request.source_branch,
                request.target_branch,
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_statuses() {
        assert!(is_conflict(StatusCode::UNPROCESSABLE_ENTITY));
        assert!(is_conflict(StatusCode::CONFLICT));
        assert!(!is_conflict(StatusCode::NOT_FOUND));
    }

    #[test]
    fn repository_maps_to_project() {
        let client = GitHubClient::new(None).unwrap();
        let repository: GitHubRepository = serde_json::from_value(serde_json::json!({
            "id": 42,
            "name": "tool",
            "owner": { "login": "acme" },
            "clone_url": "https://github.com/acme/tool.git",
            "archived": true,
            "private": true
        }))
        .unwrap();

        let project = client.project(repository);
        assert_eq!(project.id().as_str(), "github:42");
        assert_eq!(project.name(), "acme/tool");
        assert_eq!(
            project.backend().clone_source(),
            "https://github.com/acme/tool.git"
        );
        let attributes = project.attributes();
        assert!(attributes.archived);
        assert_eq!(attributes.owner.as_deref(), Some("acme"));
        assert_eq!(attributes.visibility, Some(Visibility::Private));
    }

    #[test]
    fn empty_token_is_anonymous() {
        let client = GitHubClient::new(Some(String::new())).unwrap();
        assert!(client.token().is_none());
    }
}
