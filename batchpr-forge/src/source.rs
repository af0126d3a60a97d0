//! Project sources: ordered providers plus ordered filter predicates,
//! assembled into one lazy stream.
//!
//! Providers run one after another, each only once the previous one is
//! exhausted; a provider that fails yields a single `Err` item. Filters apply
//! to every project of this source, in order. Groups with their own filters
//! nest through [`ProjectSources::add_sources`].

use std::future::{ready, Future};
use std::path::PathBuf;
use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt};

use crate::azure::AzureDevOpsClient;
use crate::error::ForgeError;
use crate::github::GitHubClient;
use crate::local::LocalProject;
use crate::project::{Project, Visibility};

pub type ProjectStream = BoxStream<'static, Result<Project, ForgeError>>;
pub type ProjectProvider = Arc<dyn Fn() -> ProjectStream + Send + Sync>;
pub type ProjectFilter = Arc<dyn Fn(&Project) -> bool + Send + Sync>;

#[derive(Clone, Default)]
pub struct ProjectSources {
    providers: Vec<ProjectProvider>,
    filters: Vec<ProjectFilter>,
}

impl ProjectSources {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when no provider has been added.
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn add_provider<F>(mut self, provider: F) -> Self
    where
        F: Fn() -> ProjectStream + Send + Sync + 'static,
    {
        self.providers.push(Arc::new(provider));
        self
    }

    /// Keep only projects for which `filter` returns true.
    pub fn add_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&Project) -> bool + Send + Sync + 'static,
    {
        self.filters.push(Arc::new(filter));
        self
    }

    /// Nest another source, with its own filters, as one provider.
    pub fn add_sources(self, sources: ProjectSources) -> Self {
        self.add_provider(move || sources.stream())
    }

    /// A fixed list of projects.
    pub fn add_projects(self, projects: Vec<Project>) -> Self {
        self.add_provider(move || stream::iter(projects.clone().into_iter().map(Ok)).boxed())
    }

    pub fn add_local_repository(self, path: impl Into<PathBuf>) -> Self {
        self.add_projects(vec![LocalProject::project(path)])
    }

    pub fn add_github_user(self, client: GitHubClient, user: impl Into<String>) -> Self {
        let user = user.into();
        self.add_provider(move || {
            let client = client.clone();
            let user = user.clone();
            fetched(async move { client.user_projects(&user).await })
        })
    }

    pub fn add_github_organization(self, client: GitHubClient, org: impl Into<String>) -> Self {
        let org = org.into();
        self.add_provider(move || {
            let client = client.clone();
            let org = org.clone();
            fetched(async move { client.organization_projects(&org).await })
        })
    }

    /// One repository; yields nothing if it does not exist.
    pub fn add_github_repository(
        self,
        client: GitHubClient,
        owner: impl Into<String>,
        repo: impl Into<String>,
    ) -> Self {
        let owner = owner.into();
        let repo = repo.into();
        self.add_provider(move || {
            let client = client.clone();
            let owner = owner.clone();
            let repo = repo.clone();
            fetched(async move {
                Ok(client
                    .repository_project(&owner, &repo)
                    .await?
                    .into_iter()
                    .collect())
            })
        })
    }

    pub fn add_azure_devops_repositories(self, client: AzureDevOpsClient) -> Self {
        self.add_provider(move || {
            let client = client.clone();
            fetched(async move { client.accessible_projects().await })
        })
    }

    /// Every project of every provider, in order, minus filtered ones.
    pub fn stream(&self) -> ProjectStream {
        let providers = self.providers.clone();
        let filters = self.filters.clone();
        stream::iter(providers)
            .flat_map(|provider| provider())
            .filter(move |item| {
                ready(match item {
                    Ok(project) => filters.iter().all(|keep| keep(project)),
                    Err(_) => true,
                })
            })
            .boxed()
    }
}

/// Turn one batch fetch into a stream of items.
fn fetched<F>(fetch: F) -> ProjectStream
where
    F: Future<Output = Result<Vec<Project>, ForgeError>> + Send + 'static,
{
    stream::once(fetch)
        .flat_map(|result| match result {
            Ok(projects) => stream::iter(projects.into_iter().map(Ok)).boxed(),
            Err(err) => stream::iter(vec![Err(err)]).boxed(),
        })
        .boxed()
}

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

pub fn exclude_archived() -> impl Fn(&Project) -> bool + Send + Sync + 'static {
    |project: &Project| !project.attributes().archived
}

pub fn exclude_forks() -> impl Fn(&Project) -> bool + Send + Sync + 'static {
    |project: &Project| !project.attributes().fork
}

pub fn exclude_disabled() -> impl Fn(&Project) -> bool + Send + Sync + 'static {
    |project: &Project| !project.attributes().disabled
}

pub fn exclude_visibility(
    visibility: Visibility,
) -> impl Fn(&Project) -> bool + Send + Sync + 'static {
    move |project: &Project| project.attributes().visibility != Some(visibility)
}

/// Drop every project owned by `owner`.
pub fn exclude_owner(owner: impl Into<String>) -> impl Fn(&Project) -> bool + Send + Sync + 'static {
    let owner = owner.into();
    move |project: &Project| project.attributes().owner.as_deref() != Some(owner.as_str())
}

/// Drop the project named `owner/repo`.
pub fn exclude_repository(
    owner: impl AsRef<str>,
    repo: impl AsRef<str>,
) -> impl Fn(&Project) -> bool + Send + Sync + 'static {
    let full_name = format!("{}/{}", owner.as_ref(), repo.as_ref());
    move |project: &Project| project.name() != full_name
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::ProjectAttributes;
    use futures::TryStreamExt;

    fn project(path: &str, attributes: ProjectAttributes) -> Project {
        LocalProject::project(path).with_attributes(attributes)
    }

    async fn ids(sources: &ProjectSources) -> Vec<String> {
        sources
            .stream()
            .map_ok(|p| p.id().to_string())
            .try_collect()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn providers_run_in_order_and_filters_apply() {
        let archived = ProjectAttributes {
            archived: true,
            ..Default::default()
        };
        let sources = ProjectSources::new()
            .add_projects(vec![
                project("/a", ProjectAttributes::default()),
                project("/b", archived),
            ])
            .add_local_repository("/c")
            .add_filter(exclude_archived());

        assert_eq!(ids(&sources).await, vec!["local:/a", "local:/c"]);
    }

    #[tokio::test]
    async fn nested_sources_keep_their_own_filters() {
        let fork = ProjectAttributes {
            fork: true,
            ..Default::default()
        };
        let inner = ProjectSources::new()
            .add_projects(vec![project("/fork", fork.clone())])
            .add_filter(exclude_forks());
        let sources = ProjectSources::new()
            .add_sources(inner)
            .add_projects(vec![project("/other-fork", fork)]);

        assert_eq!(ids(&sources).await, vec!["local:/other-fork"]);
    }

    #[tokio::test]
    async fn stream_is_restartable() {
        let sources = ProjectSources::new().add_local_repository("/a");
        assert_eq!(ids(&sources).await, ids(&sources).await);
    }

    #[tokio::test]
    async fn provider_error_is_yielded() {
        let sources = ProjectSources::new()
            .add_provider(|| {
                fetched(async {
                    Err(ForgeError::Api {
                        status: 500,
                        method: "GET".into(),
                        url: "https://api.test".into(),
                        message: "down".into(),
                    })
                })
            })
            .add_local_repository("/after");

        let items: Vec<_> = sources.stream().collect().await;
        assert_eq!(items.len(), 2);
        assert!(items[0].is_err());
        assert!(items[1].is_ok());
    }

    #[test]
    fn owner_and_repository_filters() {
        let owned = ProjectAttributes {
            owner: Some("acme".into()),
            visibility: Some(Visibility::Private),
            ..Default::default()
        };
        let p = project("/x", owned);
        assert!(!exclude_owner("acme")(&p));
        assert!(exclude_owner("other")(&p));
        assert!(!exclude_visibility(Visibility::Private)(&p));
        assert!(exclude_visibility(Visibility::Public)(&p));
        assert!(exclude_repository("acme", "tool")(&p));
        let named = Project::new("github:1", "acme/tool", Arc::new(LocalProject::new("/t")));
        assert!(!exclude_repository("acme", "tool")(&named));
    }
}
