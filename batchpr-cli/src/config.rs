//! YAML run configuration.
//!
//! ```yaml
//! state: state.json            # relative paths resolve against this file
//! parallelism: 4
//! max_projects: 50
//! rate_limit_seconds: 2
//! force_push: false
//! branch: chore/codeowners     # or `current_branch: true`
//! open_in_browser: false
//! git_config:
//!   user.name: batchpr
//! sources:
//!   - type: github
//!     organizations: [acme]
//!     exclude_archived: true
//!   - type: azure_devops
//!     collection_url: https://dev.azure.com/acme
//!   - type: local
//!     paths: [../service]
//! updater:
//!   type: codeowners
//!   owners: "@acme/platform"
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use batchpr_core::BranchName;
use batchpr_forge::{
    credentials, source, AzureDevOpsClient, GitHubClient, ProjectSources, ProjectUpdaterOptions,
    Visibility,
};
use batchpr_runner::{BatchOptions, FixedDelayRateLimiter, ProjectUpdater};
use serde::de::{self, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer};

use crate::updaters::{CodeOwnersUpdater, ReplaceTextUpdater};

const DEFAULT_STATE_FILE: &str = "batchpr-state.json";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    pub state: Option<PathBuf>,
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    pub max_projects: Option<usize>,
    pub rate_limit_seconds: Option<u64>,
    #[serde(default)]
    pub force_push: bool,
    pub branch: Option<String>,
    #[serde(default)]
    pub current_branch: bool,
    #[serde(default)]
    pub open_in_browser: bool,
    /// `-c key=value` pairs, in document order. Either a mapping or a list
    /// of single-entry mappings when a key must repeat.
    #[serde(default, deserialize_with = "ordered_pairs")]
    pub git_config: Vec<(String, String)>,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    pub updater: UpdaterConfig,
}

fn default_parallelism() -> usize {
    1
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceConfig {
    Github(GitHubSourceConfig),
    AzureDevops(AzureDevOpsSourceConfig),
    Local(LocalSourceConfig),
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GitHubSourceConfig {
    pub token: Option<String>,
    pub api_url: Option<String>,
    #[serde(default)]
    pub users: Vec<String>,
    #[serde(default)]
    pub organizations: Vec<String>,
    /// `owner/repo` entries.
    #[serde(default)]
    pub repositories: Vec<String>,
    #[serde(default)]
    pub exclude_archived: bool,
    #[serde(default)]
    pub exclude_forks: bool,
    #[serde(default)]
    pub exclude_visibility: Vec<String>,
    #[serde(default)]
    pub exclude_owners: Vec<String>,
    #[serde(default)]
    pub exclude_repositories: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AzureDevOpsSourceConfig {
    pub collection_url: String,
    pub token: Option<String>,
    #[serde(default)]
    pub exclude_disabled: bool,
    #[serde(default)]
    pub exclude_forks: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocalSourceConfig {
    pub paths: Vec<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UpdaterConfig {
    Codeowners {
        owners: String,
    },
    Replace {
        glob: String,
        find: String,
        replace: String,
        title: String,
        #[serde(default)]
        case_insensitive: bool,
    },
}

impl RunConfig {
    /// Read and parse `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::parse(&contents).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(contents)?;
        if config.branch.is_some() && config.current_branch {
            bail!("`branch` and `current_branch` are mutually exclusive");
        }
        Ok(config)
    }

    /// Run-state file, resolved against `base`.
    pub fn state_path(&self, base: &Path) -> PathBuf {
        let state = self
            .state
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_FILE));
        base.join(state)
    }

    pub fn batch_options(&self) -> Result<BatchOptions> {
        let mut updater_options = ProjectUpdaterOptions {
            force_push: self.force_push,
            ..ProjectUpdaterOptions::default()
        };
        for (key, value) in &self.git_config {
            updater_options = updater_options.with_git_config(key, value);
        }
        if let Some(branch) = &self.branch {
            updater_options = updater_options.with_fixed_branch_name(BranchName::new(branch.as_str())?);
        } else if self.current_branch {
            updater_options = updater_options.with_current_branch();
        }

        let mut options = BatchOptions {
            degree_of_parallelism: self.parallelism,
            maximum_projects: self.max_projects,
            open_review_url_in_browser: self.open_in_browser,
            updater_options,
            ..BatchOptions::default()
        };
        if let Some(seconds) = self.rate_limit_seconds.filter(|s| *s > 0) {
            options.rate_limiter = Arc::new(FixedDelayRateLimiter::new(Duration::from_secs(seconds)));
        }
        Ok(options)
    }

    /// Build every configured source. Resolves credentials, which may run
    /// external helpers.
    pub async fn sources(&self, base: &Path) -> Result<ProjectSources> {
        let mut sources = ProjectSources::new();
        for config in &self.sources {
            let group = match config {
                SourceConfig::Github(github) => github.sources().await?,
                SourceConfig::AzureDevops(azure) => azure.sources().await,
                SourceConfig::Local(local) => local.sources(base),
            };
            sources = sources.add_sources(group);
        }
        Ok(sources)
    }

    pub fn updater(&self) -> Result<Arc<dyn ProjectUpdater>> {
        let updater: Arc<dyn ProjectUpdater> = match &self.updater {
            UpdaterConfig::Codeowners { owners } => Arc::new(CodeOwnersUpdater::new(owners)?),
            UpdaterConfig::Replace {
                glob,
                find,
                replace,
                title,
                case_insensitive,
            } => Arc::new(ReplaceTextUpdater::new(
                glob,
                find,
                replace,
                title,
                *case_insensitive,
            )?),
        };
        Ok(updater)
    }
}

impl GitHubSourceConfig {
    async fn sources(&self) -> Result<ProjectSources> {
        let token = credentials::github_token(self.token.clone()).await;
        let mut client = GitHubClient::new(token)?;
        if let Some(api_url) = &self.api_url {
            client = client.with_api_url(api_url);
        }

        let mut sources = ProjectSources::new();
        for user in &self.users {
            sources = sources.add_github_user(client.clone(), user);
        }
        for org in &self.organizations {
            sources = sources.add_github_organization(client.clone(), org);
        }
        for full_name in &self.repositories {
            let (owner, repo) = split_full_name(full_name)?;
            sources = sources.add_github_repository(client.clone(), owner, repo);
        }

        if self.exclude_archived {
            sources = sources.add_filter(source::exclude_archived());
        }
        if self.exclude_forks {
            sources = sources.add_filter(source::exclude_forks());
        }
        for visibility in &self.exclude_visibility {
            let visibility = Visibility::parse(visibility)
                .with_context(|| format!("unknown visibility '{visibility}'"))?;
            sources = sources.add_filter(source::exclude_visibility(visibility));
        }
        for owner in &self.exclude_owners {
            sources = sources.add_filter(source::exclude_owner(owner));
        }
        for full_name in &self.exclude_repositories {
            let (owner, repo) = split_full_name(full_name)?;
            sources = sources.add_filter(source::exclude_repository(owner, repo));
        }
        Ok(sources)
    }
}

impl AzureDevOpsSourceConfig {
    async fn sources(&self) -> ProjectSources {
        let token = credentials::azure_devops_token(self.token.clone()).await;
        let client = AzureDevOpsClient::new(self.collection_url.as_str(), token);
        let mut sources = ProjectSources::new().add_azure_devops_repositories(client);
        if self.exclude_disabled {
            sources = sources.add_filter(source::exclude_disabled());
        }
        if self.exclude_forks {
            sources = sources.add_filter(source::exclude_forks());
        }
        sources
    }
}

impl LocalSourceConfig {
    fn sources(&self, base: &Path) -> ProjectSources {
        self.paths.iter().fold(ProjectSources::new(), |sources, path| {
            sources.add_local_repository(base.join(path))
        })
    }
}

fn ordered_pairs<'de, D>(deserializer: D) -> Result<Vec<(String, String)>, D::Error>
where
    D: Deserializer<'de>,
{
    OrderedPairs::deserialize(deserializer).map(|pairs| pairs.0)
}

/// Key/value pairs in document order, duplicates kept.
struct OrderedPairs(Vec<(String, String)>);

impl<'de> Deserialize<'de> for OrderedPairs {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(OrderedPairsVisitor).map(OrderedPairs)
    }
}

struct OrderedPairsVisitor;

impl<'de> Visitor<'de> for OrderedPairsVisitor {
    type Value = Vec<(String, String)>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a mapping or a list of mappings")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut pairs = Vec::new();
        while let Some(pair) = map.next_entry::<String, String>()? {
            pairs.push(pair);
        }
        Ok(pairs)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut pairs = Vec::new();
        while let Some(entry) = seq.next_element::<OrderedPairs>()? {
            pairs.extend(entry.0);
        }
        Ok(pairs)
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(Vec::new())
    }
}

fn split_full_name(full_name: &str) -> Result<(&str, &str)> {
    match full_name.split_once('/') {
        Some((owner, repo)) if !owner.is_empty() && !repo.is_empty() && !repo.contains('/') => {
            Ok((owner, repo))
        }
        _ => bail!("expected 'owner/repo', got '{full_name}'"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
state: out/state.json
parallelism: 3
max_projects: 10
rate_limit_seconds: 5
branch: chore/owners
git_config:
  user.name: bot
  user.email: bot@example.test
sources:
  - type: github
    organizations: [acme]
    repositories: [acme/tool]
    exclude_archived: true
    exclude_visibility: [private]
  - type: local
    paths: [repos/a, /abs/b]
updater:
  type: codeowners
  owners: "@acme/platform"
"#;

    #[test]
    fn parses_full_config() {
        let config = RunConfig::parse(FULL).unwrap();
        assert_eq!(config.parallelism, 3);
        assert_eq!(config.max_projects, Some(10));
        assert_eq!(config.sources.len(), 2);
        assert!(matches!(
            &config.sources[0],
            SourceConfig::Github(g) if g.organizations == ["acme"] && g.exclude_archived
        ));
        assert!(matches!(
            &config.updater,
            UpdaterConfig::Codeowners { owners } if owners == "@acme/platform"
        ));
        assert_eq!(
            config.state_path(Path::new("/work")),
            PathBuf::from("/work/out/state.json")
        );

        let options = config.batch_options().unwrap();
        assert_eq!(options.degree_of_parallelism, 3);
        assert_eq!(
            options.updater_options.additional_git_configurations,
            vec![
                ("user.name".to_string(), "bot".to_string()),
                ("user.email".to_string(), "bot@example.test".to_string()),
            ]
        );
    }

    #[test]
    fn defaults_apply() {
        let config = RunConfig::parse("updater: {type: codeowners, owners: '@me'}").unwrap();
        assert_eq!(config.parallelism, 1);
        assert!(config.sources.is_empty());
        assert_eq!(
            config.state_path(Path::new("/work")),
            PathBuf::from("/work/batchpr-state.json")
        );
        assert!(!config.batch_options().unwrap().updater_options.force_push);
    }

    #[test]
    fn rejects_conflicting_branch_modes() {
        let err = RunConfig::parse(
            "branch: x\ncurrent_branch: true\nupdater: {type: codeowners, owners: '@me'}",
        )
        .unwrap_err();
        assert!(err.to_string().contains("mutually exclusive"));
    }

    #[test]
    fn git_config_keeps_document_order_and_repeats() {
        let config = RunConfig::parse(
            r#"
git_config:
  - url.https://mirror.test/.insteadOf: https://a.test/
  - url.https://mirror.test/.insteadOf: https://b.test/
  - core.autocrlf: "false"
updater: {type: codeowners, owners: '@me'}
"#,
        )
        .unwrap();
        assert_eq!(
            config.git_config,
            vec![
                (
                    "url.https://mirror.test/.insteadOf".to_string(),
                    "https://a.test/".to_string()
                ),
                (
                    "url.https://mirror.test/.insteadOf".to_string(),
                    "https://b.test/".to_string()
                ),
                ("core.autocrlf".to_string(), "false".to_string()),
            ]
        );

        let config = RunConfig::parse(
            "git_config:\n  z.key: \"1\"\n  a.key: \"2\"\nupdater: {type: codeowners, owners: '@me'}",
        )
        .unwrap();
        assert_eq!(
            config.batch_options().unwrap().updater_options.additional_git_configurations,
            vec![
                ("z.key".to_string(), "1".to_string()),
                ("a.key".to_string(), "2".to_string()),
            ]
        );
    }

    #[test]
    fn rejects_unknown_updater() {
        assert!(RunConfig::parse("updater: {type: rewrite-history}").is_err());
    }

    #[test]
    fn full_name_must_have_owner_and_repo() {
        assert_eq!(split_full_name("acme/tool").unwrap(), ("acme", "tool"));
        assert!(split_full_name("acme").is_err());
        assert!(split_full_name("acme/").is_err());
        assert!(split_full_name("a/b/c").is_err());
    }

    #[test]
    fn local_sources_resolve_against_base() {
        let config = LocalSourceConfig {
            paths: vec![PathBuf::from("repos/a")],
        };
        assert!(!config.sources(Path::new("/work")).is_empty());
    }
}
