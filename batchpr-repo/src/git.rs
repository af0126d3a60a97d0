//! `git` subprocess wrapper.
//!
//! Every call shells out to the system `git` binary with a null stdin and
//! `GIT_TERMINAL_PROMPT=0`, so a missing credential fails instead of hanging
//! the worker. Extra configuration pairs are passed as `-c key=value` before
//! the subcommand on every invocation.

use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::error::GitError;

/// One `-c key=value` pair.
pub type GitConfig = (String, String);

/// Runs git subcommands with a fixed set of configuration overrides.
#[derive(Debug, Clone, Default)]
pub struct Git {
    configs: Vec<GitConfig>,
}

impl Git {
    pub fn new(configs: impl IntoIterator<Item = GitConfig>) -> Self {
        Self {
            configs: configs.into_iter().collect(),
        }
    }

    /// A copy that also passes `-c key=value`.
    pub fn with_config(&self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut configs = self.configs.clone();
        configs.push((key.into(), value.into()));
        Self { configs }
    }

    /// `git clone <remote> <destination>`.
    #[instrument(level = "debug", skip(self, cancel), fields(dest = %destination.display()))]
    pub async fn clone_repository(
        &self,
        remote: &str,
        destination: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), GitError> {
        let destination = destination.to_string_lossy();
        self.run(None, &["clone", remote, &destination], cancel)
            .await?;
        Ok(())
    }

    /// Stage every change, commit it, and return the new commit id.
    #[instrument(level = "debug", skip(self, message, cancel), fields(repo = %repo.display()))]
    pub async fn commit(
        &self,
        repo: &Path,
        message: &str,
        cancel: &CancellationToken,
    ) -> Result<String, GitError> {
        self.run(Some(repo), &["add", "."], cancel).await?;
        self.run(Some(repo), &["commit", "-m", message], cancel)
            .await?;
        let head = self
            .run(Some(repo), &["rev-parse", "HEAD"], cancel)
            .await?;
        Ok(head.trim().to_owned())
    }

    /// Push `HEAD` to `origin/<branch>`.
    #[instrument(level = "debug", skip(self, cancel), fields(repo = %repo.display()))]
    pub async fn push(
        &self,
        repo: &Path,
        branch: &str,
        force: bool,
        cancel: &CancellationToken,
    ) -> Result<(), GitError> {
        let refspec = format!("HEAD:refs/heads/{branch}");
        let mut args = vec!["push", "origin", refspec.as_str()];
        if force {
            args.push("--force");
        }
        self.run(Some(repo), &args, cancel).await?;
        Ok(())
    }

    /// Name of the checked-out branch.
    ///
    /// Works on a freshly cloned empty repository, where `HEAD` points at a
    /// branch that has no commit yet.
    #[instrument(level = "debug", skip(self, cancel), fields(repo = %repo.display()))]
    pub async fn current_branch_name(
        &self,
        repo: &Path,
        cancel: &CancellationToken,
    ) -> Result<String, GitError> {
        match self
            .run(Some(repo), &["symbolic-ref", "--short", "HEAD"], cancel)
            .await
        {
            Ok(name) => Ok(name.trim().to_owned()),
            Err(GitError::CommandFailed { .. }) => {
                // Detached HEAD.
                let name = self
                    .run(Some(repo), &["rev-parse", "--abbrev-ref", "HEAD"], cancel)
                    .await?;
                Ok(name.trim().to_owned())
            }
            Err(e) => Err(e),
        }
    }

    /// `git config <key> <value>` in the repository's local config.
    #[instrument(level = "debug", skip(self, value, cancel), fields(repo = %repo.display()))]
    pub async fn set_config(
        &self,
        repo: &Path,
        key: &str,
        value: &str,
        cancel: &CancellationToken,
    ) -> Result<(), GitError> {
        self.run(Some(repo), &["config", key, value], cancel)
            .await?;
        Ok(())
    }

    async fn run(
        &self,
        repo: Option<&Path>,
        args: &[&str],
        cancel: &CancellationToken,
    ) -> Result<String, GitError> {
        let command = args.first().copied().unwrap_or_default().to_owned();
        if cancel.is_cancelled() {
            return Err(GitError::Cancelled { command });
        }

        let mut cmd = Command::new("git");
        for (key, value) in &self.configs {
            cmd.arg("-c").arg(format!("{key}={value}"));
        }
        if let Some(repo) = repo {
            cmd.arg("-C").arg(repo);
        }
        cmd.args(args);

        cmd.env("GIT_TERMINAL_PROMPT", "0");
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        debug!(%command, "spawning git");

        let output = cmd.output().await.map_err(|source| GitError::Spawn {
            command: command.clone(),
            source,
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GitError::CommandFailed {
                command,
                status: output.status.to_string(),
                output: format!("{stdout}{stderr}"),
            });
        }
        Ok(stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancelled_token_prevents_spawn() {
        let git = Git::default();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = git
            .current_branch_name(Path::new("."), &cancel)
            .await
            .unwrap_err();
        assert!(
            matches!(&err, GitError::Cancelled { command } if command == "symbolic-ref"),
            "got: {err}"
        );
    }

    #[tokio::test]
    async fn failure_carries_subcommand_and_output() {
        let dir = tempfile::TempDir::new().unwrap();
        let git = Git::default();
        let err = git
            .commit(dir.path(), "msg", &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            GitError::CommandFailed { command, output, .. } => {
                assert_eq!(command, "add");
                assert!(!output.is_empty());
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
