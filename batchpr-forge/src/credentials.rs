//! Provider token lookup: explicit value, then environment, then the
//! provider's command-line helper.

use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use crate::error::ForgeError;

pub const GITHUB_TOKEN_ENV: &str = "GH_TOKEN";
pub const AZURE_DEVOPS_TOKEN_ENV: &str = "AZURE_DEVOPS_PAT";

/// Resource id of Azure DevOps for `az account get-access-token`.
const AZURE_DEVOPS_RESOURCE: &str = "499b84ac-1321-427f-aa17-267ca6975798";

/// Token for GitHub, falling back to `gh auth token`.
pub async fn github_token(explicit: Option<String>) -> Option<String> {
    resolve(explicit, GITHUB_TOKEN_ENV, "gh", &["auth", "token"]).await
}

/// Token for Azure DevOps, falling back to the Azure CLI.
pub async fn azure_devops_token(explicit: Option<String>) -> Option<String> {
    resolve(
        explicit,
        AZURE_DEVOPS_TOKEN_ENV,
        "az",
        &[
            "account",
            "get-access-token",
            "--resource",
            AZURE_DEVOPS_RESOURCE,
            "--query",
            "accessToken",
            "--output",
            "tsv",
        ],
    )
    .await
}

async fn resolve(
    explicit: Option<String>,
    env_var: &str,
    helper: &str,
    args: &[&str],
) -> Option<String> {
    if let Some(token) = non_empty(explicit) {
        return Some(token);
    }
    if let Some(token) = non_empty(std::env::var(env_var).ok()) {
        debug!(env_var, "using token from environment");
        return Some(token);
    }
    match run_helper(helper, args).await {
        Ok(token) => token,
        Err(err) => {
            debug!(helper, error = %err, "no token from credential helper");
            None
        }
    }
}

/// Trimmed stdout of a credential helper; `None` when it printed nothing.
pub async fn run_helper(program: &str, args: &[&str]) -> Result<Option<String>, ForgeError> {
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| ForgeError::Credential {
            helper: program.to_owned(),
            message: e.to_string(),
        })?;
    if !output.status.success() {
        return Err(ForgeError::Credential {
            helper: program.to_owned(),
            message: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
        });
    }
    Ok(non_empty(Some(
        String::from_utf8_lossy(&output.stdout).trim().to_owned(),
    )))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
