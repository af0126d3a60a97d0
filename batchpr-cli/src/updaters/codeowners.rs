//! `codeowners` updater: add a catch-all CODEOWNERS file where none exists.

use anyhow::{ensure, Result};
use async_trait::async_trait;
use batchpr_core::ChangeDescription;
use batchpr_runner::{ProjectUpdater, ProjectUpdaterContext};
use tracing::{debug, info};

/// Locations GitHub and Azure DevOps read CODEOWNERS from.
const LOCATIONS: [&str; 3] = ["CODEOWNERS", ".github/CODEOWNERS", "docs/CODEOWNERS"];

#[derive(Debug, Clone)]
pub struct CodeOwnersUpdater {
    owners: String,
}

impl CodeOwnersUpdater {
    pub fn new(owners: &str) -> Result<Self> {
        let owners = owners.trim();
        ensure!(!owners.is_empty(), "codeowners updater needs at least one owner");
        Ok(Self {
            owners: owners.to_owned(),
        })
    }

    fn content(&self) -> String {
        format!("* {}\n", self.owners)
    }
}

#[async_trait]
impl ProjectUpdater for CodeOwnersUpdater {
    async fn update(
        &self,
        context: &ProjectUpdaterContext<'_>,
    ) -> Result<Option<ChangeDescription>> {
        for location in LOCATIONS {
            if context.repository.file_exists(location).await? {
                debug!(parent: context.span, location, "CODEOWNERS already present");
                return Ok(None);
            }
        }

        context
            .repository
            .add_file("CODEOWNERS", self.content())
            .await?;
        info!(parent: context.span, owners = %self.owners, "added CODEOWNERS");

        let change = ChangeDescription::new("Add CODEOWNERS file")?.with_description(format!(
            "Assigns every path to {} so reviews are requested automatically.",
            self.owners
        ));
        Ok(Some(change))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_is_a_single_catch_all_rule() {
        let updater = CodeOwnersUpdater::new("  @acme/platform ").unwrap();
        assert_eq!(updater.content(), "* @acme/platform\n");
    }

    #[test]
    fn owners_are_required() {
        assert!(CodeOwnersUpdater::new("   ").is_err());
    }
}
