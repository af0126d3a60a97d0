//! `replace` updater: literal find/replace across files matching a glob.

use anyhow::{ensure, Context, Result};
use async_trait::async_trait;
use batchpr_core::ChangeDescription;
use batchpr_repo::GlobOptions;
use batchpr_runner::{ProjectUpdater, ProjectUpdaterContext};
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct ReplaceTextUpdater {
    glob: String,
    find: String,
    replace: String,
    title: String,
    options: GlobOptions,
}

impl ReplaceTextUpdater {
    pub fn new(
        glob: &str,
        find: &str,
        replace: &str,
        title: &str,
        case_insensitive: bool,
    ) -> Result<Self> {
        ensure!(!find.is_empty(), "replace updater needs a non-empty `find`");
        // Validate the title once, up front.
        ChangeDescription::new(title)?;
        Ok(Self {
            glob: glob.to_owned(),
            find: find.to_owned(),
            replace: replace.to_owned(),
            title: title.to_owned(),
            options: GlobOptions { case_insensitive },
        })
    }
}

#[async_trait]
impl ProjectUpdater for ReplaceTextUpdater {
    async fn update(
        &self,
        context: &ProjectUpdaterContext<'_>,
    ) -> Result<Option<ChangeDescription>> {
        let repository = context.repository;
        let root = repository.root_path();
        let files = repository.find_files(&self.glob, self.options).await?;
        debug!(parent: context.span, glob = %self.glob, matched = files.len(), "matched files");

        let mut changed = 0usize;
        for path in files {
            let relative = path
                .strip_prefix(root)
                .with_context(|| format!("{} is outside the checkout", path.display()))?;
            let updated = repository
                .update_file_text(relative, |text| text.replace(&self.find, &self.replace))
                .await?;
            if updated {
                debug!(parent: context.span, file = %relative.display(), "replaced");
                changed += 1;
            }
        }

        if changed == 0 {
            return Ok(None);
        }
        info!(parent: context.span, files = changed, "rewrote files");
        let change = ChangeDescription::new(self.title.as_str())?.with_description(format!(
            "Replaces `{}` with `{}` in files matching `{}`.",
            self.find, self.replace, self.glob
        ));
        Ok(Some(change))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_find_and_title() {
        assert!(ReplaceTextUpdater::new("**/*.md", "", "x", "Fix", false).is_err());
        assert!(ReplaceTextUpdater::new("**/*.md", "a", "b", "  ", false).is_err());
        assert!(ReplaceTextUpdater::new("**/*.md", "a", "b", "Fix", false).is_ok());
    }
}
