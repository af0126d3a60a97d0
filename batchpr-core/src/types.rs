//! Domain types shared by every batchpr crate.
//!
//! Identity values are newtypes so a project id can never be confused with a
//! display name or a branch name.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Maximum length, in characters, of a slugified branch name.
pub const MAX_SLUG_LENGTH: usize = 100;

const SLUG_SEPARATOR: char = '-';

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Globally unique, run-stable project identifier.
///
/// Encodes the provider and the remote id, e.g. `github:123` or
/// `local:/srv/git/tool`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(pub String);

impl ProjectId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ProjectId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ProjectId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// A non-empty git branch name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BranchName(String);

impl BranchName {
    pub fn new(name: impl Into<String>) -> Result<Self, ValidationError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ValidationError::EmptyBranchName);
        }
        Ok(Self(name))
    }

    /// Turn free text into a branch-safe token.
    ///
    /// The text is first transliterated to ASCII (`Café` becomes `Cafe`).
    /// ASCII letters and digits are lower-cased and kept; every other run of
    /// characters collapses into a single `-`. The result holds at most
    /// [`MAX_SLUG_LENGTH`] characters and never starts or ends with `-`.
    /// Returns `None` when nothing alphanumeric remains.
    pub fn slugify(text: &str) -> Option<Self> {
        let ascii = deunicode::deunicode(text);
        let mut slug = String::with_capacity(ascii.len().min(MAX_SLUG_LENGTH));
        let mut pending_separator = false;

        for c in ascii.chars() {
            if !c.is_ascii_alphanumeric() {
                pending_separator = !slug.is_empty();
                continue;
            }
            if pending_separator {
                // A separator followed by nothing would have to be trimmed,
                // so only emit it if there is room for one more character.
                if slug.len() + 2 > MAX_SLUG_LENGTH {
                    break;
                }
                slug.push(SLUG_SEPARATOR);
                pending_separator = false;
            }
            if slug.len() == MAX_SLUG_LENGTH {
                break;
            }
            slug.push(c.to_ascii_lowercase());
        }

        if slug.is_empty() {
            None
        } else {
            Some(Self(slug))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BranchName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl TryFrom<String> for BranchName {
    type Error = ValidationError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl TryFrom<&str> for BranchName {
    type Error = ValidationError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<BranchName> for String {
    fn from(b: BranchName) -> Self {
        b.0
    }
}

// ---------------------------------------------------------------------------
// Change values
// ---------------------------------------------------------------------------

/// What an updater changed in one repository.
///
/// `title` becomes the commit subject and the pull request title;
/// `description` is appended to the commit message and used as the pull
/// request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeDescription {
    title: String,
    description: Option<String>,
    branch_name: Option<BranchName>,
}

impl ChangeDescription {
    pub fn new(title: impl Into<String>) -> Result<Self, ValidationError> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(ValidationError::EmptyTitle);
        }
        Ok(Self {
            title,
            description: None,
            branch_name: None,
        })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Push to this branch regardless of the configured branch-naming function.
    pub fn with_branch_name(mut self, branch: BranchName) -> Self {
        self.branch_name = Some(branch);
        self
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn branch_name(&self) -> Option<&BranchName> {
        self.branch_name.as_ref()
    }

    /// Commit message: the title, then a blank line and the description when
    /// one is present and non-empty.
    pub fn commit_message(&self) -> String {
        match self.description() {
            Some(description) if !description.is_empty() => {
                format!("{}\n\n{}", self.title, description)
            }
            _ => self.title.clone(),
        }
    }
}

/// Result of a successful changelist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangelistInformation {
    pub commit_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_url: Option<String>,
}

impl ChangelistInformation {
    pub fn new(commit_id: impl Into<String>, review_url: Option<String>) -> Self {
        Self {
            commit_id: commit_id.into(),
            review_url,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
