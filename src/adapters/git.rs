//! Publishing rendered output through a git repository.
//!
//! The publication repository is a local clone whose `index.html` is served
//! as the live paper. Publishing discards local changes in the clone.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::PublishSettings;

/// File the rendered paper is published as
pub const PUBLISHED_FILE: &str = "index.html";

/// Result of a publish attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishOutcome {
    /// Rendered file committed and pushed
    Published,
    /// Nothing has been rendered yet
    NoRenderFile,
}

/// Publishes a rendered file to a git repository
#[derive(Debug, Clone)]
pub struct GitPublisher {
    repo: PathBuf,
    commit_message: String,
}

impl GitPublisher {
    pub fn new(repo: impl Into<PathBuf>, commit_message: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            commit_message: commit_message.into(),
        }
    }

    pub fn from_settings(settings: &PublishSettings) -> Result<Self> {
        let repo = settings
            .repo
            .clone()
            .context("No publication repository configured (publish.repo)")?;
        Ok(Self::new(repo, &settings.commit_message))
    }

    async fn git(&self, args: &[&str]) -> Result<()> {
        debug!(?args, "Running git");

        let output = Command::new("git")
            .args(args)
            .current_dir(&self.repo)
            .output()
            .await
            .context("Failed to spawn git")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "git {} failed with exit code {}: {}",
                args.first().copied().unwrap_or_default(),
                output.status.code().unwrap_or(-1),
                stderr.trim()
            );
        }
        Ok(())
    }

    /// Sync the clone with its remote, replace `index.html` with
    /// `render_file` and push the change
    pub async fn publish(&self, render_file: &Path) -> Result<PublishOutcome> {
        if !render_file.is_file() {
            warn!(file = %render_file.display(), "No rendered file to publish");
            return Ok(PublishOutcome::NoRenderFile);
        }
        if !self.repo.is_dir() {
            anyhow::bail!("Publication repository not found: {}", self.repo.display());
        }

        self.git(&["fetch"]).await?;
        self.git(&["reset", "--hard"]).await?;
        self.git(&["pull"]).await?;

        let target = self.repo.join(PUBLISHED_FILE);
        tokio::fs::copy(render_file, &target)
            .await
            .with_context(|| {
                format!(
                    "Failed to copy {} to {}",
                    render_file.display(),
                    target.display()
                )
            })?;

        self.git(&["add", PUBLISHED_FILE]).await?;
        self.git(&["commit", "-m", &self.commit_message]).await?;
        self.git(&["push"]).await?;

        info!(repo = %self.repo.display(), "Published rendered paper");
        Ok(PublishOutcome::Published)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_render_file() {
        let temp = TempDir::new().unwrap();
        let publisher = GitPublisher::new(temp.path().join("repo"), "push from editor");

        let outcome = publisher
            .publish(&temp.path().join("paper_render.html"))
            .await
            .unwrap();
        assert_eq!(outcome, PublishOutcome::NoRenderFile);
    }

    #[tokio::test]
    async fn test_missing_repository() {
        let temp = TempDir::new().unwrap();
        let render_file = temp.path().join("paper_render.html");
        std::fs::write(&render_file, "<html></html>").unwrap();
        let publisher = GitPublisher::new(temp.path().join("repo"), "push from editor");

        let err = publisher.publish(&render_file).await.unwrap_err();
        assert!(err.to_string().contains("Publication repository not found"));
    }

    #[test]
    fn test_requires_configured_repo() {
        assert!(GitPublisher::from_settings(&PublishSettings::default()).is_err());
    }

    #[test]
    fn test_outcome_serialization() {
        let json = serde_json::to_string(&PublishOutcome::NoRenderFile).unwrap();
        assert_eq!(json, "\"no_render_file\"");
    }
}
