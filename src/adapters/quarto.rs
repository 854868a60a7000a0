//! Rendering of a materialized version with Quarto.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::{Context, Result};
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::RenderSettings;

/// Entry document of a version directory
pub const INDEX_DOCUMENT: &str = "index.qmd";

/// Renders `index.qmd` of a version directory to a single HTML file
#[derive(Debug, Clone)]
pub struct QuartoRenderer {
    binary: String,
    render_file: String,
}

impl QuartoRenderer {
    pub fn new(binary: impl Into<String>, render_file: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            render_file: render_file.into(),
        }
    }

    pub fn from_settings(settings: &RenderSettings) -> Self {
        Self::new(&settings.quarto, &settings.render_file)
    }

    /// Path the rendered output lands at for `version_dir`
    pub fn output_path(&self, version_dir: &Path) -> PathBuf {
        version_dir.join(&self.render_file)
    }

    /// Render the version, returning the path of the rendered file
    pub async fn render(&self, version_dir: &Path) -> Result<PathBuf> {
        if !version_dir.is_dir() {
            anyhow::bail!("Version directory not found: {}", version_dir.display());
        }
        if !version_dir.join(INDEX_DOCUMENT).is_file() {
            anyhow::bail!(
                "No {} in version directory {}",
                INDEX_DOCUMENT,
                version_dir.display()
            );
        }

        debug!(dir = %version_dir.display(), "Running quarto render");

        let output = Command::new(&self.binary)
            .args(["render", INDEX_DOCUMENT, "--to", "html", "--output"])
            .arg(&self.render_file)
            .arg("--execute")
            .current_dir(version_dir)
            .stdin(Stdio::null())
            .output()
            .await
            .with_context(|| format!("Failed to spawn '{}'", self.binary))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "quarto render failed with exit code {}: {}",
                output.status.code().unwrap_or(-1),
                stderr.trim()
            );
        }

        let rendered = self.output_path(version_dir);
        info!(file = %rendered.display(), "Rendered version");
        Ok(rendered)
    }
}
