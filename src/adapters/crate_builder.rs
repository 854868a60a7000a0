//! Orchestration crate assembly on disk.
//!
//! The crate is an RO-Crate style directory: `ro-crate-metadata.json`
//! describing the run, `orchestration_data.json` with the flow's result data,
//! and the sub-crates delivered by the remote processing nodes under
//! `sub_crates/`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use tracing::{debug, info};

use super::{CrateBuilder, CrateBuilderFactory, CrateRequest};
use crate::core::tree::{copy_tree, remove_tree_if_exists};
use crate::domain::{FlowDescriptor, OrchestrationData};

pub const METADATA_FILE: &str = "ro-crate-metadata.json";
pub const DATA_FILE: &str = "orchestration_data.json";
pub const SUBCRATES_DIR: &str = "sub_crates";

/// Creates `DirCrateBuilder`s
#[derive(Debug, Clone, Default)]
pub struct DirCrateFactory;

impl CrateBuilderFactory for DirCrateFactory {
    fn create<'a>(&self, request: CrateRequest<'a>) -> Result<Box<dyn CrateBuilder + 'a>> {
        Ok(Box::new(DirCrateBuilder {
            flow: request.flow,
            data: request.data,
            destination: request.destination.to_path_buf(),
            run_label: request.run_label.to_string(),
            run_tags: request.run_tags.to_vec(),
            subcrate_path: request.subcrate_path.to_path_buf(),
        }))
    }
}

/// Builds the orchestration crate of one run
pub struct DirCrateBuilder<'a> {
    flow: FlowDescriptor,
    data: &'a OrchestrationData,
    destination: PathBuf,
    run_label: String,
    run_tags: Vec<String>,
    subcrate_path: PathBuf,
}

impl DirCrateBuilder<'_> {
    /// RO-Crate metadata document for the run
    fn metadata(&self, subcrates: &[String]) -> Value {
        let mut has_part = vec![json!({ "@id": DATA_FILE })];
        let mut graph = vec![
            json!({
                "@id": METADATA_FILE,
                "@type": "CreativeWork",
                "conformsTo": { "@id": "https://w3id.org/ro/crate/1.1" },
                "about": { "@id": "./" }
            }),
            json!({
                "@id": DATA_FILE,
                "@type": "File",
                "encodingFormat": "application/json",
                "dateCreated": self.data.retrieved_at.to_rfc3339()
            }),
            json!({
                "@id": "#flow",
                "@type": "SoftwareApplication",
                "name": self.flow.name,
                "identifier": self.flow.remote_run_id
            }),
        ];

        for name in subcrates {
            let id = format!("{}/{}/", SUBCRATES_DIR, name);
            has_part.push(json!({ "@id": id }));
            graph.push(json!({ "@id": id, "@type": "Dataset", "name": name }));
        }

        graph.insert(
            1,
            json!({
                "@id": "./",
                "@type": "Dataset",
                "name": self.run_label,
                "keywords": self.run_tags,
                "datePublished": Utc::now().to_rfc3339(),
                "mainEntity": { "@id": "#flow" },
                "hasPart": has_part
            }),
        );

        json!({
            "@context": "https://w3id.org/ro/crate/1.1/context",
            "@graph": graph
        })
    }
}

/// Names of the sub-crates delivered so far
fn subcrate_names(dir: &Path) -> Result<Vec<String>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut names = Vec::new();
    for entry in
        std::fs::read_dir(dir).with_context(|| format!("Failed to list {}", dir.display()))?
    {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
    }
    names.sort();
    Ok(names)
}

async fn write_json(path: &Path, value: &impl serde::Serialize) -> Result<()> {
    let content = serde_json::to_vec_pretty(value).context("Failed to serialize crate file")?;
    tokio::fs::write(path, content)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))
}

#[async_trait]
impl<'a> CrateBuilder for DirCrateBuilder<'a> {
    async fn build_crate(&mut self) -> Result<()> {
        let stale = self.destination.clone();
        let removed = tokio::task::spawn_blocking(move || remove_tree_if_exists(&stale))
            .await
            .context("Working crate removal task panicked")?
            .with_context(|| format!("Failed to remove {}", self.destination.display()))?;
        if removed {
            debug!(path = %self.destination.display(), "Removed stale working crate");
        }
        tokio::fs::create_dir_all(&self.destination)
            .await
            .with_context(|| format!("Failed to create {}", self.destination.display()))?;

        write_json(&self.destination.join(DATA_FILE), self.data).await?;

        let staged = self.subcrate_path.clone();
        let subcrates = tokio::task::spawn_blocking(move || subcrate_names(&staged))
            .await
            .context("Sub-crate listing task panicked")??;
        if !subcrates.is_empty() {
            let from = self.subcrate_path.clone();
            let to = self.destination.join(SUBCRATES_DIR);
            let files = tokio::task::spawn_blocking(move || copy_tree(&from, &to))
                .await
                .context("Sub-crate copy task panicked")?
                .context("Failed to copy sub-crates")?;
            debug!(files, "Copied sub-crates");
        }

        write_json(&self.destination.join(METADATA_FILE), &self.metadata(&subcrates)).await?;

        info!(
            path = %self.destination.display(),
            subcrates = subcrates.len(),
            "Built orchestration crate"
        );
        Ok(())
    }

    fn clean_up(&mut self) -> Result<()> {
        if remove_tree_if_exists(&self.subcrate_path)
            .with_context(|| format!("Failed to remove {}", self.subcrate_path.display()))?
        {
            debug!(path = %self.subcrate_path.display(), "Removed sub-crate staging");
        }
        Ok(())
    }
}
