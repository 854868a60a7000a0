//! Local Globus Connect Personal endpoint resolution.
//!
//! A personal endpoint stores its endpoint id in
//! `~/.globusonline/lta/client-id.txt`. A configured orchestration node
//! takes precedence over the local endpoint.

use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;

use super::EndpointResolver;

/// Resolves the orchestration node from the local personal endpoint
pub struct GcpEndpointResolver {
    /// Fixed endpoint id, bypassing the local lookup
    override_id: Option<String>,

    /// Location of the personal endpoint's id file
    client_id_path: PathBuf,
}

impl GcpEndpointResolver {
    /// Resolver reading the default id file
    pub fn new(override_id: Option<String>) -> Self {
        let client_id_path = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("~"))
            .join(".globusonline/lta/client-id.txt");

        Self {
            override_id,
            client_id_path,
        }
    }

    /// Resolver reading a custom id file
    pub fn with_client_id_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.client_id_path = path.into();
        self
    }
}

#[async_trait]
impl EndpointResolver for GcpEndpointResolver {
    async fn resolve_local_endpoint_id(&self) -> Result<String> {
        if let Some(ref id) = self.override_id {
            return Ok(id.clone());
        }

        let raw = tokio::fs::read_to_string(&self.client_id_path)
            .await
            .with_context(|| {
                format!(
                    "No local Globus Connect Personal endpoint ({} unreadable)",
                    self.client_id_path.display()
                )
            })?;

        let id = raw.trim();
        if id.is_empty() {
            anyhow::bail!(
                "Globus Connect Personal id file is empty: {}",
                self.client_id_path.display()
            );
        }

        Ok(id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_override_wins() {
        let resolver = GcpEndpointResolver::new(Some("ep-fixed".to_string()))
            .with_client_id_path("/does/not/exist");
        assert_eq!(resolver.resolve_local_endpoint_id().await.unwrap(), "ep-fixed");
    }

    #[tokio::test]
    async fn test_reads_client_id_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("client-id.txt");
        std::fs::write(&path, "105a24f4-2a94-11ee-8801-056a4e394379\n").unwrap();

        let resolver = GcpEndpointResolver::new(None).with_client_id_path(&path);
        assert_eq!(
            resolver.resolve_local_endpoint_id().await.unwrap(),
            "105a24f4-2a94-11ee-8801-056a4e394379"
        );
    }

    #[tokio::test]
    async fn test_missing_or_empty_file_fails() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("client-id.txt");

        let resolver = GcpEndpointResolver::new(None).with_client_id_path(&path);
        assert!(resolver.resolve_local_endpoint_id().await.is_err());

        std::fs::write(&path, "  \n").unwrap();
        assert!(resolver.resolve_local_endpoint_id().await.is_err());
    }
}
