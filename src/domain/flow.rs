//! Flow configuration and result types.
//!
//! `FlowSettings` is the static, process-wide part loaded from config.
//! `FlowConfig` is built per run by combining it with the resolved
//! orchestration node; it is never mutated afterwards.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Static flow configuration shared by every run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlowSettings {
    /// Named remote processing endpoints (name -> endpoint id)
    #[serde(default)]
    pub endpoints: BTreeMap<String, String>,

    /// Source data locations
    #[serde(default)]
    pub data_paths: BTreeMap<String, String>,

    /// Hand-off locations between processing nodes
    #[serde(default)]
    pub intermediate_paths: BTreeMap<String, String>,

    /// Directory remote nodes deliver their sub-crates into
    pub subcrate_path: PathBuf,

    /// Label for the run (also names its output directory)
    pub run_label: String,

    /// Free-form tags attached to the run's crate
    #[serde(default)]
    pub run_tags: Vec<String>,
}

/// Immutable configuration of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowConfig {
    pub endpoints: BTreeMap<String, String>,
    pub data_paths: BTreeMap<String, String>,
    pub intermediate_paths: BTreeMap<String, String>,
    pub publication: PublicationConfig,
    pub run_label: String,
    pub run_tags: Vec<String>,
}

/// Live-publication specific part of the run configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicationConfig {
    /// Local transfer endpoint acting as orchestration node for this run
    pub orchestration_node: String,

    /// Where sub-crates are collected
    pub subcrate_path: PathBuf,
}

impl FlowConfig {
    /// Build the run configuration from static settings and the resolved
    /// orchestration node. The settings are left untouched.
    pub fn for_run(settings: &FlowSettings, orchestration_node: impl Into<String>) -> Self {
        Self {
            endpoints: settings.endpoints.clone(),
            data_paths: settings.data_paths.clone(),
            intermediate_paths: settings.intermediate_paths.clone(),
            publication: PublicationConfig {
                orchestration_node: orchestration_node.into(),
                subcrate_path: settings.subcrate_path.clone(),
            },
            run_label: settings.run_label.clone(),
            run_tags: settings.run_tags.clone(),
        }
    }
}

/// Identity of a flow driver, handed to the crate builder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowDescriptor {
    /// Driver name
    pub name: String,

    /// Remote run identifier, once the flow has been started
    pub remote_run_id: Option<String>,
}

/// Result payload of a completed flow, consumed by crate assembly
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationData {
    /// When the data was retrieved
    pub retrieved_at: DateTime<Utc>,

    /// Opaque structured result
    pub payload: serde_json::Value,
}

impl OrchestrationData {
    pub fn new(payload: serde_json::Value) -> Self {
        Self {
            retrieved_at: Utc::now(),
            payload,
        }
    }
}
