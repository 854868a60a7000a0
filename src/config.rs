//! Configuration for livepub.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (LIVEPUB_HOME, LIVEPUB_FLOWER_URL)
//! 2. Config file (.livepub/config.yaml)
//! 3. Defaults (~/.livepub, paths relative to the current directory)
//!
//! Config file discovery:
//! - Searches current directory and parents for .livepub/config.yaml
//! - Paths in config file are relative to the project root (the parent of .livepub/)

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::core::materializer::{validate_run_label, ManifestEntry, DEFAULT_VERSION_SLOT};
use crate::domain::FlowSettings;
use crate::queue::flower::DEFAULT_FLOWER_URL;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Name of the queued unit of work
pub const DEFAULT_TASK_NAME: &str = "run_flow";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub flow: Option<FlowFileConfig>,
    #[serde(default)]
    pub queue: Option<QueueFileConfig>,
    #[serde(default)]
    pub materialize: Option<MaterializeFileConfig>,
    #[serde(default)]
    pub render: Option<RenderFileConfig>,
    #[serde(default)]
    pub publish: Option<PublishFileConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// Engine state directory (queue, run journals)
    pub home: Option<String>,
    /// Template source root
    pub templates: Option<String>,
    /// Output root holding one directory per run label
    pub output: Option<String>,
    /// Working directory the crate is built in
    pub working_crate: Option<String>,
    /// Directory remote nodes deliver sub-crates into
    pub subcrates: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FlowFileConfig {
    /// Flow driver program and leading arguments
    #[serde(default)]
    pub driver: Vec<String>,
    #[serde(default)]
    pub endpoints: BTreeMap<String, String>,
    #[serde(default)]
    pub data_paths: BTreeMap<String, String>,
    #[serde(default)]
    pub intermediate_paths: BTreeMap<String, String>,
    /// Fixed orchestration node, instead of the local transfer endpoint
    pub orchestration_node: Option<String>,
    pub run_label: Option<String>,
    #[serde(default)]
    pub run_tags: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueBackend {
    #[default]
    Local,
    Flower,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueFileConfig {
    #[serde(default)]
    pub backend: QueueBackend,
    pub flower_url: Option<String>,
    pub task_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MaterializeFileConfig {
    pub version_slot: Option<String>,
    /// Replaces the built-in template manifest
    pub manifest: Option<Vec<ManifestEntry>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RenderFileConfig {
    pub quarto: Option<String>,
    pub render_file: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PublishFileConfig {
    pub repo: Option<String>,
    pub commit_message: Option<String>,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Engine state directory
    pub home: PathBuf,
    /// Template source root
    pub templates: PathBuf,
    /// Output root (one directory per run label)
    pub output: PathBuf,
    /// Working crate directory
    pub working_crate: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    /// Static flow settings
    pub flow: FlowSettings,
    /// Flow driver command line
    pub driver: Vec<String>,
    /// Orchestration node override
    pub orchestration_node: Option<String>,
    /// Queue settings
    pub queue: QueueSettings,
    /// Materialization settings
    pub materialize: MaterializeSettings,
    /// Rendering settings
    pub render: RenderSettings,
    /// Publishing settings
    pub publish: PublishSettings,
}

#[derive(Debug, Clone)]
pub struct QueueSettings {
    pub backend: QueueBackend,
    pub flower_url: String,
    pub task_name: String,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            backend: QueueBackend::Local,
            flower_url: DEFAULT_FLOWER_URL.to_string(),
            task_name: DEFAULT_TASK_NAME.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MaterializeSettings {
    pub version_slot: String,
    pub manifest: Option<Vec<ManifestEntry>>,
}

impl Default for MaterializeSettings {
    fn default() -> Self {
        Self {
            version_slot: DEFAULT_VERSION_SLOT.to_string(),
            manifest: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub quarto: String,
    pub render_file: String,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            quarto: "quarto".to_string(),
            render_file: "paper_render.html".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PublishSettings {
    /// Local clone of the publication repository
    pub repo: Option<PathBuf>,
    pub commit_message: String,
}

impl Default for PublishSettings {
    fn default() -> Self {
        Self {
            repo: None,
            commit_message: "push from editor".to_string(),
        }
    }
}

impl ResolvedConfig {
    /// Directory holding all output for the configured run label
    pub fn run_output_dir(&self) -> PathBuf {
        self.output.join(&self.flow.run_label)
    }

    /// Directory of the current materialized version
    pub fn version_dir(&self) -> PathBuf {
        self.run_output_dir().join(&self.materialize.version_slot)
    }

    /// Directory holding per-run journals
    pub fn runs_dir(&self) -> PathBuf {
        self.home.join("runs")
    }

    /// Directory of the local task queue
    pub fn queue_dir(&self) -> PathBuf {
        self.home.join("queue")
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".livepub").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to `base`
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let expanded = expand_home(path_str);
    if expanded.is_absolute() {
        expanded
    } else {
        base.join(expanded)
    }
}

/// Expand a leading `~/`
fn expand_home(path_str: &str) -> PathBuf {
    match (path_str.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path_str),
    }
}

/// Resolve configuration against a project root, with an optional config file
fn resolve(base_dir: &Path, config: Option<ConfigFile>, config_file: Option<PathBuf>) -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".livepub");

    let paths = config.as_ref().map(|c| c.paths.clone()).unwrap_or_default();
    let flow = config.as_ref().and_then(|c| c.flow.clone()).unwrap_or_default();

    let home = if let Ok(env_home) = std::env::var("LIVEPUB_HOME") {
        PathBuf::from(env_home)
    } else if let Some(ref home_path) = paths.home {
        resolve_path(base_dir, home_path)
    } else {
        default_home
    };

    let path_or = |value: &Option<String>, default: &str| {
        resolve_path(base_dir, value.as_deref().unwrap_or(default))
    };

    let templates = path_or(&paths.templates, "quarto_templates/LiD");
    let output = path_or(&paths.output, "generated_versions/LiD");
    let working_crate = path_or(&paths.working_crate, "orchestration_crate");
    let subcrates = path_or(&paths.subcrates, "sub_crates");

    let flow_settings = FlowSettings {
        endpoints: flow.endpoints,
        data_paths: flow.data_paths,
        intermediate_paths: flow.intermediate_paths,
        subcrate_path: subcrates,
        run_label: flow.run_label.unwrap_or_else(|| "LiDFlow run".to_string()),
        run_tags: flow.run_tags,
    };

    let queue = match config.as_ref().and_then(|c| c.queue.clone()) {
        Some(q) => QueueSettings {
            backend: q.backend,
            flower_url: q.flower_url.unwrap_or_else(|| DEFAULT_FLOWER_URL.to_string()),
            task_name: q.task_name.unwrap_or_else(|| DEFAULT_TASK_NAME.to_string()),
        },
        None => QueueSettings::default(),
    };
    let queue = match std::env::var("LIVEPUB_FLOWER_URL") {
        Ok(url) => QueueSettings {
            flower_url: url,
            ..queue
        },
        Err(_) => queue,
    };

    let materialize = match config.as_ref().and_then(|c| c.materialize.clone()) {
        Some(m) => MaterializeSettings {
            version_slot: m
                .version_slot
                .unwrap_or_else(|| DEFAULT_VERSION_SLOT.to_string()),
            manifest: m.manifest,
        },
        None => MaterializeSettings::default(),
    };

    validate_run_label(&flow_settings.run_label).context("Invalid flow.run_label")?;
    if validate_run_label(&materialize.version_slot).is_err() {
        bail!(
            "Invalid materialize.version_slot: {:?}",
            materialize.version_slot
        );
    }
    for entry in materialize.manifest.iter().flatten() {
        entry.validate().context("Invalid materialize.manifest entry")?;
    }

    let render_defaults = RenderSettings::default();
    let render = match config.as_ref().and_then(|c| c.render.clone()) {
        Some(r) => RenderSettings {
            quarto: r.quarto.unwrap_or(render_defaults.quarto),
            render_file: r.render_file.unwrap_or(render_defaults.render_file),
        },
        None => render_defaults,
    };

    let publish_defaults = PublishSettings::default();
    let publish = match config.as_ref().and_then(|c| c.publish.clone()) {
        Some(p) => PublishSettings {
            repo: p.repo.map(|r| resolve_path(base_dir, &r)),
            commit_message: p.commit_message.unwrap_or(publish_defaults.commit_message),
        },
        None => publish_defaults,
    };

    Ok(ResolvedConfig {
        home,
        templates,
        output,
        working_crate,
        config_file,
        flow: flow_settings,
        driver: flow.driver,
        orchestration_node: flow.orchestration_node,
        queue,
        materialize,
        render,
        publish,
    })
}

/// Load configuration from a specific config file
pub fn load_config_from(config_path: &Path) -> Result<ResolvedConfig> {
    let config = load_config_file(config_path)?;

    // Base directory is the parent of .livepub/ (i.e., grandparent of config.yaml)
    let base_dir = config_path
        .parent()
        .and_then(|p| p.parent())
        .unwrap_or(Path::new("."))
        .to_path_buf();

    resolve(&base_dir, Some(config), Some(config_path.to_path_buf()))
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    match find_config_file() {
        Some(config_path) => load_config_from(&config_path),
        None => {
            let cwd = std::env::current_dir().context("Failed to determine current directory")?;
            resolve(&cwd, None, None)
        }
    }
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| format!("{:#}", e)));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::materializer::EntryKind;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_config(temp: &TempDir, yaml: &str) -> PathBuf {
        let dir = temp.path().join(".livepub");
        std::fs::create_dir_all(&dir).unwrap();
        let config_path = dir.join("config.yaml");
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "{}", yaml).unwrap();
        config_path
    }

    #[test]
    fn test_config_file_parsing() {
        let temp = TempDir::new().unwrap();
        let config_path = write_config(
            &temp,
            r#"
version: "1.0"
paths:
  home: state
  templates: templates/LiD
flow:
  driver: ["lid-flow", "--verbose"]
  endpoints:
    FT_UUID: 5612672e-1ead-11ee-abf1-63e0d97254cd
  run_label: "LiDFlow run"
  run_tags: [LID, Orchestration, Test]
queue:
  backend: flower
  flower_url: http://queue:5555
materialize:
  version_slot: V1
  manifest:
    - { path: _extensions, kind: dir }
    - { path: index.qmd, kind: file }
"#,
        );

        let config = load_config_from(&config_path).unwrap();

        assert_eq!(config.templates, temp.path().join("templates/LiD"));
        assert_eq!(config.output, temp.path().join("generated_versions/LiD"));
        assert_eq!(config.flow.subcrate_path, temp.path().join("sub_crates"));
        assert_eq!(config.flow.run_tags, vec!["LID", "Orchestration", "Test"]);
        assert_eq!(config.driver, vec!["lid-flow", "--verbose"]);
        assert_eq!(config.queue.backend, QueueBackend::Flower);
        assert_eq!(config.queue.task_name, DEFAULT_TASK_NAME);
        assert_eq!(config.materialize.version_slot, "V1");

        let manifest = config.materialize.manifest.unwrap();
        assert_eq!(manifest.len(), 2);
        assert_eq!(manifest[0].kind, EntryKind::Dir);
    }

    #[test]
    fn test_defaults_without_sections() {
        let temp = TempDir::new().unwrap();
        let config_path = write_config(&temp, "version: \"1.0\"");

        let config = load_config_from(&config_path).unwrap();

        assert_eq!(config.queue.backend, QueueBackend::Local);
        assert_eq!(config.materialize.version_slot, DEFAULT_VERSION_SLOT);
        assert_eq!(config.render.render_file, "paper_render.html");
        assert_eq!(config.flow.run_label, "LiDFlow run");
        assert!(config.publish.repo.is_none());
    }

    #[test]
    fn test_output_layout() {
        let temp = TempDir::new().unwrap();
        let config_path = write_config(
            &temp,
            r#"
version: "1.0"
flow:
  run_label: V1
"#,
        );

        let config = load_config_from(&config_path).unwrap();
        assert_eq!(
            config.version_dir(),
            temp.path().join("generated_versions/LiD/V1/New_version")
        );
    }

    #[test]
    fn test_resolve_relative_path() {
        let base = PathBuf::from("/home/user/project");

        assert_eq!(
            resolve_path(&base, "./subdir"),
            PathBuf::from("/home/user/project/./subdir")
        );
        assert_eq!(
            resolve_path(&base, "/absolute/path"),
            PathBuf::from("/absolute/path")
        );
    }

    #[test]
    fn test_run_label_escaping_output_is_rejected() {
        let temp = TempDir::new().unwrap();

        for label in ["../../etc", "nested/label", "..", ""] {
            let config_path = write_config(
                &temp,
                &format!("version: \"1.0\"\nflow:\n  run_label: {label:?}\n"),
            );
            let err = load_config_from(&config_path).unwrap_err();
            assert!(
                format!("{err:#}").contains("run_label"),
                "label {label:?}: {err:#}"
            );
        }
    }

    #[test]
    fn test_manifest_escaping_templates_is_rejected() {
        let temp = TempDir::new().unwrap();
        let config_path = write_config(
            &temp,
            r#"
version: "1.0"
materialize:
  manifest:
    - { path: index.qmd, kind: file }
    - { path: /etc/passwd, kind: file }
"#,
        );
        let err = load_config_from(&config_path).unwrap_err();
        assert!(format!("{err:#}").contains("/etc/passwd"));

        let config_path = write_config(
            &temp,
            r#"
version: "1.0"
materialize:
  manifest:
    - { path: ../secrets, kind: dir }
"#,
        );
        assert!(load_config_from(&config_path).is_err());

        let config_path = write_config(
            &temp,
            r#"
version: "1.0"
materialize:
  version_slot: ../New_version
"#,
        );
        assert!(load_config_from(&config_path).is_err());
    }
}
