//! Artifact materialization.
//!
//! Turns a freshly built orchestration crate into a versioned output
//! directory: template resources listed in a manifest plus the crate, copied
//! into a hidden staging directory next to the final slot and renamed into
//! place only once every copy has succeeded. A failed materialization leaves
//! no version directory behind.

use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use super::tree::{copy_tree, remove_tree_if_exists};
use crate::config::ResolvedConfig;
use crate::error::MaterializeError;

/// Version slot used for every run
pub const DEFAULT_VERSION_SLOT: &str = "New_version";

/// Name of the crate subdirectory inside a version
pub const CRATE_DIR_NAME: &str = "orchestration_crate";

/// Whether a manifest entry is a single file or a directory tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    File,
    Dir,
}

/// One template resource, relative to the template root.
/// It lands at the same relative path inside the version directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub path: PathBuf,
    pub kind: EntryKind,
}

impl ManifestEntry {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::File,
        }
    }

    pub fn dir(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::Dir,
        }
    }

    /// Entries must stay below both the template root and the version
    /// directory: non-empty, relative, and free of `.`/`..` components.
    pub fn validate(&self) -> Result<(), MaterializeError> {
        let path = self.path.as_path();
        let contained = !path.as_os_str().is_empty()
            && path.components().all(|c| matches!(c, Component::Normal(_)));

        if contained {
            Ok(())
        } else {
            Err(MaterializeError::InvalidManifestEntry(self.path.clone()))
        }
    }
}

/// A run label names exactly one directory under the output root
pub fn validate_run_label(run_label: &str) -> Result<(), MaterializeError> {
    let mut components = Path::new(run_label).components();
    let single = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    );

    if single && !run_label.contains(['/', '\\']) {
        Ok(())
    } else {
        Err(MaterializeError::InvalidRunLabel(run_label.to_string()))
    }
}

/// Template resources of a publication: two asset directories, the site
/// configuration, the overview figure, the article and its bibliography.
pub fn default_manifest() -> Vec<ManifestEntry> {
    vec![
        ManifestEntry::dir("_extensions"),
        ManifestEntry::dir("index_files"),
        ManifestEntry::file("_quarto.yml"),
        ManifestEntry::file("globus-overview.svg"),
        ManifestEntry::file("index.qmd"),
        ManifestEntry::file("references.bib"),
    ]
}

/// Builds versioned output directories
#[derive(Debug, Clone)]
pub struct Materializer {
    /// Where template resources are copied from
    template_root: PathBuf,

    /// Output root holding one directory per run label
    output_root: PathBuf,

    /// Working crate directory, consumed by materialization
    working_crate: PathBuf,

    /// Name of the version directory under the run directory
    version_slot: String,

    /// Template resources to copy
    manifest: Vec<ManifestEntry>,
}

impl Materializer {
    /// Create a materializer with the default slot and manifest
    pub fn new(
        template_root: impl Into<PathBuf>,
        output_root: impl Into<PathBuf>,
        working_crate: impl Into<PathBuf>,
    ) -> Self {
        Self {
            template_root: template_root.into(),
            output_root: output_root.into(),
            working_crate: working_crate.into(),
            version_slot: DEFAULT_VERSION_SLOT.to_string(),
            manifest: default_manifest(),
        }
    }

    /// Create from resolved configuration
    pub fn from_config(config: &ResolvedConfig) -> Self {
        let materializer = Self::new(&config.templates, &config.output, &config.working_crate)
            .with_version_slot(config.materialize.version_slot.clone());

        match &config.materialize.manifest {
            Some(manifest) => materializer.with_manifest(manifest.clone()),
            None => materializer,
        }
    }

    pub fn with_version_slot(mut self, slot: impl Into<String>) -> Self {
        self.version_slot = slot.into();
        self
    }

    pub fn with_manifest(mut self, manifest: Vec<ManifestEntry>) -> Self {
        self.manifest = manifest;
        self
    }

    pub fn manifest(&self) -> &[ManifestEntry] {
        &self.manifest
    }

    /// Directory holding all output for `run_label`
    pub fn run_dir(&self, run_label: &str) -> PathBuf {
        self.output_root.join(run_label)
    }

    /// Version directory for `run_label`
    pub fn version_dir(&self, run_label: &str) -> PathBuf {
        self.run_dir(run_label).join(&self.version_slot)
    }

    /// Working crate directory
    pub fn working_crate(&self) -> &Path {
        &self.working_crate
    }

    /// Materialize the working crate as the version for `run_label`
    #[instrument(skip(self))]
    pub async fn materialize(&self, run_label: &str) -> Result<PathBuf, MaterializeError> {
        let this = self.clone();
        let label = run_label.to_string();

        tokio::task::spawn_blocking(move || this.materialize_blocking(&label))
            .await
            .map_err(|e| MaterializeError::Io {
                path: self.version_dir(run_label),
                source: std::io::Error::other(e),
            })?
    }

    fn materialize_blocking(&self, run_label: &str) -> Result<PathBuf, MaterializeError> {
        validate_run_label(run_label)?;
        for entry in &self.manifest {
            entry.validate()?;
        }

        let target = self.version_dir(run_label);
        if target.exists() {
            return Err(MaterializeError::VersionExists(target));
        }
        if !self.working_crate.is_dir() {
            return Err(MaterializeError::MissingCrate(self.working_crate.clone()));
        }

        let run_dir = self.run_dir(run_label);
        fs::create_dir_all(&run_dir).map_err(|source| MaterializeError::Io {
            path: run_dir.clone(),
            source,
        })?;

        // Dropped on every early return, taking partial content with it
        let staging = tempfile::Builder::new()
            .prefix(".staging-")
            .tempdir_in(&run_dir)
            .map_err(|source| MaterializeError::Io {
                path: run_dir.clone(),
                source,
            })?;

        for entry in &self.manifest {
            self.copy_entry(entry, staging.path())?;
        }

        let crate_target = staging.path().join(CRATE_DIR_NAME);
        let files = copy_tree(&self.working_crate, &crate_target).map_err(|source| {
            MaterializeError::Copy {
                from: self.working_crate.clone(),
                to: crate_target.clone(),
                source,
            }
        })?;
        debug!(files, "Copied orchestration crate");

        fs::rename(staging.path(), &target).map_err(|source| MaterializeError::Io {
            path: target.clone(),
            source,
        })?;
        open_permissions(&target)?;

        remove_tree_if_exists(&self.working_crate).map_err(|source| MaterializeError::Io {
            path: self.working_crate.clone(),
            source,
        })?;

        info!(version_dir = %target.display(), "Materialized output version");
        Ok(target)
    }

    fn copy_entry(&self, entry: &ManifestEntry, staging: &Path) -> Result<(), MaterializeError> {
        let from = self.template_root.join(&entry.path);
        let to = staging.join(&entry.path);

        match entry.kind {
            EntryKind::Dir => {
                if !from.is_dir() {
                    return Err(MaterializeError::MissingTemplate(from));
                }
                copy_tree(&from, &to).map_err(|source| MaterializeError::Copy {
                    from: from.clone(),
                    to: to.clone(),
                    source,
                })?;
            }
            EntryKind::File => {
                if !from.is_file() {
                    return Err(MaterializeError::MissingTemplate(from));
                }
                if let Some(parent) = to.parent() {
                    fs::create_dir_all(parent).map_err(|source| MaterializeError::Io {
                        path: parent.to_path_buf(),
                        source,
                    })?;
                }
                fs::copy(&from, &to).map_err(|source| MaterializeError::Copy {
                    from: from.clone(),
                    to: to.clone(),
                    source,
                })?;
            }
        }

        Ok(())
    }
}

/// Staging directories are created owner-only; published output is not.
#[cfg(unix)]
fn open_permissions(path: &Path) -> Result<(), MaterializeError> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).map_err(|source| {
        MaterializeError::Io {
            path: path.to_path_buf(),
            source,
        }
    })
}

#[cfg(not(unix))]
fn open_permissions(_path: &Path) -> Result<(), MaterializeError> {
    Ok(())
}
