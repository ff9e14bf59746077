//! Scoped temporary storage
//!
//! A [`Workspace`] holds one target's resampled labels under
//! `<temp_root>/mafl-XXXXXX/labels/`. The directory is removed by
//! [`Workspace::release`], or by drop on any path that never reaches it, so a
//! failed or panicking run cannot leak temporary storage.
//!
//! The [`TemplateLabelCache`] is populated once per run, before any target is
//! planned, and shared read-only by every target.

use crate::command::{path_arg, CommandKey, PlannedCommand};
use crate::error::{Phase, Result, VoteError};
use crate::executor::CommandExecutor;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const WORKSPACE_PREFIX: &str = "mafl-";

/// Exclusively owned temporary directory tree for one run
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
    labels_dir: PathBuf,
}

impl Workspace {
    /// Allocate a fresh directory under `parent` with a `labels/` subtree
    pub fn acquire(parent: &Path) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix(WORKSPACE_PREFIX)
            .tempdir_in(parent)
            .map_err(|source| VoteError::Workspace {
                path: parent.to_path_buf(),
                source,
            })?;

        let labels_dir = dir.path().join("labels");
        ensure_dir(&labels_dir)?;

        tracing::debug!(path = %dir.path().display(), "Workspace acquired");

        Ok(Self { dir, labels_dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// `labels/` subtree for resampled label volumes
    pub fn labels_dir(&self) -> &Path {
        &self.labels_dir
    }

    /// Recursively delete the workspace
    pub fn release(self) -> Result<()> {
        let path = self.dir.path().to_path_buf();
        self.dir
            .close()
            .map_err(|source| VoteError::Workspace {
                path: path.clone(),
                source,
            })?;
        tracing::debug!(path = %path.display(), "Workspace released");
        Ok(())
    }
}

/// Create `path` and its parents, tolerating an existing directory
pub fn ensure_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|source| VoteError::Workspace {
        path: path.to_path_buf(),
        source,
    })
}

/// Template-space label volumes shared by every target of a run
#[derive(Debug)]
pub enum TemplateLabelCache {
    /// Extracted from an archive into a run-scoped workspace
    Extracted { workspace: Workspace },
    /// Pre-extracted directory used in place and never deleted
    InPlace { root: PathBuf },
}

impl TemplateLabelCache {
    /// Populate the cache from `source`
    ///
    /// A directory is used as-is. Anything else is treated as an archive and
    /// unpacked with `<extract_tool> xzf <source> -C <workspace>` through
    /// `executor`; an extraction failure is fatal for the run.
    pub async fn prepare(
        source: &Path,
        temp_root: &Path,
        executor: &dyn CommandExecutor,
        extract_tool: &str,
    ) -> Result<Self> {
        if source.is_dir() {
            tracing::info!(path = %source.display(), "Using template label directory in place");
            return Ok(Self::InPlace {
                root: source.to_path_buf(),
            });
        }

        let workspace = Workspace::acquire(temp_root)?;
        let command = extract_command(source, workspace.path(), extract_tool);

        tracing::info!(
            archive = %source.display(),
            into = %workspace.path().display(),
            "Extracting template labels"
        );

        if let Err(failure) = executor.execute(&command).await {
            tracing::error!(error = %failure, "Template label extraction failed");
            if let Err(e) = workspace.release() {
                tracing::warn!(error = %e, "Failed to clean up template label cache");
            }
            return Err(VoteError::BatchFailed {
                phase: Phase::Extract,
                total: 1,
                failures: vec![failure],
            });
        }

        Ok(Self::Extracted { workspace })
    }

    pub fn root(&self) -> &Path {
        match self {
            Self::Extracted { workspace } => workspace.path(),
            Self::InPlace { root } => root,
        }
    }

    /// `<root>/labels`, laid out as `<atlas>/<template>/labels.mnc`
    pub fn labels_dir(&self) -> PathBuf {
        self.root().join("labels")
    }

    /// Delete an extracted cache; an in-place directory is left untouched
    pub fn release(self) -> Result<()> {
        match self {
            Self::Extracted { workspace } => workspace.release(),
            Self::InPlace { .. } => Ok(()),
        }
    }
}

fn extract_command(archive: &Path, into: &Path, extract_tool: &str) -> PlannedCommand {
    PlannedCommand::new(
        CommandKey::Extract {
            archive: archive.to_path_buf(),
        },
        extract_tool,
        vec![
            "xzf".to_string(),
            path_arg(archive),
            "-C".to_string(),
            path_arg(into),
        ],
        into.join("labels"),
    )
}
