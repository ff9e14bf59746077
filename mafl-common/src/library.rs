//! Template library discovery
//!
//! Images are found by directory convention:
//!
//! ```text
//! <input_dir>/<role>/brains/<stem>.<ext>
//! <input_dir>/<role>/labels/<stem>_labels.<ext>   (optional)
//! ```
//!
//! Each role (atlases, templates, subjects) is scanned once at startup and is
//! read-only afterwards. The stem is the join key everywhere downstream.

use crate::{Error, Result};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Role an image plays in the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageRole {
    Atlas,
    Template,
    Target,
}

impl ImageRole {
    /// Directory name of the role under the input root
    pub fn dir_name(&self) -> &'static str {
        match self {
            ImageRole::Atlas => "atlases",
            ImageRole::Template => "templates",
            ImageRole::Target => "subjects",
        }
    }
}

impl fmt::Display for ImageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ImageRole::Atlas => "atlas",
            ImageRole::Template => "template",
            ImageRole::Target => "target",
        };
        f.write_str(name)
    }
}

/// An intensity image with an optional label volume
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageEntity {
    stem: String,
    image: PathBuf,
    labels: Option<PathBuf>,
}

impl ImageEntity {
    /// Build an entity, resolving the label volume by naming convention
    ///
    /// The stem and the `labels/` lookup use the canonical image path, so a
    /// symlinked image takes the stem of the file it points to.
    pub fn new(image: impl Into<PathBuf>, extension: &str) -> Self {
        let image = image.into();
        let real = image.canonicalize().unwrap_or_else(|_| image.clone());
        let stem = stem_of(&real, Some(extension));

        let labels = real
            .parent()
            .and_then(Path::parent)
            .map(|root| root.join("labels").join(format!("{}_labels.{}", stem, extension)))
            .filter(|candidate| candidate.is_file());

        Self { stem, image, labels }
    }

    /// Build an entity with an explicit label volume
    pub fn with_labels(image: impl Into<PathBuf>, labels: impl Into<PathBuf>) -> Self {
        let image = image.into();
        let stem = stem_of(&image, None);
        Self {
            stem,
            image,
            labels: Some(labels.into()),
        }
    }

    pub fn stem(&self) -> &str {
        &self.stem
    }

    pub fn image(&self) -> &Path {
        &self.image
    }

    pub fn labels(&self) -> Option<&Path> {
        self.labels.as_deref()
    }
}

/// File name without `.<extension>`, which may span several dots (`nii.gz`)
///
/// Falls back to the last-dot stem when the name does not carry the extension.
fn stem_of(path: &Path, extension: Option<&str>) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    if let Some(stem) = extension.and_then(|ext| strip_extension(&name, ext)) {
        return stem.to_string();
    }

    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn strip_extension<'a>(name: &'a str, extension: &str) -> Option<&'a str> {
    name.strip_suffix(extension)
        .and_then(|rest| rest.strip_suffix('.'))
        .filter(|stem| !stem.is_empty())
}

/// Scans role directories for images
#[derive(Debug, Clone)]
pub struct TemplateRepository {
    extension: String,
}

impl TemplateRepository {
    /// Create a repository matching files with the given extension (no dot)
    pub fn new(extension: impl Into<String>) -> Self {
        Self {
            extension: extension.into().trim_start_matches('.').to_string(),
        }
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Scan `root/brains/*.<ext>` and return the images sorted by file name
    ///
    /// Fails only when `root` itself does not exist. A missing `brains/`
    /// directory or an empty one yields an empty list.
    pub fn load(&self, root: &Path, role: ImageRole) -> Result<Vec<ImageEntity>> {
        if !root.exists() {
            return Err(Error::Discovery {
                path: root.to_path_buf(),
            });
        }

        let brains = root.join("brains");
        if !brains.is_dir() {
            tracing::warn!(
                role = %role,
                path = %brains.display(),
                "No brains/ directory, role is empty"
            );
            return Ok(Vec::new());
        }

        let walker = WalkDir::new(&brains)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name();

        let mut seen = HashSet::new();
        let mut entities = Vec::new();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Error accessing entry: {}", e);
                    continue;
                }
            };

            let path = entry.path();
            if !path.is_file() || !self.matches_extension(path) {
                continue;
            }

            let entity = ImageEntity::new(path, &self.extension);
            if !seen.insert(entity.stem().to_string()) {
                tracing::warn!(
                    role = %role,
                    stem = entity.stem(),
                    path = %path.display(),
                    "Duplicate stem ignored"
                );
                continue;
            }
            entities.push(entity);
        }

        tracing::debug!(
            role = %role,
            root = %root.display(),
            count = entities.len(),
            "Discovery complete"
        );

        Ok(entities)
    }

    fn matches_extension(&self, path: &Path) -> bool {
        path.file_name()
            .map(|name| strip_extension(&name.to_string_lossy(), &self.extension).is_some())
            .unwrap_or(false)
    }
}

/// Atlases, templates and targets discovered once at startup
#[derive(Debug, Clone, Default)]
pub struct TemplateLibrary {
    pub atlases: Vec<ImageEntity>,
    pub templates: Vec<ImageEntity>,
    pub targets: Vec<ImageEntity>,
}

impl TemplateLibrary {
    pub fn new(
        atlases: Vec<ImageEntity>,
        templates: Vec<ImageEntity>,
        targets: Vec<ImageEntity>,
    ) -> Self {
        Self {
            atlases,
            templates,
            targets,
        }
    }

    /// Load all three roles from `<input_dir>/<role dir>`
    pub fn load(repository: &TemplateRepository, input_dir: &Path) -> Result<Self> {
        let load_role = |role: ImageRole| repository.load(&input_dir.join(role.dir_name()), role);

        Ok(Self {
            atlases: load_role(ImageRole::Atlas)?,
            templates: load_role(ImageRole::Template)?,
            targets: load_role(ImageRole::Target)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stem_from_file_name() {
        let entity = ImageEntity::with_labels("/data/brains/subject01.mnc", "/x.mnc");
        assert_eq!(entity.stem(), "subject01");
        assert_eq!(entity.labels(), Some(Path::new("/x.mnc")));
    }

    #[test]
    fn test_missing_file_has_no_labels() {
        let entity = ImageEntity::new("/nonexistent/brains/a.mnc", "mnc");
        assert_eq!(entity.stem(), "a");
        assert!(entity.labels().is_none());
    }

    #[test]
    fn test_multi_part_extension_stem() {
        let entity = ImageEntity::new("/nonexistent/brains/T1.nii.gz", "nii.gz");
        assert_eq!(entity.stem(), "T1");
        assert_eq!(strip_extension("T1.nii.gz", "gz"), Some("T1.nii"));
        assert_eq!(strip_extension(".nii.gz", "nii.gz"), None);
        assert_eq!(strip_extension("T1nii.gz", "nii.gz"), None);
    }

    #[test]
    fn test_extension_leading_dot_stripped() {
        assert_eq!(TemplateRepository::new(".mnc").extension(), "mnc");
    }

    #[test]
    fn test_role_dir_names() {
        assert_eq!(ImageRole::Atlas.dir_name(), "atlases");
        assert_eq!(ImageRole::Template.dir_name(), "templates");
        assert_eq!(ImageRole::Target.dir_name(), "subjects");
    }
}
