//! Work units and filesystem discovery.
//!
//! An artifact is either a question asked directly or a file under review.
//! Discovery walks the submission root for two extension classes (primary
//! sources and companion documentation) in a fixed lexicographic order, so
//! two runs over the same tree enumerate identical artifact sequences.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{CritiqError, Result};

/// A unit of work submitted through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Artifact {
    /// A natural-language question asked directly.
    Question { text: String },
    /// A source or companion file to review.
    File { path: PathBuf },
}

impl Artifact {
    /// Create a question artifact.
    pub fn question(text: impl Into<String>) -> Self {
        Self::Question { text: text.into() }
    }

    /// Create a file artifact.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File { path: path.into() }
    }

    /// Stable identity used as the key in result collections.
    pub fn key(&self) -> String {
        match self {
            Self::Question { text } => text.clone(),
            Self::File { path } => path.display().to_string(),
        }
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Question { text } => write!(f, "question: {}", text),
            Self::File { path } => write!(f, "file: {}", path.display()),
        }
    }
}

/// The two extension classes discovery matches: primary source files and
/// companion documentation files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtensionClasses {
    /// Primary source extensions (with leading dot).
    pub sources: Vec<String>,
    /// Companion documentation extensions (with leading dot).
    pub docs: Vec<String>,
}

impl Default for ExtensionClasses {
    fn default() -> Self {
        Self {
            sources: vec![".R".to_string()],
            docs: vec![".Rmd".to_string()],
        }
    }
}

impl ExtensionClasses {
    /// Build classes from explicit extension lists.
    pub fn new(sources: Vec<String>, docs: Vec<String>) -> Self {
        Self { sources, docs }
    }

    /// Whether a path matches either class.
    pub fn matches(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            return false;
        };
        self.sources
            .iter()
            .chain(self.docs.iter())
            .any(|ext| name.ends_with(ext.as_str()))
    }
}

/// Discover review artifacts under `root`.
///
/// Enumeration is deterministic: paths are sorted lexicographically before
/// being returned. A missing root is an error, never an empty result.
pub fn discover(root: &Path, classes: &ExtensionClasses, recursive: bool) -> Result<Vec<Artifact>> {
    if !root.is_dir() {
        return Err(CritiqError::ArtifactNotFound(root.display().to_string()));
    }

    let pattern = if recursive {
        root.join("**").join("*")
    } else {
        root.join("*")
    };
    let pattern = pattern.to_string_lossy().into_owned();

    let mut paths: Vec<PathBuf> = glob::glob(&pattern)
        .map_err(|e| CritiqError::ArtifactNotFound(format!("{}: {}", root.display(), e)))?
        .filter_map(std::result::Result::ok)
        .filter(|p| p.is_file() && classes.matches(p))
        .collect();

    paths.sort();
    log::debug!("discovered {} artifacts under {}", paths.len(), root.display());

    Ok(paths.into_iter().map(Artifact::file).collect())
}
