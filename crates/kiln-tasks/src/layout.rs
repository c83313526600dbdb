//! Source and destination layout, and explicit file selection.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::TaskError;

/// Fixed directory layout of a markup project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    /// Markup source root
    pub source: PathBuf,

    /// Generated output root
    pub output: PathBuf,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            source: PathBuf::from("markup"),
            output: PathBuf::from("dist"),
        }
    }
}

impl Layout {
    pub fn new(source: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            output: output.into(),
        }
    }

    /// `markup/assets/<kind>`
    pub fn asset_source(&self, kind: &str) -> PathBuf {
        self.source.join("assets").join(kind)
    }

    /// `dist/assets/<kind>`
    pub fn asset_output(&self, kind: &str) -> PathBuf {
        self.output.join("assets").join(kind)
    }

    /// `markup/html`
    pub fn html_source(&self) -> PathBuf {
        self.source.join("html")
    }

    /// Style sources, without the import-only directory.
    pub fn style_sources(&self) -> SourceSet {
        SourceSet::new(self.asset_source("css"))
            .with_extensions(&["scss", "sass", "css"])
            .excluding("import")
    }

    /// HTML pages, without the fragment directory.
    pub fn page_sources(&self) -> SourceSet {
        SourceSet::new(self.html_source()).excluding("include")
    }

    /// Every file of a verbatim-copied asset kind.
    pub fn asset_sources(&self, kind: &str) -> SourceSet {
        SourceSet::new(self.asset_source(kind))
    }
}

/// A selected file with its path relative to the selection root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub relative: PathBuf,
}

/// Recursive file selection under a root directory.
///
/// Selects every regular file below `root`, optionally restricted to a set of
/// extensions, skipping anything inside an excluded subdirectory.
#[derive(Debug, Clone)]
pub struct SourceSet {
    root: PathBuf,
    extensions: Vec<String>,
    exclude: Vec<PathBuf>,
}

impl SourceSet {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            extensions: Vec::new(),
            exclude: Vec::new(),
        }
    }

    /// Only select files with one of these extensions (case-insensitive).
    pub fn with_extensions(mut self, extensions: &[&str]) -> Self {
        self.extensions = extensions.iter().map(|e| e.to_ascii_lowercase()).collect();
        self
    }

    /// Skip the subdirectory `dir`, given relative to the root.
    pub fn excluding(mut self, dir: impl Into<PathBuf>) -> Self {
        self.exclude.push(dir.into());
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether `path` would be selected, without touching the filesystem.
    pub fn matches(&self, path: &Path) -> bool {
        let Ok(relative) = path.strip_prefix(&self.root) else {
            return false;
        };
        !self.is_excluded(relative) && self.has_extension(path)
    }

    fn is_excluded(&self, relative: &Path) -> bool {
        self.exclude.iter().any(|dir| relative.starts_with(dir))
    }

    fn has_extension(&self, path: &Path) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| self.extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
            .unwrap_or(false)
    }

    /// Walk the root and return every selected file, sorted by path.
    ///
    /// A missing root selects nothing. Unreadable entries are errors.
    pub fn files(&self) -> Result<Vec<SourceFile>, TaskError> {
        if !self.root.exists() {
            tracing::debug!("Source root {} does not exist", self.root.display());
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        let walker = WalkDir::new(&self.root)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                entry
                    .path()
                    .strip_prefix(&self.root)
                    .map(|rel| !self.is_excluded(rel))
                    .unwrap_or(true)
            });

        for entry in walker {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(&self.root).to_path_buf();
                TaskError::io(&path, e.into())
            })?;

            if !entry.file_type().is_file() || !self.has_extension(entry.path()) {
                continue;
            }

            let relative = entry
                .path()
                .strip_prefix(&self.root)
                .unwrap_or(entry.path())
                .to_path_buf();

            files.push(SourceFile {
                path: entry.path().to_path_buf(),
                relative,
            });
        }

        Ok(files)
    }
}
