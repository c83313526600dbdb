//! HTML page expansion.

use std::fs;
use std::path::{Path, PathBuf};

use kiln_ssi::Includer;
use rayon::prelude::*;

use crate::error::TaskError;
use crate::layout::{SourceFile, SourceSet};

const PAGE_EXTENSIONS: &[&str] = &["html", "htm", "shtml"];

/// Result of the page task.
#[derive(Debug, Default, Clone)]
pub struct PageReport {
    /// Expanded pages written
    pub pages: Vec<PathBuf>,

    /// Non-page files copied through unchanged
    pub copied: Vec<PathBuf>,
}

enum Written {
    Page(PathBuf),
    Copied(PathBuf),
}

/// Expand includes in every selected page and write it under `dest`.
///
/// Files that are not HTML are copied through. A missing fragment fails the
/// whole task.
pub fn expand_pages(
    set: &SourceSet,
    includer: &Includer,
    dest: &Path,
) -> Result<PageReport, TaskError> {
    let files = set.files()?;

    let written: Vec<Written> = files
        .par_iter()
        .map(|file| write_page(file, includer, dest))
        .collect::<Result<_, TaskError>>()?;

    let mut report = PageReport::default();
    for item in written {
        match item {
            Written::Page(path) => report.pages.push(path),
            Written::Copied(path) => report.copied.push(path),
        }
    }

    Ok(report)
}

fn write_page(file: &SourceFile, includer: &Includer, dest: &Path) -> Result<Written, TaskError> {
    let target = dest.join(&file.relative);
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| TaskError::io(parent, e))?;
    }

    if !is_page(&file.path) {
        fs::copy(&file.path, &target).map_err(|e| TaskError::io(&file.path, e))?;
        return Ok(Written::Copied(target));
    }

    let html = includer.expand_file(&file.path)?;
    fs::write(&target, html).map_err(|e| TaskError::io(&target, e))?;
    tracing::debug!("Expanded {}", file.relative.display());

    Ok(Written::Page(target))
}

fn is_page(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| PAGE_EXTENSIONS.iter().any(|p| p.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::Layout;
    use tempfile::tempdir;

    fn project() -> (tempfile::TempDir, Layout) {
        let temp = tempdir().unwrap();
        let layout = Layout::new(temp.path().join("markup"), temp.path().join("dist"));
        fs::create_dir_all(layout.html_source().join("include")).unwrap();
        (temp, layout)
    }

    #[test]
    fn writes_expanded_pages_and_skips_fragments() {
        let (_temp, layout) = project();
        let html = layout.html_source();
        fs::write(html.join("include/footer.html"), "<footer>(c)</footer>").unwrap();
        fs::write(
            html.join("index.html"),
            "<main>Home</main>\n<!--#include file=\"include/footer.html\" -->",
        )
        .unwrap();
        fs::write(html.join("robots.txt"), "User-agent: *").unwrap();

        let report = expand_pages(
            &layout.page_sources(),
            &Includer::new(&html),
            &layout.output,
        )
        .unwrap();

        assert_eq!(report.pages.len(), 1);
        assert_eq!(report.copied.len(), 1);
        assert_eq!(
            fs::read_to_string(layout.output.join("index.html")).unwrap(),
            "<main>Home</main>\n<footer>(c)</footer>"
        );
        assert!(layout.output.join("robots.txt").exists());
        assert!(!layout.output.join("include").exists());
    }

    #[test]
    fn missing_fragment_fails() {
        let (_temp, layout) = project();
        let html = layout.html_source();
        fs::write(html.join("index.html"), "<!--#include file=\"include/nav.html\" -->").unwrap();

        let err = expand_pages(&layout.page_sources(), &Includer::new(&html), &layout.output)
            .unwrap_err();

        assert!(matches!(err, TaskError::Include(_)));
    }
}
