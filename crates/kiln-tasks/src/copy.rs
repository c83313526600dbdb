//! Verbatim tree copies.

use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;

use crate::error::TaskError;
use crate::layout::SourceSet;

/// Result of a copy task.
#[derive(Debug, Default, Clone)]
pub struct CopyReport {
    /// Destination paths written
    pub files: Vec<PathBuf>,

    /// Total bytes copied
    pub bytes: u64,
}

/// Copy every file selected by `set` into `dest`, keeping relative paths.
pub fn copy_tree(set: &SourceSet, dest: &Path) -> Result<CopyReport, TaskError> {
    let files = set.files()?;

    let copied: Vec<(PathBuf, u64)> = files
        .par_iter()
        .map(|file| {
            let target = dest.join(&file.relative);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|e| TaskError::io(parent, e))?;
            }
            let bytes = fs::copy(&file.path, &target).map_err(|e| TaskError::io(&file.path, e))?;
            Ok((target, bytes))
        })
        .collect::<Result<_, TaskError>>()?;

    let mut report = CopyReport::default();
    for (path, bytes) in copied {
        report.bytes += bytes;
        report.files.push(path);
    }

    tracing::debug!(
        "Copied {} files ({} bytes) from {}",
        report.files.len(),
        report.bytes,
        set.root().display()
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn mirrors_every_file_byte_for_byte() {
        let temp = tempdir().unwrap();
        let src = temp.path().join("img");
        let out = temp.path().join("dist/img");
        fs::create_dir_all(src.join("icons/small")).unwrap();

        let files: [(&str, &[u8]); 3] = [
            ("logo.png", &[0x89, b'P', b'N', b'G', 0, 1, 2, 255]),
            ("icons/arrow.svg", b"<svg/>"),
            ("icons/small/dot.gif", b"GIF89a\x00\x01"),
        ];
        for (rel, data) in files {
            fs::write(src.join(rel), data).unwrap();
        }

        let report = copy_tree(&SourceSet::new(&src), &out).unwrap();

        assert_eq!(report.files.len(), 3);
        for (rel, data) in files {
            assert_eq!(fs::read(out.join(rel)).unwrap(), data, "{rel}");
        }
    }

    #[test]
    fn overwrites_existing_destination_files() {
        let temp = tempdir().unwrap();
        let src = temp.path().join("fonts");
        let out = temp.path().join("out");
        fs::create_dir_all(&src).unwrap();
        fs::create_dir_all(&out).unwrap();
        fs::write(src.join("a.woff2"), b"new").unwrap();
        fs::write(out.join("a.woff2"), b"old contents").unwrap();

        copy_tree(&SourceSet::new(&src), &out).unwrap();

        assert_eq!(fs::read(out.join("a.woff2")).unwrap(), b"new");
    }

    #[test]
    fn empty_source_copies_nothing() {
        let temp = tempdir().unwrap();
        let report = copy_tree(
            &SourceSet::new(temp.path().join("video")),
            &temp.path().join("out"),
        )
        .unwrap();

        assert!(report.files.is_empty());
        assert!(!temp.path().join("out").exists());
    }
}
