//! Destination tree removal.

use std::fs;
use std::io;
use std::path::Path;

use crate::error::TaskError;

/// Recursively delete `dir`. Returns whether anything was removed.
///
/// A missing directory is not an error.
pub fn clean(dir: &Path) -> Result<bool, TaskError> {
    match fs::remove_dir_all(dir) {
        Ok(()) => {
            tracing::debug!("Removed {}", dir.display());
            Ok(true)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(TaskError::io(dir, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn removes_tree() {
        let temp = tempdir().unwrap();
        let dist = temp.path().join("dist");
        fs::create_dir_all(dist.join("assets/css")).unwrap();
        fs::write(dist.join("assets/css/site.css"), "a{}").unwrap();

        assert!(clean(&dist).unwrap());
        assert!(!dist.exists());
    }

    #[test]
    fn is_idempotent() {
        let temp = tempdir().unwrap();
        let dist = temp.path().join("dist");
        fs::create_dir_all(&dist).unwrap();

        assert!(clean(&dist).unwrap());
        assert!(!clean(&dist).unwrap());
        assert!(!dist.exists());
    }
}
