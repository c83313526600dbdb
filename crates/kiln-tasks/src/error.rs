//! Task errors.

use std::io;
use std::path::{Path, PathBuf};

use kiln_ssi::SsiError;

use crate::styles::StyleError;

/// Errors that abort a task and the pipeline running it.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Include(#[from] SsiError),

    #[error("Style setup failed: {0}")]
    Style(#[from] StyleError),

    #[error("Publish failed: {0}")]
    Publish(String),
}

impl TaskError {
    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}
