//! Recursive include resolution.

use std::fs;
use std::path::{Path, PathBuf};

use crate::directive::{find_directives, Directive, IncludeKind};

/// Deepest include nesting accepted before giving up.
pub const MAX_DEPTH: usize = 16;

/// Errors that can occur while expanding includes.
#[derive(Debug, thiserror::Error)]
pub enum SsiError {
    #[error("{from}:{line}: included file not found: {target}")]
    Missing {
        from: PathBuf,
        line: usize,
        target: PathBuf,
    },

    #[error("Include cycle: {0}")]
    Cycle(String),

    #[error("{from}: includes nested deeper than {} levels", MAX_DEPTH)]
    TooDeep { from: PathBuf },

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Expands include directives against a root directory.
#[derive(Debug, Clone)]
pub struct Includer {
    root: PathBuf,
}

impl Includer {
    /// Create an includer; `virtual` paths resolve against `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Read `path` and return its content with every include inlined.
    pub fn expand_file(&self, path: &Path) -> Result<String, SsiError> {
        let mut stack = Vec::new();
        self.expand_at(path, &mut stack)
    }

    /// Expand includes in `source` as if it had been read from `origin`.
    pub fn expand_str(&self, source: &str, origin: &Path) -> Result<String, SsiError> {
        let mut stack = vec![identity(origin)];
        self.expand_source(source, origin, &mut stack)
    }

    fn expand_at(&self, path: &Path, stack: &mut Vec<PathBuf>) -> Result<String, SsiError> {
        let id = identity(path);
        if let Some(pos) = stack.iter().position(|p| *p == id) {
            let chain: Vec<String> = stack[pos..]
                .iter()
                .chain(std::iter::once(&id))
                .map(|p| p.display().to_string())
                .collect();
            return Err(SsiError::Cycle(chain.join(" -> ")));
        }
        if stack.len() > MAX_DEPTH {
            return Err(SsiError::TooDeep {
                from: path.to_path_buf(),
            });
        }

        let source = fs::read_to_string(path).map_err(|source| SsiError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        stack.push(id);
        let expanded = self.expand_source(&source, path, stack);
        stack.pop();
        expanded
    }

    fn expand_source(
        &self,
        source: &str,
        origin: &Path,
        stack: &mut Vec<PathBuf>,
    ) -> Result<String, SsiError> {
        let directives = find_directives(source);
        if directives.is_empty() {
            return Ok(source.to_string());
        }

        let mut out = String::with_capacity(source.len());
        let mut cursor = 0;

        for directive in &directives {
            let target = self.resolve(directive, origin);
            if !target.is_file() {
                return Err(SsiError::Missing {
                    from: origin.to_path_buf(),
                    line: directive.line,
                    target,
                });
            }

            tracing::debug!("{}: including {}", origin.display(), target.display());

            out.push_str(&source[cursor..directive.span.start]);
            out.push_str(&self.expand_at(&target, stack)?);
            cursor = directive.span.end;
        }

        out.push_str(&source[cursor..]);
        Ok(out)
    }

    fn resolve(&self, directive: &Directive, origin: &Path) -> PathBuf {
        match directive.kind {
            IncludeKind::File => origin
                .parent()
                .unwrap_or(Path::new(""))
                .join(&directive.target),
            IncludeKind::Virtual => self.root.join(directive.target.trim_start_matches('/')),
        }
    }
}

fn identity(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
