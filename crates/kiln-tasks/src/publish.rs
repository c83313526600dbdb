//! Publishing the destination tree to a hosting branch.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::copy::copy_tree;
use crate::error::TaskError;
use crate::layout::SourceSet;

/// Uploads a built tree somewhere.
pub trait Publisher: Send + Sync {
    /// Publish the full contents of `dir`.
    fn publish(&self, dir: &Path) -> Result<PublishReport, TaskError>;
}

/// Outcome of a publish run.
#[derive(Debug, Clone, Default)]
pub struct PublishReport {
    /// Where the tree was pushed
    pub remote: String,
    /// Branch that received it
    pub branch: String,
    /// Number of files published
    pub files: usize,
    /// False when the branch already had identical contents
    pub committed: bool,
}

/// Commit identity passed to git with `-c`.
#[derive(Debug, Clone)]
pub struct GitIdentity {
    pub name: String,
    pub email: String,
}

/// Settings for [`GitPages`].
#[derive(Debug, Clone)]
pub struct PublishOptions {
    /// Remote URL; defaults to `remote.origin.url` of the working directory
    pub remote: Option<String>,

    /// Hosting branch
    pub branch: String,

    /// Where the publishing clone is kept between runs
    pub cache_dir: PathBuf,

    /// Commit message; defaults to `Update <timestamp>`
    pub message: Option<String>,

    /// Commit identity, if git is not configured with one
    pub identity: Option<GitIdentity>,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self {
            remote: None,
            branch: "gh-pages".to_string(),
            cache_dir: std::env::temp_dir().join("kiln-publish"),
            message: None,
            identity: None,
        }
    }
}

/// Publishes by committing the tree to a branch and pushing it with `git`.
#[derive(Debug, Clone, Default)]
pub struct GitPages {
    options: PublishOptions,
}

impl GitPages {
    pub fn new(options: PublishOptions) -> Self {
        Self { options }
    }

    fn git(&self, cwd: &Path, args: &[&str]) -> Result<String, TaskError> {
        let mut cmd = Command::new("git");
        if let Some(id) = &self.options.identity {
            cmd.arg("-c")
                .arg(format!("user.name={}", id.name))
                .arg("-c")
                .arg(format!("user.email={}", id.email));
        }

        let output = cmd
            .args(args)
            .current_dir(cwd)
            .output()
            .map_err(|e| TaskError::Publish(format!("failed to run git: {}", e)))?;

        if !output.status.success() {
            return Err(TaskError::Publish(format!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn remote_url(&self) -> Result<String, TaskError> {
        if let Some(remote) = &self.options.remote {
            return Ok(remote.clone());
        }
        let url = self
            .git(Path::new("."), &["config", "--get", "remote.origin.url"])
            .map_err(|_| TaskError::Publish("no remote configured and no origin found".into()))?;
        Ok(url.trim().to_string())
    }

    /// Clone or refresh the publishing repository.
    fn prepare_cache(&self, remote: &str) -> Result<(), TaskError> {
        let cache = &self.options.cache_dir;
        let cache_str = cache.to_string_lossy();

        if cache.join(".git").exists() {
            self.git(cache, &["remote", "set-url", "origin", remote])?;
            self.git(cache, &["fetch", "--quiet", "origin"])?;
        } else {
            if cache.exists() {
                fs::remove_dir_all(cache).map_err(|e| TaskError::io(cache, e))?;
            }
            if let Some(parent) = cache.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).map_err(|e| TaskError::io(parent, e))?;
            }
            tracing::info!("Cloning {}", remote);
            self.git(Path::new("."), &["clone", "--quiet", remote, &cache_str])?;
        }

        Ok(())
    }

    /// Point HEAD at the hosting branch, tracking the remote copy if any.
    fn checkout_branch(&self) -> Result<(), TaskError> {
        let cache = &self.options.cache_dir;
        let branch = self.options.branch.as_str();

        let heads = self.git(cache, &["ls-remote", "--heads", "origin", branch])?;
        if heads.trim().is_empty() {
            tracing::info!("Creating branch {}", branch);
            let head = format!("refs/heads/{}", branch);
            self.git(cache, &["symbolic-ref", "HEAD", &head])?;
            self.git(cache, &["rm", "-r", "-q", "--cached", "--ignore-unmatch", "."])?;
        } else {
            let upstream = format!("origin/{}", branch);
            self.git(cache, &["checkout", "--quiet", "-f", "-B", branch, &upstream])?;
        }

        Ok(())
    }

    /// Replace everything but `.git` with the contents of `dir`.
    fn replace_tree(&self, dir: &Path) -> Result<usize, TaskError> {
        let cache = &self.options.cache_dir;

        for entry in fs::read_dir(cache).map_err(|e| TaskError::io(cache, e))? {
            let entry = entry.map_err(|e| TaskError::io(cache, e))?;
            let path = entry.path();
            if entry.file_name() == ".git" {
                continue;
            }
            let removed = if path.is_dir() {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };
            removed.map_err(|e| TaskError::io(&path, e))?;
        }

        let report = copy_tree(&SourceSet::new(dir), cache)?;
        Ok(report.files.len())
    }
}

impl Publisher for GitPages {
    fn publish(&self, dir: &Path) -> Result<PublishReport, TaskError> {
        if !dir.is_dir() {
            return Err(TaskError::Publish(format!(
                "nothing to publish: {} does not exist",
                dir.display()
            )));
        }

        let remote = self.remote_url()?;
        let branch = self.options.branch.clone();
        let cache = self.options.cache_dir.clone();

        self.prepare_cache(&remote)?;
        self.checkout_branch()?;
        let files = self.replace_tree(dir)?;

        self.git(&cache, &["add", "--all", "."])?;
        let status = self.git(&cache, &["status", "--porcelain"])?;

        let mut report = PublishReport {
            remote,
            branch,
            files,
            committed: false,
        };

        if status.trim().is_empty() {
            tracing::info!("No changes to publish on {}", report.branch);
            return Ok(report);
        }

        let message = self.options.message.clone().unwrap_or_else(|| {
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0);
            format!("Update {}", now)
        });

        self.git(&cache, &["commit", "--quiet", "-m", &message])?;
        tracing::info!("Pushing {} to {}", report.branch, report.remote);
        self.git(&cache, &["push", "--quiet", "origin", &report.branch])?;

        report.committed = true;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn git_available() -> bool {
        Command::new("git")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn publisher(remote: &Path, cache: &Path) -> GitPages {
        GitPages::new(PublishOptions {
            remote: Some(remote.to_string_lossy().into_owned()),
            cache_dir: cache.to_path_buf(),
            message: Some("Publish site".to_string()),
            identity: Some(GitIdentity {
                name: "kiln".to_string(),
                email: "kiln@localhost".to_string(),
            }),
            ..PublishOptions::default()
        })
    }

    #[test]
    fn missing_tree_is_an_error() {
        let temp = tempdir().unwrap();
        let err = GitPages::default()
            .publish(&temp.path().join("dist"))
            .unwrap_err();
        assert!(matches!(err, TaskError::Publish(_)));
    }

    #[test]
    fn pushes_tree_to_branch() {
        if !git_available() {
            eprintln!("git not installed, skipping");
            return;
        }

        let temp = tempdir().unwrap();
        let remote = temp.path().join("remote.git");
        let status = Command::new("git")
            .args(["init", "--quiet", "--bare"])
            .arg(&remote)
            .status()
            .unwrap();
        assert!(status.success());

        let dist = temp.path().join("dist");
        fs::create_dir_all(dist.join("assets/css")).unwrap();
        fs::write(dist.join("index.html"), "<h1>hi</h1>").unwrap();
        fs::write(dist.join("assets/css/site.css"), "a { color: red; }").unwrap();

        let pages = publisher(&remote, &temp.path().join("cache"));
        let report = pages.publish(&dist).unwrap();
        assert!(report.committed);
        assert_eq!(report.files, 2);

        let listing = Command::new("git")
            .arg("--git-dir")
            .arg(&remote)
            .args(["ls-tree", "-r", "--name-only", "gh-pages"])
            .output()
            .unwrap();
        let listing = String::from_utf8_lossy(&listing.stdout);
        assert!(listing.contains("index.html"));
        assert!(listing.contains("assets/css/site.css"));

        // Same contents again: nothing to commit.
        let again = pages.publish(&dist).unwrap();
        assert!(!again.committed);
    }
}
