//! Project configuration (kiln.toml).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use kiln_server::LiveServerConfig;
use kiln_tasks::{GitIdentity, Layout, PublishOptions, StyleOptions};
use serde::Deserialize;

/// Configuration file structure. Every section is optional.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub styles: StylesConfig,
    #[serde(default)]
    pub publish: PublishConfig,
}

#[derive(Debug, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_source")]
    pub source: PathBuf,
    #[serde(default = "default_output")]
    pub output: PathBuf,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_true")]
    pub open: bool,
}

#[derive(Debug, Deserialize)]
pub struct StylesConfig {
    #[serde(default = "default_browsers")]
    pub browsers: Vec<String>,
    #[serde(default = "default_precision")]
    pub precision: usize,
    #[serde(default = "default_true")]
    pub source_maps: bool,
}

#[derive(Debug, Deserialize, Default)]
pub struct PublishConfig {
    /// Remote URL; falls back to the origin of the current repository
    pub remote: Option<String>,
    pub branch: Option<String>,
    pub cache_dir: Option<PathBuf>,
    pub message: Option<String>,
    pub user_name: Option<String>,
    pub user_email: Option<String>,
}

fn default_source() -> PathBuf {
    PathBuf::from("markup")
}
fn default_output() -> PathBuf {
    PathBuf::from("dist")
}
fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    3005
}
fn default_true() -> bool {
    true
}
fn default_browsers() -> Vec<String> {
    StyleOptions::default().browsers
}
fn default_precision() -> usize {
    2
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            source: default_source(),
            output: default_output(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            open: true,
        }
    }
}

impl Default for StylesConfig {
    fn default() -> Self {
        Self {
            browsers: default_browsers(),
            precision: default_precision(),
            source_maps: true,
        }
    }
}

/// Load configuration from `path` if it exists.
/// Returns an error if the file exists but is malformed.
pub fn load_config(path: &Path) -> Result<ConfigFile> {
    if path.exists() {
        let content = fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
        let config: ConfigFile = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path.display(), e))?;
        tracing::info!("Loaded config from {}", path.display());
        return Ok(config);
    }
    Ok(ConfigFile::default())
}

impl ConfigFile {
    pub fn layout(&self) -> Layout {
        Layout::new(&self.paths.source, &self.paths.output)
    }

    pub fn style_options(&self) -> StyleOptions {
        StyleOptions {
            browsers: self.styles.browsers.clone(),
            precision: self.styles.precision,
            source_maps: self.styles.source_maps,
            ..StyleOptions::default()
        }
    }

    pub fn server_config(&self) -> LiveServerConfig {
        LiveServerConfig {
            root: self.paths.output.clone(),
            host: self.server.host.clone(),
            port: self.server.port,
            open: self.server.open,
        }
    }

    pub fn publish_options(&self) -> PublishOptions {
        let defaults = PublishOptions::default();
        let publish = &self.publish;
        let identity = match (&publish.user_name, &publish.user_email) {
            (Some(name), Some(email)) => Some(GitIdentity {
                name: name.clone(),
                email: email.clone(),
            }),
            _ => None,
        };

        PublishOptions {
            remote: publish.remote.clone(),
            branch: publish.branch.clone().unwrap_or(defaults.branch),
            cache_dir: publish.cache_dir.clone().unwrap_or(defaults.cache_dir),
            message: publish.message.clone(),
            identity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_gives_defaults() {
        let temp = tempdir().unwrap();
        let config = load_config(&temp.path().join("kiln.toml")).unwrap();

        assert_eq!(config.layout(), Layout::default());
        assert_eq!(config.server_config().port, 3005);
        assert_eq!(config.server_config().root, PathBuf::from("dist"));
        assert_eq!(config.publish_options().branch, "gh-pages");
        assert_eq!(config.style_options().precision, 2);
    }

    #[test]
    fn partial_sections_keep_defaults() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("kiln.toml");
        fs::write(
            &path,
            r#"
[paths]
output = "public"

[server]
port = 8080

[publish]
remote = "git@example.com:site.git"
user_name = "Site Bot"
user_email = "bot@example.com"
"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.paths.source, PathBuf::from("markup"));
        assert_eq!(config.server_config().root, PathBuf::from("public"));
        assert_eq!(config.server_config().port, 8080);
        assert_eq!(config.server_config().host, "127.0.0.1");

        let publish = config.publish_options();
        assert_eq!(publish.remote.as_deref(), Some("git@example.com:site.git"));
        assert_eq!(publish.identity.unwrap().name, "Site Bot");
    }

    #[test]
    fn malformed_file_is_an_error() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("kiln.toml");
        fs::write(&path, "[server]\nport = \"high\"").unwrap();

        assert!(load_config(&path).is_err());
    }
}
