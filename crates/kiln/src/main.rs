//! Kiln CLI - static site build pipeline.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use kiln_server::ReloadHub;
use kiln_tasks::{GitPages, TaskContext};
use tracing_subscriber::{fmt, EnvFilter};

mod config;
mod orchestrator;
mod pipeline;

use orchestrator::Orchestrator;

#[derive(Parser)]
#[command(name = "kiln")]
#[command(about = "Build, serve and publish a static markup site")]
#[command(version)]
pub struct Cli {
    /// Pipeline to run; watches when omitted
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to kiln.toml config file
    #[arg(short, long, default_value = "kiln.toml", global = true)]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Do not open a browser for the live session
    #[arg(long, global = true)]
    no_open: bool,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Commands {
    /// Copy images
    Images,
    /// Copy video
    Video,
    /// Copy fonts
    Fonts,
    /// Copy downloadable files
    Downfile,
    /// Compile stylesheets
    Css,
    /// Copy scripts
    Js,
    /// Expand includes in pages
    Htmlssi,
    /// Remove the output directory
    Clean,
    /// Clean, then build everything
    Build,
    /// Build and serve with live reload
    Watch,
    /// Same as watch
    Default,
    /// Ask connected browsers to reload
    Reload,
    /// Build, publish to the hosting branch, then clean
    Deploy,
    /// Same as build
    Dev,
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Self::Images => "images",
            Self::Video => "video",
            Self::Fonts => "fonts",
            Self::Downfile => "downfile",
            Self::Css => "css",
            Self::Js => "js",
            Self::Htmlssi => "htmlssi",
            Self::Clean => "clean",
            Self::Build => "build",
            Self::Watch => "watch",
            Self::Default => "default",
            Self::Reload => "reload",
            Self::Deploy => "deploy",
            Self::Dev => "dev",
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    fmt().with_env_filter(filter).with_target(false).init();

    let file_config = config::load_config(&cli.config)?;

    let name = cli.command.unwrap_or(Commands::Default).name();
    let step = pipeline::named(name).ok_or_else(|| {
        anyhow::anyhow!(
            "Unknown pipeline '{}', expected one of: {}",
            name,
            pipeline::NAMES.join(", ")
        )
    })?;

    let tasks = TaskContext::new(file_config.layout(), file_config.style_options())?;
    let mut server = file_config.server_config();
    if cli.no_open {
        server.open = false;
    }
    let publisher = Arc::new(GitPages::new(file_config.publish_options()));

    let mut orchestrator = Orchestrator::new(Arc::new(tasks), publisher, server);
    if pipeline::is_live(&step) {
        orchestrator = orchestrator.with_hub(ReloadHub::new());
    }

    orchestrator.run_named(name, &step).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_command_names_a_pipeline() {
        let commands = [
            Commands::Images,
            Commands::Video,
            Commands::Fonts,
            Commands::Downfile,
            Commands::Css,
            Commands::Js,
            Commands::Htmlssi,
            Commands::Clean,
            Commands::Build,
            Commands::Watch,
            Commands::Default,
            Commands::Reload,
            Commands::Deploy,
            Commands::Dev,
        ];
        assert_eq!(commands.len(), pipeline::NAMES.len());
        for command in commands {
            assert!(pipeline::NAMES.contains(&command.name()));
            assert!(pipeline::named(command.name()).is_some());
        }
    }

    #[test]
    fn parses_command_line() {
        let cli = Cli::try_parse_from(["kiln", "deploy", "--verbose"]).unwrap();
        assert_eq!(cli.command, Some(Commands::Deploy));
        assert!(cli.verbose);
        assert_eq!(cli.config, PathBuf::from("kiln.toml"));

        let cli = Cli::try_parse_from(["kiln"]).unwrap();
        assert_eq!(cli.command, None);

        assert!(Cli::try_parse_from(["kiln", "publish"]).is_err());
    }
}
