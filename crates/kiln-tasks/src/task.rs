//! Runnable leaf tasks.

use std::fmt;

use kiln_ssi::Includer;

use crate::clean::clean;
use crate::copy::{copy_tree, CopyReport};
use crate::error::TaskError;
use crate::layout::Layout;
use crate::pages::{expand_pages, PageReport};
use crate::styles::{StyleOptions, StylePipeline, StyleReport};

/// A leaf task of the pipeline, named as on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Images,
    Video,
    Fonts,
    Downfile,
    Css,
    Js,
    Htmlssi,
    Clean,
}

impl TaskKind {
    pub const ALL: [TaskKind; 8] = [
        Self::Images,
        Self::Video,
        Self::Fonts,
        Self::Downfile,
        Self::Css,
        Self::Js,
        Self::Htmlssi,
        Self::Clean,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Images => "images",
            Self::Video => "video",
            Self::Fonts => "fonts",
            Self::Downfile => "downfile",
            Self::Css => "css",
            Self::Js => "js",
            Self::Htmlssi => "htmlssi",
            Self::Clean => "clean",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }

    /// Asset directory for tasks that copy files verbatim.
    pub fn asset_dir(&self) -> Option<&'static str> {
        match self {
            Self::Images => Some("img"),
            Self::Video => Some("video"),
            Self::Fonts => Some("fonts"),
            Self::Downfile => Some("downfile"),
            Self::Js => Some("js"),
            _ => None,
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a task produced.
#[derive(Debug, Clone)]
pub enum TaskOutcome {
    Copied(CopyReport),
    Styles(StyleReport),
    Pages(PageReport),
    Cleaned { existed: bool },
}

impl TaskOutcome {
    /// One-line description for logs.
    pub fn summary(&self) -> String {
        match self {
            Self::Copied(r) => format!("{} files, {} bytes", r.files.len(), r.bytes),
            Self::Styles(r) if r.failed.is_empty() => {
                format!("{} stylesheets", r.written.len())
            }
            Self::Styles(r) => format!(
                "{} stylesheets, {} failed",
                r.written.len(),
                r.failed.len()
            ),
            Self::Pages(r) => format!("{} pages, {} other files", r.pages.len(), r.copied.len()),
            Self::Cleaned { existed: true } => "removed".to_string(),
            Self::Cleaned { existed: false } => "nothing to remove".to_string(),
        }
    }
}

/// Everything a task needs to run: the layout and the prepared pipelines.
pub struct TaskContext {
    layout: Layout,
    styles: StylePipeline,
    includer: Includer,
}

impl TaskContext {
    pub fn new(layout: Layout, style_options: StyleOptions) -> Result<Self, TaskError> {
        let styles = StylePipeline::new(style_options)?;
        let includer = Includer::new(layout.html_source());
        Ok(Self {
            layout,
            styles,
            includer,
        })
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Run one task to completion.
    pub fn run(&self, kind: TaskKind) -> Result<TaskOutcome, TaskError> {
        let layout = &self.layout;

        match kind {
            TaskKind::Css => self
                .styles
                .compile_all(&layout.style_sources(), &layout.asset_output("css"))
                .map(TaskOutcome::Styles),
            TaskKind::Htmlssi => {
                expand_pages(&layout.page_sources(), &self.includer, &layout.output)
                    .map(TaskOutcome::Pages)
            }
            TaskKind::Clean => {
                clean(&layout.output).map(|existed| TaskOutcome::Cleaned { existed })
            }
            TaskKind::Images
            | TaskKind::Video
            | TaskKind::Fonts
            | TaskKind::Downfile
            | TaskKind::Js => {
                let dir = kind.asset_dir().unwrap_or_default();
                copy_tree(&layout.asset_sources(dir), &layout.asset_output(dir))
                    .map(TaskOutcome::Copied)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn names_round_trip() {
        for kind in TaskKind::ALL {
            assert_eq!(TaskKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(TaskKind::from_name("build"), None);
    }

    #[test]
    fn runs_copy_tasks_into_mirrored_dirs() {
        let temp = tempdir().unwrap();
        let layout = Layout::new(temp.path().join("markup"), temp.path().join("dist"));
        for dir in ["img", "video", "fonts", "downfile", "js"] {
            fs::create_dir_all(layout.asset_source(dir)).unwrap();
            fs::write(layout.asset_source(dir).join(format!("{dir}.bin")), dir).unwrap();
        }

        let ctx = TaskContext::new(layout.clone(), StyleOptions::default()).unwrap();
        for kind in [
            TaskKind::Images,
            TaskKind::Video,
            TaskKind::Fonts,
            TaskKind::Downfile,
            TaskKind::Js,
        ] {
            ctx.run(kind).unwrap();
            let dir = kind.asset_dir().unwrap();
            let copied = layout.asset_output(dir).join(format!("{dir}.bin"));
            assert_eq!(fs::read_to_string(copied).unwrap(), dir);
        }
    }

    #[test]
    fn css_task_writes_into_css_output() {
        let temp = tempdir().unwrap();
        let layout = Layout::new(temp.path().join("markup"), temp.path().join("dist"));
        fs::create_dir_all(layout.asset_source("css")).unwrap();
        fs::write(layout.asset_source("css").join("app.scss"), "body { margin: 0 }").unwrap();

        let ctx = TaskContext::new(layout.clone(), StyleOptions::default()).unwrap();
        let outcome = ctx.run(TaskKind::Css).unwrap();

        assert_eq!(outcome.summary(), "1 stylesheets");
        assert!(layout.asset_output("css").join("app.css").exists());
        assert!(layout.asset_output("css").join("maps/app.css.map").exists());
    }
}
