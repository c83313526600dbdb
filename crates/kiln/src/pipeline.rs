//! The fixed task graph.

use std::fmt;

use kiln_tasks::TaskKind;

/// A node of the task graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// A file task
    Task(TaskKind),
    /// Full browser reload on the live session
    Reload,
    /// Upload the destination tree
    Publish,
    /// Run the live session until the process exits
    Serve,
    /// Run steps one after the other
    Series(Vec<Step>),
    /// Start steps together; completion order is unspecified
    Parallel(Vec<Step>),
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Task(kind) => write!(f, "{}", kind),
            Self::Reload => f.write_str("reload"),
            Self::Publish => f.write_str("publish"),
            Self::Serve => f.write_str("serve"),
            Self::Series(steps) => write!(f, "<series {}>", join(steps)),
            Self::Parallel(steps) => write!(f, "<parallel {}>", join(steps)),
        }
    }
}

fn join(steps: &[Step]) -> String {
    steps
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// clean, then pages, then every asset kind at once.
pub fn build() -> Step {
    Step::Series(vec![
        Step::Task(TaskKind::Clean),
        Step::Task(TaskKind::Htmlssi),
        Step::Parallel(vec![
            Step::Task(TaskKind::Css),
            Step::Task(TaskKind::Images),
            Step::Task(TaskKind::Video),
            Step::Task(TaskKind::Js),
            Step::Task(TaskKind::Fonts),
            Step::Task(TaskKind::Downfile),
        ]),
    ])
}

/// Build while serving.
pub fn watch() -> Step {
    Step::Parallel(vec![build(), Step::Serve])
}

/// Build, publish, then remove the build.
pub fn deploy() -> Step {
    Step::Series(vec![build(), Step::Publish, Step::Task(TaskKind::Clean)])
}

/// Every pipeline name accepted on the command line.
pub const NAMES: &[&str] = &[
    "images", "video", "fonts", "downfile", "css", "js", "htmlssi", "clean", "build", "watch",
    "default", "reload", "deploy", "dev",
];

/// Look up a pipeline by name.
pub fn named(name: &str) -> Option<Step> {
    if let Some(kind) = TaskKind::from_name(name) {
        return Some(Step::Task(kind));
    }

    match name {
        "build" | "dev" => Some(build()),
        "watch" | "default" => Some(watch()),
        "reload" => Some(Step::Reload),
        "deploy" => Some(deploy()),
        _ => None,
    }
}

/// Whether a pipeline needs a live session.
pub fn is_live(step: &Step) -> bool {
    match step {
        Step::Serve => true,
        Step::Series(steps) | Step::Parallel(steps) => steps.iter().any(is_live),
        _ => false,
    }
}
