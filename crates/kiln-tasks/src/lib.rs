//! File-transform tasks for the kiln site pipeline.
//!
//! Each task reads a [`SourceSet`] from the markup tree and writes into the
//! destination tree. Tasks are synchronous; the orchestrator decides how
//! they are sequenced.

pub mod clean;
pub mod compact;
pub mod copy;
pub mod error;
pub mod layout;
pub mod pages;
pub mod publish;
pub mod styles;
pub mod task;

pub use clean::clean;
pub use copy::{copy_tree, CopyReport};
pub use error::TaskError;
pub use layout::{Layout, SourceFile, SourceSet};
pub use pages::{expand_pages, PageReport};
pub use publish::{GitIdentity, GitPages, PublishOptions, PublishReport, Publisher};
pub use styles::{CompiledStyle, StyleError, StyleFailure, StyleOptions, StylePipeline, StyleReport};
pub use task::{TaskContext, TaskKind, TaskOutcome};
