//! Server-side include (SSI) expansion for HTML pages.
//!
//! Finds `<!--#include file="..." -->` and `<!--#include virtual="..." -->`
//! directives and inlines the referenced fragments, recursively.

pub mod directive;
pub mod resolver;

pub use directive::{find_directives, Directive, IncludeKind};
pub use resolver::{Includer, SsiError, MAX_DEPTH};
