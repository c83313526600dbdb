//! Live-reload development server for kiln sites.
//!
//! Serves the destination tree, watches the markup sources, reruns the
//! matching task on change and tells connected browsers to reload or swap
//! stylesheets in place.

pub mod server;
pub mod watcher;
pub mod websocket;

pub use server::{LiveServer, LiveServerConfig, LiveSession, ServerError};
pub use watcher::{Change, FileWatcher, WatchEvent, WatchRoute};
pub use websocket::{ReloadHub, ReloadMessage};
