//! File watching for live reload.

use std::path::{Path, PathBuf};
use std::sync::mpsc;

use kiln_tasks::{Layout, SourceSet, TaskKind};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc as async_mpsc;

/// Kind of filesystem change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Created,
    Modified,
    Removed,
}

/// A change routed to the task that handles it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    /// Task to rerun
    pub task: TaskKind,
    /// Changed path
    pub path: PathBuf,
    pub change: Change,
}

/// Maps a set of source paths to the task that rebuilds them.
#[derive(Debug, Clone)]
pub struct WatchRoute {
    pub task: TaskKind,
    pub sources: SourceSet,
    /// Only react to modifications, not creation or removal
    pub modify_only: bool,
}

impl WatchRoute {
    /// The fixed routes of a markup project.
    pub fn for_layout(layout: &Layout) -> Vec<WatchRoute> {
        let route = |task, sources| WatchRoute {
            task,
            sources,
            modify_only: false,
        };

        vec![
            route(TaskKind::Css, SourceSet::new(layout.asset_source("css"))),
            route(TaskKind::Js, SourceSet::new(layout.asset_source("js"))),
            WatchRoute {
                task: TaskKind::Htmlssi,
                sources: SourceSet::new(&layout.source).with_extensions(&["html"]),
                modify_only: true,
            },
            route(TaskKind::Images, SourceSet::new(layout.asset_source("img"))),
            route(TaskKind::Video, SourceSet::new(layout.asset_source("video"))),
        ]
    }

    fn accepts(&self, change: Change, path: &Path) -> bool {
        (!self.modify_only || change == Change::Modified) && self.sources.matches(path)
    }
}

/// File watcher for detecting source changes.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
}

impl FileWatcher {
    /// Watch `roots` recursively and route changes through `routes`.
    ///
    /// Returns the watcher and a channel to receive events. Events are not
    /// debounced; one save may produce several events.
    pub fn new(
        roots: &[PathBuf],
        routes: Vec<WatchRoute>,
    ) -> Result<(Self, async_mpsc::Receiver<WatchEvent>), std::io::Error> {
        let (sync_tx, sync_rx) = mpsc::channel();
        let (async_tx, async_rx) = async_mpsc::channel(100);

        let mut watcher = notify::recommended_watcher(move |res: Result<notify::Event, _>| {
            if let Ok(event) = res {
                let _ = sync_tx.send(event);
            }
        })
        .map_err(std::io::Error::other)?;

        for root in roots {
            if root.exists() {
                watcher
                    .watch(root, RecursiveMode::Recursive)
                    .map_err(std::io::Error::other)?;
            } else {
                tracing::warn!("Not watching {}: directory does not exist", root.display());
            }
        }

        std::thread::spawn(move || {
            while let Ok(event) = sync_rx.recv() {
                for watch_event in route_event(&routes, &event) {
                    if async_tx.blocking_send(watch_event).is_err() {
                        return;
                    }
                }
            }
        });

        Ok((Self { _watcher: watcher }, async_rx))
    }
}

fn classify(kind: &EventKind) -> Option<Change> {
    match kind {
        EventKind::Create(_) => Some(Change::Created),
        EventKind::Remove(_) => Some(Change::Removed),
        EventKind::Modify(notify::event::ModifyKind::Metadata(_)) => None,
        EventKind::Modify(_) => Some(Change::Modified),
        _ => None,
    }
}

/// Route one notify event; each task appears at most once per event.
fn route_event(routes: &[WatchRoute], event: &notify::Event) -> Vec<WatchEvent> {
    let Some(change) = classify(&event.kind) else {
        return Vec::new();
    };

    let mut out: Vec<WatchEvent> = Vec::new();
    for path in &event.paths {
        let Some(route) = routes.iter().find(|r| r.accepts(change, path)) else {
            continue;
        };
        if out.iter().any(|e| e.task == route.task) {
            continue;
        }
        out.push(WatchEvent {
            task: route.task,
            path: path.clone(),
            change,
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, MetadataKind, ModifyKind};
    use std::fs;
    use std::time::Duration;
    use tempfile::tempdir;

    fn event(kind: EventKind, paths: &[&str]) -> notify::Event {
        let mut event = notify::Event::new(kind);
        for path in paths {
            event = event.add_path(PathBuf::from(path));
        }
        event
    }

    fn modified(paths: &[&str]) -> notify::Event {
        event(EventKind::Modify(ModifyKind::Data(DataChange::Content)), paths)
    }

    #[test]
    fn routes_paths_to_tasks() {
        let routes = WatchRoute::for_layout(&Layout::default());
        let cases = [
            ("markup/assets/css/site.scss", TaskKind::Css),
            ("markup/assets/css/import/_vars.scss", TaskKind::Css),
            ("markup/assets/js/app.js", TaskKind::Js),
            ("markup/html/index.html", TaskKind::Htmlssi),
            ("markup/html/include/nav.html", TaskKind::Htmlssi),
            ("markup/assets/img/logo.png", TaskKind::Images),
            ("markup/assets/video/intro.mp4", TaskKind::Video),
        ];

        for (path, task) in cases {
            let routed = route_event(&routes, &modified(&[path]));
            assert_eq!(routed.len(), 1, "{path}");
            assert_eq!(routed[0].task, task, "{path}");
        }
    }

    #[test]
    fn ignores_unwatched_paths_and_metadata() {
        let routes = WatchRoute::for_layout(&Layout::default());

        assert!(route_event(&routes, &modified(&["markup/assets/fonts/a.woff"])).is_empty());
        assert!(route_event(&routes, &modified(&["README.md"])).is_empty());
        assert!(route_event(
            &routes,
            &event(
                EventKind::Modify(ModifyKind::Metadata(MetadataKind::Any)),
                &["markup/assets/css/site.scss"]
            )
        )
        .is_empty());
    }

    #[test]
    fn html_reacts_to_changes_only() {
        let routes = WatchRoute::for_layout(&Layout::default());
        let created = event(
            EventKind::Create(CreateKind::File),
            &["markup/html/new.html", "markup/assets/img/new.png"],
        );

        let routed = route_event(&routes, &created);
        assert_eq!(routed.len(), 1);
        assert_eq!(routed[0].task, TaskKind::Images);
        assert_eq!(routed[0].change, Change::Created);
    }

    #[test]
    fn one_event_per_task() {
        let routes = WatchRoute::for_layout(&Layout::default());
        let routed = route_event(
            &routes,
            &modified(&["markup/assets/css/a.scss", "markup/assets/css/b.scss"]),
        );
        assert_eq!(routed.len(), 1);
    }

    #[tokio::test]
    async fn watches_file_changes() {
        let temp = tempdir().unwrap();
        let root = fs::canonicalize(temp.path()).unwrap();
        let layout = Layout::new(root.join("markup"), root.join("dist"));
        let css = layout.asset_source("css");
        fs::create_dir_all(&css).unwrap();

        let (watcher, mut rx) =
            FileWatcher::new(&[layout.source.clone()], WatchRoute::for_layout(&layout)).unwrap();

        // Give inotify time to set up
        tokio::time::sleep(Duration::from_millis(100)).await;

        fs::write(css.join("site.scss"), "a { color: red; }").unwrap();

        let event = tokio::time::timeout(Duration::from_secs(3), rx.recv()).await;

        drop(watcher);

        let event = event
            .expect("timeout waiting for file watch event")
            .expect("channel should not be closed");
        assert_eq!(event.task, TaskKind::Css);
    }
}
