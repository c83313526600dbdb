//! Live session server.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{
        header::{CONTENT_LENGTH, CONTENT_TYPE},
        StatusCode,
    },
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use kiln_tasks::{TaskContext, TaskOutcome};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tower_http::services::ServeDir;

use crate::watcher::{FileWatcher, WatchEvent, WatchRoute};
use crate::websocket::{client_script, ReloadHub, ReloadMessage, CLIENT_PATH, SOCKET_PATH};

/// Configuration for the live server.
#[derive(Debug, Clone)]
pub struct LiveServerConfig {
    /// Directory to serve
    pub root: PathBuf,

    /// Host to bind to
    pub host: String,

    /// Port to listen on; 0 picks a free port
    pub port: u16,

    /// Open browser on start
    pub open: bool,
}

impl Default for LiveServerConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("dist"),
            host: "127.0.0.1".to_string(),
            port: 3005,
            open: true,
        }
    }
}

/// Errors that can occur with the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Invalid address {0}")]
    Address(String),

    #[error("Failed to bind to {0}: {1}")]
    BindError(SocketAddr, String),

    #[error("File watch error: {0}")]
    WatchError(String),

    #[error("Server error: {0}")]
    Serve(String),
}

/// Live server, not yet started.
pub struct LiveServer {
    config: LiveServerConfig,
}

/// A running live session. Serving and watching continue until the process
/// exits or [`LiveSession::shutdown`] is called.
pub struct LiveSession {
    addr: SocketAddr,
    server: JoinHandle<Result<(), ServerError>>,
    watch: JoinHandle<()>,
}

impl LiveServer {
    pub fn new(config: LiveServerConfig) -> Self {
        Self { config }
    }

    /// Bind, start serving and start watching the markup sources.
    ///
    /// Changes rerun the matching task from `tasks`; results are announced on
    /// `hub`.
    pub async fn start(
        self,
        hub: ReloadHub,
        tasks: Arc<TaskContext>,
    ) -> Result<LiveSession, ServerError> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .map_err(|_| {
                ServerError::Address(format!("{}:{}", self.config.host, self.config.port))
            })?;

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindError(addr, e.to_string()))?;
        let addr = listener
            .local_addr()
            .map_err(|e| ServerError::BindError(addr, e.to_string()))?;

        // Set up file watcher
        let layout = tasks.layout().clone();
        let (watcher, mut rx) =
            FileWatcher::new(&[layout.source.clone()], WatchRoute::for_layout(&layout))
                .map_err(|e| ServerError::WatchError(e.to_string()))?;

        let watch_hub = hub.clone();
        let watch = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                tokio::spawn(handle_watch_event(
                    Arc::clone(&tasks),
                    watch_hub.clone(),
                    event,
                ));
            }
            // Keep watcher alive
            drop(watcher);
        });

        let app = router(&self.config, hub);
        let server = tokio::spawn(async move {
            axum::serve(listener, app)
                .await
                .map_err(|e| ServerError::Serve(e.to_string()))
        });

        let url = format!("http://{}", addr);
        tracing::info!("Serving {} at {}", self.config.root.display(), url);

        if self.config.open {
            if let Err(e) = open::that(&url) {
                tracing::warn!("Could not open browser: {}", e);
            }
        }

        Ok(LiveSession {
            addr,
            server,
            watch,
        })
    }
}

impl LiveSession {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Wait for the server to stop, which only happens on error.
    pub async fn wait(self) -> Result<(), ServerError> {
        let result = match self.server.await {
            Ok(result) => result,
            Err(e) => Err(ServerError::Serve(e.to_string())),
        };
        self.watch.abort();
        result
    }

    /// Stop serving and watching.
    pub fn shutdown(self) {
        self.server.abort();
        self.watch.abort();
    }
}

fn router(config: &LiveServerConfig, hub: ReloadHub) -> Router {
    Router::new()
        .route(SOCKET_PATH, get(ws_handler))
        .route(CLIENT_PATH, get(client_handler))
        .fallback_service(ServeDir::new(&config.root))
        .layer(middleware::map_response(inject_client))
        .with_state(hub)
}

/// Rerun the task for a change and signal browsers.
async fn handle_watch_event(tasks: Arc<TaskContext>, hub: ReloadHub, event: WatchEvent) {
    tracing::info!("{} changed: {}", event.task, event.path.display());

    let task = event.task;
    let run = {
        let tasks = Arc::clone(&tasks);
        tokio::task::spawn_blocking(move || tasks.run(task)).await
    };

    match run {
        Ok(Ok(outcome @ TaskOutcome::Styles(_))) => {
            let pushed = hub.push_styles(&outcome, &tasks.layout().output);
            tracing::info!("Finished '{}': {} (pushed {})", task, outcome.summary(), pushed);
        }
        Ok(Ok(outcome)) => {
            tracing::info!("Finished '{}': {}", task, outcome.summary());
            hub.reload();
        }
        Ok(Err(e)) => tracing::error!("'{}' failed: {}", task, e),
        Err(e) => tracing::error!("'{}' panicked: {}", task, e),
    }
}

/// Handler for the reload WebSocket endpoint.
async fn ws_handler(ws: WebSocketUpgrade, State(hub): State<ReloadHub>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, hub))
}

/// Forward reload messages to one browser.
async fn handle_ws(mut socket: WebSocket, hub: ReloadHub) {
    let mut rx = hub.subscribe();

    if send_message(&mut socket, &ReloadMessage::Connected)
        .await
        .is_err()
    {
        return;
    }

    loop {
        match rx.recv().await {
            Ok(msg) => {
                if send_message(&mut socket, &msg).await.is_err() {
                    break;
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!("Browser lagged by {} messages", skipped);
                if send_message(&mut socket, &ReloadMessage::Reload)
                    .await
                    .is_err()
                {
                    break;
                }
            }
            Err(RecvError::Closed) => break,
        }
    }
}

async fn send_message(socket: &mut WebSocket, msg: &ReloadMessage) -> Result<(), ()> {
    let json = serde_json::to_string(msg).map_err(|_| ())?;
    socket
        .send(Message::Text(json.into()))
        .await
        .map_err(|_| ())
}

/// Handler for the client script.
async fn client_handler() -> impl IntoResponse {
    ([(CONTENT_TYPE, "application/javascript")], client_script())
}

/// Add the client script tag to complete HTML responses.
async fn inject_client(response: Response) -> Response {
    if response.status() != StatusCode::OK {
        return response;
    }

    let is_html = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("text/html"));
    if !is_html {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!("Failed to read HTML response: {}", e);
            return Response::from_parts(parts, Body::empty());
        }
    };

    let html = inject_script(&String::from_utf8_lossy(&bytes));
    parts.headers.remove(CONTENT_LENGTH);
    Response::from_parts(parts, Body::from(html))
}

/// Insert the client script tag before `</body>`, or append it.
pub fn inject_script(html: &str) -> String {
    let tag = format!("<script src=\"{}\"></script>", CLIENT_PATH);
    match html.to_ascii_lowercase().rfind("</body>") {
        Some(pos) => format!("{}{}{}", &html[..pos], tag, &html[pos..]),
        None => format!("{}{}", html, tag),
    }
}
