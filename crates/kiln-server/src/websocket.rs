//! WebSocket-based live reload.

use std::path::{Component, Path};

use kiln_tasks::TaskOutcome;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Path of the reload WebSocket endpoint.
pub const SOCKET_PATH: &str = "/__kiln/ws";

/// Path the client script is served from.
pub const CLIENT_PATH: &str = "/__kiln/client.js";

/// Messages sent to browsers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReloadMessage {
    /// Connection established
    Connected,

    /// Full page reload
    Reload,

    /// Swap one stylesheet without reloading
    Css {
        /// URL path of the stylesheet, e.g. `/assets/css/site.css`
        path: String,
    },
}

/// Hub for broadcasting reload messages to all connected browsers.
#[derive(Debug, Clone)]
pub struct ReloadHub {
    sender: broadcast::Sender<ReloadMessage>,
}

impl ReloadHub {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(100);
        Self { sender }
    }

    /// Send a message to all connected browsers.
    pub fn send(&self, msg: ReloadMessage) {
        // No receivers just means no browser is open.
        let _ = self.sender.send(msg);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReloadMessage> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Ask every browser for a full reload.
    pub fn reload(&self) {
        self.send(ReloadMessage::Reload);
    }

    /// Push every stylesheet a style task wrote. Returns how many were sent.
    pub fn push_styles(&self, outcome: &TaskOutcome, output_root: &Path) -> usize {
        let TaskOutcome::Styles(report) = outcome else {
            return 0;
        };

        for style in &report.written {
            self.send(ReloadMessage::Css {
                path: url_path(output_root, &style.output),
            });
        }
        report.written.len()
    }
}

impl Default for ReloadHub {
    fn default() -> Self {
        Self::new()
    }
}

/// URL path of a file inside the served root.
pub fn url_path(root: &Path, file: &Path) -> String {
    let relative = file.strip_prefix(root).unwrap_or(file);
    let parts: Vec<&str> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => s.to_str(),
            _ => None,
        })
        .collect();
    format!("/{}", parts.join("/"))
}

/// Generate the browser-side client script.
pub fn client_script() -> String {
    format!(
        r#"
(function() {{
  'use strict';

  var proto = location.protocol === 'https:' ? 'wss://' : 'ws://';
  var ws = new WebSocket(proto + location.host + '{socket}');
  var attempts = 0;

  function swapStylesheet(path) {{
    var links = document.querySelectorAll('link[rel="stylesheet"]');
    var swapped = false;
    links.forEach(function(link) {{
      var url = new URL(link.href, location.href);
      if (url.pathname === path) {{
        url.searchParams.set('kiln', Date.now());
        link.href = url.toString();
        swapped = true;
      }}
    }});
    return swapped;
  }}

  ws.onopen = function() {{
    attempts = 0;
  }};

  ws.onmessage = function(event) {{
    var msg = JSON.parse(event.data);

    switch (msg.type) {{
      case 'reload':
        location.reload();
        break;

      case 'css':
        if (swapStylesheet(msg.path)) {{
          console.log('[kiln] Updated ' + msg.path);
        }}
        break;

      case 'connected':
        console.log('[kiln] Live reload connected');
        break;
    }}
  }};

  ws.onclose = function() {{
    if (attempts < 10) {{
      attempts++;
      setTimeout(function() {{
        location.reload();
      }}, 1000 * attempts);
    }}
  }};
}})();
"#,
        socket = SOCKET_PATH
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_tasks::{CompiledStyle, StyleReport};
    use std::path::PathBuf;

    #[test]
    fn hub_broadcasts_messages() {
        let hub = ReloadHub::new();
        let mut rx = hub.subscribe();

        hub.reload();

        match rx.try_recv() {
            Ok(ReloadMessage::Reload) => {}
            other => panic!("Expected Reload message, got {:?}", other),
        }
    }

    #[test]
    fn serializes_messages() {
        let msg = ReloadMessage::Css {
            path: "/assets/css/site.css".to_string(),
        };

        let json = serde_json::to_string(&msg).unwrap();

        assert_eq!(json, r#"{"type":"css","path":"/assets/css/site.css"}"#);
        assert_eq!(
            serde_json::to_string(&ReloadMessage::Reload).unwrap(),
            r#"{"type":"reload"}"#
        );
    }

    #[test]
    fn pushes_written_styles_as_urls() {
        let hub = ReloadHub::new();
        let mut rx = hub.subscribe();
        let outcome = TaskOutcome::Styles(StyleReport {
            written: vec![CompiledStyle {
                source: PathBuf::from("markup/assets/css/site.scss"),
                output: PathBuf::from("dist/assets/css/site.css"),
                map: None,
            }],
            ..StyleReport::default()
        });

        assert_eq!(hub.push_styles(&outcome, Path::new("dist")), 1);
        assert_eq!(
            rx.try_recv().unwrap(),
            ReloadMessage::Css {
                path: "/assets/css/site.css".to_string()
            }
        );
    }

    #[test]
    fn client_script_uses_socket_path() {
        let script = client_script();
        assert!(script.contains(SOCKET_PATH));
        assert!(script.contains("location.reload()"));
    }
}
