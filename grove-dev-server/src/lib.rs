use anyhow::Result;
use axum::{
    Router,
    extract::State,
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use log::{debug, info, warn};
use std::{net::SocketAddr, path::PathBuf};
use tokio::sync::broadcast;
use tower_http::services::ServeDir;

/// Path of the websocket that pushes reload messages.
pub const LIVERELOAD_PATH: &str = "/__livereload";

/// Configuration for the live development server
#[derive(Debug, Clone)]
pub struct LiveServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to serve on
    pub port: u16,
    /// Directory to serve
    pub root: PathBuf,
    /// Auto-open browser
    pub open: bool,
}

impl Default for LiveServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            root: PathBuf::from("dist"),
            open: false,
        }
    }
}

/// Tells every connected browser to reload.
#[derive(Clone)]
pub struct ReloadHandle {
    tx: broadcast::Sender<String>,
}

impl ReloadHandle {
    /// Returns how many browsers were notified.
    pub fn reload(&self) -> usize {
        match self.tx.send("reload".to_string()) {
            Ok(receivers) => {
                debug!("Sent reload to {receivers} client(s)");
                receivers
            }
            Err(_) => 0,
        }
    }
}

/// A static file server with a live-reload websocket. Reloads are triggered
/// through [`ReloadHandle`] once a rebuild has finished writing.
pub struct LiveServer {
    config: LiveServerConfig,
    reload_tx: broadcast::Sender<String>,
}

impl LiveServer {
    pub fn new(config: LiveServerConfig) -> Self {
        let (reload_tx, _) = broadcast::channel::<String>(100);
        Self { config, reload_tx }
    }

    pub fn reload_handle(&self) -> ReloadHandle {
        ReloadHandle {
            tx: self.reload_tx.clone(),
        }
    }

    fn router(&self) -> Router {
        let state = AppState {
            reload_tx: self.reload_tx.clone(),
        };
        Router::new()
            .route(LIVERELOAD_PATH, get(websocket_handler))
            .fallback_service(ServeDir::new(&self.config.root))
            .with_state(state)
    }

    pub async fn run(self) -> Result<()> {
        if !self.config.root.exists() {
            return Err(anyhow::anyhow!(
                "Root directory does not exist: {}",
                self.config.root.display()
            ));
        }

        let app = self.router();
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port).parse()?;

        info!("Serving {} at http://{}", self.config.root.display(), addr);
        debug!("Live reload enabled at ws://{addr}{LIVERELOAD_PATH}");

        if self.config.open {
            if let Err(e) = open::that(format!("http://{addr}")) {
                warn!("Failed to open browser: {e}");
            }
        }

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}

#[derive(Clone)]
struct AppState {
    reload_tx: broadcast::Sender<String>,
}

async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| websocket_connection(socket, state.reload_tx))
}

async fn websocket_connection(mut socket: WebSocket, reload_tx: broadcast::Sender<String>) {
    let mut rx = reload_tx.subscribe();

    if socket
        .send(Message::Text("connected".to_string().into()))
        .await
        .is_err()
    {
        return;
    }

    loop {
        tokio::select! {
            msg = rx.recv() => {
                match msg {
                    Ok(reload_msg) => {
                        if socket.send(Message::Text(reload_msg.into())).await.is_err() {
                            break;
                        }
                    }
                    // A slow client missed messages; one reload covers them all.
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            msg = socket.recv() => {
                if msg.is_none() {
                    break;
                }
            }
        }
    }
}

/// Inject live reload script into HTML content
pub fn inject_livereload_script(html: &str, host: &str, port: u16) -> String {
    let script = format!(
        r#"
<script>
(function() {{
    const socket = new WebSocket('ws://{host}:{port}{LIVERELOAD_PATH}');
    socket.onmessage = function(event) {{
        if (event.data === 'reload') {{
            location.reload();
        }}
    }};
    socket.onclose = function() {{
        console.log('Live reload disconnected');
    }};
}})();
</script>
"#
    );

    if let Some(pos) = html.rfind("</body>") {
        let mut result = String::with_capacity(html.len() + script.len());
        result.push_str(&html[..pos]);
        result.push_str(&script);
        result.push_str(&html[pos..]);
        result
    } else {
        format!("{html}{script}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_goes_before_body_close() {
        let html = inject_livereload_script("<html><body><p>x</p></body></html>", "127.0.0.1", 3000);
        assert!(html.contains("ws://127.0.0.1:3000/__livereload"));
        assert!(html.ends_with("</script>\n</body></html>"));
    }

    #[test]
    fn test_script_appended_without_body() {
        let html = inject_livereload_script("<p>x</p>", "localhost", 8080);
        assert!(html.starts_with("<p>x</p>"));
        assert!(html.contains("ws://localhost:8080/__livereload"));
    }

    #[tokio::test]
    async fn test_reload_reaches_subscribers() {
        let server = LiveServer::new(LiveServerConfig::default());
        let handle = server.reload_handle();
        assert_eq!(handle.reload(), 0);

        let mut rx = server.reload_tx.subscribe();
        assert_eq!(handle.reload(), 1);
        assert_eq!(rx.recv().await.unwrap(), "reload");
    }
}
