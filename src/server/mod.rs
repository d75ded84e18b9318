//! Local viewer server
//!
//! Serves the browser viewer and a small JSON API over the context store.
//! Optionally runs the feedback agent in the same process.

pub mod http;
pub mod snapshot;
pub mod watcher;

use anyhow::{Context, Result};
use axum::{
    http::header,
    response::{Html, IntoResponse},
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::agent::FeedbackAgent;
use crate::config::Config;
use crate::store::ContextStore;

pub use snapshot::{Snapshot, SnapshotCache};
pub use watcher::{DocumentChange, DocumentWatcher};

const INDEX_HTML: &str = include_str!("assets/index.html");
const APP_JS: &str = include_str!("assets/app.js");
const STYLE_CSS: &str = include_str!("assets/style.css");

/// Shared server state
#[derive(Clone)]
pub struct ServerState {
    pub config: Arc<Config>,
    pub store: Arc<ContextStore>,
    pub snapshots: Arc<SnapshotCache>,
}

impl ServerState {
    pub fn new(config: Arc<Config>, store: Arc<ContextStore>) -> Self {
        Self {
            config,
            store,
            snapshots: Arc::new(SnapshotCache::new()),
        }
    }
}

/// Build the application router
pub fn router(state: ServerState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut app = Router::new()
        .route("/", get(index_page))
        .route("/index.html", get(index_page))
        .route("/app.js", get(app_js))
        .route("/style.css", get(style_css))
        .route("/api/state", get(http::state_handler))
        .route("/api/context", get(http::context_handler))
        .route("/api/feedback", get(http::feedback_handler).post(http::submit_feedback_handler))
        .route("/api/ux_config", get(http::ux_config_handler))
        .route("/api/memory", get(http::memory_handler))
        .route("/api/focus", post(http::focus_handler))
        .route("/api/status", get(http::status_handler));

    if let Some(dir) = &state.config.server.asset_dir {
        app = app.nest_service("/static", ServeDir::new(dir));
    }

    app.layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the viewer server, and the feedback agent when `with_agent` is set
pub async fn start(config: Config, with_agent: bool) -> Result<()> {
    let store = Arc::new(
        ContextStore::from_config(&config.store)
            .with_context(|| format!("Failed to open context store at {}", config.store.base_dir.display()))?,
    );
    let created = store.init().context("Failed to initialize context store")?;
    for kind in &created {
        info!("Created {}", store.path(*kind).display());
    }

    let host = config.server.host.clone();
    let port = config.server.port;
    let listener = tokio::net::TcpListener::bind((host.as_str(), port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", host, port))?;
    let addr = listener.local_addr().context("Failed to read bound address")?;

    let (shutdown_tx, _) = broadcast::channel::<()>(4);
    let mut tasks = Vec::new();

    let watcher = DocumentWatcher::new(store.clone(), Duration::from_millis(config.server.watch_interval_ms));
    tasks.push(tokio::spawn(watcher.run(shutdown_tx.subscribe())));

    if with_agent {
        let agent = FeedbackAgent::new(store.clone(), &config.agent);
        let rx = shutdown_tx.subscribe();
        tasks.push(tokio::spawn(async move { agent.run(rx).await }));
    }

    let asset_dir = config.server.asset_dir.clone();
    let open_browser = config.server.open_browser;
    let state = ServerState::new(Arc::new(config), store.clone());
    let app = router(state);

    // Print startup message
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("     Context Keeper Viewer Starting");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!();
    println!("✓ Store: {}", store.base_dir().display());
    if with_agent {
        println!("✓ Feedback agent: running in-process");
    } else {
        println!("⚠ Feedback agent: not running (start with --with-agent or `context-keeper agent`)");
    }
    if let Some(dir) = &asset_dir {
        println!("✓ Static files: {} -> /static", dir.display());
    }
    println!();
    println!("🚀 Listening on http://{}", addr);
    println!();

    if open_browser {
        let url = viewer_url(addr);
        if let Err(e) = open_in_browser(&url) {
            warn!("{:#}", e);
        }
    }

    let shutdown = shutdown_tx.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for ctrl-c: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Shutdown requested");
            let _ = shutdown.send(());
        })
        .await
        .context("Server error")?;

    let _ = shutdown_tx.send(());
    for task in tasks {
        let _ = task.await;
    }
    Ok(())
}

/// Handler for the index page
async fn index_page() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn app_js() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/javascript; charset=utf-8")], APP_JS)
}

async fn style_css() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/css; charset=utf-8")], STYLE_CSS)
}

/// URL a local browser should use for the bound address
fn viewer_url(addr: SocketAddr) -> String {
    if addr.ip().is_unspecified() {
        format!("http://localhost:{}/", addr.port())
    } else {
        format!("http://{}/", addr)
    }
}

/// Command that opens `url` in the default browser
fn browser_command(url: &str) -> Command {
    #[cfg(target_os = "macos")]
    {
        let mut cmd = Command::new("open");
        cmd.arg(url);
        cmd
    }

    #[cfg(target_os = "windows")]
    {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", "start", "", url]);
        cmd
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        let mut cmd = Command::new("xdg-open");
        cmd.arg(url);
        cmd
    }
}

fn open_in_browser(url: &str) -> Result<()> {
    browser_command(url)
        .spawn()
        .with_context(|| format!("Failed to open browser for {}", url))?;
    info!("Opened {} in the default browser", url);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_viewer_url() {
        assert_eq!(viewer_url("127.0.0.1:3000".parse().unwrap()), "http://127.0.0.1:3000/");
        assert_eq!(viewer_url("0.0.0.0:4100".parse().unwrap()), "http://localhost:4100/");
    }

    #[test]
    fn test_browser_command_targets_url() {
        let cmd = browser_command("http://127.0.0.1:3000/");
        let args: Vec<_> = cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(args.last().map(String::as_str), Some("http://127.0.0.1:3000/"));

        #[cfg(target_os = "linux")]
        assert_eq!(cmd.get_program(), "xdg-open");
    }
}
