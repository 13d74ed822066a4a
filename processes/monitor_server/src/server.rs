//! HTTP and WebSocket boundary serving the monitor view

use std::sync::Arc;

use aether_module_rate_monitor::WindowedRateMonitor;
use aether_module_stream_view::{MonitorView, ViewBuilder};
use aether_module_topology_store::TopologyStore;
use anyhow::Result;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{header, Uri},
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::future::Future;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

const DASHBOARD_HTML: &str = include_str!("../assets/monitor.html");
const DASHBOARD_JS: &str = include_str!("../assets/monitor.js");

/// Everything a request handler needs to render a view
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<TopologyStore>,
    pub rates: Arc<WindowedRateMonitor>,
    pub builder: Arc<ViewBuilder>,
}

impl AppState {
    /// Render from the most recently published topology
    pub fn render(&self) -> MonitorView {
        self.builder.build(&self.store.snapshot(), self.rates.as_ref())
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/data.json", get(data_json))
        .route("/aether", get(aether_socket))
        .fallback(assets)
        .with_state(state)
}

/// Serve until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!("Serving monitor view on http://{}", listener.local_addr()?);
    axum::serve(listener, router(state)).with_graceful_shutdown(shutdown).await?;
    Ok(())
}

async fn data_json(State(state): State<AppState>) -> Json<MonitorView> {
    Json(state.render())
}

async fn aether_socket(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| reply_with_views(socket, state))
}

/// Answer every inbound message with a freshly rendered view
async fn reply_with_views(mut socket: WebSocket, state: AppState) {
    while let Some(message) = socket.recv().await {
        match message {
            Ok(Message::Text(_)) | Ok(Message::Binary(_)) => {
                let json = match serde_json::to_string(&state.render()) {
                    Ok(json) => json,
                    Err(e) => {
                        warn!("Failed to serialise monitor view: {e}");
                        break;
                    }
                };
                if socket.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!("WebSocket closed: {e}");
                break;
            }
        }
    }
}

/// Any other path: `*.js` is the dashboard script, `*.json` the view, the
/// rest the dashboard page
async fn assets(State(state): State<AppState>, uri: Uri) -> Response {
    let path = uri.path();
    if path.ends_with(".js") {
        ([(header::CONTENT_TYPE, "text/javascript")], DASHBOARD_JS).into_response()
    } else if path.ends_with(".json") {
        Json(state.render()).into_response()
    } else {
        dashboard(&state).into_response()
    }
}

fn dashboard(state: &AppState) -> Html<String> {
    let topology = state.store.snapshot();
    let last_update = match topology.last_update() {
        Some((label, timestamp)) => format!("{label} at {timestamp}"),
        None => "never".to_string(),
    };
    let summary = format!(
        "{} publishers, {} subscribers, {} with rate history, {} snapshots applied, \
         last update {}",
        topology.publisher_count(),
        topology.subscriber_count(),
        state.rates.tracked(),
        topology.generation(),
        last_update,
    );
    Html(DASHBOARD_HTML.replace("{{summary}}", &html_escape(&summary)))
}

fn html_escape(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}
