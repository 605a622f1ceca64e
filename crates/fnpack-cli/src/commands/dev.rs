//! `fnpack dev` command implementation.
//!
//! A thin front server for development:
//!
//! ```text
//! GET /robots.txt        → public/robots.txt
//! GET /app/root.tsx      → excluded, served from the project as-is
//! GET /blog/post-1       → forwarded to --upstream
//! ```
//!
//! Request classification happens in `fnpack_core::dev`; this module only
//! does the HTTP plumbing.

use super::load_project;
use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    Router,
};
use fnpack_core::{DevRouter, Dispatch};
use miette::{IntoDiagnostic, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::services::ServeDir;

/// Largest request body forwarded upstream.
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Headers that describe a single connection and are not forwarded.
const HOP_BY_HOP: &[header::HeaderName] = &[
    header::CONNECTION,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
    header::TE,
    header::TRAILER,
    header::PROXY_AUTHORIZATION,
];

/// Dev server action.
#[derive(Debug, Clone)]
pub struct DevAction {
    pub cwd: std::path::PathBuf,
    pub upstream: String,
    pub port: u16,
    pub host: String,
    pub exclude: Vec<String>,
}

struct DevState {
    router: DevRouter,
    upstream: String,
    client: reqwest::Client,
}

/// Run the dev server until interrupted.
pub async fn run(action: DevAction) -> Result<()> {
    let (root, mut config) = load_project(&action.cwd).into_diagnostic()?;
    config.exclude.extend(action.exclude);

    let router = DevRouter::new(&root, &config);
    let public_dir = root.join(&config.public_dir);

    let state = Arc::new(DevState {
        router,
        upstream: action.upstream.trim_end_matches('/').to_string(),
        client: reqwest::Client::new(),
    });

    // Public files first, then the project itself for excluded requests.
    let statics = ServeDir::new(&public_dir).fallback(ServeDir::new(&root));
    let app = Router::new()
        .fallback_service(statics)
        .layer(middleware::from_fn_with_state(state.clone(), dispatch));

    let host_ip = if action.host == "localhost" {
        "127.0.0.1".to_string()
    } else {
        action.host.clone()
    };
    let addr: SocketAddr = format!("{host_ip}:{}", action.port)
        .parse()
        .into_diagnostic()?;

    println!();
    println!("  Dev server running at http://{}:{}", action.host, action.port);
    println!("  Forwarding app requests to {}", state.upstream);
    println!("  Server entry: {}", state.router.entry());
    println!();
    println!("  Press Ctrl+C to stop");
    println!();

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .into_diagnostic()?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .into_diagnostic()
}

async fn dispatch(State(state): State<Arc<DevState>>, req: Request, next: Next) -> Response {
    let url = req
        .uri()
        .path_and_query()
        .map_or_else(|| req.uri().path().to_string(), |pq| pq.as_str().to_string());

    match state.router.dispatch(&url) {
        Dispatch::Public(file) => {
            tracing::debug!(%url, file = %file.display(), "public");
            next.run(req).await
        }
        Dispatch::Skip => {
            tracing::debug!(%url, "excluded");
            next.run(req).await
        }
        Dispatch::App => {
            if let Err(message) = state.router.check_entry() {
                tracing::error!(%url, "{message}");
                return (StatusCode::INTERNAL_SERVER_ERROR, message).into_response();
            }
            match forward(&state, &url, req).await {
                Ok(response) => response,
                Err(e) => {
                    tracing::error!(%url, error = %e, "upstream request failed");
                    (StatusCode::INTERNAL_SERVER_ERROR, format!("Unknown error: {e}"))
                        .into_response()
                }
            }
        }
    }
}

async fn forward(
    state: &DevState,
    url: &str,
    req: Request,
) -> std::result::Result<Response, Box<dyn std::error::Error + Send + Sync>> {
    let (parts, body) = req.into_parts();
    let body = axum::body::to_bytes(body, MAX_BODY_BYTES).await?;

    let mut headers = strip_hop_by_hop(&parts.headers);
    headers.remove(header::HOST);

    let upstream = state
        .client
        .request(parts.method, format!("{}{url}", state.upstream))
        .headers(headers)
        .body(body)
        .send()
        .await?;

    let mut response = Response::builder().status(upstream.status());
    if let Some(out) = response.headers_mut() {
        *out = strip_hop_by_hop(upstream.headers());
    }
    Ok(response.body(Body::from_stream(upstream.bytes_stream()))?)
}

fn strip_hop_by_hop(headers: &HeaderMap) -> HeaderMap {
    let mut out = headers.clone();
    for name in HOP_BY_HOP {
        out.remove(name);
    }
    out
}
