// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! HTTP Gateway for slrun.
//!
//! Acts as a reverse proxy, routing requests like `GET /function/{name}/...`
//! to the running container of the named function through the runtime's
//! invocation router.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderValue, Request, Response, StatusCode, Uri},
    response::IntoResponse,
    routing::{any, get},
    Json, Router,
};
use tokio::sync::oneshot;
use tower_http::trace::TraceLayer;

use slrun_core::{FunctionStatus, Invocation, InvokeError, Runtime};

use crate::metrics;

/// Largest request body forwarded to a function.
const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

/// Gateway state shared across handlers.
#[derive(Clone)]
struct GatewayState {
    runtime: Arc<Runtime>,
}

/// Build the gateway router.
pub fn router(runtime: Arc<Runtime>) -> Router {
    Router::new()
        .route("/function/{name}", any(proxy_handler_root))
        .route("/function/{name}/{*path}", any(proxy_handler))
        .route("/functions", get(list_functions))
        .route("/metrics", get(metrics_endpoint))
        .layer(TraceLayer::new_for_http())
        .with_state(GatewayState { runtime })
}

/// Serve the gateway on `addr` until `shutdown` resolves.
///
/// After the signal the listener closes and in-flight requests get `grace`
/// to finish; any still running then are abandoned.
pub async fn serve(
    addr: SocketAddr,
    runtime: Arc<Runtime>,
    shutdown: impl Future<Output = ()> + Send + 'static,
    grace: Duration,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let app = router(runtime);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Gateway listening on http://{}", addr);

    let (signalled_tx, signalled_rx) = oneshot::channel();
    let signal = async move {
        shutdown.await;
        let _ = signalled_tx.send(());
    };

    let mut server =
        tokio::spawn(async move { axum::serve(listener, app).with_graceful_shutdown(signal).await });

    let deadline = async move {
        if signalled_rx.await.is_ok() {
            tokio::time::sleep(grace).await;
        } else {
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        biased;
        result = &mut server => result??,
        _ = deadline => {
            server.abort();
            tracing::warn!(grace_ms = grace.as_millis() as u64, "In-flight requests did not finish in time, abandoning them");
        }
    }

    tracing::info!("Gateway stopped");
    Ok(())
}

async fn list_functions(State(state): State<GatewayState>) -> Json<Vec<FunctionStatus>> {
    Json(state.runtime.statuses())
}

async fn metrics_endpoint(State(state): State<GatewayState>) -> impl IntoResponse {
    let running = state.runtime.statuses().iter().filter(|s| s.running).count();
    metrics::RUNNING_FUNCTIONS.set(running as i64);

    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::metrics_handler(),
    )
}

async fn proxy_handler_root(
    State(state): State<GatewayState>,
    Path(name): Path<String>,
    req: Request<Body>,
) -> Response<Body> {
    proxy_request(state, name, req).await
}

async fn proxy_handler(
    State(state): State<GatewayState>,
    Path((name, _path)): Path<(String, String)>,
    req: Request<Body>,
) -> Response<Body> {
    proxy_request(state, name, req).await
}

async fn proxy_request(state: GatewayState, name: String, req: Request<Body>) -> Response<Body> {
    let path = downstream_path(req.uri());
    let (parts, body) = req.into_parts();

    let body = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(body) => body,
        Err(e) => {
            tracing::warn!(function = %name, error = %e, "Cannot read request body");
            return error_response(StatusCode::BAD_REQUEST, "cannot read request body");
        }
    };

    let invocation = Invocation {
        method: parts.method,
        path,
        headers: parts.headers,
        body,
    };

    let label = match state.runtime.registry().resolve(&name) {
        Some(id) => id.to_string(),
        None => metrics::UNKNOWN_FUNCTION.to_string(),
    };

    let started = Instant::now();
    match state.runtime.forward(&name, invocation).await {
        Ok(response) => {
            metrics::record_invocation(&label, "ok", Some(started.elapsed().as_secs_f64()));

            let mut builder = Response::builder().status(response.status);
            if let Some(headers) = builder.headers_mut() {
                for (key, value) in &response.headers {
                    // The body is re-framed by the gateway.
                    if key != header::TRANSFER_ENCODING && key != header::CONNECTION {
                        headers.append(key, value.clone());
                    }
                }
            }
            builder.body(Body::from(response.body)).unwrap_or_else(|e| {
                tracing::error!(function = %name, error = %e, "Cannot build response");
                error_response(StatusCode::INTERNAL_SERVER_ERROR, "invalid function response")
            })
        }
        Err(e) => {
            let (status, outcome) = match &e {
                InvokeError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
                InvokeError::NotRunning(_) => (StatusCode::SERVICE_UNAVAILABLE, "not_running"),
                InvokeError::Transport { source, .. } if source.is_timeout() => {
                    (StatusCode::GATEWAY_TIMEOUT, "timeout")
                }
                InvokeError::Transport { .. } => (StatusCode::BAD_GATEWAY, "transport"),
            };
            let elapsed = matches!(e, InvokeError::Transport { .. })
                .then(|| started.elapsed().as_secs_f64());
            metrics::record_invocation(&label, outcome, elapsed);

            if status == StatusCode::NOT_FOUND {
                tracing::debug!(function = %name, "Unknown function");
            } else {
                tracing::warn!(function = %name, error = %e, "Invocation failed");
            }
            error_response(status, &e.to_string())
        }
    }
}

fn error_response(status: StatusCode, message: &str) -> Response<Body> {
    let mut response = Response::new(Body::from(format!("{}\n", message)));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

/// Path and query to send to the function: everything after
/// `/function/{name}`, with `/` when nothing is left.
fn downstream_path(uri: &Uri) -> String {
    let path_and_query = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");
    let after_prefix = path_and_query
        .strip_prefix("/function/")
        .unwrap_or(path_and_query);

    // Drop the function-name segment.
    let rest = after_prefix
        .find(['/', '?'])
        .map(|i| &after_prefix[i..])
        .unwrap_or("");

    if rest.is_empty() {
        "/".to_string()
    } else if rest.starts_with('?') {
        format!("/{}", rest)
    } else {
        rest.to_string()
    }
}
