//! HTTP server runtime.
//!
//! Builds the axum router over a store, tags every request with an id, and
//! serves until the cancellation token fires.

use crate::config::HttpServerConfig;
use crate::services::http_api::{api_routes, ApiState};
use crate::store::Store;
use axum::body::Body;
use axum::http::{HeaderValue, Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::Router;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::timeout::TimeoutLayer;
use uuid::Uuid;

/// Header carrying the per-request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Build the full application router.
///
/// Requests that exceed `timeout` are answered with 408; any scope they had
/// open is dropped and rolled back.
pub fn build_router<S: Store + 'static>(store: Arc<S>, timeout: Duration) -> Router {
    api_routes::<S>()
        .with_state(ApiState::new(store))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            timeout,
        ))
        .layer(middleware::from_fn(request_logging))
}

/// Assign a request id and log method, path, status and latency.
///
/// An incoming `x-request-id` is kept; otherwise a UUID v4 is generated.
async fn request_logging(mut request: Request<Body>, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let header_value = HeaderValue::from_str(&request_id).ok();
    if let Some(value) = &header_value {
        request.headers_mut().insert(REQUEST_ID_HEADER, value.clone());
    }

    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let mut response = next.run(request).await;

    if let Some(value) = header_value {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    log::info!(
        "[http] {} {} -> {} in {}ms request_id={}",
        method,
        path,
        response.status().as_u16(),
        started.elapsed().as_millis(),
        request_id
    );

    response
}

/// Bind the configured address and serve until `cancel` fires.
pub async fn run<S: Store + 'static>(
    store: Arc<S>,
    settings: &HttpServerConfig,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    let app = build_router(store, Duration::from_secs(settings.timeout_secs));

    let addr = settings.listen_addr();
    let listener = TcpListener::bind(&addr).await?;

    log::info!("[server] Listening on http://{}", addr);

    serve(listener, app, cancel).await
}

/// Serve `app` on an already bound listener with graceful shutdown.
pub async fn serve(
    listener: TcpListener,
    app: Router,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            cancel.cancelled().await;
        })
        .await?;

    log::info!("[server] Server stopped");
    Ok(())
}

/// Cancel `cancel` on Ctrl-C or SIGTERM.
pub async fn shutdown_on_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("[server] Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                log::error!("[server] Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    log::info!("[server] Shutdown signal received");
    cancel.cancel();
}
