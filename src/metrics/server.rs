//! Metrics and health HTTP server

use std::convert::Infallible;
use std::net::SocketAddr;

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use prometheus::{Encoder, TextEncoder};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::exporter::MetricsContext;
use crate::error::{Error, Result};

/// Bind the metrics listener on `addr`
pub async fn bind(addr: &str) -> Result<TcpListener> {
    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| Error::InvalidConfig(format!("Invalid metrics server address: {}", e)))?;

    TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Internal(format!("Failed to bind metrics server: {}", e)))
}

/// Serve `/metrics` and `/healthz` until `shutdown` fires
pub async fn serve(
    listener: TcpListener,
    context: MetricsContext,
    shutdown: CancellationToken,
) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("Metrics server listening on {}", addr);
    }

    loop {
        let (stream, _) = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => accepted
                .map_err(|e| Error::Internal(format!("Metrics server accept error: {}", e)))?,
        };

        let io = TokioIo::new(stream);
        let context = context.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                let context = context.clone();
                async move { Ok::<_, Infallible>(route(&context, req.uri().path())) }
            });

            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                error!("Metrics server connection error: {}", e);
            }
        });
    }

    info!("Metrics server stopped");
    Ok(())
}

fn route(context: &MetricsContext, path: &str) -> Response<Full<Bytes>> {
    match path {
        "/metrics" => match context.render() {
            Ok(body) => {
                let mut response = text_response(StatusCode::OK, body);
                if let Ok(value) = HeaderValue::from_str(TextEncoder::new().format_type()) {
                    response.headers_mut().insert(CONTENT_TYPE, value);
                }
                response
            }
            Err(e) => {
                warn!(error = %e, "Failed to render metrics");
                text_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
        },
        "/healthz" | "/livez" | "/readyz" => text_response(StatusCode::OK, "ok"),
        _ => text_response(StatusCode::NOT_FOUND, "not found"),
    }
}

fn text_response(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::LruCache;
    use crate::metrics::StatsExporter;
    use crate::stats::StatsAggregator;
    use crate::store::EntityStore;
    use assert_matches::assert_matches;
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    fn context() -> MetricsContext {
        let store = Arc::new(EntityStore::new());
        let cache: Arc<LruCache<String, u32>> = Arc::new(LruCache::new(2).unwrap());
        MetricsContext {
            exporter: Arc::new(StatsExporter::new().unwrap()),
            aggregator: StatsAggregator::new(store, cache.clone(), None),
            cache,
            audit: None,
        }
    }

    async fn get(addr: SocketAddr, path: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!(
            "GET {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
            path
        );
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[test]
    fn test_route_status_codes() {
        let ctx = context();
        assert_eq!(route(&ctx, "/healthz").status(), StatusCode::OK);
        assert_eq!(route(&ctx, "/metrics").status(), StatusCode::OK);
        assert_eq!(route(&ctx, "/nope").status(), StatusCode::NOT_FOUND);
        assert!(route(&ctx, "/metrics").headers().contains_key(CONTENT_TYPE));
    }

    #[tokio::test]
    async fn test_bind_rejects_bad_address() {
        assert_matches!(bind("not-an-address").await, Err(Error::InvalidConfig(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_serves_until_shutdown() {
        let listener = bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = CancellationToken::new();
        let server = tokio::spawn(serve(listener, context(), shutdown.clone()));

        let health = get(addr, "/healthz").await;
        assert!(health.starts_with("HTTP/1.1 200 OK"));
        assert!(health.ends_with("ok"));

        let metrics = get(addr, "/metrics").await;
        assert!(metrics.starts_with("HTTP/1.1 200 OK"));
        assert!(metrics.contains("gradebook_cache_capacity 2"));

        let missing = get(addr, "/missing").await;
        assert!(missing.starts_with("HTTP/1.1 404 Not Found"));

        shutdown.cancel();
        server.await.unwrap().unwrap();
    }
}
