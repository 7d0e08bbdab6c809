//! HTTP listener applying rate limit decisions.

use super::error::{GatewayError, GatewayResult};
use super::proxy::Upstream;
use super::stats::GatewayStats;
use crate::modules::rate_limiting::{Decision, RateLimitEvaluator};
use bytes::Bytes;
use http::header::{CONTENT_TYPE, RETRY_AFTER};
use http::{HeaderValue, StatusCode};
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Body type of gateway responses.
pub type GatewayBody = BoxBody<Bytes, hyper::Error>;

fn full(text: &'static str) -> GatewayBody {
    Full::new(Bytes::from_static(text.as_bytes()))
        .map_err(|never| match never {})
        .boxed()
}

fn rejection_text(decision: &Decision) -> &'static str {
    match decision {
        Decision::MissingApiKey => "Missing API key",
        Decision::UnknownRoute => "Not Found",
        Decision::NoPolicy { .. } => "No rate limit policy for this endpoint",
        Decision::Blocked { .. } => "API key blocked",
        _ => "Too Many Requests",
    }
}

/// Reply for a rejected request.
fn rejection(decision: &Decision, status: StatusCode) -> Response<GatewayBody> {
    let mut resp = Response::new(full(rejection_text(decision)));
    *resp.status_mut() = status;
    let headers = resp.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    if let Some(rate_headers) = decision.headers() {
        rate_headers.apply(headers);
    }
    if let Decision::Blocked { retry_after } = decision {
        headers.insert(RETRY_AFTER, HeaderValue::from(*retry_after));
    }
    resp
}

fn bad_gateway() -> Response<GatewayBody> {
    let mut resp = Response::new(full("Bad Gateway"));
    *resp.status_mut() = StatusCode::BAD_GATEWAY;
    resp
}

/// Evaluate, then reject or forward one request.
pub(crate) async fn handle_request(
    req: Request<Incoming>,
    evaluator: &RateLimitEvaluator,
    upstream: &Upstream,
    stats: &GatewayStats,
) -> Result<Response<GatewayBody>, Infallible> {
    let decision = evaluator
        .evaluate(req.method().as_str(), req.uri().path(), req.headers())
        .await;
    stats.record(&decision);

    if let Some(status) = decision.rejection_status() {
        debug!(?decision, %status, "request rejected");
        return Ok(rejection(&decision, status));
    }

    match upstream.forward(req).await {
        Ok(resp) => {
            let mut resp = resp.map(BodyExt::boxed);
            if let Some(rate_headers) = decision.headers() {
                rate_headers.apply(resp.headers_mut());
            }
            Ok(resp)
        },
        Err(e) => {
            stats.record_upstream_error();
            warn!(error = %e, "upstream request failed");
            Ok(bad_gateway())
        },
    }
}

/// The gateway HTTP server.
#[derive(Debug)]
pub struct GatewayServer {
    listen: SocketAddr,
    evaluator: Arc<RateLimitEvaluator>,
    upstream: Arc<Upstream>,
    stats: Arc<GatewayStats>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    task: Option<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
}

impl GatewayServer {
    /// Create a server. Nothing is bound until [`GatewayServer::start`].
    #[must_use]
    pub fn new(listen: SocketAddr, evaluator: Arc<RateLimitEvaluator>, upstream: Upstream) -> Self {
        Self {
            listen,
            evaluator,
            upstream: Arc::new(upstream),
            stats: Arc::new(GatewayStats::new()),
            shutdown_tx: None,
            task: None,
            local_addr: None,
        }
    }

    /// Request counters.
    #[must_use]
    pub fn stats(&self) -> &Arc<GatewayStats> {
        &self.stats
    }

    /// Bind and start accepting connections.
    ///
    /// Returns the bound address, which differs from the configured one when
    /// port 0 was requested.
    ///
    /// # Errors
    ///
    /// Returns an error if the server is running or the address cannot be
    /// bound.
    pub async fn start(&mut self) -> GatewayResult<SocketAddr> {
        if self.shutdown_tx.is_some() {
            return Err(GatewayError::AlreadyRunning);
        }

        let addr = self.listen;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| GatewayError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| GatewayError::Bind { addr, source })?;

        info!(%local_addr, "gateway listening");

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        self.shutdown_tx = Some(shutdown_tx);
        self.local_addr = Some(local_addr);

        let evaluator = Arc::clone(&self.evaluator);
        let upstream = Arc::clone(&self.upstream);
        let stats = Arc::clone(&self.stats);

        self.task = Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    accept_result = listener.accept() => {
                        match accept_result {
                            Ok((stream, remote_addr)) => {
                                debug!(%remote_addr, "new connection");

                                let evaluator = Arc::clone(&evaluator);
                                let upstream = Arc::clone(&upstream);
                                let stats = Arc::clone(&stats);

                                tokio::spawn(async move {
                                    let io = TokioIo::new(stream);

                                    let service = service_fn(move |req| {
                                        let evaluator = Arc::clone(&evaluator);
                                        let upstream = Arc::clone(&upstream);
                                        let stats = Arc::clone(&stats);

                                        async move {
                                            handle_request(req, &evaluator, &upstream, &stats).await
                                        }
                                    });

                                    if let Err(e) = http1::Builder::new()
                                        .serve_connection(io, service)
                                        .await
                                    {
                                        debug!("connection error: {e}");
                                    }
                                });
                            }
                            Err(e) => {
                                error!("accept error: {e}");
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("gateway shutting down");
                        break;
                    }
                }
            }
        }));

        Ok(local_addr)
    }

    /// Stop accepting connections.
    ///
    /// # Errors
    ///
    /// Returns an error if the server is not running.
    pub async fn stop(&mut self) -> GatewayResult<()> {
        let tx = self.shutdown_tx.take().ok_or(GatewayError::NotRunning)?;
        let _ = tx.send(()).await;
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "gateway accept loop failed");
            }
        }
        self.local_addr = None;
        Ok(())
    }

    /// Check if the server is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shutdown_tx.is_some()
    }

    /// Bound address while running.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }
}
