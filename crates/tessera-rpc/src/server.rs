// crates/tessera-rpc/src/server.rs
//
// RPC server: TesseraRpcServer and RpcConfig.
//
// A single tonic service accepts a JSON envelope `{method, params}`,
// dispatches on the method name and answers `{success, result, error}`.
// No proto codegen is involved; tonic provides transport and interception.

use std::sync::Arc;
use std::time::Instant;

use http_body::Body as HttpBody;
use http_body_util::BodyExt;
use serde::{Deserialize, Serialize};
use tonic::transport::Server;
use tonic::Status;

use tessera_consensus::SlotCoordinator;

use crate::handlers;
use crate::middleware;

// ---------------------------------------------------------------------------
// RpcConfig
// ---------------------------------------------------------------------------

/// Listen address of the RPC server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    pub host: String,
    pub port: u16,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 50061,
        }
    }
}

// ---------------------------------------------------------------------------
// JSON-RPC Envelope
// ---------------------------------------------------------------------------

/// Request envelope: a method name such as "slot/status" and its params.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub method: String,
    pub params: serde_json::Value,
}

/// Response envelope. Exactly one of `result` and `error` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub success: bool,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl JsonRpcResponse {
    fn failure(error: String) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error),
        }
    }
}

// ---------------------------------------------------------------------------
// TesseraRpcServer
// ---------------------------------------------------------------------------

/// JSON-RPC front end for a running coordinator.
#[derive(Clone)]
pub struct TesseraRpcServer {
    config: RpcConfig,
    service: TesseraServiceImpl,
}

impl std::fmt::Debug for TesseraRpcServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TesseraRpcServer")
            .field("config", &self.config)
            .field("peer_count", &self.service.peer_count)
            .finish()
    }
}

impl TesseraRpcServer {
    /// Creates a new RPC server.
    ///
    /// # Arguments
    /// * `config` - Listen address.
    /// * `coordinator` - Coordinator that answers every method.
    pub fn new(config: RpcConfig, coordinator: Arc<SlotCoordinator>) -> Self {
        Self {
            config,
            service: TesseraServiceImpl {
                coordinator,
                peer_count: 0,
                start_time: Instant::now(),
            },
        }
    }

    /// Number of configured peers, reported by node/health.
    pub fn with_peer_count(mut self, peer_count: usize) -> Self {
        self.service.peer_count = peer_count;
        self
    }

    /// Override the instant uptime is measured from.
    pub fn with_start_time(mut self, start_time: Instant) -> Self {
        self.service.start_time = start_time;
        self
    }

    /// Handle one request in-process, bypassing the transport.
    pub async fn handle(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        self.service.dispatch(request).await
    }

    /// Bind and serve until the process exits.
    pub async fn start(&self) -> Result<(), Box<dyn std::error::Error>> {
        let addr = format!("{}:{}", self.config.host, self.config.port).parse()?;

        tracing::info!("Tessera RPC server starting on {}", addr);

        Server::builder()
            .accept_http1(true)
            .add_service(tonic::service::interceptor::InterceptedService::new(
                TesseraJsonRpcServer::new(self.service.clone()),
                middleware::logging_interceptor,
            ))
            .serve(addr)
            .await?;

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct TesseraServiceImpl {
    coordinator: Arc<SlotCoordinator>,
    peer_count: usize,
    start_time: Instant,
}

impl TesseraServiceImpl {
    async fn dispatch(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let coordinator = self.coordinator.clone();
        let result = match request.method.as_str() {
            "peer/submit_scores" => {
                dispatch_handler(request.params, |r| async move {
                    handlers::peer::handle_submit_scores(&coordinator, r).await
                })
                .await
            }
            "slot/status" => {
                dispatch_handler(request.params, |r| async move {
                    handlers::slot::handle_get_slot_status(&coordinator, r).await
                })
                .await
            }
            "slot/commit" => {
                dispatch_handler(request.params, |r| async move {
                    handlers::slot::handle_get_slot_commit(&coordinator, r).await
                })
                .await
            }
            "trust/get" => {
                dispatch_handler(request.params, |r| async move {
                    handlers::trust::handle_get_trust(&coordinator, r).await
                })
                .await
            }
            "node/health" => {
                let peer_count = self.peer_count;
                let uptime = self.start_time.elapsed().as_secs();
                dispatch_handler(request.params, |r| async move {
                    handlers::node::handle_get_health(&coordinator, r, peer_count, uptime).await
                })
                .await
            }
            _ => Err(format!("Unknown method: {}", request.method)),
        };

        match result {
            Ok(value) => JsonRpcResponse {
                success: true,
                result: Some(value),
                error: None,
            },
            Err(err) => JsonRpcResponse::failure(err),
        }
    }
}

/// Deserialize params, run the handler, serialize its response.
async fn dispatch_handler<Req, Resp, F, Fut>(
    params: serde_json::Value,
    handler: F,
) -> Result<serde_json::Value, String>
where
    Req: serde::de::DeserializeOwned,
    Resp: serde::Serialize,
    F: FnOnce(Req) -> Fut,
    Fut: std::future::Future<Output = Result<Resp, String>>,
{
    let request: Req = serde_json::from_value(params)
        .map_err(|e| format!("Failed to deserialize request: {}", e))?;
    let response = handler(request).await?;
    serde_json::to_value(response).map_err(|e| format!("Failed to serialize response: {}", e))
}

// ---------------------------------------------------------------------------
// Tonic Service Wiring
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct TesseraJsonRpcServer {
    inner: TesseraServiceImpl,
}

impl TesseraJsonRpcServer {
    fn new(inner: TesseraServiceImpl) -> Self {
        Self { inner }
    }
}

impl tonic::server::NamedService for TesseraJsonRpcServer {
    const NAME: &'static str = "tessera.rpc.TesseraService";
}

/// Request path served by the JSON-RPC service. Any method suffix routes the
/// same way; the method name travels in the envelope.
pub const RPC_PATH: &str = "/tessera.rpc.TesseraService/Call";

/// Full request URL for a node whose base URL is `base`.
pub fn rpc_url(base: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), RPC_PATH)
}

impl<B> tower_service::Service<http::Request<B>> for TesseraJsonRpcServer
where
    B: HttpBody + Send + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>> + Send,
    B::Data: Send,
{
    type Response = http::Response<tonic::body::BoxBody>;
    type Error = std::convert::Infallible;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: http::Request<B>) -> Self::Future {
        let inner = self.inner.clone();

        Box::pin(async move {
            let body_bytes = match collect_body(req.into_body()).await {
                Ok(b) => b,
                Err(e) => {
                    tracing::warn!("Failed to read request body: {}", e);
                    let resp = JsonRpcResponse::failure(format!("Failed to read request body: {}", e));
                    return Ok(build_response(&resp));
                }
            };

            let rpc_request: JsonRpcRequest = match serde_json::from_slice(&body_bytes) {
                Ok(r) => r,
                Err(e) => {
                    let resp = JsonRpcResponse::failure(format!("Invalid JSON-RPC request: {}", e));
                    return Ok(build_response(&resp));
                }
            };

            let rpc_response = inner.dispatch(rpc_request).await;
            Ok(build_response(&rpc_response))
        })
    }
}

async fn collect_body<B>(body: B) -> Result<Vec<u8>, String>
where
    B: HttpBody + Send,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    B::Data: Send,
{
    let mut collected = Vec::new();
    let mut body = std::pin::pin!(body);

    loop {
        match std::future::poll_fn(|cx| HttpBody::poll_frame(body.as_mut(), cx)).await {
            Some(Ok(frame)) => {
                if let Ok(data) = frame.into_data() {
                    use bytes::Buf;
                    collected.extend_from_slice(data.chunk());
                }
            }
            Some(Err(e)) => return Err(e.into().to_string()),
            None => break,
        }
    }

    Ok(collected)
}

fn build_response(rpc: &JsonRpcResponse) -> http::Response<tonic::body::BoxBody> {
    let json = serde_json::to_vec(rpc).unwrap_or_default();
    let body = tonic::body::BoxBody::new(
        http_body_util::Full::new(bytes::Bytes::from(json))
            .map_err(|e| Status::internal(format!("body error: {}", e))),
    );

    let mut response = http::Response::new(body);
    response.headers_mut().insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("application/json"),
    );
    response
}
