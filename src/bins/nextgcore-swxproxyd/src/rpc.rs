//! JSON RPC over HTTP/2
//!
//! `POST /swx-proxy/v1/{authenticate,register,deregister,disable,enable}`
//! and `GET /swx-proxy/v1/health`. Failures carry `{code, message}` with
//! the HTTP status of the error class.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http2;
use hyper::service::Service;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Mutex};

use crate::proxy::SwxProxyService;
use crate::types::{DisableMessage, StatusCode, SwxProxyError, SwxProxyResult};

const API_PREFIX: [&str; 2] = ["swx-proxy", "v1"];

#[derive(Error, Debug)]
pub enum RpcError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("RPC server already running")]
    AlreadyRunning,
}

/// Status and JSON body of one RPC reply
#[derive(Debug, Clone, PartialEq)]
pub struct RpcResponse {
    pub status: u16,
    pub body: Value,
}

impl RpcResponse {
    fn ok<T: Serialize>(value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(body) => Self { status: 200, body },
            Err(e) => Self::error(&SwxProxyError::Internal(format!("encoding reply: {}", e))),
        }
    }

    fn error(err: &SwxProxyError) -> Self {
        Self {
            status: err.code().http_status(),
            body: json!({ "code": err.code(), "message": err.message() }),
        }
    }

    fn not_found(method: &str, path: &str) -> Self {
        Self {
            status: 404,
            body: json!({ "code": StatusCode::NotFound, "message": format!("no route for {} {}", method, path) }),
        }
    }

    fn reply<T: Serialize>(result: SwxProxyResult<T>) -> Self {
        match result {
            Ok(value) => Self::ok(&value),
            Err(e) => Self::error(&e),
        }
    }
}

fn parse_body<T: DeserializeOwned + Default>(body: &[u8]) -> SwxProxyResult<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| SwxProxyError::InvalidArgument(format!("invalid request body: {}", e)))
}

/// Dispatch one RPC to `service`
pub async fn handle_rpc(service: &dyn SwxProxyService, method: &str, path: &str, body: &[u8]) -> RpcResponse {
    let parts: Vec<&str> = path
        .split('?')
        .next()
        .unwrap_or_default()
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();

    if parts.len() != 3 || parts[..2] != API_PREFIX {
        return RpcResponse::not_found(method, path);
    }

    log::debug!("RPC {} {}", method, path);

    match (parts[2], method) {
        ("authenticate", "POST") => match parse_body(body) {
            Ok(req) => RpcResponse::reply(service.authenticate(req).await),
            Err(e) => RpcResponse::error(&e),
        },
        ("register", "POST") => match parse_body(body) {
            Ok(req) => RpcResponse::reply(service.register(req).await),
            Err(e) => RpcResponse::error(&e),
        },
        ("deregister", "POST") => match parse_body(body) {
            Ok(req) => RpcResponse::reply(service.deregister(req).await),
            Err(e) => RpcResponse::error(&e),
        },
        ("disable", "POST") => match parse_body::<DisableMessage>(body) {
            Ok(req) => RpcResponse::reply(service.disable(req).await.map(|()| json!({}))),
            Err(e) => RpcResponse::error(&e),
        },
        ("enable", "POST") => RpcResponse::reply(service.enable().await.map(|()| json!({}))),
        ("health", "GET") => RpcResponse::reply(service.get_health_status().await),
        _ => RpcResponse::not_found(method, path),
    }
}

/// Hyper service wrapper
#[derive(Clone)]
struct RpcService {
    service: Arc<dyn SwxProxyService>,
}

impl Service<Request<Incoming>> for RpcService {
    type Response = Response<Full<Bytes>>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let service = self.service.clone();

        Box::pin(async move {
            let method = req.method().to_string();
            let path = req.uri().path().to_string();
            let body = match req.into_body().collect().await {
                Ok(collected) => collected.to_bytes(),
                Err(e) => {
                    log::warn!("Failed to read RPC body: {}", e);
                    Bytes::new()
                }
            };

            let reply = handle_rpc(service.as_ref(), &method, &path, &body).await;
            Ok(to_http(reply))
        })
    }
}

fn to_http(reply: RpcResponse) -> Response<Full<Bytes>> {
    let body = Full::new(Bytes::from(reply.body.to_string()));
    let mut response = Response::new(body);
    *response.status_mut() =
        hyper::StatusCode::from_u16(reply.status).unwrap_or(hyper::StatusCode::INTERNAL_SERVER_ERROR);
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("application/json"),
    );
    response
}

enum ServerState {
    Stopped,
    Running(oneshot::Sender<()>),
}

/// HTTP/2 server for the proxy RPCs
pub struct RpcServer {
    addr: SocketAddr,
    state: Mutex<ServerState>,
}

impl RpcServer {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            state: Mutex::new(ServerState::Stopped),
        }
    }

    /// Bind and serve `service`; returns the bound address
    pub async fn start(&self, service: Arc<dyn SwxProxyService>) -> Result<SocketAddr, RpcError> {
        let mut state = self.state.lock().await;
        if matches!(*state, ServerState::Running(_)) {
            return Err(RpcError::AlreadyRunning);
        }

        let listener = TcpListener::bind(self.addr).await.map_err(|source| RpcError::Bind {
            addr: self.addr,
            source,
        })?;
        let bound = listener.local_addr().map_err(|source| RpcError::Bind {
            addr: self.addr,
            source,
        })?;

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        *state = ServerState::Running(shutdown_tx);
        drop(state);

        log::info!("RPC server listening on {}", bound);

        let rpc = RpcService { service };
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, peer)) => {
                                let io = TokioIo::new(stream);
                                let rpc = rpc.clone();
                                tokio::spawn(async move {
                                    if let Err(e) = http2::Builder::new(hyper_util::rt::TokioExecutor::new())
                                        .serve_connection(io, rpc)
                                        .await
                                    {
                                        log::debug!("RPC connection from {} ended: {}", peer, e);
                                    }
                                });
                            }
                            Err(e) => log::error!("RPC accept failed: {}", e),
                        }
                    }
                    _ = &mut shutdown_rx => break,
                }
            }
            log::info!("RPC server stopped");
        });

        Ok(bound)
    }

    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        if let ServerState::Running(shutdown_tx) = std::mem::replace(&mut *state, ServerState::Stopped) {
            let _ = shutdown_tx.send(());
        }
    }

    pub async fn is_running(&self) -> bool {
        matches!(*self.state.lock().await, ServerState::Running(_))
    }
}
