//! Line-delimited JSON RPC server module.
//!
//! # Responsibilities
//! - Bind the configured address at construction time, unless disabled
//! - Accept TCP connections, enforcing `rpc.max_connections` via semaphore
//! - Decode one JSON request per line, dispatch to the method table,
//!   write one JSON response per line
//!
//! # Wire Format
//! ```text
//! → {"id": 1, "method": "ping", "params": null}
//! ← {"id": 1, "result": "pong"}
//! ← {"id": 2, "error": {"code": -32601, "message": "method not found: nope"}}
//! ```
//!
//! # Design Decisions
//! - Permit acquired before accept (backpressure)
//! - Connections observe the serve scope and close between requests
//! - A line longer than `rpc.max_request_bytes` gets an invalid-request
//!   reply and the connection is closed

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::{ConfigAccessor, ConfigAccessorExt, RpcConfig};
use crate::lifecycle::{Module, ModuleIdentity, ModuleKind};
use crate::modules::listener::Socket;
use crate::BoxError;

/// Error returned by a method handler or the request decoder.
#[derive(Debug, Error)]
pub enum RpcError {
    /// The request line is not a valid request object.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("method not found: {0}")]
    MethodNotFound(String),

    /// The params do not fit the method.
    #[error("invalid params: {0}")]
    InvalidParams(String),

    /// The handler failed.
    #[error("{0}")]
    Internal(String),
}

impl RpcError {
    pub fn code(&self) -> i64 {
        match self {
            RpcError::InvalidRequest(_) => -32600,
            RpcError::MethodNotFound(_) => -32601,
            RpcError::InvalidParams(_) => -32602,
            RpcError::Internal(_) => -32603,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcErrorBody {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorBody>,
}

impl RpcResponse {
    fn ok(id: Value, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    fn err(id: Value, error: &RpcError) -> Self {
        Self {
            id,
            result: None,
            error: Some(RpcErrorBody {
                code: error.code(),
                message: error.to_string(),
            }),
        }
    }
}

type Handler = Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value, RpcError>> + Send + Sync>;

/// Method name → handler table.
///
/// `ping` is always present and answers `"pong"` unless overridden.
#[derive(Clone)]
pub struct RpcMethods {
    table: HashMap<String, Handler>,
}

impl Default for RpcMethods {
    fn default() -> Self {
        Self::new()
    }
}

impl RpcMethods {
    pub fn new() -> Self {
        let methods = Self { table: HashMap::new() };
        methods.method("ping", |_| async { Ok(Value::from("pong")) })
    }

    /// Add or replace a method.
    pub fn method<F, Fut>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, RpcError>> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |params| Box::pin(handler(params)));
        self.table.insert(name.into(), handler);
        self
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.table.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Decode one request line and produce its response.
    pub async fn handle(&self, line: &str) -> RpcResponse {
        let request: RpcRequest = match serde_json::from_str(line) {
            Ok(request) => request,
            Err(e) => return RpcResponse::err(Value::Null, &RpcError::InvalidRequest(e.to_string())),
        };

        let Some(handler) = self.table.get(&request.method) else {
            return RpcResponse::err(request.id, &RpcError::MethodNotFound(request.method));
        };

        match handler(request.params).await {
            Ok(result) => RpcResponse::ok(request.id, result),
            Err(e) => {
                tracing::debug!(method = %request.method, error = %e, "RPC method failed");
                RpcResponse::err(request.id, &e)
            }
        }
    }
}

/// RPC server bound to `rpc.addr`.
pub struct RpcModule {
    identity: ModuleIdentity,
    socket: Socket,
    methods: Arc<RpcMethods>,
    max_connections: usize,
    max_request_bytes: usize,
}

impl RpcModule {
    pub fn bind(config: &RpcConfig, methods: RpcMethods) -> Result<Self, std::io::Error> {
        let socket = Socket::bind(config.addr)?;

        tracing::info!(
            address = %socket.local_addr(),
            max_connections = config.max_connections,
            max_request_bytes = config.max_request_bytes,
            methods = ?methods.names(),
            "RPC listener bound"
        );

        Ok(Self::with_socket(socket, config, methods))
    }

    /// Prepare the method table without taking the port; `run` binds it.
    pub fn unbound(config: &RpcConfig, methods: RpcMethods) -> Self {
        Self::with_socket(Socket::pending(config.addr), config, methods)
    }

    /// Build from the `[rpc]` section of `conf`. A disabled section is
    /// never bound.
    pub fn from_config(conf: &dyn ConfigAccessor, methods: RpcMethods) -> Result<Self, BoxError> {
        let config: RpcConfig = conf.unmarshal_or_default("rpc")?;
        if config.disable {
            tracing::info!(address = %config.addr, "RPC module disabled, listener not bound");
            return Ok(Self::unbound(&config, methods));
        }
        Ok(Self::bind(&config, methods)?)
    }

    fn with_socket(socket: Socket, config: &RpcConfig, methods: RpcMethods) -> Self {
        Self {
            identity: ModuleIdentity::new(ModuleKind::Rpc, socket.local_addr().to_string()),
            socket,
            methods: Arc::new(methods),
            max_connections: config.max_connections.max(1),
            max_request_bytes: config.max_request_bytes.max(1),
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.socket.local_addr()
    }

    pub fn is_bound(&self) -> bool {
        self.socket.is_bound()
    }

    async fn accept_loop(&self, listener: tokio::net::TcpListener, shutdown: CancellationToken) -> Result<(), BoxError> {
        let limit = Arc::new(Semaphore::new(self.max_connections));
        let mut connections = JoinSet::new();

        loop {
            let permit = tokio::select! {
                _ = shutdown.cancelled() => break,
                permit = Arc::clone(&limit).acquire_owned() => permit?,
            };

            let (stream, peer) = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to accept RPC connection");
                        continue;
                    }
                },
            };

            tracing::debug!(
                peer_addr = %peer,
                available_permits = limit.available_permits(),
                "RPC connection accepted"
            );

            let methods = Arc::clone(&self.methods);
            let token = shutdown.clone();
            let max_request_bytes = self.max_request_bytes;
            connections.spawn(async move {
                let _permit = permit;
                if let Err(e) = serve_connection(stream, &methods, max_request_bytes, &token).await {
                    tracing::debug!(peer_addr = %peer, error = %e, "RPC connection closed with error");
                }
            });
        }

        while connections.join_next().await.is_some() {}
        Ok(())
    }
}

enum Line {
    Complete(Vec<u8>),
    TooLong,
    Eof,
}

/// Read one newline-terminated line of at most `limit` bytes.
///
/// A trailing line without a newline is still returned.
async fn read_line<R>(reader: &mut R, limit: usize, buf: &mut Vec<u8>) -> std::io::Result<Line>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let read = (&mut *reader).take(limit as u64 + 1).read_until(b'\n', buf).await?;
    if read == 0 {
        return Ok(Line::Eof);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
    } else if buf.len() > limit {
        return Ok(Line::TooLong);
    }
    Ok(Line::Complete(std::mem::take(buf)))
}

async fn serve_connection(
    stream: TcpStream,
    methods: &RpcMethods,
    max_request_bytes: usize,
    shutdown: &CancellationToken,
) -> std::io::Result<()> {
    let (read, mut write) = stream.into_split();
    let mut reader = BufReader::new(read);
    let mut buf = Vec::new();

    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => break,
            line = read_line(&mut reader, max_request_bytes, &mut buf) => line?,
        };
        let response = match line {
            Line::Eof => break,
            Line::TooLong => {
                tracing::debug!(max_request_bytes, "RPC request line too long, closing connection");
                let error = RpcError::InvalidRequest(format!("request exceeds {max_request_bytes} bytes"));
                write_response(&mut write, &RpcResponse::err(Value::Null, &error)).await?;
                break;
            }
            Line::Complete(line) => {
                let line = String::from_utf8_lossy(&line);
                if line.trim().is_empty() {
                    continue;
                }
                methods.handle(&line).await
            }
        };
        write_response(&mut write, &response).await?;
    }

    write.shutdown().await
}

async fn write_response<W>(write: &mut W, response: &RpcResponse) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut out = serde_json::to_vec(response)?;
    out.push(b'\n');
    write.write_all(&out).await
}

impl Module for RpcModule {
    fn identity(&self) -> ModuleIdentity {
        self.identity.clone()
    }

    fn run(&self, shutdown: CancellationToken) -> BoxFuture<'_, Result<(), BoxError>> {
        Box::pin(async move {
            let listener = self.socket.take()?;
            let addr = listener.local_addr()?;

            tracing::info!(address = %addr, "RPC server starting");
            self.accept_loop(listener, shutdown).await?;
            tracing::info!(address = %addr, "RPC server stopped");
            Ok(())
        })
    }
}
