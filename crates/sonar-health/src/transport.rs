//! Status transport: one HTTP GET with a timeout.
//!
//! [`StatusTransport`] is the seam between the prober and the network.
//! [`HttpTransport`] is the production implementation on top of a
//! hyper HTTP/1 client connection.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Empty};
use thiserror::Error;
use tracing::debug;

/// A single status request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRequest {
    pub host: String,
    pub port: u16,
    pub path: String,
    pub timeout: Duration,
}

impl StatusRequest {
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Raw answer from the status endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl StatusResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Why an attempt produced no usable answer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("connection refused")]
    ConnectionRefused,

    #[error("request timed out")]
    Timeout,

    #[error("unexpected HTTP status {0}")]
    UnexpectedStatus(u16),

    #[error("{0}")]
    Other(String),
}

impl TransportError {
    pub fn from_io(err: &std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::ConnectionRefused => TransportError::ConnectionRefused,
            std::io::ErrorKind::TimedOut => TransportError::Timeout,
            _ => TransportError::Other(err.to_string()),
        }
    }
}

/// Boxed future returned by [`StatusTransport::get`].
pub type TransportFuture<'a> =
    Pin<Box<dyn Future<Output = Result<StatusResponse, TransportError>> + Send + 'a>>;

/// Performs the GET for one probe attempt.
pub trait StatusTransport: Send + Sync {
    /// Fetch `request.path`, giving up after `request.timeout`.
    fn get<'a>(&'a self, request: &'a StatusRequest) -> TransportFuture<'a>;
}

impl<T: StatusTransport + ?Sized> StatusTransport for Arc<T> {
    fn get<'a>(&'a self, request: &'a StatusRequest) -> TransportFuture<'a> {
        (**self).get(request)
    }
}

/// HTTP/1 transport over a fresh TCP connection per attempt.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpTransport;

impl StatusTransport for HttpTransport {
    fn get<'a>(&'a self, request: &'a StatusRequest) -> TransportFuture<'a> {
        Box::pin(http_get(request))
    }
}

async fn http_get(request: &StatusRequest) -> Result<StatusResponse, TransportError> {
    let authority = request.authority();

    let result = tokio::time::timeout(request.timeout, async {
        let stream = tokio::net::TcpStream::connect((request.host.as_str(), request.port))
            .await
            .map_err(|e| {
                debug!(error = %e, %authority, "status connection failed");
                TransportError::from_io(&e)
            })?;

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| TransportError::Other(format!("handshake failed: {e}")))?;

        // Drive the connection in the background.
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(error = %e, "status connection closed with error");
            }
        });

        let req = http::Request::builder()
            .method(http::Method::GET)
            .uri(request.path.as_str())
            .header(http::header::HOST, authority.as_str())
            .header(http::header::USER_AGENT, "sonarctl/0.1")
            .header(http::header::ACCEPT, "application/json")
            .body(Empty::<Bytes>::new())
            .map_err(|e| TransportError::Other(format!("invalid request: {e}")))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| TransportError::Other(format!("request failed: {e}")))?;

        let status = resp.status().as_u16();
        let body = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| TransportError::Other(format!("failed to read body: {e}")))?
            .to_bytes();

        Ok::<_, TransportError>(StatusResponse {
            status,
            body: body.to_vec(),
        })
    })
    .await;

    match result {
        Ok(outcome) => outcome,
        Err(_) => {
            debug!(%authority, path = %request.path, "status request timed out");
            Err(TransportError::Timeout)
        }
    }
}
