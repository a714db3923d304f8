use std::sync::Arc;

use bytes::Bytes;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::token::{TokenAuthority, TokenError};

/// Fixed client-identification header attached to every request.
pub const CLIENT_AGENT_HEADER: &str = "x-client-agent";
pub const CLIENT_AGENT: &str = concat!("mosaic-rs/", env!("CARGO_PKG_VERSION"));

/// Chunk size used when streaming an upload body with progress accounting.
const PROGRESS_CHUNK: usize = 64 * 1024;

/// Cumulative upload progress, relayed verbatim to the caller's sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadProgress {
    pub sent: u64,
    pub total: u64,
}

pub type ProgressSink = Arc<dyn Fn(UploadProgress) + Send + Sync>;

/// Issues authenticated, cancellable requests against the service.
///
/// Every request carries the bearer token from the shared authority and the
/// fixed client-identification header. Cancellation is cooperative: an
/// already-cancelled token short-circuits before any network work, and a
/// token cancelled mid-flight abandons the round-trip.
pub struct Transport {
    client: Client,
    authority: Arc<TokenAuthority>,
}

impl Transport {
    pub fn new(authority: Arc<TokenAuthority>) -> Result<Self, TransportError> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(CLIENT_AGENT_HEADER, HeaderValue::from_static(CLIENT_AGENT));
        let client = Client::builder().default_headers(default_headers).build()?;

        Ok(Self { client, authority })
    }

    pub fn get(&self, url: url::Url) -> RequestBuilder {
        self.client.get(url)
    }

    pub fn head(&self, url: url::Url) -> RequestBuilder {
        self.client.head(url)
    }

    pub fn post(&self, url: url::Url) -> RequestBuilder {
        self.client.post(url)
    }

    /// Send a request, resolving every failure mode uniformly.
    ///
    /// HTTP status >= 400, transport-level errors, and aborts all surface as
    /// a single `TransportError`; there is no silent partial success. A 401
    /// invalidates the cached token and replays the request once with a
    /// freshly minted one; streaming bodies cannot be cloned, so those
    /// surface the 401 directly.
    pub async fn send(
        &self,
        request: RequestBuilder,
        cancel: &CancellationToken,
    ) -> Result<Response, TransportError> {
        let retry = request.try_clone();

        let mut response = self.dispatch(request, cancel).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            if let Some(retry) = retry {
                tracing::debug!("token rejected, refreshing and replaying once");
                self.authority.refresh().await?;
                response = self.dispatch(retry, cancel).await?;
            }
        }

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            let message = server_message(response).await;
            return Err(TransportError::Status { status, message });
        }

        Ok(response)
    }

    /// One authenticated round-trip; status handling is the caller's.
    async fn dispatch(
        &self,
        request: RequestBuilder,
        cancel: &CancellationToken,
    ) -> Result<Response, TransportError> {
        if cancel.is_cancelled() {
            return Err(TransportError::Aborted);
        }

        let token = self.authority.token().await?;
        let request = request.header(AUTHORIZATION, token.raw());

        let result = tokio::select! {
            _ = cancel.cancelled() => return Err(TransportError::Aborted),
            result = request.send() => result,
        };

        match result {
            Ok(response) => Ok(response),
            // A failure racing a concurrent abort is not a new error.
            Err(_) if cancel.is_cancelled() => Err(TransportError::Aborted),
            Err(err) => Err(TransportError::Network(err)),
        }
    }

    /// Send a request and decode the JSON body.
    pub async fn send_json<T: serde::de::DeserializeOwned>(
        &self,
        request: RequestBuilder,
        cancel: &CancellationToken,
    ) -> Result<T, TransportError> {
        let response = self.send(request, cancel).await?;
        let body = tokio::select! {
            _ = cancel.cancelled() => return Err(TransportError::Aborted),
            body = response.json::<T>() => body,
        };
        body.map_err(TransportError::Network)
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport").finish()
    }
}

/// Pull the server's own message out of an error body when it has one.
async fn server_message(response: Response) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        message: String,
    }

    let text = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorBody>(&text) {
        Ok(body) => body.message,
        Err(_) => text,
    }
}

/// Wrap an upload payload in a body that reports cumulative progress to the
/// sink as chunks go out.
pub(crate) fn progress_body(data: Bytes, sink: ProgressSink) -> reqwest::Body {
    let total = data.len() as u64;
    let mut frames = Vec::with_capacity(data.len().div_ceil(PROGRESS_CHUNK).max(1));
    let mut start = 0;
    while start < data.len() {
        let end = (start + PROGRESS_CHUNK).min(data.len());
        frames.push(data.slice(start..end));
        start = end;
    }

    let mut sent = 0u64;
    let stream = futures::stream::iter(frames).map(move |frame| {
        sent += frame.len() as u64;
        sink(UploadProgress { sent, total });
        Ok::<Bytes, std::io::Error>(frame)
    });

    reqwest::Body::wrap_stream(stream)
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request aborted")]
    Aborted,
    #[error("HTTP status {status}: {message}")]
    Status { status: StatusCode, message: String },
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("authentication error: {0}")]
    Auth(#[from] TokenError),
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
}

impl TransportError {
    pub fn is_aborted(&self) -> bool {
        matches!(self, TransportError::Aborted)
    }
}
