use std::error::Error as _;
use std::time::{Duration, Instant};

use crate::transport::{
    Method, Transport, TransportError, TransportErrorKind, TransportRequest, TransportResponse,
};

/// How long a single request may take, including reading the body.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// [Transport] backed by a pooled [reqwest::Client].
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::new(TransportErrorKind::Other, e.to_string()))?;

        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl Transport for ReqwestTransport {
    async fn request(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let started = Instant::now();

        let mut builder = match request.method {
            Method::Get => self.client.get(request.url),
            Method::Post => self.client.post(request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(classify)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(classify)?;

        Ok(TransportResponse {
            status,
            body,
            latency: started.elapsed(),
        })
    }
}

fn classify(err: reqwest::Error) -> TransportError {
    let kind = if err.is_timeout() {
        TransportErrorKind::Timeout
    } else if is_tls(&err) {
        TransportErrorKind::Tls
    } else if err.is_connect() {
        TransportErrorKind::Connect
    } else {
        TransportErrorKind::Other
    };

    TransportError::new(kind, error_chain(&err))
}

/// rustls failures surface as connect errors, the cause is only visible in the source chain.
/// The top level message carries the request URL, so only the causes are inspected.
fn is_tls(err: &reqwest::Error) -> bool {
    let mut causes = Vec::new();
    let mut source = err.source();
    while let Some(cause) = source {
        causes.push(cause.to_string());
        source = cause.source();
    }
    mentions_tls_failure(causes.iter().map(String::as_str))
}

fn mentions_tls_failure<'a>(mut causes: impl Iterator<Item = &'a str>) -> bool {
    causes.any(|cause| {
        let cause = cause.to_lowercase();
        cause.contains("certificate") || cause.contains("handshake")
    })
}

fn error_chain(err: &reqwest::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
