use bytes::Bytes;
use reqwest::header::{CONTENT_ENCODING, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};
use url::Url;

use crate::config::Config;
use crate::error::ExportError;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("invalid header name {0:?}")]
    InvalidHeaderName(String),

    #[error("invalid value for header {0:?}")]
    InvalidHeaderValue(String),
}

/// Sends one body per call to the HEC endpoint. No retries.
pub struct HecTransport {
    client: Client,
    endpoint: Url,
    headers: HeaderMap,
}

impl HecTransport {
    /// Needs a rustls crypto provider installed in the process.
    pub fn new(config: &Config) -> Result<Self, BuildError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        let headers = header_map(&config.request_headers())?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            headers,
        })
    }

    /// POST `body`, marking it gzip-encoded when `compressed`.
    ///
    /// Any 2xx is success. The response body is always drained so the
    /// connection can go back to the pool.
    pub async fn send(
        &self,
        cancel: &CancellationToken,
        body: Bytes,
        compressed: bool,
    ) -> Result<(), ExportError> {
        let len = body.len();
        let mut req = self
            .client
            .post(self.endpoint.clone())
            .headers(self.headers.clone());
        if compressed {
            req = req.header(CONTENT_ENCODING, "gzip");
        }
        let req = req.body(body).build().map_err(ExportError::Request)?;

        let status = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ExportError::Cancelled),
            result = self.execute(req) => result?,
        };

        trace!(status = status.as_u16(), bytes = len, compressed, "HEC response");
        if status.is_success() {
            Ok(())
        } else {
            Err(ExportError::Status { status })
        }
    }

    async fn execute(&self, req: reqwest::Request) -> Result<StatusCode, ExportError> {
        let resp = self.client.execute(req).await.map_err(ExportError::Network)?;
        let status = resp.status();
        if let Err(e) = resp.bytes().await {
            warn!(error = %e, status = status.as_u16(), "failed to drain HEC response body");
        }
        Ok(status)
    }
}

fn header_map(headers: &[(String, String)]) -> Result<HeaderMap, BuildError> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let name = HeaderName::try_from(name.as_str())
            .map_err(|_| BuildError::InvalidHeaderName(name.clone()))?;
        let value = HeaderValue::try_from(value.as_str())
            .map_err(|_| BuildError::InvalidHeaderValue(name.to_string()))?;
        map.insert(name, value);
    }
    Ok(map)
}
