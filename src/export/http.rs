//! Authenticated HTTP POST sink.

use super::{ExportError, ExportFuture, Exporter};
use crate::reading::Reading;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use std::time::Duration;

const DEFAULT_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Default request timeout.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// `Authorization: <scheme> <credential>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Auth {
    pub scheme: String,
    pub credential: String,
}

impl Auth {
    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            scheme: "Bearer".to_string(),
            credential: token.into(),
        }
    }

    fn header_value(&self) -> Result<HeaderValue, reqwest::header::InvalidHeaderValue> {
        let mut value = HeaderValue::from_str(&format!("{} {}", self.scheme, self.credential))?;
        value.set_sensitive(true);
        Ok(value)
    }
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub endpoint: String,
    pub auth: Option<Auth>,
    /// Extra request headers, sent verbatim
    pub headers: Vec<(String, String)>,
    pub timeout: Duration,
}

impl HttpConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            auth: None,
            headers: Vec::new(),
            timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }
}

/// Errors building an [`HttpExporter`] from its configuration.
#[derive(thiserror::Error, Debug)]
pub enum HttpConfigError {
    #[error("invalid header {name}: {reason}")]
    InvalidHeader { name: String, reason: String },
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// POSTs each reading as JSON to a fixed endpoint.
///
/// Non-2xx responses and transport errors are both reported as
/// [`ExportError::Delivery`]; nothing is retried here.
#[derive(Debug, Clone)]
pub struct HttpExporter {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpExporter {
    pub fn new(config: HttpConfig) -> Result<Self, HttpConfigError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));

        for (name, value) in &config.headers {
            let invalid = |reason: String| HttpConfigError::InvalidHeader {
                name: name.clone(),
                reason,
            };
            let header_name =
                HeaderName::from_bytes(name.as_bytes()).map_err(|e| invalid(e.to_string()))?;
            let header_value = HeaderValue::from_str(value).map_err(|e| invalid(e.to_string()))?;
            headers.insert(header_name, header_value);
        }

        if let Some(auth) = &config.auth {
            let value = auth
                .header_value()
                .map_err(|e| HttpConfigError::InvalidHeader {
                    name: AUTHORIZATION.to_string(),
                    reason: e.to_string(),
                })?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn post(&self, reading: &Reading) -> Result<(), ExportError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(reading)
            .send()
            .await
            .map_err(|e| ExportError::Delivery {
                endpoint: self.endpoint.clone(),
                status: None,
                cause: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExportError::Delivery {
                endpoint: self.endpoint.clone(),
                status: Some(status.as_u16()),
                cause: format!("HTTP {status}"),
            });
        }

        tracing::debug!(endpoint = %self.endpoint, %status, "reading delivered");
        Ok(())
    }
}

impl Exporter for HttpExporter {
    fn name(&self) -> &str {
        "http"
    }

    fn export<'a>(&'a self, reading: &'a Reading) -> ExportFuture<'a> {
        Box::pin(self.post(reading))
    }
}
