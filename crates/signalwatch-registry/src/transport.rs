//! Raw registry access.
//!
//! [`RegistryTransport`] is the seam between the rate-governed client and the
//! network. The production implementation is [`HttpTransport`]; tests plug in
//! in-memory fakes.

use crate::error::{RegistryError, Result};
use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::Client;
use serde::de::DeserializeOwned;
use signalwatch_core::{CompanyNumber, DirectorId, RegistryConfig};
use std::fmt;
use std::time::Duration;

/// Which registry service an endpoint lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    /// Main REST API
    Api,
    /// Document download API
    Document,
    /// Secondary public-data API
    PublicData,
}

/// A registry endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// `GET /company/{number}`
    CompanyProfile(CompanyNumber),
    /// `GET /company/{number}/officers`
    Officers(CompanyNumber),
    /// `GET /company/{number}/filing-history`
    FilingHistory(CompanyNumber),
    /// `GET /document/{id}/content` on the document API
    DocumentContent(String),
    /// `GET /officers/{id}/appointments`
    OfficerAppointments(DirectorId),
    /// `GET /search/companies`
    SearchCompanies,
    /// `GET /advanced-search/companies`
    AdvancedSearch,
    /// Arbitrary path on the secondary public-data API
    PublicData(String),
}

impl Endpoint {
    /// Service hosting this endpoint.
    #[must_use]
    pub fn service(&self) -> Service {
        match self {
            Self::DocumentContent(_) => Service::Document,
            Self::PublicData(_) => Service::PublicData,
            _ => Service::Api,
        }
    }

    /// Path relative to the service base URL.
    #[must_use]
    pub fn path(&self) -> String {
        match self {
            Self::CompanyProfile(number) => format!("/company/{number}"),
            Self::Officers(number) => format!("/company/{number}/officers"),
            Self::FilingHistory(number) => format!("/company/{number}/filing-history"),
            Self::DocumentContent(id) => format!("/document/{id}/content"),
            Self::OfficerAppointments(id) => format!("/officers/{id}/appointments"),
            Self::SearchCompanies => "/search/companies".to_string(),
            Self::AdvancedSearch => "/advanced-search/companies".to_string(),
            Self::PublicData(path) => {
                if path.starts_with('/') {
                    path.clone()
                } else {
                    format!("/{path}")
                }
            }
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path())
    }
}

/// An endpoint plus query parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    /// Target endpoint
    pub endpoint: Endpoint,
    /// Query parameters, in order
    pub params: Vec<(String, String)>,
}

impl ApiRequest {
    /// Create a request with no parameters.
    #[must_use]
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            params: Vec::new(),
        }
    }

    /// Add a query parameter.
    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.push((key.into(), value.to_string()));
        self
    }

    /// Look up a query parameter by key.
    #[must_use]
    pub fn get_param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// A raw registry response. Status classification happens in the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    /// HTTP status code
    pub status: u16,
    /// Response body
    pub body: Vec<u8>,
    /// Parsed `Retry-After` header, if present
    pub retry_after: Option<Duration>,
}

impl ApiResponse {
    /// A 200 response with a JSON body.
    #[must_use]
    pub fn json_body(value: &serde_json::Value) -> Self {
        Self {
            status: 200,
            body: value.to_string().into_bytes(),
            retry_after: None,
        }
    }

    /// An empty response with the given status.
    #[must_use]
    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: Vec::new(),
            retry_after: None,
        }
    }

    /// Whether the status is 2xx.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Short lossy excerpt of the body for error messages.
    #[must_use]
    pub fn excerpt(&self) -> String {
        String::from_utf8_lossy(&self.body).chars().take(200).collect()
    }
}

/// Raw access to the registry.
///
/// Implementations report transport failures as [`RegistryError::Network`]
/// and return every HTTP response, successful or not, as an [`ApiResponse`].
#[async_trait]
pub trait RegistryTransport: Send + Sync {
    /// Issue a single request.
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse>;
}

/// HTTP transport over `reqwest` with basic auth.
pub struct HttpTransport {
    client: Client,
    api_key: String,
    base_url: String,
    document_url: String,
    public_data_url: Option<String>,
}

impl HttpTransport {
    /// Build a transport from registry settings and an API key.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub fn new(config: &RegistryConfig, api_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| RegistryError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            document_url: config.document_url.trim_end_matches('/').to_string(),
            public_data_url: config
                .public_data_url
                .as_ref()
                .map(|url| url.trim_end_matches('/').to_string()),
        })
    }

    fn url_for(&self, endpoint: &Endpoint) -> Result<String> {
        let base = match endpoint.service() {
            Service::Api => &self.base_url,
            Service::Document => &self.document_url,
            Service::PublicData => self.public_data_url.as_ref().ok_or_else(|| {
                RegistryError::Config("no public data API URL configured".to_string())
            })?,
        };
        Ok(format!("{base}{}", endpoint.path()))
    }
}

#[async_trait]
impl RegistryTransport for HttpTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let url = self.url_for(&request.endpoint)?;
        tracing::debug!(url = %url, "registry request");

        let response = self
            .client
            .get(&url)
            .basic_auth(&self.api_key, Some(""))
            .query(&request.params)
            .send()
            .await?;

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = response.bytes().await?.to_vec();

        Ok(ApiResponse {
            status,
            body,
            retry_after,
        })
    }
}
