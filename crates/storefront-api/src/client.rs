//! `reqwest`-backed API client with shared default headers.

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use storefront_core::{ApiRequest, ApiResponse, ApiTransport, Credential, TransportError};

use crate::config::ClientConfig;
use crate::error::ApiError;

/// HTTP client for the storefront API.
///
/// Clones share the same default-header map, so a header installed through
/// one handle applies to requests made through every other.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    config: Arc<ClientConfig>,
    headers: Arc<RwLock<HeaderMap>>,
}

impl ApiClient {
    /// Build a client from configuration.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built or an extra header
    /// is invalid.
    pub fn new(config: ClientConfig) -> Result<Self, ApiError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }
        let http = builder
            .build()
            .map_err(|e| ApiError::Config(e.to_string()))?;

        let mut headers = HeaderMap::new();
        for (key, value) in &config.extra_headers {
            let (name, value) = parse_header(key, value)?;
            headers.insert(name, value);
        }

        Ok(Self {
            http,
            config: Arc::new(config),
            headers: Arc::new(RwLock::new(headers)),
        })
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn default_headers(&self) -> HeaderMap {
        self.headers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        bearer: Option<&Credential>,
    ) -> Result<ApiResponse, TransportError> {
        let mut headers = self.default_headers();
        if let Some(credential) = bearer {
            let (name, value) =
                parse_header(header::AUTHORIZATION.as_str(), &credential.bearer())?;
            headers.insert(name, value);
        }

        let mut request = self
            .http
            .request(method.clone(), self.config.url(path))
            .headers(headers);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or_else(|_| Value::String(text))
        };

        tracing::debug!(%method, path, status, "API response");
        Ok(ApiResponse::new(status, body))
    }

    /// GET `path` and decode a 2xx JSON body.
    ///
    /// # Errors
    /// Returns error on transport failure, non-2xx status, or decode failure.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self.execute(Method::GET, path, None, None).await?;
        decode(response)
    }

    /// POST `body` as JSON to `path` and decode a 2xx JSON body.
    ///
    /// # Errors
    /// Returns error on transport failure, non-2xx status, or decode failure.
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let body = serde_json::to_value(body)?;
        let response = self.execute(Method::POST, path, Some(&body), None).await?;
        decode(response)
    }
}

#[async_trait]
impl ApiTransport for ApiClient {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        self.execute(
            Method::POST,
            &request.path,
            Some(&request.body),
            request.bearer.as_ref(),
        )
        .await
    }

    fn set_default_header(&self, name: &str, value: &str) -> Result<(), TransportError> {
        let (name, value) = parse_header(name, value)?;
        self.headers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, value);
        Ok(())
    }

    fn remove_default_header(&self, name: &str) {
        if let Ok(name) = HeaderName::from_bytes(name.as_bytes()) {
            self.headers
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(name);
        }
    }

    fn default_header(&self, name: &str) -> Option<String> {
        let name = HeaderName::from_bytes(name.as_bytes()).ok()?;
        self.headers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
    }
}

fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), TransportError> {
    let header_name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|_| TransportError::InvalidHeader(name.to_string()))?;
    let mut header_value =
        HeaderValue::from_str(value).map_err(|_| TransportError::InvalidHeader(name.to_string()))?;
    if header_name == header::AUTHORIZATION {
        header_value.set_sensitive(true);
    }
    Ok((header_name, header_value))
}

fn decode<T: DeserializeOwned>(response: ApiResponse) -> Result<T, ApiError> {
    if !response.is_success() {
        let message = response.message().map_or_else(
            || {
                StatusCode::from_u16(response.status)
                    .ok()
                    .and_then(|s| s.canonical_reason())
                    .unwrap_or("request failed")
                    .to_string()
            },
            str::to_owned,
        );
        return Err(ApiError::Status {
            status: response.status,
            message,
        });
    }
    Ok(serde_json::from_value(response.body)?)
}
