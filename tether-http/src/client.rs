//! HTTP transport implementation

use crate::errors::HttpError;
use crate::types::{HttpRequest, HttpResponse};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use std::collections::HashMap;
use std::str::FromStr;
use tether_config::HttpConfig;
use tracing::{debug, info};

/// Outbound HTTP seam used for dispatch and cancel calls
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError>;
}

/// Transport backed by a single pooled reqwest client
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Build the client once from configuration
    pub fn from_config(config: &HttpConfig) -> Result<Self, HttpError> {
        debug!(
            "Creating HTTP transport with timeout {:?}, connect timeout {:?}",
            config.timeout, config.connect_timeout
        );

        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(&config.user_agent)
            .danger_accept_invalid_certs(!config.verify_ssl)
            .redirect(reqwest::redirect::Policy::limited(
                config.max_redirects as usize,
            ))
            .build()
            .map_err(|e| HttpError::ConfigError(e.to_string()))?;

        Ok(Self { client })
    }

    pub fn new() -> Result<Self, HttpError> {
        Self::from_config(&HttpConfig::default())
    }
}

fn header_map(headers: &HashMap<String, String>) -> Result<HeaderMap, HttpError> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let header_name =
            HeaderName::from_str(name).map_err(|_| HttpError::InvalidHeader(name.clone()))?;
        let header_value = HeaderValue::from_str(value)
            .map_err(|_| HttpError::InvalidHeader(format!("{}: {}", name, value)))?;
        map.insert(header_name, header_value);
    }
    Ok(map)
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        info!("Sending {} {}", request.method, request.url);

        let mut builder = self
            .client
            .request(reqwest::Method::from(request.method), &request.url)
            .headers(header_map(&request.headers)?);

        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();

        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.to_string(), v.to_string()))
            })
            .collect();

        let body = response
            .text()
            .await
            .map_err(|e| HttpError::Body(e.to_string()))?;

        debug!("{} {} answered {} ({} bytes)", request.method, request.url, status, body.len());

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}
