//! HTTP transport abstraction for the OpenSubtitles API
//!
//! This module provides a trait-based transport that can be easily mocked for testing.

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;

use super::RequestDescriptor;
use crate::error::TransportError;

/// Trait for sending requests over the network
///
/// Implementations send the descriptor exactly as given: method, URL,
/// headers, parameters and timeout. They never interpret the status code.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn send(&self, request: &RequestDescriptor) -> Result<HttpResponse, TransportError>;
}

/// Response from an HTTP request
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// Returns true if status is in 2xx range
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Deserializes the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_str(&self.body)
    }
}

/// Production transport using reqwest
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    inner: reqwest::Client,
}

impl ReqwestClient {
    /// Creates a new reqwest-based transport
    pub fn new() -> Result<Self, TransportError> {
        let inner = reqwest::Client::builder()
            .build()
            .map_err(TransportError::from)?;
        Ok(Self { inner })
    }

    /// Wraps an existing reqwest client, sharing its connection pool
    pub fn from_client(inner: reqwest::Client) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn send(&self, request: &RequestDescriptor) -> Result<HttpResponse, TransportError> {
        let mut builder = self
            .inner
            .request(request.method.clone(), &request.url)
            .headers(request.headers.clone())
            .timeout(request.timeout);

        if request.uses_query() {
            if !request.body.is_empty() {
                builder = builder.query(&request.body);
            }
        } else {
            builder = builder.json(&request.body);
        }

        let response = builder.send().await?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.text().await?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}
