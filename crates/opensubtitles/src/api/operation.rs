//! Declarative API operations and the pipeline that executes them
//!
//! An [`Operation`] describes one endpoint: its name, HTTP method, ordered
//! request and response interceptors, an optional post-success callback and
//! whether its result is handed back to the caller. It holds no state of its
//! own; [`Operation::execute`] runs it against a transport and a credential
//! slot supplied by the caller.

use reqwest::header::HeaderMap;
use reqwest::Method;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::classify::{classify, ResponseOutcome};
use super::{HttpClient, HttpResponse, Params, RequestDescriptor, API_VERSION};
use crate::auth::AuthState;
use crate::error::ClientError;

/// Transforms a request before it is sent
pub trait RequestInterceptor: Send + Sync {
    fn intercept(&self, request: RequestDescriptor) -> RequestDescriptor;
}

impl<F> RequestInterceptor for F
where
    F: Fn(RequestDescriptor) -> RequestDescriptor + Send + Sync,
{
    fn intercept(&self, request: RequestDescriptor) -> RequestDescriptor {
        self(request)
    }
}

/// Transforms a raw response before it is classified
pub trait ResponseInterceptor: Send + Sync {
    fn intercept(&self, response: HttpResponse) -> HttpResponse;
}

impl<F> ResponseInterceptor for F
where
    F: Fn(HttpResponse) -> HttpResponse + Send + Sync,
{
    fn intercept(&self, response: HttpResponse) -> HttpResponse {
        self(response)
    }
}

/// Runs after a successful response, with access to the credential slot
///
/// May replace the current credential and/or transform the data.
pub type SuccessCallback = dyn Fn(Value, &AuthState) -> Result<Value, ClientError> + Send + Sync;

/// Where operations are sent and which headers every request starts with
#[derive(Debug, Clone)]
pub struct ApiTarget {
    base_url: String,
    default_headers: HeaderMap,
}

impl ApiTarget {
    pub fn new(base_url: impl Into<String>, default_headers: HeaderMap) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            default_headers,
        }
    }

    /// Builds `<base>/v1/<operation>`
    pub fn url_for(&self, operation: &str) -> String {
        format!("{}/{API_VERSION}/{operation}", self.base_url)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn default_headers(&self) -> &HeaderMap {
        &self.default_headers
    }
}

/// A declared API operation
#[derive(Clone)]
pub struct Operation {
    name: String,
    method: Method,
    request_interceptors: Vec<Arc<dyn RequestInterceptor>>,
    response_interceptors: Vec<Arc<dyn ResponseInterceptor>>,
    on_success: Option<Arc<SuccessCallback>>,
    void: bool,
}

impl Operation {
    pub fn new(method: Method, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            method,
            request_interceptors: Vec::new(),
            response_interceptors: Vec::new(),
            on_success: None,
            void: false,
        }
    }

    pub fn get(name: impl Into<String>) -> Self {
        Self::new(Method::GET, name)
    }

    pub fn post(name: impl Into<String>) -> Self {
        Self::new(Method::POST, name)
    }

    /// Appends a request interceptor; interceptors run in the order added
    pub fn with_request_interceptor(self, interceptor: impl RequestInterceptor + 'static) -> Self {
        self.with_shared_request_interceptor(Arc::new(interceptor))
    }

    pub fn with_shared_request_interceptor(mut self, interceptor: Arc<dyn RequestInterceptor>) -> Self {
        self.request_interceptors.push(interceptor);
        self
    }

    /// Appends a response interceptor; interceptors run in the order added
    pub fn with_response_interceptor(self, interceptor: impl ResponseInterceptor + 'static) -> Self {
        self.with_shared_response_interceptor(Arc::new(interceptor))
    }

    pub fn with_shared_response_interceptor(
        mut self,
        interceptor: Arc<dyn ResponseInterceptor>,
    ) -> Self {
        self.response_interceptors.push(interceptor);
        self
    }

    pub fn on_success<F>(mut self, callback: F) -> Self
    where
        F: Fn(Value, &AuthState) -> Result<Value, ClientError> + Send + Sync + 'static,
    {
        self.on_success = Some(Arc::new(callback));
        self
    }

    /// Discards the successful result; the operation is run for its side effect
    pub fn void(mut self) -> Self {
        self.void = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn is_void(&self) -> bool {
        self.void
    }

    /// Runs the full pipeline
    ///
    /// The credential is read from `auth` when the request is built, so a
    /// replacement made by an earlier call is always picked up. Returns
    /// `Ok(None)` for void operations.
    pub async fn execute<H: HttpClient + ?Sized>(
        &self,
        http: &H,
        auth: &AuthState,
        target: &ApiTarget,
        params: Params,
        timeout: Duration,
    ) -> Result<Option<Value>, ClientError> {
        let request = self.build_request(auth, target, params, timeout);

        tracing::debug!(
            operation = %self.name,
            method = %request.method,
            url = %request.url,
            "Sending request"
        );

        let response = match tokio::time::timeout(request.timeout, http.send(&request)).await {
            Ok(result) => result?,
            Err(_) => {
                tracing::warn!(operation = %self.name, timeout = ?request.timeout, "Request timed out");
                return Err(ClientError::Timeout);
            }
        };

        tracing::debug!(operation = %self.name, status = response.status, "Received response");

        let response = self
            .response_interceptors
            .iter()
            .fold(response, |response, interceptor| interceptor.intercept(response));

        let data = match classify(&response) {
            ResponseOutcome::Success(data) => data,
            ResponseOutcome::Failure { code, reason } => {
                tracing::warn!(operation = %self.name, code, reason = ?reason, "API call failed");
                return Err(ClientError::Api { code, reason });
            }
        };

        let data = match &self.on_success {
            Some(callback) => callback(data, auth)?,
            None => data,
        };

        Ok((!self.void).then_some(data))
    }

    /// Builds the request, stamps the current credential and runs the request interceptors
    fn build_request(
        &self,
        auth: &AuthState,
        target: &ApiTarget,
        params: Params,
        timeout: Duration,
    ) -> RequestDescriptor {
        let request = RequestDescriptor::new(
            self.method.clone(),
            &self.name,
            target.url_for(&self.name),
            target.default_headers().clone(),
            params,
            timeout,
        );

        let request = auth.current().stamp(request);

        self.request_interceptors
            .iter()
            .fold(request, |request, interceptor| interceptor.intercept(request))
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("name", &self.name)
            .field("method", &self.method)
            .field("request_interceptors", &self.request_interceptors.len())
            .field("response_interceptors", &self.response_interceptors.len())
            .field("on_success", &self.on_success.is_some())
            .field("void", &self.void)
            .finish()
    }
}
