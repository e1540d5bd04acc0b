use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE, USER_AGENT};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use super::http::{HttpClient, ReqwestClient};
use super::operation::{ApiTarget, Operation, RequestInterceptor, ResponseInterceptor};
use super::{Params, API_ENDPOINT};
use crate::auth::{AuthState, Credential};
use crate::config::ClientConfig;
use crate::error::ClientError;

/// Timeout applied to each send unless the caller overrides it
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

const LOGIN: &str = "login";
const SUBTITLES: &str = "subtitles";

/// OpenSubtitles REST API client
///
/// Owns one transport and one credential slot shared by every operation in
/// its catalog. The catalog is fixed when the client is built. Generic over
/// the transport implementation for testability.
pub struct OpenSubtitlesClient<H: HttpClient = ReqwestClient> {
    http: RwLock<Option<Arc<H>>>,
    auth: AuthState,
    target: ApiTarget,
    timeout: Duration,
    catalog: BTreeMap<String, Operation>,
}

impl OpenSubtitlesClient<ReqwestClient> {
    /// Creates a client with the default endpoint and timeout
    pub fn new(api_key: impl Into<String>) -> Result<Self, ClientError> {
        Self::builder(api_key).build()
    }

    pub fn builder(api_key: impl Into<String>) -> ClientBuilder {
        ClientBuilder::new(api_key)
    }

    /// Creates a client from a loaded configuration
    pub fn from_config(config: &ClientConfig) -> Result<Self, ClientError> {
        ClientBuilder::from_config(config).build()
    }
}

impl<H: HttpClient> OpenSubtitlesClient<H> {
    /// Creates a client with the default settings over a custom transport
    pub fn with_http_client(api_key: impl Into<String>, http: H) -> Result<Self, ClientError> {
        ClientBuilder::new(api_key).build_with(http)
    }

    /// Logs a user in and rotates the bearer token
    ///
    /// Returns nothing; every request made after this returns carries the new
    /// token. Fails with `ClientError::UnexpectedResponse` if the API reports
    /// success without a token.
    pub async fn login(&self, username: &str, password: &str) -> Result<(), ClientError> {
        let params = Params::new()
            .with("username", username)
            .with("password", password);
        self.call(LOGIN, params).await.map(|_| ())
    }

    /// Searches subtitles; parameters are forwarded verbatim as the query
    pub async fn subtitles(&self, params: Params) -> Result<Value, ClientError> {
        self.call(SUBTITLES, params)
            .await
            .map(Option::unwrap_or_default)
    }

    /// Invokes a catalog operation by name with the client's default timeout
    pub async fn call(&self, name: &str, params: Params) -> Result<Option<Value>, ClientError> {
        self.invoke(name, params, self.timeout).await
    }

    /// Invokes a catalog operation by name with a per-call timeout
    pub async fn call_with_timeout(
        &self,
        name: &str,
        params: Params,
        timeout: Duration,
    ) -> Result<Option<Value>, ClientError> {
        self.invoke(name, params, timeout).await
    }

    async fn invoke(
        &self,
        name: &str,
        params: Params,
        timeout: Duration,
    ) -> Result<Option<Value>, ClientError> {
        let http = self.transport()?;
        let operation = self
            .catalog
            .get(name)
            .ok_or_else(|| ClientError::UnknownOperation(name.to_string()))?;

        operation
            .execute(http.as_ref(), &self.auth, &self.target, params, timeout)
            .await
    }

    /// Returns the transport, or `ClientClosed` once `close()` has run
    fn transport(&self) -> Result<Arc<H>, ClientError> {
        self.http
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(ClientError::ClientClosed)
    }

    /// Releases the transport
    ///
    /// Idempotent. Calls already in flight finish on their own handle; every
    /// call started afterwards fails with `ClientError::ClientClosed`.
    pub fn close(&self) {
        let released = self
            .http
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if released.is_some() {
            tracing::debug!("Client closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.http
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Returns the credential current at this instant
    pub fn credential(&self) -> Arc<Credential> {
        self.auth.current()
    }

    /// Checks if a login has rotated a bearer token in
    pub fn is_authenticated(&self) -> bool {
        self.auth.current().has_token()
    }

    /// Names of the operations this client exposes
    pub fn operation_names(&self) -> impl Iterator<Item = &str> {
        self.catalog.keys().map(String::as_str)
    }

    pub fn operation(&self, name: &str) -> Option<&Operation> {
        self.catalog.get(name)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn base_url(&self) -> &str {
        self.target.base_url()
    }
}

impl<H: HttpClient> fmt::Debug for OpenSubtitlesClient<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenSubtitlesClient")
            .field("base_url", &self.target.base_url())
            .field("timeout", &self.timeout)
            .field("credential", &self.auth.current())
            .field("operations", &self.catalog.keys().collect::<Vec<_>>())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Swaps the bearer token in after a successful login
fn rotate_token(data: Value, auth: &AuthState) -> Result<Value, ClientError> {
    let token = data
        .get("token")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            ClientError::UnexpectedResponse("login response has no `token` field".into())
        })?;

    let rotated = auth.current().with_token(token).map_err(|e| {
        ClientError::UnexpectedResponse(format!("login returned an unusable token: {e}"))
    })?;
    auth.replace(rotated);

    tracing::info!("Logged in, bearer token rotated");
    Ok(data)
}

/// Builder for [`OpenSubtitlesClient`]
pub struct ClientBuilder {
    api_key: String,
    base_url: String,
    timeout: Duration,
    user_agent: String,
    request_interceptors: Vec<Arc<dyn RequestInterceptor>>,
    response_interceptors: Vec<Arc<dyn ResponseInterceptor>>,
}

impl ClientBuilder {
    pub fn new(api_key: impl Into<String>) -> Self {
        let defaults = ClientConfig::default();
        Self {
            api_key: api_key.into(),
            base_url: API_ENDPOINT.to_string(),
            timeout: DEFAULT_TIMEOUT,
            user_agent: defaults.user_agent,
            request_interceptors: Vec::new(),
            response_interceptors: Vec::new(),
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.api_key.clone())
            .base_url(config.base_url.clone())
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
    }

    /// Sets the endpoint the `v1/<operation>` path is appended to
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Appends a request interceptor to every operation, after its own ones
    pub fn request_interceptor(mut self, interceptor: impl RequestInterceptor + 'static) -> Self {
        self.request_interceptors.push(Arc::new(interceptor));
        self
    }

    /// Appends a response interceptor to every operation, after its own ones
    pub fn response_interceptor(mut self, interceptor: impl ResponseInterceptor + 'static) -> Self {
        self.response_interceptors.push(Arc::new(interceptor));
        self
    }

    /// Builds a client over a fresh reqwest transport
    pub fn build(self) -> Result<OpenSubtitlesClient<ReqwestClient>, ClientError> {
        // Reject a bad key before opening a connection pool
        Credential::new(self.api_key.as_str())?;
        let http = ReqwestClient::new()?;
        self.build_with(http)
    }

    /// Builds a client over the given transport
    pub fn build_with<H: HttpClient>(self, http: H) -> Result<OpenSubtitlesClient<H>, ClientError> {
        let credential = Credential::new(self.api_key)?;
        let target = ApiTarget::new(self.base_url, default_headers(&self.user_agent)?);

        let catalog = [
            Operation::post(LOGIN).on_success(rotate_token).void(),
            Operation::get(SUBTITLES),
        ]
        .into_iter()
        .map(|operation| {
            let operation = self
                .request_interceptors
                .iter()
                .fold(operation, |op, i| op.with_shared_request_interceptor(i.clone()));
            let operation = self
                .response_interceptors
                .iter()
                .fold(operation, |op, i| op.with_shared_response_interceptor(i.clone()));
            (operation.name().to_string(), operation)
        })
        .collect();

        tracing::debug!(base_url = %target.base_url(), timeout = ?self.timeout, "Client created");

        Ok(OpenSubtitlesClient {
            http: RwLock::new(Some(Arc::new(http))),
            auth: AuthState::new(credential),
            target,
            timeout: self.timeout,
            catalog,
        })
    }
}

fn default_headers(user_agent: &str) -> Result<HeaderMap, ClientError> {
    let user_agent = HeaderValue::from_str(user_agent)
        .map_err(|_| ClientError::InvalidConfig(format!("invalid user agent: {user_agent:?}")))?;

    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, user_agent);
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::http::mock::MockHttpClient;
    use crate::api::{HttpResponse, RateLimitRecorder, RequestDescriptor};
    use crate::auth::{API_KEY_HEADER, TOKEN_HEADER};
    use reqwest::Method;
    use serde_json::json;

    const LOGIN_URL: &str = "https://www.opensubtitles.com/api/v1/login";
    const SUBTITLES_URL: &str = "https://www.opensubtitles.com/api/v1/subtitles";

    fn make_client(mock: &MockHttpClient) -> OpenSubtitlesClient<MockHttpClient> {
        OpenSubtitlesClient::with_http_client("abc123", mock.clone()).unwrap()
    }

    #[test]
    fn construction_rejects_empty_api_key() {
        let result = OpenSubtitlesClient::with_http_client("", MockHttpClient::new());
        assert!(matches!(result, Err(ClientError::InvalidCredential(_))));
    }

    #[test]
    fn reqwest_construction_rejects_empty_api_key() {
        assert!(matches!(
            OpenSubtitlesClient::new(""),
            Err(ClientError::InvalidCredential(_))
        ));
    }

    #[test]
    fn construction_rejects_invalid_user_agent() {
        let result = ClientBuilder::new("abc123")
            .user_agent("bad\nagent")
            .build_with(MockHttpClient::new());
        assert!(matches!(result, Err(ClientError::InvalidConfig(_))));
    }

    #[test]
    fn new_client_starts_without_token() {
        let client = make_client(&MockHttpClient::new());

        assert!(!client.is_authenticated());
        assert_eq!(client.credential().api_key(), "abc123");
        assert_eq!(client.timeout(), DEFAULT_TIMEOUT);
    }

    #[test]
    fn catalog_exposes_login_and_subtitles() {
        let client = make_client(&MockHttpClient::new());

        let names: Vec<_> = client.operation_names().collect();
        assert_eq!(names, vec!["login", "subtitles"]);

        let login = client.operation("login").unwrap();
        assert_eq!(login.method(), &Method::POST);
        assert!(login.is_void());

        let subtitles = client.operation("subtitles").unwrap();
        assert_eq!(subtitles.method(), &Method::GET);
        assert!(!subtitles.is_void());
    }

    #[tokio::test]
    async fn login_is_void_and_rotates_token() {
        let mock = MockHttpClient::new()
            .on_post_json(LOGIN_URL, &json!({"token": "tok-9", "status": 200}))
            .on_get_json(SUBTITLES_URL, &json!({"data": []}));
        let client = make_client(&mock);

        client.login("alice", "secret").await.unwrap();
        assert!(client.is_authenticated());

        client.subtitles(Params::new()).await.unwrap();

        let requests = mock.get_requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].headers.get(TOKEN_HEADER).is_none());
        assert_eq!(requests[1].headers.get(TOKEN_HEADER).unwrap(), "Bearer tok-9");
        assert_eq!(requests[1].headers.get(API_KEY_HEADER).unwrap(), "abc123");
    }

    #[tokio::test]
    async fn login_sends_username_and_password() {
        let mock = MockHttpClient::new().on_post_json(LOGIN_URL, &json!({"token": "T"}));
        let client = make_client(&mock);

        client.login("alice", "secret").await.unwrap();

        let request = mock.last_request().unwrap();
        assert_eq!(request.method, Method::POST);
        assert_eq!(request.url, LOGIN_URL);
        assert_eq!(request.body.get("username"), Some("alice"));
        assert_eq!(request.body.get("password"), Some("secret"));
    }

    #[tokio::test]
    async fn relogin_replaces_previous_token() {
        let mock = MockHttpClient::new()
            .on_post_json(LOGIN_URL, &json!({"token": "first"}))
            .on_get_json(SUBTITLES_URL, &json!({}));
        let client = make_client(&mock);
        client.login("alice", "secret").await.unwrap();

        let mock = mock.on_post_json(LOGIN_URL, &json!({"token": "second"}));
        client.login("alice", "secret").await.unwrap();
        client.subtitles(Params::new()).await.unwrap();

        let last = mock.last_request().unwrap();
        assert_eq!(last.headers.get(TOKEN_HEADER).unwrap(), "Bearer second");
        assert_eq!(client.credential().token(), Some("second"));
    }

    #[tokio::test]
    async fn failed_login_surfaces_api_error_and_keeps_credential() {
        let mock = MockHttpClient::new().on_post(
            LOGIN_URL,
            401,
            r#"{"status":401,"message":"Error, invalid username/password"}"#,
        );
        let client = make_client(&mock);

        let err = client.login("alice", "wrong").await.unwrap_err();

        assert_eq!(err.code(), Some(401));
        assert_eq!(err.reason(), Some("Error, invalid username/password"));
        assert!(!client.is_authenticated());
    }

    #[tokio::test]
    async fn login_without_token_is_unexpected_response() {
        let mock = MockHttpClient::new().on_post_json(LOGIN_URL, &json!({"status": 200}));
        let client = make_client(&mock);

        let err = client.login("alice", "secret").await.unwrap_err();

        assert!(matches!(err, ClientError::UnexpectedResponse(_)));
        assert!(err.to_string().contains("token"));
        assert!(!client.is_authenticated());
    }

    #[tokio::test]
    async fn login_with_non_string_token_is_unexpected_response() {
        let mock = MockHttpClient::new().on_post_json(LOGIN_URL, &json!({"token": 42}));
        let client = make_client(&mock);

        let err = client.login("alice", "secret").await.unwrap_err();
        assert!(matches!(err, ClientError::UnexpectedResponse(_)));
    }

    #[tokio::test]
    async fn subtitles_forwards_params_and_returns_data() {
        let body = json!({"total_count": 1, "data": [{"id": "123"}]});
        let mock = MockHttpClient::new().on_get_json(SUBTITLES_URL, &body);
        let client = make_client(&mock);

        let result = client
            .subtitles(Params::from([("query", "the matrix"), ("languages", "en")]))
            .await
            .unwrap();

        assert_eq!(result, body);
        let request = mock.last_request().unwrap();
        assert_eq!(request.method, Method::GET);
        assert_eq!(request.body.get("query"), Some("the matrix"));
        assert_eq!(request.body.get("languages"), Some("en"));
    }

    #[tokio::test]
    async fn subtitles_is_idempotent_and_never_touches_credential() {
        let body = json!({"data": [{"id": "1"}]});
        let mock = MockHttpClient::new().on_get_json(SUBTITLES_URL, &body);
        let client = make_client(&mock);
        let before = client.credential();

        let params = Params::from([("query", "matrix")]);
        let first = client.subtitles(params.clone()).await.unwrap();
        let second = client.subtitles(params).await.unwrap();

        assert_eq!(first, second);
        assert!(Arc::ptr_eq(&before, &client.credential()));

        let requests = mock.get_requests();
        assert_eq!(requests[0].headers, requests[1].headers);
        assert_eq!(requests[0].body, requests[1].body);
    }

    #[tokio::test]
    async fn subtitles_surfaces_invalid_api_key() {
        let mock = MockHttpClient::new().on_get(
            SUBTITLES_URL,
            401,
            r#"{"status":401,"message":"Invalid API key"}"#,
        );
        let client = make_client(&mock);

        let err = client.subtitles(Params::new()).await.unwrap_err();

        assert!(matches!(
            err,
            ClientError::Api { code: 401, ref reason } if reason.as_deref() == Some("Invalid API key")
        ));
    }

    #[tokio::test]
    async fn non_json_success_body_is_api_error() {
        let mock = MockHttpClient::new().on_get(SUBTITLES_URL, 200, "<html>maintenance</html>");
        let client = make_client(&mock);

        let err = client.subtitles(Params::new()).await.unwrap_err();

        assert_eq!(err.code(), Some(200));
        assert_eq!(err.reason(), None);
    }

    #[tokio::test]
    async fn requests_carry_default_headers() {
        let mock = MockHttpClient::new().on_get_json(SUBTITLES_URL, &json!({}));
        let client = make_client(&mock);

        client.subtitles(Params::new()).await.unwrap();

        let request = mock.last_request().unwrap();
        assert!(request
            .headers
            .get(USER_AGENT)
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("opensubtitles-rs/"));
        assert_eq!(request.headers.get(CONTENT_TYPE).unwrap(), "application/json");
        assert_eq!(request.headers.get(ACCEPT).unwrap(), "application/json");
    }

    #[tokio::test]
    async fn close_prevents_further_sends() {
        let mock = MockHttpClient::new().on_get_json(SUBTITLES_URL, &json!({}));
        let client = make_client(&mock);

        client.close();
        let result = client.subtitles(Params::new()).await;

        assert!(matches!(result, Err(ClientError::ClientClosed)));
        assert_eq!(mock.request_count(), 0);
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let mock = MockHttpClient::new().on_post_json(LOGIN_URL, &json!({"token": "T"}));
        let client = make_client(&mock);

        client.close();
        client.close();

        assert!(client.is_closed());
        assert!(matches!(
            client.login("alice", "secret").await,
            Err(ClientError::ClientClosed)
        ));
        assert_eq!(mock.request_count(), 0);
    }

    #[tokio::test]
    async fn unknown_operation_fails_without_sending() {
        let mock = MockHttpClient::new();
        let client = make_client(&mock);

        let result = client.call("features", Params::new()).await;

        assert!(matches!(result, Err(ClientError::UnknownOperation(ref name)) if name == "features"));
        assert_eq!(mock.request_count(), 0);
    }

    #[tokio::test]
    async fn call_by_name_matches_typed_method() {
        let mock = MockHttpClient::new().on_get_json(SUBTITLES_URL, &json!({"data": []}));
        let client = make_client(&mock);

        let result = client.call("subtitles", Params::new()).await.unwrap();
        assert_eq!(result, Some(json!({"data": []})));
    }

    #[tokio::test]
    async fn per_call_timeout_overrides_default() {
        let mock = MockHttpClient::new().on_get_json(SUBTITLES_URL, &json!({}));
        let client = make_client(&mock);

        client
            .call_with_timeout("subtitles", Params::new(), Duration::from_secs(1))
            .await
            .unwrap();
        client.subtitles(Params::new()).await.unwrap();

        let requests = mock.get_requests();
        assert_eq!(requests[0].timeout, Duration::from_secs(1));
        assert_eq!(requests[1].timeout, DEFAULT_TIMEOUT);
    }

    #[tokio::test]
    async fn slow_response_is_timeout_not_api_error() {
        let mock = MockHttpClient::new()
            .on_get_json(SUBTITLES_URL, &json!({}))
            .with_delay(Method::GET, SUBTITLES_URL, Duration::from_secs(5));
        let client = ClientBuilder::new("abc123")
            .timeout(Duration::from_millis(20))
            .build_with(mock)
            .unwrap();

        let result = client.subtitles(Params::new()).await;
        assert!(matches!(result, Err(ClientError::Timeout)));
    }

    #[tokio::test]
    async fn client_interceptors_run_after_credential_stamping() {
        let mock = MockHttpClient::new().on_get_json(SUBTITLES_URL, &json!({}));
        let client = ClientBuilder::new("abc123")
            .request_interceptor(|mut request: RequestDescriptor| {
                let key = request.headers.get(API_KEY_HEADER).cloned();
                if let Some(key) = key {
                    request.headers.insert("X-Seen-Key", key);
                }
                request
            })
            .build_with(mock.clone())
            .unwrap();

        client.subtitles(Params::new()).await.unwrap();

        let request = mock.last_request().unwrap();
        assert_eq!(request.headers.get("X-Seen-Key").unwrap(), "abc123");
    }

    #[tokio::test]
    async fn client_response_interceptor_sees_every_operation() {
        let recorder = RateLimitRecorder::new();
        let mock = MockHttpClient::new()
            .on_post_json(LOGIN_URL, &json!({"token": "T"}))
            .with_header(Method::POST, LOGIN_URL, "ratelimit-remaining", "9")
            .on_get_json(SUBTITLES_URL, &json!({}))
            .with_header(Method::GET, SUBTITLES_URL, "ratelimit-remaining", "8");
        let client = ClientBuilder::new("abc123")
            .response_interceptor(recorder.clone())
            .build_with(mock)
            .unwrap();

        client.login("alice", "secret").await.unwrap();
        assert_eq!(recorder.latest().unwrap().remaining, Some(9));

        client.subtitles(Params::new()).await.unwrap();
        assert_eq!(recorder.latest().unwrap().remaining, Some(8));
    }

    #[tokio::test]
    async fn response_interceptor_can_rewrite_failures() {
        let mock = MockHttpClient::new().on_get(SUBTITLES_URL, 503, "down");
        let client = ClientBuilder::new("abc123")
            .response_interceptor(|_: HttpResponse| HttpResponse::new(200, r#"{"cached": true}"#))
            .build_with(mock)
            .unwrap();

        let result = client.subtitles(Params::new()).await.unwrap();
        assert_eq!(result, json!({"cached": true}));
    }

    #[tokio::test]
    async fn concurrent_calls_after_login_all_carry_token() {
        let mock = MockHttpClient::new()
            .on_post_json(LOGIN_URL, &json!({"token": "shared"}))
            .on_get_json(SUBTITLES_URL, &json!({}));
        let client = Arc::new(make_client(&mock));

        client.login("alice", "secret").await.unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let client = client.clone();
                tokio::spawn(async move {
                    client
                        .subtitles(Params::new().with("page", i))
                        .await
                        .unwrap()
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        let requests = mock.get_requests();
        assert_eq!(requests.len(), 9);
        for request in &requests[1..] {
            assert_eq!(request.headers.get(TOKEN_HEADER).unwrap(), "Bearer shared");
        }
    }

    #[test]
    fn builder_from_config_applies_settings() {
        let config = ClientConfig {
            api_key: "abc123".to_string(),
            base_url: "http://localhost:9999/api/".to_string(),
            timeout_sec: 12,
            user_agent: "custom/1.0".to_string(),
        };

        let client = ClientBuilder::from_config(&config)
            .build_with(MockHttpClient::new())
            .unwrap();

        assert_eq!(client.base_url(), "http://localhost:9999/api");
        assert_eq!(client.timeout(), Duration::from_secs(12));
    }

    #[test]
    fn debug_output_hides_secrets() {
        let client = make_client(&MockHttpClient::new());
        let output = format!("{client:?}");

        assert!(!output.contains("abc123"));
        assert!(output.contains("subtitles"));
    }
}
