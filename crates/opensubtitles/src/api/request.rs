use reqwest::header::HeaderMap;
use reqwest::Method;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Key/value arguments of an operation
///
/// Sent as the query string for GET requests and as a JSON object body
/// otherwise. Keys are kept sorted so identical arguments always produce
/// identical requests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Params(BTreeMap<String, String>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a parameter, replacing any previous value for the key
    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl ToString) {
        self.0.insert(key.into(), value.to_string());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: ToString> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (key, value) in iter {
            params.insert(key, value);
        }
        params
    }
}

impl<K: Into<String>, V: ToString, const N: usize> From<[(K, V); N]> for Params {
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

/// A request on its way through an operation's pipeline
///
/// Interceptors receive a descriptor and return one, so each step sees the
/// output of the previous step.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub method: Method,
    /// Name of the operation this request belongs to (e.g. `login`)
    pub operation: String,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Params,
    pub timeout: Duration,
}

impl RequestDescriptor {
    pub fn new(
        method: Method,
        operation: impl Into<String>,
        url: impl Into<String>,
        headers: HeaderMap,
        body: Params,
        timeout: Duration,
    ) -> Self {
        Self {
            method,
            operation: operation.into(),
            url: url.into(),
            headers,
            body,
            timeout,
        }
    }

    /// Checks if the parameters travel in the query string
    pub fn uses_query(&self) -> bool {
        [Method::GET, Method::HEAD, Method::DELETE].contains(&self.method)
    }
}
