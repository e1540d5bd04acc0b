//! Ready-made interceptors

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue};
use std::sync::{Arc, PoisonError, RwLock};

use super::operation::{RequestInterceptor, ResponseInterceptor};
use super::{HttpResponse, RequestDescriptor};

/// Header carrying the per-request correlation id
pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// Adds a fresh `X-Request-Id` to every request that does not already carry one
#[derive(Debug, Clone, Copy, Default)]
pub struct CorrelationId;

impl RequestInterceptor for CorrelationId {
    fn intercept(&self, mut request: RequestDescriptor) -> RequestDescriptor {
        if !request.headers.contains_key(REQUEST_ID_HEADER) {
            let id = uuid::Uuid::new_v4().to_string();
            if let Ok(value) = HeaderValue::from_str(&id) {
                request.headers.insert(REQUEST_ID_HEADER, value);
            }
        }
        request
    }
}

/// Rate-limit headers seen on the most recent response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitSnapshot {
    pub limit: Option<u64>,
    pub remaining: Option<u64>,
    /// Seconds until the window resets
    pub reset_secs: Option<u64>,
    pub observed_at: DateTime<Utc>,
}

/// Records rate-limit headers from responses, leaving them unchanged
///
/// Clones share the same record, so one handle can be given to a client and
/// another kept for reading.
#[derive(Debug, Clone, Default)]
pub struct RateLimitRecorder {
    latest: Arc<RwLock<Option<RateLimitSnapshot>>>,
}

impl RateLimitRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the most recently recorded snapshot
    pub fn latest(&self) -> Option<RateLimitSnapshot> {
        self.latest
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ResponseInterceptor for RateLimitRecorder {
    fn intercept(&self, response: HttpResponse) -> HttpResponse {
        let limit = header_number(&response.headers, "limit");
        let remaining = header_number(&response.headers, "remaining");
        let reset_secs = header_number(&response.headers, "reset");

        if limit.is_some() || remaining.is_some() || reset_secs.is_some() {
            let snapshot = RateLimitSnapshot {
                limit,
                remaining,
                reset_secs,
                observed_at: Utc::now(),
            };
            tracing::trace!(?snapshot, "Recorded rate limit");
            *self.latest.write().unwrap_or_else(PoisonError::into_inner) = Some(snapshot);
        }

        response
    }
}

/// Reads `ratelimit-<suffix>`, falling back to `x-ratelimit-<suffix>`
fn header_number(headers: &HeaderMap, suffix: &str) -> Option<u64> {
    [format!("ratelimit-{suffix}"), format!("x-ratelimit-{suffix}")]
        .iter()
        .filter_map(|name| headers.get(name.as_str()))
        .filter_map(|value| value.to_str().ok())
        .find_map(|value| value.trim().parse().ok())
}
