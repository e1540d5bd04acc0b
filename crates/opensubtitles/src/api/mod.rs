mod classify;
mod client;
pub mod http;
mod interceptors;
mod operation;
mod request;

pub use classify::{classify, ResponseOutcome};
pub use client::{ClientBuilder, OpenSubtitlesClient, DEFAULT_TIMEOUT};
pub use http::{HttpClient, HttpResponse, ReqwestClient};
pub use interceptors::{CorrelationId, RateLimitRecorder, RateLimitSnapshot, REQUEST_ID_HEADER};
pub use operation::{ApiTarget, Operation, RequestInterceptor, ResponseInterceptor, SuccessCallback};
pub use request::{Params, RequestDescriptor};

/// Default API endpoint, without the version segment
pub const API_ENDPOINT: &str = "https://www.opensubtitles.com/api";

/// API version segment placed between the endpoint and the operation name
pub const API_VERSION: &str = "v1";
