//! Common test utilities for integration tests

#![allow(dead_code)]

use std::time::Duration;

use opensubtitles::{ClientBuilder, OpenSubtitlesClient};
use wiremock::MockServer;

pub const API_KEY: &str = "abc123";

/// Base URL of a mock server, in the shape of the public endpoint
pub fn base_url(server: &MockServer) -> String {
    format!("{}/api", server.uri())
}

/// Creates a client pointed at the mock server
pub fn make_client(server: &MockServer) -> OpenSubtitlesClient {
    make_client_with_timeout(server, Duration::from_secs(5))
}

/// Creates a client pointed at the mock server with a custom timeout
pub fn make_client_with_timeout(server: &MockServer, timeout: Duration) -> OpenSubtitlesClient {
    ClientBuilder::new(API_KEY)
        .base_url(base_url(server))
        .timeout(timeout)
        .build()
        .unwrap()
}
