//! Client for the OpenSubtitles REST API
//!
//! Every request carries the consumer's API key. After [`OpenSubtitlesClient::login`]
//! succeeds, every later request also carries the user's bearer token.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;

pub use api::{ClientBuilder, OpenSubtitlesClient, Params};
pub use auth::Credential;
pub use error::{ClientError, TransportError};
