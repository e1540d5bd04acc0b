use reqwest::header::HeaderValue;
use std::fmt;

use crate::api::RequestDescriptor;
use crate::error::ClientError;

/// Header carrying the consumer's API key on every request
pub const API_KEY_HEADER: &str = "Api-Key";

/// Header carrying the user's bearer token once logged in
pub const TOKEN_HEADER: &str = "Authentication";

/// Authentication material for the OpenSubtitles API
///
/// The API key identifies the consumer of the API and is always sent. The
/// token identifies a specific user and is only present after a successful
/// login. A `Credential` never changes after construction; rotating the token
/// means building a new value with [`Credential::with_token`].
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    api_key: String,
    token: Option<String>,
    api_key_header: HeaderValue,
    token_header: Option<HeaderValue>,
}

impl Credential {
    /// Creates a credential carrying only an API key
    pub fn new(api_key: impl Into<String>) -> Result<Self, ClientError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(ClientError::InvalidCredential(
                "API key must not be empty".into(),
            ));
        }

        let api_key_header = sensitive_header(&api_key).ok_or_else(|| {
            ClientError::InvalidCredential("API key contains characters not allowed in a header".into())
        })?;

        Ok(Self {
            api_key,
            token: None,
            api_key_header,
            token_header: None,
        })
    }

    /// Returns a new credential with the same API key and the given token
    pub fn with_token(&self, token: impl Into<String>) -> Result<Self, ClientError> {
        let token = token.into();
        if token.is_empty() {
            return Err(ClientError::InvalidCredential("token must not be empty".into()));
        }

        let token_header = sensitive_header(&format!("Bearer {token}")).ok_or_else(|| {
            ClientError::InvalidCredential("token contains characters not allowed in a header".into())
        })?;

        Ok(Self {
            api_key: self.api_key.clone(),
            token: Some(token),
            api_key_header: self.api_key_header.clone(),
            token_header: Some(token_header),
        })
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Checks if this credential identifies a logged-in user
    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    /// Returns the request with the authentication headers set
    ///
    /// `Api-Key` is always set. `Authentication: Bearer <token>` is set only
    /// when a token is present, and removed otherwise so a stale value can
    /// never leak through.
    pub fn stamp(&self, mut request: RequestDescriptor) -> RequestDescriptor {
        request
            .headers
            .insert(API_KEY_HEADER, self.api_key_header.clone());

        match &self.token_header {
            Some(value) => {
                request.headers.insert(TOKEN_HEADER, value.clone());
            }
            None => {
                request.headers.remove(TOKEN_HEADER);
            }
        }

        request
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("api_key", &"<redacted>")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

fn sensitive_header(value: &str) -> Option<HeaderValue> {
    let mut header = HeaderValue::from_str(value).ok()?;
    header.set_sensitive(true);
    Some(header)
}
