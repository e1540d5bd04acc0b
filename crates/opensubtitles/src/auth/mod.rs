mod credential;
mod state;

pub use credential::{Credential, API_KEY_HEADER, TOKEN_HEADER};
pub use state::AuthState;
