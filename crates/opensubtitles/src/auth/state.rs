use std::sync::{Arc, PoisonError, RwLock};

use super::Credential;

/// The client's single, swappable credential slot
///
/// Every operation reads the current credential when it builds its request.
/// Replacing it swaps the `Arc` under a write lock, so a reader sees either
/// the old credential or the new one, never a mix. Two replacements racing
/// each other resolve as last-write-wins.
#[derive(Debug)]
pub struct AuthState {
    current: RwLock<Arc<Credential>>,
}

impl AuthState {
    pub fn new(credential: Credential) -> Self {
        Self {
            current: RwLock::new(Arc::new(credential)),
        }
    }

    /// Returns the credential current at this instant
    pub fn current(&self) -> Arc<Credential> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replaces the current credential, returning the previous one
    pub fn replace(&self, credential: Credential) -> Arc<Credential> {
        let mut guard = self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, Arc::new(credential))
    }
}
