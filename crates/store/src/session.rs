use std::path::PathBuf;
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::error::StoreResult;
use crate::local::JsonFileStore;
use crate::{LocalStore, SessionVault};

/// Cookie name the session token is stored under.
pub const SESSION_COOKIE_NAME: &str = "session";

/// Session token held in decoded form.
///
/// At rest the token is percent-encoded, matching how the web client wrote
/// its session cookie. Reads decode it so the backend re-encodes exactly
/// once when it builds the `Authorization` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionToken {
    raw: String,
}

impl SessionToken {
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    /// Decodes a percent-encoded value as read from storage. Values that do
    /// not decode cleanly are kept verbatim rather than dropped.
    pub fn from_encoded(stored: &str) -> Self {
        match urlencoding::decode(stored) {
            Ok(decoded) => Self::new(decoded.into_owned()),
            Err(_) => Self::new(stored),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

/// File-backed vault reusing the JSON entry store as a small cookie jar.
pub struct CookieFileVault {
    store: JsonFileStore,
}

impl CookieFileVault {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            store: JsonFileStore::open(path),
        }
    }
}

impl SessionVault for CookieFileVault {
    fn session_token(&self) -> Option<SessionToken> {
        let stored = self.store.get(SESSION_COOKIE_NAME)?;
        if stored.trim().is_empty() {
            return None;
        }
        Some(SessionToken::from_encoded(&stored))
    }

    fn store_session(&self, token: &str) -> StoreResult<()> {
        self.store
            .set(SESSION_COOKIE_NAME, urlencoding::encode(token).as_ref())
    }
}

/// In-memory vault for tests and QA scenarios.
pub struct MemoryVault {
    encoded: ArcSwap<Option<String>>,
}

impl MemoryVault {
    pub fn new() -> Self {
        Self {
            encoded: ArcSwap::from_pointee(None),
        }
    }

    pub fn with_session(token: &str) -> Self {
        let vault = Self::new();
        vault
            .encoded
            .store(Arc::new(Some(urlencoding::encode(token).into_owned())));
        vault
    }
}

impl Default for MemoryVault {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionVault for MemoryVault {
    fn session_token(&self) -> Option<SessionToken> {
        let guard = self.encoded.load();
        let stored = guard.as_ref().as_ref()?;
        if stored.trim().is_empty() {
            return None;
        }
        Some(SessionToken::from_encoded(stored))
    }

    fn store_session(&self, token: &str) -> StoreResult<()> {
        self.encoded
            .store(Arc::new(Some(urlencoding::encode(token).into_owned())));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_token_is_percent_encoded_at_rest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cookies.json");

        let vault = CookieFileVault::open(&path);
        vault.store_session("abc==").unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("abc%3D%3D"), "raw file was: {raw}");

        let token = vault.session_token().unwrap();
        assert_eq!(token.as_str(), "abc==");
    }

    #[test]
    fn memory_vault_round_trips_decoded_form() {
        let vault = MemoryVault::with_session("tok/with spaces");
        assert_eq!(vault.session_token().unwrap().as_str(), "tok/with spaces");
    }

    #[test]
    fn blank_session_is_treated_as_absent() {
        let vault = MemoryVault::new();
        assert!(vault.session_token().is_none());

        vault.store_session("").unwrap();
        assert!(vault.session_token().is_none());
    }

    #[test]
    fn undecodable_token_is_kept_verbatim() {
        let token = SessionToken::from_encoded("%FF");
        assert_eq!(token.as_str(), "%FF");
    }
}
