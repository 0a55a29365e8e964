pub mod error;
pub mod local;
pub mod session;

pub use error::{StoreError, StoreResult};
pub use local::{EXERCISE_ID_KEY, ExerciseContext, JsonFileStore, MemoryStore, STUDENT_CODE_KEY};
pub use session::{CookieFileVault, MemoryVault, SESSION_COOKIE_NAME, SessionToken};

/// Flat key/value storage for exercise context, mirroring the browser
/// `localStorage` entries the popup reads at submission time.
pub trait LocalStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> StoreResult<()>;
}

/// Storage for the session token used by the authenticated paths.
pub trait SessionVault: Send + Sync {
    /// Returns the stored token, if one is present and non-blank.
    fn session_token(&self) -> Option<SessionToken>;
    /// Stores a token, percent-encoding it at rest.
    fn store_session(&self, token: &str) -> StoreResult<()>;
}
