//! # Error Handling
//!
//! Error types for the encryption core.
//!
//! ## Error Hierarchy
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           ERROR HIERARCHY                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Error (top-level)                                                     │
//! │  │                                                                      │
//! │  ├── Authentication (100-199)                                          │
//! │  │   ├── AuthenticationFailed  - Wrong password / key / tag            │
//! │  │   └── VerificationFailed    - Signature did not verify              │
//! │  │                                                                      │
//! │  ├── Key Availability (200-299)                                        │
//! │  │   ├── KeyUnavailable        - No channel/file/media key locally     │
//! │  │   └── NoIdentity            - No identity unlocked                  │
//! │  │                                                                      │
//! │  ├── Malformed Input (300-399)                                         │
//! │  │   ├── MalformedInput        - Bad envelope / record structure       │
//! │  │   ├── InvalidKey            - Key bytes of the wrong shape          │
//! │  │   └── SerializationError    - serde failures                        │
//! │  │                                                                      │
//! │  ├── Entropy (400-499)                                                 │
//! │  │   └── RngFailed             - OS CSPRNG unavailable (fatal)         │
//! │  │                                                                      │
//! │  └── Environment (500-599)                                             │
//! │      ├── Storage*              - Local secure store I/O                │
//! │      ├── DirectoryError        - Public key lookup failed              │
//! │      └── InvalidConfig         - Unsafe configuration value            │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every public operation returns either a value, a typed `Error`, or `None`
//! (for the codec-level "cannot decrypt"). Callers render failures as
//! "unable to decrypt" and never fall back to plaintext.

use thiserror::Error;

/// Result type alias for encryption core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Authentication Errors (100-199)
    // ========================================================================

    /// Wrong password, wrong key, or a tag mismatch
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Signature verification failed
    #[error("Signature verification failed")]
    VerificationFailed,

    // ========================================================================
    // Key Availability Errors (200-299)
    // ========================================================================

    /// No key present locally for the requested object
    #[error("Key unavailable: {0}")]
    KeyUnavailable(String),

    /// No identity has been unlocked into the cache
    #[error("No identity unlocked. Unlock or generate an identity first.")]
    NoIdentity,

    // ========================================================================
    // Malformed Input Errors (300-399)
    // ========================================================================

    /// Corrupted envelope structure (bad length prefix, truncated record)
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// Invalid key format or length
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    // ========================================================================
    // Entropy Errors (400-499)
    // ========================================================================

    /// Random number generation failed
    #[error("Random number generation failed")]
    RngFailed,

    // ========================================================================
    // Environment Errors (500-599)
    // ========================================================================

    /// Key derivation failed
    #[error("Failed to derive keys: {0}")]
    KeyDerivationFailed(String),

    /// Encryption failed
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// Failed to read from storage
    #[error("Failed to read from storage: {0}")]
    StorageReadError(String),

    /// Failed to write to storage
    #[error("Failed to write to storage: {0}")]
    StorageWriteError(String),

    /// Public key directory lookup failed
    #[error("Public key lookup failed: {0}")]
    DirectoryError(String),

    /// Configuration value out of the safe range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Failure classes callers act on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Reprompt for the password or re-fetch the key
    Authentication,
    /// Trigger key distribution or show "cannot decrypt"
    KeyUnavailable,
    /// Data corruption; log and show as a decrypt failure
    MalformedInput,
    /// No secure randomness; nothing may proceed
    Entropy,
    /// Local I/O, directory or configuration problem
    Environment,
}

impl Error {
    /// Get the numeric error code
    ///
    /// Error codes are organized by category:
    /// - 100-199: Authentication
    /// - 200-299: Key availability
    /// - 300-399: Malformed input
    /// - 400-499: Entropy
    /// - 500-599: Environment
    pub fn code(&self) -> i32 {
        match self {
            Error::AuthenticationFailed(_) => 100,
            Error::VerificationFailed => 101,

            Error::KeyUnavailable(_) => 200,
            Error::NoIdentity => 201,

            Error::MalformedInput(_) => 300,
            Error::InvalidKey(_) => 301,
            Error::SerializationError(_) => 302,

            Error::RngFailed => 400,

            Error::KeyDerivationFailed(_) => 500,
            Error::EncryptionFailed(_) => 501,
            Error::StorageReadError(_) => 502,
            Error::StorageWriteError(_) => 503,
            Error::DirectoryError(_) => 504,
            Error::InvalidConfig(_) => 505,
        }
    }

    /// Map this error onto the caller-facing taxonomy
    pub fn category(&self) -> ErrorCategory {
        match self.code() {
            100..=199 => ErrorCategory::Authentication,
            200..=299 => ErrorCategory::KeyUnavailable,
            300..=399 => ErrorCategory::MalformedInput,
            400..=499 => ErrorCategory::Entropy,
            _ => ErrorCategory::Environment,
        }
    }

    /// Check if this error is recoverable
    ///
    /// Recoverable errors can be resolved by user action (reprompt) or by
    /// re-requesting key distribution. Entropy failure is never recoverable.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::AuthenticationFailed(_)
                | Error::KeyUnavailable(_)
                | Error::NoIdentity
                | Error::DirectoryError(_)
        )
    }

    /// Whether this error must abort the process-level crypto context
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::RngFailed)
    }
}

// ============================================================================
// ERROR CONVERSIONS
// ============================================================================

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

impl From<base64::DecodeError> for Error {
    fn from(err: base64::DecodeError) -> Self {
        Error::MalformedInput(format!("Invalid base64: {}", err))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::AuthenticationFailed("x".into()).code(), 100);
        assert_eq!(Error::KeyUnavailable("x".into()).code(), 200);
        assert_eq!(Error::MalformedInput("x".into()).code(), 300);
        assert_eq!(Error::RngFailed.code(), 400);
        assert_eq!(Error::InvalidConfig("x".into()).code(), 505);
    }

    #[test]
    fn test_categories() {
        assert_eq!(
            Error::VerificationFailed.category(),
            ErrorCategory::Authentication
        );
        assert_eq!(Error::NoIdentity.category(), ErrorCategory::KeyUnavailable);
        assert_eq!(
            Error::InvalidKey("short".into()).category(),
            ErrorCategory::MalformedInput
        );
        assert_eq!(Error::RngFailed.category(), ErrorCategory::Entropy);
        assert_eq!(
            Error::StorageWriteError("disk".into()).category(),
            ErrorCategory::Environment
        );
    }

    #[test]
    fn test_recoverable_errors() {
        assert!(Error::AuthenticationFailed("x".into()).is_recoverable());
        assert!(Error::KeyUnavailable("x".into()).is_recoverable());
        assert!(!Error::RngFailed.is_recoverable());
        assert!(Error::RngFailed.is_fatal());
        assert!(!Error::MalformedInput("x".into()).is_fatal());
    }

    #[test]
    fn test_base64_error_is_malformed() {
        use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
        let err: Error = BASE64.decode("not base64!!").unwrap_err().into();
        assert_eq!(err.category(), ErrorCategory::MalformedInput);
    }
}
