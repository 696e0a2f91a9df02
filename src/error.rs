use std::error::Error as StdError;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorCategory {
    /// Any failure that cannot be confidently attributed to any other error
    /// category in this enum.
    ///
    /// In particular this means that use of Internal is never a guarantee
    /// the error is not, for example, due to a user error - merely that it
    /// cannot be confidently determined by the code.
    Internal,

    /// The user provided invalid input or performed an action that is
    /// unsupported or impossible to complete.
    User,

    /// Stored vault data is truncated, tampered with, or otherwise failed
    /// its integrity checks.
    Corruption,
}

/// Fine-grained condition flags for consumers that want to branch on error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// An authentication tag failed to verify. At the config layer this
    /// means a wrong master passphrase; at the item layer it means
    /// corruption or tampering.
    AuthenticationFailed,
    /// A stored record ended before an expected fixed-length field.
    TruncatedInput,
    /// A stored record carries a format version this build does not know.
    UnsupportedVersion,
    /// Interaction with the filesystem, stdin/stdout, or other I/O failed.
    Io,
    /// Argon2 key derivation failed.
    Kdf,
    /// The authenticated cipher failed to seal data.
    Cipher,
    /// The operating system random source could not deliver bytes.
    RandomSource,
    /// No free slot remains in the sensitive-buffer pool.
    PoolExhausted,
    /// The vault has not been initialized yet.
    NotInitialized,
    /// The vault is already initialized.
    AlreadyInitialized,
    /// An item name, field value, or answer failed validation.
    InvalidInput,
    /// An answer could not be obtained from the configured prompter.
    PromptUnavailable,
}

#[derive(Debug, Error)]
#[error("{msg}")]
pub struct PwmError {
    /// Broad error category, always provided.
    pub category: ErrorCategory,
    /// Optional specific condition tag for consumers that need to
    /// branch their behavior. Any code consuming errors MUST handle
    /// the absence of a defined kind.
    pub kind: Option<ErrorKind>,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
    msg: String,
}

impl PwmError {
    /// Creates a new error with a required category and display message.
    pub fn new(category: ErrorCategory, msg: impl Into<String>) -> Self {
        Self {
            category,
            kind: None,
            source: None,
            msg: msg.into(),
        }
    }

    /// Creates a new error that also tags the failure with a kind.
    pub fn with_kind(category: ErrorCategory, kind: ErrorKind, msg: impl Into<String>) -> Self {
        Self {
            category,
            kind: Some(kind),
            source: None,
            msg: msg.into(),
        }
    }

    /// Creates a new error that carries both a kind tag and the originating source error.
    pub fn with_kind_and_source(
        category: ErrorCategory,
        kind: ErrorKind,
        msg: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self {
            category,
            kind: Some(kind),
            source: Some(Box::new(source)),
            msg: msg.into(),
        }
    }

    /// The user-facing message carried by the error.
    pub fn message(&self) -> &str {
        &self.msg
    }

    /// Returns the preserved source error if present.
    pub fn source_error(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.source.as_deref()
    }

    /// Wraps the current error with a higher-level message while preserving the original as source.
    pub fn with_context(self, msg: impl Into<String>) -> Self {
        let category = self.category;
        let kind = self.kind;
        Self {
            category,
            kind,
            source: Some(Box::new(self)),
            msg: msg.into(),
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, PwmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_preserves_category_and_kind() {
        let err = PwmError::with_kind(
            ErrorCategory::Corruption,
            ErrorKind::AuthenticationFailed,
            "tag mismatch",
        )
        .with_context("could not decrypt item");

        assert_eq!(err.category, ErrorCategory::Corruption);
        assert_eq!(err.kind, Some(ErrorKind::AuthenticationFailed));
        assert_eq!(err.message(), "could not decrypt item");
        assert!(err.source_error().is_some());
    }

    #[test]
    fn display_shows_message() {
        let err = PwmError::new(ErrorCategory::User, "HOME is not set");
        assert_eq!(err.to_string(), "HOME is not set");
    }
}
