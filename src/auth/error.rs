//! Error types for authentication handlers.

use std::fmt;

/// Authentication errors.
///
/// Credential problems found by a scheme are normally reported as a
/// [`Failure`](crate::auth::AuthenticateResult::Failure) value carrying one of
/// these variants. Returning one as `Err` from a scheme is reserved for
/// unexpected conditions and for usage errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// A required argument was absent or empty
    InvalidArgument(String),
    /// The handler was used before `initialize`
    NotInitialized,
    /// `initialize` was called a second time for the same handler
    AlreadyInitialized(String),
    /// No scheme with this name is registered
    UnknownScheme(String),
    /// No default scheme is configured for the operation
    NoDefaultScheme(String),
    /// The request context has no dispatcher bound for forwarding
    NoDispatcher,
    /// Scheme options failed validation
    InvalidOptions { scheme: String, message: String },
    /// The scheme had nothing to say about the request
    NoResult,
    /// No credentials were presented
    MissingCredentials,
    /// The presented credentials are not valid
    InvalidCredentials,
    /// Token could not be parsed or verified
    InvalidToken(String),
    /// Credentials were valid once but have expired
    Expired,
    /// The scheme does not support signing in
    SignInNotSupported(String),
    /// The scheme does not support signing out
    SignOutNotSupported(String),
    /// Unexpected error raised by scheme-specific logic
    Scheme(String),
}

impl AuthError {
    /// Create an options validation error for a scheme.
    pub fn invalid_options(scheme: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidOptions {
            scheme: scheme.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument(name) => write!(f, "Invalid argument: {}", name),
            Self::NotInitialized => write!(f, "Authentication handler is not initialized"),
            Self::AlreadyInitialized(scheme) => {
                write!(f, "Authentication handler for scheme '{}' is already initialized", scheme)
            }
            Self::UnknownScheme(scheme) => {
                write!(f, "No authentication handler is registered for scheme '{}'", scheme)
            }
            Self::NoDefaultScheme(operation) => {
                write!(f, "No default scheme is configured for {}", operation)
            }
            Self::NoDispatcher => write!(f, "Request context has no authentication dispatcher"),
            Self::InvalidOptions { scheme, message } => {
                write!(f, "Invalid options for scheme '{}': {}", scheme, message)
            }
            Self::NoResult => write!(f, "No authentication result"),
            Self::MissingCredentials => write!(f, "Authentication required"),
            Self::InvalidCredentials => write!(f, "Invalid credentials"),
            Self::InvalidToken(msg) => write!(f, "Invalid token: {}", msg),
            Self::Expired => write!(f, "Credentials have expired"),
            Self::SignInNotSupported(scheme) => {
                write!(f, "Scheme '{}' does not support sign in", scheme)
            }
            Self::SignOutNotSupported(scheme) => {
                write!(f, "Scheme '{}' does not support sign out", scheme)
            }
            Self::Scheme(msg) => write!(f, "Authentication handler error: {}", msg),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        Self::Scheme(err.to_string())
    }
}
