//! Outcome of an authenticate operation.

use std::sync::Arc;

use crate::auth::error::AuthError;
use crate::auth::principal::Principal;
use crate::auth::properties::AuthenticationProperties;

/// A principal together with the session properties and the scheme that
/// produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticationTicket {
    principal: Principal,
    properties: AuthenticationProperties,
    scheme: String,
}

impl AuthenticationTicket {
    pub fn new(
        principal: Principal,
        properties: AuthenticationProperties,
        scheme: impl Into<String>,
    ) -> Self {
        Self {
            principal,
            properties,
            scheme: scheme.into(),
        }
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn properties(&self) -> &AuthenticationProperties {
        &self.properties
    }

    /// Name of the scheme that issued this ticket.
    pub fn scheme(&self) -> &str {
        &self.scheme
    }
}

/// Result of an authenticate call.
///
/// Cloning is cheap; the ticket is shared, so every clone of a cached
/// `Success` points at the same ticket.
#[derive(Debug, Clone)]
pub enum AuthenticateResult {
    Success(Arc<AuthenticationTicket>),
    NoResult,
    Failure {
        error: AuthError,
        properties: Option<AuthenticationProperties>,
    },
}

impl AuthenticateResult {
    pub fn success(ticket: AuthenticationTicket) -> Self {
        Self::Success(Arc::new(ticket))
    }

    pub fn no_result() -> Self {
        Self::NoResult
    }

    pub fn fail(error: AuthError) -> Self {
        Self::Failure {
            error,
            properties: None,
        }
    }

    pub fn fail_with_properties(error: AuthError, properties: AuthenticationProperties) -> Self {
        Self::Failure {
            error,
            properties: Some(properties),
        }
    }

    pub fn succeeded(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::NoResult)
    }

    pub fn ticket(&self) -> Option<&Arc<AuthenticationTicket>> {
        match self {
            Self::Success(ticket) => Some(ticket),
            _ => None,
        }
    }

    pub fn principal(&self) -> Option<&Principal> {
        self.ticket().map(|t| t.principal())
    }

    pub fn properties(&self) -> Option<&AuthenticationProperties> {
        match self {
            Self::Success(ticket) => Some(ticket.properties()),
            Self::Failure { properties, .. } => properties.as_ref(),
            Self::NoResult => None,
        }
    }

    /// The failure carried by this result, if any. `NoResult` is not a failure here.
    pub fn failure(&self) -> Option<&AuthError> {
        match self {
            Self::Failure { error, .. } => Some(error),
            _ => None,
        }
    }

    /// Collapse into success or failure, treating `NoResult` as
    /// `Err(AuthError::NoResult)`. The cached value itself is left untouched.
    pub fn to_outcome(&self) -> Result<&Arc<AuthenticationTicket>, AuthError> {
        match self {
            Self::Success(ticket) => Ok(ticket),
            Self::NoResult => Err(AuthError::NoResult),
            Self::Failure { error, .. } => Err(error.clone()),
        }
    }
}
