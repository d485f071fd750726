//! Verified identity produced by a successful authentication.

use serde::{Deserialize, Serialize};

/// Well-known claim types.
pub mod claim_types {
    pub const NAME: &str = "name";
    pub const NAME_IDENTIFIER: &str = "sub";
    pub const EMAIL: &str = "email";
    pub const ROLE: &str = "role";
}

/// A single statement about a subject, made by an issuer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub claim_type: String,
    pub value: String,
    pub issuer: String,
}

impl Claim {
    pub fn new(
        claim_type: impl Into<String>,
        value: impl Into<String>,
        issuer: impl Into<String>,
    ) -> Self {
        Self {
            claim_type: claim_type.into(),
            value: value.into(),
            issuer: issuer.into(),
        }
    }
}

/// A set of claims established by one authentication type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Scheme or mechanism that established this identity. `None` means unauthenticated.
    authentication_type: Option<String>,
    claims: Vec<Claim>,
}

impl Identity {
    /// Create an authenticated identity.
    pub fn new(authentication_type: impl Into<String>) -> Self {
        Self {
            authentication_type: Some(authentication_type.into()),
            claims: Vec::new(),
        }
    }

    /// Create an identity carrying no authentication type.
    pub fn unauthenticated() -> Self {
        Self::default()
    }

    /// Add a claim and return the identity.
    pub fn with_claim(mut self, claim: Claim) -> Self {
        self.claims.push(claim);
        self
    }

    pub fn add_claim(&mut self, claim: Claim) {
        self.claims.push(claim);
    }

    pub fn authentication_type(&self) -> Option<&str> {
        self.authentication_type.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.authentication_type.is_some()
    }

    pub fn claims(&self) -> &[Claim] {
        &self.claims
    }

    /// First claim of the given type.
    pub fn find_first(&self, claim_type: &str) -> Option<&Claim> {
        self.claims.iter().find(|c| c.claim_type == claim_type)
    }

    /// Value of the name claim, if present.
    pub fn name(&self) -> Option<&str> {
        self.find_first(claim_types::NAME).map(|c| c.value.as_str())
    }
}

/// The subject of a request, made up of one or more identities.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    identities: Vec<Identity>,
}

impl Principal {
    pub fn new(identity: Identity) -> Self {
        Self {
            identities: vec![identity],
        }
    }

    pub fn add_identity(&mut self, identity: Identity) {
        self.identities.push(identity);
    }

    pub fn identities(&self) -> &[Identity] {
        &self.identities
    }

    /// The primary identity: the first authenticated one, else the first.
    pub fn identity(&self) -> Option<&Identity> {
        self.identities
            .iter()
            .find(|i| i.is_authenticated())
            .or_else(|| self.identities.first())
    }

    /// Whether any identity was established by an authentication type.
    pub fn is_authenticated(&self) -> bool {
        self.identities.iter().any(Identity::is_authenticated)
    }

    /// Iterate over the claims of every identity.
    pub fn claims(&self) -> impl Iterator<Item = &Claim> {
        self.identities.iter().flat_map(|i| i.claims.iter())
    }

    pub fn find_first(&self, claim_type: &str) -> Option<&Claim> {
        self.claims().find(|c| c.claim_type == claim_type)
    }

    pub fn has_claim(&self, claim_type: &str, value: &str) -> bool {
        self.claims()
            .any(|c| c.claim_type == claim_type && c.value == value)
    }

    pub fn is_in_role(&self, role: &str) -> bool {
        self.has_claim(claim_types::ROLE, role)
    }

    /// Get a display-friendly name for this principal.
    pub fn display(&self) -> String {
        if let Some(name) = self.find_first(claim_types::NAME) {
            name.value.clone()
        } else if let Some(email) = self.find_first(claim_types::EMAIL) {
            email.value.clone()
        } else if let Some(sub) = self.find_first(claim_types::NAME_IDENTIFIER) {
            sub.value.clone()
        } else {
            "Anonymous".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_identity() -> Identity {
        Identity::new("bearer")
            .with_claim(Claim::new(claim_types::NAME_IDENTIFIER, "user123", "issuer"))
            .with_claim(Claim::new(claim_types::EMAIL, "user@example.com", "issuer"))
            .with_claim(Claim::new(claim_types::ROLE, "admin", "issuer"))
    }

    #[test]
    fn test_identity_authentication_state() {
        assert!(sample_identity().is_authenticated());
        assert!(!Identity::unauthenticated().is_authenticated());
        assert_eq!(sample_identity().authentication_type(), Some("bearer"));
    }

    #[test]
    fn test_principal_queries() {
        let principal = Principal::new(sample_identity());

        assert!(principal.is_authenticated());
        assert!(principal.is_in_role("admin"));
        assert!(!principal.is_in_role("owner"));
        assert_eq!(
            principal.find_first(claim_types::EMAIL).map(|c| c.value.as_str()),
            Some("user@example.com")
        );
        assert_eq!(principal.claims().count(), 3);
    }

    #[test]
    fn test_primary_identity_prefers_authenticated() {
        let mut principal = Principal::new(Identity::unauthenticated());
        principal.add_identity(sample_identity());

        assert_eq!(
            principal.identity().and_then(Identity::authentication_type),
            Some("bearer")
        );
    }

    #[test]
    fn test_principal_display() {
        // With email only
        assert_eq!(Principal::new(sample_identity()).display(), "user@example.com");

        // With name
        let named = sample_identity().with_claim(Claim::new(claim_types::NAME, "Test User", "issuer"));
        assert_eq!(Principal::new(named).display(), "Test User");

        // Nothing
        assert_eq!(Principal::default().display(), "Anonymous");
    }
}
