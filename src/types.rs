//! NewType wrappers for strong typing across the authentication pipeline.
//!
//! These types keep scheme names and API key material from being mixed up
//! with arbitrary strings (e.g., passing a raw key where its hash is expected).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Macro to generate a NewType wrapper with standard trait implementations.
macro_rules! newtype_string {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new instance.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Get the inner value as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume and return the inner String.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

newtype_string!(
    /// Registered name of an authentication scheme (e.g., "bearer", "api-key").
    ///
    /// Scheme names are compared ordinally. They are the keys of the scheme
    /// registry and the values of every forward setting.
    SchemeName
);

newtype_string!(
    /// SHA-256 hash of an API key for secure storage and lookup.
    ///
    /// API keys are never kept in plain text. Configured keys and presented
    /// keys are both hashed and compared using this type.
    ApiKeyHash
);

newtype_string!(
    /// Display prefix of an API key (e.g., "sa_abc12345").
    ///
    /// The prefix can be shown to operators for identification purposes.
    /// It does not reveal the full key and cannot be used to authenticate.
    ApiKeyPrefix
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_name_creation() {
        let name = SchemeName::new("bearer");
        assert_eq!(name.as_str(), "bearer");
        assert_eq!(name.to_string(), "bearer");
    }

    #[test]
    fn test_scheme_name_from_string() {
        let name: SchemeName = "cookies".into();
        assert_eq!(name.as_str(), "cookies");

        let name: SchemeName = String::from("api-key").into();
        assert_eq!(name.as_str(), "api-key");
    }

    #[test]
    fn test_scheme_name_compares_with_str() {
        let name = SchemeName::new("bearer");
        assert!(name == *"bearer");
        assert!(name != *"Bearer");
    }

    #[test]
    fn test_scheme_name_serde() {
        let name = SchemeName::new("bearer");
        let json = serde_json::to_string(&name).unwrap();
        assert_eq!(json, "\"bearer\"");

        let parsed: SchemeName = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, name);
    }

    #[test]
    fn test_borrow_for_map_lookup() {
        use std::collections::HashMap;

        let mut map = HashMap::new();
        map.insert(SchemeName::new("bearer"), 1);
        assert_eq!(map.get("bearer"), Some(&1));
        assert_eq!(map.get("cookies"), None);
    }

    #[test]
    fn test_api_key_types() {
        let hash = ApiKeyHash::new("a1b2c3");
        assert_eq!(hash.as_str(), "a1b2c3");

        let prefix = ApiKeyPrefix::new("sa_abc12345");
        assert_eq!(prefix.into_inner(), "sa_abc12345");
    }
}
