//! Diagnostic events emitted by authentication handlers.
//!
//! Each event carries a stable `event` field so log pipelines can match on it
//! without parsing the message.

use tracing::{debug, info};

pub fn authenticated(scheme: &str) {
    debug!(event = "authenticated", scheme, "AuthenticationScheme: {} was successfully authenticated.", scheme);
}

pub fn not_authenticated(scheme: &str) {
    debug!(event = "not_authenticated", scheme, "AuthenticationScheme: {} was not authenticated.", scheme);
}

pub fn authentication_failed(scheme: &str, message: &str) {
    info!(
        event = "authentication_failed",
        scheme,
        "{} was not authenticated. Failure message: {}",
        scheme,
        message
    );
}

pub fn challenged(scheme: &str) {
    info!(event = "challenged", scheme, "AuthenticationScheme: {} was challenged.", scheme);
}

pub fn forbidden(scheme: &str) {
    info!(event = "forbidden", scheme, "AuthenticationScheme: {} was forbidden.", scheme);
}

pub fn signed_in(scheme: &str) {
    info!(event = "signed_in", scheme, "AuthenticationScheme: {} signed in.", scheme);
}

pub fn signed_out(scheme: &str) {
    info!(event = "signed_out", scheme, "AuthenticationScheme: {} signed out.", scheme);
}
