//! Credential validation.
//!
//! [`CredentialValidator`] is the seam between the auth gate and whatever
//! decides whether an identifier/secret pair is acceptable. The gate only
//! ever sees a `bool`; a real credential store can replace [`DomainPolicy`]
//! without touching request handling.

mod policy;

pub use policy::DomainPolicy;

/// Validates an (identifier, secret) pair.
///
/// Implementations must be pure: deterministic, no I/O, no logging of the
/// secret, and never panic. They are shared read-only across all in-flight
/// requests.
pub trait CredentialValidator: Send + Sync {
    fn validate(&self, identifier: &str, secret: &str) -> bool;
}

impl<F> CredentialValidator for F
where
    F: Fn(&str, &str) -> bool + Send + Sync,
{
    fn validate(&self, identifier: &str, secret: &str) -> bool {
        self(identifier, secret)
    }
}
