use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use super::CredentialValidator;

/// Accepts identifiers of the form `<local>@<domain>` for one fixed domain,
/// paired with one shared secret.
///
/// The secret is kept only as a SHA-256 digest. Candidate secrets are hashed
/// the same way and compared with [`ConstantTimeEq`], so neither the length
/// nor the matching prefix of the configured secret leaks through timing.
#[derive(Clone)]
pub struct DomainPolicy {
    domain: String,
    secret_digest: [u8; 32],
}

impl DomainPolicy {
    pub fn new(domain: &str, secret: &str) -> Self {
        Self {
            domain: domain.to_string(),
            secret_digest: digest(secret),
        }
    }

    fn identifier_in_domain(&self, identifier: &str) -> bool {
        let mut parts = identifier.split('@');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(_), Some(domain), None) => domain == self.domain,
            _ => false,
        }
    }
}

impl std::fmt::Debug for DomainPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DomainPolicy")
            .field("domain", &self.domain)
            .finish_non_exhaustive()
    }
}

impl CredentialValidator for DomainPolicy {
    fn validate(&self, identifier: &str, secret: &str) -> bool {
        if secret.is_empty() || !self.identifier_in_domain(identifier) {
            return false;
        }
        digest(secret)[..].ct_eq(&self.secret_digest[..]).into()
    }
}

fn digest(value: &str) -> [u8; 32] {
    Sha256::digest(value.as_bytes()).into()
}
