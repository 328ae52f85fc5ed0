//! Gateway configuration.
//!
//! Every field has a default, so a JSON file only needs to name what it
//! overrides. Command-line flags are layered on top by the binary.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;

use serde::Deserialize;

use crate::credentials::DomainPolicy;
use crate::error::{GatewayError, GatewayResult};

pub const DEFAULT_SERVICE_NAME: &str = "TM1-Authenticator-Service";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_PATH: &str = "/ActiveUser";
pub const DEFAULT_REALM: &str = "restricted";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Name reported to the supervisor and used as the log source.
    pub service_name: String,
    pub host: IpAddr,
    pub port: u16,
    /// Path of the protected resource.
    pub path: String,
    /// Realm advertised in the `WWW-Authenticate` challenge.
    pub realm: String,
    pub policy: PolicyConfig,
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Accepted e-mail domain, compared exactly against the part after `@`.
    pub domain: String,
    pub secret: String,
}

// Keep the secret out of `{:?}` output.
impl std::fmt::Debug for PolicyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyConfig")
            .field("domain", &self.domain)
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            path: DEFAULT_PATH.to_string(),
            realm: DEFAULT_REALM.to_string(),
            policy: PolicyConfig::default(),
        }
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            domain: "example.com".to_string(),
            secret: "apple".to_string(),
        }
    }
}

impl GatewayConfig {
    /// Load a JSON config file. Missing fields fall back to defaults.
    pub fn load(path: &Path) -> GatewayResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            GatewayError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: GatewayConfig = serde_json::from_str(&raw)?;
        log::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> GatewayResult<()> {
        if !self.path.starts_with('/') {
            return Err(GatewayError::Config(format!(
                "path must start with '/': {}",
                self.path
            )));
        }
        if self.realm.is_empty() || self.realm.contains('"') {
            return Err(GatewayError::Config(
                "realm must be non-empty and must not contain '\"'".into(),
            ));
        }
        if self.policy.domain.is_empty() {
            return Err(GatewayError::Config("policy.domain must not be empty".into()));
        }
        if self.policy.secret.is_empty() {
            return Err(GatewayError::Config("policy.secret must not be empty".into()));
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Build the credential policy described by this config.
    pub fn domain_policy(&self) -> DomainPolicy {
        DomainPolicy::new(&self.policy.domain, &self.policy.secret)
    }
}
