use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use authenticator_lib::credentials::CredentialValidator;
use authenticator_lib::service::{self, EventLog, LogEventLog};
use authenticator_lib::GatewayConfig;
use clap::Parser;
use tracing_subscriber::{self, EnvFilter};

#[derive(Parser)]
#[command(name = "authenticator-service")]
#[command(about = "HTTP Basic authentication gateway")]
#[command(version)]
struct Cli {
    /// JSON config file; flags below override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(long)]
    host: Option<IpAddr>,

    /// Port for the HTTP server to listen on
    #[arg(long, env = "AUTHENTICATOR_PORT")]
    port: Option<u16>,

    /// Path of the protected resource
    #[arg(long)]
    path: Option<String>,

    /// Accepted e-mail domain
    #[arg(long)]
    domain: Option<String>,

    /// Run under a supervisor: commands on stdin, status on stdout
    #[arg(long, env = "AUTHENTICATOR_SERVICE")]
    service: bool,
}

impl Cli {
    fn into_config(self) -> Result<GatewayConfig> {
        let mut config = match &self.config {
            Some(path) => GatewayConfig::load(path)?,
            None => GatewayConfig::default(),
        };

        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(path) = self.path {
            config.path = path;
        }
        if let Some(domain) = self.domain {
            config.policy.domain = domain;
        }
        // Secrets only come from the environment or the config file.
        if let Ok(secret) = std::env::var("AUTHENTICATOR_SECRET") {
            config.policy.secret = secret;
        }

        config.validate()?;
        Ok(config)
    }
}

/// `RUST_LOG` directives when set and valid, otherwise `info`.
fn log_filter(directives: Option<String>) -> EnvFilter {
    directives
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries supervisor status in service mode.
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(std::env::var("RUST_LOG").ok()))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let cli = Cli::parse();
    let supervised = cli.service;
    let config = cli.into_config()?;

    let events: Arc<dyn EventLog> = Arc::new(LogEventLog::new(config.service_name.clone()));
    let validator: Arc<dyn CredentialValidator> = Arc::new(config.domain_policy());
    tracing::info!(
        "Protecting {} for domain {}",
        config.path,
        config.policy.domain
    );

    if supervised {
        let (channel, writer) = service::stdio::attach(events.clone()).inspect_err(|e| {
            events.error(&format!("service {} failed: {}", config.service_name, e));
        })?;
        service::run_attached(&config, validator, events, channel, writer).await?;
    } else {
        service::run_interactive(&config, validator, events).await?;
    }

    Ok(())
}
