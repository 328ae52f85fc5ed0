//! Hosting modes.
//!
//! - Supervised: [`run_service`] drives the full lifecycle through a
//!   [`SupervisorChannel`]; [`run_attached`] does the same over a
//!   [`stdio`] transport and waits for the last status to be written.
//! - Interactive: [`run_interactive`] serves in the foreground until Ctrl-C.
//!
//! Both serve the same router.

pub mod controller;
pub mod event_log;
pub mod lifecycle;
pub mod stdio;

use std::future::Future;
use std::sync::Arc;

pub use controller::{ServiceController, SupervisorChannel};
pub use event_log::{EventLog, LogEventLog, MemoryEventLog};
pub use lifecycle::{ControlCommand, LifecycleState, ServiceStatus};

use crate::config::GatewayConfig;
use crate::credentials::CredentialValidator;
use crate::error::GatewayResult;
use crate::host_api;
use stdio::StatusWriter;

/// Run under a supervisor until it asks the service to stop.
pub async fn run_service(
    config: &GatewayConfig,
    validator: Arc<dyn CredentialValidator>,
    events: Arc<dyn EventLog>,
    channel: SupervisorChannel,
) -> GatewayResult<()> {
    let name = &config.service_name;
    events.info(&format!("starting {} service on port {}", name, config.port));

    let result = async {
        let app = host_api::router(config, validator, events.clone())?;
        let mut controller = ServiceController::new(events.clone());
        controller.execute(config.socket_addr(), app, channel).await
    }
    .await;

    match &result {
        Ok(()) => events.info(&format!("service {} stopped", name)),
        Err(e) => events.error(&format!("service {} failed: {}", name, e)),
    }
    result
}

/// [`run_service`], then wait until `writer` has written every status,
/// including the final `StopPending` or the lone `StartPending` of a failed
/// start.
pub async fn run_attached(
    config: &GatewayConfig,
    validator: Arc<dyn CredentialValidator>,
    events: Arc<dyn EventLog>,
    channel: SupervisorChannel,
    writer: StatusWriter,
) -> GatewayResult<()> {
    let result = run_service(config, validator, events, channel).await;
    writer.finish().await;
    result
}

/// Serve in the foreground with no lifecycle reporting.
pub async fn run_interactive(
    config: &GatewayConfig,
    validator: Arc<dyn CredentialValidator>,
    events: Arc<dyn EventLog>,
) -> GatewayResult<()> {
    let app = host_api::router(config, validator, events.clone())?;
    let server = host_api::bind(config.socket_addr(), app).await?;
    events.info(&format!(
        "Starting Authenticator service on port {}",
        server.local_addr().port()
    ));

    server
        .serve_until(until_interrupted(tokio::signal::ctrl_c(), events.clone()))
        .await?;
    events.info("Authenticator service stopped");
    Ok(())
}

/// Resolves when `interrupt` fires. If the listener could not be installed
/// the error is logged and this never resolves, so the server runs until the
/// process is killed.
async fn until_interrupted<F>(interrupt: F, events: Arc<dyn EventLog>)
where
    F: Future<Output = std::io::Result<()>>,
{
    if let Err(e) = interrupt.await {
        events.error(&format!(
            "cannot listen for Ctrl-C, serving until killed: {}",
            e
        ));
        std::future::pending::<()>().await;
    }
}
