use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use super::event_log::EventLog;
use super::lifecycle::{ControlCommand, Lifecycle, LifecycleState, ServiceStatus, Step};
use crate::error::GatewayResult;
use crate::host_api;

/// The two directions of the supervisor protocol.
pub struct SupervisorChannel {
    /// Control requests, consumed in arrival order.
    pub commands: mpsc::Receiver<ControlCommand>,
    /// Status reports back to the supervisor.
    pub status: mpsc::Sender<ServiceStatus>,
}

impl SupervisorChannel {
    /// An in-process channel pair. Returns the service side plus the
    /// supervisor's ends: a command sender and a status receiver.
    pub fn pair(
        capacity: usize,
    ) -> (
        Self,
        mpsc::Sender<ControlCommand>,
        mpsc::Receiver<ServiceStatus>,
    ) {
        let (cmd_tx, cmd_rx) = mpsc::channel(capacity);
        let (status_tx, status_rx) = mpsc::channel(capacity);
        (
            Self {
                commands: cmd_rx,
                status: status_tx,
            },
            cmd_tx,
            status_rx,
        )
    }
}

/// Drives the HTTP server up and down from supervisor commands.
///
/// The controller is the only writer of the lifecycle state. The server runs
/// on its own task, so the control loop stays responsive while requests are
/// handled.
pub struct ServiceController {
    lifecycle: Lifecycle,
    events: Arc<dyn EventLog>,
}

impl ServiceController {
    pub fn new(events: Arc<dyn EventLog>) -> Self {
        Self {
            lifecycle: Lifecycle::new(),
            events,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    /// Report a state transition. Waits for room in the status channel.
    async fn report(&self, status: &mpsc::Sender<ServiceStatus>, update: ServiceStatus) {
        log::debug!("Reporting status {}", update.state);
        if status.send(update).await.is_err() {
            self.events.error("supervisor status channel closed");
        }
    }

    /// Answer an `Interrogate` without waiting: a supervisor that is not
    /// draining replies must not hold up a later `Stop`.
    fn reply(&self, status: &mpsc::Sender<ServiceStatus>, current: ServiceStatus) {
        match status.try_send(current) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => self
                .events
                .warn("supervisor is not reading status; dropped interrogate reply"),
            Err(TrySendError::Closed(_)) => {
                self.events.error("supervisor status channel closed")
            }
        }
    }

    /// Run one full lifecycle: bind and serve `app` on `addr`, then consume
    /// commands until `Stop`/`Shutdown` (or the command channel closes).
    ///
    /// A bind failure is returned before `Running` is reported. After
    /// `StopPending` is reported the server task is aborted; requests still
    /// in flight are dropped.
    pub async fn execute(
        &mut self,
        addr: SocketAddr,
        app: Router,
        channel: SupervisorChannel,
    ) -> GatewayResult<()> {
        let SupervisorChannel {
            mut commands,
            status,
        } = channel;

        let pending = self.lifecycle.begin_start()?;
        self.report(&status, pending).await;

        let server = match host_api::bind(addr, app).await {
            Ok(server) => server,
            Err(e) => {
                self.lifecycle.abort_start()?;
                return Err(e);
            }
        };
        let mut serving = server.spawn();

        let running = self.lifecycle.mark_running()?;
        self.report(&status, running).await;

        let stopping = loop {
            let command = tokio::select! {
                command = commands.recv() => command,
                result = &mut serving => {
                    match result {
                        Ok(Ok(())) => self.events.error("HTTP server exited unexpectedly"),
                        Ok(Err(e)) => self.events.error(&format!("HTTP server failed: {}", e)),
                        Err(e) => self.events.error(&format!("HTTP server task failed: {}", e)),
                    }
                    break self.lifecycle.request_stop()?;
                }
            };

            let Some(command) = command else {
                self.events.info("control channel closed; stopping");
                break self.lifecycle.request_stop()?;
            };

            match self.lifecycle.handle(command)? {
                Step::Reply(current) => self.reply(&status, current),
                Step::Unrecognized(raw) => {
                    self.events
                        .error(&format!("unexpected control request: {}", raw));
                }
                Step::Exit(stop_pending) => break stop_pending,
            }
        };

        self.report(&status, stopping).await;
        serving.abort();
        self.lifecycle.finish()?;
        Ok(())
    }
}
