//! Service lifecycle state machine.
//!
//! `Stopped → StartPending → Running → StopPending → Stopped`, once per
//! process. [`Lifecycle`] holds no I/O: the controller feeds it events and
//! reports whatever status it hands back, which keeps every transition
//! testable without a supervisor.

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Stopped,
    StartPending,
    Running,
    StopPending,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Stopped => "stopped",
            LifecycleState::StartPending => "start_pending",
            LifecycleState::Running => "running",
            LifecycleState::StopPending => "stop_pending",
        };
        f.write_str(name)
    }
}

/// Commands the service advertises as accepted while running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AcceptedCommand {
    Stop,
    Shutdown,
}

const ACCEPTED_WHILE_RUNNING: [AcceptedCommand; 2] =
    [AcceptedCommand::Stop, AcceptedCommand::Shutdown];

/// Status reported to the supervisor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceStatus {
    pub state: LifecycleState,
    pub accepts: Vec<AcceptedCommand>,
}

impl ServiceStatus {
    fn of(state: LifecycleState) -> Self {
        let accepts = match state {
            LifecycleState::Running => ACCEPTED_WHILE_RUNNING.to_vec(),
            _ => Vec::new(),
        };
        Self { state, accepts }
    }
}

/// A control request delivered by the supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    /// Liveness check; answered with the current status.
    Interrogate,
    Stop,
    Shutdown,
    /// Anything the service does not handle. Carries the raw request.
    Other(String),
}

impl FromStr for ControlCommand {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Ok(match trimmed.to_ascii_lowercase().as_str() {
            "interrogate" => ControlCommand::Interrogate,
            "stop" => ControlCommand::Stop,
            "shutdown" => ControlCommand::Shutdown,
            _ => ControlCommand::Other(trimmed.to_string()),
        })
    }
}

impl fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlCommand::Interrogate => f.write_str("interrogate"),
            ControlCommand::Stop => f.write_str("stop"),
            ControlCommand::Shutdown => f.write_str("shutdown"),
            ControlCommand::Other(raw) => f.write_str(raw),
        }
    }
}

/// What the control loop should do after one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Report this status and keep consuming.
    Reply(ServiceStatus),
    /// Not a command this service handles; report it as an error and keep
    /// consuming.
    Unrecognized(String),
    /// Leave the loop after reporting this status.
    Exit(ServiceStatus),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition {
        from: LifecycleState,
        to: LifecycleState,
    },

    #[error("command '{command}' received while {state}")]
    NotRunning {
        command: String,
        state: LifecycleState,
    },

    #[error("service already ran to completion")]
    Finished,
}

#[derive(Debug)]
pub struct Lifecycle {
    state: LifecycleState,
    finished: bool,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: LifecycleState::Stopped,
            finished: false,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn status(&self) -> ServiceStatus {
        ServiceStatus::of(self.state)
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn transition(
        &mut self,
        from: LifecycleState,
        to: LifecycleState,
    ) -> Result<ServiceStatus, LifecycleError> {
        if self.finished {
            return Err(LifecycleError::Finished);
        }
        if self.state != from {
            return Err(LifecycleError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(self.status())
    }

    /// `Stopped → StartPending`. Only valid once per lifetime.
    pub fn begin_start(&mut self) -> Result<ServiceStatus, LifecycleError> {
        self.transition(LifecycleState::Stopped, LifecycleState::StartPending)
    }

    /// `StartPending → Running`, advertising the accepted commands.
    pub fn mark_running(&mut self) -> Result<ServiceStatus, LifecycleError> {
        self.transition(LifecycleState::StartPending, LifecycleState::Running)
    }

    /// `StartPending → Stopped` after a fatal startup error. `Running` is
    /// never reported for this lifetime.
    pub fn abort_start(&mut self) -> Result<(), LifecycleError> {
        self.transition(LifecycleState::StartPending, LifecycleState::Stopped)?;
        self.finished = true;
        Ok(())
    }

    /// `Running → StopPending`.
    pub fn request_stop(&mut self) -> Result<ServiceStatus, LifecycleError> {
        self.transition(LifecycleState::Running, LifecycleState::StopPending)
    }

    /// `StopPending → Stopped`. Terminal.
    pub fn finish(&mut self) -> Result<(), LifecycleError> {
        self.transition(LifecycleState::StopPending, LifecycleState::Stopped)?;
        self.finished = true;
        Ok(())
    }

    /// Feed one control command. Only valid while `Running`.
    pub fn handle(&mut self, command: ControlCommand) -> Result<Step, LifecycleError> {
        if self.state != LifecycleState::Running {
            return Err(LifecycleError::NotRunning {
                command: command.to_string(),
                state: self.state,
            });
        }

        match command {
            ControlCommand::Interrogate => Ok(Step::Reply(self.status())),
            ControlCommand::Stop | ControlCommand::Shutdown => Ok(Step::Exit(self.request_stop()?)),
            ControlCommand::Other(raw) => Ok(Step::Unrecognized(raw)),
        }
    }
}
