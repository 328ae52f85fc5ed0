//! Supervisor protocol over the process's standard streams.
//!
//! Commands arrive as one word per line on stdin (`interrogate`, `stop`,
//! `shutdown`); each status goes out as one JSON line on stdout. Ctrl-C is
//! delivered as `stop` and, on unix, SIGTERM as `shutdown`. Logs must go to
//! stderr while this transport is attached.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::controller::SupervisorChannel;
use super::event_log::EventLog;
use super::lifecycle::{ControlCommand, ServiceStatus};
use crate::error::GatewayResult;

const CHANNEL_CAPACITY: usize = 16;

/// Process signals the transport turns into control commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorSignal {
    /// SIGINT / Ctrl-C.
    Interrupt,
    /// SIGTERM.
    Terminate,
}

impl SupervisorSignal {
    pub fn command(self) -> ControlCommand {
        match self {
            SupervisorSignal::Interrupt => ControlCommand::Stop,
            SupervisorSignal::Terminate => ControlCommand::Shutdown,
        }
    }
}

/// Handle on the task writing status lines.
///
/// The task ends once the service side of the channel is dropped and every
/// queued status has been written. Await [`StatusWriter::finish`] before the
/// runtime shuts down, or the last report can be lost.
pub struct StatusWriter {
    task: JoinHandle<()>,
}

impl StatusWriter {
    pub async fn finish(self) {
        if let Err(e) = self.task.await {
            log::error!("Status writer task failed: {}", e);
        }
    }
}

/// Register signal handlers and attach the protocol to stdin/stdout.
pub fn attach(events: Arc<dyn EventLog>) -> GatewayResult<(SupervisorChannel, StatusWriter)> {
    #[cfg(unix)]
    let terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .map_err(|e| {
            crate::error::GatewayError::Registration(format!("cannot install SIGTERM handler: {}", e))
        })?;

    let (channel, cmd_tx, writer) = connect(tokio::io::stdin(), tokio::io::stdout(), events);

    #[cfg(unix)]
    tokio::spawn(forward_signals(terminate, cmd_tx));
    #[cfg(not(unix))]
    tokio::spawn(forward_signals(cmd_tx));

    Ok((channel, writer))
}

/// Run the protocol over any reader/writer pair.
///
/// Returns the service side of the channel, an extra command sender for
/// out-of-band sources such as signals, and the status writer handle.
pub fn connect<R, W>(
    reader: R,
    writer: W,
    events: Arc<dyn EventLog>,
) -> (SupervisorChannel, mpsc::Sender<ControlCommand>, StatusWriter)
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (channel, cmd_tx, status_rx) = SupervisorChannel::pair(CHANNEL_CAPACITY);

    tokio::spawn(read_commands(reader, cmd_tx.clone(), events.clone()));
    let task = tokio::spawn(write_status(writer, status_rx, events));

    (channel, cmd_tx, StatusWriter { task })
}

/// Parse newline-delimited commands from `reader` into `commands`.
///
/// Blank lines are skipped. EOF ends this reader only: signal delivery keeps
/// the channel open, so a service started with stdin closed keeps running.
pub async fn read_commands<R>(
    reader: R,
    commands: mpsc::Sender<ControlCommand>,
    events: Arc<dyn EventLog>,
) where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                let command = match line.parse::<ControlCommand>() {
                    Ok(command) => command,
                    Err(never) => match never {},
                };
                if commands.send(command).await.is_err() {
                    return;
                }
            }
            Ok(None) => {
                log::debug!("Supervisor input closed");
                return;
            }
            Err(e) => {
                events.error(&format!("failed to read supervisor input: {}", e));
                return;
            }
        }
    }
}

/// Write each status as a JSON line to `writer`, flushing after every line.
pub async fn write_status<W>(
    mut writer: W,
    mut statuses: mpsc::Receiver<ServiceStatus>,
    events: Arc<dyn EventLog>,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(status) = statuses.recv().await {
        let mut line = match serde_json::to_string(&status) {
            Ok(line) => line,
            Err(e) => {
                events.error(&format!("failed to encode status: {}", e));
                continue;
            }
        };
        line.push('\n');

        let written = async {
            writer.write_all(line.as_bytes()).await?;
            writer.flush().await
        }
        .await;

        if let Err(e) = written {
            events.error(&format!("failed to write status: {}", e));
            return;
        }
    }
}

#[cfg(unix)]
async fn forward_signals(
    mut terminate: tokio::signal::unix::Signal,
    commands: mpsc::Sender<ControlCommand>,
) {
    loop {
        let signal = tokio::select! {
            result = tokio::signal::ctrl_c() => match result {
                Ok(()) => SupervisorSignal::Interrupt,
                Err(e) => {
                    log::error!("Cannot listen for Ctrl-C: {}", e);
                    return;
                }
            },
            received = terminate.recv() => match received {
                Some(()) => SupervisorSignal::Terminate,
                None => return,
            },
        };
        log::debug!("Received {:?}", signal);
        if commands.send(signal.command()).await.is_err() {
            return;
        }
    }
}

#[cfg(not(unix))]
async fn forward_signals(commands: mpsc::Sender<ControlCommand>) {
    while tokio::signal::ctrl_c().await.is_ok() {
        if commands
            .send(SupervisorSignal::Interrupt.command())
            .await
            .is_err()
        {
            return;
        }
    }
}
