//! Worker handle and status types

use chrono::{DateTime, Local};
use std::io;
use tokio::sync::{mpsc, oneshot};

pub use crate::core::ipc::RunId;

/// Ask the monitor task to deliver the termination signal
#[derive(Debug)]
pub(crate) struct TerminateRequest {
    pub reply: oneshot::Sender<io::Result<()>>,
}

/// The live worker, held in the supervisor's single slot.
///
/// The `Child` itself belongs to the monitor task; the handle talks to it
/// through a control channel.
#[derive(Debug)]
pub struct WorkerHandle {
    /// Run this handle belongs to
    pub run_id: RunId,
    /// OS process id, if the OS reported one
    pub pid: Option<u32>,
    /// When the worker was spawned
    pub started_at: DateTime<Local>,
    control_tx: mpsc::UnboundedSender<TerminateRequest>,
}

impl WorkerHandle {
    pub(crate) fn new(
        run_id: RunId,
        pid: Option<u32>,
        control_tx: mpsc::UnboundedSender<TerminateRequest>,
    ) -> Self {
        Self {
            run_id,
            pid,
            started_at: Local::now(),
            control_tx,
        }
    }

    /// Send the termination signal. Resolves once the OS accepted or refused it,
    /// not when the worker is gone.
    pub async fn terminate(&self) -> io::Result<()> {
        let (reply, outcome) = oneshot::channel();
        self.control_tx
            .send(TerminateRequest { reply })
            .map_err(|_| monitor_gone())?;
        outcome.await.map_err(|_| monitor_gone())?
    }
}

fn monitor_gone() -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, "worker has already exited")
}

/// Snapshot of the supervisor slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    Idle,
    Running { run_id: RunId, pid: Option<u32> },
}

/// Status of the current run as the console shows it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    /// Nothing started yet
    Pending,
    /// Worker is running
    Running,
    /// Termination signal sent, waiting for the exit
    Stopping,
    /// Worker exited with a code
    Exited(i32),
    /// Worker could not be started
    Failed(String),
}

impl RunStatus {
    /// Get a short string representation
    pub fn as_str(&self) -> &str {
        match self {
            RunStatus::Pending => "Pending",
            RunStatus::Running => "Running",
            RunStatus::Stopping => "Stopping",
            RunStatus::Exited(_) => "Exited",
            RunStatus::Failed(_) => "Failed",
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, RunStatus::Running | RunStatus::Stopping)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Exited(code) => write!(f, "Exited ({})", code),
            RunStatus::Failed(msg) => write!(f, "Failed: {}", msg),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Format a duration as a human-readable string
pub fn format_duration(duration: chrono::Duration) -> String {
    let total_seconds = duration.num_seconds().max(0);
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(chrono::Duration::seconds(5)), "5s");
        assert_eq!(format_duration(chrono::Duration::seconds(125)), "2m 5s");
        assert_eq!(format_duration(chrono::Duration::seconds(3725)), "1h 2m 5s");
    }

    #[test]
    fn test_run_status_display() {
        assert_eq!(RunStatus::Exited(3).to_string(), "Exited (3)");
        assert_eq!(RunStatus::Failed("boom".into()).to_string(), "Failed: boom");
        assert!(RunStatus::Stopping.is_active());
        assert!(!RunStatus::Exited(0).is_active());
    }

    #[tokio::test]
    async fn test_terminate_after_monitor_gone() {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        drop(control_rx);
        let handle = WorkerHandle::new(RunId::new_v4(), None, control_tx);

        let err = handle.terminate().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
