//! Types exchanged between the worker supervisor and its observers

use uuid::Uuid;

/// Unique identifier for one worker run
pub type RunId = Uuid;

/// Which output stream a chunk came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputChannel {
    Stdout,
    Stderr,
}

impl OutputChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputChannel::Stdout => "stdout",
            OutputChannel::Stderr => "stderr",
        }
    }
}

/// One chunk of text read from the worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputEvent {
    pub run_id: RunId,
    pub channel: OutputChannel,
    pub data: String,
}

/// Terminal notification for a run, emitted exactly once
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionEvent {
    pub run_id: RunId,
    /// Exit code, `-1` when the process was terminated by a signal
    pub exit_code: i32,
    /// Terminating signal (unix only)
    pub signal: Option<i32>,
    pub message: String,
}

/// Events published by the supervisor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorEvent {
    /// The worker produced output
    Output(OutputEvent),
    /// The worker run is over
    Completion(CompletionEvent),
}

impl SupervisorEvent {
    pub fn run_id(&self) -> RunId {
        match self {
            SupervisorEvent::Output(output) => output.run_id,
            SupervisorEvent::Completion(completion) => completion.run_id,
        }
    }

    pub fn is_completion(&self) -> bool {
        matches!(self, SupervisorEvent::Completion(_))
    }
}

/// Synchronous answer to a start request. Says nothing about how the run ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartResult {
    pub success: bool,
    pub message: String,
    /// Run whose events follow: the new worker, or the failed spawn attempt.
    /// `None` when the request was rejected outright.
    pub run_id: Option<RunId>,
}

/// Synchronous answer to a stop request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopResult {
    pub success: bool,
    pub message: String,
}

impl StartResult {
    pub fn ok(run_id: RunId, message: impl Into<String>) -> Self {
        Self { success: true, message: message.into(), run_id: Some(run_id) }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self { success: false, message: message.into(), run_id: None }
    }

    /// The spawn itself failed; `run_id` tags its error and completion events
    pub fn spawn_failed(run_id: RunId, message: impl Into<String>) -> Self {
        Self { success: false, message: message.into(), run_id: Some(run_id) }
    }
}

impl StopResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self { success: true, message: message.into() }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self { success: false, message: message.into() }
    }
}
