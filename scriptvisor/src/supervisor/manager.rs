//! Single-slot supervisor for the worker process

use chrono::Local;
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::bus::{EventBus, Subscription, Topic};
use super::decode::Utf8ChunkDecoder;
use super::signal;
use super::types::{format_duration, RunId, TerminateRequest, WorkerHandle, WorkerStatus};
use crate::core::{
    CompletionEvent, OutputChannel, OutputEvent, StartResult, StopResult, SupervisorEvent,
    WorkerConfig,
};

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Always set for the worker so its output is unbuffered UTF-8 text.
/// `worker.env` is applied on top.
const TEXT_IO_ENV: [(&str, &str); 2] = [("PYTHONUNBUFFERED", "1"), ("PYTHONIOENCODING", "utf8")];

pub const MSG_STARTED: &str = "Python script started";
pub const MSG_ALREADY_RUNNING: &str = "Script already running";
pub const MSG_ALREADY_RUNNING_DETAIL: &str =
    "A worker script is already running. Please stop it first.";
pub const MSG_FINISHED: &str = "Script finished.";
pub const MSG_NOT_RUNNING: &str = "No python script is running.";
pub const MSG_SIGNAL_SENT: &str = "Python script termination signal sent.";
pub const MSG_SIGNAL_FAILED: &str = "Failed to send termination signal.";

struct Inner {
    config: WorkerConfig,
    slot: Mutex<Option<WorkerHandle>>,
    bus: Arc<EventBus>,
}

impl Inner {
    fn lock_slot(&self) -> MutexGuard<'_, Option<WorkerHandle>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Empty the slot, but only if it still belongs to `run_id`
    fn release(&self, run_id: RunId) {
        let mut slot = self.lock_slot();
        if slot.as_ref().is_some_and(|handle| handle.run_id == run_id) {
            *slot = None;
        }
    }

    fn publish_output(&self, run_id: RunId, channel: OutputChannel, data: String) {
        self.bus.publish(SupervisorEvent::Output(OutputEvent {
            run_id,
            channel,
            data,
        }));
    }

    fn publish_completion(&self, run_id: RunId, exit_code: i32, signal: Option<i32>, message: String) {
        self.bus.publish(SupervisorEvent::Completion(CompletionEvent {
            run_id,
            exit_code,
            signal,
            message,
        }));
    }
}

/// Owns at most one worker process at a time.
///
/// Cloning gives another handle to the same slot.
#[derive(Clone)]
pub struct Supervisor {
    inner: Arc<Inner>,
}

impl Supervisor {
    /// Create a supervisor that launches workers according to `config`
    pub fn new(config: WorkerConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                slot: Mutex::new(None),
                bus: EventBus::new(),
            }),
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.inner.config
    }

    /// Subscribe to supervisor events
    pub fn subscribe(&self, topic: Topic) -> Subscription {
        self.inner.bus.subscribe(topic)
    }

    pub fn subscribe_stdout(&self) -> Subscription {
        self.subscribe(Topic::Stdout)
    }

    pub fn subscribe_stderr(&self) -> Subscription {
        self.subscribe(Topic::Stderr)
    }

    pub fn subscribe_completion(&self) -> Subscription {
        self.subscribe(Topic::Completion)
    }

    /// Current state of the slot
    pub fn status(&self) -> WorkerStatus {
        match self.inner.lock_slot().as_ref() {
            Some(handle) => WorkerStatus::Running {
                run_id: handle.run_id,
                pid: handle.pid,
            },
            None => WorkerStatus::Idle,
        }
    }

    /// Spawn the worker with `args` appended to the configured command line.
    ///
    /// The result only says whether the spawn call succeeded; the outcome of
    /// the run arrives later as a completion event. Must be called from within
    /// a tokio runtime.
    pub fn start(&self, args: Vec<String>) -> StartResult {
        let mut slot = self.inner.lock_slot();

        if let Some(active) = slot.as_ref() {
            let run_id = active.run_id;
            warn!(%run_id, "start rejected, worker already running");
            // Still holding the slot, so the active run cannot complete first
            self.inner.publish_output(
                run_id,
                OutputChannel::Stderr,
                MSG_ALREADY_RUNNING_DETAIL.to_string(),
            );
            return StartResult::rejected(MSG_ALREADY_RUNNING);
        }

        let run_id = RunId::new_v4();
        let arg_count = args.len();
        let mut command = self.build_command(args);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(err) => {
                drop(slot);
                error!(%run_id, program = %self.inner.config.program, "failed to spawn worker: {err}");
                let detail = format!("Error spawning worker process: {err}");
                // Reported after start returns, like any other run outcome
                let inner = self.inner.clone();
                tokio::spawn(async move {
                    inner.publish_output(run_id, OutputChannel::Stderr, detail.clone());
                    inner.publish_completion(run_id, 1, None, detail);
                });
                return StartResult::spawn_failed(run_id, format!("Failed to start script: {err}"));
            }
        };

        let pid = child.id();
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        *slot = Some(WorkerHandle::new(run_id, pid, control_tx));
        drop(slot);

        info!(
            %run_id,
            ?pid,
            args = arg_count,
            subscribers = self.inner.bus.subscriber_count(),
            "worker started"
        );

        let readers = [
            child
                .stdout
                .take()
                .map(|stdout| self.spawn_reader(run_id, OutputChannel::Stdout, stdout)),
            child
                .stderr
                .take()
                .map(|stderr| self.spawn_reader(run_id, OutputChannel::Stderr, stderr)),
        ];

        tokio::spawn(monitor(
            self.inner.clone(),
            run_id,
            child,
            readers.into_iter().flatten().collect(),
            control_rx,
        ));

        StartResult::ok(run_id, MSG_STARTED)
    }

    /// Send the termination signal to the running worker.
    ///
    /// The slot is cleared right away; the worker's completion event still
    /// arrives once it has actually exited.
    pub async fn stop(&self) -> StopResult {
        let handle = self.inner.lock_slot().take();
        let Some(handle) = handle else {
            debug!("stop requested with no worker running");
            return StopResult::failed(MSG_NOT_RUNNING);
        };

        match handle.terminate().await {
            Ok(()) => {
                let uptime = format_duration(Local::now().signed_duration_since(handle.started_at));
                info!(run_id = %handle.run_id, %uptime, "termination signal sent");
                StopResult::ok(MSG_SIGNAL_SENT)
            }
            Err(err) => {
                warn!(run_id = %handle.run_id, "failed to signal worker: {err}");
                StopResult::failed(MSG_SIGNAL_FAILED)
            }
        }
    }

    /// Best-effort termination for host exit
    pub async fn shutdown(&self) {
        let handle = self.inner.lock_slot().take();
        if let Some(handle) = handle {
            info!(run_id = %handle.run_id, "host exiting, terminating worker");
            if let Err(err) = handle.terminate().await {
                debug!(run_id = %handle.run_id, "shutdown signal not delivered: {err}");
            }
        }
    }

    fn build_command(&self, args: Vec<String>) -> Command {
        let config = &self.inner.config;

        let mut command = Command::new(&config.program);
        command
            .args(&config.base_args)
            .args(config.env_args())
            .args(args)
            .envs(TEXT_IO_ENV)
            .envs(&config.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &config.working_dir {
            command.current_dir(dir);
        }

        command
    }

    fn spawn_reader<R>(&self, run_id: RunId, channel: OutputChannel, mut stream: R) -> JoinHandle<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            let mut decoder = Utf8ChunkDecoder::default();
            let mut buf = vec![0u8; READ_CHUNK_SIZE];

            loop {
                match stream.read(&mut buf).await {
                    Ok(0) => break,
                    Ok(n) => {
                        let text = decoder.push(&buf[..n]);
                        if !text.is_empty() {
                            inner.publish_output(run_id, channel, text);
                        }
                    }
                    Err(err) => {
                        debug!(%run_id, channel = channel.as_str(), "read error: {err}");
                        break;
                    }
                }
            }

            let rest = decoder.finish();
            if !rest.is_empty() {
                inner.publish_output(run_id, channel, rest);
            }
        })
    }
}

/// Owns the child for one run: answers termination requests, waits for the
/// exit, drains the readers and publishes the completion.
async fn monitor(
    inner: Arc<Inner>,
    run_id: RunId,
    mut child: Child,
    readers: Vec<JoinHandle<()>>,
    mut control_rx: mpsc::UnboundedReceiver<TerminateRequest>,
) {
    let status = loop {
        tokio::select! {
            status = child.wait() => break status,
            Some(request) = control_rx.recv() => {
                let _ = request.reply.send(signal::terminate(&mut child));
            }
        }
    };

    // Late termination requests find the worker already gone
    control_rx.close();
    while let Ok(request) = control_rx.try_recv() {
        let _ = request.reply.send(Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "worker has already exited",
        )));
    }

    // All output of the run goes out before its completion
    for reader in readers {
        let _ = reader.await;
    }

    inner.release(run_id);

    match status {
        Ok(status) => {
            let exit_code = status.code().unwrap_or(-1);
            let signal = signal::exit_signal(&status);
            info!(%run_id, exit_code, ?signal, "worker exited");
            inner.publish_completion(run_id, exit_code, signal, MSG_FINISHED.to_string());
        }
        Err(err) => {
            error!(%run_id, "worker failed: {err}");
            let detail = format!("Failed to start script: {err}");
            inner.publish_output(run_id, OutputChannel::Stderr, detail.clone());
            inner.publish_completion(run_id, 1, None, detail);
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(10);

    /// Worker config that runs `script` through `sh -c`
    fn shell(script: &str) -> WorkerConfig {
        WorkerConfig {
            program: "sh".to_string(),
            base_args: vec!["-c".to_string(), script.to_string(), "worker".to_string()],
            ..WorkerConfig::default()
        }
    }

    async fn next(sub: &mut Subscription) -> SupervisorEvent {
        timeout(WAIT, sub.recv())
            .await
            .expect("timed out waiting for event")
            .expect("bus closed")
    }

    /// Collect events until the completion of `run` arrives
    async fn collect_run(sub: &mut Subscription) -> (Vec<OutputEvent>, CompletionEvent) {
        let mut outputs = Vec::new();
        loop {
            match next(sub).await {
                SupervisorEvent::Output(output) => outputs.push(output),
                SupervisorEvent::Completion(done) => return (outputs, done),
            }
        }
    }

    fn joined(outputs: &[OutputEvent], channel: OutputChannel) -> String {
        outputs
            .iter()
            .filter(|o| o.channel == channel)
            .map(|o| o.data.as_str())
            .collect()
    }

    #[tokio::test]
    async fn test_output_arrives_before_completion() {
        let supervisor = Supervisor::new(shell("echo hello"));
        let mut events = supervisor.subscribe(Topic::All);

        let started = supervisor.start(vec!["a".into(), "b".into()]);
        assert!(started.success);
        assert_eq!(started.message, MSG_STARTED);

        let (outputs, done) = collect_run(&mut events).await;
        assert_eq!(joined(&outputs, OutputChannel::Stdout), "hello\n");
        assert_eq!(done.exit_code, 0);
        assert_eq!(done.message, MSG_FINISHED);
        assert_eq!(started.run_id, Some(done.run_id));
        assert!(outputs.iter().all(|o| o.run_id == done.run_id));
    }

    #[tokio::test]
    async fn test_custom_env_keeps_text_io_settings() {
        let yaml = r#"
program: sh
base_args: ["-c", "echo \"[$PYTHONUNBUFFERED][$PYTHONIOENCODING][$EXTRA]\"", worker]
env:
  EXTRA: x
"#;
        let config: WorkerConfig = serde_yaml::from_str(yaml).unwrap();
        let supervisor = Supervisor::new(config);
        let mut events = supervisor.subscribe(Topic::All);

        assert!(supervisor.start(Vec::new()).success);

        let (outputs, _) = collect_run(&mut events).await;
        assert_eq!(joined(&outputs, OutputChannel::Stdout), "[1][utf8][x]\n");
    }

    #[tokio::test]
    async fn test_configured_env_overrides_text_io_settings() {
        let mut config = shell("echo \"$PYTHONIOENCODING\"");
        config
            .env
            .insert("PYTHONIOENCODING".to_string(), "latin-1".to_string());
        let supervisor = Supervisor::new(config);
        let mut events = supervisor.subscribe(Topic::All);

        assert!(supervisor.start(Vec::new()).success);

        let (outputs, _) = collect_run(&mut events).await;
        assert_eq!(joined(&outputs, OutputChannel::Stdout), "latin-1\n");
    }

    #[tokio::test]
    async fn test_args_and_env_reach_worker() {
        let supervisor = Supervisor::new(shell(
            "echo \"$1 $2\"; echo \"$PYTHONUNBUFFERED $PYTHONIOENCODING\" >&2",
        ));
        let mut events = supervisor.subscribe(Topic::All);

        assert!(supervisor.start(vec!["access".into(), "refresh".into()]).success);

        let (outputs, _) = collect_run(&mut events).await;
        assert_eq!(joined(&outputs, OutputChannel::Stdout), "access refresh\n");
        assert_eq!(joined(&outputs, OutputChannel::Stderr), "1 utf8\n");
    }

    #[tokio::test]
    async fn test_stdout_order_preserved() {
        let supervisor = Supervisor::new(shell("for i in 1 2 3 4 5; do echo $i; done"));
        let mut stdout = supervisor.subscribe_stdout();
        let mut done = supervisor.subscribe_completion();

        assert!(supervisor.start(Vec::new()).success);
        next(&mut done).await;

        let text: String = std::iter::from_fn(|| stdout.try_recv())
            .filter_map(|event| match event {
                SupervisorEvent::Output(output) => Some(output.data),
                SupervisorEvent::Completion(_) => None,
            })
            .collect();
        assert_eq!(text, "1\n2\n3\n4\n5\n");
    }

    #[tokio::test]
    async fn test_second_start_is_rejected() {
        let supervisor = Supervisor::new(shell("exec sleep 30"));
        let mut stderr = supervisor.subscribe_stderr();
        let mut done = supervisor.subscribe_completion();

        assert!(supervisor.start(Vec::new()).success);
        let before = supervisor.status();
        let first_run = match before {
            WorkerStatus::Running { run_id, .. } => run_id,
            WorkerStatus::Idle => panic!("worker should be running"),
        };

        let second = supervisor.start(Vec::new());
        assert!(!second.success);
        assert_eq!(second.message, MSG_ALREADY_RUNNING);

        match next(&mut stderr).await {
            SupervisorEvent::Output(output) => {
                assert_eq!(output.data, MSG_ALREADY_RUNNING_DETAIL);
                assert_eq!(output.run_id, first_run);
            }
            other => panic!("unexpected {:?}", other),
        }

        // The original worker is untouched
        assert_eq!(supervisor.status(), before);
        assert!(done.try_recv().is_none());

        assert!(supervisor.stop().await.success);
        match next(&mut done).await {
            SupervisorEvent::Completion(completion) => assert_eq!(completion.run_id, first_run),
            other => panic!("unexpected {:?}", other),
        }

        // Exactly one completion for the run
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(done.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_missing_executable() {
        let supervisor = Supervisor::new(WorkerConfig {
            program: "/nonexistent/scriptvisor-worker".to_string(),
            base_args: Vec::new(),
            ..WorkerConfig::default()
        });
        let mut events = supervisor.subscribe(Topic::All);

        let result = supervisor.start(Vec::new());
        assert!(!result.success);
        assert!(result.message.starts_with("Failed to start script: "));
        assert_eq!(supervisor.status(), WorkerStatus::Idle);

        let (outputs, done) = collect_run(&mut events).await;
        assert_eq!(result.run_id, Some(done.run_id));
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].channel, OutputChannel::Stderr);
        assert_eq!(done.exit_code, 1);
        assert_eq!(done.message, outputs[0].data);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(events.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_spawn_failure_reaches_subscriber_added_after_start() {
        let supervisor = Supervisor::new(WorkerConfig {
            program: "/nonexistent/scriptvisor-worker".to_string(),
            base_args: Vec::new(),
            ..WorkerConfig::default()
        });

        let result = supervisor.start(Vec::new());
        assert!(!result.success);

        let mut done = supervisor.subscribe_completion();
        match next(&mut done).await {
            SupervisorEvent::Completion(completion) => {
                assert_eq!(completion.exit_code, 1);
                assert_eq!(Some(completion.run_id), result.run_id);
            }
            other => panic!("unexpected {:?}", other),
        }

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(done.try_recv().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_conflict_notice_never_follows_completion() {
        for _ in 0..50 {
            let supervisor = Supervisor::new(shell("true"));
            let mut events = supervisor.subscribe(Topic::All);

            let first = supervisor.start(Vec::new());
            assert!(first.success);
            // Races the fast worker's exit; either outcome is fine
            let _ = supervisor.start(Vec::new());

            loop {
                let event = next(&mut events).await;
                if Some(event.run_id()) == first.run_id && event.is_completion() {
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
            while let Some(event) = events.try_recv() {
                assert_ne!(Some(event.run_id()), first.run_id, "after completion: {:?}", event);
            }
            supervisor.shutdown().await;
        }
    }

    #[tokio::test]
    async fn test_exit_code_and_restart() {
        let supervisor = Supervisor::new(shell("exit ${1:-0}"));
        let mut done = supervisor.subscribe_completion();

        assert!(supervisor.start(vec!["3".into()]).success);
        match next(&mut done).await {
            SupervisorEvent::Completion(completion) => {
                assert_eq!(completion.exit_code, 3);
                assert_eq!(completion.message, MSG_FINISHED);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(supervisor.status(), WorkerStatus::Idle);

        // Slot is free again as soon as the completion is observed
        assert!(supervisor.start(vec!["0".into()]).success);
        match next(&mut done).await {
            SupervisorEvent::Completion(completion) => assert_eq!(completion.exit_code, 0),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stop_without_worker() {
        let supervisor = Supervisor::new(shell("true"));
        let mut events = supervisor.subscribe(Topic::All);

        let result = supervisor.stop().await;
        assert!(!result.success);
        assert_eq!(result.message, MSG_NOT_RUNNING);
        assert!(events.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_stop_signals_worker() {
        let supervisor = Supervisor::new(shell("echo ready; exec sleep 30"));
        let mut events = supervisor.subscribe(Topic::All);

        assert!(supervisor.start(Vec::new()).success);
        match next(&mut events).await {
            SupervisorEvent::Output(output) => assert_eq!(output.data, "ready\n"),
            other => panic!("unexpected {:?}", other),
        }

        let result = supervisor.stop().await;
        assert!(result.success);
        assert_eq!(result.message, MSG_SIGNAL_SENT);
        assert_eq!(supervisor.status(), WorkerStatus::Idle);

        let (_, done) = collect_run(&mut events).await;
        assert_eq!(done.exit_code, -1);
        assert_eq!(done.signal, Some(libc::SIGTERM));
    }

    #[tokio::test]
    async fn test_old_run_does_not_clear_new_run() {
        // Ignores SIGTERM for a moment so the old run outlives the stop
        let supervisor = Supervisor::new(shell(
            "if [ \"$1\" = slow ]; then trap 'sleep 0.3; exit 0' TERM; echo armed; sleep 30 >/dev/null 2>&1 & wait; else echo ready; exec sleep 30; fi",
        ));
        let mut events = supervisor.subscribe(Topic::All);

        assert!(supervisor.start(vec!["slow".into()]).success);
        next(&mut events).await;
        assert!(supervisor.stop().await.success);

        assert!(supervisor.start(vec!["fast".into()]).success);
        let new_run = match supervisor.status() {
            WorkerStatus::Running { run_id, .. } => run_id,
            WorkerStatus::Idle => panic!("new worker should be running"),
        };

        // Old run finishes while the new one is still alive
        let old_done = loop {
            if let SupervisorEvent::Completion(done) = next(&mut events).await {
                break done;
            }
        };
        assert_ne!(old_done.run_id, new_run);
        assert!(matches!(
            supervisor.status(),
            WorkerStatus::Running { run_id, .. } if run_id == new_run
        ));

        supervisor.shutdown().await;
        assert_eq!(supervisor.status(), WorkerStatus::Idle);
    }

    #[tokio::test]
    async fn test_unsubscribed_handlers_get_nothing() {
        let supervisor = Supervisor::new(shell("echo hi"));
        let stdout = supervisor.subscribe_stdout();
        let mut done = supervisor.subscribe_completion();
        stdout.unsubscribe();

        assert!(supervisor.start(Vec::new()).success);
        next(&mut done).await;
        assert_eq!(supervisor.inner.bus.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_is_quiet_when_idle() {
        let supervisor = Supervisor::new(shell("true"));
        let mut events = supervisor.subscribe(Topic::All);
        supervisor.shutdown().await;
        assert!(events.try_recv().is_none());
    }
}
