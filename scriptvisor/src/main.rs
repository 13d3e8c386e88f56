//! scriptvisor - supervisor and terminal console for an external worker script
//!
//! Runs one background worker process at a time, streams its output into a
//! terminal UI and reports how it ended.

// Core modules (config, events, event types, output buffering)
mod core;
// Worker supervision
mod supervisor;
// Application state
mod app;
// Terminal UI rendering
mod ui;

use anyhow::Result;
use clap::Parser;
use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::prelude::*;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use app::App;
use crate::core::{Config, EventHandler, SupervisorEvent};
use supervisor::{Supervisor, Topic};

/// Worker script supervisor
#[derive(Parser, Debug)]
#[command(name = "scriptvisor")]
#[command(version)]
#[command(about = "Run a background worker script and watch its output")]
struct Cli {
    /// Config file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Run the worker once without the console and exit with its exit code
    #[arg(long)]
    headless: bool,

    /// Executable to spawn, overrides the config
    #[arg(long)]
    program: Option<String>,

    /// Script handed to the executable, overrides the configured base arguments
    #[arg(long)]
    script: Option<String>,

    /// Arguments passed to the worker
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.clone())?;
    if let Some(program) = cli.program {
        config.worker.program = program;
    }
    if let Some(script) = cli.script {
        config.worker.base_args = vec![script];
    }
    let args = if cli.args.is_empty() {
        config.worker.default_args.clone()
    } else {
        cli.args
    };

    if cli.headless {
        init_stderr_logging(cli.debug);
        return run_headless(config, args).await;
    }

    if cli.debug {
        init_file_logging()?;
    }

    // Initialize terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let auto_start = config.worker.auto_start;
    let mut app = App::new(config, cli.config, args);
    ui::init(&app.config);

    // Subscribe before the first start so no output is missed
    let event_handler = EventHandler::new(250, app.supervisor.subscribe(Topic::All));
    if auto_start {
        app.start_worker();
    }

    let result = run_app(&mut terminal, &mut app, event_handler).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(e) = result {
        eprintln!("Error: {e:?}");
        return Err(e);
    }

    Ok(ExitCode::SUCCESS)
}

async fn run_app<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    mut event_handler: EventHandler,
) -> Result<()> {
    loop {
        terminal.draw(|frame| ui::draw(frame, app))?;

        match event_handler.next().await? {
            core::Event::Tick => app.on_tick(),
            core::Event::Key(key_event) => app.on_key(key_event).await?,
            core::Event::Resize => {}
            core::Event::Supervisor(event) => app.on_supervisor_event(event),
        }

        if app.should_quit {
            // Terminate the worker before leaving
            app.cleanup().await;
            break;
        }
    }

    Ok(())
}

/// Run the worker once, mirroring its streams onto ours
async fn run_headless(config: Config, args: Vec<String>) -> Result<ExitCode> {
    let supervisor = Supervisor::new(config.worker);
    let code = mirror_run(&supervisor, args, &mut io::stdout(), &mut io::stderr()).await?;
    Ok(exit_code(code))
}

/// Start one run and copy its output into `out` and `err` until it completes.
/// Returns the run's exit code, or 1 when the start was rejected.
async fn mirror_run(
    supervisor: &Supervisor,
    args: Vec<String>,
    out: &mut impl Write,
    err: &mut impl Write,
) -> Result<i32> {
    let mut stdout = supervisor.subscribe_stdout();
    let mut stderr = supervisor.subscribe_stderr();
    let mut done = supervisor.subscribe_completion();

    let started = supervisor.start(args);
    info!(success = started.success, "{}", started.message);
    if started.run_id.is_none() {
        return Ok(1);
    }

    let mut interrupted = false;
    loop {
        tokio::select! {
            Some(event) = stdout.recv() => forward(event, out),
            Some(event) = stderr.recv() => forward(event, err),
            event = done.recv() => {
                let Some(SupervisorEvent::Completion(completion)) = event else {
                    anyhow::bail!("supervisor event stream closed");
                };
                // Output of the run is queued before its completion
                while let Some(event) = stdout.try_recv() {
                    forward(event, out);
                }
                while let Some(event) = stderr.try_recv() {
                    forward(event, err);
                }
                info!(exit_code = completion.exit_code, "{}", completion.message);
                return Ok(completion.exit_code);
            }
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                interrupted = true;
                warn!("interrupted, terminating worker");
                supervisor.shutdown().await;
            }
        }
    }
}

fn forward(event: SupervisorEvent, to: &mut impl Write) {
    let SupervisorEvent::Output(output) = event else {
        return;
    };
    if let Err(e) = write_flush(to, &output.data) {
        warn!(channel = output.channel.as_str(), "failed to forward worker output: {e}");
    }
}

fn write_flush(out: &mut impl Write, data: &str) -> io::Result<()> {
    out.write_all(data.as_bytes())?;
    out.flush()
}

/// Map a worker exit code onto our own
fn exit_code(code: i32) -> ExitCode {
    match u8::try_from(code) {
        Ok(code) => ExitCode::from(code),
        Err(_) => ExitCode::FAILURE,
    }
}

/// Debug log file for console mode, the terminal itself belongs to the UI
fn init_file_logging() -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("scriptvisor")
        .join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::File::create(log_dir.join("scriptvisor.log"))?;
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(file_layer)
        .with(EnvFilter::new("scriptvisor=debug"))
        .init();

    Ok(())
}

fn init_stderr_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::new("scriptvisor=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("scriptvisor=info"))
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_trailing_args() {
        let cli = Cli::parse_from([
            "scriptvisor",
            "--headless",
            "--script",
            "worker.py",
            "access",
            "--refresh-token-like",
        ]);
        assert!(cli.headless);
        assert_eq!(cli.script.as_deref(), Some("worker.py"));
        assert_eq!(cli.args, vec!["access", "--refresh-token-like"]);
    }

    #[cfg(unix)]
    async fn mirror(worker: crate::core::WorkerConfig) -> (i32, String, String) {
        let supervisor = Supervisor::new(worker);
        let (mut out, mut err) = (Vec::new(), Vec::new());
        let code = mirror_run(&supervisor, Vec::new(), &mut out, &mut err)
            .await
            .unwrap();
        (
            code,
            String::from_utf8(out).unwrap(),
            String::from_utf8(err).unwrap(),
        )
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_headless_mirrors_streams_and_exit_code() {
        let worker = crate::core::WorkerConfig {
            program: "sh".to_string(),
            base_args: vec![
                "-c".to_string(),
                "echo hi; echo oops >&2; echo bye; exit 4".to_string(),
                "worker".to_string(),
            ],
            ..Default::default()
        };

        let (code, out, err) = mirror(worker).await;
        assert_eq!(code, 4);
        assert_eq!(out, "hi\nbye\n");
        assert_eq!(err, "oops\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_headless_missing_executable_exits_with_one() {
        let worker = crate::core::WorkerConfig {
            program: "/nonexistent/scriptvisor-worker".to_string(),
            base_args: Vec::new(),
            ..Default::default()
        };

        let (code, out, err) = mirror(worker).await;
        assert_eq!(code, 1);
        assert!(out.is_empty());
        assert!(err.starts_with("Error spawning worker process"));
    }

    #[test]
    fn test_exit_code_mapping() {
        assert_eq!(exit_code(0), ExitCode::SUCCESS);
        assert_eq!(exit_code(3), ExitCode::from(3));
        assert_eq!(exit_code(-1), ExitCode::FAILURE);
    }
}
