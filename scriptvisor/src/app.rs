//! Application state and main logic

use anyhow::Result;
use chrono::{DateTime, Local};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use std::path::PathBuf;

use crate::core::{CompletionEvent, Config, LogBuffer, OutputChannel, SupervisorEvent};
use crate::supervisor::{RunId, RunStatus, Supervisor, MSG_FINISHED};

/// Current view/screen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Console,
    Help,
}

/// Input mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    /// Editing the worker arguments
    EditArgs,
}

/// One scrollable output pane
#[derive(Debug)]
pub struct Pane {
    pub buffer: LogBuffer,
    /// Lines scrolled back from the bottom, 0 follows new output
    pub scroll_back: usize,
}

impl Pane {
    fn new(capacity: usize) -> Self {
        Self {
            buffer: LogBuffer::new(capacity),
            scroll_back: 0,
        }
    }

    fn push_chunk(&mut self, chunk: &str, follow: bool) {
        let before = self.buffer.len();
        self.buffer.push_chunk(chunk);
        self.keep_position(before, follow);
    }

    fn push_line(&mut self, line: &str, follow: bool) {
        let before = self.buffer.len();
        self.buffer.push_line(line);
        self.keep_position(before, follow);
    }

    fn keep_position(&mut self, before: usize, follow: bool) {
        if follow {
            self.scroll_back = 0;
        } else {
            self.scroll_back += self.buffer.len().saturating_sub(before);
        }
    }

    fn scroll_up(&mut self, lines: usize) {
        self.scroll_back = (self.scroll_back + lines).min(self.buffer.len());
    }

    fn scroll_down(&mut self, lines: usize) {
        self.scroll_back = self.scroll_back.saturating_sub(lines);
    }

    fn clear(&mut self) {
        self.buffer.clear();
        self.scroll_back = 0;
    }
}

/// Which pane keyboard scrolling applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Stdout,
    Stderr,
}

/// Main application state
pub struct App {
    pub should_quit: bool,
    pub view: View,
    pub input_mode: InputMode,

    // Worker
    pub supervisor: Supervisor,
    pub args: Vec<String>,
    pub run_status: RunStatus,
    pub current_run: Option<RunId>,
    pub started_at: Option<DateTime<Local>>,
    pub ended_at: Option<DateTime<Local>>,
    pub run_count: u32,

    // Output
    pub stdout: Pane,
    pub stderr: Pane,
    pub focus: Focus,
    pub auto_scroll: bool,

    // Input
    pub input_buffer: String,
    pub input_cursor: usize,

    // Status
    pub status_message: Option<String>,
    pub status_timestamp: std::time::Instant,

    // Config
    pub config: Config,
    config_path: Option<PathBuf>,
}

impl App {
    pub fn new(config: Config, config_path: Option<PathBuf>, args: Vec<String>) -> Self {
        let supervisor = Supervisor::new(config.worker.clone());
        let capacity = config.ui.log_buffer_size;

        Self {
            should_quit: false,
            view: View::Console,
            input_mode: InputMode::Normal,

            supervisor,
            args,
            run_status: RunStatus::Pending,
            current_run: None,
            started_at: None,
            ended_at: None,
            run_count: 0,

            stdout: Pane::new(capacity),
            stderr: Pane::new(capacity),
            focus: Focus::Stdout,
            auto_scroll: config.ui.auto_scroll,

            input_buffer: String::new(),
            input_cursor: 0,

            status_message: None,
            status_timestamp: std::time::Instant::now(),

            config,
            config_path,
        }
    }

    /// Handle tick events
    pub fn on_tick(&mut self) {
        if self.status_message.is_some()
            && self.status_timestamp.elapsed() > std::time::Duration::from_secs(5)
        {
            self.status_message = None;
        }
    }

    /// Handle supervisor events
    pub fn on_supervisor_event(&mut self, event: SupervisorEvent) {
        match event {
            SupervisorEvent::Output(output) => {
                if self.current_run != Some(output.run_id) {
                    return;
                }
                let pane = match output.channel {
                    OutputChannel::Stdout => &mut self.stdout,
                    OutputChannel::Stderr => &mut self.stderr,
                };
                pane.push_chunk(&output.data, self.auto_scroll);
            }
            SupervisorEvent::Completion(completion) => self.on_completion(completion),
        }
    }

    fn on_completion(&mut self, completion: CompletionEvent) {
        // A stopped run may finish after a restart
        if self.current_run != Some(completion.run_id) {
            return;
        }

        if completion.exit_code != 0 {
            self.stderr.push_line(
                &format!("Script exited with code: {}", completion.exit_code),
                self.auto_scroll,
            );
        }
        if completion.message != MSG_FINISHED {
            self.stderr.push_line(
                &format!("Final error from supervisor: {}", completion.message),
                self.auto_scroll,
            );
        }

        self.current_run = None;
        self.ended_at = Some(Local::now());
        self.run_status = if completion.message == MSG_FINISHED {
            RunStatus::Exited(completion.exit_code)
        } else {
            RunStatus::Failed(completion.message)
        };
        self.set_status(format!("Worker {}", self.run_status));
    }

    /// Handle key events
    pub async fn on_key(&mut self, key: KeyEvent) -> Result<()> {
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            self.should_quit = true;
            return Ok(());
        }

        if self.view == View::Help {
            self.view = View::Console;
            return Ok(());
        }

        match self.input_mode {
            InputMode::Normal => self.handle_console_key(key).await?,
            InputMode::EditArgs => self.handle_edit_args_key(key),
        }

        Ok(())
    }

    async fn handle_console_key(&mut self, key: KeyEvent) -> Result<()> {
        match key.code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Char('?') | KeyCode::F(1) => self.view = View::Help,
            KeyCode::Char('s') => self.start_worker(),
            KeyCode::Char('x') => self.stop_worker().await,
            KeyCode::Char('e') => {
                self.input_buffer = self.args.join(" ");
                self.input_cursor = self.input_buffer.len();
                self.input_mode = InputMode::EditArgs;
            }
            KeyCode::Char('w') => self.save_args(),
            KeyCode::Char('c') => {
                self.stdout.clear();
                self.stderr.clear();
            }
            KeyCode::Char('a') => {
                self.auto_scroll = !self.auto_scroll;
                if self.auto_scroll {
                    self.stdout.scroll_back = 0;
                    self.stderr.scroll_back = 0;
                }
                self.set_status(format!(
                    "Auto-scroll {}",
                    if self.auto_scroll { "on" } else { "off" }
                ));
            }
            KeyCode::Char('y') => self.copy_pane(Focus::Stdout),
            KeyCode::Char('Y') => self.copy_pane(Focus::Stderr),
            KeyCode::Tab => {
                self.focus = match self.focus {
                    Focus::Stdout => Focus::Stderr,
                    Focus::Stderr => Focus::Stdout,
                };
            }
            KeyCode::Up | KeyCode::Char('k') => self.focused_pane().scroll_up(1),
            KeyCode::Down | KeyCode::Char('j') => self.focused_pane().scroll_down(1),
            KeyCode::PageUp => self.focused_pane().scroll_up(10),
            KeyCode::PageDown => self.focused_pane().scroll_down(10),
            KeyCode::Home => {
                let pane = self.focused_pane();
                pane.scroll_back = pane.buffer.len();
            }
            KeyCode::End => self.focused_pane().scroll_back = 0,
            _ => {}
        }
        Ok(())
    }

    fn handle_edit_args_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => {
                self.input_mode = InputMode::Normal;
                self.input_buffer.clear();
            }
            KeyCode::Enter => {
                self.args = self
                    .input_buffer
                    .split_whitespace()
                    .map(str::to_string)
                    .collect();
                self.input_mode = InputMode::Normal;
                self.input_buffer.clear();
                self.set_status(format!("{} argument(s) set", self.args.len()));
            }
            KeyCode::Backspace => {
                if let Some((idx, _)) = self.input_buffer[..self.input_cursor].char_indices().last() {
                    self.input_buffer.remove(idx);
                    self.input_cursor = idx;
                }
            }
            KeyCode::Left => {
                if let Some((idx, _)) = self.input_buffer[..self.input_cursor].char_indices().last() {
                    self.input_cursor = idx;
                }
            }
            KeyCode::Right => {
                if let Some(c) = self.input_buffer[self.input_cursor..].chars().next() {
                    self.input_cursor += c.len_utf8();
                }
            }
            KeyCode::Home => self.input_cursor = 0,
            KeyCode::End => self.input_cursor = self.input_buffer.len(),
            KeyCode::Char(c) => {
                self.input_buffer.insert(self.input_cursor, c);
                self.input_cursor += c.len_utf8();
            }
            _ => {}
        }
    }

    fn focused_pane(&mut self) -> &mut Pane {
        match self.focus {
            Focus::Stdout => &mut self.stdout,
            Focus::Stderr => &mut self.stderr,
        }
    }

    /// Start the worker with the current arguments
    pub fn start_worker(&mut self) {
        let result = self.supervisor.start(self.args.clone());

        if result.success {
            self.stdout.clear();
            self.stderr.clear();
            self.current_run = result.run_id;
            self.run_status = RunStatus::Running;
            self.started_at = Some(Local::now());
            self.ended_at = None;
            self.run_count += 1;
        } else if result.run_id.is_some() {
            // Spawn failed; its error and completion are still on the way
            self.current_run = result.run_id;
            self.run_status = RunStatus::Failed(result.message.clone());
        }

        self.set_status(result.message);
    }

    /// Send the termination signal to the worker
    pub async fn stop_worker(&mut self) {
        let result = self.supervisor.stop().await;
        if result.success && self.current_run.is_some() {
            self.run_status = RunStatus::Stopping;
        }
        self.set_status(result.message);
    }

    /// Persist the current arguments as the default ones
    fn save_args(&mut self) {
        self.config.worker.default_args = self.args.clone();
        match self.config.save(self.config_path.clone()) {
            Ok(()) => self.set_status("Arguments saved to config".to_string()),
            Err(e) => self.set_status(format!("Failed to save config: {}", e)),
        }
    }

    fn copy_pane(&mut self, which: Focus) {
        let (name, pane) = match which {
            Focus::Stdout => ("stdout", &self.stdout),
            Focus::Stderr => ("stderr", &self.stderr),
        };
        if pane.buffer.is_empty() {
            self.set_status(format!("Nothing to copy from {}", name));
            return;
        }
        let text = if self.config.ui.show_timestamps {
            pane.buffer.export()
        } else {
            pane.buffer.text()
        };

        match copy_to_clipboard(&text) {
            Ok(()) => self.set_status(format!("Copied {} to clipboard", name)),
            Err(e) => self.set_status(e.to_string()),
        }
    }

    /// Arguments as shown on screen; they usually carry credentials
    pub fn masked_args(&self) -> String {
        if self.args.is_empty() {
            return "(none)".to_string();
        }
        self.args
            .iter()
            .map(|arg| mask(arg))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Runtime of the current or last run
    pub fn runtime(&self) -> Option<String> {
        let started = self.started_at?;
        let until = self.ended_at.unwrap_or_else(Local::now);
        Some(crate::supervisor::format_duration(
            until.signed_duration_since(started),
        ))
    }

    fn set_status(&mut self, message: String) {
        self.status_message = Some(message);
        self.status_timestamp = std::time::Instant::now();
    }

    /// Terminate the worker before quitting
    pub async fn cleanup(&mut self) {
        self.supervisor.shutdown().await;
    }
}

fn mask(arg: &str) -> String {
    let chars: Vec<char> = arg.chars().collect();
    if chars.len() <= 8 {
        "•".repeat(chars.len().max(1))
    } else {
        let head: String = chars[..4].iter().collect();
        format!("{}…", head)
    }
}

/// Copy text to system clipboard using arboard crate
fn copy_to_clipboard(text: &str) -> Result<()> {
    use arboard::Clipboard;

    let mut clipboard =
        Clipboard::new().map_err(|e| anyhow::anyhow!("Failed to access clipboard: {}", e))?;

    clipboard
        .set_text(text.to_string())
        .map_err(|e| anyhow::anyhow!("Failed to copy to clipboard: {}", e))?;

    Ok(())
}
