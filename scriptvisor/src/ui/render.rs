//! Console rendering with ratatui

use ratatui::{
    layout::{Alignment, Constraint, Layout, Margin, Rect},
    style::{Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState, Wrap},
    Frame,
};

use super::icons::Icon;
use super::theme::{self, Theme};
use crate::app::{App, Focus, InputMode, Pane, View};
use crate::supervisor::WorkerStatus;

const KEY_HINTS: &str =
    "   [s] Start  [x] Stop  [e] Edit args  [w] Save args  [Tab] Pane  [y/Y] Copy  [c] Clear";

pub fn draw(f: &mut Frame, app: &App) {
    let [header, body, input, status] = Layout::vertical([
        Constraint::Length(3),
        Constraint::Min(8),
        Constraint::Length(3),
        Constraint::Length(1),
    ])
    .areas(f.area());

    draw_header(f, app, header);
    match app.view {
        View::Console => draw_console(f, app, body),
        View::Help => draw_help(f, body),
    }
    draw_input(f, app, input);
    draw_status_bar(f, app, status);
}

/// Name, run state and clock
fn draw_header(f: &mut Frame, app: &App, area: Rect) {
    let t = theme::current();
    let [name_area, run_area, clock_area] = Layout::horizontal([
        Constraint::Length(20),
        Constraint::Min(20),
        Constraint::Length(14),
    ])
    .areas(area);

    let name = Paragraph::new(Line::from(vec![
        Span::styled("script", t.heading()),
        Span::styled("visor", t.highlight()),
    ]))
    .block(t.frame(false))
    .alignment(Alignment::Center);
    f.render_widget(name, name_area);

    let status_style = t.run_status(&app.run_status);
    let mut spans = vec![
        Span::styled(format!("{} ", Icon::for_status(&app.run_status)), status_style),
        Span::styled(app.run_status.to_string(), status_style),
    ];
    if let WorkerStatus::Running { pid: Some(pid), .. } = app.supervisor.status() {
        spans.push(Span::styled(format!("  PID {pid}"), t.muted()));
    }
    if let Some(runtime) = app.runtime() {
        spans.push(Span::styled(format!("  {} {runtime}", Icon::Separator), t.muted()));
    }
    spans.push(Span::styled(
        format!("  {} run #{}", Icon::Separator, app.run_count),
        t.dim(),
    ));
    f.render_widget(
        Paragraph::new(Line::from(spans))
            .block(t.frame(false))
            .alignment(Alignment::Center),
        run_area,
    );

    let clock = chrono::Local::now().format("%H:%M:%S");
    f.render_widget(
        Paragraph::new(format!("{} {clock}", Icon::Clock))
            .style(t.plain())
            .block(t.frame(false))
            .alignment(Alignment::Center),
        clock_area,
    );
}

fn draw_console(f: &mut Frame, app: &App, area: Rect) {
    let t = theme::current();
    let [out_area, err_area] =
        Layout::vertical([Constraint::Percentage(60), Constraint::Percentage(40)]).areas(area);

    draw_pane(f, app, &app.stdout, " Output ", t.plain(), app.focus == Focus::Stdout, out_area);
    draw_pane(f, app, &app.stderr, " Errors ", t.err(), app.focus == Focus::Stderr, err_area);
}

fn draw_pane(
    f: &mut Frame,
    app: &App,
    pane: &Pane,
    title: &str,
    line_style: Style,
    focused: bool,
    area: Rect,
) {
    let t = theme::current();

    let visible = area.height.saturating_sub(2) as usize;
    let total = pane.buffer.len();
    let top = total.saturating_sub(visible + pane.scroll_back);

    let lines: Vec<Line> = pane
        .buffer
        .lines()
        .skip(top)
        .take(visible)
        .map(|line| {
            let content = Span::styled(line.content.as_str(), line_style);
            if app.config.ui.show_timestamps {
                let stamp = format!("{} ", line.timestamp.format("%H:%M:%S"));
                Line::from(vec![Span::styled(stamp, t.dim()), content])
            } else {
                Line::from(content)
            }
        })
        .collect();

    let mut title_spans = vec![
        Span::styled(title, t.heading()),
        Span::styled(format!("({total} lines)"), t.muted()),
    ];
    if pane.scroll_back > 0 {
        title_spans.push(Span::styled(
            format!(" {} {} back", Icon::ScrollUp, pane.scroll_back),
            t.warn(),
        ));
    }

    f.render_widget(
        Paragraph::new(lines).block(t.frame(focused).title(Line::from(title_spans))),
        area,
    );

    if total > visible {
        let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
            .begin_symbol(Some(Icon::ScrollUp.glyph()))
            .end_symbol(Some(Icon::ScrollDown.glyph()));
        let mut state = ScrollbarState::new(total.saturating_sub(visible)).position(top);
        f.render_stateful_widget(
            scrollbar,
            area.inner(Margin {
                vertical: 1,
                horizontal: 0,
            }),
            &mut state,
        );
    }
}

/// Masked argument line, or the editor while arguments are being edited
fn draw_input(f: &mut Frame, app: &App, area: Rect) {
    let t = theme::current();

    if app.input_mode == InputMode::EditArgs {
        let editor = Paragraph::new(format!("{} {}", Icon::Prompt, app.input_buffer))
            .style(t.highlight())
            .block(
                t.editing_frame()
                    .title(Span::styled(" Arguments [Enter] Apply  [Esc] Cancel ", t.warn())),
            );
        f.render_widget(editor, area);

        // border, prompt and space come before the text
        let column = app.input_buffer[..app.input_cursor].chars().count() as u16;
        f.set_cursor_position((area.x + 3 + column, area.y + 1));
        return;
    }

    let line = Line::from(vec![
        Span::styled(" Args: ", t.muted()),
        Span::styled(app.masked_args(), t.highlight()),
        Span::styled(KEY_HINTS, t.dim()),
    ]);
    f.render_widget(Paragraph::new(line).block(t.frame(false)), area);
}

fn help_section<'a>(t: &Theme, title: &'a str, rows: &[(&'a str, &'a str)]) -> Vec<Line<'a>> {
    let mut lines = vec![Line::from(Span::styled(title, t.warn()))];
    lines.extend(
        rows.iter()
            .map(|(keys, what)| Line::from(format!("  {keys:<12}{what}"))),
    );
    lines.push(Line::from(""));
    lines
}

fn draw_help(f: &mut Frame, area: Rect) {
    let t = theme::current();

    let mut lines = vec![
        Line::from(""),
        Line::from(Span::styled(format!("{} Keyboard Shortcuts", Icon::Help), t.heading())),
        Line::from(""),
    ];
    lines.extend(help_section(
        t,
        "Worker",
        &[
            ("s", "Start the worker with the current arguments"),
            ("x", "Send the termination signal"),
            ("e", "Edit arguments (space separated)"),
            ("w", "Save arguments as defaults in the config"),
        ],
    ));
    lines.extend(help_section(
        t,
        "Output",
        &[
            ("Tab", "Switch between output and error pane"),
            ("↑/k, ↓/j", "Scroll one line"),
            ("PgUp/PgDn", "Scroll ten lines"),
            ("Home/End", "Jump to top / follow output"),
            ("a", "Toggle auto-scroll"),
            ("y / Y", "Copy output / errors to clipboard"),
            ("c", "Clear both panes"),
        ],
    ));
    lines.extend(help_section(
        t,
        "Global",
        &[
            ("Ctrl+C/q", "Quit (terminates the worker)"),
            ("?/F1", "Show this help"),
        ],
    ));
    lines.push(Line::from(Span::styled("Press any key to close", t.muted())));

    let help = Paragraph::new(Text::from(lines))
        .block(t.frame(true).title(format!(" {} Help ", Icon::Help)))
        .wrap(Wrap { trim: true });
    f.render_widget(help, area);
}

fn draw_status_bar(f: &mut Frame, app: &App, area: Rect) {
    let t = theme::current();
    let separator = || Span::styled("  │  ", t.muted());

    let mut spans = vec![Span::raw(" ")];
    match &app.status_message {
        Some(msg) => {
            spans.push(Span::styled(format!("{} ", Icon::Info), t.warn()));
            spans.push(Span::styled(msg.as_str(), t.warn()));
        }
        None => {
            let worker = app.supervisor.config();
            spans.push(Span::styled(
                format!("{} {}", worker.program, worker.base_args.join(" ")),
                t.muted(),
            ));
        }
    }

    spans.push(separator());
    spans.push(Span::styled("?", t.warn()));
    spans.push(Span::styled(" Help", t.muted()));

    if !app.auto_scroll {
        spans.push(separator());
        spans.push(Span::styled("auto-scroll off", t.warn()));
    }

    if app.run_status.is_active() {
        spans.push(separator());
        spans.push(Span::styled(format!("{} worker active", Icon::Running), t.ok().add_modifier(Modifier::BOLD)));
    }

    f.render_widget(
        Paragraph::new(Line::from(spans)).style(t.status_bar()),
        area,
    );
}
