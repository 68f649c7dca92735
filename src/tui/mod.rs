mod help;
mod state;

use crate::about;
use crate::cli::{build_toolchain, Cli, Settings};
use crate::console::ConsoleSink;
use crate::launch::{self, LaunchError};
use crate::model::{Rejection, TaskEvent};
use crate::orchestrator::{self, InputState, UiCommand, UiContext};
use crate::preferences::keys;
use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyEventKind},
    execute,
    terminal::{
        disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen, SetTitle,
    },
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Gauge, Paragraph, Tabs},
    Terminal,
};
use state::{FormState, Overlay, Tab, UiAction};
use std::{io, time::Duration, time::Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

pub async fn run(args: Cli, settings: Settings) -> Result<()> {
    let (event_tx, event_rx) = mpsc::unbounded_channel::<TaskEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();

    // The TUI owns the terminal, so log records go to the console pane.
    crate::logging::init_logging(
        args.verbose,
        args.quiet,
        Some(ConsoleSink::new(event_tx.clone())),
    );
    let toolchain = build_toolchain(&settings);

    let ctx = UiContext::new(
        settings.preferences,
        toolchain.has_extractor(),
        cmd_tx.clone(),
    );

    // TUI runs in a dedicated thread to keep all blocking I/O out of the Tokio runtime.
    let ui_handle = std::thread::spawn(move || run_threaded(ctx, event_rx, cmd_tx));

    let res = orchestrator::run_controller(toolchain, event_tx, cmd_rx).await;

    let join_res = tokio::task::spawn_blocking(move || ui_handle.join()).await;
    if let Ok(joined) = join_res {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(anyhow::anyhow!("TUI thread panicked")),
        }
    }

    res
}

/// Run the TUI loop on a dedicated thread.
fn run_threaded(
    mut ctx: UiContext,
    mut event_rx: UnboundedReceiver<TaskEvent>,
    cmd_tx: UnboundedSender<UiCommand>,
) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).ok();

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;
    terminal.clear().ok();

    let mut form = FormState::from_preferences(&ctx.preferences);
    let mut title = about::window_title(ctx.preferences.flag(keys::TITLE));
    execute!(io::stdout(), SetTitle(&title)).ok();

    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();
    let mut quit_pending = false;

    let res = loop {
        while let Ok(ev) = event_rx.try_recv() {
            ctx.apply_event(ev);
        }

        // Quit waits for the running operation unless the controller is gone.
        if quit_pending && (!ctx.is_running() || cmd_tx.is_closed()) {
            break Ok(());
        }

        if last_tick.elapsed() >= tick_rate {
            terminal
                .draw(|f| draw(f.area(), f, &ctx, &form, &title))
                .ok();
            last_tick = Instant::now();
        }

        // Poll input with a short timeout to avoid blocking the render loop.
        if !event::poll(Duration::from_millis(10)).unwrap_or(false) {
            continue;
        }
        let Ok(Event::Key(k)) = event::read() else {
            continue;
        };
        if k.kind != KeyEventKind::Press {
            continue;
        }
        match form.handle_key(k, ctx.input()) {
            UiAction::None => {}
            UiAction::Quit => {
                let _ = cmd_tx.send(UiCommand::Quit);
                if !ctx.is_running() {
                    break Ok(());
                }
                quit_pending = true;
            }
            UiAction::Submit(action) => match ctx.submit(action, form.values()) {
                Ok(_) | Err(Rejection::MissingInput(_)) => {}
                Err(e) => ctx.status = format!("{} not started: {e}", action.label()),
            },
            UiAction::RunRom(rom) => {
                let res = launch::run_rom(ctx.preferences.non_empty(keys::EMULATOR), &rom);
                report_launch(&mut ctx, &rom, res);
            }
            UiAction::EditProject(project) => {
                let res = launch::edit_project(ctx.preferences.non_empty(keys::EDITOR), &project);
                report_launch(&mut ctx, &project, res);
            }
            UiAction::OpenFolder(dir) => {
                let res = launch::open_folder(&dir);
                report_launch(&mut ctx, &dir, res);
            }
            UiAction::SavePreferences => {
                for &(key, _) in Tab::Preferences.fields() {
                    ctx.preferences.set(key, form.value(key).trim());
                }
                ctx.status = match ctx.preferences.save() {
                    Ok(()) => "Preferences saved".into(),
                    Err(e) => format!("Could not save preferences: {e:#}"),
                };
            }
            UiAction::ToggleTitles => {
                let on = ctx.preferences.toggle(keys::TITLE);
                if let Err(e) = ctx.preferences.save() {
                    ctx.status = format!("Could not save preferences: {e:#}");
                }
                title = about::window_title(on);
                execute!(io::stdout(), SetTitle(&title)).ok();
            }
        }
    };

    disable_raw_mode().ok();
    let mut stdout = io::stdout();
    execute!(stdout, LeaveAlternateScreen).ok();
    res
}

fn report_launch(ctx: &mut UiContext, target: &str, res: Result<bool, LaunchError>) {
    match res {
        Ok(true) => ctx.status = format!("Opened {}", target.trim()),
        Ok(false) => {}
        Err(e) => ctx.status = e.to_string(),
    }
}

fn draw(area: Rect, f: &mut ratatui::Frame, ctx: &UiContext, form: &FormState, title: &str) {
    let tab = form.tab();
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Length(3),
                Constraint::Length(tab.fields().len() as u16 + 4),
                Constraint::Length(3),
                Constraint::Min(3),
                Constraint::Length(1),
            ]
            .as_ref(),
        )
        .split(area);

    let tabs = Tabs::new(Tab::ALL.iter().map(|t| Line::from(t.title())))
        .select(form.tab)
        .block(Block::default().borders(Borders::ALL).title(title))
        .highlight_style(Style::default().fg(Color::Yellow));
    f.render_widget(tabs, chunks[0]);

    draw_form(chunks[1], f, ctx, form);
    draw_progress(chunks[2], f, ctx);
    draw_console(chunks[3], f, ctx);
    draw_status(chunks[4], f, ctx);

    match form.overlay {
        Overlay::None => {}
        Overlay::Help => {
            let r = centered_rect(64, 19, area);
            f.render_widget(Clear, r);
            help::draw_help(r, f);
        }
        Overlay::About => {
            let r = centered_rect(64, 11, area);
            f.render_widget(Clear, r);
            help::draw_about(r, f);
        }
    }
}

fn draw_form(area: Rect, f: &mut ratatui::Frame, ctx: &UiContext, form: &FormState) {
    let tab = form.tab();
    let enabled = ctx.input() == InputState::Enabled;
    let base = if enabled {
        Style::default()
    } else {
        Style::default().fg(Color::DarkGray)
    };
    let focused = if enabled {
        Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
    } else {
        base
    };

    let label_width = tab.fields().iter().map(|(_, l)| l.len()).max().unwrap_or(0);
    let mut lines = Vec::with_capacity(tab.fields().len() + 2);
    for (i, &(key, label)) in tab.fields().iter().enumerate() {
        let has_focus = form.focus == i;
        let cursor = if has_focus && enabled { "▏" } else { "" };
        lines.push(Line::from(vec![
            Span::styled(
                format!("{label:>label_width$}: "),
                Style::default().fg(Color::Gray),
            ),
            Span::styled(
                format!("{}{cursor}", form.value(key)),
                if has_focus { focused } else { base },
            ),
        ]));
    }
    lines.push(Line::from(""));

    let mut buttons = Vec::new();
    for (i, button) in tab.buttons().iter().enumerate() {
        let has_focus = form.focus == tab.fields().len() + i;
        let style = if has_focus && enabled {
            focused.add_modifier(Modifier::REVERSED)
        } else {
            base
        };
        buttons.push(Span::styled(format!("[ {} ]", button.label()), style));
        buttons.push(Span::raw("  "));
    }
    lines.push(Line::from(buttons));

    let p = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(tab.title()));
    f.render_widget(p, area);
}

fn draw_progress(area: Rect, f: &mut ratatui::Frame, ctx: &UiContext) {
    let progress = ctx.progress();
    let color = if ctx.is_running() {
        Color::Green
    } else {
        Color::DarkGray
    };
    let g = Gauge::default()
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(ctx.active_label().unwrap_or("Progress")),
        )
        .gauge_style(Style::default().fg(color))
        .ratio(progress.ratio())
        .label(format!("{:.0}%", progress.value()));
    f.render_widget(g, area);
}

fn draw_console(area: Rect, f: &mut ratatui::Frame, ctx: &UiContext) {
    // Tail of the buffer that fits inside the borders.
    let height = area.height.saturating_sub(2) as usize;
    let skip = ctx.console.len().saturating_sub(height);
    let lines: Vec<Line> = ctx.console.lines().skip(skip).map(Line::from).collect();
    let p = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Console"));
    f.render_widget(p, area);
}

fn draw_status(area: Rect, f: &mut ratatui::Frame, ctx: &UiContext) {
    let hint = "F1 help  F2 about  Ctrl-Q quit";
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(0), Constraint::Length(hint.len() as u16)].as_ref())
        .split(area);
    f.render_widget(Paragraph::new(ctx.status.as_str()), cols[0]);
    f.render_widget(
        Paragraph::new(Span::styled(hint, Style::default().fg(Color::Gray))),
        cols[1],
    );
}

/// `width` x `height` rect centered in `area`, clipped to it.
fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let w = width.min(area.width);
    let h = height.min(area.height);
    Rect {
        x: area.x + (area.width - w) / 2,
        y: area.y + (area.height - h) / 2,
        width: w,
        height: h,
    }
}
