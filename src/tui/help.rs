use crate::about;
use ratatui::{
    layout::Rect,
    style::Color,
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

fn keybind(keys: &'static str, what: &'static str) -> Line<'static> {
    Line::from(vec![
        Span::raw("  "),
        Span::styled(format!("{keys:<12}"), Style::default().fg(Color::Magenta)),
        Span::raw(what),
    ])
}

pub fn draw_help(area: Rect, f: &mut Frame) {
    let p = Paragraph::new(vec![
        Line::from("Keybinds:"),
        keybind("Ctrl-Q", "Quit (waits for a running operation)"),
        keybind("←/→", "Switch tabs"),
        keybind("Tab/↑/↓", "Move focus"),
        keybind("Enter", "Press the focused button"),
        keybind("Ctrl-R", "Run the ROM in the emulator"),
        keybind("Ctrl-E", "Open the project in the editor"),
        keybind("Ctrl-O", "Open the project folder"),
        keybind("Ctrl-T", "Toggle alternate titles"),
        keybind("F1", "Show this help"),
        keybind("F2", "About"),
        keybind("Esc", "Close this popup"),
        Line::from(""),
        Line::from("Fields are remembered between sessions once an operation runs."),
        Line::from("Set the emulator and project editor on the Preferences tab."),
    ])
    .block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(p, area);
}

pub fn draw_about(area: Rect, f: &mut Frame) {
    let lines: Vec<Line> = about::about_lines().into_iter().map(Line::from).collect();
    let p = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("About"));
    f.render_widget(p, area);
}
