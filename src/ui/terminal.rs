use crossterm::{
    event::{self, Event, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
};
use std::{
    io,
    time::{Duration, Instant},
};

use super::app::{App, HeaderStatus};
use crate::metronome::{BeatKind, BeatPattern, PlaybackState};

const FRAME_INTERVAL: Duration = Duration::from_millis(16);

pub struct TerminalUI {
    terminal: Terminal<CrosstermBackend<io::Stdout>>,
    app: App,
    device_name: String,
    last_update: Instant,
}

impl TerminalUI {
    pub fn new(app: App, device_name: &str) -> Result<Self, Box<dyn std::error::Error>> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;

        let backend = CrosstermBackend::new(stdout);
        let terminal = Terminal::new(backend)?;

        Ok(Self {
            terminal,
            app,
            device_name: device_name.to_string(),
            last_update: Instant::now(),
        })
    }

    pub fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        while self.app.is_running() {
            if event::poll(Duration::from_millis(1))?
                && let Event::Key(key) = event::read()?
                && key.kind == KeyEventKind::Press
            {
                self.app.handle_key(key);
            }

            self.app.tick();

            if self.last_update.elapsed() >= FRAME_INTERVAL {
                self.draw()?;
                self.last_update = Instant::now();
            }
        }

        self.app.shutdown();
        Ok(())
    }

    fn draw(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let app = &self.app;
        let device_name = &self.device_name;

        self.terminal.draw(|f| {
            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints([
                    Constraint::Length(3), // Header
                    Constraint::Min(0),    // Beats
                    Constraint::Length(5), // Footer
                ])
                .split(f.area());

            Self::draw_header(f, chunks[0], app, device_name);
            Self::draw_beats(f, chunks[1], &app.pattern(), app.selected(), app.now_playing());
            Self::draw_footer(f, chunks[2], app);
        })?;
        Ok(())
    }

    fn draw_header(f: &mut Frame, area: Rect, app: &App, device_name: &str) {
        let (text, color) = match app.header_status() {
            Some(HeaderStatus::InputPrompt(prompt, current_input)) => {
                (format!("{} {}", prompt, current_input), Color::Yellow)
            }
            Some(HeaderStatus::Success(message)) => (format!("✓ {}", message), Color::Green),
            Some(HeaderStatus::Error(message)) => (format!("✗ {}", message), Color::Red),
            Some(HeaderStatus::Cancelled) => ("✗ Cancelled".to_string(), Color::DarkGray),
            None => (format!("Output: {}", device_name), Color::White),
        };

        let header = Paragraph::new(text)
            .style(Style::default().fg(color).add_modifier(Modifier::BOLD))
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::ALL).title("Beatkeeper"));
        f.render_widget(header, area);
    }

    fn kind_style(kind: BeatKind) -> Style {
        match kind {
            BeatKind::Accented => Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
            BeatKind::Normal => Style::default().fg(Color::White),
            BeatKind::Soft => Style::default().fg(Color::Blue),
            BeatKind::Muted => Style::default().fg(Color::DarkGray),
        }
    }

    /// One row per layout break; the playing beat is shown inverted.
    fn beat_lines(
        pattern: &BeatPattern,
        selected: usize,
        now_playing: Option<usize>,
    ) -> Vec<Line<'static>> {
        let mut lines = Vec::new();
        let mut row = Vec::new();

        for (index, beat) in pattern.iter().enumerate() {
            let mut style = Self::kind_style(beat.kind);
            if now_playing == Some(index) {
                style = style.bg(Color::Yellow).fg(Color::Black);
            }
            let (open, close) = if index == selected { ("[", "]") } else { (" ", " ") };

            row.push(Span::raw(open));
            row.push(Span::styled(
                format!("{:>2} {:<8}", index + 1, beat.kind.label()),
                style,
            ));
            row.push(Span::raw(close));

            if beat.layout_break {
                lines.push(Line::from(std::mem::take(&mut row)));
                lines.push(Line::default());
            }
        }
        if !row.is_empty() {
            lines.push(Line::from(row));
        }
        lines
    }

    fn draw_beats(
        f: &mut Frame,
        area: Rect,
        pattern: &BeatPattern,
        selected: usize,
        now_playing: Option<usize>,
    ) {
        let beats = Paragraph::new(Self::beat_lines(pattern, selected, now_playing))
            .alignment(Alignment::Center)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(format!("Beats ({})", pattern.len())),
            );
        f.render_widget(beats, area);
    }

    fn draw_footer(f: &mut Frame, area: Rect, app: &App) {
        let key_color = Color::Yellow;
        let desc_color = Color::White;
        let sep_color = Color::DarkGray;

        let key_desc = |key: &str, desc: &str| -> Vec<Span> {
            vec![
                Span::styled(
                    key.to_string(),
                    Style::default().fg(key_color).add_modifier(Modifier::BOLD),
                ),
                Span::styled("=".to_string(), Style::default().fg(sep_color)),
                Span::styled(desc.to_string(), Style::default().fg(desc_color)),
            ]
        };
        let separator = || Span::styled(" | ".to_string(), Style::default().fg(sep_color));

        let line = |pairs: &[(&str, &str)]| -> Line {
            let mut spans = Vec::new();
            for (i, &(key, desc)) in pairs.iter().enumerate() {
                if i > 0 {
                    spans.push(separator());
                }
                spans.extend(key_desc(key, desc));
            }
            Line::from(spans)
        };

        let playing = app.playback_state() == PlaybackState::Playing;
        let status_line = Line::from(vec![
            Span::styled(
                format!(" BPM: {} ", app.tempo()),
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                if playing { " ▶ Playing " } else { " ■ Stopped " }.to_string(),
                Style::default()
                    .fg(if playing { Color::Green } else { Color::DarkGray })
                    .add_modifier(Modifier::BOLD),
            ),
        ]);

        let help_text = vec![
            line(&[
                ("Space", "Start/Stop"),
                ("←→", "Select"),
                ("Enter", "Accent"),
                ("L", "Line Break"),
                ("Q", "Quit"),
            ]),
            line(&[
                ("+/-", "Tempo"),
                ("PgUp/PgDn", "Tempo ±10"),
                ("T", "BPM"),
                ("B", "Tap"),
            ]),
            line(&[("]/[", "Add/Remove"), ("N", "Beats"), ("X", "Reset")]),
            status_line,
        ];

        let footer = Paragraph::new(help_text)
            .block(Block::default().borders(Borders::ALL).title("Controls"));
        f.render_widget(footer, area);
    }
}

impl Drop for TerminalUI {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(self.terminal.backend_mut(), LeaveAlternateScreen);
    }
}
