use std::io::Stdout;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::{cursor, execute, terminal::{self, disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen}};
use ratatui::text::Line;
use ratatui::widgets::Paragraph;
use ratatui::{backend::CrosstermBackend, Terminal};
use unicode_width::UnicodeWidthChar;

/// A key press relevant to the dashboard.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Input {
    Char(char),
    /// Ctrl-C; raw mode swallows SIGINT so it arrives as a key.
    Interrupt,
}

/// Character grid the dashboard draws on.
pub trait Display {
    /// Current `(rows, cols)`.
    fn size(&self) -> anyhow::Result<(u16, u16)>;
    fn clear(&mut self);
    /// Writes `text` at `row`, `col`, clipped to the grid width.
    fn write_at(&mut self, row: u16, col: u16, text: &str);
    fn flush(&mut self) -> anyhow::Result<()>;
    /// Returns a pending key press without waiting.
    fn read_key(&mut self) -> anyhow::Result<Option<Input>>;
}

fn char_width(c: char) -> usize {
    UnicodeWidthChar::width(c).unwrap_or(0)
}

/// Longest prefix of `text` that fits in `room` terminal columns, with its width.
fn clip(text: &str, room: usize) -> (String, usize) {
    let mut used = 0;
    let mut out = String::new();
    for c in text.chars() {
        let w = char_width(c);
        if used + w > room {
            break;
        }
        used += w;
        out.push(c);
    }
    (out, used)
}

/// Overwrites `line` from column `col`. Columns are display cells, so a wide
/// character cut by either edge is replaced with spaces.
fn put(line: &mut String, col: usize, text: &str, width: usize) {
    let (text, text_width) = clip(text, width.saturating_sub(col));
    let (mut out, head_width) = clip(line, col);
    out.extend(std::iter::repeat_n(' ', col - head_width));
    out.push_str(&text);

    let end = col + text_width;
    let mut at = 0;
    for c in line.chars() {
        let w = char_width(c);
        if at >= end {
            out.push(c);
        } else if at + w > end {
            out.extend(std::iter::repeat_n(' ', at + w - end));
        }
        at += w;
    }
    *line = out;
}

/// Fullscreen terminal in raw mode on the alternate screen. Dropping it
/// restores the terminal.
pub struct TerminalDisplay {
    terminal: Terminal<CrosstermBackend<Stdout>>,
    lines: Vec<String>,
}

impl TerminalDisplay {
    pub fn new() -> anyhow::Result<Self> {
        Self::setup().inspect_err(|_| restore_terminal())
    }

    fn setup() -> anyhow::Result<Self> {
        enable_raw_mode()?;
        let mut stdout = std::io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        terminal.hide_cursor()?;
        Ok(Self { terminal, lines: Vec::new() })
    }
}

/// Puts the terminal back into cooked mode. Safe to call more than once and
/// from a panic hook.
pub fn restore_terminal() {
    let _ = disable_raw_mode();
    let _ = execute!(std::io::stdout(), LeaveAlternateScreen, cursor::Show);
}

impl Drop for TerminalDisplay {
    fn drop(&mut self) {
        restore_terminal();
    }
}

impl Display for TerminalDisplay {
    fn size(&self) -> anyhow::Result<(u16, u16)> {
        let (cols, rows) = terminal::size()?;
        Ok((rows, cols))
    }

    fn clear(&mut self) {
        self.lines.clear();
    }

    fn write_at(&mut self, row: u16, col: u16, text: &str) {
        let width = terminal::size().map(|(cols, _)| cols as usize).unwrap_or(usize::MAX);
        let row = row as usize;
        if self.lines.len() <= row {
            self.lines.resize(row + 1, String::new());
        }
        put(&mut self.lines[row], col as usize, text, width);
    }

    fn flush(&mut self) -> anyhow::Result<()> {
        let lines: Vec<Line> = self.lines.iter().map(|l| Line::raw(l.clone())).collect();
        let paragraph = Paragraph::new(lines);
        self.terminal.draw(|f| {
            f.render_widget(paragraph.clone(), f.area());
        })?;
        Ok(())
    }

    fn read_key(&mut self) -> anyhow::Result<Option<Input>> {
        while event::poll(Duration::ZERO)? {
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                return Ok(match key.code {
                    KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Some(Input::Interrupt),
                    KeyCode::Char(c) => Some(Input::Char(c)),
                    _ => None,
                });
            }
        }
        Ok(None)
    }
}

/// In-memory grid used to exercise the dashboard without a terminal.
#[cfg(test)]
pub struct GridDisplay {
    pub rows: u16,
    pub cols: u16,
    pub lines: Vec<String>,
    pub keys: std::collections::VecDeque<Input>,
    pub flushes: usize,
}

#[cfg(test)]
impl GridDisplay {
    pub fn new(rows: u16, cols: u16) -> Self {
        Self { rows, cols, lines: Vec::new(), keys: Default::default(), flushes: 0 }
    }

    pub fn press(&mut self, c: char) {
        self.keys.push_back(Input::Char(c));
    }

    pub fn line(&self, row: usize) -> &str {
        self.lines.get(row).map(String::as_str).unwrap_or("")
    }
}

#[cfg(test)]
impl Display for GridDisplay {
    fn size(&self) -> anyhow::Result<(u16, u16)> {
        Ok((self.rows, self.cols))
    }

    fn clear(&mut self) {
        self.lines.clear();
    }

    fn write_at(&mut self, row: u16, col: u16, text: &str) {
        if row >= self.rows {
            return;
        }
        let row = row as usize;
        if self.lines.len() <= row {
            self.lines.resize(row + 1, String::new());
        }
        put(&mut self.lines[row], col as usize, text, self.cols as usize);
    }

    fn flush(&mut self) -> anyhow::Result<()> {
        self.flushes += 1;
        Ok(())
    }

    fn read_key(&mut self) -> anyhow::Result<Option<Input>> {
        Ok(self.keys.pop_front())
    }
}
