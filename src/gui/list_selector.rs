use std::{
    fs,
    io::stdout,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::gui::error::RangingGuiError;

use crossterm::{
    event::{self, KeyCode, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use ratatui::{
    prelude::*,
    widgets::{
        block::{Position, Title},
        *,
    },
    Terminal,
};

/// Where the cursor goes after a key press.
fn move_cursor(cursor: usize, n: usize, key: KeyCode) -> usize {
    match key {
        KeyCode::Down | KeyCode::Char('j') => (cursor + 1) % n,
        KeyCode::Up | KeyCode::Char('k') => (cursor + n - 1) % n,
        _ => cursor,
    }
}

/// Let the user pick one of `items` from a full screen list. Returns `None`
/// when the user quits, or right away when there is nothing to pick.
pub fn list_selector(
    title: &str,
    mut items: Vec<PathBuf>,
) -> Result<Option<PathBuf>, RangingGuiError> {
    if items.is_empty() {
        return Ok(None);
    }

    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    terminal.clear()?;

    let mut cursor = 0;
    let mut list_state = ListState::default().with_selected(Some(cursor));
    let n_items = items.len();
    let mut selected = None;
    loop {
        let title = Title::from(Span::from(format!(" {} ", title)).magenta().bold());
        let instructions = Title::from(Line::from(vec![
            " Navigate ".into(),
            "<Up>/<Down>".magenta().bold(),
            " Select ".into(),
            "<Enter>".magenta().bold(),
            " Quit ".into(),
            "<Q> ".magenta().bold(),
        ]));
        let block = Block::default()
            .title(title.alignment(Alignment::Center))
            .title(
                instructions
                    .alignment(Alignment::Center)
                    .position(Position::Bottom),
            )
            .borders(Borders::ALL);
        let names = items.iter().map(|p| p.to_string_lossy());
        let list = List::new(names)
            .style(Style::default().fg(Color::White))
            .highlight_symbol(">>")
            .highlight_style(Style::default().fg(Color::Magenta))
            .block(block);
        list_state.select(Some(cursor));
        terminal.draw(|frame| {
            let area = frame.size();
            frame.render_stateful_widget(list, area, &mut list_state);
        })?;
        if event::poll(Duration::from_millis(16))? {
            if let event::Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Enter => {
                            selected = Some(cursor);
                            break;
                        }
                        KeyCode::Char('q') | KeyCode::Esc => break,
                        code => cursor = move_cursor(cursor, n_items, code),
                    }
                }
            }
        }
    }

    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    Ok(selected.map(|i| items.swap_remove(i)))
}

/// The CSV files directly inside `dir`, sorted by name.
pub fn csv_files(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>, RangingGuiError> {
    let dir = dir.as_ref();
    let entries = fs::read_dir(dir).map_err(|error| RangingGuiError::DirectoryUnreadable {
        dir: dir.to_path_buf(),
        error,
    })?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "csv"))
        .collect();
    files.sort();
    Ok(files)
}
