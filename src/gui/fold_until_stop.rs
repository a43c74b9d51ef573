use std::{io::stdout, sync::mpsc, thread::spawn, time::Duration};

use crate::gui::error::RangingGuiError;

use log::LevelFilter;

use crossterm::{
    event::{self, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};

use ratatui::{
    prelude::*,
    widgets::{block::Title, *},
    Terminal,
};

enum ThreadMessage {
    Stop,
}

/// Turns logging off while the screen belongs to the gui, so log lines from
/// the worker do not land on top of it. The previous level comes back on
/// drop.
struct QuietLogs(LevelFilter);

impl QuietLogs {
    fn new() -> Self {
        let previous = log::max_level();
        log::set_max_level(LevelFilter::Off);
        Self(previous)
    }
}

impl Drop for QuietLogs {
    fn drop(&mut self) {
        log::set_max_level(self.0);
    }
}

/// Runs `f` on a worker thread until it fails or stops itself, or until
/// the user stops it with a key press.
fn run_worker<F, T, E>(init: T, mut f: F, stop_rx: mpsc::Receiver<ThreadMessage>) -> (T, Option<E>)
where
    F: FnMut(&mut T) -> Result<Option<String>, E>,
{
    let mut val = init;
    loop {
        if let Ok(ThreadMessage::Stop) = stop_rx.try_recv() {
            return (val, None);
        }
        match f(&mut val) {
            Ok(Some(_)) => {}
            Ok(None) => return (val, None),
            Err(e) => return (val, Some(e)),
        }
    }
}

/// Generates a gui that runs a function until the user provides input.
///
/// The function can be thought of as a recursive fold over `init`: `f` is
/// called on the state again and again until the user presses a key, `f`
/// returns `Ok(None)`, or `f` fails. Each `Ok(Some(status))` replaces the
/// status line on screen. The final state is handed back together with the
/// error that ended the loop, if any.
pub fn fold_until_stop<F, T, E>(
    title: &str,
    init: T,
    mut f: F,
) -> Result<(T, Option<E>), RangingGuiError>
where
    F: FnMut(&mut T) -> Result<Option<String>, E> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    let _quiet = QuietLogs::new();
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    terminal.clear()?;

    let (stop_tx, stop_rx) = mpsc::channel();
    let (status_tx, status_rx) = mpsc::channel();
    let (res_tx, res_rx) = mpsc::channel();

    let th = spawn(move || {
        let res = run_worker(
            init,
            |val: &mut T| -> Result<Option<String>, E> {
                let status = f(val)?;
                if let Some(s) = &status {
                    // The screen may already be gone, the status is cosmetic
                    let _ = status_tx.send(s.clone());
                }
                Ok(status)
            },
            stop_rx,
        );
        let _ = res_tx.send(res);
    });

    let mut status = String::from("Starting...");
    let res = loop {
        while let Ok(s) = status_rx.try_recv() {
            status = s;
        }
        if let Ok(res) = res_rx.try_recv() {
            break res;
        }

        let title = Title::from(Span::from(format!(" {} ", title)).magenta().bold());
        let text = Paragraph::new(vec![
            Line::from(status.as_str()),
            Line::from(" Press any key to stop ".magenta()),
        ]);
        let block = Block::default()
            .title(title.alignment(Alignment::Center))
            .borders(Borders::ALL);
        terminal.draw(|frame| {
            let area = frame.size();
            frame.render_widget(text.block(block), area);
        })?;
        if event::poll(Duration::from_millis(16))? {
            if let event::Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    // The worker may have finished on its own in the meantime
                    let _ = stop_tx.send(ThreadMessage::Stop);
                    break res_rx.recv()?;
                }
            }
        }
    };

    th.join().map_err(|_| RangingGuiError::JoinError)?;
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    Ok(res)
}
