use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use std::{error::Error, io, path::Path, time::Duration};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::{Constraint, Direction, Layout},
    style::{Color, Style, Stylize},
    symbols,
    text::{Line, Span},
    widgets::{Axis, Block, Borders, Chart, Dataset, GraphType, Paragraph, Tabs},
    Frame, Terminal,
};

use pozyx_ranging::gui::{
    list_selector::{csv_files, list_selector},
    plot_view::{bounds, App, Message, Series, Tab, PHASE_AXIS_TITLES},
};

const COLORS: [Color; 4] = [Color::Cyan, Color::Red, Color::Yellow, Color::Green];

pub fn engage_gui(app: App, data_dir: &Path) -> Result<(), Box<dyn Error>> {
    // setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, app, data_dir);

    // restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    res
}

fn run_app<B: Backend>(
    terminal: &mut Terminal<B>,
    mut app: App,
    data_dir: &Path,
) -> Result<(), Box<dyn Error>> {
    while !app.should_quit() {
        terminal.draw(|f| ui(f, &app))?;

        if !event::poll(Duration::from_millis(250))? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }
        let message = match key.code {
            KeyCode::Char('q') | KeyCode::Esc => Message::Quit,
            KeyCode::Right | KeyCode::Tab => Message::NextTab,
            KeyCode::Left | KeyCode::BackTab => Message::PrevTab,
            KeyCode::Char('f') => Message::ToggleFiltered,
            KeyCode::Char('o') => {
                // The selector takes over the screen and leaves it on exit
                let files = csv_files(data_dir).unwrap_or_default();
                let picked = list_selector("Open Trace", files)?;
                enable_raw_mode()?;
                execute!(io::stdout(), EnterAlternateScreen)?;
                terminal.clear()?;
                match picked {
                    Some(path) => Message::FileSelected(path),
                    None => continue,
                }
            }
            _ => continue,
        };
        app.update(message);
    }
    Ok(())
}

fn ui(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(5),
            Constraint::Length(3),
        ])
        .split(f.size());

    let tabs = Tabs::new(Tab::ALL.iter().map(|t| t.title()).collect::<Vec<_>>())
        .block(Block::default().borders(Borders::ALL).title(" Pozyx Traces "))
        .select(app.tab().index())
        .highlight_style(Style::default().fg(Color::Magenta).bold());
    f.render_widget(tabs, chunks[0]);

    let series = app.series();
    if app.tab().shows_phase() {
        let halves = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(chunks[1]);
        let phase = app.phase_series();
        f.render_widget(chart(&series, app.tab().axis_titles()), halves[0]);
        f.render_widget(chart(&phase, PHASE_AXIS_TITLES), halves[1]);
    } else {
        f.render_widget(chart(&series, app.tab().axis_titles()), chunks[1]);
    }

    let help = Line::from(vec![
        Span::from(app.status().to_owned()),
        "  <Left>/<Right>".magenta().bold(),
        " tabs ".into(),
        "<F>".magenta().bold(),
        if app.show_filtered() {
            " hide filtered ".into()
        } else {
            " show filtered ".into()
        },
        "<O>".magenta().bold(),
        " open ".into(),
        "<Q>".magenta().bold(),
        " quit".into(),
    ]);
    f.render_widget(
        Paragraph::new(help).block(Block::default().borders(Borders::ALL)),
        chunks[2],
    );
}

fn chart<'a>(series: &'a [Series], (x_title, y_title): (&'a str, &'a str)) -> Chart<'a> {
    let ([x_lo, x_hi], [y_lo, y_hi]) = bounds(series);
    let datasets: Vec<Dataset> = series
        .iter()
        .zip(COLORS.iter().cycle())
        .map(|(s, &color)| {
            Dataset::default()
                .name(s.name.clone())
                .marker(symbols::Marker::Braille)
                .graph_type(GraphType::Line)
                .style(Style::default().fg(color))
                .data(&s.points)
        })
        .collect();

    let labels = |lo: f64, hi: f64| {
        [lo, (lo + hi) / 2.0, hi]
            .iter()
            .map(|v| Span::from(format!("{:.1}", v)))
            .collect::<Vec<_>>()
    };
    Chart::new(datasets)
        .block(Block::default().borders(Borders::ALL))
        .x_axis(
            Axis::default()
                .title(Span::styled(x_title, Style::default().fg(Color::Red)))
                .style(Style::default().fg(Color::White))
                .bounds([x_lo, x_hi])
                .labels(labels(x_lo, x_hi)),
        )
        .y_axis(
            Axis::default()
                .title(Span::styled(y_title, Style::default().fg(Color::Red)))
                .style(Style::default().fg(Color::White))
                .bounds([y_lo, y_hi])
                .labels(labels(y_lo, y_hi)),
        )
}
