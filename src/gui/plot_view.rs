//! State of the trace viewer. Drawing lives in the `monitor` binary; this
//! module only decides what is on screen, and it only changes through
//! [`App::update`].

use std::path::PathBuf;

use crate::lowpass::ButterworthLowpass;
use crate::spectrum::{DcOffset, Spectrum};
use crate::trace::Trace;

use log::warn;

/// The four views of a trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
    RawData,
    WithDcOffset,
    WithoutDcOffset,
    Psd,
}

impl Tab {
    pub const ALL: [Tab; 4] = [Tab::RawData, Tab::WithDcOffset, Tab::WithoutDcOffset, Tab::Psd];

    pub fn title(self) -> &'static str {
        match self {
            Tab::RawData => "Raw Data",
            Tab::WithDcOffset => "With DC Offset",
            Tab::WithoutDcOffset => "Without DC Offset",
            Tab::Psd => "PSD",
        }
    }

    pub fn index(self) -> usize {
        Tab::ALL.iter().position(|&t| t == self).unwrap_or(0)
    }

    fn next(self) -> Tab {
        Tab::ALL[(self.index() + 1) % Tab::ALL.len()]
    }

    fn prev(self) -> Tab {
        Tab::ALL[(self.index() + Tab::ALL.len() - 1) % Tab::ALL.len()]
    }

    /// Axis titles, x first.
    pub fn axis_titles(self) -> (&'static str, &'static str) {
        match self {
            Tab::RawData => ("Time (ms)", "Distance (mm)"),
            Tab::WithDcOffset | Tab::WithoutDcOffset => ("Frequency (Hz)", "Magnitude"),
            Tab::Psd => ("Frequency (Hz)", "PSD"),
        }
    }

    /// The spectrum tabs draw phase next to magnitude.
    pub fn shows_phase(self) -> bool {
        matches!(self, Tab::WithDcOffset | Tab::WithoutDcOffset)
    }
}

/// Axis titles of the phase chart, x first.
pub const PHASE_AXIS_TITLES: (&str, &str) = ("Frequency (Hz)", "Phase (rad)");

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    FileSelected(PathBuf),
    NextTab,
    PrevTab,
    ToggleFiltered,
    Quit,
}

/// One line on the chart.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub name: String,
    pub points: Vec<(f64, f64)>,
}

/// Everything derived from one loaded trace.
#[derive(Debug, Clone)]
struct Loaded {
    trace: Trace,
    with_dc: Option<Spectrum>,
    without_dc: Option<Spectrum>,
    filtered: Option<Trace>,
}

impl Loaded {
    fn new(trace: Trace, filter: Option<(usize, f64)>) -> (Self, Vec<String>) {
        let mut problems = Vec::new();
        let mut spectrum = |dc| match Spectrum::compute(&trace, dc) {
            Ok(s) => Some(s),
            Err(e) => {
                problems.push(format!("{}: {}", trace.name, e));
                None
            }
        };
        let with_dc = spectrum(DcOffset::Keep);
        let without_dc = spectrum(DcOffset::Remove);

        let filtered = filter.and_then(|(order, cutoff)| {
            match ButterworthLowpass::for_trace(order, cutoff, &trace) {
                Ok(f) => Some(f.apply_to(&trace)),
                Err(e) => {
                    problems.push(format!("{}: {}", trace.name, e));
                    None
                }
            }
        });

        (
            Self {
                trace,
                with_dc,
                without_dc,
                filtered,
            },
            problems,
        )
    }

    fn series(&self, tab: Tab, show_filtered: bool) -> Vec<Series> {
        let name = self.trace.name.clone();
        match tab {
            Tab::RawData => {
                let mut series = vec![Series {
                    name,
                    points: self.trace.points(),
                }];
                if let (true, Some(filtered)) = (show_filtered, &self.filtered) {
                    series.push(Series {
                        name: filtered.name.clone(),
                        points: filtered.points(),
                    });
                }
                series
            }
            Tab::WithDcOffset => self
                .with_dc
                .iter()
                .map(|s| Series {
                    name: name.clone(),
                    points: s.magnitude_points(),
                })
                .collect(),
            Tab::WithoutDcOffset => self
                .without_dc
                .iter()
                .map(|s| Series {
                    name: name.clone(),
                    points: s.magnitude_points(),
                })
                .collect(),
            Tab::Psd => self
                .without_dc
                .iter()
                .map(|s| Series {
                    name: name.clone(),
                    points: s.psd_points(),
                })
                .collect(),
        }
    }

    fn phase_series(&self, tab: Tab) -> Vec<Series> {
        let spectrum = match tab {
            Tab::WithDcOffset => &self.with_dc,
            Tab::WithoutDcOffset => &self.without_dc,
            Tab::RawData | Tab::Psd => return Vec::new(),
        };
        spectrum
            .iter()
            .map(|s| Series {
                name: self.trace.name.clone(),
                points: s.phase_points(),
            })
            .collect()
    }
}

/// The viewer: a measured trace, an optional ground truth trace drawn next
/// to it, and the current tab.
#[derive(Debug, Clone)]
pub struct App {
    data: Option<Loaded>,
    truth: Option<Loaded>,
    filter: Option<(usize, f64)>,
    tab: Tab,
    show_filtered: bool,
    status: String,
    should_quit: bool,
}

impl App {
    /// `filter` is the `(order, cutoff_hz)` of the optional low-pass overlay.
    pub fn new(filter: Option<(usize, f64)>) -> Self {
        Self {
            data: None,
            truth: None,
            filter,
            tab: Tab::RawData,
            show_filtered: filter.is_some(),
            status: String::from("No file loaded"),
            should_quit: false,
        }
    }

    /// Show `trace` as the measured data.
    pub fn load(&mut self, trace: Trace) {
        let (loaded, problems) = Loaded::new(trace, self.filter);
        self.status = self.report(&loaded.trace, problems);
        self.data = Some(loaded);
    }

    /// Draw `trace` next to the measured data as the expected values.
    pub fn load_ground_truth(&mut self, trace: Trace) {
        let (loaded, problems) = Loaded::new(trace, None);
        self.status = self.report(&loaded.trace, problems);
        self.truth = Some(loaded);
    }

    fn report(&self, trace: &Trace, problems: Vec<String>) -> String {
        for p in &problems {
            warn!("{}", p);
        }
        match problems.first() {
            Some(p) => p.clone(),
            None => match trace.sample_rate_hz() {
                Some(rate) => format!("{}: {} samples at {:.1} Hz", trace.name, trace.len(), rate),
                None => format!("{}: {} samples", trace.name, trace.len()),
            },
        }
    }

    pub fn update(&mut self, message: Message) {
        match message {
            Message::FileSelected(path) => match Trace::from_path(&path) {
                Ok(trace) => self.load(trace),
                Err(e) => {
                    warn!("Could not load {}: {}", path.display(), e);
                    self.status = format!("Could not load {}: {}", path.display(), e);
                }
            },
            Message::NextTab => self.tab = self.tab.next(),
            Message::PrevTab => self.tab = self.tab.prev(),
            Message::ToggleFiltered => self.show_filtered = !self.show_filtered,
            Message::Quit => self.should_quit = true,
        }
    }

    pub fn tab(&self) -> Tab {
        self.tab
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    pub fn show_filtered(&self) -> bool {
        self.show_filtered
    }

    /// The lines to draw on the current tab, measured data first.
    pub fn series(&self) -> Vec<Series> {
        self.collect(|loaded, is_data| loaded.series(self.tab, is_data && self.show_filtered))
    }

    /// The phase lines of the current tab, empty unless
    /// [`Tab::shows_phase`].
    pub fn phase_series(&self) -> Vec<Series> {
        self.collect(|loaded, _| loaded.phase_series(self.tab))
    }

    fn collect(&self, lines: impl Fn(&Loaded, bool) -> Vec<Series>) -> Vec<Series> {
        let mut series = Vec::new();
        if let Some(data) = &self.data {
            series.extend(lines(data, true));
        }
        if let Some(truth) = &self.truth {
            series.extend(lines(truth, false).into_iter().map(|mut s| {
                s.name = format!("{} (ground truth)", s.name);
                s
            }));
        }
        series
    }
}

/// The smallest `[x, y]` bounds containing every point, padded so flat lines
/// stay visible.
pub fn bounds(series: &[Series]) -> ([f64; 2], [f64; 2]) {
    let mut x = [f64::INFINITY, f64::NEG_INFINITY];
    let mut y = [f64::INFINITY, f64::NEG_INFINITY];
    for &(px, py) in series.iter().flat_map(|s| s.points.iter()) {
        x = [x[0].min(px), x[1].max(px)];
        y = [y[0].min(py), y[1].max(py)];
    }
    let pad = |[lo, hi]: [f64; 2]| {
        if !lo.is_finite() || !hi.is_finite() {
            [0.0, 1.0]
        } else if hi - lo < f64::EPSILON {
            [lo - 1.0, hi + 1.0]
        } else {
            [lo, hi]
        }
    };
    (pad(x), pad(y))
}
