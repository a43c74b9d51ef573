// Commandline argument parser using clap for the ranging tools

use crate::capture::DEFAULT_DATA_DIR;
use crate::device_session::{NetworkId, RangingProtocol};
use crate::recorder::LogMode;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser, Clone)]
#[clap(version, about)]
pub struct RangingArgs {
    #[command(subcommand, long_about)]
    /// Which task to perform
    pub command: CommandTask,
}

#[derive(Debug, Subcommand, Clone)]
pub enum CommandTask {
    /// Range against a target device and log the results to CSV
    #[command(about)]
    Capture(CaptureCommand),

    /// Print the spectrum of a logged trace
    #[command(about)]
    Analyze(AnalyzeCommand),

    /// Low-pass filter a logged trace with a Butterworth filter, or drop its
    /// weak frequency components
    #[command(about)]
    Filter(FilterCommand),

    /// Write a synthetic trace for testing the analysis tools
    #[command(subcommand)]
    Generate(GenerateCommand),

    /// List the serial ports a device could be attached to
    Ports,
}

/// Every option left out falls back to the config file, then to the
/// built-in defaults.
#[derive(Debug, Args, Clone, Default)]
#[command(version, about)]
pub struct CaptureCommand {
    /// RON file with capture settings
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Network id of the device to range to, e.g. 0x1123
    #[arg(short, long)]
    pub target: Option<NetworkId>,

    /// Network id of a remote device to range from instead of the attached one
    #[arg(short, long)]
    pub relay: Option<NetworkId>,

    /// Ranging protocol
    #[arg(short, long, value_enum)]
    pub protocol: Option<RangingProtocol>,

    /// Serial port of the attached device; asks interactively when omitted
    #[arg(long)]
    pub port: Option<PathBuf>,

    /// How long to capture for, in seconds
    #[arg(short, long)]
    pub duration: Option<f64>,

    /// Capture until a key is pressed instead of for a fixed duration
    #[arg(long, conflicts_with = "duration")]
    pub until_stopped: bool,

    /// Write every poll as it happens (live) or everything at the end (batch)
    #[arg(short, long, value_enum)]
    pub mode: Option<LogMode>,

    /// Directory for measurement files
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Directory for error files
    #[arg(long)]
    pub error_dir: Option<PathBuf>,

    /// Show the distance on the device LEDs, one LED per step of this many mm
    #[arg(long)]
    pub range_step: Option<u32>,

    /// Minimum time between polls, in milliseconds
    #[arg(long)]
    pub interval_ms: Option<u64>,

    /// Use a simulated device instead of real hardware
    #[arg(long)]
    pub simulate: bool,
}

#[derive(Debug, Args, Clone)]
#[command(version, about)]
pub struct AnalyzeCommand {
    /// CSV file to analyze
    pub file: PathBuf,

    /// Also write the spectrum to this CSV file
    #[arg(short, long)]
    pub spectrum_out: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
#[command(version, about)]
pub struct FilterCommand {
    /// CSV file to filter
    pub file: PathBuf,

    /// Cutoff frequency in Hz
    #[arg(short, long, required_unless_present = "psd_threshold")]
    pub cutoff: Option<f64>,

    /// Instead of a low-pass, keep only the frequencies whose power is above
    /// this threshold
    #[arg(long, conflicts_with_all = ["cutoff", "order"])]
    pub psd_threshold: Option<f64>,

    /// Filter order, must be even
    #[arg(long, default_value_t = 6)]
    pub order: usize,

    /// Filename for the filtered trace to be written to
    #[arg(short = 'o', long = "out")]
    pub outfile: PathBuf,
}

#[derive(Debug, Subcommand, Clone)]
pub enum GenerateCommand {
    /// A sine wave sampled at 1 kHz
    Sine {
        /// Frequency of the wave in Hz
        #[arg(short, long, default_value_t = 440.0)]
        frequency: f64,

        /// Length of the trace in seconds
        #[arg(short, long, default_value_t = 1.0)]
        duration: f64,

        /// Output file, named after the frequency when omitted
        #[arg(short = 'o', long = "out")]
        outfile: Option<PathBuf>,
    },

    /// A constant distance sampled at a fixed rate
    Static {
        /// Sample rate in Hz
        #[arg(short, long, default_value_t = 62.0)]
        rate: f64,

        /// The constant distance in mm
        #[arg(short, long, default_value_t = 1867)]
        distance: u32,

        /// Length of the trace in seconds
        #[arg(short, long, default_value_t = 10.0)]
        seconds: f64,

        /// Output file, named after the distance when omitted
        #[arg(short = 'o', long = "out")]
        outfile: Option<PathBuf>,
    },
}

/// Arguments of the `monitor` plot viewer.
#[derive(Debug, Parser, Clone)]
#[clap(version, about)]
pub struct MonitorArgs {
    /// Up to two CSV files to plot; the second one is drawn as ground truth.
    /// Pick one interactively when omitted.
    #[clap(num_args = 0..=2)]
    pub files: Vec<PathBuf>,

    /// Where to look for CSV files when picking interactively
    #[arg(long, default_value = DEFAULT_DATA_DIR)]
    pub data_dir: PathBuf,

    /// Overlay a low-pass filtered trace with this cutoff, in Hz
    #[arg(short, long)]
    pub cutoff: Option<f64>,

    /// Order of the overlay filter
    #[arg(long, default_value_t = 6)]
    pub order: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn arguments_are_consistent() {
        RangingArgs::command().debug_assert();
        MonitorArgs::command().debug_assert();
    }

    #[test]
    fn parse_capture() {
        let args = RangingArgs::parse_from([
            "ranging", "capture", "-t", "0x1123", "--protocol", "fast", "-d", "2.5", "--mode",
            "live",
        ]);
        match args.command {
            CommandTask::Capture(cmd) => {
                assert_eq!(cmd.target, Some(NetworkId(0x1123)));
                assert_eq!(cmd.protocol, Some(RangingProtocol::Fast));
                assert_eq!(cmd.duration, Some(2.5));
                assert_eq!(cmd.mode, Some(LogMode::Live));
                assert!(cmd.relay.is_none());
            }
            other => panic!("parsed {:?}", other),
        }
    }

    #[test]
    fn duration_conflicts_with_until_stopped() {
        let res = RangingArgs::try_parse_from([
            "ranging",
            "capture",
            "-d",
            "3",
            "--until-stopped",
        ]);
        assert!(res.is_err());
    }

    #[test]
    fn filter_needs_exactly_one_method() {
        let args = RangingArgs::parse_from(["ranging", "filter", "run.csv", "-c", "5", "-o", "f.csv"]);
        match args.command {
            CommandTask::Filter(cmd) => {
                assert_eq!(cmd.cutoff, Some(5.0));
                assert_eq!(cmd.order, 6);
                assert!(cmd.psd_threshold.is_none());
            }
            other => panic!("parsed {:?}", other),
        }

        let args = RangingArgs::parse_from([
            "ranging",
            "filter",
            "run.csv",
            "--psd-threshold",
            "100",
            "-o",
            "f.csv",
        ]);
        assert!(matches!(
            args.command,
            CommandTask::Filter(FilterCommand {
                psd_threshold: Some(_),
                cutoff: None,
                ..
            })
        ));

        assert!(RangingArgs::try_parse_from(["ranging", "filter", "run.csv", "-o", "f.csv"]).is_err());
        assert!(RangingArgs::try_parse_from([
            "ranging",
            "filter",
            "run.csv",
            "-c",
            "5",
            "--psd-threshold",
            "100",
            "-o",
            "f.csv",
        ])
        .is_err());
    }

    #[test]
    fn parse_generate() {
        let args = RangingArgs::parse_from(["ranging", "generate", "static", "-d", "1500"]);
        match args.command {
            CommandTask::Generate(GenerateCommand::Static { distance, rate, .. }) => {
                assert_eq!(distance, 1500);
                assert_eq!(rate, 62.0);
            }
            other => panic!("parsed {:?}", other),
        }
    }
}
