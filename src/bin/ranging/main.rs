//! Command line front end: capture ranging runs from a Pozyx device and
//! inspect the resulting traces.

use clap::Parser;
use log::{error, info};
use pozyx_ranging::{
    args::{
        AnalyzeCommand, CaptureCommand, CommandTask, FilterCommand, GenerateCommand, RangingArgs,
    },
    capture::CaptureSession,
    config::CaptureConfig,
    device_session::DeviceSession,
    dummy_device::SimulatedDevice,
    gui::{fold_until_stop, list_selector},
    lowpass::{write_filtered, ButterworthLowpass},
    pozyx_serial::PozyxSerial,
    recorder::{Recorder, RecorderError},
    spectrum::{psd_denoise, DcOffset, Spectrum},
    synth,
    trace::Trace,
};
use serial2::SerialPort;
use std::{error::Error, path::PathBuf, time::Duration};

// Example:
// cargo run --bin ranging -- capture
//                            --target    0x1123
//                            --protocol  fast
//                            --duration  10
//                            --mode      live

type Device = Box<dyn DeviceSession + Send>;

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = RangingArgs::parse();

    match args.command {
        CommandTask::Capture(cmd) => capture(cmd),
        CommandTask::Analyze(cmd) => analyze(cmd),
        CommandTask::Filter(cmd) => filter(cmd),
        CommandTask::Generate(cmd) => generate(cmd),
        CommandTask::Ports => ports(),
    }
}

/// The device to capture from, or `None` if the user backed out of picking
/// a port.
fn open_device(config: &CaptureConfig) -> Result<Option<Device>, Box<dyn Error>> {
    if config.simulate {
        info!("Using a simulated device");
        let dev = SimulatedDevice::builder()
            .latency(Duration::from_millis(15))
            .build();
        return Ok(Some(Box::new(dev)));
    }

    let port = match &config.port {
        Some(port) => port.clone(),
        None => match list_selector("Device Selector", SerialPort::available_ports()?)? {
            Some(port) => port,
            None => return Ok(None),
        },
    };
    info!("Opening {}", port.display());
    let dev = PozyxSerial::open(&port)?.with_interrupt_timeout(config.interrupt_timeout());
    Ok(Some(Box::new(dev)))
}

fn status_line(session: &CaptureSession) -> String {
    let last = session
        .measurements()
        .last()
        .map(|m| format!(", last {} mm", m.distance_mm))
        .unwrap_or_default();
    format!(
        " {} measurements, {} errors{} ",
        session.samples_ok(),
        session.samples_err(),
        last
    )
}

fn capture(cmd: CaptureCommand) -> Result<(), Box<dyn Error>> {
    let config = CaptureConfig::resolve(&cmd)?;
    let Some(device) = open_device(&config)? else {
        info!("No device selected");
        return Ok(());
    };

    let session = CaptureSession::new(
        config.target,
        config.relay,
        config.protocol,
        &config.data_dir,
        &config.error_dir,
    );
    let mut recorder = Recorder::new(device, session, config.mode);
    if let Some(step) = config.range_step_mm {
        recorder = recorder.with_distance_leds(step);
    }
    if let Some(interval) = config.poll_interval() {
        recorder = recorder.with_poll_interval(interval);
    }
    recorder.setup()?;

    let recorder = match config.duration()? {
        Some(duration) => {
            recorder.run_for(duration)?;
            recorder
        }
        None => {
            let (recorder, err) = fold_until_stop(
                "Ranging... ",
                recorder,
                |rec: &mut Recorder<Device>| -> Result<_, RecorderError> {
                    rec.step()?;
                    Ok(Some(status_line(rec.session())))
                },
            )?;
            if let Some(e) = err {
                error!("Capture stopped: {}", e);
                return Err(e.into());
            }
            recorder
        }
    };

    let summary = recorder.finish()?;
    println!("{}", summary);
    Ok(())
}

fn analyze(cmd: AnalyzeCommand) -> Result<(), Box<dyn Error>> {
    let trace = Trace::from_path(&cmd.file)?;
    println!("{}: {} samples", trace.name, trace.len());
    if let (Some(interval), Some(rate)) = (trace.mean_interval_ms(), trace.sample_rate_hz()) {
        println!("Mean sample interval: {:.3} ms ({:.2} Hz)", interval, rate);
    }

    for (label, dc) in [
        ("with DC offset", DcOffset::Keep),
        ("without DC offset", DcOffset::Remove),
    ] {
        let spectrum = Spectrum::compute(&trace, dc)?;
        if let Some((frequency, magnitude)) = spectrum.peak() {
            println!(
                "Peak {}: {:.3} Hz (magnitude {:.3})",
                label, frequency, magnitude
            );
        }
        if let (DcOffset::Remove, Some(out)) = (dc, &cmd.spectrum_out) {
            spectrum.to_path(out)?;
            info!("Wrote spectrum to {}", out.display());
        }
    }
    Ok(())
}

fn filter(cmd: FilterCommand) -> Result<(), Box<dyn Error>> {
    let trace = Trace::from_path(&cmd.file)?;
    let (filtered, method) = match cmd.psd_threshold {
        Some(threshold) => (
            psd_denoise(&trace.distances_mm, threshold)?,
            format!("a PSD threshold of {}", threshold),
        ),
        None => {
            let cutoff = cmd.cutoff.ok_or("either --cutoff or --psd-threshold is needed")?;
            let lowpass = ButterworthLowpass::for_trace(cmd.order, cutoff, &trace)?;
            (
                lowpass.apply(&trace.distances_mm),
                format!(
                    "an order {} low-pass at {} Hz",
                    lowpass.order(),
                    lowpass.cutoff_hz()
                ),
            )
        }
    };
    write_filtered(&trace, &filtered, &cmd.outfile)?;
    info!(
        "Filtered {} samples of {} with {} into {}",
        trace.len(),
        trace.name,
        method,
        cmd.outfile.display()
    );
    Ok(())
}

fn generate(cmd: GenerateCommand) -> Result<(), Box<dyn Error>> {
    let (trace, outfile) = match cmd {
        GenerateCommand::Sine {
            frequency,
            duration,
            outfile,
        } => (synth::sine_wave(frequency, duration), outfile),
        GenerateCommand::Static {
            rate,
            distance,
            seconds,
            outfile,
        } => (synth::static_trace(rate, distance, seconds), outfile),
    };
    let path = outfile.unwrap_or_else(|| PathBuf::from(&trace.name));
    synth::write(&trace, &path)?;
    println!("{}", path.display());
    Ok(())
}

fn ports() -> Result<(), Box<dyn Error>> {
    let ports = SerialPort::available_ports()?;
    if ports.is_empty() {
        println!("No serial ports found");
    }
    for port in ports {
        println!("{}", port.display());
    }
    Ok(())
}
