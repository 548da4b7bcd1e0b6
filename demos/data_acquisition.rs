// Multi-event data acquisition example
//
// Configures channels, trigger and time base, locks the front panel and then
// records a number of single-sequence events, transferring every selected
// channel after each one. The front panel is unlocked again when done, also
// when the run fails.

use clap::Parser;
use std::thread;
use std::time::{Duration, Instant};
use tekscope_rs::{CurveRequest, PortSettings, ScopeError, Tds3k, TekConnector, Transport, TriggerState};

/// How long to wait for a single sequence to complete before transferring anyway.
const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "data_acquisition")]
#[command(version = "0.1")]
#[command(about = "Record triggered events from a TDS 3000 oscilloscope")]
#[command(long_about = "Configure a TDS 3000 over RS-232, lock its front panel and record a number of single-sequence events, transferring the waveform of every selected channel per event.")]
struct Args {
    /// Serial port the oscilloscope is connected to
    #[arg(short, long, default_value = "/dev/ttyUSB0")]
    port: String,

    #[arg(short = 'r', long, default_value_t = 38400, help = "Baud rate configured on the device")]
    baud_rate: u32,

    /// Unlock the front panel, then exit
    #[arg(short, long)]
    unlock: bool,

    /// Keep the current device settings, ignoring the channel, trigger and time base options
    #[arg(short, long)]
    keep: bool,

    #[arg(short = 'n', long, default_value_t = 10, help = "Number of events to record")]
    events: usize,

    /// Channel to record, or 'a' for all channels
    #[arg(short, long, default_value = "a", value_parser = ["a", "1", "2", "3", "4"])]
    wave: String,

    /// Record length in points; not independent of the time base
    #[arg(short = 'l', long, default_value_t = 500, value_parser = clap::value_parser!(i64).range(500..=10_000))]
    record_length: i64,

    /// Trigger channel, '0' for the external trigger input
    #[arg(short = 'c', long, default_value = "1", value_parser = ["0", "1", "2", "3", "4"])]
    trigger_source: String,

    /// Trigger level in volts
    #[arg(short = 't', long, default_value_t = 1.0, allow_negative_numbers = true)]
    trigger_level: f64,

    #[arg(short = 's', long, default_value = "RISE", value_parser = ["RISE", "FALL"])]
    trigger_slope: String,

    /// Vertical scale in volts per division for every recorded channel
    #[arg(long, default_value_t = 0.2)]
    vertical_scale: f64,

    #[arg(long, default_value = "DC", value_parser = ["AC", "DC"])]
    coupling: String,

    /// Input impedance: FIF (50 ohm) or MEG (1 Mohm)
    #[arg(long, default_value = "MEG", value_parser = ["FIF", "MEG"])]
    impedance: String,

    /// Horizontal scale in seconds per division; affects the sample rate
    #[arg(short = 'b', long, default_value_t = 20e-9)]
    horizontal_scale: f64,

    /// Pretrigger amount in percent of the record
    #[arg(long, default_value_t = 20.0)]
    pretrigger: f64,

    /// Enable verbose logging
    #[arg(short, long, help = "Show debug information and detailed logs")]
    verbose: bool,
}

impl Args {
    fn channels(&self) -> Vec<u8> {
        match self.wave.parse::<u8>() {
            Ok(channel) => vec![channel],
            Err(_) => vec![1, 2, 3, 4],
        }
    }

    fn trigger_source(&self) -> String {
        match self.trigger_source.as_str() {
            "0" => "EXT".to_string(),
            channel => format!("CH{channel}"),
        }
    }
}

fn configure<T: Transport>(
    scope: &mut Tds3k<T>,
    args: &Args,
    channels: &[u8],
) -> Result<(), ScopeError> {
    for channel in channels {
        scope.set_setting(&format!("ch{channel}_scale"), args.vertical_scale)?;
        scope.set_setting(&format!("ch{channel}_coupling"), args.coupling.as_str())?;
        scope.set_setting(&format!("ch{channel}_impedance"), args.impedance.as_str())?;
        scope.set_setting(&format!("select_ch{channel}"), true)?;
    }

    scope.set_setting("trigger_level", args.trigger_level)?;
    scope.set_setting("trigger_source", args.trigger_source())?;
    scope.set_setting("trigger_slope", args.trigger_slope.as_str())?;
    scope.set_setting("horizontal_scale", args.horizontal_scale)?;
    scope.set_setting("trigger_position", args.pretrigger)?;
    Ok(())
}

fn wait_for_event<T: Transport>(scope: &mut Tds3k<T>) -> Result<(), ScopeError> {
    let started = Instant::now();
    loop {
        if scope.trigger_state()? == TriggerState::Save {
            return Ok(());
        }
        if started.elapsed() > EVENT_TIMEOUT {
            log::warn!("No trigger within {:?}, transferring anyway", EVENT_TIMEOUT);
            return Ok(());
        }
        thread::sleep(Duration::from_millis(10));
    }
}

fn acquire<T: Transport>(
    scope: &mut Tds3k<T>,
    args: &Args,
    channels: &[u8],
) -> Result<(), ScopeError> {
    scope.set_acquire_single(true)?;

    for event in 1..=args.events {
        scope.set_acquire_state(true)?;
        wait_for_event(scope)?;

        for channel in channels {
            let request = CurveRequest::new(format!("CH{channel}")).with_timing();
            let waveform = scope.get_waveform(&request)?;

            let (min, max) = waveform
                .points()
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), (_, y)| {
                    (lo.min(y), hi.max(y))
                });
            println!(
                "Event {:>4} CH{}: {} points in {:.2?}, {:.3} .. {:.3} {}",
                event,
                channel,
                waveform.curve.len(),
                waveform.curve.transfer_duration.unwrap_or_default(),
                min,
                max,
                waveform.preamble.y_unit()
            );
        }
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if args.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        env_logger::init();
    }

    let settings = PortSettings::default().baud_rate(args.baud_rate);
    let mut scope = TekConnector::connect(&args.port, &settings)?;

    if args.unlock {
        scope.lock_front_panel(false)?;
        println!("Front panel unlocked");
        return Ok(());
    }
    println!("Connected to {}", scope.identify()?);

    let channels = args.channels();
    if !args.keep {
        configure(&mut scope, &args, &channels)?;
    }
    scope.set_setting("record_length", args.record_length)?;

    scope.lock_front_panel(true)?;
    let result = acquire(&mut scope, &args, &channels);
    let unlocked = scope.lock_front_panel(false);
    scope.close();

    result?;
    unlocked?;
    println!("Recorded {} events", args.events);
    Ok(())
}
