// Waveform capture example
//
// Transfers one channel, scales it and writes time/raw/value columns as CSV.

use clap::Parser;
use polars::prelude::{CsvWriter, SerWriter};
use std::fs::File;
use tekscope_rs::{CurveRequest, PortSettings, SampleWidth, TekConnector};

#[derive(Parser)]
#[command(name = "capture_waveform")]
#[command(version = "0.1")]
#[command(about = "Capture a waveform from a TDS 3000 oscilloscope")]
#[command(long_about = "Transfer the curve of one channel over RS-232, scale it to physical units with the waveform preamble and store the result as CSV.")]
struct Args {
    /// Serial port the oscilloscope is connected to
    port: String,

    /// Waveform source, e.g. CH1 or MATH
    #[arg(short, long, default_value = "CH1")]
    source: String,

    #[arg(short, long, default_value_t = 9600, help = "Baud rate configured on the device")]
    baud_rate: u32,

    /// Transfer one byte per point instead of two
    #[arg(long)]
    single_byte: bool,

    /// Stop the acquisition before transferring
    #[arg(long)]
    stop: bool,

    #[arg(short, long, default_value = "waveform.csv", help = "CSV file to write")]
    output: String,

    /// Enable verbose logging
    #[arg(short, long, help = "Show debug information and detailed logs")]
    verbose: bool,
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

    #[cfg(feature = "cpu-profiling")]
    let _profiler = tracy_client::Client::start();

    let settings = PortSettings::default().baud_rate(args.baud_rate);
    let mut scope = TekConnector::connect(&args.port, &settings)?;
    println!("Connected to {}", scope.identify()?);

    if args.stop {
        scope.set_acquire_state(false)?;
    }

    let width = if args.single_byte {
        SampleWidth::Single
    } else {
        SampleWidth::Double
    };
    let request = CurveRequest::new(args.source.as_str())
        .width(width)
        .with_timing();

    let waveform = scope.get_waveform(&request)?;
    let points = waveform.curve.len();
    if let Some(duration) = waveform.curve.transfer_duration {
        println!(
            "Transferred {} points from {} in {:.2?}",
            points, args.source, duration
        );
    }
    println!(
        "Units: {} / {}",
        waveform.preamble.x_unit(),
        waveform.preamble.y_unit()
    );

    let mut df = waveform.to_dataframe()?;
    println!("{}", df.head(Some(5)));

    let mut file = File::create(&args.output)?;
    CsvWriter::new(&mut file).finish(&mut df)?;
    println!("Wrote {} rows to {}", df.height(), args.output);

    scope.close();
    Ok(())
}
