// Screenshot example
//
// Grabs the screen in the requested hardcopy format and saves it to a file.

use std::fs::File;
use std::io::BufWriter;
use tekscope_rs::{HardcopyFormat, HardcopyOptions, PortSettings, TekConnector};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let Some(port) = args.next() else {
        eprintln!("Usage: screenshot <port> [output.bmp]");
        std::process::exit(1);
    };
    let output = args.next().unwrap_or_else(|| "screenshot.bmp".to_string());

    let mut scope = TekConnector::connect(&port, &PortSettings::default())?;

    let format = HardcopyFormat::Rle;
    if !scope.check_img_format(format.as_str())? {
        eprintln!("Device does not support {} hardcopies", format.as_str());
        std::process::exit(1);
    }

    println!("Capturing screen, this takes a while at low baud rates...");
    let options = HardcopyOptions {
        format,
        ..HardcopyOptions::default()
    };
    let writer = BufWriter::new(File::create(&output)?);
    let written = scope.screenshot_to(&options, writer)?;
    println!("Wrote {} bytes to {}", written, output);

    scope.close();
    Ok(())
}
