// Basic connection example
//
// Lists the serial ports, connects to a TDS 3000 and prints its identity and
// acquisition state.

use tekscope_rs::{PortSettings, TekConnector};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    println!("TDS 3000 Connection Example");
    println!("===========================\n");

    println!("1. Available serial ports:");
    let ports = TekConnector::available_ports()?;
    if ports.is_empty() {
        println!("No serial ports found. Connect the RS-232 cable and try again.");
        return Ok(());
    }
    for (i, port) in ports.iter().enumerate() {
        println!("  {}. {}", i + 1, port);
    }

    let port = std::env::args().nth(1).unwrap_or_else(|| ports[0].clone());
    println!("\n2. Connecting to {}...", port);
    let mut scope = TekConnector::connect(&port, &PortSettings::default())?;
    println!("Connected to {}", scope.identify()?);

    println!("\n3. Device state:");
    println!("  Acquiring:        {}", scope.acquire_state()?);
    println!("  Single sequence:  {}", scope.acquire_single()?);
    println!("  Auto trigger:     {}", scope.trigger_auto()?);
    println!("  Trigger state:    {}", scope.trigger_state()?.as_str());
    println!("  Horizontal scale: {}", scope.get_setting("horizontal_scale")?);

    scope.close();
    Ok(())
}
