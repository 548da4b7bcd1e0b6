//! # TekScope RS
//!
//! A Rust library for configuring and reading waveforms from Tektronix TDS 3000
//! series oscilloscopes over their RS-232 port.
//!
//! The device speaks a line-oriented command/query protocol: commands are sent
//! as `<NAME> <ARGS>\r` and get no reply, queries are sent as `<NAME>?\r` and
//! get one line back. Curve and hardcopy transfers are unframed binary blobs
//! that end when the link goes quiet.
//!
//! ## Features
//!
//! - **Transaction engine**: [`TekTerminal`] over any [`Transport`], with a
//!   `serialport` backed [`SerialTransport`]
//! - **Declarative settings**: device mnemonics bound to typed get/set filters,
//!   including boolean mappings of device vocabularies such as `RUN` / `STOP`
//! - **Waveform transfer**: 8 and 16 bit curves, preamble parsing and scaling to
//!   physical units
//! - **DataFrame output**: scaled waveforms as `polars` DataFrames
//! - **Hardcopies**: screenshots in any image format the device supports
//!
//! ## Examples
//!
//! ### Connecting and capturing a waveform
//!
//! ```rust,no_run
//! use tekscope_rs::{CurveRequest, PortSettings, TekConnector};
//!
//! let mut scope = TekConnector::connect("/dev/ttyUSB0", &PortSettings::default())?;
//!
//! // Freeze the display, then transfer channel 2
//! scope.set_acquire_state(false)?;
//! let waveform = scope.get_waveform(&CurveRequest::new("CH2"))?;
//!
//! for (time, volts) in waveform.points().take(5) {
//!     println!("{time:e} s: {volts} V");
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ### Settings
//!
//! ```rust,no_run
//! use tekscope_rs::{PortSettings, TekConnector};
//!
//! let mut scope = TekConnector::connect("/dev/ttyUSB0", &PortSettings::default())?;
//!
//! scope.set_setting("ch1_scale", 0.5)?;
//! scope.set_setting("trigger_source", "CH1")?;
//! println!("Record length: {}", scope.get_setting("record_length")?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ### Boolean settings
//!
//! ```rust
//! use tekscope_rs::BooleanSetting;
//! use tekscope_rs::settings::SettingValue;
//!
//! let trigger_auto = BooleanSetting::new(["auto"], ["norm", "normal"]).case_insensitive();
//!
//! assert!(!trigger_auto.decode("NORMAL").unwrap());
//! assert_eq!(trigger_auto.encode(&SettingValue::Bool(true)).unwrap(), "auto");
//! ```

pub mod boolean_setting;
pub mod curve;
pub mod scaling;
pub mod serial_terminal;
pub mod settings;
pub mod tds3k;
pub mod tek_connector;
pub mod waveform_preamble;

#[cfg(test)]
mod mock_transport;

// Re-export the main types for convenience
pub use boolean_setting::BooleanSetting;

pub use curve::{Curve, CurveFrame, CurveRequest, FrameError, SampleWidth};

pub use scaling::{Scaling, Waveform};

pub use serial_terminal::{FormatError, SerialTransport, TekTerminal, TerminalError, Transport};

pub use settings::{SettingDescriptor, SettingError, SettingRegistry, SettingValue};

pub use tds3k::{HardcopyFormat, HardcopyOptions, ScopeError, Tds3k, TriggerState};

pub use tek_connector::{ConnectorError, PortSettings, TekConnector};

pub use waveform_preamble::WaveformPreamble;
