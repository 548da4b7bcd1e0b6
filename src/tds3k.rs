use crate::boolean_setting::BooleanSetting;
use crate::curve::{Curve, CurveFrame, CurveRequest, FrameError, SampleWidth};
use crate::scaling::Waveform;
use crate::serial_terminal::{FormatError, TekTerminal, TerminalError, Transport};
use crate::settings::{
    self, DocFragment, SettingDescriptor, SettingDevice, SettingError, SettingRegistry,
    SettingValue,
};
use crate::waveform_preamble::WaveformPreamble;
use std::io::Write;
use std::sync::LazyLock;
use std::time::Instant;

/// `*IDN?` replies of supported devices start with this, then three digits and a comma.
const IDENTITY_PREFIX: &str = "TEKTRONIX,TDS 3";

/// Settings that change how many points a curve transfer carries.
const LAYOUT_SETTINGS: [&str; 6] = [
    "DATA:SOURCE",
    "DATA:WIDTH",
    "DATA:ENCDG",
    "DATA:START",
    "DATA:STOP",
    "HORIZONTAL:RECORDLENGTH",
];

const CHANNELS: [u8; 4] = [1, 2, 3, 4];

static SETTINGS: LazyLock<Result<SettingRegistry, SettingError>> = LazyLock::new(build_settings);

#[derive(Debug, thiserror::Error)]
pub enum ScopeError {
    #[error("Terminal error: {0}")]
    Terminal(#[from] TerminalError),

    #[error("Setting error: {0}")]
    Setting(#[from] SettingError),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error("Curve framing error: {0}")]
    Frame(#[from] FrameError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Settings registry is invalid: {0}")]
    Registry(String),

    #[error("Unexpected identification string returned by device: {0:?}")]
    UnrecognizedDevice(String),

    #[error("Number of points is unknown: the device did not report it and none is cached")]
    UnknownPointCount,
}

fn on_off() -> BooleanSetting {
    BooleanSetting::new(["ON", "1"], ["OFF", "0"]).case_insensitive()
}

fn build_settings() -> Result<SettingRegistry, SettingError> {
    let mut registry = SettingRegistry::new()
        .with(
            "headers",
            SettingDescriptor::boolean(settings::implicit_name("header"), on_off())?,
        )?
        .with(
            "acquire_state",
            SettingDescriptor::boolean(
                "ACQUIRE:STATE",
                BooleanSetting::new(["1", "ON", "RUN"], ["0", "OFF", "STOP"]).case_insensitive(),
            )?
            .with_doc(&DocFragment::append(
                "Follows the RUN / STOP button: whether the device is acquiring data.",
            )),
        )?
        .with(
            "acquire_single",
            SettingDescriptor::boolean(
                "ACQUIRE:STOPAFTER",
                BooleanSetting::from_fn(|single| {
                    if single {
                        vec!["SEQUENCE", "SEQ"]
                    } else {
                        vec!["RUNSTOP", "RUNST", "RUN"]
                    }
                })
                .case_insensitive(),
            )?
            .with_doc(&DocFragment::append(
                "Follows the single sequence button. When set, an acquisition stops by itself \
                 after one sequence.",
            )),
        )?
        .with(
            "trigger_auto",
            SettingDescriptor::boolean(
                "TRIGGER:A:MODE",
                BooleanSetting::new(["auto"], ["norm", "normal"]).case_insensitive(),
            )?
            .with_doc(&DocFragment::prepend(
                "Trigger mode: AUTO (untriggered roll) when set, NORMAL otherwise.",
            )),
        )?
        .with(
            "front_panel_lock",
            SettingDescriptor::boolean(
                "LOCK",
                BooleanSetting::new(["ALL"], ["NONE"]).case_insensitive(),
            )?,
        )?
        .with(
            "hardcopy_inksaver",
            SettingDescriptor::boolean("HARDCOPY:INKSAVER", on_off())?,
        )?
        .with("hardcopy_format", SettingDescriptor::new("HARDCOPY:FORMAT"))?
        .with(
            "horizontal_scale",
            SettingDescriptor::float("HORIZONTAL:MAIN:SCALE"),
        )?
        .with(
            "trigger_position",
            SettingDescriptor::float("HORIZONTAL:TRIGGER:POSITION"),
        )?
        .with(
            "record_length",
            SettingDescriptor::integer("HORIZONTAL:RECORDLENGTH"),
        )?
        .with("trigger_level", SettingDescriptor::float("TRIGGER:A:LEVEL"))?
        .with(
            "trigger_source",
            SettingDescriptor::new("TRIGGER:A:EDGE:SOURCE"),
        )?
        .with("trigger_slope", SettingDescriptor::new("TRIGGER:A:EDGE:SLOPE"))?
        .with("data_source", SettingDescriptor::new("DATA:SOURCE"))?
        .with("data_width", SettingDescriptor::integer("DATA:WIDTH"))?
        .with("data_start", SettingDescriptor::integer("DATA:START"))?
        .with("data_stop", SettingDescriptor::integer("DATA:STOP"))?;

    for (accessor, name) in [("x_unit", "WFMPRE:XUNIT"), ("y_unit", "WFMPRE:YUNIT")] {
        registry.register(
            accessor,
            SettingDescriptor::new(name)
                .getter(settings::quoted_text)
                .setter(|value| Ok(format!("\"{value}\""))),
        )?;
    }

    for channel in CHANNELS {
        registry.register(
            &format!("ch{channel}_scale"),
            SettingDescriptor::float(format!("CH{channel}:SCALE")),
        )?;
        registry.register(
            &format!("ch{channel}_coupling"),
            SettingDescriptor::new(format!("CH{channel}:COUPLING")),
        )?;
        registry.register(
            &format!("ch{channel}_impedance"),
            SettingDescriptor::new(format!("CH{channel}:IMPEDANCE")),
        )?;
        registry.register(
            &format!("select_ch{channel}"),
            SettingDescriptor::boolean(format!("SELECT:CH{channel}"), on_off())?,
        )?;
    }

    Ok(registry)
}

/// The process-wide TDS 3000 settings table.
pub fn tds3k_settings() -> Result<&'static SettingRegistry, ScopeError> {
    SETTINGS
        .as_ref()
        .map_err(|e| ScopeError::Registry(e.to_string()))
}

fn is_tds3k_identity(identity: &str) -> bool {
    let Some(rest) = identity.strip_prefix(IDENTITY_PREFIX) else {
        return false;
    };
    let rest = rest.as_bytes();
    rest.len() >= 4 && rest[..3].iter().all(u8::is_ascii_digit) && rest[3] == b','
}

fn parse_point_count(reply: &str) -> Result<usize, FormatError> {
    let invalid = || FormatError::InvalidNumber(reply.to_string());
    match settings::integer(reply) {
        Ok(SettingValue::Int(count)) => usize::try_from(count).map_err(|_| invalid()),
        _ => Err(invalid()),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerState {
    /// Acquiring even without a trigger
    Auto,
    /// Acquiring pretrigger information, triggers are ignored
    Armed,
    /// Pretrigger information acquired, waiting for a trigger
    Ready,
    /// Acquisition stopped or all channels off
    Save,
    /// Triggered, acquiring posttrigger information
    Trigger,
    Other(String),
}

impl TriggerState {
    pub fn parse(reply: &str) -> Self {
        let reply = reply.trim();
        match reply.to_lowercase().as_str() {
            "auto" => Self::Auto,
            "armed" => Self::Armed,
            "ready" => Self::Ready,
            "save" | "sav" => Self::Save,
            "trigger" | "trig" => Self::Trigger,
            _ => Self::Other(reply.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Auto => "auto",
            Self::Armed => "armed",
            Self::Ready => "ready",
            Self::Save => "save",
            Self::Trigger => "trigger",
            Self::Other(reply) => reply,
        }
    }
}

/// Image formats for `HARDCOPY:FORMAT`. Individual devices support a subset;
/// see [`Tds3k::check_img_format`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HardcopyFormat {
    Tds3Prt,
    Bmp,
    BmpColor,
    Deskjet,
    DeskjetColor,
    EpsColor,
    EpsMono,
    Epson,
    Interleaf,
    Laserjet,
    Pcx,
    PcxColor,
    /// Run-length encoded color Windows bitmap; among the fastest to transfer
    #[default]
    Rle,
    Thinkjet,
    Tiff,
    Dpu3445,
    Bjc80,
    Png,
}

impl HardcopyFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tds3Prt => "TDS3PRT",
            Self::Bmp => "BMP",
            Self::BmpColor => "BMPColor",
            Self::Deskjet => "DESKJET",
            Self::DeskjetColor => "DESKJETC",
            Self::EpsColor => "EPSColor",
            Self::EpsMono => "EPSMono",
            Self::Epson => "EPSON",
            Self::Interleaf => "INTERLEAF",
            Self::Laserjet => "LASERJET",
            Self::Pcx => "PCX",
            Self::PcxColor => "PCXcolor",
            Self::Rle => "RLE",
            Self::Thinkjet => "THINKJET",
            Self::Tiff => "TIFF",
            Self::Dpu3445 => "DPU3445",
            Self::Bjc80 => "BJC80",
            Self::Png => "PNG",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HardcopyOptions {
    pub format: HardcopyFormat,
    /// White graticule background
    pub inksaver: bool,
    pub landscape: bool,
}

impl Default for HardcopyOptions {
    fn default() -> Self {
        Self {
            format: HardcopyFormat::default(),
            inksaver: true,
            landscape: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct TransferLayout {
    source: String,
    width: SampleWidth,
    range: Option<(u32, u32)>,
}

impl From<&CurveRequest> for TransferLayout {
    fn from(request: &CurveRequest) -> Self {
        Self {
            source: request.source.clone(),
            width: request.width,
            range: request.range,
        }
    }
}

/// A TDS 3000 series oscilloscope.
///
/// Waveform transfers change `DATA:*` and `WFMPRE:*` settings on the device,
/// and those persist across calls.
#[derive(Debug)]
pub struct Tds3k<T> {
    terminal: TekTerminal<T>,
    point_count: Option<usize>,
    layout: Option<TransferLayout>,
}

impl<T: Transport> Tds3k<T> {
    pub fn new(terminal: TekTerminal<T>) -> Self {
        Self {
            terminal,
            point_count: None,
            layout: None,
        }
    }

    pub fn from_transport(transport: T) -> Self {
        Self::new(TekTerminal::new(transport))
    }

    /// Raw command access.
    pub fn terminal(&mut self) -> &mut TekTerminal<T> {
        &mut self.terminal
    }

    pub fn into_transport(self) -> T {
        self.terminal.into_inner()
    }

    /// Release the device. The transport is closed when dropped.
    pub fn close(self) {
        log::debug!("Closing connection");
    }

    pub fn settings() -> Result<&'static SettingRegistry, ScopeError> {
        tds3k_settings()
    }

    pub fn get_setting(&mut self, key: &str) -> Result<SettingValue, ScopeError> {
        Ok(tds3k_settings()?.get_setting(self, key)?)
    }

    pub fn set_setting(
        &mut self,
        key: &str,
        value: impl Into<SettingValue>,
    ) -> Result<(), ScopeError> {
        Ok(tds3k_settings()?.set_setting(self, key, &value.into())?)
    }

    /// Query `key` when `value` is `None`, configure it otherwise.
    pub fn access_setting(
        &mut self,
        key: &str,
        value: Option<SettingValue>,
    ) -> Result<Option<SettingValue>, ScopeError> {
        Ok(tds3k_settings()?.access(self, key, value.as_ref())?)
    }

    fn bool_setting(&mut self, key: &str) -> Result<bool, ScopeError> {
        let value = self.get_setting(key)?;
        value
            .as_bool()
            .ok_or_else(|| SettingError::UnrecognizedValue(value.to_string()).into())
    }

    pub fn acquire_state(&mut self) -> Result<bool, ScopeError> {
        self.bool_setting("acquire_state")
    }

    pub fn set_acquire_state(&mut self, running: bool) -> Result<(), ScopeError> {
        self.set_setting("acquire_state", running)
    }

    pub fn acquire_single(&mut self) -> Result<bool, ScopeError> {
        self.bool_setting("acquire_single")
    }

    pub fn set_acquire_single(&mut self, single: bool) -> Result<(), ScopeError> {
        self.set_setting("acquire_single", single)
    }

    pub fn trigger_auto(&mut self) -> Result<bool, ScopeError> {
        self.bool_setting("trigger_auto")
    }

    pub fn set_trigger_auto(&mut self, auto: bool) -> Result<(), ScopeError> {
        self.set_setting("trigger_auto", auto)
    }

    pub fn front_panel_locked(&mut self) -> Result<bool, ScopeError> {
        self.bool_setting("front_panel_lock")
    }

    pub fn lock_front_panel(&mut self, locked: bool) -> Result<(), ScopeError> {
        self.set_setting("front_panel_lock", locked)
    }

    pub fn headers_off(&mut self) -> Result<(), ScopeError> {
        Ok(self.terminal.headers_off()?)
    }

    pub fn headers_on(&mut self) -> Result<(), ScopeError> {
        Ok(self.terminal.headers_on()?)
    }

    /// `*IDN?`: model, options, application modules and firmware version.
    pub fn identify(&mut self) -> Result<String, ScopeError> {
        Ok(self.terminal.send_query("*IDN")?)
    }

    /// Whether the device identifies itself as a TDS 3000 series model.
    pub fn sanity_check(&mut self) -> Result<bool, ScopeError> {
        let identity = self.identify()?;
        Ok(is_tds3k_identity(&identity))
    }

    pub fn force_sanity(&mut self) -> Result<(), ScopeError> {
        let identity = self.identify()?;
        if !is_tds3k_identity(&identity) {
            return Err(ScopeError::UnrecognizedDevice(identity));
        }
        log::debug!("Connected to {}", identity);
        Ok(())
    }

    /// Force a trigger. Only has an effect in the READY state.
    pub fn trigger(&mut self) -> Result<(), ScopeError> {
        Ok(self.terminal.send_command("TRIGGER", &["FORCE"])?)
    }

    pub fn trigger_state(&mut self) -> Result<TriggerState, ScopeError> {
        let reply = self.terminal.send_query("TRIGGER:STATE")?;
        Ok(TriggerState::parse(&reply))
    }

    /// How the next waveform transfer will be encoded, given the current
    /// `DATA:*` settings.
    pub fn waveform_preamble(&mut self) -> Result<WaveformPreamble, ScopeError> {
        let reply = self.terminal.send_query("WFMPRE")?;
        Ok(WaveformPreamble::parse(&reply)?)
    }

    pub fn x_units(&mut self) -> Result<String, ScopeError> {
        Ok(self.terminal.query_quoted_string("WFMPRE:XUNIT")?)
    }

    pub fn y_units(&mut self) -> Result<String, ScopeError> {
        Ok(self.terminal.query_quoted_string("WFMPRE:YUNIT")?)
    }

    /// Number of points in the next transfer.
    ///
    /// A timed out or empty reply falls back to the last count this handle saw.
    pub fn num_points(&mut self) -> Result<usize, ScopeError> {
        match self.terminal.send_query("WFMPRE:NR_PT") {
            Ok(reply) if !reply.is_empty() => {
                let count = parse_point_count(&reply)?;
                self.point_count = Some(count);
                Ok(count)
            }
            Ok(_) | Err(TerminalError::Timeout { .. }) => {
                log::warn!(
                    "No point count reported, falling back to cached {:?}",
                    self.point_count
                );
                self.point_count.ok_or(ScopeError::UnknownPointCount)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn cached_point_count(&self) -> Option<usize> {
        self.point_count
    }

    fn configure_transfer(&mut self, request: &CurveRequest) -> Result<(), ScopeError> {
        let layout = TransferLayout::from(request);
        if matches!(&self.layout, Some(previous) if *previous != layout)
            && self.point_count.take().is_some()
        {
            log::debug!("Transfer layout changed, dropped cached point count");
        }

        self.terminal.headers_off()?;
        self.terminal.send_command("DATA:SOURCE", &[request.source.as_str()])?;
        self.terminal
            .send_command("DATA:WIDTH", &[request.width.as_str()])?;
        self.terminal.send_command("DATA:ENCDG", &["RPBinary"])?;
        self.terminal.send_command("WFMPRE:PT_FMT", &["Y"])?;
        if let Some((start, stop)) = request.range {
            self.terminal
                .send_command("DATA:START", &[start.to_string().as_str()])?;
            self.terminal.send_command("DATA:STOP", &[stop.to_string().as_str()])?;
        }

        self.layout = Some(layout);
        Ok(())
    }

    /// Transfer the raw samples of `request.source`.
    ///
    /// Blocks until the device starts sending; the transfer ends at the first
    /// read timeout after that.
    pub fn get_curve(&mut self, request: &CurveRequest) -> Result<Curve, ScopeError> {
        let _span = tracing::debug_span!("curve_transfer", source = %request.source).entered();

        self.configure_transfer(request)?;
        let point_count = self.num_points()?;
        log::debug!(
            "Requesting {} points of {} byte(s) from {}",
            point_count,
            request.width.bytes(),
            request.source
        );

        let started = Instant::now();
        self.terminal.send_command("CURVE?", &[])?;
        let data = self.terminal.get_response()?;
        let elapsed = started.elapsed();
        log::debug!("Received {} bytes in {:?}", data.len(), elapsed);

        let frame = CurveFrame::decode(&data, request.width, point_count)?;
        if request.verify_block_header {
            frame.verify_block_header()?;
        }
        Ok(frame.into_curve(
            request.include_preamble,
            request.include_timing.then_some(elapsed),
        ))
    }

    /// Transfer a curve, then read the preamble needed to scale it.
    pub fn get_waveform(&mut self, request: &CurveRequest) -> Result<Waveform, ScopeError> {
        let curve = self.get_curve(request)?;
        let preamble = self.waveform_preamble()?;
        Ok(Waveform::new(curve, preamble))
    }

    /// Grab a screenshot in the device's hardcopy format.
    pub fn screenshot(&mut self, options: &HardcopyOptions) -> Result<Vec<u8>, ScopeError> {
        let _span = tracing::debug_span!("hardcopy", format = options.format.as_str()).entered();

        self.set_setting("hardcopy_format", options.format.as_str())?;
        let layout = if options.landscape {
            "LANDSCAPE"
        } else {
            "PORTRAIT"
        };
        self.terminal.send_command("HARDCOPY:LAYOUT", &[layout])?;
        self.set_setting("hardcopy_inksaver", options.inksaver)?;
        self.terminal.send_command("HARDCOPY:PORT", &["RS232"])?;
        self.terminal.send_command("HARDCOPY", &["START"])?;

        let data = self.terminal.get_response()?;
        log::debug!("Received {} bytes of hardcopy data", data.len());
        Ok(data)
    }

    /// Like [`screenshot`](Self::screenshot), writing the image to `writer`.
    /// Returns the number of bytes written.
    pub fn screenshot_to<W: Write>(
        &mut self,
        options: &HardcopyOptions,
        mut writer: W,
    ) -> Result<usize, ScopeError> {
        let data = self.screenshot(options)?;
        writer.write_all(&data)?;
        Ok(data.len())
    }

    /// Whether the device accepts `format` as its hardcopy format. The previous
    /// format is restored afterwards.
    ///
    /// The device abbreviates format names in replies, so `format` counts as
    /// accepted when it starts with the reply. A rejected format that extends
    /// the current one is reported as accepted: `BMPColor` while the device
    /// stays at `BMP` yields `true`.
    pub fn check_img_format(&mut self, format: &str) -> Result<bool, ScopeError> {
        let original = self.terminal.send_query("HARDCOPY:FORMAT")?;
        self.terminal.send_command("HARDCOPY:FORMAT", &[format])?;
        let selected = self.terminal.send_query("HARDCOPY:FORMAT")?;
        self.terminal
            .send_command("HARDCOPY:FORMAT", &[original.as_str()])?;

        Ok(!selected.is_empty() && format.to_lowercase().starts_with(&selected.to_lowercase()))
    }
}

impl<T: Transport> SettingDevice for Tds3k<T> {
    fn configure_setting(&mut self, name: &str, raw: &str) -> Result<(), TerminalError> {
        if LAYOUT_SETTINGS.iter().any(|m| m.eq_ignore_ascii_case(name))
            && self.point_count.take().is_some()
        {
            log::debug!("{} changed, dropped cached point count", name);
        }
        self.terminal.configure_setting(name, raw)
    }

    fn query_setting(&mut self, name: &str) -> Result<String, TerminalError> {
        self.terminal.query_setting(name)
    }
}
