//! Declarative device settings.
//!
//! A [`SettingDescriptor`] binds a device mnemonic (e.g. `ACQUIRE:STATE`) to a
//! pair of filters: the *get* filter turns the raw query reply into a
//! [`SettingValue`], the *set* filter turns a [`SettingValue`] into the raw
//! argument of the configure command. Descriptors are collected in a
//! [`SettingRegistry`], which is built once and then only read.
//!
//! ```rust
//! use tekscope_rs::settings::{SettingDescriptor, SettingValue};
//!
//! let scale = SettingDescriptor::float("CH1:SCALE");
//! assert_eq!(scale.decode("2.0E-1").unwrap(), SettingValue::Float(0.2));
//! assert_eq!(scale.encode(&SettingValue::Float(0.5)).unwrap(), "5E-1");
//! ```

use crate::serial_terminal::{unquote, FormatError, TekTerminal, TerminalError, Transport};
use std::collections::HashMap;
use std::fmt;

/// Application-side value of a setting.
#[derive(Debug, Clone, PartialEq)]
pub enum SettingValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl SettingValue {
    /// General boolean coercion: numbers are true when non-zero, text when
    /// non-empty.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(f) => *f != 0.0,
            Self::Text(s) => !s.is_empty(),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(true) => f.write_str("ON"),
            Self::Bool(false) => f.write_str("OFF"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x:E}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<bool> for SettingValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for SettingValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u32> for SettingValue {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for SettingValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for SettingValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for SettingValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SettingError {
    #[error("Unexpected value returned from device: {0:?}")]
    UnrecognizedValue(String),

    #[error("Expected {expected} value, received: {received:?}")]
    InvalidInput {
        expected: &'static str,
        received: SettingValue,
    },

    #[error("No setting named {0}")]
    UnknownSetting(String),

    #[error("Setting {0} is already registered")]
    Duplicate(String),

    #[error("Invalid setting definition: {0}")]
    InvalidSpec(String),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error("Terminal error: {0}")]
    Terminal(#[from] TerminalError),
}

/// Something settings can be configured on and queried from.
pub trait SettingDevice {
    /// Send `<name> <raw>`.
    fn configure_setting(&mut self, name: &str, raw: &str) -> Result<(), TerminalError>;

    /// Send `<name>?` and return the raw reply.
    fn query_setting(&mut self, name: &str) -> Result<String, TerminalError>;
}

impl<T: Transport> SettingDevice for TekTerminal<T> {
    fn configure_setting(&mut self, name: &str, raw: &str) -> Result<(), TerminalError> {
        self.send_command(name, &[raw])
    }

    fn query_setting(&mut self, name: &str) -> Result<String, TerminalError> {
        self.send_query(name)
    }
}

pub type GetFilter = Box<dyn Fn(&str) -> Result<SettingValue, SettingError> + Send + Sync>;
pub type SetFilter = Box<dyn Fn(&SettingValue) -> Result<String, SettingError> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocMode {
    Replace,
    Append,
    Prepend,
}

/// A piece of documentation to combine with a setting's existing text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocFragment {
    pub mode: DocMode,
    pub text: String,
}

impl DocFragment {
    pub fn replace(text: impl Into<String>) -> Self {
        Self {
            mode: DocMode::Replace,
            text: text.into(),
        }
    }

    pub fn append(text: impl Into<String>) -> Self {
        Self {
            mode: DocMode::Append,
            text: text.into(),
        }
    }

    pub fn prepend(text: impl Into<String>) -> Self {
        Self {
            mode: DocMode::Prepend,
            text: text.into(),
        }
    }

    fn apply(&self, doc: &mut String) {
        match self.mode {
            DocMode::Replace => self.text.clone_into(doc),
            DocMode::Append => {
                doc.push_str("\n\n");
                doc.push_str(&self.text);
            }
            DocMode::Prepend => *doc = format!("{}\n\n{}", self.text, doc),
        }
    }
}

/// Setting name derived from an accessor identifier: `frobbed` -> `FROBBED`.
pub fn implicit_name(identifier: &str) -> String {
    identifier.to_uppercase()
}

fn default_doc(name: &str) -> String {
    format!(
        "Configures or queries the value of the `{name}` setting on the device.\n\
         If a value is given, the setting is configured to that value. \
         Otherwise the setting is queried and its value is returned."
    )
}

/// Pass the trimmed reply through as text.
pub fn text(raw: &str) -> Result<SettingValue, SettingError> {
    Ok(SettingValue::Text(raw.trim().to_string()))
}

/// Text reply wrapped in double quotes.
pub fn quoted_text(raw: &str) -> Result<SettingValue, SettingError> {
    Ok(SettingValue::Text(unquote(raw.trim())?.to_string()))
}

pub fn float(raw: &str) -> Result<SettingValue, SettingError> {
    let raw = raw.trim();
    raw.parse()
        .map(SettingValue::Float)
        .map_err(|_| FormatError::InvalidNumber(raw.to_string()).into())
}

/// Integer reply; NR3 replies such as `1.0E4` are accepted when integral.
pub fn integer(raw: &str) -> Result<SettingValue, SettingError> {
    let raw = raw.trim();
    if let Ok(value) = raw.parse() {
        return Ok(SettingValue::Int(value));
    }
    match raw.parse::<f64>() {
        #[allow(clippy::cast_possible_truncation)]
        Ok(value) if value.fract() == 0.0 && value.abs() < 9.0e15 => {
            Ok(SettingValue::Int(value as i64))
        }
        _ => Err(FormatError::InvalidNumber(raw.to_string()).into()),
    }
}

fn to_display(value: &SettingValue) -> Result<String, SettingError> {
    Ok(value.to_string())
}

fn to_number(value: &SettingValue) -> Result<String, SettingError> {
    match value {
        SettingValue::Int(_) | SettingValue::Float(_) => Ok(value.to_string()),
        _ => Err(SettingError::InvalidInput {
            expected: "numeric",
            received: value.clone(),
        }),
    }
}

fn to_integer(value: &SettingValue) -> Result<String, SettingError> {
    match value {
        SettingValue::Int(i) => Ok(i.to_string()),
        _ => Err(SettingError::InvalidInput {
            expected: "integer",
            received: value.clone(),
        }),
    }
}

pub struct SettingDescriptor {
    name: String,
    get: GetFilter,
    set: SetFilter,
    doc: String,
}

impl fmt::Debug for SettingDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SettingDescriptor")
            .field("name", &self.name)
            .field("doc", &self.doc)
            .finish_non_exhaustive()
    }
}

impl SettingDescriptor {
    /// Descriptor with an explicit setting name. Queries return the reply as
    /// text; configuring sends the value's `Display` form.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let doc = default_doc(&name);
        Self {
            name,
            get: Box::new(text),
            set: Box::new(to_display),
            doc,
        }
    }

    /// Descriptor named after the accessor identifier, upper-cased.
    pub fn implicit(identifier: &str) -> Self {
        Self::new(implicit_name(identifier))
    }

    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name).getter(float).setter(to_number)
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name).getter(integer).setter(to_integer)
    }

    pub fn getter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&str) -> Result<SettingValue, SettingError> + Send + Sync + 'static,
    {
        self.get = Box::new(filter);
        self
    }

    pub fn setter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&SettingValue) -> Result<String, SettingError> + Send + Sync + 'static,
    {
        self.set = Box::new(filter);
        self
    }

    pub fn with_doc(mut self, fragment: &DocFragment) -> Self {
        fragment.apply(&mut self.doc);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn doc(&self) -> &str {
        &self.doc
    }

    /// Run the get filter on a raw device reply.
    pub fn decode(&self, raw: &str) -> Result<SettingValue, SettingError> {
        (self.get)(raw)
    }

    /// Run the set filter, producing the raw command argument.
    pub fn encode(&self, value: &SettingValue) -> Result<String, SettingError> {
        (self.set)(value)
    }

    pub fn query<D: SettingDevice + ?Sized>(
        &self,
        device: &mut D,
    ) -> Result<SettingValue, SettingError> {
        let raw = device.query_setting(&self.name)?;
        self.decode(&raw)
    }

    pub fn configure<D: SettingDevice + ?Sized>(
        &self,
        device: &mut D,
        value: &SettingValue,
    ) -> Result<(), SettingError> {
        let raw = self.encode(value)?;
        log::debug!("Configuring {} to {}", self.name, raw);
        device.configure_setting(&self.name, &raw)?;
        Ok(())
    }

    /// Query when `value` is `None`, configure otherwise.
    pub fn access<D: SettingDevice + ?Sized>(
        &self,
        device: &mut D,
        value: Option<&SettingValue>,
    ) -> Result<Option<SettingValue>, SettingError> {
        match value {
            None => self.query(device).map(Some),
            Some(value) => self.configure(device, value).map(|()| None),
        }
    }
}

/// Descriptors keyed by accessor identifier. Lookups also accept the
/// descriptor's mnemonic.
#[derive(Debug, Default)]
pub struct SettingRegistry {
    settings: Vec<(String, SettingDescriptor)>,
    index: HashMap<String, usize>,
}

impl SettingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        accessor: &str,
        descriptor: SettingDescriptor,
    ) -> Result<(), SettingError> {
        for key in [accessor, descriptor.name()] {
            if self.index.contains_key(key) {
                return Err(SettingError::Duplicate(key.to_string()));
            }
        }

        let position = self.settings.len();
        self.index.insert(accessor.to_string(), position);
        self.index.insert(descriptor.name().to_string(), position);
        self.settings.push((accessor.to_string(), descriptor));
        Ok(())
    }

    pub fn with(mut self, accessor: &str, descriptor: SettingDescriptor) -> Result<Self, SettingError> {
        self.register(accessor, descriptor)?;
        Ok(self)
    }

    pub fn lookup(&self, key: &str) -> Result<&SettingDescriptor, SettingError> {
        self.index
            .get(key)
            .map(|&position| &self.settings[position].1)
            .ok_or_else(|| SettingError::UnknownSetting(key.to_string()))
    }

    pub fn get_setting<D: SettingDevice + ?Sized>(
        &self,
        device: &mut D,
        key: &str,
    ) -> Result<SettingValue, SettingError> {
        self.lookup(key)?.query(device)
    }

    pub fn set_setting<D: SettingDevice + ?Sized>(
        &self,
        device: &mut D,
        key: &str,
        value: &SettingValue,
    ) -> Result<(), SettingError> {
        self.lookup(key)?.configure(device, value)
    }

    pub fn access<D: SettingDevice + ?Sized>(
        &self,
        device: &mut D,
        key: &str,
        value: Option<&SettingValue>,
    ) -> Result<Option<SettingValue>, SettingError> {
        self.lookup(key)?.access(device, value)
    }

    /// `(accessor, descriptor)` pairs in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SettingDescriptor)> {
        self.settings
            .iter()
            .map(|(accessor, descriptor)| (accessor.as_str(), descriptor))
    }

    pub fn len(&self) -> usize {
        self.settings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.settings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_transport::MockTransport;

    fn foobar() -> SettingDescriptor {
        SettingDescriptor::new("FOO:BAR")
            .getter(|raw| Ok(SettingValue::Text(raw.to_lowercase())))
            .setter(|value| {
                value
                    .as_str()
                    .map(str::to_uppercase)
                    .ok_or_else(|| SettingError::InvalidInput {
                        expected: "text",
                        received: value.clone(),
                    })
            })
    }

    #[test]
    fn test_access_selects_query_or_configure() {
        let transport = MockTransport::new().reply("FOO:BAR?", "TAZ\n");
        let mut terminal = TekTerminal::new(transport);
        let setting = foobar();

        let value = setting.access(&mut terminal, None).unwrap();
        assert_eq!(value, Some(SettingValue::from("taz")));

        let value = setting
            .access(&mut terminal, Some(&SettingValue::from("razzle-dazzle")))
            .unwrap();
        assert_eq!(value, None);

        assert_eq!(
            terminal.transport_mut().commands(),
            ["FOO:BAR?", "FOO:BAR RAZZLE-DAZZLE"]
        );
    }

    #[test]
    fn test_set_filter_error_sends_nothing() {
        let mut terminal = TekTerminal::new(MockTransport::new());
        let result = foobar().configure(&mut terminal, &SettingValue::Int(3));

        assert!(matches!(result, Err(SettingError::InvalidInput { .. })));
        assert!(terminal.transport_mut().written().is_empty());
    }

    #[test]
    fn test_implicit_name() {
        let setting = SettingDescriptor::implicit("frobbed");
        assert_eq!(setting.name(), "FROBBED");
        assert!(setting.doc().contains("`FROBBED`"));
    }

    #[test]
    fn test_default_filters() {
        let setting = SettingDescriptor::new("HARDCOPY:FORMAT");
        assert_eq!(setting.decode(" RLE ").unwrap(), SettingValue::from("RLE"));
        assert_eq!(setting.encode(&SettingValue::from("TIFF")).unwrap(), "TIFF");
        assert_eq!(setting.encode(&SettingValue::Bool(true)).unwrap(), "ON");
        assert_eq!(setting.encode(&SettingValue::Int(500)).unwrap(), "500");
    }

    #[test]
    fn test_numeric_filters() {
        let scale = SettingDescriptor::float("CH1:SCALE");
        assert_eq!(scale.decode("2.0E-1").unwrap(), SettingValue::Float(0.2));
        assert_eq!(scale.encode(&SettingValue::Float(0.2)).unwrap(), "2E-1");
        assert_eq!(scale.encode(&SettingValue::Int(1)).unwrap(), "1");
        assert!(matches!(
            scale.decode("fast"),
            Err(SettingError::Format(FormatError::InvalidNumber(_)))
        ));
        assert!(scale.encode(&SettingValue::from("big")).is_err());

        let length = SettingDescriptor::integer("HORIZONTAL:RECORDLENGTH");
        assert_eq!(length.decode("10000").unwrap(), SettingValue::Int(10_000));
        assert_eq!(length.decode("1.0E4").unwrap(), SettingValue::Int(10_000));
        assert!(length.decode("2.5").is_err());
        assert!(length.encode(&SettingValue::Float(500.0)).is_err());
    }

    #[test]
    fn test_quoted_text_filter() {
        assert_eq!(quoted_text("\"V\"").unwrap(), SettingValue::from("V"));
        assert!(matches!(
            quoted_text("V"),
            Err(SettingError::Format(FormatError::NotQuoted(_)))
        ));
    }

    #[test]
    fn test_doc_fragments() {
        let base = SettingDescriptor::new("ACQUIRE:STATE");
        let default = base.doc().to_string();

        let appended = SettingDescriptor::new("ACQUIRE:STATE")
            .with_doc(&DocFragment::append("Related to the RUN / STOP button."));
        assert_eq!(
            appended.doc(),
            format!("{default}\n\nRelated to the RUN / STOP button.")
        );

        let prepended = SettingDescriptor::new("ACQUIRE:STATE")
            .with_doc(&DocFragment::prepend("Acquisition on/off."));
        assert!(prepended.doc().starts_with("Acquisition on/off.\n\n"));
        assert!(prepended.doc().ends_with(&default));

        let replaced =
            SettingDescriptor::new("ACQUIRE:STATE").with_doc(&DocFragment::replace("Run state."));
        assert_eq!(replaced.doc(), "Run state.");
    }

    #[test]
    fn test_registry_lookup_and_duplicates() {
        let mut registry = SettingRegistry::new()
            .with("foobar", foobar())
            .unwrap()
            .with("record_length", SettingDescriptor::integer("HORIZONTAL:RECORDLENGTH"))
            .unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.lookup("foobar").unwrap().name(), "FOO:BAR");
        assert_eq!(registry.lookup("FOO:BAR").unwrap().name(), "FOO:BAR");
        assert!(matches!(
            registry.lookup("frobbed"),
            Err(SettingError::UnknownSetting(_))
        ));
        assert!(matches!(
            registry.register("other", SettingDescriptor::new("FOO:BAR")),
            Err(SettingError::Duplicate(_))
        ));
        assert!(matches!(
            registry.register("foobar", SettingDescriptor::new("BAZ")),
            Err(SettingError::Duplicate(_))
        ));

        let accessors: Vec<&str> = registry.iter().map(|(accessor, _)| accessor).collect();
        assert_eq!(accessors, ["foobar", "record_length"]);
    }

    #[test]
    fn test_registry_entry_points() {
        let registry = SettingRegistry::new()
            .with("record_length", SettingDescriptor::integer("HORIZONTAL:RECORDLENGTH"))
            .unwrap();
        let transport = MockTransport::new().reply("HORIZONTAL:RECORDLENGTH?", "500\n");
        let mut terminal = TekTerminal::new(transport);

        assert_eq!(
            registry.get_setting(&mut terminal, "record_length").unwrap(),
            SettingValue::Int(500)
        );
        registry
            .set_setting(&mut terminal, "record_length", &SettingValue::Int(10_000))
            .unwrap();
        assert_eq!(
            registry
                .access(&mut terminal, "HORIZONTAL:RECORDLENGTH", Some(&SettingValue::Int(500)))
                .unwrap(),
            None
        );
        assert!(registry.get_setting(&mut terminal, "nope").is_err());

        assert_eq!(
            terminal.transport_mut().commands(),
            [
                "HORIZONTAL:RECORDLENGTH?",
                "HORIZONTAL:RECORDLENGTH 10000",
                "HORIZONTAL:RECORDLENGTH 500"
            ]
        );
    }

    #[test]
    fn test_truthiness() {
        assert!(SettingValue::Bool(true).is_truthy());
        assert!(!SettingValue::Int(0).is_truthy());
        assert!(SettingValue::Float(0.5).is_truthy());
        assert!(!SettingValue::from("").is_truthy());
        assert!(SettingValue::from("no").is_truthy());
    }
}
