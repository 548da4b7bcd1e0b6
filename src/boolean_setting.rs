use crate::settings::{DocFragment, SettingDescriptor, SettingError, SettingValue};

/// Maps a two-way partition of device strings onto `true` / `false`.
///
/// The first value of each list is the canonical one sent when configuring;
/// the others are only accepted in query replies.
///
/// ```rust
/// use tekscope_rs::BooleanSetting;
///
/// let acquire = BooleanSetting::new(["1", "ON", "RUN"], ["0", "OFF", "STOP"]).case_insensitive();
/// assert!(acquire.decode("run").unwrap());
/// assert!(!acquire.decode("Stop").unwrap());
/// assert_eq!(acquire.canonical(true), "1");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BooleanSetting {
    true_values: Vec<String>,
    false_values: Vec<String>,
    case_insensitive: bool,
    strict: bool,
    default_when_unrecognized: bool,
}

impl BooleanSetting {
    pub fn new<T, F>(true_values: T, false_values: F) -> Self
    where
        T: IntoIterator,
        T::Item: Into<String>,
        F: IntoIterator,
        F::Item: Into<String>,
    {
        Self {
            true_values: true_values.into_iter().map(Into::into).collect(),
            false_values: false_values.into_iter().map(Into::into).collect(),
            case_insensitive: false,
            strict: false,
            default_when_unrecognized: false,
        }
    }

    /// Build from a function returning the true values when called with `true`
    /// and the false values when called with `false`.
    pub fn from_fn<V, I>(values: V) -> Self
    where
        V: Fn(bool) -> I,
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Self::new(values(true), values(false))
    }

    pub fn case_insensitive(mut self) -> Self {
        self.case_insensitive = true;
        self
    }

    /// Reject unknown replies and non-boolean values instead of coercing them.
    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    /// Value returned by a lenient query when the reply is in neither list.
    pub fn default_when_unrecognized(mut self, default: bool) -> Self {
        self.default_when_unrecognized = default;
        self
    }

    pub fn true_values(&self) -> &[String] {
        &self.true_values
    }

    pub fn false_values(&self) -> &[String] {
        &self.false_values
    }

    /// The value sent to the device for `flag`. Never case-folded.
    pub fn canonical(&self, flag: bool) -> &str {
        let values = if flag {
            &self.true_values
        } else {
            &self.false_values
        };
        values.first().map_or("", String::as_str)
    }

    fn fold(&self, value: &str) -> String {
        if self.case_insensitive {
            value.to_lowercase()
        } else {
            value.to_string()
        }
    }

    fn contains(&self, values: &[String], raw: &str) -> bool {
        let raw = self.fold(raw);
        values.iter().any(|candidate| self.fold(candidate) == raw)
    }

    /// Both lists must be non-empty and must not share a value.
    pub fn validate(&self) -> Result<(), SettingError> {
        if self.true_values.is_empty() || self.false_values.is_empty() {
            return Err(SettingError::InvalidSpec(
                "boolean setting needs at least one true and one false value".to_string(),
            ));
        }
        if let Some(shared) = self
            .true_values
            .iter()
            .find(|value| self.contains(&self.false_values, value))
        {
            return Err(SettingError::InvalidSpec(format!(
                "{shared:?} is listed as both a true and a false value"
            )));
        }
        Ok(())
    }

    /// Translate a device reply.
    pub fn decode(&self, raw: &str) -> Result<bool, SettingError> {
        let raw = raw.trim();
        if self.strict {
            if self.contains(&self.true_values, raw) {
                return Ok(true);
            }
            if self.contains(&self.false_values, raw) {
                return Ok(false);
            }
            return Err(SettingError::UnrecognizedValue(raw.to_string()));
        }

        if self.default_when_unrecognized {
            Ok(!self.contains(&self.false_values, raw))
        } else {
            Ok(self.contains(&self.true_values, raw))
        }
    }

    /// Translate an application value into the canonical device string.
    pub fn encode(&self, value: &SettingValue) -> Result<&str, SettingError> {
        if self.strict {
            return match value {
                SettingValue::Bool(flag) => Ok(self.canonical(*flag)),
                _ => Err(SettingError::InvalidInput {
                    expected: "boolean",
                    received: value.clone(),
                }),
            };
        }
        Ok(self.canonical(value.is_truthy()))
    }

    fn quoted_list(values: &[String]) -> String {
        values
            .iter()
            .map(|value| format!("`\"{value}\"`"))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Documentation of the accepted values, appended to the setting's doc.
    pub fn describe(&self) -> DocFragment {
        let true_list = Self::quoted_list(&self.true_values);
        let false_list = Self::quoted_list(&self.false_values);
        let (canonical_true, canonical_false) = (self.canonical(true), self.canonical(false));

        let query = if self.strict {
            format!(
                "Queries return `true` for any of {true_list}, `false` for any of {false_list}, \
                 and fail on anything else."
            )
        } else if self.default_when_unrecognized {
            format!("Queries return `false` for any of {false_list} and `true` otherwise.")
        } else {
            format!("Queries return `true` for any of {true_list} and `false` otherwise.")
        };
        let configure = if self.strict {
            format!(
                "Configuring with `true` sends `\"{canonical_true}\"`, `false` sends \
                 `\"{canonical_false}\"`; any other value is rejected."
            )
        } else {
            format!(
                "Configuring with a truthy value sends `\"{canonical_true}\"`, anything else \
                 sends `\"{canonical_false}\"`."
            )
        };
        let case = if self.case_insensitive {
            "\nReplies are compared case-insensitively."
        } else {
            ""
        };

        DocFragment::append(format!("{query}\n{configure}{case}"))
    }

    /// Descriptor for the setting `name` using these values as its filters.
    pub fn into_descriptor(self, name: impl Into<String>) -> Result<SettingDescriptor, SettingError> {
        self.validate()?;
        let doc = self.describe();
        let getter = self.clone();
        let setter = self;

        Ok(SettingDescriptor::new(name)
            .getter(move |raw| getter.decode(raw).map(SettingValue::Bool))
            .setter(move |value| setter.encode(value).map(str::to_string))
            .with_doc(&doc))
    }
}

impl SettingDescriptor {
    pub fn boolean(name: impl Into<String>, values: BooleanSetting) -> Result<Self, SettingError> {
        values.into_descriptor(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_transport::MockTransport;
    use crate::serial_terminal::TekTerminal;

    fn acquire_state() -> BooleanSetting {
        BooleanSetting::from_fn(|flag| {
            if flag {
                vec!["1", "ON", "RUN"]
            } else {
                vec!["0", "OFF", "STOP"]
            }
        })
    }

    #[test]
    fn test_strict_round_trip() {
        let setting = acquire_state().strict();

        let sent_true = setting.encode(&SettingValue::Bool(true)).unwrap();
        let sent_false = setting.encode(&SettingValue::Bool(false)).unwrap();
        assert_eq!(sent_true, "1");
        assert_eq!(sent_false, "0");
        assert!(setting.decode(sent_true).unwrap());
        assert!(!setting.decode(sent_false).unwrap());
    }

    #[test]
    fn test_strict_rejects_unknown_values() {
        let setting = acquire_state().strict();

        assert!(matches!(
            setting.decode("MAYBE"),
            Err(SettingError::UnrecognizedValue(value)) if value == "MAYBE"
        ));
        // Case matters unless folding is enabled.
        assert!(setting.decode("run").is_err());
        assert!(matches!(
            setting.encode(&SettingValue::Int(1)),
            Err(SettingError::InvalidInput { expected: "boolean", .. })
        ));
        assert!(setting.encode(&SettingValue::from("ON")).is_err());
    }

    #[test]
    fn test_case_insensitive_matches_canonical() {
        let setting = BooleanSetting::new(["auto"], ["norm", "normal"])
            .case_insensitive()
            .strict();

        for (mixed, canonical) in [("AUTO", "auto"), ("Norm", "norm"), ("NORMAL", "normal")] {
            assert_eq!(setting.decode(mixed).unwrap(), setting.decode(canonical).unwrap());
        }
    }

    #[test]
    fn test_canonical_value_is_not_folded() {
        let setting = BooleanSetting::new(["SEQ", "SEQUENCE"], ["RUNST", "RUN", "RUNSTOP"])
            .case_insensitive();

        assert_eq!(setting.encode(&SettingValue::Bool(true)).unwrap(), "SEQ");
        assert_eq!(setting.encode(&SettingValue::Bool(false)).unwrap(), "RUNST");
    }

    #[test]
    fn test_lenient_default_false() {
        let setting = acquire_state();

        assert!(setting.decode("RUN").unwrap());
        assert!(!setting.decode("STOP").unwrap());
        assert!(!setting.decode("garbage").unwrap());
        assert_eq!(setting.encode(&SettingValue::Int(5)).unwrap(), "1");
        assert_eq!(setting.encode(&SettingValue::from("")).unwrap(), "0");
        assert_eq!(setting.encode(&SettingValue::Float(0.0)).unwrap(), "0");
    }

    #[test]
    fn test_lenient_default_true() {
        let setting = acquire_state().default_when_unrecognized(true);

        assert!(setting.decode("RUN").unwrap());
        assert!(!setting.decode("OFF").unwrap());
        assert!(setting.decode("garbage").unwrap());
        assert_eq!(setting.encode(&SettingValue::Bool(true)).unwrap(), "1");
        assert_eq!(setting.encode(&SettingValue::Bool(false)).unwrap(), "0");
    }

    #[test]
    fn test_round_trip_keeps_truth_class() {
        let variants = [
            acquire_state(),
            acquire_state().case_insensitive(),
            acquire_state().default_when_unrecognized(true),
            acquire_state().case_insensitive().strict(),
        ];
        for setting in variants {
            for raw in ["1", "ON", "RUN", "0", "OFF", "STOP", "on", "stop"] {
                let Ok(truth) = setting.decode(raw) else {
                    continue;
                };
                let sent = setting.encode(&SettingValue::Bool(truth)).unwrap();
                assert_eq!(setting.decode(sent).unwrap(), truth, "raw {raw:?}");
            }
        }
    }

    #[test]
    fn test_validate() {
        assert!(acquire_state().validate().is_ok());
        assert!(BooleanSetting::new(Vec::<String>::new(), ["OFF"]).validate().is_err());
        assert!(BooleanSetting::new(["ON"], ["OFF", "on"]).validate().is_ok());
        assert!(matches!(
            BooleanSetting::new(["ON"], ["OFF", "on"])
                .case_insensitive()
                .validate(),
            Err(SettingError::InvalidSpec(_))
        ));
        assert!(BooleanSetting::new(["ON"], ["ON"])
            .into_descriptor("HEADER")
            .is_err());
    }

    #[test]
    fn test_descriptor_queries_and_configures() {
        let descriptor = SettingDescriptor::boolean(
            "ACQUIRE:STATE",
            acquire_state().case_insensitive(),
        )
        .unwrap();
        let transport = MockTransport::new().reply("ACQUIRE:STATE?", "run\n");
        let mut terminal = TekTerminal::new(transport);

        assert_eq!(
            descriptor.query(&mut terminal).unwrap(),
            SettingValue::Bool(true)
        );
        descriptor
            .configure(&mut terminal, &SettingValue::Bool(false))
            .unwrap();
        assert_eq!(
            terminal.transport_mut().commands(),
            ["ACQUIRE:STATE?", "ACQUIRE:STATE 0"]
        );
        assert!(descriptor.doc().contains("`\"1\"`, `\"ON\"`, `\"RUN\"`"));
        assert!(descriptor.doc().contains("case-insensitively"));
    }
}
