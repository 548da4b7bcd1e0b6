use crate::curve::SampleWidth;
use crate::serial_terminal::FormatError;
use std::str::FromStr;

pub const FIELD_COUNT: usize = 16;

/// Field names of a `WFMPRE?` reply, in wire order.
pub const FIELD_NAMES: [&str; FIELD_COUNT] = [
    "bytes_per_sample",
    "bits_per_sample",
    "encoding",
    "binary_format",
    "byte_order",
    "number_of_points",
    "waveform_id",
    "point_format",
    "x_incr",
    "pt_offset",
    "xzero",
    "x_units",
    "y_scale",
    "y_zero",
    "y_offset",
    "y_unit",
];

/// How a curve transfer is encoded and how to scale it.
///
/// Text fields are kept exactly as sent, quotes included.
#[derive(Debug, Clone, PartialEq)]
pub struct WaveformPreamble {
    pub bytes_per_sample: u32,
    pub bits_per_sample: u32,
    pub encoding: String,
    pub binary_format: String,
    pub byte_order: String,
    pub number_of_points: usize,
    pub waveform_id: String,
    pub point_format: String,
    pub x_incr: f64,
    pub pt_offset: i64,
    pub xzero: f64,
    pub x_units: String,
    pub y_scale: f64,
    pub y_zero: f64,
    pub y_offset: f64,
    pub y_unit: String,
}

fn number<T: FromStr>(fields: &[&str], position: usize) -> Result<T, FormatError> {
    let value = fields[position].trim();
    value.parse().map_err(|_| FormatError::InvalidField {
        field: FIELD_NAMES[position],
        value: value.to_string(),
    })
}

fn text(fields: &[&str], position: usize) -> String {
    fields[position].to_string()
}

fn strip_quotes(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .unwrap_or(value)
}

impl WaveformPreamble {
    /// Parse a `WFMPRE?` reply. Exactly 16 `;`-separated fields are required.
    pub fn parse(line: &str) -> Result<Self, FormatError> {
        let fields: Vec<&str> = line.trim_end().split(';').collect();
        if fields.len() != FIELD_COUNT {
            return Err(FormatError::FieldCount {
                expected: FIELD_COUNT,
                actual: fields.len(),
            });
        }

        Ok(Self {
            bytes_per_sample: number(&fields, 0)?,
            bits_per_sample: number(&fields, 1)?,
            encoding: text(&fields, 2),
            binary_format: text(&fields, 3),
            byte_order: text(&fields, 4),
            number_of_points: number(&fields, 5)?,
            waveform_id: text(&fields, 6),
            point_format: text(&fields, 7),
            x_incr: number(&fields, 8)?,
            pt_offset: number(&fields, 9)?,
            xzero: number(&fields, 10)?,
            x_units: text(&fields, 11),
            y_scale: number(&fields, 12)?,
            y_zero: number(&fields, 13)?,
            y_offset: number(&fields, 14)?,
            y_unit: text(&fields, 15),
        })
    }

    pub fn sample_width(&self) -> Option<SampleWidth> {
        SampleWidth::from_bytes(self.bytes_per_sample as usize)
    }

    /// X unit without its quotes, e.g. `s`.
    pub fn x_unit(&self) -> &str {
        strip_quotes(&self.x_units)
    }

    /// Y unit without its quotes, e.g. `V`.
    pub fn y_unit(&self) -> &str {
        strip_quotes(&self.y_unit)
    }
}
