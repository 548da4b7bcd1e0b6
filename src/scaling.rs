use crate::curve::Curve;
use crate::waveform_preamble::WaveformPreamble;
use polars::prelude::*;
use std::iter::{Enumerate, FusedIterator};
use std::slice::Iter;

pub const TIME_COLUMN_NAME: &str = "time";
pub const RAW_COLUMN_NAME: &str = "raw";
pub const VALUE_COLUMN_NAME: &str = "value";

/// Constants mapping sample index and raw value to physical units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scaling {
    pub xzero: f64,
    pub x_incr: f64,
    pub y_scale: f64,
    pub y_offset: f64,
    pub y_zero: f64,
}

impl From<&WaveformPreamble> for Scaling {
    fn from(preamble: &WaveformPreamble) -> Self {
        Self {
            xzero: preamble.xzero,
            x_incr: preamble.x_incr,
            y_scale: preamble.y_scale,
            y_offset: preamble.y_offset,
            y_zero: preamble.y_zero,
        }
    }
}

impl Scaling {
    #[allow(clippy::cast_precision_loss)]
    pub fn x(&self, index: usize) -> f64 {
        self.xzero + index as f64 * self.x_incr
    }

    pub fn y(&self, raw: u16) -> f64 {
        (f64::from(raw) - self.y_offset) * self.y_scale + self.y_zero
    }

    /// Lazily scale `samples` into `(x, y)` pairs.
    pub fn scale<'a>(&self, samples: &'a [u16]) -> ScaledPoints<'a> {
        ScaledPoints {
            scaling: *self,
            samples: samples.iter().enumerate(),
        }
    }
}

/// Iterator of `(x, y)` pairs in sample order.
#[derive(Debug, Clone)]
pub struct ScaledPoints<'a> {
    scaling: Scaling,
    samples: Enumerate<Iter<'a, u16>>,
}

impl Iterator for ScaledPoints<'_> {
    type Item = (f64, f64);

    fn next(&mut self) -> Option<Self::Item> {
        self.samples
            .next()
            .map(|(index, &raw)| (self.scaling.x(index), self.scaling.y(raw)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.samples.size_hint()
    }
}

impl ExactSizeIterator for ScaledPoints<'_> {}

impl FusedIterator for ScaledPoints<'_> {}

/// A curve together with the preamble describing how to scale it.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    pub curve: Curve,
    pub preamble: WaveformPreamble,
}

impl Waveform {
    pub fn new(curve: Curve, preamble: WaveformPreamble) -> Self {
        Self { curve, preamble }
    }

    pub fn scaling(&self) -> Scaling {
        Scaling::from(&self.preamble)
    }

    /// Scaled `(x, y)` points, computed on the fly.
    pub fn points(&self) -> ScaledPoints<'_> {
        self.scaling().scale(&self.curve.samples)
    }

    /// Materialize the waveform as `time`, `raw` and `value` columns.
    pub fn to_dataframe(&self) -> Result<DataFrame, PolarsError> {
        #[cfg(feature = "cpu-profiling")]
        let _zone = tracy_client::span!("waveform_to_dataframe");

        let scaling = self.scaling();
        let raw: Vec<f64> = self.curve.samples.iter().map(|&v| f64::from(v)).collect();
        let raw_column: Column = Series::new(RAW_COLUMN_NAME.into(), raw).into();

        DataFrame::new(vec![raw_column])?
            .lazy()
            .with_row_index("row_index", Some(0))
            .with_columns([
                (lit(scaling.xzero)
                    + col("row_index").cast(DataType::Float64) * lit(scaling.x_incr))
                .alias(TIME_COLUMN_NAME),
                ((col(RAW_COLUMN_NAME) - lit(scaling.y_offset)) * lit(scaling.y_scale)
                    + lit(scaling.y_zero))
                .alias(VALUE_COLUMN_NAME),
            ])
            .select([
                col(TIME_COLUMN_NAME),
                col(RAW_COLUMN_NAME),
                col(VALUE_COLUMN_NAME),
            ])
            .collect()
    }
}
