use std::time::Duration;

const LINE_FEED: u8 = 0x0A;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleWidth {
    /// One byte per point, 0..=255
    Single,
    /// Two big-endian bytes per point, 0..=65535
    #[default]
    Double,
}

impl SampleWidth {
    pub fn bytes(self) -> usize {
        match self {
            SampleWidth::Single => 1,
            SampleWidth::Double => 2,
        }
    }

    /// Argument of `DATA:WIDTH`
    pub fn as_str(self) -> &'static str {
        match self {
            SampleWidth::Single => "1",
            SampleWidth::Double => "2",
        }
    }

    pub fn from_bytes(bytes: usize) -> Option<Self> {
        match bytes {
            1 => Some(SampleWidth::Single),
            2 => Some(SampleWidth::Double),
            _ => None,
        }
    }
}

/// Parameters of one `CURVE?` transfer.
///
/// ```rust
/// use tekscope_rs::{CurveRequest, SampleWidth};
///
/// let request = CurveRequest::new("CH2")
///     .width(SampleWidth::Single)
///     .with_timing();
/// assert_eq!(request.source, "CH2");
/// assert!(!request.include_preamble);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurveRequest {
    pub source: String,
    pub width: SampleWidth,
    /// First and last point to transfer, 1-based. `None` leaves the device's
    /// `DATA:START` / `DATA:STOP` untouched.
    pub range: Option<(u32, u32)>,
    pub include_preamble: bool,
    pub include_timing: bool,
    pub verify_block_header: bool,
}

impl Default for CurveRequest {
    fn default() -> Self {
        Self::new("CH1")
    }
}

impl CurveRequest {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            width: SampleWidth::default(),
            range: None,
            include_preamble: false,
            include_timing: false,
            verify_block_header: true,
        }
    }

    pub fn width(mut self, width: SampleWidth) -> Self {
        self.width = width;
        self
    }

    pub fn range(mut self, start: u32, stop: u32) -> Self {
        self.range = Some((start, stop));
        self
    }

    /// Keep the bytes that precede the samples in the returned [`Curve`].
    pub fn with_preamble(mut self) -> Self {
        self.include_preamble = true;
        self
    }

    /// Measure how long the transfer took.
    pub fn with_timing(mut self) -> Self {
        self.include_timing = true;
        self
    }

    pub fn skip_block_header_check(mut self) -> Self {
        self.verify_block_header = false;
        self
    }
}

/// Raw, unscaled samples of one transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Curve {
    /// Only present when requested.
    pub preamble: Option<Vec<u8>>,
    pub samples: Vec<u16>,
    /// Only present when requested.
    pub transfer_duration: Option<Duration>,
}

impl Curve {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("Curve transfer of {length} bytes is too short for {points} points of {width} byte(s)")]
    TooShort {
        length: usize,
        points: usize,
        width: usize,
    },

    #[error("Block header declares {declared} data bytes but {actual} were framed as samples")]
    BlockLengthMismatch { declared: usize, actual: usize },
}

/// A curve transfer split into its leading bytes and decoded samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurveFrame {
    pub preamble: Vec<u8>,
    pub samples: Vec<u16>,
    pub width: SampleWidth,
}

impl CurveFrame {
    /// Split `data` assuming it ends with exactly `point_count` samples.
    ///
    /// A single trailing line feed is dropped first. There is no delimiter
    /// between preamble and samples; whatever precedes the last
    /// `width * point_count` bytes is the preamble.
    pub fn decode(data: &[u8], width: SampleWidth, point_count: usize) -> Result<Self, FrameError> {
        #[cfg(feature = "cpu-profiling")]
        let _zone = tracy_client::span!("decode_curve");

        let data = match data.split_last() {
            Some((&LINE_FEED, rest)) => rest,
            _ => data,
        };

        let sample_bytes = width.bytes() * point_count;
        let preamble_len = data
            .len()
            .checked_sub(sample_bytes)
            .ok_or(FrameError::TooShort {
                length: data.len(),
                points: point_count,
                width: width.bytes(),
            })?;
        let (preamble, block) = data.split_at(preamble_len);

        let samples = match width {
            SampleWidth::Single => block.iter().map(|&b| u16::from(b)).collect(),
            SampleWidth::Double => block
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect(),
        };

        Ok(Self {
            preamble: preamble.to_vec(),
            samples,
            width,
        })
    }

    /// Byte count declared by an IEEE 488.2 definite-length block header
    /// (`#<n><n digits>`) in the preamble, if there is one.
    pub fn declared_length(&self) -> Option<usize> {
        let start = self.preamble.iter().position(|&b| b == b'#')?;
        let header = &self.preamble[start + 1..];
        let digits = usize::from(header.first()?.checked_sub(b'0')?);
        if digits == 0 || digits > 9 || header.len() < 1 + digits {
            return None;
        }
        std::str::from_utf8(&header[1..=digits]).ok()?.parse().ok()
    }

    /// Check the sample block length against the block header, when the
    /// preamble carries one. Catches transfers framed with a stale point count.
    pub fn verify_block_header(&self) -> Result<(), FrameError> {
        let actual = self.samples.len() * self.width.bytes();
        match self.declared_length() {
            Some(declared) if declared != actual => {
                Err(FrameError::BlockLengthMismatch { declared, actual })
            }
            _ => Ok(()),
        }
    }

    pub fn into_curve(self, include_preamble: bool, transfer_duration: Option<Duration>) -> Curve {
        Curve {
            preamble: include_preamble.then_some(self.preamble),
            samples: self.samples,
            transfer_duration,
        }
    }
}
