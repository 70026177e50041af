use std::fmt;

use chrono::NaiveDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Eeg,
    Eog,
    Stim,
    Misc,
}

impl ChannelKind {
    /// 容器文件中使用的类型标签
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Eeg => "EEG",
            ChannelKind::Eog => "EOG",
            ChannelKind::Stim => "STIM",
            ChannelKind::Misc => "MISC",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim() {
            "EEG" => Some(ChannelKind::Eeg),
            "EOG" => Some(ChannelKind::Eog),
            "STIM" => Some(ChannelKind::Stim),
            "MISC" => Some(ChannelKind::Misc),
            _ => None,
        }
    }
}

/// Per-channel metadata
///
/// The position of a `ChannelInfo` in [`Info::channels`] is the row of the
/// channel in every sample matrix returned by the library.
///
/// # Examples
///
/// ```rust
/// use brainvision::{ChannelInfo, ChannelKind};
///
/// let channel = ChannelInfo {
///     name: "Fp1".to_string(),
///     reference: String::new(),
///     unit: "µV".to_string(),
///     resolution: 0.5,
///     unit_factor: 1e-6,
///     kind: ChannelKind::Eeg,
///     bad: false,
///     loc: None,
/// };
///
/// // A raw code of 10 is 10 * 0.5 µV = 5 µV = 5e-6 V
/// assert!((channel.cal() * 10.0 - 5e-6).abs() < 1e-15);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelInfo {
    pub name: String,
    pub reference: String,
    pub unit: String,
    pub resolution: f64,
    /// 将 `unit` 换算为伏特的系数（µV 为 1e-6）
    pub unit_factor: f64,
    pub kind: ChannelKind,
    pub bad: bool,
    /// 头坐标系下的电极位置（米）
    pub loc: Option<[f64; 3]>,
}

impl ChannelInfo {
    /// Factor converting a raw sample code to physical (SI) units
    pub fn cal(&self) -> f64 {
        self.resolution * self.unit_factor
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryFormat {
    Int16,
    UInt16,
    Int32,
    Float32,
    Float64,
}

impl BinaryFormat {
    pub fn from_header_value(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "INT_16" => Some(BinaryFormat::Int16),
            "UINT_16" => Some(BinaryFormat::UInt16),
            "INT_32" => Some(BinaryFormat::Int32),
            "IEEE_FLOAT_32" => Some(BinaryFormat::Float32),
            "IEEE_FLOAT_64" => Some(BinaryFormat::Float64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryFormat::Int16 => "INT_16",
            BinaryFormat::UInt16 => "UINT_16",
            BinaryFormat::Int32 => "INT_32",
            BinaryFormat::Float32 => "IEEE_FLOAT_32",
            BinaryFormat::Float64 => "IEEE_FLOAT_64",
        }
    }

    pub fn bytes_per_sample(&self) -> usize {
        match self {
            BinaryFormat::Int16 | BinaryFormat::UInt16 => 2,
            BinaryFormat::Int32 | BinaryFormat::Float32 => 4,
            BinaryFormat::Float64 => 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    LittleEndian,
    BigEndian,
}

/// Sample layout of the binary file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    /// 按时间点交织：t0(ch0, ch1, ...), t1(ch0, ch1, ...)
    Multiplexed,
    /// 按通道连续存储：ch0(t0, t1, ...), ch1(t0, t1, ...)
    Vectorized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Encoding {
    pub format: BinaryFormat,
    pub byte_order: ByteOrder,
    pub orientation: Orientation,
}

impl Encoding {
    pub fn new(format: BinaryFormat, byte_order: ByteOrder, orientation: Orientation) -> Self {
        Encoding { format, byte_order, orientation }
    }
}

/// Sampling metadata declared by a header file
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingSpec {
    /// 采样率（Hz）
    pub sfreq: f64,
    /// 头文件中声明的样本数（`DataPoints`），未声明时为 `None`
    pub declared_samples: Option<usize>,
    pub encoding: Encoding,
}

/// A discrete event: `duration` samples starting at `onset`, carrying `code`
///
/// # Examples
///
/// ```rust
/// use brainvision::Event;
///
/// let event = Event::new(487, 1, 253);
/// assert_eq!(event.onset, 487);
/// assert_eq!(event.end(), 488);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Event {
    pub onset: usize,
    pub duration: usize,
    pub code: u32,
}

impl Event {
    pub fn new(onset: usize, duration: usize, code: u32) -> Self {
        Event { onset, duration, code }
    }

    /// First sample after the event (duration 0 counts as 1)
    ///
    /// Saturates at `usize::MAX` for very long events.
    pub fn end(&self) -> usize {
        self.onset.saturating_add(self.duration.max(1))
    }
}

/// `(onset, duration, code)`
impl From<(usize, usize, u32)> for Event {
    fn from((onset, duration, code): (usize, usize, u32)) -> Self {
        Event::new(onset, duration, code)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigKind {
    Nasion,
    Lpa,
    Rpa,
    Eeg,
}

impl DigKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DigKind::Nasion => "NASION",
            DigKind::Lpa => "LPA",
            DigKind::Rpa => "RPA",
            DigKind::Eeg => "EEG",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim() {
            "NASION" => Some(DigKind::Nasion),
            "LPA" => Some(DigKind::Lpa),
            "RPA" => Some(DigKind::Rpa),
            "EEG" => Some(DigKind::Eeg),
            _ => None,
        }
    }
}

/// A digitized point in head coordinates (metres)
#[derive(Debug, Clone, PartialEq)]
pub struct DigPoint {
    pub kind: DigKind,
    pub ident: String,
    pub r: [f64; 3],
}

/// Recording metadata
///
/// Everything in `Info` is persisted by [`crate::RawWriter`] and compares equal
/// after a save/load round trip.
#[derive(Debug, Clone, PartialEq)]
pub struct Info {
    pub channels: Vec<ChannelInfo>,
    pub sfreq: f64,
    pub n_samples: usize,
    pub meas_date: Option<NaiveDateTime>,
    pub highpass: f64,
    pub lowpass: f64,
    pub dig: Vec<DigPoint>,
}

impl Info {
    pub fn n_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn ch_names(&self) -> Vec<&str> {
        self.channels.iter().map(|ch| ch.name.as_str()).collect()
    }

    pub fn bads(&self) -> Vec<&str> {
        self.channels
            .iter()
            .filter(|ch| ch.bad)
            .map(|ch| ch.name.as_str())
            .collect()
    }

    /// 记录时长（秒）
    pub fn duration(&self) -> f64 {
        self.n_samples as f64 / self.sfreq
    }
}

impl fmt::Display for Info {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "<Info | {} channels>", self.channels.len())?;
        writeln!(f, "    sfreq: {} Hz", self.sfreq)?;
        writeln!(f, "    n_samples: {}", self.n_samples)?;
        match &self.meas_date {
            Some(date) => writeln!(f, "    meas_date: {}", date)?,
            None => writeln!(f, "    meas_date: unspecified")?,
        }
        writeln!(f, "    highpass: {} Hz", self.highpass)?;
        writeln!(f, "    lowpass: {} Hz", self.lowpass)?;
        writeln!(f, "    dig: {} points", self.dig.len())?;
        writeln!(f, "    bads: {:?}", self.bads())?;
        write!(f, "    ch_names: {}", self.ch_names().join(", "))
    }
}
