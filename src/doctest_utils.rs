// Internal utilities for documentation tests and test suites
// Generates small BrainVision recordings (.vhdr/.vmrk/.eeg) and ELP files

use std::fmt::{self, Write as _};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use byteorder::{BigEndian, LittleEndian, WriteBytesExt};

use crate::markers::RESPONSE_CODE_OFFSET;
use crate::types::{BinaryFormat, Event, Orientation};
use crate::{BvError, Result};

const REFERENCE_CHANNELS: [&str; 41] = [
    "FP1", "VEOGt", "F7", "F3", "FZ", "F4", "F8", "FC5", "FC1", "FC2", "FC6", "T7", "C3", "CZ",
    "C4", "T8", "CP5", "CP1", "CP2", "CP6", "P7", "P3", "PZ", "P4", "P8", "PO3", "PO4", "O1",
    "OZ", "O2", "FP2", "AF3", "AF4", "FT9", "FT10", "TP9", "TP10", "A1", "HEOGL", "HEOGR", "VEOGb",
];

/// 参考事件：(onset, duration, code)
const REFERENCE_EVENTS: [(usize, usize, u32); 10] = [
    (487, 1, 253),
    (497, 1, 255),
    (1770, 1, 254),
    (1780, 1, 255),
    (3253, 1, 254),
    (3263, 1, 255),
    (4936, 1, 253),
    (4946, 1, 255),
    (6620, 1, 254),
    (6630, 1, 255),
];

pub const REFERENCE_SEGMENT_DATE: &str = "20131113161403426008";

/// Layout and content of a generated recording
#[derive(Debug, Clone)]
pub struct RecordingSpec {
    pub channel_names: Vec<String>,
    pub n_samples: usize,
    /// 微秒
    pub sampling_interval: f64,
    pub format: BinaryFormat,
    pub orientation: Orientation,
    pub big_endian: bool,
    pub resolution: f64,
    /// Codes above 1000 are written as response markers
    pub events: Vec<Event>,
    pub with_markers: bool,
    pub segment_date: Option<String>,
}

impl Default for RecordingSpec {
    fn default() -> Self {
        RecordingSpec {
            channel_names: reference_channel_names(),
            n_samples: 7000,
            sampling_interval: 1000.0,
            format: BinaryFormat::Int16,
            orientation: Orientation::Multiplexed,
            big_endian: false,
            resolution: 0.5,
            events: reference_events(),
            with_markers: true,
            segment_date: Some(REFERENCE_SEGMENT_DATE.to_string()),
        }
    }
}

pub fn reference_channel_names() -> Vec<String> {
    REFERENCE_CHANNELS.iter().map(|s| s.to_string()).collect()
}

pub fn reference_events() -> Vec<Event> {
    REFERENCE_EVENTS.iter().copied().map(Event::from).collect()
}

/// Raw code stored for channel `ch` at sample `t`
pub fn stored_code(format: BinaryFormat, ch: usize, t: usize) -> f64 {
    let code = ((ch * 131 + t * 17) % 2001) as f64 - 1000.0;
    match format {
        BinaryFormat::UInt16 => code + 1000.0,
        _ => code,
    }
}

/// Expected physical value (volts) of channel `ch` at sample `t`
pub fn expected_value(spec: &RecordingSpec, ch: usize, t: usize) -> f64 {
    stored_code(spec.format, ch, t) * (spec.resolution * 1e-6)
}

/// Writes `<stem>.vhdr`, `<stem>.eeg` and (optionally) `<stem>.vmrk` into `dir`
///
/// Returns the path of the header file.
pub fn write_recording<P: AsRef<Path>>(dir: P, stem: &str, spec: &RecordingSpec) -> Result<PathBuf> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;

    let vhdr = dir.join(format!("{}.vhdr", stem));
    fs::write(&vhdr, header_text(stem, spec).map_err(fmt_error)?)?;
    fs::write(dir.join(format!("{}.eeg", stem)), sample_bytes(spec)?)?;
    if spec.with_markers {
        fs::write(dir.join(format!("{}.vmrk", stem)), marker_text(stem, spec).map_err(fmt_error)?)?;
    }
    Ok(vhdr)
}

/// The 41-channel, 7000-sample reference recording with its 10 events
pub fn write_reference_recording<P: AsRef<Path>>(dir: P) -> Result<PathBuf> {
    write_recording(dir, "test", &RecordingSpec::default())
}

/// Names matching the points of [`write_reference_elp`]
///
/// Three fiducials, two unused points, then every non-EOG channel except A1.
pub fn reference_elp_names() -> Vec<Option<String>> {
    let mut names: Vec<Option<String>> = ["nasion", "lpa", "rpa"]
        .iter()
        .map(|s| Some(s.to_string()))
        .collect();
    names.push(None);
    names.push(None);
    names.extend(elp_electrodes().map(|name| Some(name.to_string())));
    names
}

fn elp_electrodes() -> impl Iterator<Item = &'static str> {
    REFERENCE_CHANNELS
        .iter()
        .copied()
        .filter(|name| !name.contains("EOG") && *name != "A1")
}

/// Writes an ELP file (millimetres) for the reference channels
pub fn write_reference_elp<P: AsRef<Path>>(path: P) -> Result<()> {
    fs::write(path, elp_text().map_err(fmt_error)?)?;
    Ok(())
}

fn fmt_error(e: fmt::Error) -> BvError {
    BvError::Io(io::Error::new(io::ErrorKind::Other, e))
}

fn elp_text() -> std::result::Result<String, fmt::Error> {
    let mut text = String::new();
    text.push_str("% Ascii stylus data file\n");
    text.push_str("% Fiducials, two reference points, then electrodes\n");
    text.push_str("0.0000 95.0000 0.0000\n");
    text.push_str("-75.0000 0.0000 0.0000\n");
    text.push_str("75.0000 0.0000 0.0000\n");
    text.push_str("0.0000 0.0000 0.0000\n");
    text.push_str("1.0000 1.0000 1.0000\n");

    let n = elp_electrodes().count();
    for (i, _) in elp_electrodes().enumerate() {
        let theta = 2.0 * std::f64::consts::PI * i as f64 / n as f64;
        writeln!(
            text,
            "{:.4} {:.4} {:.4}",
            70.0 * theta.cos(),
            70.0 * theta.sin(),
            30.0 + i as f64
        )?;
    }
    Ok(text)
}

fn header_text(stem: &str, spec: &RecordingSpec) -> std::result::Result<String, fmt::Error> {
    let orientation = match spec.orientation {
        Orientation::Multiplexed => "MULTIPLEXED",
        Orientation::Vectorized => "VECTORIZED",
    };
    let mut text = String::new();
    text.push_str("Brain Vision Data Exchange Header File Version 1.0\n");
    text.push_str("; Data created by the Vision Recorder\n\n");
    text.push_str("[Common Infos]\n");
    text.push_str("Codepage=UTF-8\n");
    writeln!(text, "DataFile={}.eeg", stem)?;
    if spec.with_markers {
        writeln!(text, "MarkerFile={}.vmrk", stem)?;
    }
    text.push_str("DataFormat=BINARY\n");
    text.push_str("; Data orientation: MULTIPLEXED=ch1,pt1, ch2,pt1 ...\n");
    writeln!(text, "DataOrientation={}", orientation)?;
    writeln!(text, "NumberOfChannels={}", spec.channel_names.len())?;
    text.push_str("; Sampling interval in microseconds\n");
    writeln!(text, "SamplingInterval={}\n", spec.sampling_interval)?;

    text.push_str("[Binary Infos]\n");
    writeln!(text, "BinaryFormat={}", spec.format.as_str())?;
    writeln!(text, "UseBigEndianOrder={}\n", if spec.big_endian { "YES" } else { "NO" })?;

    text.push_str("[Channel Infos]\n");
    text.push_str("; Each entry: Ch<Channel number>=<Name>,<Reference channel name>,\n");
    text.push_str("; <Resolution in \"Unit\">,<Unit>, Future extensions..\n");
    for (i, name) in spec.channel_names.iter().enumerate() {
        writeln!(text, "Ch{}={},,{},µV", i + 1, name, spec.resolution)?;
    }

    text.push_str("\n[Comment]\n\n");
    text.push_str("A m p l i f i e r  S e t u p\n");
    text.push_str("============================\n");
    writeln!(text, "Number of channels: {}", spec.channel_names.len())?;
    writeln!(text, "Sampling Rate [Hz]: {}", 1e6 / spec.sampling_interval)?;
    writeln!(text, "Sampling Interval [µS]: {}\n", spec.sampling_interval)?;
    text.push_str("Channels\n--------\n");
    text.push_str("#     Name      Phys. Chn.    Resolution / Unit   Low Cutoff [s]   High Cutoff [Hz]   Notch [Hz]\n");
    for (i, name) in spec.channel_names.iter().enumerate() {
        writeln!(
            text,
            "{:<5} {:<9} {:<13} {} µV {:>16} {:>16} {:>12}",
            i + 1,
            name,
            i + 1,
            spec.resolution,
            10,
            250,
            "Off"
        )?;
    }
    text.push_str("\nImpedance [kOhm] at 16:12:27 :\n");
    Ok(text)
}

fn marker_text(stem: &str, spec: &RecordingSpec) -> std::result::Result<String, fmt::Error> {
    let mut text = String::new();
    text.push_str("Brain Vision Data Exchange Marker File, Version 1.0\n\n");
    text.push_str("[Common Infos]\n");
    text.push_str("Codepage=UTF-8\n");
    writeln!(text, "DataFile={}.eeg\n", stem)?;
    text.push_str("[Marker Infos]\n");
    text.push_str("; Each entry: Mk<Marker number>=<Type>,<Description>,<Position in data points>,\n");
    text.push_str("; <Size in data points>, <Channel number (0 = marker is related to all channels)>\n");

    let mut number = 1;
    let date = spec.segment_date.as_deref().unwrap_or("00000000000000000000");
    writeln!(text, "Mk{}=New Segment,,1,1,0,{}", number, date)?;
    for event in &spec.events {
        number += 1;
        let (kind, description) = if event.code > RESPONSE_CODE_OFFSET {
            ("Response", format!("R{:>3}", event.code - RESPONSE_CODE_OFFSET))
        } else {
            ("Stimulus", format!("S{:>3}", event.code))
        };
        // 文件中位置从 1 开始
        writeln!(
            text,
            "Mk{}={},{},{},{},0",
            number,
            kind,
            description,
            event.onset + 1,
            event.duration
        )?;
    }
    Ok(text)
}

fn sample_bytes(spec: &RecordingSpec) -> Result<Vec<u8>> {
    if spec.big_endian {
        encode_samples::<BigEndian>(spec)
    } else {
        encode_samples::<LittleEndian>(spec)
    }
}

fn encode_samples<E: byteorder::ByteOrder>(spec: &RecordingSpec) -> Result<Vec<u8>> {
    let n_channels = spec.channel_names.len();
    let order: Vec<(usize, usize)> = match spec.orientation {
        Orientation::Multiplexed => (0..spec.n_samples)
            .flat_map(|t| (0..n_channels).map(move |ch| (ch, t)))
            .collect(),
        Orientation::Vectorized => (0..n_channels)
            .flat_map(|ch| (0..spec.n_samples).map(move |t| (ch, t)))
            .collect(),
    };

    let mut out = Vec::with_capacity(order.len() * spec.format.bytes_per_sample());
    for (ch, t) in order {
        let code = stored_code(spec.format, ch, t);
        match spec.format {
            BinaryFormat::Int16 => out.write_i16::<E>(code as i16)?,
            BinaryFormat::UInt16 => out.write_u16::<E>(code as u16)?,
            BinaryFormat::Int32 => out.write_i32::<E>(code as i32)?,
            BinaryFormat::Float32 => out.write_f32::<E>(code as f32)?,
            BinaryFormat::Float64 => out.write_f64::<E>(code)?,
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::VhdrHeader;
    use crate::markers::MarkerTable;
    use crate::montage::Montage;

    #[test]
    fn test_generated_files_parse() {
        let dir = tempfile::tempdir().unwrap();
        let vhdr = write_reference_recording(dir.path()).unwrap();

        let header = VhdrHeader::from_file(&vhdr).unwrap();
        assert_eq!(header.channels.len(), 41);
        assert!(header.highpass.is_some());

        let markers = MarkerTable::from_file(header.marker_file.unwrap()).unwrap();
        assert_eq!(markers.events(), reference_events());

        let elp = dir.path().join("test_elp.txt");
        write_reference_elp(&elp).unwrap();
        let montage = Montage::read_elp(&elp, &reference_elp_names()).unwrap();
        assert_eq!(montage.dig().len(), 3 + 36);
    }
}
