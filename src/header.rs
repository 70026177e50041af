use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use ini::{Ini, ParseOption, Properties};

use crate::error::{BvError, Result};
use crate::types::{BinaryFormat, ByteOrder, ChannelInfo, ChannelKind, Encoding, Orientation, SamplingSpec};
use crate::utils::{
    decode_text, is_integer_number, is_number, parse_f64_field, parse_usize_field,
    unescape_channel_name, unit_factor,
};
use crate::STIM_CHANNEL_NAME;

/// 支持的头文件标识行前缀
const HEADER_IDENTIFIERS: [&str; 2] = [
    "Brain Vision Data Exchange Header File",
    "BrainVision Data Exchange Header File",
];

/// Parsed BrainVision text header (`.vhdr`)
///
/// Parsing is pure: the header is read and validated, but neither the data
/// file nor the marker file is touched. Relative file references are resolved
/// against the directory containing the header.
///
/// # Examples
///
/// ```rust
/// use brainvision::VhdrHeader;
/// use std::path::Path;
///
/// let text = "Brain Vision Data Exchange Header File Version 1.0\n\
///             [Common Infos]\n\
///             DataFile=rec.eeg\n\
///             MarkerFile=rec.vmrk\n\
///             DataFormat=BINARY\n\
///             DataOrientation=MULTIPLEXED\n\
///             NumberOfChannels=2\n\
///             SamplingInterval=1000\n\
///             [Binary Infos]\n\
///             BinaryFormat=INT_16\n\
///             [Channel Infos]\n\
///             Ch1=Fp1,,0.5,µV\n\
///             Ch2=Fp2,,0.5,µV\n";
///
/// let header = VhdrHeader::parse(text, Path::new("/data"))?;
/// assert_eq!(header.channels.len(), 2);
/// assert_eq!(header.sampling.sfreq, 1000.0);
/// assert_eq!(header.data_file, Path::new("/data/rec.eeg"));
/// # Ok::<(), brainvision::BvError>(())
/// ```
#[derive(Debug, Clone)]
pub struct VhdrHeader {
    pub data_file: PathBuf,
    pub marker_file: Option<PathBuf>,
    pub sampling: SamplingSpec,
    pub channels: Vec<ChannelInfo>,
    /// 从 [Comment] 通道表中解析出的高通截止频率（Hz）
    pub highpass: Option<f64>,
    /// 从 [Comment] 通道表中解析出的低通截止频率（Hz）
    pub lowpass: Option<f64>,
}

impl VhdrHeader {
    /// Reads and parses a header file
    ///
    /// # Errors
    ///
    /// * `BvError::FileNotFound` - The header cannot be opened
    /// * `BvError::InvalidFormat` - Missing or malformed required fields,
    ///   or a channel count mismatch
    /// * `BvError::UnsupportedFormat` - ASCII data or non time-domain data
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path)
            .map_err(|e| BvError::FileNotFound(format!("{}: {}", path.display(), e)))?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new(""));
        Self::parse(&decode_text(&bytes), base_dir)
    }

    /// Parses header text, resolving file references against `base_dir`
    pub fn parse(text: &str, base_dir: &Path) -> Result<Self> {
        // 第一行是标识行，不属于 INI 内容
        let mut lines = text.lines();
        let identification = lines.next().unwrap_or("").trim();
        if !HEADER_IDENTIFIERS.iter().any(|id| identification.starts_with(id)) {
            return Err(BvError::InvalidFormat(format!(
                "Not a BrainVision header: '{}'",
                identification
            )));
        }
        let body: Vec<&str> = lines.collect();
        let body = body.join("\n");

        // [Comment] 段是自由文本，单独处理
        let (ini_text, comment) = split_comment(&body);

        let ini = Ini::load_from_str_opt(ini_text, parse_option())
            .map_err(|e| BvError::InvalidFormat(format!("Malformed header: {}", e)))?;

        let common = ini
            .section(Some("Common Infos"))
            .ok_or_else(|| missing("[Common Infos] section"))?;
        let binary = ini
            .section(Some("Binary Infos"))
            .ok_or_else(|| missing("[Binary Infos] section"))?;
        let channel_infos = ini
            .section(Some("Channel Infos"))
            .ok_or_else(|| missing("[Channel Infos] section"))?;

        let data_file = common
            .get("DataFile")
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| missing("DataFile"))?;
        let marker_file = common
            .get("MarkerFile")
            .map(str::trim)
            .filter(|s| !s.is_empty());

        let n_channels = parse_usize_field(
            common.get("NumberOfChannels").ok_or_else(|| missing("NumberOfChannels"))?,
            "NumberOfChannels",
        )?;
        if n_channels == 0 {
            return Err(BvError::InvalidFormat("NumberOfChannels must be at least 1".to_string()));
        }

        let interval = parse_f64_field(
            common.get("SamplingInterval").ok_or_else(|| missing("SamplingInterval"))?,
            "SamplingInterval",
        )?;
        if interval <= 0.0 {
            return Err(BvError::InvalidFormat(format!(
                "SamplingInterval must be positive, got {}",
                interval
            )));
        }
        // SamplingInterval 的单位是微秒
        let sfreq = 1e6 / interval;

        check_value(common, "DataFormat", "BINARY")?;
        check_value(common, "DataType", "TIMEDOMAIN")?;

        let orientation = match common.get("DataOrientation").map(|s| s.trim().to_ascii_uppercase()) {
            None => Orientation::Multiplexed,
            Some(value) if value == "MULTIPLEXED" => Orientation::Multiplexed,
            Some(value) if value == "VECTORIZED" => Orientation::Vectorized,
            Some(value) => {
                return Err(BvError::InvalidFormat(format!("Unknown DataOrientation '{}'", value)))
            }
        };

        let declared_samples = common
            .get("DataPoints")
            .map(|v| parse_usize_field(v, "DataPoints"))
            .transpose()?;

        let format_value = binary.get("BinaryFormat").ok_or_else(|| missing("BinaryFormat"))?;
        let format = BinaryFormat::from_header_value(format_value).ok_or_else(|| {
            BvError::InvalidFormat(format!("Unknown BinaryFormat '{}'", format_value.trim()))
        })?;
        let byte_order = match binary.get("UseBigEndianOrder").map(|s| s.trim().to_ascii_uppercase()) {
            Some(value) if value == "YES" => ByteOrder::BigEndian,
            Some(value) if value == "NO" => ByteOrder::LittleEndian,
            None => ByteOrder::LittleEndian,
            Some(value) => {
                return Err(BvError::InvalidFormat(format!("Invalid UseBigEndianOrder '{}'", value)))
            }
        };

        let channels = parse_channels(channel_infos, n_channels)?;

        let (highpass, lowpass) = comment
            .map(|c| parse_filter_settings(c, sfreq))
            .unwrap_or((None, None));

        log::debug!(
            "Parsed header: {} channels at {} Hz, {} {:?} {:?}",
            channels.len(),
            sfreq,
            format.as_str(),
            byte_order,
            orientation
        );

        Ok(VhdrHeader {
            data_file: base_dir.join(data_file),
            marker_file: marker_file.map(|m| base_dir.join(m)),
            sampling: SamplingSpec {
                sfreq,
                declared_samples,
                encoding: Encoding::new(format, byte_order, orientation),
            },
            channels,
            highpass,
            lowpass,
        })
    }

    /// Raw-code to physical-unit factors, one per channel
    pub fn cals(&self) -> Vec<f64> {
        self.channels.iter().map(|ch| ch.cal()).collect()
    }
}

fn parse_option() -> ParseOption {
    // 通道名中的反斜杠和引号必须原样保留
    ParseOption {
        enabled_quote: false,
        enabled_escape: false,
        ..ParseOption::default()
    }
}

fn missing(what: &str) -> BvError {
    BvError::InvalidFormat(format!("Missing {} in header", what))
}

fn check_value(section: &Properties, key: &str, expected: &str) -> Result<()> {
    match section.get(key).map(|v| v.trim().to_ascii_uppercase()) {
        Some(value) if value != expected => Err(BvError::UnsupportedFormat(format!(
            "{}={} (only {} is supported)",
            key, value, expected
        ))),
        _ => Ok(()),
    }
}

fn split_comment(body: &str) -> (&str, Option<&str>) {
    let mut offset = 0;
    for line in body.split_inclusive('\n') {
        if line.trim() == "[Comment]" {
            return (&body[..offset], Some(&body[offset + line.len()..]));
        }
        offset += line.len();
    }
    (body, None)
}

/// 解析 Ch<n>=<name>,<ref>,<resolution>,<unit>
fn parse_channels(section: &Properties, n_channels: usize) -> Result<Vec<ChannelInfo>> {
    let mut slots: Vec<Option<ChannelInfo>> = vec![None; n_channels];
    let mut count = 0;

    for (key, value) in section.iter() {
        let index = key
            .trim()
            .strip_prefix("Ch")
            .filter(|n| is_integer_number(n))
            .and_then(|n| n.parse::<usize>().ok())
            .ok_or_else(|| BvError::InvalidFormat(format!("Invalid channel key '{}'", key)))?;
        count += 1;

        if index == 0 || index > n_channels {
            return Err(BvError::InvalidFormat(format!(
                "Channel count mismatch: NumberOfChannels={} but found {}",
                n_channels, key
            )));
        }
        if slots[index - 1].is_some() {
            return Err(BvError::InvalidFormat(format!("Duplicate channel key '{}'", key)));
        }
        slots[index - 1] = Some(parse_channel_line(value)?);
    }

    if count != n_channels {
        return Err(BvError::InvalidFormat(format!(
            "Channel count mismatch: NumberOfChannels={} but {} channel lines",
            n_channels, count
        )));
    }

    let channels: Vec<ChannelInfo> = slots.into_iter().flatten().collect();

    let mut seen = HashSet::new();
    for ch in &channels {
        if ch.name == STIM_CHANNEL_NAME {
            return Err(BvError::InvalidFormat(format!(
                "Channel name '{}' is reserved for the stim channel",
                STIM_CHANNEL_NAME
            )));
        }
        if !seen.insert(ch.name.as_str()) {
            return Err(BvError::InvalidFormat(format!("Duplicate channel name '{}'", ch.name)));
        }
    }

    Ok(channels)
}

fn parse_channel_line(value: &str) -> Result<ChannelInfo> {
    let mut fields = value.split(',');

    let name = fields.next().map(str::trim).unwrap_or("");
    if name.is_empty() {
        return Err(BvError::InvalidFormat(format!("Channel without name: '{}'", value)));
    }
    let reference = fields.next().map(str::trim).unwrap_or("");

    let resolution = match fields.next().map(str::trim) {
        None | Some("") => 1.0,
        Some(r) => parse_f64_field(r, "channel resolution")?,
    };

    // 未声明单位时默认为 µV
    let unit = match fields.next().map(str::trim) {
        None | Some("") => "µV".to_string(),
        Some(u) => u.to_string(),
    };
    let factor = match unit_factor(&unit) {
        Some(f) => f,
        None => {
            log::warn!("Unknown unit '{}' for channel '{}', data left unscaled", unit, name);
            1.0
        }
    };

    Ok(ChannelInfo {
        name: unescape_channel_name(name),
        reference: unescape_channel_name(reference),
        unit,
        resolution,
        unit_factor: factor,
        kind: ChannelKind::Eeg,
        bad: false,
        loc: None,
    })
}

/// 从放大器通道表中解析滤波设置
///
/// 表格列为 `# Name Phys.Chn. Resolution Unit LowCutoff[s] HighCutoff[Hz] ...`，
/// 低截止以时间常数（秒）给出。
fn parse_filter_settings(comment: &str, sfreq: f64) -> (Option<f64>, Option<f64>) {
    let mut lines = comment.lines();
    let has_table = lines
        .by_ref()
        .any(|line| line.contains("Low Cutoff") && line.contains("High Cutoff"));
    if !has_table {
        return (None, None);
    }

    let mut highpasses = Vec::new();
    let mut lowpasses = Vec::new();

    for line in lines {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let is_row = tokens.first().map_or(false, |t| is_integer_number(t));
        if !is_row {
            // 表格结束
            if !highpasses.is_empty() {
                break;
            }
            continue;
        }
        if tokens.len() < 7 {
            continue;
        }

        let highpass = match tokens[5] {
            "DC" => Some(0.0),
            tau if is_number(tau) => {
                let tau: f64 = tau.parse().unwrap_or(0.0);
                Some(if tau > 0.0 { 1.0 / (2.0 * std::f64::consts::PI * tau) } else { 0.0 })
            }
            _ => None,
        };
        let lowpass = match tokens[6] {
            "Off" => Some(sfreq / 2.0),
            cutoff if is_number(cutoff) => cutoff.parse().ok(),
            _ => None,
        };

        if let (Some(hp), Some(lp)) = (highpass, lowpass) {
            highpasses.push(hp);
            lowpasses.push(lp);
        }
    }

    if highpasses.is_empty() {
        return (None, None);
    }

    let highpass = highpasses.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let lowpass = lowpasses.iter().cloned().fold(f64::INFINITY, f64::min);

    if highpasses.iter().any(|&hp| hp != highpass) {
        log::warn!("Channels use different highpass settings, using the highest ({} Hz)", highpass);
    }
    if lowpasses.iter().any(|&lp| lp != lowpass) {
        log::warn!("Channels use different lowpass settings, using the lowest ({} Hz)", lowpass);
    }

    (Some(highpass), Some(lowpass))
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "Brain Vision Data Exchange Header File Version 1.0
; Data created by the Vision Recorder

[Common Infos]
Codepage=UTF-8
DataFile=test.eeg
MarkerFile=test.vmrk
DataFormat=BINARY
; Data orientation: MULTIPLEXED=ch1,pt1, ch2,pt1 ...
DataOrientation=MULTIPLEXED
NumberOfChannels=3
; Sampling interval in microseconds
SamplingInterval=1000

[Binary Infos]
BinaryFormat=INT_16

[Channel Infos]
; Each entry: Ch<Channel number>=<Name>,<Reference channel name>,
; <Resolution in \"Unit\">,<Unit>, Future extensions..
Ch1=FP1,,0.5,µV
Ch2=HEOGL,,0.5,µV
Ch3=A\\1B,,,

[Comment]

A m p l i f i e r  S e t u p
============================
Number of channels: 3
Sampling Rate [Hz]: 1000
Sampling Interval [µS]: 1000

Channels
--------
#     Name      Phys. Chn.    Resolution / Unit   Low Cutoff [s]   High Cutoff [Hz]   Notch [Hz]
1     FP1         1                0.5 µV             10              250              Off
2     HEOGL       2                0.5 µV             10              250              Off
3     A,B         3                0.5 µV             10              250              Off

S o f t w a r e  F i l t e r s
==============================
Disabled
";

    #[test]
    fn test_parse_full_header() {
        let header = VhdrHeader::parse(HEADER, Path::new("/tmp/rec")).unwrap();

        assert_eq!(header.data_file, PathBuf::from("/tmp/rec/test.eeg"));
        assert_eq!(header.marker_file, Some(PathBuf::from("/tmp/rec/test.vmrk")));
        assert_eq!(header.sampling.sfreq, 1000.0);
        assert_eq!(header.sampling.declared_samples, None);
        assert_eq!(header.sampling.encoding.format, BinaryFormat::Int16);
        assert_eq!(header.sampling.encoding.byte_order, ByteOrder::LittleEndian);
        assert_eq!(header.sampling.encoding.orientation, Orientation::Multiplexed);

        let names: Vec<&str> = header.channels.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["FP1", "HEOGL", "A,B"]);
        assert_eq!(header.channels[0].resolution, 0.5);
        assert_eq!(header.channels[0].unit_factor, 1e-6);
        assert_eq!(header.channels[2].resolution, 1.0);
        assert_eq!(header.channels[2].unit, "µV");

        let hp = header.highpass.unwrap();
        assert!((hp - 1.0 / (20.0 * std::f64::consts::PI)).abs() < 1e-12);
        assert_eq!(header.lowpass, Some(250.0));
    }

    #[test]
    fn test_channel_count_mismatch() {
        let text = HEADER.replace("NumberOfChannels=3", "NumberOfChannels=4");
        let err = VhdrHeader::parse(&text, Path::new("")).unwrap_err();
        assert!(err.is_format_error());

        let text = HEADER.replace("NumberOfChannels=3", "NumberOfChannels=2");
        assert!(VhdrHeader::parse(&text, Path::new("")).unwrap_err().is_format_error());
    }

    #[test]
    fn test_missing_required_fields() {
        for field in ["DataFile=test.eeg", "NumberOfChannels=3", "SamplingInterval=1000", "BinaryFormat=INT_16"] {
            let text = HEADER.replace(field, "");
            let err = VhdrHeader::parse(&text, Path::new("")).unwrap_err();
            assert!(err.is_format_error(), "removing {} gave {:?}", field, err);
        }
    }

    #[test]
    fn test_malformed_values() {
        let text = HEADER.replace("SamplingInterval=1000", "SamplingInterval=fast");
        assert!(VhdrHeader::parse(&text, Path::new("")).is_err());

        let text = HEADER.replace("SamplingInterval=1000", "SamplingInterval=0");
        assert!(VhdrHeader::parse(&text, Path::new("")).is_err());

        let text = HEADER.replace("BinaryFormat=INT_16", "BinaryFormat=INT_12");
        assert!(VhdrHeader::parse(&text, Path::new("")).is_err());

        let text = HEADER.replace("Brain Vision Data", "Some Other Data");
        assert!(VhdrHeader::parse(&text, Path::new("")).is_err());
    }

    #[test]
    fn test_unsupported_variants() {
        let text = HEADER.replace("DataFormat=BINARY", "DataFormat=ASCII");
        assert!(matches!(
            VhdrHeader::parse(&text, Path::new("")),
            Err(BvError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_big_endian_vectorized() {
        let text = HEADER
            .replace("DataOrientation=MULTIPLEXED", "DataOrientation=VECTORIZED")
            .replace("BinaryFormat=INT_16", "BinaryFormat=IEEE_FLOAT_32\nUseBigEndianOrder=YES");
        let header = VhdrHeader::parse(&text, Path::new("")).unwrap();
        assert_eq!(header.sampling.encoding.orientation, Orientation::Vectorized);
        assert_eq!(header.sampling.encoding.byte_order, ByteOrder::BigEndian);
        assert_eq!(header.sampling.encoding.format, BinaryFormat::Float32);
    }

    #[test]
    fn test_reserved_and_duplicate_names() {
        let text = HEADER.replace("Ch2=HEOGL", "Ch2=STI 014");
        assert!(VhdrHeader::parse(&text, Path::new("")).unwrap_err().is_format_error());

        let text = HEADER.replace("Ch2=HEOGL", "Ch2=FP1");
        assert!(VhdrHeader::parse(&text, Path::new("")).unwrap_err().is_format_error());
    }

    #[test]
    fn test_no_comment_section() {
        let end = HEADER.find("[Comment]").unwrap();
        let header = VhdrHeader::parse(&HEADER[..end], Path::new("")).unwrap();
        assert_eq!(header.highpass, None);
        assert_eq!(header.lowpass, None);
    }
}
