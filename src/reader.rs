use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use chrono::NaiveDateTime;
use ndarray::{s, Array2};

use crate::decoder::{InMemoryMatrix, SampleSource, WindowedFileHandle};
use crate::error::{BvError, Result};
use crate::raw::Raw;
use crate::stim::StimChannel;
use crate::types::{
    BinaryFormat, ByteOrder, ChannelInfo, ChannelKind, DigKind, DigPoint, Encoding, Info, Orientation,
};
use crate::utils::{parse_f64_field, parse_usize_field, read_field};
use crate::writer::{
    header_bytes, CHANNEL_RECORD_BYTES, DATE_FORMAT, DIG_RECORD_BYTES, MAIN_HEADER_BYTES, RSC_MAGIC,
    STATUS_COMPLETE, STATUS_PARTIAL, UNSET,
};

/// Reader for raw signal container files written by [`crate::RawWriter`]
///
/// Opening a container parses and checks the whole header; samples are read
/// on demand through [`RawReader::read_window`] or all at once.
///
/// # Examples
///
/// ```rust
/// use brainvision::{read_raw_brainvision, RawReader, ReadOptions, SaveOptions};
///
/// # let dir = std::env::temp_dir().join("brainvision_doc_reader");
/// # let vhdr = brainvision::doctest_utils::write_reference_recording(&dir)?;
/// let mut raw = read_raw_brainvision(&vhdr, &ReadOptions::default())?;
/// let path = dir.join("recording.rsc");
/// raw.save(&path, &SaveOptions::default().overwrite(true))?;
///
/// let mut reader = RawReader::open(&path)?;
/// assert_eq!(reader.info(), raw.info());
///
/// // 只读取前 100 个样本
/// let window = reader.read_window(0, 100)?;
/// assert_eq!(window.dim(), (42, 100));
/// # drop(reader);
/// # drop(raw);
/// # std::fs::remove_dir_all(&dir).ok();
/// # Ok::<(), brainvision::BvError>(())
/// ```
pub struct RawReader {
    info: Info,
    handle: WindowedFileHandle,
}

impl RawReader {
    /// Opens a container and parses its header
    ///
    /// # Errors
    ///
    /// * `BvError::FileNotFound` - The file cannot be opened
    /// * `BvError::InvalidFormat` - Not a container, an incomplete (`PARTIAL`)
    ///   file, a malformed header, or a data size that does not match it
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| BvError::FileNotFound(format!("{}: {}", path.display(), e)))?;
        let mut reader = BufReader::new(file);
        let (info, data_offset) = parse_header(&mut reader, path)?;
        drop(reader);

        let encoding = Encoding::new(BinaryFormat::Float64, ByteOrder::LittleEndian, Orientation::Multiplexed);
        let handle = WindowedFileHandle::open(
            path,
            encoding,
            vec![1.0; info.channels.len()],
            Some(info.n_samples),
            data_offset as u64,
        )?;

        log::debug!(
            "Opened container {} ({} channels x {} samples)",
            path.display(),
            info.channels.len(),
            info.n_samples
        );
        Ok(RawReader { info, handle })
    }

    pub fn info(&self) -> &Info {
        &self.info
    }

    pub fn path(&self) -> &Path {
        self.handle.path()
    }

    /// Samples `[start, stop)` of every channel
    pub fn read_window(&mut self, start: usize, stop: usize) -> Result<Array2<f64>> {
        self.handle.read_window(start, stop)
    }

    pub fn read_all(&mut self) -> Result<Array2<f64>> {
        let n_samples = self.info.n_samples;
        self.handle.read_window(0, n_samples)
    }

    /// Loads the container into a preloaded [`Raw`]
    ///
    /// # Errors
    ///
    /// * `BvError::InvalidFormat` - The last channel is not the only stim
    ///   channel, or it holds values that are not event codes
    pub fn into_raw(mut self) -> Result<Raw> {
        let data = self.read_all()?;
        let n_channels = self.info.channels.len();
        let stim_ok = self.info.channels[n_channels - 1].kind == ChannelKind::Stim;
        if !stim_ok {
            return Err(BvError::InvalidFormat(format!(
                "{}: the last channel is not a stim channel",
                self.path().display()
            )));
        }

        let stim_values: Vec<f64> = data.row(n_channels - 1).to_vec();
        let stim = StimChannel::from_values(&stim_values)?;
        let signals = data.slice(s![..n_channels - 1, ..]).to_owned();

        Raw::from_parts(self.info, Box::new(InMemoryMatrix::new(signals)), stim)
    }
}

/// Reads a container written by [`Raw::save`]
///
/// The result is preloaded and compares equal to the saved recording: same
/// metadata, same samples and the same events.
pub fn read_raw<P: AsRef<Path>>(path: P) -> Result<Raw> {
    RawReader::open(path)?.into_raw()
}

fn read_block<R: Read>(reader: &mut R, len: usize, path: &Path) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => {
            BvError::InvalidFormat(format!("{}: truncated container header", path.display()))
        }
        _ => BvError::Io(e),
    })?;
    Ok(buf)
}

/// 解析容器头部，返回元数据与数据区偏移
fn parse_header<R: Read>(reader: &mut R, path: &Path) -> Result<(Info, usize)> {
    let main = read_block(reader, MAIN_HEADER_BYTES, path)?;

    let magic = read_field(&main, 0, 8);
    if magic != RSC_MAGIC {
        return Err(BvError::InvalidFormat(format!(
            "{}: not a raw signal container ('{}')",
            path.display(),
            magic
        )));
    }
    match read_field(&main, 8, 8).as_str() {
        STATUS_COMPLETE => {}
        STATUS_PARTIAL => {
            return Err(BvError::InvalidFormat(format!(
                "{}: incomplete file, the write was never finalized",
                path.display()
            )))
        }
        other => {
            return Err(BvError::InvalidFormat(format!("{}: unknown status '{}'", path.display(), other)))
        }
    }

    let date = read_field(&main, 16, 32);
    let meas_date = if date == UNSET {
        None
    } else {
        Some(
            NaiveDateTime::parse_from_str(&date, DATE_FORMAT)
                .map_err(|e| BvError::InvalidFormat(format!("Invalid measurement date '{}': {}", date, e)))?,
        )
    };

    let sfreq = parse_f64_field(&read_field(&main, 48, 24), "sfreq")?;
    if sfreq <= 0.0 {
        return Err(BvError::InvalidFormat(format!("Invalid sampling frequency {}", sfreq)));
    }
    let n_samples = parse_usize_field(&read_field(&main, 72, 16), "sample count")?;
    let n_channels = parse_usize_field(&read_field(&main, 88, 8), "channel count")?;
    let n_dig = parse_usize_field(&read_field(&main, 96, 8), "dig count")?;
    let declared_header = parse_usize_field(&read_field(&main, 104, 8), "header size")?;
    if n_channels == 0 || declared_header != header_bytes(n_channels, n_dig) {
        return Err(BvError::InvalidFormat(format!(
            "{}: header size {} does not match {} channels and {} dig points",
            path.display(),
            declared_header,
            n_channels,
            n_dig
        )));
    }
    let highpass = parse_f64_field(&read_field(&main, 112, 24), "highpass")?;
    let lowpass = parse_f64_field(&read_field(&main, 136, 24), "lowpass")?;

    let records = read_block(reader, n_channels * CHANNEL_RECORD_BYTES, path)?;
    let channels = records
        .chunks_exact(CHANNEL_RECORD_BYTES)
        .map(parse_channel_record)
        .collect::<Result<Vec<_>>>()?;

    let records = read_block(reader, n_dig * DIG_RECORD_BYTES, path)?;
    let dig = records
        .chunks_exact(DIG_RECORD_BYTES)
        .map(parse_dig_record)
        .collect::<Result<Vec<_>>>()?;

    let info = Info {
        channels,
        sfreq,
        n_samples,
        meas_date,
        highpass,
        lowpass,
        dig,
    };
    Ok((info, declared_header))
}

fn parse_channel_record(record: &[u8]) -> Result<ChannelInfo> {
    let name = read_field(record, 0, 32);
    let kind_tag = read_field(record, 64, 8);
    let kind = ChannelKind::from_tag(&kind_tag)
        .ok_or_else(|| BvError::InvalidFormat(format!("Channel '{}' has unknown kind '{}'", name, kind_tag)))?;
    let bad = match read_field(record, 120, 8).as_str() {
        "0" => false,
        "1" => true,
        other => {
            return Err(BvError::InvalidFormat(format!("Channel '{}' has bad flag '{}'", name, other)))
        }
    };

    let loc = if read_field(record, 128, 24) == UNSET {
        None
    } else {
        Some(parse_point(record, 128)?)
    };

    Ok(ChannelInfo {
        reference: read_field(record, 32, 16),
        unit: read_field(record, 48, 16),
        resolution: parse_f64_field(&read_field(record, 72, 24), "resolution")?,
        unit_factor: parse_f64_field(&read_field(record, 96, 24), "unit factor")?,
        kind,
        bad,
        loc,
        name,
    })
}

fn parse_dig_record(record: &[u8]) -> Result<DigPoint> {
    let tag = read_field(record, 0, 16);
    let kind = DigKind::from_tag(&tag)
        .ok_or_else(|| BvError::InvalidFormat(format!("Unknown dig point kind '{}'", tag)))?;
    Ok(DigPoint {
        kind,
        ident: read_field(record, 16, 32),
        r: parse_point(record, 48)?,
    })
}

fn parse_point(record: &[u8], start: usize) -> Result<[f64; 3]> {
    let mut r = [0.0; 3];
    for (axis, value) in r.iter_mut().enumerate() {
        *value = parse_f64_field(&read_field(record, start + axis * 24, 24), "coordinate")?;
    }
    Ok(r)
}
