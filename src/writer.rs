use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, WriteBytesExt};
use ndarray::ArrayView2;

use crate::error::{BvError, Result};
use crate::types::{DigPoint, Info};
use crate::utils::{format_float, put_field};

/// 容器文件标识（8字节）
pub(crate) const RSC_MAGIC: &str = "RSC 1.0";
pub(crate) const STATUS_COMPLETE: &str = "COMPLETE";
pub(crate) const STATUS_PARTIAL: &str = "PARTIAL";
/// 状态字段紧跟在标识之后
pub(crate) const STATUS_OFFSET: u64 = 8;

pub(crate) const MAIN_HEADER_BYTES: usize = 256;
pub(crate) const CHANNEL_RECORD_BYTES: usize = 256;
pub(crate) const DIG_RECORD_BYTES: usize = 128;

pub(crate) const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";
/// 缺省字段的占位符
pub(crate) const UNSET: &str = "X";

/// Total header size for a recording
pub(crate) fn header_bytes(n_channels: usize, n_dig: usize) -> usize {
    MAIN_HEADER_BYTES + n_channels * CHANNEL_RECORD_BYTES + n_dig * DIG_RECORD_BYTES
}

/// Streaming writer for the raw signal container
///
/// The container starts with a fixed-width ASCII header (recording metadata,
/// one record per channel, one per digitized point) followed by the samples as
/// little-endian `f64`, multiplexed. The header is written first with status
/// `PARTIAL`; [`RawWriter::finalize`] patches it to `COMPLETE` once every
/// sample has been written, so an interrupted save is never mistaken for a
/// complete file.
///
/// Most callers use [`crate::Raw::save`], which drives this writer.
///
/// # Examples
///
/// ```rust
/// use brainvision::{ChannelInfo, ChannelKind, Info, RawReader, RawWriter};
/// use ndarray::array;
///
/// let channel = |name: &str, kind| ChannelInfo {
///     name: name.to_string(),
///     reference: String::new(),
///     unit: "µV".to_string(),
///     resolution: 1.0,
///     unit_factor: 1e-6,
///     kind,
///     bad: false,
///     loc: None,
/// };
/// let info = Info {
///     channels: vec![channel("Cz", ChannelKind::Eeg), channel("STI 014", ChannelKind::Stim)],
///     sfreq: 100.0,
///     n_samples: 4,
///     meas_date: None,
///     highpass: 0.0,
///     lowpass: 50.0,
///     dig: Vec::new(),
/// };
///
/// let path = std::env::temp_dir().join("brainvision_doc_writer.rsc");
/// let mut writer = RawWriter::create(&path, &info, true)?;
/// writer.write_buffer(array![[1e-6, 2e-6], [0.0, 5.0]].view())?;
/// writer.write_buffer(array![[3e-6, 4e-6], [0.0, 0.0]].view())?;
/// writer.finalize()?;
///
/// let mut reader = RawReader::open(&path)?;
/// assert_eq!(reader.info(), &info);
/// assert_eq!(reader.read_all()?[[1, 1]], 5.0);
///
/// # drop(reader);
/// # std::fs::remove_file(&path).ok();
/// # Ok::<(), brainvision::BvError>(())
/// ```
pub struct RawWriter {
    file: BufWriter<File>,
    path: PathBuf,
    n_channels: usize,
    n_samples: usize,
    samples_written: usize,
}

impl RawWriter {
    /// Creates the container file and writes its header
    ///
    /// # Errors
    ///
    /// * `BvError::Validation` - `path` exists and `overwrite` is false, or the
    ///   metadata does not fit the header fields
    /// * `BvError::FileNotFound` - The file cannot be created
    pub fn create<P: AsRef<Path>>(path: P, info: &Info, overwrite: bool) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() && !overwrite {
            return Err(BvError::Validation(format!(
                "{} already exists, pass overwrite to replace it",
                path.display()
            )));
        }

        // 先生成头部，字段不合法时不创建文件
        let header = encode_header(info)?;

        let file = File::create(path)
            .map_err(|e| BvError::FileNotFound(format!("{}: {}", path.display(), e)))?;
        let mut file = BufWriter::new(file);
        file.write_all(&header)?;

        log::debug!(
            "Writing {} ({} channels x {} samples, {} header bytes)",
            path.display(),
            info.channels.len(),
            info.n_samples,
            header.len()
        );

        Ok(RawWriter {
            file,
            path: path.to_path_buf(),
            n_channels: info.channels.len(),
            n_samples: info.n_samples,
            samples_written: 0,
        })
    }

    pub fn samples_written(&self) -> usize {
        self.samples_written
    }

    /// Appends a block of samples (channels × samples, physical units)
    ///
    /// Blocks may have any width; the file content only depends on the
    /// concatenation of all blocks.
    ///
    /// # Errors
    ///
    /// * `BvError::Validation` - Wrong number of rows, or more samples than the
    ///   header declares
    /// * `BvError::Io` - Writing failed
    pub fn write_buffer(&mut self, block: ArrayView2<'_, f64>) -> Result<()> {
        if block.nrows() != self.n_channels {
            return Err(BvError::Validation(format!(
                "Buffer has {} channels, expected {}",
                block.nrows(),
                self.n_channels
            )));
        }
        if self.samples_written + block.ncols() > self.n_samples {
            return Err(BvError::Validation(format!(
                "Buffer of {} samples exceeds the declared {} samples ({} already written)",
                block.ncols(),
                self.n_samples,
                self.samples_written
            )));
        }

        // 多路复用：逐个时间点写出所有通道
        for column in block.columns() {
            for &value in column.iter() {
                self.file.write_f64::<LittleEndian>(value)?;
            }
        }
        self.samples_written += block.ncols();
        log::trace!("Wrote {}/{} samples", self.samples_written, self.n_samples);
        Ok(())
    }

    /// Flushes the data and marks the file complete
    ///
    /// # Errors
    ///
    /// * `BvError::Validation` - Fewer samples were written than declared; the
    ///   file keeps its `PARTIAL` status
    /// * `BvError::Io` - Flushing or patching the header failed
    pub fn finalize(mut self) -> Result<()> {
        self.file.flush()?;
        if self.samples_written != self.n_samples {
            return Err(BvError::Validation(format!(
                "Only {} of {} samples were written to {}",
                self.samples_written,
                self.n_samples,
                self.path.display()
            )));
        }

        // 数据全部写入后回写状态字段
        let mut file = self
            .file
            .into_inner()
            .map_err(|e| e.into_error())?;
        file.seek(SeekFrom::Start(STATUS_OFFSET))?;
        let mut status = [b' '; 8];
        put_field(&mut status, 0, 8, STATUS_COMPLETE, "status")?;
        file.write_all(&status)?;
        file.flush()?;

        log::debug!("Finalized {}", self.path.display());
        Ok(())
    }
}

fn encode_header(info: &Info) -> Result<Vec<u8>> {
    if info.channels.is_empty() {
        return Err(BvError::Validation("Cannot write a recording without channels".to_string()));
    }
    if info.n_samples == 0 {
        return Err(BvError::Validation("Cannot write a recording without samples".to_string()));
    }
    for (value, what) in [(info.sfreq, "sfreq"), (info.highpass, "highpass"), (info.lowpass, "lowpass")] {
        if !value.is_finite() {
            return Err(BvError::Validation(format!("{} must be finite, got {}", what, value)));
        }
    }
    if info.sfreq <= 0.0 {
        return Err(BvError::Validation(format!("sfreq must be positive, got {}", info.sfreq)));
    }

    let total = header_bytes(info.channels.len(), info.dig.len());
    let mut header = vec![b' '; total];

    // 主头部 (256字节)
    let main = &mut header[..MAIN_HEADER_BYTES];
    put_field(main, 0, 8, RSC_MAGIC, "magic")?;
    put_field(main, 8, 8, STATUS_PARTIAL, "status")?;
    let date = match &info.meas_date {
        Some(date) => date.format(DATE_FORMAT).to_string(),
        None => UNSET.to_string(),
    };
    put_field(main, 16, 32, &date, "measurement date")?;
    put_field(main, 48, 24, &format_float(info.sfreq), "sfreq")?;
    put_field(main, 72, 16, &info.n_samples.to_string(), "sample count")?;
    put_field(main, 88, 8, &info.channels.len().to_string(), "channel count")?;
    put_field(main, 96, 8, &info.dig.len().to_string(), "dig count")?;
    put_field(main, 104, 8, &total.to_string(), "header size")?;
    put_field(main, 112, 24, &format_float(info.highpass), "highpass")?;
    put_field(main, 136, 24, &format_float(info.lowpass), "lowpass")?;

    // 通道记录，每个 256 字节
    let channels_start = MAIN_HEADER_BYTES;
    for (i, channel) in info.channels.iter().enumerate() {
        let start = channels_start + i * CHANNEL_RECORD_BYTES;
        let record = &mut header[start..start + CHANNEL_RECORD_BYTES];
        for (value, what) in [(channel.resolution, "resolution"), (channel.unit_factor, "unit factor")] {
            if !value.is_finite() {
                return Err(BvError::Validation(format!(
                    "Channel '{}' has a non-finite {}",
                    channel.name, what
                )));
            }
        }
        put_field(record, 0, 32, &channel.name, "channel name")?;
        put_field(record, 32, 16, &channel.reference, "channel reference")?;
        put_field(record, 48, 16, &channel.unit, "channel unit")?;
        put_field(record, 64, 8, channel.kind.as_str(), "channel kind")?;
        put_field(record, 72, 24, &format_float(channel.resolution), "resolution")?;
        put_field(record, 96, 24, &format_float(channel.unit_factor), "unit factor")?;
        put_field(record, 120, 8, if channel.bad { "1" } else { "0" }, "bad flag")?;
        match channel.loc {
            Some(loc) => put_point(record, 128, loc)?,
            None => {
                for axis in 0..3 {
                    put_field(record, 128 + axis * 24, 24, UNSET, "location")?;
                }
            }
        }
    }

    // 数字化点记录，每个 128 字节
    let dig_start = channels_start + info.channels.len() * CHANNEL_RECORD_BYTES;
    for (i, point) in info.dig.iter().enumerate() {
        let start = dig_start + i * DIG_RECORD_BYTES;
        put_dig(&mut header[start..start + DIG_RECORD_BYTES], point)?;
    }

    Ok(header)
}

fn put_point(record: &mut [u8], start: usize, r: [f64; 3]) -> Result<()> {
    for (axis, value) in r.iter().enumerate() {
        if !value.is_finite() {
            return Err(BvError::Validation(format!("Non-finite coordinate {}", value)));
        }
        put_field(record, start + axis * 24, 24, &format_float(*value), "coordinate")?;
    }
    Ok(())
}

fn put_dig(record: &mut [u8], point: &DigPoint) -> Result<()> {
    put_field(record, 0, 16, point.kind.as_str(), "dig kind")?;
    put_field(record, 16, 32, &point.ident, "dig ident")?;
    put_point(record, 48, point.r)
}
