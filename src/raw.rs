use std::fmt;
use std::path::{Path, PathBuf};

use ndarray::{Array1, Array2};

use crate::decoder::{InMemoryMatrix, SampleSource, WindowedFileHandle};
use crate::error::{BvError, Result};
use crate::header::VhdrHeader;
use crate::markers::MarkerTable;
use crate::montage::Montage;
use crate::stim::{self, StimChannel};
use crate::types::{ChannelInfo, ChannelKind, Event, Info};
use crate::writer::RawWriter;
use crate::STIM_CHANNEL_NAME;

/// 默认按 EOG 处理的通道名
pub const DEFAULT_EOG_CHANNELS: [&str; 3] = ["HEOGL", "HEOGR", "VEOGb"];

/// Options for [`read_raw_brainvision`]
///
/// # Examples
///
/// ```rust
/// use brainvision::ReadOptions;
///
/// let options = ReadOptions::default()
///     .preload(true)
///     .misc(&["GSR"]);
/// assert!(options.preload);
/// assert_eq!(options.eog, vec!["HEOGL", "HEOGR", "VEOGb"]);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ReadOptions {
    /// 为 true 时立即解码全部数据，否则按需读取
    pub preload: bool,
    pub elp_path: Option<PathBuf>,
    /// ELP 文件中每个点对应的名字，`None` 表示跳过该点
    pub elp_names: Option<Vec<Option<String>>>,
    pub eog: Vec<String>,
    pub misc: Vec<String>,
}

impl Default for ReadOptions {
    fn default() -> Self {
        ReadOptions {
            preload: false,
            elp_path: None,
            elp_names: None,
            eog: DEFAULT_EOG_CHANNELS.iter().map(|s| s.to_string()).collect(),
            misc: Vec::new(),
        }
    }
}

impl ReadOptions {
    pub fn preload(mut self, preload: bool) -> Self {
        self.preload = preload;
        self
    }

    /// Electrode positions from an ELP file, one name per coordinate triple
    pub fn elp<P: AsRef<Path>>(mut self, path: P, names: Vec<Option<String>>) -> Self {
        self.elp_path = Some(path.as_ref().to_path_buf());
        self.elp_names = Some(names);
        self
    }

    pub fn eog(mut self, names: &[&str]) -> Self {
        self.eog = names.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn misc(mut self, names: &[&str]) -> Self {
        self.misc = names.iter().map(|s| s.to_string()).collect();
        self
    }

    fn kind_of(&self, name: &str) -> ChannelKind {
        if self.eog.iter().any(|n| n == name) {
            ChannelKind::Eog
        } else if self.misc.iter().any(|n| n == name) {
            ChannelKind::Misc
        } else {
            ChannelKind::Eeg
        }
    }
}

/// Size of the chunks streamed by [`Raw::save`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BufferSize {
    Seconds(f64),
    Samples(usize),
    /// 整个文件一次写出
    Whole,
}

impl BufferSize {
    /// Number of samples per buffer for a recording
    ///
    /// # Errors
    ///
    /// * `BvError::Validation` - Zero, negative or non-finite sizes
    pub fn samples(&self, sfreq: f64, n_samples: usize) -> Result<usize> {
        let samples = match *self {
            BufferSize::Seconds(seconds) => {
                if !seconds.is_finite() || seconds <= 0.0 {
                    return Err(BvError::Validation(format!(
                        "Buffer size must be positive, got {} s",
                        seconds
                    )));
                }
                (seconds * sfreq).ceil() as usize
            }
            BufferSize::Samples(0) => {
                return Err(BvError::Validation("Buffer size must be at least one sample".to_string()))
            }
            BufferSize::Samples(samples) => samples,
            BufferSize::Whole => n_samples,
        };
        Ok(samples.clamp(1, n_samples.max(1)))
    }
}

/// Options for [`Raw::save`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SaveOptions {
    pub buffer_size: BufferSize,
    pub overwrite: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        SaveOptions {
            buffer_size: BufferSize::Seconds(10.0),
            overwrite: false,
        }
    }
}

impl SaveOptions {
    pub fn buffer_size(mut self, buffer_size: BufferSize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }
}

/// A raw recording: metadata, data channels and the synthesized stim channel
///
/// Data channels are served by a [`SampleSource`], either fully in memory or
/// read on demand from the binary file. The stim channel `STI 014` is always
/// the last channel and lives in its own buffer; it is the only part of the
/// recording that can change, through [`Raw::set_events`].
///
/// Dropping a `Raw` closes its data file.
pub struct Raw {
    info: Info,
    source: Box<dyn SampleSource>,
    stim: StimChannel,
}

impl Raw {
    /// Assembles a recording; the stim channel must be the last entry of `info`
    pub(crate) fn from_parts(info: Info, source: Box<dyn SampleSource>, stim: StimChannel) -> Result<Self> {
        let stim_last = info.channels.last().map_or(false, |ch| ch.kind == ChannelKind::Stim);
        let stim_count = info.channels.iter().filter(|ch| ch.kind == ChannelKind::Stim).count();
        if !stim_last || stim_count != 1 {
            return Err(BvError::InvalidFormat(
                "Expected exactly one stim channel, as the last channel".to_string(),
            ));
        }
        if source.n_channels() + 1 != info.channels.len()
            || source.n_samples() != info.n_samples
            || stim.len() != info.n_samples
        {
            return Err(BvError::InvalidFormat(format!(
                "Inconsistent recording: {} channels x {} samples declared, data is {} x {}, stim has {}",
                info.channels.len(),
                info.n_samples,
                source.n_channels() + 1,
                source.n_samples(),
                stim.len()
            )));
        }
        Ok(Raw { info, source, stim })
    }

    pub fn info(&self) -> &Info {
        &self.info
    }

    /// Number of channels, stim channel included
    pub fn n_channels(&self) -> usize {
        self.info.n_channels()
    }

    pub fn n_samples(&self) -> usize {
        self.info.n_samples
    }

    pub fn sfreq(&self) -> f64 {
        self.info.sfreq
    }

    pub fn ch_names(&self) -> Vec<&str> {
        self.info.ch_names()
    }

    /// Index of the `STI 014` channel
    pub fn stim_index(&self) -> usize {
        self.info.n_channels() - 1
    }

    pub fn is_preloaded(&self) -> bool {
        self.source.is_in_memory()
    }

    /// Time of every sample, in seconds from the first sample
    pub fn times(&self) -> Array1<f64> {
        self.window_times(0, self.n_samples())
    }

    fn window_times(&self, start: usize, stop: usize) -> Array1<f64> {
        let sfreq = self.info.sfreq;
        Array1::from_shape_fn(stop - start, |i| (start + i) as f64 / sfreq)
    }

    /// Marks a channel as bad (or good again)
    pub fn set_bad(&mut self, index: usize, bad: bool) -> Result<()> {
        let channel = self
            .info
            .channels
            .get_mut(index)
            .ok_or(BvError::InvalidChannelIndex(index))?;
        channel.bad = bad;
        Ok(())
    }

    /// Samples `[start, stop)` of the channels in `picks`, in `picks` order
    ///
    /// Returns the matrix (one row per pick) and the matching time vector.
    ///
    /// # Errors
    ///
    /// * `BvError::InvalidChannelIndex` - A pick is not a channel index
    /// * `BvError::Validation` - The sample range is out of bounds
    /// * `BvError::Io` - A lazy read failed
    pub fn read_window(&mut self, picks: &[usize], start: usize, stop: usize) -> Result<(Array2<f64>, Array1<f64>)> {
        if let Some(&bad) = picks.iter().find(|&&p| p >= self.n_channels()) {
            return Err(BvError::InvalidChannelIndex(bad));
        }
        if start > stop || stop > self.n_samples() {
            return Err(BvError::Validation(format!(
                "Sample range {}..{} out of bounds (n_samples = {})",
                start,
                stop,
                self.n_samples()
            )));
        }

        let n_data = self.source.n_channels();
        let len = stop - start;
        let block = if picks.iter().any(|&p| p < n_data) {
            self.source.read_window(start, stop)?
        } else {
            Array2::zeros((0, len))
        };

        let mut data = Array2::zeros((picks.len(), len));
        for (row, &pick) in picks.iter().enumerate() {
            if pick < n_data {
                data.row_mut(row).assign(&block.row(pick));
            } else {
                data.row_mut(row).assign(&Array1::from(self.stim.window(start, stop)));
            }
        }

        Ok((data, self.window_times(start, stop)))
    }

    /// All samples of the channels in `picks`, with the time vector
    ///
    /// # Examples
    ///
    /// ```rust
    /// use brainvision::{read_raw_brainvision, ReadOptions};
    ///
    /// # let dir = std::env::temp_dir().join("brainvision_doc_get_channels");
    /// # let vhdr = brainvision::doctest_utils::write_reference_recording(&dir)?;
    /// let mut raw = read_raw_brainvision(&vhdr, &ReadOptions::default())?;
    /// let (data, times) = raw.get_channels_by_indices(&[2, 0])?;
    /// assert_eq!(data.nrows(), 2);
    /// assert_eq!(times.len(), raw.n_samples());
    /// assert_eq!(times[1000], 1.0);
    /// # drop(raw);
    /// # std::fs::remove_dir_all(&dir).ok();
    /// # Ok::<(), brainvision::BvError>(())
    /// ```
    pub fn get_channels_by_indices(&mut self, picks: &[usize]) -> Result<(Array2<f64>, Array1<f64>)> {
        let n_samples = self.n_samples();
        self.read_window(picks, 0, n_samples)
    }

    /// The full matrix, stim channel included as the last row
    pub fn data(&mut self) -> Result<Array2<f64>> {
        let picks: Vec<usize> = (0..self.n_channels()).collect();
        Ok(self.get_channels_by_indices(&picks)?.0)
    }

    /// Decodes the whole recording into memory and releases the data file
    ///
    /// Does nothing when the data is already loaded.
    pub fn load_data(&mut self) -> Result<()> {
        if self.source.is_in_memory() {
            return Ok(());
        }
        let data = self.source.read_window(0, self.n_samples())?;
        self.source = Box::new(InMemoryMatrix::new(data));
        log::debug!("Loaded {} x {} samples into memory", self.n_channels(), self.n_samples());
        Ok(())
    }

    /// Events encoded in the stim channel, by onset
    pub fn get_events(&self) -> Vec<Event> {
        stim::extract(&self.stim)
    }

    /// Rewrites the stim channel from `events`
    ///
    /// # Errors
    ///
    /// * `BvError::Validation` - An onset is outside `[0, n_samples)` or a
    ///   code is 0; the stim channel is left unchanged
    ///
    /// # Examples
    ///
    /// ```rust
    /// use brainvision::{read_raw_brainvision, ReadOptions};
    ///
    /// # let dir = std::env::temp_dir().join("brainvision_doc_set_events");
    /// # let vhdr = brainvision::doctest_utils::write_reference_recording(&dir)?;
    /// let mut raw = read_raw_brainvision(&vhdr, &ReadOptions::default().preload(true))?;
    ///
    /// // 只保留事件码 255
    /// let kept: Vec<_> = raw.get_events().into_iter().filter(|e| e.code == 255).collect();
    /// raw.set_events(&kept)?;
    /// assert_eq!(raw.get_events(), kept);
    /// # drop(raw);
    /// # std::fs::remove_dir_all(&dir).ok();
    /// # Ok::<(), brainvision::BvError>(())
    /// ```
    pub fn set_events(&mut self, events: &[Event]) -> Result<()> {
        stim::replace(&mut self.stim, events)
    }

    /// Writes the recording to a raw signal container
    ///
    /// The data is streamed in chunks of `options.buffer_size` samples. The
    /// chunk size changes neither the file content nor what is read back.
    ///
    /// # Errors
    ///
    /// * `BvError::Validation` - Invalid buffer size, or the file exists and
    ///   `overwrite` is false
    /// * `BvError::Io` - Writing failed; the file is left marked incomplete
    pub fn save<P: AsRef<Path>>(&mut self, path: P, options: &SaveOptions) -> Result<()> {
        let n_samples = self.n_samples();
        let chunk = options.buffer_size.samples(self.sfreq(), n_samples)?;
        let picks: Vec<usize> = (0..self.n_channels()).collect();

        let mut writer = RawWriter::create(path.as_ref(), &self.info, options.overwrite)?;
        let mut start = 0;
        while start < n_samples {
            let stop = (start + chunk).min(n_samples);
            let (block, _) = self.read_window(&picks, start, stop)?;
            writer.write_buffer(block.view())?;
            start = stop;
        }
        writer.finalize()?;

        log::debug!("Saved {} in buffers of {} samples", path.as_ref().display(), chunk);
        Ok(())
    }
}

impl fmt::Display for Raw {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<Raw  |  n_channels x n_times : {} x {} ({:.1} sec), {}>",
            self.n_channels(),
            self.n_samples(),
            self.info.duration(),
            if self.is_preloaded() { "data loaded" } else { "data not loaded" }
        )
    }
}

impl fmt::Debug for Raw {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Raw")
            .field("info", &self.info)
            .field("preloaded", &self.is_preloaded())
            .finish()
    }
}

pub(crate) fn stim_channel_info() -> ChannelInfo {
    ChannelInfo {
        name: STIM_CHANNEL_NAME.to_string(),
        reference: String::new(),
        unit: String::new(),
        resolution: 1.0,
        unit_factor: 1.0,
        kind: ChannelKind::Stim,
        bad: false,
        loc: None,
    }
}

/// Reads a BrainVision recording from its `.vhdr` header
///
/// The header and marker file are parsed and cross-checked immediately; the
/// binary data is decoded now (`preload`) or on demand. Stimulus and response
/// markers are synthesized into the `STI 014` channel.
///
/// # Errors
///
/// * `BvError::FileNotFound` - The header, data, marker or ELP file is missing
/// * `BvError::InvalidFormat` - Malformed header or markers, a data file size
///   inconsistent with the header, or markers beyond the end of the data
/// * `BvError::Validation` - `elp_path` given without `elp_names`
///
/// # Examples
///
/// ```rust
/// use brainvision::{read_raw_brainvision, ReadOptions};
///
/// # let dir = std::env::temp_dir().join("brainvision_doc_read_raw");
/// # let vhdr = brainvision::doctest_utils::write_reference_recording(&dir)?;
/// let raw = read_raw_brainvision(&vhdr, &ReadOptions::default())?;
/// println!("{}", raw);
/// println!("{}", raw.info());
///
/// assert_eq!(raw.ch_names().last(), Some(&"STI 014"));
/// assert_eq!(raw.get_events().len(), 10);
/// assert!(!raw.is_preloaded());
/// # drop(raw);
/// # std::fs::remove_dir_all(&dir).ok();
/// # Ok::<(), brainvision::BvError>(())
/// ```
pub fn read_raw_brainvision<P: AsRef<Path>>(vhdr_path: P, options: &ReadOptions) -> Result<Raw> {
    let montage = match (&options.elp_path, &options.elp_names) {
        (Some(path), Some(names)) => Some(Montage::read_elp(path, names)?),
        (Some(_), None) => {
            return Err(BvError::Validation("elp_path requires elp_names".to_string()))
        }
        (None, _) => None,
    };

    let header = VhdrHeader::from_file(vhdr_path.as_ref())?;
    let encoding = header.sampling.encoding;
    let declared = header.sampling.declared_samples;

    let source: Box<dyn SampleSource> = if options.preload {
        Box::new(InMemoryMatrix::from_file(&header.data_file, encoding, header.cals(), declared)?)
    } else {
        Box::new(WindowedFileHandle::open(&header.data_file, encoding, header.cals(), declared, 0)?)
    };
    let n_samples = source.n_samples();

    let markers = match &header.marker_file {
        Some(path) => MarkerTable::from_file(path)?,
        None => MarkerTable::default(),
    };
    markers.validate(n_samples)?;
    let events = markers.events();

    let mut channels: Vec<ChannelInfo> = header
        .channels
        .iter()
        .cloned()
        .map(|mut ch| {
            ch.kind = options.kind_of(&ch.name);
            ch
        })
        .collect();
    channels.push(stim_channel_info());

    let sfreq = header.sampling.sfreq;
    let mut info = Info {
        channels,
        sfreq,
        n_samples,
        meas_date: markers.meas_date(),
        highpass: header.highpass.unwrap_or(0.0),
        lowpass: header.lowpass.unwrap_or(sfreq / 2.0),
        dig: Vec::new(),
    };
    if let Some(montage) = &montage {
        montage.apply(&mut info);
    }

    log::debug!(
        "Read {}: {} channels, {} samples, {} events",
        vhdr_path.as_ref().display(),
        info.channels.len(),
        n_samples,
        events.len()
    );

    let stim = stim::synthesize(&events, n_samples);
    Raw::from_parts(info, source, stim)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doctest_utils::{write_recording, RecordingSpec};

    #[test]
    fn test_buffer_size_samples() {
        assert_eq!(BufferSize::Seconds(2.0).samples(1000.0, 7000).unwrap(), 2000);
        assert_eq!(BufferSize::Seconds(0.0001).samples(1000.0, 7000).unwrap(), 1);
        assert_eq!(BufferSize::Samples(1).samples(1000.0, 7000).unwrap(), 1);
        assert_eq!(BufferSize::Samples(10_000).samples(1000.0, 7000).unwrap(), 7000);
        assert_eq!(BufferSize::Whole.samples(1000.0, 7000).unwrap(), 7000);
        assert!(BufferSize::Samples(0).samples(1000.0, 7000).is_err());
        assert!(BufferSize::Seconds(-1.0).samples(1000.0, 7000).is_err());
        assert!(BufferSize::Seconds(f64::NAN).samples(1000.0, 7000).is_err());
    }

    #[test]
    fn test_channel_kinds_from_options() {
        let dir = tempfile::tempdir().unwrap();
        let vhdr = write_recording(dir.path(), "kinds", &RecordingSpec::default()).unwrap();

        let raw = read_raw_brainvision(&vhdr, &ReadOptions::default().misc(&["A1"])).unwrap();
        let kind = |name: &str| {
            raw.info().channels.iter().find(|c| c.name == name).map(|c| c.kind)
        };
        assert_eq!(kind("FP1"), Some(ChannelKind::Eeg));
        assert_eq!(kind("HEOGL"), Some(ChannelKind::Eog));
        assert_eq!(kind("A1"), Some(ChannelKind::Misc));
        assert_eq!(kind(STIM_CHANNEL_NAME), Some(ChannelKind::Stim));
    }

    #[test]
    fn test_picks_and_ranges() {
        let dir = tempfile::tempdir().unwrap();
        let vhdr = write_recording(dir.path(), "picks", &RecordingSpec::default()).unwrap();
        let mut raw = read_raw_brainvision(&vhdr, &ReadOptions::default()).unwrap();

        let n = raw.n_channels();
        assert!(matches!(raw.read_window(&[n], 0, 10), Err(BvError::InvalidChannelIndex(_))));
        assert!(raw.read_window(&[0], 10, 5).unwrap_err().is_validation_error());
        assert!(raw.read_window(&[0], 0, raw.n_samples() + 1).is_err());

        // 只取刺激通道时不读数据文件
        let stim = raw.stim_index();
        let (data, times) = raw.read_window(&[stim], 480, 500).unwrap();
        assert_eq!(data[[0, 7]], 253.0);
        assert_eq!(data[[0, 17]], 255.0);
        assert_eq!(data[[0, 0]], 0.0);
        assert_eq!(times[0], 0.48);
    }

    #[test]
    fn test_load_data_switches_source() {
        let dir = tempfile::tempdir().unwrap();
        let vhdr = write_recording(dir.path(), "load", &RecordingSpec::default()).unwrap();
        let mut raw = read_raw_brainvision(&vhdr, &ReadOptions::default()).unwrap();

        let before = raw.data().unwrap();
        assert!(!raw.is_preloaded());
        raw.load_data().unwrap();
        assert!(raw.is_preloaded());
        assert_eq!(raw.data().unwrap(), before);
        raw.load_data().unwrap();
    }

    #[test]
    fn test_set_bad() {
        let dir = tempfile::tempdir().unwrap();
        let vhdr = write_recording(dir.path(), "bads", &RecordingSpec::default()).unwrap();
        let mut raw = read_raw_brainvision(&vhdr, &ReadOptions::default()).unwrap();

        raw.set_bad(1, true).unwrap();
        assert_eq!(raw.info().bads(), vec!["VEOGt"]);
        assert!(raw.set_bad(raw.n_channels(), true).is_err());
    }

    #[test]
    fn test_elp_requires_names() {
        let dir = tempfile::tempdir().unwrap();
        let vhdr = write_recording(dir.path(), "elp", &RecordingSpec::default()).unwrap();
        let options = ReadOptions {
            elp_path: Some(dir.path().join("missing.elp")),
            ..ReadOptions::default()
        };
        assert!(read_raw_brainvision(&vhdr, &options).unwrap_err().is_validation_error());
    }

    #[test]
    fn test_display() {
        let dir = tempfile::tempdir().unwrap();
        let vhdr = write_recording(dir.path(), "repr", &RecordingSpec::default()).unwrap();
        let raw = read_raw_brainvision(&vhdr, &ReadOptions::default()).unwrap();
        let text = raw.to_string();
        assert!(text.contains("42 x 7000"), "{}", text);
        assert!(text.contains("data not loaded"));
        assert!(raw.info().to_string().contains("STI 014"));
    }
}
