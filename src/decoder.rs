use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use byteorder::{BigEndian, LittleEndian};
use ndarray::{s, Array2};

use crate::error::{BvError, Result};
use crate::types::{BinaryFormat, ByteOrder, Encoding, Orientation};

/// Read access to a channels × samples matrix in physical units
///
/// Implemented by [`InMemoryMatrix`] (eager) and [`WindowedFileHandle`] (lazy).
/// Both decode through [`decode_samples`], so the same window yields the same
/// values whichever implementation serves it.
pub trait SampleSource {
    fn n_channels(&self) -> usize;

    fn n_samples(&self) -> usize;

    /// Decodes samples `[start, stop)` of every channel
    ///
    /// # Errors
    ///
    /// * `BvError::Validation` - `start > stop` or `stop > n_samples`
    /// * `BvError::Io` - The underlying file could not be read
    fn read_window(&mut self, start: usize, stop: usize) -> Result<Array2<f64>>;

    /// Whether the full matrix already lives in memory
    fn is_in_memory(&self) -> bool;
}

fn check_window(start: usize, stop: usize, n_samples: usize) -> Result<()> {
    if start > stop || stop > n_samples {
        return Err(BvError::Validation(format!(
            "Sample range {}..{} out of bounds (n_samples = {})",
            start, stop, n_samples
        )));
    }
    Ok(())
}

/// 将原始字节按编码解析为数值（尚未乘以校准系数）
pub fn decode_samples(encoding: &Encoding, bytes: &[u8]) -> Vec<f64> {
    match encoding.byte_order {
        ByteOrder::LittleEndian => decode_with::<LittleEndian>(encoding.format, bytes),
        ByteOrder::BigEndian => decode_with::<BigEndian>(encoding.format, bytes),
    }
}

fn decode_with<E: byteorder::ByteOrder>(format: BinaryFormat, bytes: &[u8]) -> Vec<f64> {
    let width = format.bytes_per_sample();
    bytes
        .chunks_exact(width)
        .map(|chunk| match format {
            BinaryFormat::Int16 => E::read_i16(chunk) as f64,
            BinaryFormat::UInt16 => E::read_u16(chunk) as f64,
            BinaryFormat::Int32 => E::read_i32(chunk) as f64,
            BinaryFormat::Float32 => E::read_f32(chunk) as f64,
            BinaryFormat::Float64 => E::read_f64(chunk),
        })
        .collect()
}

/// Fully decoded sample matrix
#[derive(Debug, Clone)]
pub struct InMemoryMatrix {
    data: Array2<f64>,
}

impl InMemoryMatrix {
    pub fn new(data: Array2<f64>) -> Self {
        InMemoryMatrix { data }
    }

    /// Decodes a whole binary file at once
    pub fn from_file<P: AsRef<Path>>(
        path: P,
        encoding: Encoding,
        cals: Vec<f64>,
        declared_samples: Option<usize>,
    ) -> Result<Self> {
        let mut handle = WindowedFileHandle::open(path, encoding, cals, declared_samples, 0)?;
        let n_samples = handle.n_samples();
        let data = handle.read_window(0, n_samples)?;
        Ok(InMemoryMatrix { data })
    }
}

impl SampleSource for InMemoryMatrix {
    fn n_channels(&self) -> usize {
        self.data.nrows()
    }

    fn n_samples(&self) -> usize {
        self.data.ncols()
    }

    fn read_window(&mut self, start: usize, stop: usize) -> Result<Array2<f64>> {
        check_window(start, stop, self.n_samples())?;
        Ok(self.data.slice(s![.., start..stop]).to_owned())
    }

    fn is_in_memory(&self) -> bool {
        true
    }
}

/// Lazy access to a binary sample file through one open handle
///
/// Only the bytes of the requested window are read. The handle is closed when
/// the value is dropped.
///
/// # Examples
///
/// ```rust
/// use brainvision::decoder::{SampleSource, WindowedFileHandle};
/// use brainvision::{BinaryFormat, ByteOrder, Encoding, Orientation};
///
/// let path = std::env::temp_dir().join("brainvision_doc_window.bin");
/// // 2 channels, 3 samples, INT_16 multiplexed
/// let raw: Vec<u8> = [1i16, 10, 2, 20, 3, 30].iter().flat_map(|v| v.to_le_bytes()).collect();
/// std::fs::write(&path, raw)?;
///
/// let encoding = Encoding::new(BinaryFormat::Int16, ByteOrder::LittleEndian, Orientation::Multiplexed);
/// let mut handle = WindowedFileHandle::open(&path, encoding, vec![1.0, 0.5], None, 0)?;
/// assert_eq!(handle.n_samples(), 3);
///
/// let window = handle.read_window(1, 3)?;
/// assert_eq!(window.row(0).to_vec(), vec![2.0, 3.0]);
/// assert_eq!(window.row(1).to_vec(), vec![10.0, 15.0]);
///
/// # drop(handle);
/// # std::fs::remove_file(&path).ok();
/// # Ok::<(), brainvision::BvError>(())
/// ```
#[derive(Debug)]
pub struct WindowedFileHandle {
    file: BufReader<File>,
    path: PathBuf,
    encoding: Encoding,
    /// 每个通道的校准系数
    cals: Vec<f64>,
    n_samples: usize,
    /// 数据区在文件中的起始偏移
    data_offset: u64,
}

impl WindowedFileHandle {
    /// Opens a binary sample file and checks its size
    ///
    /// The sample count is derived from the file size, which must be an exact
    /// multiple of `n_channels × bytes_per_sample`, and must equal
    /// `declared_samples` when given.
    ///
    /// # Errors
    ///
    /// * `BvError::FileNotFound` - The file cannot be opened
    /// * `BvError::InvalidFormat` - The file size is inconsistent with the layout
    pub fn open<P: AsRef<Path>>(
        path: P,
        encoding: Encoding,
        cals: Vec<f64>,
        declared_samples: Option<usize>,
        data_offset: u64,
    ) -> Result<Self> {
        let path = path.as_ref();
        if cals.is_empty() {
            return Err(BvError::Validation("At least one channel is required".to_string()));
        }

        let file = File::open(path)
            .map_err(|e| BvError::FileNotFound(format!("{}: {}", path.display(), e)))?;
        let file_len = file.metadata()?.len();

        let frame_bytes = (cals.len() * encoding.format.bytes_per_sample()) as u64;
        let data_len = file_len.checked_sub(data_offset).ok_or_else(|| {
            BvError::InvalidFormat(format!(
                "{} is shorter than its header ({} < {} bytes)",
                path.display(),
                file_len,
                data_offset
            ))
        })?;

        if data_len == 0 || data_len % frame_bytes != 0 {
            return Err(BvError::InvalidFormat(format!(
                "{}: {} data bytes is not a whole number of samples for {} channels of {}",
                path.display(),
                data_len,
                cals.len(),
                encoding.format.as_str()
            )));
        }
        let n_samples = (data_len / frame_bytes) as usize;

        if let Some(declared) = declared_samples {
            if declared != n_samples {
                return Err(BvError::InvalidFormat(format!(
                    "{}: header declares {} samples but the file holds {}",
                    path.display(),
                    declared,
                    n_samples
                )));
            }
        }

        log::debug!(
            "Opened {} ({} channels x {} samples)",
            path.display(),
            cals.len(),
            n_samples
        );

        Ok(WindowedFileHandle {
            file: BufReader::new(file),
            path: path.to_path_buf(),
            encoding,
            cals,
            n_samples,
            data_offset,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_bytes(&mut self, offset: u64, len: usize) -> Result<Vec<u8>> {
        self.file.seek(SeekFrom::Start(self.data_offset + offset))?;
        let mut buf = vec![0u8; len];
        self.file.read_exact(&mut buf)?;
        Ok(buf)
    }
}

impl SampleSource for WindowedFileHandle {
    fn n_channels(&self) -> usize {
        self.cals.len()
    }

    fn n_samples(&self) -> usize {
        self.n_samples
    }

    fn read_window(&mut self, start: usize, stop: usize) -> Result<Array2<f64>> {
        check_window(start, stop, self.n_samples)?;
        let n_channels = self.cals.len();
        let width = self.encoding.format.bytes_per_sample();
        let len = stop - start;

        log::trace!("Reading samples {}..{} from {}", start, stop, self.path.display());

        match self.encoding.orientation {
            Orientation::Multiplexed => {
                // 一次连续读取整个窗口
                let frame_bytes = n_channels * width;
                let bytes = self.read_bytes((start * frame_bytes) as u64, len * frame_bytes)?;
                let values = decode_samples(&self.encoding, &bytes);
                let cals = &self.cals;
                Ok(Array2::from_shape_fn((n_channels, len), |(ch, t)| {
                    values[t * n_channels + ch] * cals[ch]
                }))
            }
            Orientation::Vectorized => {
                // 每个通道单独读取一段
                let mut matrix = Array2::zeros((n_channels, len));
                for ch in 0..n_channels {
                    let offset = (ch as u64 * self.n_samples as u64 + start as u64) * width as u64;
                    let bytes = self.read_bytes(offset, len * width)?;
                    let values = decode_samples(&self.encoding, &bytes);
                    let cal = self.cals[ch];
                    for (dst, value) in matrix.row_mut(ch).iter_mut().zip(values) {
                        *dst = value * cal;
                    }
                }
                Ok(matrix)
            }
        }
    }

    fn is_in_memory(&self) -> bool {
        false
    }
}
