//! # BrainVision Reader for Rust
//!
//! A pure Rust library for reading BrainVision EEG recordings (`.vhdr` header,
//! `.vmrk` markers, `.eeg` binary samples) and saving them to a self-contained
//! raw signal container that reads back losslessly.
//!
//! ## Quick Start
//!
//! ### Reading a recording
//!
//! ```rust
//! use brainvision::{read_raw_brainvision, ReadOptions, Result};
//!
//! fn main() -> Result<()> {
//!     # let dir = std::env::temp_dir().join("brainvision_doc_lib_read");
//!     # let vhdr = brainvision::doctest_utils::write_reference_recording(&dir)?;
//!     // 按需读取：只在请求时解码样本
//!     let mut raw = read_raw_brainvision(&vhdr, &ReadOptions::default())?;
//!
//!     println!("Channels: {}", raw.n_channels());
//!     println!("Sampling rate: {} Hz", raw.sfreq());
//!     println!("Duration: {:.2} s", raw.info().duration());
//!
//!     // 前 1000 个样本的两个通道（单位：伏特）
//!     let (data, times) = raw.read_window(&[0, 1], 0, 1000)?;
//!     assert_eq!(data.dim(), (2, 1000));
//!     assert_eq!(times.len(), 1000);
//!
//!     # drop(raw);
//!     # std::fs::remove_dir_all(&dir).ok();
//!     Ok(())
//! }
//! ```
//!
//! ### Events and the stim channel
//!
//! Stimulus and response markers become a synthetic trigger channel named
//! `STI 014`, always the last channel. Response codes are offset by 1000.
//!
//! ```rust
//! use brainvision::{read_raw_brainvision, Event, ReadOptions};
//!
//! # let dir = std::env::temp_dir().join("brainvision_doc_lib_events");
//! # let vhdr = brainvision::doctest_utils::write_reference_recording(&dir)?;
//! let mut raw = read_raw_brainvision(&vhdr, &ReadOptions::default())?;
//!
//! let events = raw.get_events();
//! assert_eq!(events[0], Event::new(487, 1, 253));
//!
//! // 替换全部事件
//! raw.set_events(&events[..2])?;
//! assert_eq!(raw.get_events().len(), 2);
//! # drop(raw);
//! # std::fs::remove_dir_all(&dir).ok();
//! # Ok::<(), brainvision::BvError>(())
//! ```
//!
//! ### Saving and reading back
//!
//! ```rust
//! use brainvision::{read_raw, read_raw_brainvision, BufferSize, ReadOptions, SaveOptions};
//!
//! # let dir = std::env::temp_dir().join("brainvision_doc_lib_save");
//! # let vhdr = brainvision::doctest_utils::write_reference_recording(&dir)?;
//! let mut raw = read_raw_brainvision(&vhdr, &ReadOptions::default().preload(true))?;
//!
//! let path = dir.join("test_raw.rsc");
//! let options = SaveOptions::default()
//!     .buffer_size(BufferSize::Seconds(2.0))
//!     .overwrite(true);
//! raw.save(&path, &options)?;
//!
//! let mut loaded = read_raw(&path)?;
//! assert_eq!(loaded.info(), raw.info());
//! assert_eq!(loaded.data()?, raw.data()?);
//! assert_eq!(loaded.get_events(), raw.get_events());
//! # std::fs::remove_dir_all(&dir).ok();
//! # Ok::<(), brainvision::BvError>(())
//! ```
//!
//! ### Electrode positions
//!
//! ```rust
//! use brainvision::{read_raw_brainvision, ReadOptions};
//! use brainvision::doctest_utils::{reference_elp_names, write_reference_elp};
//!
//! # let dir = std::env::temp_dir().join("brainvision_doc_lib_elp");
//! # let vhdr = brainvision::doctest_utils::write_reference_recording(&dir)?;
//! let elp = dir.join("test_elp.txt");
//! write_reference_elp(&elp)?;
//!
//! let options = ReadOptions::default().elp(&elp, reference_elp_names());
//! let raw = read_raw_brainvision(&vhdr, &options)?;
//! assert!(raw.info().channels[0].loc.is_some());
//! assert_eq!(raw.info().dig.len(), 3 + 36);
//! # drop(raw);
//! # std::fs::remove_dir_all(&dir).ok();
//! # Ok::<(), brainvision::BvError>(())
//! ```

pub mod error;
pub mod types;
pub mod utils;
pub mod header;
pub mod markers;
pub mod decoder;
pub mod stim;
pub mod montage;
pub mod raw;
pub mod reader;
pub mod writer;

#[doc(hidden)]
pub mod doctest_utils; // For internal doctest support

// Re-export main types for convenience
pub use error::{BvError, Result};
pub use types::{
    BinaryFormat, ByteOrder, ChannelInfo, ChannelKind, DigKind, DigPoint, Encoding, Event, Info,
    Orientation, SamplingSpec,
};
pub use header::VhdrHeader;
pub use markers::{Marker, MarkerKind, MarkerTable};
pub use decoder::{InMemoryMatrix, SampleSource, WindowedFileHandle};
pub use stim::StimChannel;
pub use montage::Montage;
pub use raw::{read_raw_brainvision, BufferSize, Raw, ReadOptions, SaveOptions};
pub use reader::{read_raw, RawReader};
pub use writer::RawWriter;

/// Name of the synthesized trigger channel
pub const STIM_CHANNEL_NAME: &str = "STI 014";

/// Library version
///
/// # Examples
///
/// ```rust
/// let version = brainvision::version();
/// assert!(version.contains('.'));
/// ```
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
