//! Synthetic stimulus channel
//!
//! Discrete events are encoded as a dense channel: every event writes its code
//! over `[onset, onset + duration)`, all other samples are 0. When events
//! overlap, the larger code wins, so the result does not depend on the order
//! of the input events.
//!
//! The inverse, [`extract`], is a rising-edge detector: an event is reported
//! wherever the channel goes from 0 to a non-zero value. For events that are
//! well separated (at least one zero sample between them) `extract` after
//! [`synthesize`] returns the original events.

use crate::error::{BvError, Result};
use crate::types::Event;

/// Dense stimulus channel, one code per sample
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StimChannel {
    data: Vec<u32>,
}

impl StimChannel {
    /// An all-zero channel of `n_samples` samples
    pub fn zeros(n_samples: usize) -> Self {
        StimChannel { data: vec![0; n_samples] }
    }

    /// Builds a channel from stored physical values
    ///
    /// # Errors
    ///
    /// * `BvError::InvalidFormat` - A value is negative, fractional or too large
    pub fn from_values(values: &[f64]) -> Result<Self> {
        let data = values
            .iter()
            .enumerate()
            .map(|(i, &v)| {
                if v >= 0.0 && v <= u32::MAX as f64 && v.fract() == 0.0 {
                    Ok(v as u32)
                } else {
                    Err(BvError::InvalidFormat(format!(
                        "Stim channel value {} at sample {} is not an event code",
                        v, i
                    )))
                }
            })
            .collect::<Result<Vec<u32>>>()?;
        Ok(StimChannel { data })
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.data
    }

    /// Values of `[start, stop)` as physical samples
    pub fn window(&self, start: usize, stop: usize) -> Vec<f64> {
        self.data[start..stop].iter().map(|&v| v as f64).collect()
    }
}

/// Checks events against a channel of `n_samples` samples
///
/// # Errors
///
/// * `BvError::Validation` - An onset is outside `[0, n_samples)` or a code is 0
pub fn validate_events(events: &[Event], n_samples: usize) -> Result<()> {
    for event in events {
        if event.onset >= n_samples {
            return Err(BvError::Validation(format!(
                "Event onset {} outside [0, {})",
                event.onset, n_samples
            )));
        }
        if event.code == 0 {
            return Err(BvError::Validation(format!(
                "Event at sample {} has code 0, which cannot be represented",
                event.onset
            )));
        }
    }
    Ok(())
}

/// Encodes `events` into a channel of `n_samples` samples
///
/// Events running past the end are clipped; a duration of 0 counts as 1.
/// Onsets at or beyond `n_samples` are ignored here, use [`validate_events`]
/// to reject them.
///
/// # Examples
///
/// ```rust
/// use brainvision::stim::synthesize;
/// use brainvision::Event;
///
/// let stim = synthesize(&[Event::new(1, 2, 5), Event::new(2, 1, 9)], 5);
/// // 重叠部分取较大的事件码
/// assert_eq!(stim.as_slice(), &[0, 5, 9, 0, 0]);
/// ```
pub fn synthesize(events: &[Event], n_samples: usize) -> StimChannel {
    let mut stim = StimChannel::zeros(n_samples);
    write_events(&mut stim.data, events);
    stim
}

fn write_events(data: &mut [u32], events: &[Event]) {
    let n_samples = data.len();
    for event in events {
        let start = event.onset.min(n_samples);
        let stop = event.end().min(n_samples);
        for value in &mut data[start..stop] {
            *value = (*value).max(event.code);
        }
    }
}

/// Recovers events from a channel (rising edges from 0)
///
/// The duration of each event is the length of the run of its code. A change
/// from one non-zero code directly to another is not reported as a new event.
///
/// # Examples
///
/// ```rust
/// use brainvision::stim::{extract, synthesize};
/// use brainvision::Event;
///
/// let events = vec![Event::new(0, 1, 3), Event::new(4, 2, 7)];
/// let stim = synthesize(&events, 8);
/// assert_eq!(extract(&stim), events);
/// ```
pub fn extract(stim: &StimChannel) -> Vec<Event> {
    let data = &stim.data;
    let mut events = Vec::new();
    let mut previous = 0u32;

    for (i, &value) in data.iter().enumerate() {
        if previous == 0 && value != 0 {
            let duration = data[i..].iter().take_while(|&&v| v == value).count();
            events.push(Event::new(i, duration, value));
        }
        previous = value;
    }
    events
}

/// Replaces the whole content of `stim` with `events`
///
/// The previous content is discarded, never merged. The channel is left
/// untouched when validation fails.
pub fn replace(stim: &mut StimChannel, events: &[Event]) -> Result<()> {
    validate_events(events, stim.len())?;
    stim.data.fill(0);
    write_events(&mut stim.data, events);
    log::debug!("Stim channel rewritten with {} events", events.len());
    Ok(())
}
