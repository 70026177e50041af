use std::fs;
use std::path::Path;

use chrono::NaiveDateTime;
use ini::{Ini, ParseOption};

use crate::error::{BvError, Result};
use crate::types::Event;
use crate::utils::{decode_text, parse_usize_field};

const MARKER_IDENTIFIERS: [&str; 2] = [
    "Brain Vision Data Exchange Marker File",
    "BrainVision Data Exchange Marker File",
];

/// Response markers are shifted by this amount so they never collide with
/// stimulus codes
pub const RESPONSE_CODE_OFFSET: u32 = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkerKind {
    NewSegment,
    Stimulus,
    Response,
    Comment,
    Other(String),
}

impl MarkerKind {
    fn from_type(value: &str) -> Self {
        match value.trim() {
            "New Segment" => MarkerKind::NewSegment,
            "Stimulus" => MarkerKind::Stimulus,
            "Response" => MarkerKind::Response,
            "Comment" => MarkerKind::Comment,
            other => MarkerKind::Other(other.to_string()),
        }
    }
}

/// One record of the marker file
#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    pub kind: MarkerKind,
    /// 描述标签，例如 `S253`
    pub description: String,
    /// 0 起始的样本位置（文件中为 1 起始）
    pub onset: usize,
    pub duration: usize,
    /// 0 表示与所有通道相关
    pub channel: usize,
    /// 仅 New Segment 标记携带日期
    pub date: Option<NaiveDateTime>,
}

impl Marker {
    /// Event code carried by the marker, if it is a stimulus or response
    pub fn code(&self) -> Option<u32> {
        let (prefix, offset) = match self.kind {
            MarkerKind::Stimulus => ('S', 0),
            MarkerKind::Response => ('R', RESPONSE_CODE_OFFSET),
            _ => return None,
        };
        let digits = self.description.trim().strip_prefix(prefix)?.trim();
        digits.parse::<u32>().ok()?.checked_add(offset)
    }
}

/// Markers of a recording, in marker-number order
///
/// # Examples
///
/// ```rust
/// use brainvision::{Event, MarkerTable};
///
/// let text = "Brain Vision Data Exchange Marker File, Version 1.0\n\
///             [Marker Infos]\n\
///             Mk1=New Segment,,1,1,0,20131113161403426008\n\
///             Mk2=Stimulus,S253,488,1,0\n\
///             Mk3=Stimulus,S255,498,1,0\n";
///
/// let table = MarkerTable::parse(text)?;
/// assert_eq!(table.events(), vec![Event::new(487, 1, 253), Event::new(497, 1, 255)]);
/// assert!(table.meas_date().is_some());
/// # Ok::<(), brainvision::BvError>(())
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarkerTable {
    markers: Vec<Marker>,
}

impl MarkerTable {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path)
            .map_err(|e| BvError::FileNotFound(format!("{}: {}", path.display(), e)))?;
        Self::parse(&decode_text(&bytes))
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut lines = text.lines();
        let identification = lines.next().unwrap_or("").trim();
        if !MARKER_IDENTIFIERS.iter().any(|id| identification.starts_with(id)) {
            return Err(BvError::InvalidFormat(format!(
                "Not a BrainVision marker file: '{}'",
                identification
            )));
        }
        let body: Vec<&str> = lines.collect();

        let option = ParseOption {
            enabled_quote: false,
            enabled_escape: false,
            ..ParseOption::default()
        };
        let ini = Ini::load_from_str_opt(&body.join("\n"), option)
            .map_err(|e| BvError::InvalidFormat(format!("Malformed marker file: {}", e)))?;

        let mut numbered = Vec::new();
        if let Some(section) = ini.section(Some("Marker Infos")) {
            for (key, value) in section.iter() {
                let number = key
                    .trim()
                    .strip_prefix("Mk")
                    .and_then(|n| n.parse::<usize>().ok())
                    .ok_or_else(|| BvError::InvalidFormat(format!("Invalid marker key '{}'", key)))?;
                numbered.push((number, parse_marker(value)?));
            }
        }
        numbered.sort_by_key(|(number, _)| *number);

        let markers: Vec<Marker> = numbered.into_iter().map(|(_, marker)| marker).collect();
        log::debug!("Parsed {} markers", markers.len());
        Ok(MarkerTable { markers })
    }

    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    /// Stimulus and response markers as events, sorted by onset
    ///
    /// Markers whose description carries no numeric code are skipped.
    pub fn events(&self) -> Vec<Event> {
        let mut events = Vec::new();
        for marker in &self.markers {
            match marker.code() {
                Some(code) if code > 0 => {
                    events.push(Event::new(marker.onset, marker.duration, code))
                }
                _ if matches!(marker.kind, MarkerKind::Stimulus | MarkerKind::Response) => {
                    log::warn!(
                        "Skipping marker '{}' at sample {}: no usable event code",
                        marker.description,
                        marker.onset
                    );
                }
                _ => {}
            }
        }
        // 稳定排序，同一位置的事件保持文件顺序
        events.sort_by_key(|e| e.onset);
        events
    }

    /// Date of the first New Segment marker that carries one
    pub fn meas_date(&self) -> Option<NaiveDateTime> {
        self.markers
            .iter()
            .filter(|m| m.kind == MarkerKind::NewSegment)
            .find_map(|m| m.date)
    }

    /// Cross-checks marker positions against the recording length
    pub fn validate(&self, n_samples: usize) -> Result<()> {
        match self.markers.iter().find(|m| m.onset >= n_samples) {
            Some(marker) => Err(BvError::InvalidFormat(format!(
                "Marker '{}' at sample {} is beyond the end of the data ({} samples)",
                marker.description, marker.onset, n_samples
            ))),
            None => Ok(()),
        }
    }
}

/// <type>,<description>,<position>,<size>,<channel>[,<date>]
fn parse_marker(value: &str) -> Result<Marker> {
    let fields: Vec<&str> = value.split(',').collect();
    if fields.len() < 5 {
        return Err(BvError::InvalidFormat(format!("Incomplete marker entry '{}'", value)));
    }

    let position = parse_usize_field(fields[2], "marker position")?;
    if position == 0 {
        return Err(BvError::InvalidFormat(format!("Marker position must be 1-based: '{}'", value)));
    }
    let size = parse_usize_field(fields[3], "marker size")?;
    let channel = parse_usize_field(fields[4], "marker channel")?;

    let kind = MarkerKind::from_type(fields[0]);
    let date = match (&kind, fields.get(5).map(|d| d.trim())) {
        (MarkerKind::NewSegment, Some(d)) if !d.is_empty() => parse_segment_date(d)?,
        _ => None,
    };

    Ok(Marker {
        kind,
        description: fields[1].trim().to_string(),
        onset: position - 1,
        duration: size.max(1),
        channel,
        date,
    })
}

/// YYYYMMDDhhmmssuuuuuu
fn parse_segment_date(value: &str) -> Result<Option<NaiveDateTime>> {
    if value.len() != 20 || !value.chars().all(|c| c.is_ascii_digit()) {
        return Err(BvError::InvalidFormat(format!("Invalid segment date '{}'", value)));
    }
    // 全零日期表示未记录
    if value.chars().all(|c| c == '0') {
        return Ok(None);
    }
    let seconds = NaiveDateTime::parse_from_str(&value[..14], "%Y%m%d%H%M%S")
        .map_err(|e| BvError::InvalidFormat(format!("Invalid segment date '{}': {}", value, e)))?;
    let micros: i64 = value[14..].parse().unwrap_or(0);
    Ok(Some(seconds + chrono::Duration::microseconds(micros)))
}
