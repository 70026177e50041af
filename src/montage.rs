use std::fs;
use std::path::Path;

use nalgebra::{Matrix3, Vector3};

use crate::error::{BvError, Result};
use crate::types::{DigKind, DigPoint, Info};
use crate::utils::decode_text;

/// ELP 文件中的坐标单位为毫米
const ELP_UNIT_TO_METRES: f64 = 1e-3;

type Vec3 = [f64; 3];

/// Rigid transform into the head coordinate frame defined by the fiducials
///
/// The origin is the projection of the nasion onto the LPA–RPA line, x points
/// to RPA, y to the nasion and z up.
#[derive(Debug, Clone, PartialEq)]
pub struct HeadTransform {
    origin: Vector3<f64>,
    /// 行向量为头坐标系的 x、y、z 轴
    rotation: Matrix3<f64>,
}

impl HeadTransform {
    pub fn from_fiducials(nasion: Vec3, lpa: Vec3, rpa: Vec3) -> Result<Self> {
        let degenerate = || BvError::Validation("Fiducials do not define a head frame".to_string());
        let (nasion, lpa, rpa) = (Vector3::from(nasion), Vector3::from(lpa), Vector3::from(rpa));

        let ex = (rpa - lpa).try_normalize(f64::EPSILON).ok_or_else(degenerate)?;
        let origin = lpa + ex * (nasion - lpa).dot(&ex);
        let ey = (nasion - origin).try_normalize(f64::EPSILON).ok_or_else(degenerate)?;
        let ez = ex.cross(&ey);

        let rotation = Matrix3::from_rows(&[ex.transpose(), ey.transpose(), ez.transpose()]);
        Ok(HeadTransform { origin, rotation })
    }

    pub fn apply(&self, point: Vec3) -> Vec3 {
        (self.rotation * (Vector3::from(point) - self.origin)).into()
    }
}

/// Electrode positions read from an ELP text file
///
/// # Examples
///
/// ```rust
/// use brainvision::{DigKind, Montage};
///
/// let text = "% fiducials first\n\
///             0 100 0\n\
///             -80 0 0\n\
///             80 0 0\n\
///             0 0 90\n";
/// let names = vec![
///     Some("nasion".to_string()),
///     Some("lpa".to_string()),
///     Some("rpa".to_string()),
///     Some("CZ".to_string()),
/// ];
/// let montage = Montage::parse_elp(text, &names)?;
/// assert_eq!(montage.dig()[0].kind, DigKind::Nasion);
///
/// let cz = montage.position("CZ").unwrap();
/// assert!((cz[2] - 0.09).abs() < 1e-12);
/// # Ok::<(), brainvision::BvError>(())
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Montage {
    /// 三个基准点在前，随后为电极点
    dig: Vec<DigPoint>,
}

impl Montage {
    pub fn read_elp<P: AsRef<Path>>(path: P, names: &[Option<String>]) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path)
            .map_err(|e| BvError::FileNotFound(format!("{}: {}", path.display(), e)))?;
        Self::parse_elp(&decode_text(&bytes), names)
    }

    /// Parses coordinate triples and labels them with `names`
    ///
    /// Entries of `names` that are `None` are skipped. `nasion`, `lpa` and
    /// `rpa` (any case) are the fiducials and must all be present.
    pub fn parse_elp(text: &str, names: &[Option<String>]) -> Result<Self> {
        let points = parse_triples(text);
        if points.len() != names.len() {
            return Err(BvError::InvalidFormat(format!(
                "ELP file has {} points but {} names were given",
                points.len(),
                names.len()
            )));
        }

        let mut nasion = None;
        let mut lpa = None;
        let mut rpa = None;
        let mut electrodes = Vec::new();

        for (point, name) in points.into_iter().zip(names) {
            let Some(name) = name else { continue };
            let point = point.map(|v| v * ELP_UNIT_TO_METRES);
            match name.to_ascii_lowercase().as_str() {
                "nasion" => nasion = Some(point),
                "lpa" => lpa = Some(point),
                "rpa" => rpa = Some(point),
                _ => electrodes.push((name.clone(), point)),
            }
        }

        let (nasion, lpa, rpa) = match (nasion, lpa, rpa) {
            (Some(n), Some(l), Some(r)) => (n, l, r),
            _ => {
                return Err(BvError::Validation(
                    "ELP names must include nasion, lpa and rpa".to_string(),
                ))
            }
        };
        let transform = HeadTransform::from_fiducials(nasion, lpa, rpa)?;

        let mut dig = vec![
            DigPoint { kind: DigKind::Nasion, ident: "nasion".to_string(), r: transform.apply(nasion) },
            DigPoint { kind: DigKind::Lpa, ident: "lpa".to_string(), r: transform.apply(lpa) },
            DigPoint { kind: DigKind::Rpa, ident: "rpa".to_string(), r: transform.apply(rpa) },
        ];
        dig.extend(electrodes.into_iter().map(|(name, point)| DigPoint {
            kind: DigKind::Eeg,
            ident: name,
            r: transform.apply(point),
        }));

        Ok(Montage { dig })
    }

    pub fn dig(&self) -> &[DigPoint] {
        &self.dig
    }

    /// Head-frame position of the electrode called `name`
    pub fn position(&self, name: &str) -> Option<Vec3> {
        self.dig
            .iter()
            .find(|d| d.kind == DigKind::Eeg && d.ident == name)
            .map(|d| d.r)
    }

    /// Sets channel locations and digitization points of `info`
    pub fn apply(&self, info: &mut Info) {
        let mut located = 0;
        for channel in &mut info.channels {
            if let Some(r) = self.position(&channel.name) {
                channel.loc = Some(r);
                located += 1;
            }
        }
        info.dig = self.dig.clone();
        log::debug!("Montage located {} of {} channels", located, info.channels.len());
    }
}

/// 只保留由三个数字组成的行，注释行以 % # ; 开头
fn parse_triples(text: &str) -> Vec<Vec3> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with(['%', '#', ';']))
        .filter_map(|line| {
            let values: Vec<f64> = line
                .split_whitespace()
                .map(|t| t.parse::<f64>())
                .collect::<std::result::Result<_, _>>()
                .ok()?;
            match values.as_slice() {
                [x, y, z] => Some([*x, *y, *z]),
                _ => None,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChannelInfo, ChannelKind};

    fn names(list: &[Option<&str>]) -> Vec<Option<String>> {
        list.iter().map(|n| n.map(str::to_string)).collect()
    }

    const ELP: &str = "% Ascii stylus data file
% Line 6 points
0.0  100.0  0.0
-80.0  0.0  0.0
80.0  0.0  0.0
12.0  12.0  12.0
0.0  0.0  90.0
-30.0  60.0  40.0
";

    fn assert_close(a: Vec3, b: Vec3) {
        for i in 0..3 {
            assert!((a[i] - b[i]).abs() < 1e-12, "{:?} != {:?}", a, b);
        }
    }

    #[test]
    fn test_head_frame() {
        let montage = Montage::parse_elp(
            ELP,
            &names(&[Some("nasion"), Some("lpa"), Some("rpa"), None, Some("CZ"), Some("FP1")]),
        )
        .unwrap();

        assert_eq!(montage.dig().len(), 5);
        assert_close(montage.dig()[0].r, [0.0, 0.1, 0.0]);
        assert_close(montage.dig()[1].r, [-0.08, 0.0, 0.0]);
        assert_close(montage.dig()[2].r, [0.08, 0.0, 0.0]);
        assert_close(montage.position("CZ").unwrap(), [0.0, 0.0, 0.09]);
        assert_close(montage.position("FP1").unwrap(), [-0.03, 0.06, 0.04]);
    }

    #[test]
    fn test_shifted_fiducials() {
        // 基准点整体平移后，头坐标不变
        let text = "10 110 5\n-70 10 5\n90 10 5\n10 10 95\n";
        let montage = Montage::parse_elp(
            text,
            &names(&[Some("NASION"), Some("LPA"), Some("RPA"), Some("CZ")]),
        )
        .unwrap();
        assert_close(montage.position("CZ").unwrap(), [0.0, 0.0, 0.09]);
    }

    #[test]
    fn test_count_mismatch_and_missing_fiducials() {
        let err = Montage::parse_elp(ELP, &names(&[Some("nasion")])).unwrap_err();
        assert!(err.is_format_error());

        let err = Montage::parse_elp(
            ELP,
            &names(&[Some("nasion"), Some("lpa"), None, None, Some("CZ"), Some("FP1")]),
        )
        .unwrap_err();
        assert!(err.is_validation_error());
    }

    #[test]
    fn test_degenerate_fiducials() {
        // 左右耳前点重合，无法确定 x 轴
        let err = HeadTransform::from_fiducials([0.0, 0.1, 0.0], [0.05, 0.0, 0.0], [0.05, 0.0, 0.0]).unwrap_err();
        assert!(err.is_validation_error());

        // 鼻根落在耳前点连线上
        let err = HeadTransform::from_fiducials([0.0, 0.0, 0.0], [-0.08, 0.0, 0.0], [0.08, 0.0, 0.0]).unwrap_err();
        assert!(err.is_validation_error());
    }

    #[test]
    fn test_apply_to_info() {
        let montage = Montage::parse_elp(
            ELP,
            &names(&[Some("nasion"), Some("lpa"), Some("rpa"), None, Some("CZ"), Some("FP1")]),
        )
        .unwrap();

        let channel = |name: &str| ChannelInfo {
            name: name.to_string(),
            reference: String::new(),
            unit: "µV".to_string(),
            resolution: 1.0,
            unit_factor: 1e-6,
            kind: ChannelKind::Eeg,
            bad: false,
            loc: None,
        };
        let mut info = Info {
            channels: vec![channel("CZ"), channel("O1")],
            sfreq: 100.0,
            n_samples: 10,
            meas_date: None,
            highpass: 0.0,
            lowpass: 50.0,
            dig: Vec::new(),
        };
        montage.apply(&mut info);

        assert!(info.channels[0].loc.is_some());
        assert!(info.channels[1].loc.is_none());
        assert_eq!(info.dig.len(), 5);
    }
}
