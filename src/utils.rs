use crate::error::{BvError, Result};

/// 检查字符串是否为有效的整数
pub fn is_integer_number(s: &str) -> bool {
    let s = s.trim();
    if s.is_empty() {
        return false;
    }

    let digits = s.strip_prefix('+').or_else(|| s.strip_prefix('-')).unwrap_or(s);
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}

/// 检查字符串是否为有效的数字（包括浮点数）
pub fn is_number(s: &str) -> bool {
    let s = s.trim();
    !s.is_empty() && s.parse::<f64>().is_ok()
}

/// 严格解析非负整数字段，失败时返回格式错误
pub fn parse_usize_field(value: &str, what: &str) -> Result<usize> {
    value
        .trim()
        .parse::<usize>()
        .map_err(|_| BvError::InvalidFormat(format!("Invalid {}: '{}'", what, value.trim())))
}

/// 严格解析浮点字段，拒绝 NaN 和无穷大
pub fn parse_f64_field(value: &str, what: &str) -> Result<f64> {
    let parsed = value
        .trim()
        .parse::<f64>()
        .map_err(|_| BvError::InvalidFormat(format!("Invalid {}: '{}'", what, value.trim())))?;
    if !parsed.is_finite() {
        return Err(BvError::InvalidFormat(format!("Non-finite {}: '{}'", what, value.trim())));
    }
    Ok(parsed)
}

/// 文本解码：优先 UTF-8，否则按 Latin-1 逐字节映射
///
/// 旧版 BrainVision 文件把 `µ` 存成单字节 0xB5。
pub fn decode_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.strip_prefix('\u{feff}').unwrap_or(text).to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

/// 单位到伏特的换算系数，未知单位返回 `None`
pub fn unit_factor(unit: &str) -> Option<f64> {
    match unit.trim() {
        "V" => Some(1.0),
        "mV" => Some(1e-3),
        // U+00B5 (micro sign) 和 U+03BC (greek mu) 两种写法都存在
        "µV" | "μV" | "uV" => Some(1e-6),
        "nV" => Some(1e-9),
        _ => None,
    }
}

/// BrainVision 通道名中 `\1` 表示逗号
pub fn unescape_channel_name(name: &str) -> String {
    name.replace("\\1", ",")
}

/// Writes `text` left-aligned into `buf[start..start + len]`, padding with spaces
pub fn put_field(buf: &mut [u8], start: usize, len: usize, text: &str, what: &str) -> Result<()> {
    let bytes = text.as_bytes();
    if bytes.len() > len {
        return Err(BvError::Validation(format!(
            "{} '{}' does not fit in {} bytes",
            what, text, len
        )));
    }
    let field = &mut buf[start..start + len];
    field.fill(b' ');
    field[..bytes.len()].copy_from_slice(bytes);
    Ok(())
}

/// Reads a space-padded field, trimming the padding
pub fn read_field(buf: &[u8], start: usize, len: usize) -> String {
    String::from_utf8_lossy(&buf[start..start + len]).trim().to_string()
}

/// 最短可往返的科学计数法表示，解析后与原值逐位相同
pub fn format_float(value: f64) -> String {
    format!("{:e}", value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_integer_number() {
        assert!(is_integer_number("123"));
        assert!(is_integer_number("-456"));
        assert!(is_integer_number("+789"));
        assert!(is_integer_number("0"));
        assert!(!is_integer_number("12.34"));
        assert!(!is_integer_number("abc"));
        assert!(!is_integer_number(""));
        assert!(!is_integer_number("-"));
    }

    #[test]
    fn test_is_number() {
        assert!(is_number("0.5"));
        assert!(is_number("-1e-6"));
        assert!(!is_number("DC"));
    }

    #[test]
    fn test_decode_text_latin1_fallback() {
        let latin1 = [b'0', b'.', b'5', b',', 0xB5, b'V'];
        assert_eq!(decode_text(&latin1), "0.5,µV");
        assert_eq!(decode_text("0.5,µV".as_bytes()), "0.5,µV");
    }

    #[test]
    fn test_unit_factor() {
        assert_eq!(unit_factor("µV"), Some(1e-6));
        assert_eq!(unit_factor("μV"), Some(1e-6));
        assert_eq!(unit_factor("mV"), Some(1e-3));
        assert_eq!(unit_factor("ARU"), None);
    }

    #[test]
    fn test_fields_round_trip() {
        let mut buf = vec![0u8; 16];
        put_field(&mut buf, 0, 8, "abc", "label").unwrap();
        put_field(&mut buf, 8, 8, &format_float(1e-6), "value").unwrap();
        assert_eq!(read_field(&buf, 0, 8), "abc");
        assert_eq!(parse_f64_field(&read_field(&buf, 8, 8), "value").unwrap(), 1e-6);
        assert!(put_field(&mut buf, 0, 2, "toolong", "label").is_err());
    }

    #[test]
    fn test_format_float_is_exact() {
        for value in [0.1, 1.0 / 3.0, 5e-7, 1000.0, -2.5e300, f64::MIN_POSITIVE] {
            let text = format_float(value);
            assert!(text.len() <= 24, "{}", text);
            assert_eq!(text.parse::<f64>().unwrap(), value);
        }
    }

    #[test]
    fn test_strict_parsers() {
        assert_eq!(parse_usize_field(" 32 ", "channels").unwrap(), 32);
        assert!(parse_usize_field("-1", "channels").is_err());
        assert!(parse_f64_field("NaN", "sfreq").is_err());
        assert!(parse_f64_field("x", "sfreq").is_err());
    }
}
