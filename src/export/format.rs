//! Number formatting shared by every OBJ8 directive.

use glam::Vec3;

/// Fixed `%8.3f`, with negative zero printed as zero.
pub fn fixed(value: f32) -> String {
    let text = format!("{:8.3}", value);
    if text.trim() == "-0.000" {
        format!("{:8.3}", 0.0f32)
    } else {
        text
    }
}

/// Three `%8.3f` columns.
pub fn fixed3(v: Vec3) -> String {
    format!("{} {} {}", fixed(v.x), fixed(v.y), fixed(v.z))
}

/// Compact `%.3f` without padding.
pub fn compact(value: f32) -> String {
    let text = format!("{:.3}", value);
    if text == "-0.000" {
        "0.000".to_string()
    } else {
        text
    }
}

pub fn compact3(v: Vec3) -> String {
    format!("{} {} {}", compact(v.x), compact(v.y), compact(v.z))
}

/// Round to `decimals` places and drop trailing zeros: `1.5000` -> `1.5`, `2.000` -> `2`.
pub fn trim(value: f32, decimals: usize) -> String {
    let text = format!("{:.*}", decimals, value);
    let trimmed = if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.')
    } else {
        text.as_str()
    };
    match trimmed {
        "-0" | "" => "0".to_string(),
        other => other.to_string(),
    }
}

/// A texture coordinate: four decimals, trimmed, left-justified to six columns.
pub fn uv(value: f32) -> String {
    format!("{:<6}", trim(value, 4))
}

/// Angles in degrees with two decimals.
pub fn angle(value: f32) -> String {
    let text = format!("{:.2}", value);
    if text == "-0.00" {
        "0.00".to_string()
    } else {
        text
    }
}

/// Colours and cutoffs with two decimals.
pub fn ratio(value: f32) -> String {
    angle(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed() {
        assert_eq!(fixed(1.0), "   1.000");
        assert_eq!(fixed(-0.0), "   0.000");
        assert_eq!(fixed(-0.0001), "   0.000");
        assert_eq!(fixed(-12.3456), " -12.346");
    }

    #[test]
    fn test_trim() {
        assert_eq!(trim(1.0, 3), "1");
        assert_eq!(trim(0.5, 4), "0.5");
        assert_eq!(trim(-0.00001, 3), "0");
        assert_eq!(trim(1000.0, 3), "1000");
        assert_eq!(trim(0.12345, 4), "0.1235");
    }

    #[test]
    fn test_uv_padding() {
        assert_eq!(uv(0.0), "0     ");
        assert_eq!(uv(0.25), "0.25  ");
    }

    #[test]
    fn test_angle() {
        assert_eq!(angle(90.0), "90.00");
        assert_eq!(angle(-0.001), "0.00");
        assert_eq!(ratio(0.5), "0.50");
    }

    #[test]
    fn test_compact() {
        assert_eq!(compact3(Vec3::new(0.0, -0.0, 1.5)), "0.000 0.000 1.500");
    }
}
