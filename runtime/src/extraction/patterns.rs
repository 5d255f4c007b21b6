//! Coordinate patterns: decimal degrees, degree-minute-second, labeled pairs.
//!
//! Each function returns raw `(lat, lon)` pairs in order of appearance.
//! Range checking happens in the extractor.

use regex::{Captures, Regex};
use std::sync::LazyLock;

static DOT_DECIMAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[^\d.,])(-?\d{1,3}\.\d{2,})\s*[,;\s]\s*(-?\d{1,3}\.\d{2,})").unwrap()
});

static COMMA_DECIMAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[^\d.,])(-?\d{1,3},\d{2,})\s*[;\s]\s*(-?\d{1,3},\d{2,})").unwrap()
});

static DMS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r#"(\d{1,3}(?:[.,]\d+)?)\s*°\s*(?:(\d{1,2}(?:[.,]\d+)?)\s*['′]\s*)?(?:(\d{1,2}(?:[.,]\d+)?)\s*(?:"|″|'')\s*)?([NS])"#,
        r"[\s,;/]*",
        r#"(\d{1,3}(?:[.,]\d+)?)\s*°\s*(?:(\d{1,2}(?:[.,]\d+)?)\s*['′]\s*)?(?:(\d{1,2}(?:[.,]\d+)?)\s*(?:"|″|'')\s*)?([EWO])"#,
    ))
    .unwrap()
});

static LABELED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\blat(?:itude)?\s*[:=]?\s*(-?\d{1,3}(?:[.,]\d+)?)[\s,;]*(?:lon(?:g(?:itude)?)?|lng)\s*[:=]?\s*(-?\d{1,3}(?:[.,]\d+)?)",
    )
    .unwrap()
});

/// Replace the Unicode minus sign and similar dashes used before numbers.
pub fn normalize_signs(text: &str) -> String {
    text.replace(['\u{2212}', '\u{2013}'], "-")
}

fn number(s: &str) -> Option<f64> {
    s.replace(',', ".").parse::<f64>().ok()
}

fn pair(caps: &Captures<'_>, lat: usize, lon: usize) -> Option<(f64, f64)> {
    Some((number(caps.get(lat)?.as_str())?, number(caps.get(lon)?.as_str())?))
}

/// `43.6047, 1.4442` and `43,6047; 1,4442`.
pub fn decimal(text: &str) -> Vec<(f64, f64)> {
    let text = normalize_signs(text);
    let mut found: Vec<(usize, (f64, f64))> = Vec::new();
    for re in [&*DOT_DECIMAL_RE, &*COMMA_DECIMAL_RE] {
        for caps in re.captures_iter(&text) {
            if let (Some(m), Some(p)) = (caps.get(1), pair(&caps, 1, 2)) {
                found.push((m.start(), p));
            }
        }
    }
    found.sort_by_key(|(pos, _)| *pos);
    found.into_iter().map(|(_, p)| p).collect()
}

fn dms_component(caps: &Captures<'_>, deg: usize) -> Option<f64> {
    let d = number(caps.get(deg)?.as_str())?;
    let m = caps.get(deg + 1).and_then(|m| number(m.as_str())).unwrap_or(0.0);
    let s = caps.get(deg + 2).and_then(|m| number(m.as_str())).unwrap_or(0.0);
    if m >= 60.0 || s >= 60.0 {
        return None;
    }
    Some(d + m / 60.0 + s / 3600.0)
}

/// `43°36'N 1°26'E`, seconds optional, `O` (ouest) for west.
pub fn dms(text: &str) -> Vec<(f64, f64)> {
    DMS_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let mut lat = dms_component(&caps, 1)?;
            let mut lon = dms_component(&caps, 5)?;
            if &caps[4] == "S" {
                lat = -lat;
            }
            if matches!(&caps[8], "W" | "O") {
                lon = -lon;
            }
            Some((lat, lon))
        })
        .collect()
}

/// `lat: X long: Y`, `latitude=X, longitude=Y`, `lng`, `lon`.
pub fn labeled(text: &str) -> Vec<(f64, f64)> {
    let text = normalize_signs(text);
    LABELED_RE
        .captures_iter(&text)
        .filter_map(|caps| pair(&caps, 1, 2))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: (f64, f64), b: (f64, f64)) -> bool {
        (a.0 - b.0).abs() < 1e-4 && (a.1 - b.1).abs() < 1e-4
    }

    #[test]
    fn test_dot_decimal() {
        let found = decimal("Rendez-vous au 43.6047, 1.4442 demain");
        assert_eq!(found.len(), 1);
        assert!(close(found[0], (43.6047, 1.4442)));
    }

    #[test]
    fn test_comma_decimal() {
        let found = decimal("coordonnées 43,6047; 1,4442");
        assert_eq!(found.len(), 1);
        assert!(close(found[0], (43.6047, 1.4442)));
    }

    #[test]
    fn test_negative_and_unicode_minus() {
        let found = decimal("spot at 43.1234 \u{2212}0.5678");
        assert!(close(found[0], (43.1234, -0.5678)));
        let found = decimal("-33.8688, 151.2093");
        assert!(close(found[0], (-33.8688, 151.2093)));
    }

    #[test]
    fn test_dms_with_and_without_seconds() {
        let found = dms("Grotte à 43°36'N 1°26'E");
        assert!(close(found[0], (43.6, 1.0 + 26.0 / 60.0)));

        let found = dms(r#"43°36'15"N, 0°30'0"O"#);
        assert!(close(found[0], (43.0 + 36.0 / 60.0 + 15.0 / 3600.0, -0.5)));
    }

    #[test]
    fn test_dms_southern_hemisphere() {
        let found = dms("12°30'S 45°15'W");
        assert!(close(found[0], (-12.5, -45.25)));
    }

    #[test]
    fn test_labeled_variants() {
        assert!(close(labeled("lat:44.123 long:3.456")[0], (44.123, 3.456)));
        assert!(close(
            labeled("latitude=43.5, longitude=1.25")[0],
            (43.5, 1.25)
        ));
        assert!(close(labeled("Lat 43.1 lng -0.2")[0], (43.1, -0.2)));
        assert!(close(labeled("lat: 43.2 lon: 1.7")[0], (43.2, 1.7)));
    }

    #[test]
    fn test_plain_prose_has_no_coordinates() {
        let text = "On a marché 3 heures, 12 km, super baignade";
        assert!(decimal(text).is_empty());
        assert!(dms(text).is_empty());
        assert!(labeled(text).is_empty());
    }
}
