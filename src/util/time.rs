//! Offset rendering and parsing
//!
//! Catalog timestamps render as `H:MM:SS` at or above one hour and `M:SS`
//! below it. Parsing accepts both forms plus the wider in-the-wild anchor
//! grammar (`HH:MM:SS`, multi-digit minutes) and round-trips every rendered
//! value.

/// Render an offset in seconds as `H:MM:SS` (>= 3600) or `M:SS`.
pub fn render_hms(offset_s: u32) -> String {
    if offset_s >= 3600 {
        let hours = offset_s / 3600;
        let mins = (offset_s % 3600) / 60;
        let secs = offset_s % 60;
        format!("{}:{:02}:{:02}", hours, mins, secs)
    } else {
        let mins = offset_s / 60;
        let secs = offset_s % 60;
        format!("{}:{:02}", mins, secs)
    }
}

/// Parse `H:MM:SS` / `HH:MM:SS` (hours 0-23) or `M:SS` / `MM:SS` style
/// offsets (minutes 0-599) into seconds.
///
/// Returns `None` for anything outside the anchor grammar, including
/// out-of-range fields; callers drop such lines rather than guessing.
pub fn parse_hms(s: &str) -> Option<u32> {
    let parts: Vec<&str> = s.split(':').collect();
    match parts.as_slice() {
        [h, m, sec] => {
            if h.is_empty() || h.len() > 2 || m.len() != 2 || sec.len() != 2 {
                return None;
            }
            let h: u32 = h.parse().ok()?;
            let m: u32 = m.parse().ok()?;
            let sec: u32 = sec.parse().ok()?;
            if h > 23 || m > 59 || sec > 59 {
                return None;
            }
            Some(h * 3600 + m * 60 + sec)
        }
        [m, sec] => {
            if m.is_empty() || m.len() > 3 || sec.len() != 2 {
                return None;
            }
            let m: u32 = m.parse().ok()?;
            let sec: u32 = sec.parse().ok()?;
            if m > 599 || sec > 59 {
                return None;
            }
            Some(m * 60 + sec)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_below_one_hour() {
        assert_eq!(render_hms(0), "0:00");
        assert_eq!(render_hms(83), "1:23");
        assert_eq!(render_hms(347), "5:47");
        assert_eq!(render_hms(3599), "59:59");
    }

    #[test]
    fn test_render_at_and_above_one_hour() {
        assert_eq!(render_hms(3600), "1:00:00");
        assert_eq!(render_hms(3661), "1:01:01");
        assert_eq!(render_hms(86399), "23:59:59");
    }

    #[test]
    fn test_parse_both_forms() {
        assert_eq!(parse_hms("0:00"), Some(0));
        assert_eq!(parse_hms("25:36"), Some(1536));
        assert_eq!(parse_hms("00:25:36"), Some(1536));
        assert_eq!(parse_hms("1:01:01"), Some(3661));
        assert_eq!(parse_hms("599:59"), Some(35999));
    }

    #[test]
    fn test_parse_rejects_out_of_range() {
        assert_eq!(parse_hms("24:00:00"), None);
        assert_eq!(parse_hms("1:60:00"), None);
        assert_eq!(parse_hms("600:00"), None);
        assert_eq!(parse_hms("1:5"), None);
        assert_eq!(parse_hms("abc"), None);
        assert_eq!(parse_hms(""), None);
    }

    #[test]
    fn test_round_trip_full_day() {
        // parse(render(x)) == x for every offset in a 24h stream
        for offset in (0u32..86400).step_by(7) {
            let rendered = render_hms(offset);
            assert_eq!(parse_hms(&rendered), Some(offset), "offset {}", offset);
        }
        // and the exact boundaries
        for offset in [0, 59, 60, 3599, 3600, 3601, 86399] {
            assert_eq!(parse_hms(&render_hms(offset)), Some(offset));
        }
    }
}
