use regex::Regex;
use std::sync::LazyLock;

static CHANGE_CELL: LazyLock<Option<Regex>> = LazyLock::new(|| {
    // "33.93 (20.0%)" / "-4.10 (-1.2%)"
    Regex::new(r"([-+]?[\d.,]+)\s*\(\s*([-+]?[\d.,]+)\s*%?\s*\)").ok()
});

/// Parse a numeric cell as found on market pages.
///
/// Thousands separators, currency markers (₹, Rs., INR, $), percent signs,
/// a leading `+` and a trailing `Cr` are ignored. Returns `None` for anything
/// that is still not a finite number.
pub fn parse_number(raw: &str) -> Option<f64> {
    let mut s = raw.trim().to_string();
    for token in ["₹", "Rs.", "INR", "$", "%", ",", "Cr", "cr"] {
        s = s.replace(token, "");
    }
    let s = s.trim().trim_start_matches('+').trim();
    if s.is_empty() {
        return None;
    }
    // (1,234.5) accounting negatives
    let value = if s.starts_with('(') && s.ends_with(')') {
        s[1..s.len() - 1].trim().parse::<f64>().ok().map(|v| -v)
    } else {
        s.parse::<f64>().ok()
    };
    value.filter(|v| v.is_finite())
}

pub fn parse_count(raw: &str) -> Option<u32> {
    parse_number(raw).filter(|v| *v >= 0.0 && v.fract() == 0.0).map(|v| v as u32)
}

/// Split an absolute/percent change cell into its two numbers.
pub fn parse_change_cell(raw: &str) -> Option<(f64, f64)> {
    let caps = CHANGE_CELL.as_ref()?.captures(raw)?;
    let abs = parse_number(caps.get(1)?.as_str())?;
    let pct = parse_number(caps.get(2)?.as_str())?;
    Some((abs, pct))
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Collapse runs of whitespace and trim.
pub fn squash_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_number_tolerates_symbols() {
        assert_eq!(parse_number("1,234.50"), Some(1234.5));
        assert_eq!(parse_number("₹ 22,150.10"), Some(22150.1));
        assert_eq!(parse_number("INR 1,024.7 Cr"), Some(1024.7));
        assert_eq!(parse_number("$78.20"), Some(78.2));
        assert_eq!(parse_number("+1.25%"), Some(1.25));
        assert_eq!(parse_number("-3,410.22"), Some(-3410.22));
        assert_eq!(parse_number("(512.00)"), Some(-512.0));
    }

    #[test]
    fn test_parse_number_rejects_text() {
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("--"), None);
        assert_eq!(parse_number("N/A"), None);
        assert_eq!(parse_number("NaN"), None);
    }

    #[test]
    fn test_parse_count() {
        assert_eq!(parse_count("12"), Some(12));
        assert_eq!(parse_count("1,204"), Some(1204));
        assert_eq!(parse_count("3.5"), None);
        assert_eq!(parse_count("-2"), None);
    }

    #[test]
    fn test_parse_change_cell() {
        assert_eq!(parse_change_cell("33.93 (20.0%)"), Some((33.93, 20.0)));
        assert_eq!(parse_change_cell("-4.10 (-1.2%)"), Some((-4.1, -1.2)));
        assert_eq!(parse_change_cell("1,204.5 (3.1)"), Some((1204.5, 3.1)));
        assert_eq!(parse_change_cell("unchanged"), None);
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(1.23456), 1.23);
        assert_eq!(round2(-1.23789), -1.24);
    }
}
