//! Interval strings such as `30s`, `15m`, `6h`, `7d` or bare seconds.

/// Parse an interval string into a count of seconds.
pub fn parse_interval(s: &str) -> Result<i64, String> {
    let s = s.trim().to_lowercase();

    let (digits, multiplier) = if let Some(days) = s.strip_suffix('d') {
        (days, 86400)
    } else if let Some(hours) = s.strip_suffix('h') {
        (hours, 3600)
    } else if let Some(minutes) = s.strip_suffix('m') {
        (minutes, 60)
    } else if let Some(secs) = s.strip_suffix('s') {
        (secs, 1)
    } else {
        (s.as_str(), 1)
    };

    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(format!(
            "Invalid interval: {}. Use a number or a number with suffix like '30s', '15m', '6h', '7d'",
            s
        ));
    }

    digits
        .parse::<i64>()
        .ok()
        .and_then(|n| n.checked_mul(multiplier))
        .ok_or_else(|| format!("Interval out of range: {}", s))
}

/// Render seconds as a compact human string, e.g. `1d 2h 5m`.
pub fn format_interval(secs: i64) -> String {
    if secs <= 0 {
        return "0s".to_string();
    }

    let (days, rest) = (secs / 86400, secs % 86400);
    let (hours, rest) = (rest / 3600, rest % 3600);
    let (minutes, seconds) = (rest / 60, rest % 60);

    [(days, 'd'), (hours, 'h'), (minutes, 'm'), (seconds, 's')]
        .iter()
        .filter(|(n, _)| *n > 0)
        .map(|(n, unit)| format!("{}{}", n, unit))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_interval() {
        assert_eq!(parse_interval("1h").unwrap(), 3600);
        assert_eq!(parse_interval("30m").unwrap(), 1800);
        assert_eq!(parse_interval("7d").unwrap(), 604800);
        assert_eq!(parse_interval("60s").unwrap(), 60);
        assert_eq!(parse_interval("900").unwrap(), 900);
        assert_eq!(parse_interval(" 2H ").unwrap(), 7200);
    }

    #[test]
    fn test_parse_interval_rejects_garbage() {
        assert!(parse_interval("invalid").is_err());
        assert!(parse_interval("h").is_err());
        assert!(parse_interval("-5m").is_err());
        assert!(parse_interval("1.5h").is_err());
        assert!(parse_interval("").is_err());
    }

    #[test]
    fn test_format_interval() {
        assert_eq!(format_interval(3600), "1h");
        assert_eq!(format_interval(90), "1m 30s");
        assert_eq!(format_interval(86400 + 7200), "1d 2h");
        assert_eq!(format_interval(0), "0s");
    }
}
