use std::time::Duration;

use crate::error::{Error, Result};

///
/// Parse a ban length such as `0`, `90s`, `30m`, `24h`, `7d`, `2w` or a
/// combination like `1h30m`. A bare number is seconds; `0` means permanent.
/// Once a unit appears every number needs one.
///
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return Err(Error::InvalidDuration(s.to_string()));
    }

    let invalid = || Error::InvalidDuration(s.to_string());
    let mut total: u64 = 0;
    let mut num = String::new();
    let mut seen_unit = false;

    for c in s.chars() {
        if c.is_ascii_digit() {
            num.push(c);
            continue;
        }

        let unit = match c {
            's' => 1,
            'm' => 60,
            'h' => 60 * 60,
            'd' => 24 * 60 * 60,
            'w' => 7 * 24 * 60 * 60,
            _ => return Err(invalid()),
        };
        if num.is_empty() {
            return Err(invalid());
        }
        let n: u64 = num.parse().map_err(|_| invalid())?;
        total = n
            .checked_mul(unit)
            .and_then(|secs| total.checked_add(secs))
            .ok_or_else(invalid)?;
        num.clear();
        seen_unit = true;
    }

    // `1h30` is ambiguous, so a unit-less tail is only allowed on its own.
    if !num.is_empty() {
        if seen_unit {
            return Err(invalid());
        }
        let n: u64 = num.parse().map_err(|_| invalid())?;
        total = total.checked_add(n).ok_or_else(invalid)?;
    }

    Ok(Duration::from_secs(total))
}

///
/// Inverse of `parse_duration` for confirmation messages, e.g. `1d2h`.
///
pub fn format_duration(d: Duration) -> String {
    let mut secs = d.as_secs();
    if secs == 0 {
        return "0s".to_string();
    }

    let mut s = String::new();
    for (unit, name) in [(86400, 'd'), (3600, 'h'), (60, 'm'), (1, 's')] {
        if secs >= unit {
            s += &format!("{}{}", secs / unit, name);
            secs %= unit;
        }
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("0").unwrap(), Duration::ZERO);
        assert_eq!(parse_duration("90").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("90s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("30m").unwrap(), Duration::from_secs(1800));
        assert_eq!(parse_duration("24h").unwrap(), Duration::from_secs(86400));
        assert_eq!(parse_duration("7d").unwrap(), Duration::from_secs(7 * 86400));
        assert_eq!(parse_duration("2w").unwrap(), Duration::from_secs(14 * 86400));
        assert_eq!(parse_duration(" 1h30m ").unwrap(), Duration::from_secs(5400));
    }

    #[test]
    fn test_parse_duration_invalid() {
        for s in ["", "h", "1x", "-1h", "1.5h", "99999999999999999999d", "1h30", "0h5"] {
            let r = parse_duration(s);
            assert!(matches!(r, Err(Error::InvalidDuration(_))), "{:?}", s);
        }
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::ZERO), "0s");
        assert_eq!(format_duration(Duration::from_secs(5400)), "1h30m");
        assert_eq!(format_duration(Duration::from_secs(86400 + 7200 + 5)), "1d2h5s");
        assert_eq!(format_duration(parse_duration("7d").unwrap()), "7d");
    }
}
