use crate::regex;

/// Converts a duration rendered by the portal (`"2시간"`, `"1시간15분"`, `"45분"`) into
/// minutes. Units that are missing or unreadable count as zero.
pub fn parse_duration(text: &str) -> u32 {
    let hours = capture_number(regex!(r"(\d+)\s*시간"), text);
    let minutes = capture_number(regex!(r"(\d+)\s*분"), text);

    hours.saturating_mul(60).saturating_add(minutes)
}

fn capture_number(pattern: &regex::Regex, text: &str) -> u32 {
    pattern
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::parse_duration;

    #[test]
    fn parses_hours_only() {
        assert_eq!(parse_duration("2시간"), 120);
    }

    #[test]
    fn parses_hours_and_minutes() {
        assert_eq!(parse_duration("1시간15분"), 75);
        assert_eq!(parse_duration("1시간 15분"), 75);
    }

    #[test]
    fn parses_minutes_only() {
        assert_eq!(parse_duration("45분"), 45);
    }

    #[test]
    fn parses_multi_digit_units() {
        assert_eq!(parse_duration("12시간45분"), 765);
        assert_eq!(parse_duration("130분"), 130);
    }

    #[test]
    fn unrecognized_text_is_zero() {
        assert_eq!(parse_duration(""), 0);
        assert_eq!(parse_duration("unknown"), 0);
        assert_eq!(parse_duration("시간"), 0);
    }

    #[test]
    fn overflowing_unit_is_ignored() {
        assert_eq!(parse_duration("99999999999시간5분"), 5);
    }
}
