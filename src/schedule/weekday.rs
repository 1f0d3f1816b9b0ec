//! Weekday vocabulary shared by configuration, scheduling, and reporting.
//!
//! Form configuration addresses days with the single-character tokens
//! 一二三四五六日 (Monday through Sunday), the same tokens the target
//! forms themselves use.

use chrono::Weekday;

/// Day tokens in Monday..Sunday order.
pub const TOKENS: [&str; 7] = ["一", "二", "三", "四", "五", "六", "日"];

const ENGLISH: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

/// Parse a day token. Returns `None` for anything that is not one of the
/// seven known tokens.
pub fn from_token(token: &str) -> Option<Weekday> {
    let idx = TOKENS.iter().position(|t| *t == token)?;
    Some(match idx {
        0 => Weekday::Mon,
        1 => Weekday::Tue,
        2 => Weekday::Wed,
        3 => Weekday::Thu,
        4 => Weekday::Fri,
        5 => Weekday::Sat,
        _ => Weekday::Sun,
    })
}

/// The single-character token for a weekday.
pub fn token(day: Weekday) -> &'static str {
    TOKENS[day.num_days_from_monday() as usize]
}

/// English day name, used for artifact filenames.
pub fn english(day: Weekday) -> &'static str {
    ENGLISH[day.num_days_from_monday() as usize]
}

/// Days whose forms carry a mandatory free-text reason field.
pub fn reason_required(day: Weekday) -> bool {
    matches!(day, Weekday::Sat | Weekday::Sun)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_round_trip() {
        for tok in TOKENS {
            let day = from_token(tok).unwrap();
            assert_eq!(token(day), tok);
        }
    }

    #[test]
    fn test_unknown_token_rejected() {
        assert!(from_token("月").is_none());
        assert!(from_token("Mon").is_none());
        assert!(from_token("").is_none());
    }

    #[test]
    fn test_reason_required_weekend_only() {
        assert!(reason_required(Weekday::Sat));
        assert!(reason_required(Weekday::Sun));
        assert!(!reason_required(Weekday::Mon));
        assert!(!reason_required(Weekday::Wed));
        assert!(!reason_required(Weekday::Fri));
    }

    #[test]
    fn test_english_names() {
        assert_eq!(english(Weekday::Wed), "Wednesday");
        assert_eq!(english(Weekday::Sun), "Sunday");
    }
}
