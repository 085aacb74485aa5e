//! Duration text to total minutes

use once_cell::sync::Lazy;
use regex::Regex;

use super::error::ConversionError;

static DURATION_TEXT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?ix)^\s*
        (?:(?P<h>\d+(?:\.\d+)?)\s*(?:hours?|hrs?|h)\b)?
        \s*,?\s*
        (?:(?P<m>\d+(?:\.\d+)?)\s*(?:minutes?|mins?|m)\b)?
        \s*,?\s*
        (?:(?P<s>\d+(?:\.\d+)?)\s*(?:seconds?|secs?|s)\b)?
        \s*$",
    )
    .unwrap()
});

static DURATION_CLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(\d+):([0-5]?\d):([0-5]?\d)\s*$").unwrap());

/// Parse a duration into total minutes.
///
/// Accepts "`<n> hours, <n> minutes, <n> seconds`" with any subset of the
/// components present, and `H:MM:SS` clock form. Missing components count
/// as zero. Empty or unrecognised text is an error; callers record it as a
/// warning and store null.
pub fn parse_duration_minutes(raw: &str) -> Result<f64, ConversionError> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(ConversionError::Duration(raw.to_string()));
    }

    if let Some(caps) = DURATION_CLOCK.captures(text) {
        let part = |i: usize| {
            caps.get(i)
                .and_then(|m| m.as_str().parse::<f64>().ok())
                .unwrap_or(0.0)
        };
        return Ok(part(1) * 60.0 + part(2) + part(3) / 60.0);
    }

    let caps = DURATION_TEXT
        .captures(text)
        .ok_or_else(|| ConversionError::Duration(raw.to_string()))?;

    let mut matched = false;
    let mut component = |name: &str| -> Result<f64, ConversionError> {
        match caps.name(name) {
            Some(m) => {
                matched = true;
                m.as_str()
                    .parse::<f64>()
                    .map_err(|_| ConversionError::Duration(raw.to_string()))
            }
            None => Ok(0.0),
        }
    };
    let hours = component("h")?;
    let minutes = component("m")?;
    let seconds = component("s")?;

    if !matched {
        return Err(ConversionError::Duration(raw.to_string()));
    }
    Ok(hours * 60.0 + minutes + seconds / 60.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_duration() {
        assert_eq!(
            parse_duration_minutes("2 hours, 15 minutes, 30 seconds").unwrap(),
            135.5
        );
    }

    #[test]
    fn test_partial_durations() {
        assert_eq!(parse_duration_minutes("45 minutes").unwrap(), 45.0);
        assert_eq!(parse_duration_minutes("1 hour").unwrap(), 60.0);
        assert_eq!(parse_duration_minutes("30 seconds").unwrap(), 0.5);
        assert_eq!(parse_duration_minutes("1 hour, 30 seconds").unwrap(), 60.5);
        assert_eq!(parse_duration_minutes("12 mins").unwrap(), 12.0);
    }

    #[test]
    fn test_clock_form() {
        assert_eq!(parse_duration_minutes("01:30:30").unwrap(), 90.5);
        assert_eq!(parse_duration_minutes("0:05:00").unwrap(), 5.0);
    }

    #[test]
    fn test_rejects_empty_and_malformed() {
        assert!(matches!(
            parse_duration_minutes(""),
            Err(ConversionError::Duration(_))
        ));
        assert!(parse_duration_minutes("   ").is_err());
        assert!(parse_duration_minutes("soon").is_err());
        assert!(parse_duration_minutes("15 fortnights").is_err());
        assert!(parse_duration_minutes(",").is_err());
    }
}
