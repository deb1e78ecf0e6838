//! Delay parsing for command-line timers.
//!
//! Applet countdowns accept either raw seconds ("240") or the same
//! human-readable forms the configuration file takes ("4m", "2m 30s").

use std::time::Duration;

/// Parse a delay string into a whole-second `Duration`.
///
/// A bare integer is read as seconds; anything else goes through
/// [`humantime::parse_duration`], so "30m", "30min" and "1h 30m" are all
/// accepted.
///
/// # Examples
/// ```
/// use std::time::Duration;
/// use topogen::utils::duration::parse_delay;
///
/// assert_eq!(parse_delay("240"), Ok(Duration::from_secs(240)));
/// assert_eq!(parse_delay("4m"), Ok(Duration::from_secs(240)));
/// assert_eq!(parse_delay("2m 30s"), Ok(Duration::from_secs(150)));
/// assert!(parse_delay("soon").is_err());
/// ```
pub fn parse_delay(delay: &str) -> Result<Duration, String> {
    let delay = delay.trim();
    if let Ok(seconds) = delay.parse::<u64>() {
        return Ok(Duration::from_secs(seconds));
    }

    let duration = humantime::parse_duration(delay)
        .map_err(|e| format!("Invalid delay '{}': {}", delay, e))?;
    // applet countdowns only take whole seconds
    if duration.subsec_nanos() != 0 {
        return Err(format!("Delay '{}' is not a whole number of seconds", delay));
    }
    Ok(duration)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_delay_units() {
        assert_eq!(parse_delay("120"), Ok(Duration::from_secs(120)));
        assert_eq!(parse_delay("0"), Ok(Duration::ZERO));
        assert_eq!(parse_delay("90s"), Ok(Duration::from_secs(90)));
        assert_eq!(parse_delay("90sec"), Ok(Duration::from_secs(90)));
        assert_eq!(parse_delay("2m"), Ok(Duration::from_secs(120)));
        assert_eq!(parse_delay("2minutes"), Ok(Duration::from_secs(120)));
        assert_eq!(parse_delay("1h"), Ok(Duration::from_secs(3600)));
        assert_eq!(parse_delay(" 4min "), Ok(Duration::from_secs(240)));
    }

    #[test]
    fn test_parse_delay_accepts_compound_forms() {
        assert_eq!(parse_delay("2m 30s"), Ok(Duration::from_secs(150)));
        assert_eq!(parse_delay("1h30m"), Ok(Duration::from_secs(5400)));
    }

    #[test]
    fn test_parse_delay_matches_config_grammar() {
        // the same text must mean the same delay in a config file
        #[derive(serde::Deserialize)]
        struct Timer {
            #[serde(with = "humantime_serde")]
            delay: Duration,
        }
        for text in ["90s", "4m", "2m 30s", "1h 5m"] {
            let timer: Timer = serde_yaml::from_str(&format!("delay: {text}")).unwrap();
            assert_eq!(parse_delay(text), Ok(timer.delay), "{text}");
        }
    }

    #[test]
    fn test_parse_delay_rejects_garbage() {
        assert!(parse_delay("").is_err());
        assert!(parse_delay("m").is_err());
        assert!(parse_delay("5x").is_err());
        assert!(parse_delay("5minutesx").is_err());
        assert!(parse_delay("-5").is_err());
        assert!(parse_delay("1500ms").is_err());
    }
}
