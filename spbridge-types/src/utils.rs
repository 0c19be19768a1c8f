use std::time::{SystemTime, UNIX_EPOCH};

/// Get the current unix timestamp in milliseconds
pub fn timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Validate a name used as a topic level (group, node or device id)
pub fn validate_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("name string must not be empty".into());
    }
    for c in name.chars() {
        if matches!(c, '+' | '/' | '#') {
            return Err(format!(
                "name string {name} cannot contain '+', '/' or '#' characters"
            ));
        }
    }
    Ok(())
}

/// Serde helper reading and writing a [std::time::Duration] as whole milliseconds.
pub mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_name_valid_strings() {
        assert!(validate_name("hello").is_ok());
        assert!(validate_name("line-3.press_7").is_ok());
    }

    #[test]
    fn test_validate_name_invalid_strings() {
        assert!(validate_name("").is_err());
        assert!(validate_name("hello+world").is_err());
        assert!(validate_name("hello/world").is_err());
        assert!(validate_name("hello#world").is_err());
    }

    #[test]
    fn durations_are_read_as_millis() {
        #[derive(serde::Deserialize, serde::Serialize)]
        struct Config {
            #[serde(with = "duration_ms")]
            delay: std::time::Duration,
        }
        let config: Config = serde_json::from_str(r#"{"delay": 1500}"#).unwrap();
        assert_eq!(config.delay, std::time::Duration::from_millis(1500));
        assert_eq!(serde_json::to_string(&config).unwrap(), r#"{"delay":1500}"#);
    }
}
