//! Serde helpers for the duration knobs of `app.yaml`.

use std::time::Duration;

use serde::{Deserialize, Deserializer, de::Error};

/// Reads a whole number of milliseconds.
pub fn deserialize_duration_from_ms<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let ms = u64::deserialize(deserializer)?;
    Ok(Duration::from_millis(ms))
}

/// Reads a number of seconds. Fractions are accepted (`bulk_delay_secs: 0.5`),
/// negative or non-finite values are not.
pub fn deserialize_duration_from_seconds<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let secs = f64::deserialize(deserializer)?;
    Duration::try_from_secs_f64(secs)
        .map_err(|e| D::Error::custom(format!("invalid duration of {secs} seconds: {e}")))
}
