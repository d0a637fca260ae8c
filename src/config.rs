use std::env;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub event_buffer_size: usize,
    /// Hours between parcel creation and its delivery deadline.
    pub sla_hours: i64,
    pub tracking_prefix: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3000,
            log_level: "info".to_string(),
            event_buffer_size: 1024,
            sla_hours: 72,
            tracking_prefix: "PF".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();
        let defaults = Self::default();

        Self {
            http_port: parse_or_default("HTTP_PORT", defaults.http_port)?,
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", defaults.event_buffer_size)?,
            sla_hours: parse_or_default("SLA_HOURS", defaults.sla_hours)?,
            tracking_prefix: env::var("TRACKING_PREFIX").unwrap_or(defaults.tracking_prefix),
        }
        .validated()
    }

    /// Checks the settings and normalizes the tracking prefix to uppercase, the form
    /// tracking lookups compare against.
    pub fn validated(mut self) -> Result<Self, AppError> {
        if self.sla_hours <= 0 {
            return Err(AppError::Internal("invalid SLA_HOURS: must be > 0".to_string()));
        }

        self.tracking_prefix = self.tracking_prefix.trim().to_ascii_uppercase();
        if self.tracking_prefix.is_empty()
            || !self
                .tracking_prefix
                .chars()
                .all(|c| c.is_ascii_alphanumeric())
        {
            return Err(AppError::Internal(
                "invalid TRACKING_PREFIX: must be non-empty ascii alphanumeric".to_string(),
            ));
        }

        Ok(self)
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::Config;

    #[test]
    fn tracking_prefix_is_uppercased() {
        let config = Config {
            tracking_prefix: " pf2 ".to_string(),
            ..Config::default()
        }
        .validated()
        .unwrap();
        assert_eq!(config.tracking_prefix, "PF2");
    }

    #[test]
    fn bad_prefix_and_sla_are_rejected() {
        let dashed = Config {
            tracking_prefix: "P-F".to_string(),
            ..Config::default()
        };
        assert!(dashed.validated().is_err());

        let no_sla = Config {
            sla_hours: 0,
            ..Config::default()
        };
        assert!(no_sla.validated().is_err());
    }
}
