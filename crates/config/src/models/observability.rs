use crate::validation::{ConfigValidator, ValidationUtils};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            _ => Err(format!("Invalid log format: {s}. Valid formats: json, pretty")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub log_format: LogFormat,
    pub metrics_enabled: bool,
    pub metrics_listen: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_listen: "127.0.0.1:9464".to_string(),
        }
    }
}

impl ConfigValidator for ObservabilityConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(crate::ConfigError::Validation(format!(
                "Invalid log level: {}. Valid levels: {:?}",
                self.log_level, valid_levels
            )));
        }

        if self.metrics_enabled {
            ValidationUtils::validate_not_empty(
                &self.metrics_listen,
                "observability.metrics_listen",
            )?;
            self.metrics_listen
                .parse::<std::net::SocketAddr>()
                .map_err(|e| {
                    crate::ConfigError::Validation(format!(
                        "observability.metrics_listen is not a socket address: {e}"
                    ))
                })?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parse() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_observability_validation() {
        assert!(ObservabilityConfig::default().validate().is_ok());

        let config = ObservabilityConfig {
            log_level: "verbose".to_string(),
            ..ObservabilityConfig::default()
        };
        assert!(config.validate().is_err());

        let config = ObservabilityConfig {
            metrics_enabled: true,
            metrics_listen: "not-an-address".to_string(),
            ..ObservabilityConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
