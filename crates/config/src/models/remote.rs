use std::time::Duration;

use crate::validation::{ConfigValidator, ValidationUtils};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub base_url: String,
    pub timeout_seconds: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            timeout_seconds: 30,
        }
    }
}

impl RemoteConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl ConfigValidator for RemoteConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        ValidationUtils::validate_url(&self.base_url, "remote.base_url")?;
        ValidationUtils::validate_timeout_seconds(self.timeout_seconds, "remote.timeout_seconds")?;
        Ok(())
    }
}
