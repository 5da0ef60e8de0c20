use super::CseConfig;
use serde::Deserialize;
use std::time::Duration;

/// Timing and concurrency limits.
#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_collector_concurrency")]
    pub collector_concurrency: usize,
    #[serde(default = "default_registration_interval")]
    pub registration_interval_secs: u64,
}

fn default_request_timeout() -> u64 {
    20
}

fn default_collector_concurrency() -> usize {
    16
}

fn default_registration_interval() -> u64 {
    300
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout(),
            collector_concurrency: default_collector_concurrency(),
            registration_interval_secs: default_registration_interval(),
        }
    }
}

impl RuntimeConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn registration_interval(&self) -> Duration {
        Duration::from_secs(self.registration_interval_secs.max(1))
    }
}

impl CseConfig {
    /// Applies `CSE_ID`, `CSE_NAME`, `CSE_SP`, `CSE_INPOA`, `PORT` and
    /// `MQTT_URL` from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = lookup("CSE_ID") {
            self.cse.id = v.trim_start_matches('/').to_string();
        }
        if let Some(v) = lookup("CSE_NAME") {
            self.cse.name = v;
        }
        if let Some(v) = lookup("CSE_SP") {
            self.cse.sp = v;
        }
        if let Some(v) = lookup("CSE_INPOA") {
            self.cse.inpoa = Some(v);
        }
        if let Some(v) = lookup("PORT") {
            if let Ok(port) = v.parse::<u16>() {
                self.http.port = port;
            }
        }
        if let Some(v) = lookup("MQTT_URL") {
            self.mqtt.url = Some(v);
            self.mqtt.enabled = true;
        }
    }
}
