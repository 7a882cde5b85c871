use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::queue::DEFAULT_QUEUE_CAPACITY;
use crate::wire::MAX_PAYLOAD_LEN;

/// 1500-byte MTU minus IP, UDP and UDT headers.
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 1456;
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(10);
pub const DEFAULT_FLOW_WINDOW: usize = 1024;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SenderConfigInput {
    pub queue_capacity: Option<usize>,
    pub poll_timeout_ms: Option<u64>,
    pub max_payload_size: Option<usize>,
    pub thread_name: Option<String>,
    pub session: SessionConfigInput,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SessionConfigInput {
    pub flow_window: Option<usize>,
    pub destination_id: Option<u32>,
}

/// Initial session parameters. The flow window may change later through
/// [`Session::set_flow_window_size`](crate::session::Session::set_flow_window_size).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub flow_window: usize,
    pub destination_id: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            flow_window: DEFAULT_FLOW_WINDOW,
            destination_id: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SenderConfig {
    /// Ingress queue bound, in packets.
    pub queue_capacity: usize,
    /// Bounded wait on the ingress queue per loop iteration.
    pub poll_timeout: Duration,
    /// Fragment size used by `write()`.
    pub max_payload_size: usize,
    pub thread_name: String,
    pub session: SessionConfig,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            thread_name: "udt-sender".into(),
            session: SessionConfig::default(),
        }
    }
}

impl SenderConfigInput {
    pub fn resolve(self) -> Result<SenderConfig, ConfigError> {
        let defaults = SenderConfig::default();

        let queue_capacity = self.queue_capacity.unwrap_or(defaults.queue_capacity);
        if queue_capacity == 0 {
            return Err(ConfigError::ZeroQueueCapacity);
        }

        let poll_timeout = self
            .poll_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(defaults.poll_timeout);
        if poll_timeout.is_zero() {
            return Err(ConfigError::ZeroPollTimeout);
        }

        let max_payload_size = self.max_payload_size.unwrap_or(defaults.max_payload_size);
        if max_payload_size == 0 || max_payload_size > MAX_PAYLOAD_LEN {
            return Err(ConfigError::PayloadSize(max_payload_size));
        }

        let thread_name = self
            .thread_name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .unwrap_or(defaults.thread_name);

        let flow_window = self
            .session
            .flow_window
            .unwrap_or(defaults.session.flow_window);
        if flow_window == 0 {
            return Err(ConfigError::ZeroFlowWindow);
        }

        let session = SessionConfig {
            flow_window,
            destination_id: self
                .session
                .destination_id
                .unwrap_or(defaults.session.destination_id),
        };

        Ok(SenderConfig {
            queue_capacity,
            poll_timeout,
            max_payload_size,
            thread_name,
            session,
        })
    }
}

impl SenderConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        if input.trim().is_empty() {
            return Ok(SenderConfig::default());
        }
        let parsed: SenderConfigInput = toml::from_str(input)?;
        parsed.resolve()
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_gives_defaults() {
        let cfg = SenderConfig::from_toml_str("  \n").unwrap();
        assert_eq!(cfg.queue_capacity, 1024);
        assert_eq!(cfg.poll_timeout, Duration::from_millis(10));
        assert_eq!(cfg.max_payload_size, 1456);
        assert_eq!(cfg.thread_name, "udt-sender");
        assert_eq!(cfg.session, SessionConfig::default());
    }

    #[test]
    fn parse_toml_config_basic() {
        let toml = r#"
            queue_capacity = 64
            poll_timeout_ms = 5
            max_payload_size = 1200
            thread_name = "  uplink  "

            [session]
            flow_window = 32
            destination_id = 77
        "#;
        let cfg = SenderConfig::from_toml_str(toml).unwrap();
        assert_eq!(cfg.queue_capacity, 64);
        assert_eq!(cfg.poll_timeout, Duration::from_millis(5));
        assert_eq!(cfg.max_payload_size, 1200);
        assert_eq!(cfg.thread_name, "uplink");
        assert_eq!(cfg.session.flow_window, 32);
        assert_eq!(cfg.session.destination_id, 77);
    }

    #[test]
    fn blank_thread_name_falls_back() {
        let cfg = SenderConfig::from_toml_str("thread_name = \"   \"").unwrap();
        assert_eq!(cfg.thread_name, "udt-sender");
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(matches!(
            SenderConfig::from_toml_str("queue_capacity = 0"),
            Err(ConfigError::ZeroQueueCapacity)
        ));
        assert!(matches!(
            SenderConfig::from_toml_str("poll_timeout_ms = 0"),
            Err(ConfigError::ZeroPollTimeout)
        ));
        assert!(matches!(
            SenderConfig::from_toml_str("max_payload_size = 0"),
            Err(ConfigError::PayloadSize(0))
        ));
        assert!(matches!(
            SenderConfig::from_toml_str("max_payload_size = 70000"),
            Err(ConfigError::PayloadSize(70000))
        ));
        assert!(matches!(
            SenderConfig::from_toml_str("[session]\nflow_window = 0"),
            Err(ConfigError::ZeroFlowWindow)
        ));
    }

    #[test]
    fn rejects_malformed_toml() {
        assert!(matches!(
            SenderConfig::from_toml_str("queue_capacity = \"many\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn missing_file_is_read_error() {
        assert!(matches!(
            SenderConfig::from_file("/nonexistent/udt-sender.toml"),
            Err(ConfigError::Read(_))
        ));
    }
}
