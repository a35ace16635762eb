//! Configuration types.

use std::net::SocketAddr;
use std::time::Duration;

use hickory_proto::rr::Name;
use serde::Deserialize;

use crate::address::NetLocation;

pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 60;

/// Longest presentation-format domain name.
pub const DEFAULT_MAX_NAME_LENGTH: usize = 253;

pub const DEFAULT_MAX_SESSIONS: usize = 256;

pub const DEFAULT_SESSION_QUEUE_SIZE: usize = 64;

fn default_idle_timeout_secs() -> u64 {
    DEFAULT_IDLE_TIMEOUT_SECS
}

fn default_max_name_length() -> usize {
    DEFAULT_MAX_NAME_LENGTH
}

fn default_max_sessions() -> usize {
    DEFAULT_MAX_SESSIONS
}

fn default_session_queue_size() -> usize {
    DEFAULT_SESSION_QUEUE_SIZE
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(item) => vec![item],
            OneOrMany::Many(items) => items,
        }
    }
}

/// A tunnel server entry as written in the YAML file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(alias = "address", alias = "bind")]
    pub bind_location: SocketAddr,
    /// Zone the tunnel answers for, e.g. `t.example.com`.
    pub domain: String,
    #[serde(alias = "target")]
    pub backend: NetLocation,
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_max_name_length")]
    pub max_name_length: usize,
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
    #[serde(default = "default_session_queue_size")]
    pub session_queue_size: usize,
}

/// A validated tunnel server config, ready to start.
#[derive(Debug, Clone)]
pub struct TunnelConfig {
    pub bind_location: SocketAddr,
    /// Lowercased, fully qualified tunnel zone.
    pub domain: Name,
    pub backend: NetLocation,
    pub session: SessionConfig,
    pub max_sessions: usize,
}

/// Settings shared by every session of one tunnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub idle_timeout: Duration,
    /// Upper bound on the length of an encoded CNAME answer.
    pub max_name_length: usize,
    pub queue_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
            max_name_length: DEFAULT_MAX_NAME_LENGTH,
            queue_size: DEFAULT_SESSION_QUEUE_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_configs;

    #[test]
    fn test_parse_minimal_config() {
        let yaml = r#"
bind_location: "0.0.0.0:5353"
domain: t.example.com
backend: "127.0.0.1:22"
"#;
        let configs = parse_configs(yaml).unwrap();
        assert_eq!(configs.len(), 1);
        let config = &configs[0];
        assert_eq!(config.bind_location, "0.0.0.0:5353".parse().unwrap());
        assert_eq!(config.domain, "t.example.com");
        assert_eq!(config.backend.port(), 22);
        assert_eq!(config.idle_timeout_secs, DEFAULT_IDLE_TIMEOUT_SECS);
        assert_eq!(config.max_name_length, DEFAULT_MAX_NAME_LENGTH);
        assert_eq!(config.max_sessions, DEFAULT_MAX_SESSIONS);
        assert_eq!(config.session_queue_size, DEFAULT_SESSION_QUEUE_SIZE);
    }

    #[test]
    fn test_parse_config_list_with_aliases() {
        let yaml = r#"
- address: "127.0.0.1:53"
  domain: a.example.com
  target: "backend.internal:8080"
  idle_timeout_secs: 30
- bind: "[::1]:53"
  domain: b.example.com
  backend: "127.0.0.1:22"
  max_name_length: 120
"#;
        let configs = parse_configs(yaml).unwrap();
        assert_eq!(configs.len(), 2);
        assert_eq!(configs[0].idle_timeout_secs, 30);
        assert_eq!(configs[0].backend.to_string(), "backend.internal:8080");
        assert_eq!(configs[1].max_name_length, 120);
    }

    #[test]
    fn test_reject_unknown_field() {
        let yaml = r#"
bind_location: "0.0.0.0:53"
domain: t.example.com
backend: "127.0.0.1:22"
idle_timeout: 10
"#;
        assert!(parse_configs(yaml).is_err());
    }

    #[test]
    fn test_reject_missing_backend() {
        let yaml = r#"
bind_location: "0.0.0.0:53"
domain: t.example.com
"#;
        assert!(parse_configs(yaml).is_err());
    }
}
