//! Configuration validation - validates configs and creates final TunnelConfigs.

use std::collections::HashSet;
use std::time::Duration;

use hickory_proto::rr::Name;

use super::types::{Config, SessionConfig, TunnelConfig};

/// The shortest name budget that still fits one full label.
const MIN_MAX_NAME_LENGTH: usize = 64;

const MAX_MAX_NAME_LENGTH: usize = 253;

/// Validates configs and returns the startable tunnel configs.
pub fn create_tunnel_configs(all_configs: Vec<Config>) -> std::io::Result<Vec<TunnelConfig>> {
    let mut bind_locations = HashSet::new();
    let mut tunnel_configs = Vec::with_capacity(all_configs.len());

    for config in all_configs {
        if !bind_locations.insert(config.bind_location) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("duplicate bind location: {}", config.bind_location),
            ));
        }
        tunnel_configs.push(validate_tunnel_config(config)?);
    }

    Ok(tunnel_configs)
}

fn validate_tunnel_config(config: Config) -> std::io::Result<TunnelConfig> {
    let Config {
        bind_location,
        domain,
        backend,
        idle_timeout_secs,
        max_name_length,
        max_sessions,
        session_queue_size,
    } = config;

    let domain = parse_domain(&domain)?;

    if idle_timeout_secs == 0 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "idle_timeout_secs must be greater than zero",
        ));
    }

    if !(MIN_MAX_NAME_LENGTH..=MAX_MAX_NAME_LENGTH).contains(&max_name_length) {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!(
                "max_name_length must be between {MIN_MAX_NAME_LENGTH} and {MAX_MAX_NAME_LENGTH}, got {max_name_length}"
            ),
        ));
    }

    if max_sessions == 0 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "max_sessions must be greater than zero",
        ));
    }

    if session_queue_size == 0 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "session_queue_size must be greater than zero",
        ));
    }

    Ok(TunnelConfig {
        bind_location,
        domain,
        backend,
        session: SessionConfig {
            idle_timeout: Duration::from_secs(idle_timeout_secs),
            max_name_length,
            queue_size: session_queue_size,
        },
        max_sessions,
    })
}

/// Parses the tunnel zone into a lowercased fully qualified name.
fn parse_domain(domain: &str) -> std::io::Result<Name> {
    let trimmed = domain.trim().trim_end_matches('.');
    if trimmed.is_empty() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "domain must not be empty",
        ));
    }

    let name = Name::from_ascii(format!("{trimmed}.")).map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("invalid domain {domain}: {e}"),
        )
    })?;

    Ok(name.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_configs;

    fn config_with(extra: &str) -> Config {
        let yaml = format!(
            "bind_location: \"127.0.0.1:5353\"\ndomain: T.Example.com\nbackend: \"127.0.0.1:22\"\n{extra}"
        );
        parse_configs(&yaml).unwrap().remove(0)
    }

    #[test]
    fn test_validate_config_success() {
        let configs = create_tunnel_configs(vec![config_with("idle_timeout_secs: 5")]).unwrap();
        assert_eq!(configs.len(), 1);

        let config = &configs[0];
        assert_eq!(config.domain, Name::from_ascii("t.example.com.").unwrap());
        assert!(config.domain.is_fqdn());
        assert_eq!(config.session.idle_timeout, Duration::from_secs(5));
        assert_eq!(config.session.max_name_length, 253);
    }

    #[test]
    fn test_trailing_dot_domain() {
        let domain = parse_domain("tunnel.example.org.").unwrap();
        assert_eq!(domain.to_ascii(), "tunnel.example.org.");
    }

    #[test]
    fn test_empty_config() {
        assert!(create_tunnel_configs(vec![]).unwrap().is_empty());
    }

    #[test]
    fn test_reject_zero_idle_timeout() {
        assert!(create_tunnel_configs(vec![config_with("idle_timeout_secs: 0")]).is_err());
    }

    #[test]
    fn test_reject_max_name_length_out_of_range() {
        assert!(create_tunnel_configs(vec![config_with("max_name_length: 63")]).is_err());
        assert!(create_tunnel_configs(vec![config_with("max_name_length: 254")]).is_err());
        assert!(create_tunnel_configs(vec![config_with("max_name_length: 64")]).is_ok());
    }

    #[test]
    fn test_reject_zero_capacities() {
        assert!(create_tunnel_configs(vec![config_with("max_sessions: 0")]).is_err());
        assert!(create_tunnel_configs(vec![config_with("session_queue_size: 0")]).is_err());
    }

    #[test]
    fn test_reject_empty_domain() {
        assert!(parse_domain("").is_err());
        assert!(parse_domain(".").is_err());
    }

    #[test]
    fn test_reject_duplicate_bind_location() {
        let result = create_tunnel_configs(vec![config_with(""), config_with("")]);
        assert!(result.is_err());
    }
}
