//! Configuration for tunnel servers.
//!
//! - [`types`]: the YAML-facing [`Config`] and the validated [`TunnelConfig`]
//! - [`validate`]: turns parsed configs into startable tunnel configs
//!
//! The main entry points are [`load_configs`] and [`create_tunnel_configs`].

mod types;
mod validate;

pub use types::*;
pub use validate::create_tunnel_configs;

/// Loads configuration files from the provided paths.
///
/// Reads each file, parses it as YAML, and returns the combined list of configs.
pub async fn load_configs(args: &[String]) -> std::io::Result<Vec<Config>> {
    let mut all_configs = vec![];
    for config_filename in args {
        let config_bytes = match tokio::fs::read(config_filename).await {
            Ok(b) => b,
            Err(e) => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("Could not read config file {config_filename}: {e}"),
                ));
            }
        };

        let config_str = match String::from_utf8(config_bytes) {
            Ok(s) => s,
            Err(e) => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("Could not parse config file {config_filename} as UTF8: {e}"),
                ));
            }
        };

        let mut configs = parse_configs(&config_str).map_err(|e| {
            std::io::Error::new(
                e.kind(),
                format!("Could not parse config file {config_filename} as config YAML: {e}"),
            )
        })?;
        all_configs.append(&mut configs)
    }

    Ok(all_configs)
}

/// Parses a YAML document holding either one tunnel config or a list of them.
pub fn parse_configs(config_str: &str) -> std::io::Result<Vec<Config>> {
    let configs = serde_yaml::from_str::<OneOrMany<Config>>(config_str)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()))?;
    Ok(configs.into_vec())
}
