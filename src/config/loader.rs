use std::path::Path;

use config::{Config, Environment, File, FileFormat};
use eyre::{Context, Result};

use crate::config::models::ForwarderConfig;

/// Prefix for environment overrides, e.g. `EDGE_FORWARDER__UPSTREAM__BASE_URL`.
pub const ENV_PREFIX: &str = "EDGE_FORWARDER";

/// Commented starting point written by `edge-forwarder init`.
pub const DEFAULT_CONFIG_TOML: &str = r#"# Edge Forwarder configuration
#
# Every key can also be set through the environment, e.g.
#   EDGE_FORWARDER__UPSTREAM__BASE_URL=https://links.example.com

# The address to listen on
listen_addr = "0.0.0.0:8080"

[upstream]
# Canonical backend that resolves short links (required)
base_url = "https://links.example.com"
# Budget for one upstream round trip
timeout = "10s"
connect_timeout = "5s"
# Immediate retries for connection failures only (0 = never retry)
connect_retries = 0
pool_idle_timeout = "90s"

[forwarding]
# Additional client headers passed to the upstream, e.g. ["referer"]
extra_headers = []
forwarded_proto = "https"

[identity]
proxy_tag = "edge-forwarder"
# Link shown on the error page
home_url = "https://links.example.com"
brand = "Edge Forwarder"

[limits]
max_body_bytes = 10485760
max_concurrent_upstream = 1024

[cors]
# Answer OPTIONS locally instead of forwarding it
answer_preflight = false

[logging]
level = "info"
# "json" or "pretty"
format = "json"
"#;

/// Values passed on the command line; they win over file and environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub upstream: Option<String>,
    pub listen_addr: Option<String>,
}

/// Load configuration from an optional file, the environment and CLI overrides.
/// Supports multiple formats: TOML, YAML, JSON, INI.
pub async fn load_config(
    config_path: Option<&str>,
    overrides: &ConfigOverrides,
) -> Result<ForwarderConfig> {
    load_config_sync(config_path, overrides)
}

/// Load configuration synchronously
pub fn load_config_sync(
    config_path: Option<&str>,
    overrides: &ConfigOverrides,
) -> Result<ForwarderConfig> {
    build_config(config_path, overrides, environment())
}

/// The environment source used by [`load_config`].
pub fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("forwarding.extra_headers")
}

pub(crate) fn build_config(
    config_path: Option<&str>,
    overrides: &ConfigOverrides,
    env: Environment,
) -> Result<ForwarderConfig> {
    let mut builder = Config::builder();

    if let Some(config_path) = config_path {
        let path = Path::new(config_path);
        builder = builder.add_source(File::new(
            path.to_str()
                .ok_or_else(|| eyre::eyre!("Invalid UTF-8 path: {}", path.display()))?,
            file_format(path),
        ));
    }

    let settings = builder
        .add_source(env)
        .set_override_option("upstream.base_url", overrides.upstream.clone())
        .wrap_err("Failed to apply --upstream override")?
        .set_override_option("listen_addr", overrides.listen_addr.clone())
        .wrap_err("Failed to apply --listen override")?
        .build()
        .with_context(|| match config_path {
            Some(path) => format!("Failed to build config from {path}"),
            None => "Failed to build config from environment".to_string(),
        })?;

    let config: ForwarderConfig = settings.try_deserialize().with_context(|| {
        format!(
            "Failed to deserialize config from {}",
            config_path.unwrap_or("environment")
        )
    })?;

    Ok(config)
}

// Determine file format based on extension
fn file_format(path: &Path) -> FileFormat {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => FileFormat::Yaml,
        Some("json") => FileFormat::Json,
        Some("ini") => FileFormat::Ini,
        _ => FileFormat::Toml,
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, io::Write, time::Duration};

    use tempfile::NamedTempFile;

    use super::*;
    use crate::config::ForwarderConfigValidator;

    fn no_env() -> Environment {
        Environment::default().source(Some(HashMap::new().into_iter().collect()))
    }

    fn env_from(vars: &[(&str, &str)]) -> Environment {
        let map = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<String, String>>();
        environment().source(Some(map.into_iter().collect()))
    }

    #[tokio::test]
    async fn test_load_toml_config() {
        let toml_content = r#"
listen_addr = "127.0.0.1:3000"

[upstream]
base_url = "https://backend.example.com"
timeout = "3s"

[forwarding]
extra_headers = ["referer"]
"#;

        let mut temp_file = NamedTempFile::with_suffix(".toml").unwrap();
        write!(temp_file, "{}", toml_content).unwrap();

        let config = build_config(
            temp_file.path().to_str(),
            &ConfigOverrides::default(),
            no_env(),
        )
        .unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:3000");
        assert_eq!(config.upstream.base_url, "https://backend.example.com");
        assert_eq!(
            config.upstream.timeout_duration().unwrap(),
            Duration::from_secs(3)
        );
        assert_eq!(config.forwarding.extra_headers, vec!["referer".to_string()]);
        // untouched sections fall back to defaults
        assert_eq!(config.limits.max_concurrent_upstream, 1024);
    }

    #[tokio::test]
    async fn test_load_yaml_config() {
        let yaml_content = r#"
listen_addr: "127.0.0.1:3001"
upstream:
  base_url: "http://backend:8080"
cors:
  answer_preflight: true
"#;

        let mut temp_file = NamedTempFile::with_suffix(".yaml").unwrap();
        write!(temp_file, "{}", yaml_content).unwrap();

        let config = build_config(
            temp_file.path().to_str(),
            &ConfigOverrides::default(),
            no_env(),
        )
        .unwrap();
        assert_eq!(config.upstream.base_url, "http://backend:8080");
        assert!(config.cors.answer_preflight);
    }

    #[test]
    fn environment_overrides_nested_keys() {
        let config = build_config(
            None,
            &ConfigOverrides::default(),
            env_from(&[
                ("EDGE_FORWARDER__UPSTREAM__BASE_URL", "https://env.example.com"),
                ("EDGE_FORWARDER__UPSTREAM__CONNECT_RETRIES", "2"),
                ("EDGE_FORWARDER__LIMITS__MAX_BODY_BYTES", "1024"),
            ]),
        )
        .unwrap();

        assert_eq!(config.upstream.base_url, "https://env.example.com");
        assert_eq!(config.upstream.connect_retries, 2);
        assert_eq!(config.limits.max_body_bytes, 1024);
    }

    #[test]
    fn cli_overrides_win_over_environment() {
        let overrides = ConfigOverrides {
            upstream: Some("https://cli.example.com".to_string()),
            listen_addr: Some("127.0.0.1:9999".to_string()),
        };
        let config = build_config(
            None,
            &overrides,
            env_from(&[("EDGE_FORWARDER__UPSTREAM__BASE_URL", "https://env.example.com")]),
        )
        .unwrap();

        assert_eq!(config.upstream.base_url, "https://cli.example.com");
        assert_eq!(config.listen_addr, "127.0.0.1:9999");
    }

    #[test]
    fn default_template_loads_and_validates() {
        let mut temp_file = NamedTempFile::with_suffix(".toml").unwrap();
        write!(temp_file, "{}", DEFAULT_CONFIG_TOML).unwrap();

        let config = build_config(
            temp_file.path().to_str(),
            &ConfigOverrides::default(),
            no_env(),
        )
        .unwrap();
        assert_eq!(config.upstream.base_url, "https://links.example.com");
        assert!(config.forwarding.extra_headers.is_empty());
        assert!(ForwarderConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn missing_file_is_an_error() {
        let result = build_config(
            Some("/definitely/not/here.toml"),
            &ConfigOverrides::default(),
            no_env(),
        );
        assert!(result.is_err());
    }
}
