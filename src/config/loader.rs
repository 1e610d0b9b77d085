//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::overrides::ConfigOverrides;
use crate::config::schema::ProxyConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse a TOML file without semantic validation.
pub fn read_config(path: &Path) -> Result<ProxyConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ProxyConfig, ConfigError> {
    let config = read_config(path)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Assemble the runtime configuration: defaults, then the optional file,
/// then command-line/environment overrides, then validation.
pub fn resolve_config(
    path: Option<&Path>,
    overrides: ConfigOverrides,
) -> Result<ProxyConfig, ConfigError> {
    let mut config = match path {
        Some(path) => read_config(path)?,
        None => ProxyConfig::default(),
    };
    overrides.apply(&mut config);
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("{}-{}.toml", name, std::process::id()));
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_load_valid_file() {
        let path = write_temp(
            "deproxy-valid",
            r#"
            [upstream]
            url = "http://localhost:11434"
            "#,
        );
        let config = load_config(&path).unwrap();
        assert_eq!(config.upstream.url.as_deref(), Some("http://localhost:11434"));
        fs::remove_file(path).unwrap_or_default();
    }

    #[test]
    fn test_load_reports_validation() {
        let path = write_temp("deproxy-invalid", "[cache]\nmax_entries = 0\n");
        let err = load_config(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref errors) if errors.len() == 2));
        assert!(err.to_string().contains("upstream.url is required"));
        fs::remove_file(path).unwrap_or_default();
    }

    #[test]
    fn test_overrides_win_over_file() {
        let path = write_temp(
            "deproxy-override",
            "[upstream]\nurl = \"http://file:1\"\n[cache]\nttl_secs = 5\n",
        );
        let overrides = ConfigOverrides {
            remote_url: Some("http://flag:2".into()),
            ..ConfigOverrides::default()
        };
        let config = resolve_config(Some(&path), overrides).unwrap();
        assert_eq!(config.upstream.url.as_deref(), Some("http://flag:2"));
        assert_eq!(config.cache.ttl_secs, 5);
        fs::remove_file(path).unwrap_or_default();
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = read_config(Path::new("/nonexistent/deproxy.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
