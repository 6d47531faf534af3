use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

/// File picked up from the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "streamloader.toml";

/// Prefix for environment overrides, e.g. `STREAMLOADER_DISPATCH__BATCH_SIZE`.
pub const ENV_PREFIX: &str = "STREAMLOADER_";

/// Load configuration from file with environment variable overrides
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    extract(figment().merge(Toml::file(path)))
}

/// Load configuration from an optional file.
///
/// An explicit `path` must exist. Without one, `streamloader.toml` in the
/// working directory is used if present, otherwise only defaults and the
/// environment apply.
pub fn load_layered(path: Option<&Path>) -> Result<Config, ConfigError> {
    match path {
        Some(path) => load_config(path),
        None => {
            let default = Path::new(DEFAULT_CONFIG_FILE);
            if default.exists() {
                load_config(default)
            } else {
                extract(figment())
            }
        }
    }
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}

fn figment() -> Figment {
    Figment::from(Serialized::defaults(Config::default()))
}

fn extract(figment: Figment) -> Result<Config, ConfigError> {
    figment
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SourceKind;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config_from_str_valid() {
        let toml = r#"
[pipeline]
name = "events"
bucket_arn = "arn:aws:s3:::raw-data"
role_name = "events_role"
source = "stream_fed"
stream_arn = "arn:aws:kinesis:us-east-2:1:stream/in"

[dispatch]
batch_size = 250
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.pipeline.name, "events");
        assert_eq!(config.pipeline.source, SourceKind::StreamFed);
        assert_eq!(config.dispatch.batch_size, 250);
        assert_eq!(config.dispatch.max_in_flight_batches, 1);
        assert_eq!(config.aws.region, "us-east-2");
    }

    #[test]
    fn test_load_config_from_str_empty() {
        let config = load_config_from_str("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_config_from_str_bad_source() {
        let toml = r#"
[pipeline]
source = "carrier_pigeon"
"#;
        let err = load_config_from_str(toml).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/streamloader.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
[aws]
region = "eu-west-1"
endpoint_url = "http://localhost:4566"

[activation]
max_attempts = 5
"#
        )
        .unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.aws.region, "eu-west-1");
        assert_eq!(
            config.aws.endpoint_url.as_deref(),
            Some("http://localhost:4566")
        );
        assert_eq!(config.activation.max_attempts, 5);
        assert_eq!(config.activation.poll_interval_ms, 2000);
    }

    #[test]
    fn test_env_overrides_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "custom.toml",
                r#"
[dispatch]
batch_size = 50
"#,
            )?;
            jail.set_env("STREAMLOADER_DISPATCH__BATCH_SIZE", "20");
            jail.set_env("STREAMLOADER_AWS__REGION", "us-west-2");

            let config = load_config(Path::new("custom.toml")).unwrap();
            assert_eq!(config.dispatch.batch_size, 20);
            assert_eq!(config.aws.region, "us-west-2");
            Ok(())
        });
    }

    #[test]
    fn test_layered_picks_up_default_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                DEFAULT_CONFIG_FILE,
                r#"
[pipeline]
name = "from-default-file"
"#,
            )?;

            let config = load_layered(None).unwrap();
            assert_eq!(config.pipeline.name, "from-default-file");
            Ok(())
        });
    }

    #[test]
    fn test_layered_without_file_uses_defaults() {
        figment::Jail::expect_with(|_jail| {
            let config = load_layered(None).unwrap();
            assert_eq!(config, Config::default());
            Ok(())
        });
    }
}
