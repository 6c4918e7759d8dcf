//! Configuration file handling and option merging.
//!
//! The configuration file is optional and only read when `--config` is
//! given. Command-line values always take precedence over file values;
//! delays default to zero when neither source sets them.

use crate::Cli;
use anyhow::Context;
use delayline_core::ServerConfig;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Configuration file contents
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileConfig {
    /// Port to listen on
    pub listen_port: Option<u16>,
    /// Upstream `host:port` address
    pub upstream_addr: Option<String>,
    /// Delay settings
    #[serde(default)]
    pub delay: DelaySection,
}

/// `[delay]` table of the configuration file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DelaySection {
    /// Client-to-upstream delay in humantime format ("250ms", "1s")
    pub up: Option<String>,
    /// Upstream-to-client delay in humantime format
    pub down: Option<String>,
    /// Sample per-session delays instead of applying the values directly
    #[serde(default)]
    pub randomize: bool,
}

impl FileConfig {
    /// Load configuration from file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        Ok(config)
    }
}

/// Merge file values under command-line options into a validated server
/// configuration.
///
/// # Errors
///
/// Returns an error if the listen port or upstream address is missing from
/// both sources, or if any merged value fails validation.
pub fn resolve(cli: &Cli, file: &FileConfig) -> anyhow::Result<ServerConfig> {
    let Some(listen_port) = cli.listen_port.or(file.listen_port) else {
        anyhow::bail!("no listen port given (set it on the command line or in the config file)");
    };
    let Some(upstream_addr) = cli
        .upstream
        .clone()
        .or_else(|| file.upstream_addr.clone())
    else {
        anyhow::bail!("no upstream address given (set it on the command line or in the config file)");
    };

    let config = ServerConfig {
        listen_port,
        upstream_addr,
        up_delay: match cli.up_delay {
            Some(delay) => delay,
            None => parse_delay(file.delay.up.as_deref(), "delay.up")?,
        },
        down_delay: match cli.down_delay {
            Some(delay) => delay,
            None => parse_delay(file.delay.down.as_deref(), "delay.down")?,
        },
        randomize_delay: cli.randomize_delay || file.delay.randomize,
    };
    validate(&config)?;
    Ok(config)
}

fn parse_delay(value: Option<&str>, field: &str) -> anyhow::Result<Duration> {
    match value {
        Some(raw) => humantime::parse_duration(raw)
            .with_context(|| format!("invalid duration for {field}: {raw:?}")),
        None => Ok(Duration::ZERO),
    }
}

fn validate(config: &ServerConfig) -> anyhow::Result<()> {
    if config.listen_port == 0 {
        anyhow::bail!("listen port must be between 1 and 65535");
    }
    validate_host_port(&config.upstream_addr)?;
    Ok(())
}

/// Validate host:port format of the upstream address
fn validate_host_port(addr: &str) -> anyhow::Result<()> {
    let Some((host, port_str)) = addr.rsplit_once(':') else {
        anyhow::bail!("upstream address '{addr}' missing port (expected format: host:port)");
    };

    let port: u16 = port_str
        .parse()
        .map_err(|_| anyhow::anyhow!("upstream address '{addr}' has invalid port: {port_str}"))?;
    if port == 0 {
        anyhow::bail!("upstream address '{addr}' has invalid port: 0");
    }

    if host.is_empty() {
        anyhow::bail!("upstream address '{addr}' has empty hostname");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn cli(args: &[&str]) -> Cli {
        Cli::parse_from(args)
    }

    #[test]
    fn cli_values_override_file_values() {
        let file: FileConfig = toml::from_str(
            r#"
            listen_port = 1000
            upstream_addr = "filehost:1"

            [delay]
            up = "1s"
            "#,
        )
        .expect("parse file config");

        let config = resolve(&cli(&["delayline", "2000", "clihost:2", "-u", "250ms"]), &file)
            .expect("resolve config");
        assert_eq!(config.listen_port, 2000);
        assert_eq!(config.upstream_addr, "clihost:2");
        assert_eq!(config.up_delay, Duration::from_millis(250));
        assert_eq!(config.down_delay, Duration::ZERO);
        assert!(!config.randomize_delay);
    }

    #[test]
    fn file_supplies_missing_arguments() {
        let file: FileConfig = toml::from_str(
            r#"
            listen_port = 18080
            upstream_addr = "127.0.0.1:9000"

            [delay]
            up = "100ms"
            down = "2s"
            randomize = true
            "#,
        )
        .expect("parse file config");

        let config = resolve(&cli(&["delayline"]), &file).expect("resolve config");
        assert_eq!(config.listen_port, 18080);
        assert_eq!(config.upstream_addr, "127.0.0.1:9000");
        assert_eq!(config.up_delay, Duration::from_millis(100));
        assert_eq!(config.down_delay, Duration::from_secs(2));
        assert!(config.randomize_delay);
    }

    #[test]
    fn missing_listen_port_is_rejected() {
        let err = resolve(&cli(&["delayline"]), &FileConfig::default())
            .expect_err("config without port should fail");
        assert!(err.to_string().contains("listen port"));
    }

    #[test]
    fn missing_upstream_is_rejected() {
        let file: FileConfig =
            toml::from_str("listen_port = 8080").expect("parse file config");
        let err = resolve(&cli(&["delayline"]), &file)
            .expect_err("config without upstream should fail");
        assert!(err.to_string().contains("upstream"));
    }

    #[test]
    fn invalid_file_duration_is_rejected() {
        let file: FileConfig = toml::from_str(
            r#"
            listen_port = 8080
            upstream_addr = "localhost:80"

            [delay]
            up = "soon"
            "#,
        )
        .expect("parse file config");
        let err = resolve(&cli(&["delayline"]), &file).expect_err("bad duration should fail");
        assert!(err.to_string().contains("delay.up"));
    }

    #[test]
    fn upstream_address_must_be_host_port() {
        for bad in ["nocolon", ":8080", "host:0", "host:notaport", "host:"] {
            let result = resolve(&cli(&["delayline", "8080", bad]), &FileConfig::default());
            assert!(result.is_err(), "address {bad:?} should be rejected");
        }
        for good in ["localhost:80", "10.0.0.1:9000", "[::1]:443", "svc.internal:65535"] {
            let result = resolve(&cli(&["delayline", "8080", good]), &FileConfig::default());
            assert!(result.is_ok(), "address {good:?} should be accepted");
        }
    }

    #[test]
    fn randomize_merges_from_either_source() {
        let file: FileConfig = toml::from_str(
            r#"
            listen_port = 8080
            upstream_addr = "localhost:80"

            [delay]
            randomize = true
            "#,
        )
        .expect("parse file config");
        let config = resolve(&cli(&["delayline"]), &file).expect("resolve config");
        assert!(config.randomize_delay);

        let config = resolve(
            &cli(&["delayline", "8080", "localhost:80", "--randomize-delay"]),
            &FileConfig::default(),
        )
        .expect("resolve config");
        assert!(config.randomize_delay);
    }

    #[test]
    fn load_reads_a_config_file_from_disk() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("delayline.toml");
        fs::write(&path, "listen_port = 4000\nupstream_addr = \"localhost:22\"\n")
            .expect("write config file");

        let file = FileConfig::load(&path).expect("load config file");
        assert_eq!(file.listen_port, Some(4000));
        assert_eq!(file.upstream_addr.as_deref(), Some("localhost:22"));

        assert!(FileConfig::load(dir.path().join("missing.toml")).is_err());
    }
}
