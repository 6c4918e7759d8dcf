//! delayline CLI
//!
//! Transparent TCP relay that injects configurable, direction-specific
//! latency between a client and an upstream service.

mod config;

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use config::FileConfig;
use delayline_core::Server;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// delayline - TCP relay with injectable latency
#[derive(Parser)]
#[command(name = "delayline")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Port to listen on
    listen_port: Option<u16>,

    /// Upstream host:port to relay to
    upstream: Option<String>,

    /// Delay applied to client-to-upstream traffic (e.g. "250ms", "1s")
    #[arg(short = 'u', long, value_parser = humantime::parse_duration)]
    up_delay: Option<Duration>,

    /// Delay applied to upstream-to-client traffic (e.g. "250ms", "1s")
    #[arg(short = 'd', long, value_parser = humantime::parse_duration)]
    down_delay: Option<Duration>,

    /// Treat configured delays as medians of a log-normal distribution,
    /// sampled once per connection and direction
    #[arg(long)]
    randomize_delay: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all log output
    #[arg(short, long)]
    quiet: bool,

    /// TOML configuration file supplying defaults for the options above
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
}

fn log_filter(cli: &Cli) -> &'static str {
    if cli.quiet {
        return "off";
    }
    match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(&cli))
        .with_writer(std::io::stderr)
        .init();
    if cli.verbose > 3 {
        warn!(requested = cli.verbose, "verbosity beyond -vvv, using trace");
    }

    // Load configuration
    let file = match &cli.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    let server_config = config::resolve(&cli, &file)?;

    // Interrupt triggers a graceful drain of in-flight sessions
    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("interrupt received, shutting down");
                interrupt.cancel();
            }
            Err(e) => warn!(error = %e, "failed to listen for interrupt"),
        }
    });

    let server = Server::bind(server_config)
        .await
        .context("failed to start relay server")?;
    server.run(cancel).await.context("relay server failed")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_maps_to_filter_levels() {
        let cases = [
            (vec!["delayline"], "warn"),
            (vec!["delayline", "-v"], "info"),
            (vec!["delayline", "-vv"], "debug"),
            (vec!["delayline", "-vvv"], "trace"),
            (vec!["delayline", "-vvvvv"], "trace"),
        ];
        for (args, expected) in cases {
            let cli = Cli::parse_from(&args);
            assert_eq!(log_filter(&cli), expected, "args: {args:?}");
        }
    }

    #[test]
    fn quiet_overrides_verbosity() {
        let cli = Cli::parse_from(["delayline", "-vvv", "-q"]);
        assert_eq!(log_filter(&cli), "off");
    }

    #[test]
    fn parses_human_readable_delays() {
        let cli = Cli::parse_from(["delayline", "8080", "localhost:80", "-u", "250ms", "-d", "1s"]);
        assert_eq!(cli.listen_port, Some(8080));
        assert_eq!(cli.upstream.as_deref(), Some("localhost:80"));
        assert_eq!(cli.up_delay, Some(Duration::from_millis(250)));
        assert_eq!(cli.down_delay, Some(Duration::from_secs(1)));
        assert!(!cli.randomize_delay);
    }

    #[test]
    fn rejects_malformed_delay() {
        let result = Cli::try_parse_from(["delayline", "8080", "localhost:80", "-u", "fast"]);
        assert!(result.is_err());
    }
}
