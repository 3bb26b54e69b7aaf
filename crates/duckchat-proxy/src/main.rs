//! `duckchat-proxy` binary entrypoint.
//!
//! Configuration is layered: defaults, then `--config <file.yml>`, then the
//! environment, then the flags below.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use duckchat_proxy::{serve, ProxyConfig};
use duckchat_telemetry::{init_subscriber, TelemetryConfig};

/// OpenAI-compatible chat completion gateway for DuckDuckGo AI chat
#[derive(Parser, Debug)]
#[command(name = "duckchat-proxy")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// YAML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Connect to the backend directly, ignoring HTTP_PROXY / HTTPS_PROXY
    #[arg(long)]
    no_proxy: bool,

    /// Log level when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

impl Cli {
    fn proxy_config(&self) -> Result<ProxyConfig> {
        let mut config = match &self.config {
            Some(path) => ProxyConfig::from_yaml_file(path)?,
            None => ProxyConfig::from_env(),
        };
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if self.no_proxy {
            config = config.without_proxy();
        }
        Ok(config)
    }
}

#[actix_web::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_subscriber(
        &TelemetryConfig::default()
            .with_level(&cli.log_level)
            .with_json_output(cli.json_logs),
    );

    let config = cli.proxy_config()?;
    serve(config).await
}
