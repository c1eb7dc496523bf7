use crate::error::{BlobUploadError, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Command-line surface of the agent.
#[derive(Debug, Clone, Parser)]
#[command(version, about = "Uploads a single local file to cloud storage via a pre-signed URL obtained over the device's digital twin")]
pub struct Cli {
    /// Edge agent MQTT broker
    #[arg(short = 'b', long = "broker", value_name = "uri", default_value = "tcp://edgehost:1883")]
    pub broker: String,

    /// Path to file for upload (required)
    #[arg(short = 'f', long = "file", value_name = "path")]
    pub file: PathBuf,

    /// Seconds to wait for the edge agent identity response
    #[arg(long = "identity-timeout", value_name = "secs", default_value_t = 20)]
    pub identity_timeout: u64,
}

/// Immutable runtime configuration, built once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub broker: String,
    pub file_path: PathBuf,
    pub identity_timeout: Duration,
}

impl Config {
    pub fn from_cli(cli: Cli) -> Result<Self> {
        if !cli.file.exists() {
            return Err(BlobUploadError::ConfigError(format!(
                "file '{}' not found",
                cli.file.display()
            )));
        }

        Ok(Self {
            broker: cli.broker,
            file_path: cli.file,
            identity_timeout: Duration::from_secs(cli.identity_timeout),
        })
    }

    /// The local file path doubles as the logical blob identifier on the wire.
    pub fn blob_id(&self) -> String {
        self.file_path.display().to_string()
    }
}

/// Parse broker address in format tcp://host:port, mqtt://host:port or host:port
pub fn parse_broker_url(url: &str) -> Result<(&str, u16)> {
    let url = url.trim_start_matches("mqtt://");
    let url = url.trim_start_matches("tcp://");

    let parts: Vec<&str> = url.split(':').collect();
    match parts.len() {
        1 => Ok((parts[0], 1883)), // Default MQTT port
        2 => {
            let port = parts[1].parse::<u16>().map_err(|_| {
                BlobUploadError::ConfigError(format!("invalid port in broker URL: {}", parts[1]))
            })?;
            Ok((parts[0], port))
        }
        _ => Err(BlobUploadError::ConfigError(format!(
            "invalid broker URL format: {}",
            url
        ))),
    }
}
