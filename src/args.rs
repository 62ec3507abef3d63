//! Argument parsing for running from the command line

use crate::config::{Config, Layout};
use crate::frame::FrameEncoding;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Record serial PPG sensor readings to CSV", long_about = None)]
pub struct Args {
    /// Config file to use instead of the per-user one
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Serial device the sensor is attached to
    #[arg(short, long)]
    pub port: Option<String>,
    /// Serial baud rate
    #[arg(short, long)]
    pub baud: Option<u32>,
    /// Channel layout preset (photodiode, red-ir, spo2, max30102)
    #[arg(short, long)]
    pub layout: Option<Layout>,
    /// Frame encoding (csv or key_value), overrides the layout's
    #[arg(short, long)]
    pub encoding: Option<FrameEncoding>,
    /// Comma-separated channel names, overrides the layout's
    #[arg(long, value_delimiter = ',')]
    pub channels: Option<Vec<String>>,
    /// Directory recordings are written to
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,
    /// Minimum milliseconds between recorded rows
    #[arg(long)]
    pub min_interval_ms: Option<u64>,
    /// Print the available serial ports and exit
    #[arg(long)]
    pub list_ports: bool,
    /// Persist the effective configuration before starting
    #[arg(long)]
    pub save_config: bool,
    #[command(flatten)]
    pub verbose: clap_verbosity_flag::Verbosity<clap_verbosity_flag::InfoLevel>,
}

impl Args {
    /// Overlay command line values on a loaded config
    pub fn apply(&self, config: &mut Config) {
        if let Some(port) = &self.port {
            config.port = port.clone();
        }
        if let Some(baud) = self.baud {
            config.baud_rate = baud;
        }
        if let Some(layout) = self.layout {
            config.apply_layout(layout);
        }
        if let Some(encoding) = self.encoding {
            config.encoding = encoding;
        }
        if let Some(channels) = &self.channels {
            config.channels = channels.iter().map(|c| c.trim().to_string()).collect();
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(ms) = self.min_interval_ms {
            config.min_write_interval_ms = ms;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_apply_in_order() {
        let args = Args::parse_from([
            "ppg-recorder",
            "--port",
            "COM8",
            "--layout",
            "spo2",
            "--channels",
            "red, ir",
            "--encoding",
            "csv",
        ]);
        let mut config = Config::default();
        args.apply(&mut config);

        assert_eq!(config.port, "COM8");
        assert_eq!(config.channels, vec!["red", "ir"]);
        assert_eq!(config.encoding, FrameEncoding::Csv);
        assert_eq!(config.baud_rate, 115_200);
    }

    #[test]
    fn test_layout_alone_sets_encoding() {
        let args = Args::parse_from(["ppg-recorder", "-l", "red-ir"]);
        let mut config = Config::default();
        args.apply(&mut config);
        assert_eq!(config.encoding, FrameEncoding::KeyValue);
        assert_eq!(config.channels, vec!["Red", "IR"]);
    }

    #[test]
    fn test_unknown_layout_rejected() {
        assert!(Args::try_parse_from(["ppg-recorder", "--layout", "nirs"]).is_err());
    }
}
