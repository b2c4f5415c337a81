//! Command-line arguments

use std::path::PathBuf;

use clap::Parser;
use screenstream_server::Fps;

use crate::config::DaemonConfig;

/// Stream a directory of JPEG images as live MJPEG video over HTTP
#[derive(Debug, Parser)]
#[command(name = "screenstream-daemon", version, about)]
pub struct Args {
    /// Configuration file (default: <config dir>/screenstream/config.toml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// IP address to listen on
    #[arg(long)]
    pub ip: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Frame rate: 120, 60, 30 or 15
    #[arg(long)]
    pub fps: Option<Fps>,

    /// Directory of JPEG files to stream
    #[arg(long)]
    pub image_dir: Option<PathBuf>,

    /// Maximum concurrent clients
    #[arg(long)]
    pub max_clients: Option<usize>,

    /// Per-frame send timeout in milliseconds
    #[arg(long)]
    pub send_timeout_ms: Option<u64>,
}

impl Args {
    /// Override file settings with the flags given on the command line
    pub fn apply(&self, config: &mut DaemonConfig) {
        if let Some(ip) = &self.ip {
            config.ip_address = ip.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(fps) = self.fps {
            config.fps = fps;
        }
        if let Some(dir) = &self.image_dir {
            config.image_dir = Some(dir.clone());
        }
        if let Some(max) = self.max_clients {
            config.max_clients = Some(max);
        }
        if let Some(ms) = self.send_timeout_ms {
            config.send_timeout_ms = ms;
        }
    }
}
