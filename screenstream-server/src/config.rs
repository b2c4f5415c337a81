//! Server configuration

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StreamError};

/// Default port for the MJPEG endpoint
pub const DEFAULT_PORT: u16 = 8080;

/// Default send timeout applied to every client write
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Supported stream frame rates
///
/// Each variant maps to the delay a session waits between two frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum Fps {
    OneHundredTwenty,
    Sixty,
    #[default]
    Thirty,
    Fifteen,
}

impl Fps {
    pub const ALL: [Fps; 4] = [Fps::OneHundredTwenty, Fps::Sixty, Fps::Thirty, Fps::Fifteen];

    /// Delay between two consecutive frames
    pub fn delay(self) -> Duration {
        let millis = match self {
            Fps::OneHundredTwenty => 8,
            Fps::Sixty => 16,
            Fps::Thirty => 33,
            Fps::Fifteen => 66,
        };
        Duration::from_millis(millis)
    }

    /// Nominal frames per second
    pub fn as_u32(self) -> u32 {
        match self {
            Fps::OneHundredTwenty => 120,
            Fps::Sixty => 60,
            Fps::Thirty => 30,
            Fps::Fifteen => 15,
        }
    }
}

impl TryFrom<u32> for Fps {
    type Error = StreamError;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            120 => Ok(Fps::OneHundredTwenty),
            60 => Ok(Fps::Sixty),
            30 => Ok(Fps::Thirty),
            15 => Ok(Fps::Fifteen),
            other => Err(StreamError::invalid_config(format!(
                "unsupported frame rate {} (expected 120, 60, 30 or 15)",
                other
            ))),
        }
    }
}

impl From<Fps> for u32 {
    fn from(fps: Fps) -> Self {
        fps.as_u32()
    }
}

impl FromStr for Fps {
    type Err = StreamError;

    fn from_str(s: &str) -> Result<Self> {
        let value: u32 = s
            .trim()
            .trim_end_matches("fps")
            .trim_end_matches("FPS")
            .trim()
            .parse()
            .map_err(|_| StreamError::invalid_config(format!("invalid frame rate: {}", s)))?;
        Fps::try_from(value)
    }
}

impl fmt::Display for Fps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} FPS", self.as_u32())
    }
}

/// Immutable settings for one server run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address the listening socket binds to
    pub ip: IpAddr,
    /// Port the listening socket binds to (0 picks an ephemeral port)
    pub port: u16,
    /// Stream frame rate
    pub fps: Fps,
    /// Upper bound for writing one frame to a client
    pub send_timeout: Duration,
    /// Maximum concurrent clients (None = unbounded)
    pub max_clients: Option<usize>,
}

impl ServerConfig {
    /// Build a config from a textual IP address, validating it before any bind
    pub fn new(ip: &str, port: u16) -> Result<Self> {
        let ip = ip
            .trim()
            .parse::<IpAddr>()
            .map_err(|_| StreamError::InvalidAddress(ip.to_string()))?;

        Ok(Self::from_ip(ip, port))
    }

    pub fn from_ip(ip: IpAddr, port: u16) -> Self {
        Self {
            ip,
            port,
            fps: Fps::default(),
            send_timeout: DEFAULT_SEND_TIMEOUT,
            max_clients: None,
        }
    }

    pub fn with_fps(mut self, fps: Fps) -> Self {
        self.fps = fps;
        self
    }

    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    pub fn with_max_clients(mut self, max_clients: Option<usize>) -> Self {
        self.max_clients = max_clients;
        self
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }

    /// Delay between frames, derived from the frame rate
    pub fn frame_delay(&self) -> Duration {
        self.fps.delay()
    }

    /// Reject settings the server cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.send_timeout.is_zero() {
            return Err(StreamError::invalid_config("send timeout must be greater than zero"));
        }
        if self.max_clients == Some(0) {
            return Err(StreamError::invalid_config("max_clients must be at least 1"));
        }
        Ok(())
    }
}
