//! Configuration for an engine endpoint.
//!
//! The [`Config`] structure represents the contents of a
//! `config.toml` file.  Every section and every key is optional; the
//! code falls back to the defaults shown below.  Values are checked
//! after parsing so a bad demand size is reported at load time
//! instead of surfacing as a stalled stream.
//!
//! Example `config.toml`:
//!
//! ```toml
//! [connection]
//! host = "127.0.0.1"
//! port = 7878
//! max_frame_size = 16777215
//!
//! [streams]
//! initial_request_n = 5
//! replenish_n = 2
//!
//! [logging]
//! level = "info"
//! ```

use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::Level;

use crate::error::{Result, RSocketError};

/// Largest body a reader accepts unless configured otherwise.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 0xff_ffff;

/// Top‑level configuration structure.  Each section corresponds to a
/// table in the TOML file.
#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub connection: ConnectionSection,
    pub streams: StreamsSection,
    pub logging: LoggingSection,
}

/// Where to listen or connect, and how large a frame may be.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ConnectionSection {
    pub host: String,
    pub port: u16,
    /// Upper bound on a single frame body read off the connection.
    pub max_frame_size: usize,
}

impl Default for ConnectionSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 7878,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl ConnectionSection {
    /// `host:port`, suitable for binding or connecting.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Demand sizes used by the stream and channel orchestrators.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct StreamsSection {
    /// Credit granted when a stream is opened.
    pub initial_request_n: u64,
    /// Credit re‑granted after each batch of this many items.
    pub replenish_n: u64,
}

impl Default for StreamsSection {
    fn default() -> Self {
        Self {
            initial_request_n: 5,
            replenish_n: 2,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingSection {
    /// One of `trace`, `debug`, `info`, `warn`, `error`.
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

impl LoggingSection {
    /// The configured level as a tracing filter.
    pub fn max_level(&self) -> Result<Level> {
        self.level.parse::<Level>().map_err(|_| {
            RSocketError::InvalidConfig(format!(
                "logging.level {:?} is not one of trace, debug, info, warn, error",
                self.level
            ))
        })
    }
}

impl Config {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.streams.initial_request_n == 0 {
            return Err(RSocketError::InvalidConfig(
                "streams.initial_request_n must be greater than zero".into(),
            ));
        }
        if self.streams.replenish_n == 0 {
            return Err(RSocketError::InvalidConfig(
                "streams.replenish_n must be greater than zero".into(),
            ));
        }
        if self.connection.max_frame_size == 0 {
            return Err(RSocketError::InvalidConfig(
                "connection.max_frame_size must be greater than zero".into(),
            ));
        }
        self.logging.max_level()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_document_yields_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.connection.address(), "127.0.0.1:7878");
        assert_eq!(config.streams.initial_request_n, 5);
        assert_eq!(config.streams.replenish_n, 2);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = Config::from_toml_str("[streams]\nreplenish_n = 4\n").unwrap();
        assert_eq!(config.streams.replenish_n, 4);
        assert_eq!(config.streams.initial_request_n, 5);
        assert_eq!(config.connection.max_frame_size, DEFAULT_MAX_FRAME_SIZE);
    }

    #[test]
    fn zero_demand_is_rejected() {
        let err = Config::from_toml_str("[streams]\ninitial_request_n = 0\n").unwrap_err();
        assert!(matches!(err, RSocketError::InvalidConfig(_)));
    }

    #[test]
    fn unknown_log_level_is_rejected() {
        let err = Config::from_toml_str("[logging]\nlevel = \"loud\"\n").unwrap_err();
        assert!(matches!(err, RSocketError::InvalidConfig(msg) if msg.contains("loud")));
        let config = Config::from_toml_str("[logging]\nlevel = \"WARN\"\n").unwrap();
        assert_eq!(config.logging.max_level().unwrap(), Level::WARN);
    }

    #[test]
    fn syntax_errors_are_reported() {
        let err = Config::from_toml_str("[connection\nport = 1").unwrap_err();
        assert!(matches!(err, RSocketError::Config(_)));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[connection]\nhost = \"0.0.0.0\"\nport = 9000\n\n[logging]\nlevel = \"debug\""
        )
        .unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.connection.address(), "0.0.0.0:9000");
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, RSocketError::Io(_)));
    }
}
