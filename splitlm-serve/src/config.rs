//! Server and client settings
//!
//! Every field has a default, so a JSON file only needs the values it changes.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use splitlm::{Error, GenerationConfig, Result};

use crate::framing::DEFAULT_MAX_FRAME_LEN;

/// Default listening port.
pub const DEFAULT_PORT: u16 = 12345;

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| Error::Load(format!("{}: {e}", path.display())))?;
    serde_json::from_str(&text).map_err(|e| Error::Load(format!("{}: {e}", path.display())))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    /// Largest request frame accepted, in bytes.
    pub max_frame_len: usize,
    /// Settings used for every request; requests may only lower `max_new_tokens`.
    pub generation: GenerationConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            generation: GenerationConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load from a JSON file.
    ///
    /// # Errors
    /// Returns [`Error::Load`] if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        read_json(path.as_ref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub server: SocketAddr,
    /// Pad or truncate every prompt to this many tokens. `None` sends the
    /// prompt unpadded.
    pub sequence_length: Option<usize>,
    /// Give up connecting after this many milliseconds. `None` waits for the OS.
    pub connect_timeout_ms: Option<u64>,
    pub max_frame_len: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)),
            sequence_length: None,
            connect_timeout_ms: None,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}

impl ClientConfig {
    /// Load from a JSON file.
    ///
    /// # Errors
    /// Returns [`Error::Load`] if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        read_json(path.as_ref())
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }
}
