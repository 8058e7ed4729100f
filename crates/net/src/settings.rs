use serde::{Deserialize, Serialize};

use crate::transport::DEFAULT_PORT;

/// The transport's configuration source: a master switch, a preferred
/// local host identifier (address text or adapter name, empty for "pick
/// one") and a listening port.
///
/// Writes latch a modified flag that `configure` consumes, so setting
/// changes take effect on the next reconfiguration rather than
/// immediately - the same latched behavior the surrounding engine uses
/// for its settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetSettings {
    enabled: bool,
    host: String,
    port: u16,
    #[serde(skip)]
    modified: bool,
}

impl Default for NetSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            host: String::new(),
            port: DEFAULT_PORT,
            modified: false,
        }
    }
}

impl NetSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled != enabled {
            self.enabled = enabled;
            self.modified = true;
        }
    }

    pub fn set_host(&mut self, host: &str) {
        if self.host != host {
            self.host = host.to_string();
            self.modified = true;
        }
    }

    pub fn set_port(&mut self, port: u16) {
        if self.port != port {
            self.port = port;
            self.modified = true;
        }
    }

    /// Reports whether anything changed since the last call, clearing the
    /// latch.
    pub fn take_modified(&mut self) -> bool {
        std::mem::take(&mut self.modified)
    }

    // Write-backs from the transport itself (the address it settled on,
    // the port that actually bound) must not latch a change, or the next
    // reconfiguration would tear the session down again.

    pub(crate) fn record_host(&mut self, host: &str) {
        self.host = host.to_string();
    }

    pub(crate) fn record_port(&mut self, port: u16) {
        self.port = port;
    }
}
