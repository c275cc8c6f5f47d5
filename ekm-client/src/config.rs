//! Reader configuration
//!
//! Loaded from a TOML file:
//!
//! ```toml
//! workdir = "/var/db/ekm"
//! log_name = "ekm.pending"
//!
//! [transport]
//! kind = "serial"
//! port = "/dev/cuaU0"
//!
//! [[meters]]
//! id = 13491
//! password = "00000000"
//! ```

use anyhow::{bail, Context, Result};
use ekm_core::MeterId;
use ekm_session::frame::validate_password;
use ekm_transport::serial::OMNIMETER_BAUD_RATE;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How to reach the meters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TransportConfig {
    /// Local serial port or USB adapter
    Serial {
        port: String,
        #[serde(default = "default_baud_rate")]
        baud_rate: u32,
    },
    /// Serial-to-Ethernet bridge; a bare host gets the bridge's default port
    Tcp { address: String },
}

/// One meter on the bus
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeterConfig {
    pub id: MeterId,
    /// Used only when the clock has to be set
    #[serde(default = "default_password")]
    pub password: String,
}

/// Complete reader configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReaderConfig {
    pub transport: TransportConfig,
    pub meters: Vec<MeterConfig>,
    /// Directory holding the report log and the history trigger files
    #[serde(default = "default_workdir")]
    pub workdir: PathBuf,
    /// Report log file name inside `workdir`
    #[serde(default = "default_log_name")]
    pub log_name: String,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    /// Largest meter clock drift left alone, in seconds
    #[serde(default = "default_clock_tolerance_secs")]
    pub clock_tolerance_secs: u64,
}

fn default_baud_rate() -> u32 {
    OMNIMETER_BAUD_RATE
}

fn default_password() -> String {
    "00000000".to_string()
}

fn default_workdir() -> PathBuf {
    PathBuf::from(".")
}

fn default_log_name() -> String {
    "ekm.pending".to_string()
}

fn default_poll_interval_secs() -> u64 {
    1
}

fn default_read_timeout_ms() -> u64 {
    1000
}

fn default_clock_tolerance_secs() -> u64 {
    3
}

impl ReaderConfig {
    /// Read and validate a configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Parse and validate a configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: ReaderConfig =
            toml::from_str(content).context("Failed to parse TOML config")?;
        config.validate()?;
        Ok(config)
    }

    /// Check values serde cannot check on its own
    pub fn validate(&self) -> Result<()> {
        if self.meters.is_empty() {
            bail!("No meters configured");
        }
        for meter in &self.meters {
            validate_password(&meter.password)
                .with_context(|| format!("Bad password for meter {}", meter.id))?;
        }
        if let Some(dup) = self
            .meters
            .iter()
            .enumerate()
            .find(|(i, m)| self.meters[..*i].iter().any(|o| o.id == m.id))
        {
            bail!("Meter {} configured twice", dup.1.id);
        }
        match &self.transport {
            TransportConfig::Serial { port, baud_rate } => {
                if port.is_empty() {
                    bail!("Serial port name is empty");
                }
                if *baud_rate == 0 {
                    bail!("Baud rate must be positive");
                }
            }
            TransportConfig::Tcp { address } => {
                if address.is_empty() {
                    bail!("Bridge address is empty");
                }
            }
        }
        if self.poll_interval_secs == 0 {
            bail!("poll_interval_secs must be positive");
        }
        if self.read_timeout_ms == 0 {
            bail!("read_timeout_ms must be positive");
        }
        if self.log_name.is_empty() || self.log_name.contains(std::path::MAIN_SEPARATOR) {
            bail!("log_name must be a plain file name");
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Path of the report log
    pub fn log_path(&self) -> PathBuf {
        self.workdir.join(&self.log_name)
    }

    /// Path of the file whose presence asks for a history read of `meter`
    pub fn history_trigger(&self, meter: MeterId) -> PathBuf {
        self.workdir.join(format!("readhistory.{}", meter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SERIAL: &str = r#"
        workdir = "/home/ekm/graphing"
        log_name = "ekm-imhoff.pending"

        [transport]
        kind = "serial"
        port = "/dev/cuaU0"

        [[meters]]
        id = 13491
        password = "00000000"
    "#;

    #[test]
    fn test_serial_config_with_defaults() {
        let config = ReaderConfig::from_toml_str(SERIAL).unwrap();
        assert_eq!(
            config.transport,
            TransportConfig::Serial {
                port: "/dev/cuaU0".to_string(),
                baud_rate: 9600
            }
        );
        assert_eq!(config.meters.len(), 1);
        assert_eq!(config.meters[0].id.value(), 13491);
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.read_timeout(), Duration::from_secs(1));
        assert_eq!(config.clock_tolerance_secs, 3);
        assert_eq!(
            config.log_path(),
            PathBuf::from("/home/ekm/graphing/ekm-imhoff.pending")
        );
        assert_eq!(
            config.history_trigger(config.meters[0].id),
            PathBuf::from("/home/ekm/graphing/readhistory.13491")
        );
    }

    #[test]
    fn test_tcp_config() {
        let config = ReaderConfig::from_toml_str(
            r#"
            poll_interval_secs = 60
            [transport]
            kind = "tcp"
            address = "192.168.88.17"
            [[meters]]
            id = 300001234
            "#,
        )
        .unwrap();
        assert_eq!(
            config.transport,
            TransportConfig::Tcp {
                address: "192.168.88.17".to_string()
            }
        );
        assert_eq!(config.meters[0].password, "00000000");
        assert_eq!(config.poll_interval(), Duration::from_secs(60));
    }

    #[test]
    fn test_invalid_configs() {
        let no_meters = r#"
            meters = []
            [transport]
            kind = "tcp"
            address = "10.0.0.1"
        "#;
        assert!(ReaderConfig::from_toml_str(no_meters).is_err());

        let long_password = SERIAL.replace("00000000", "123456789");
        assert!(ReaderConfig::from_toml_str(&long_password).is_err());

        // The meter would never accept these in a password command.
        for password in ["ab(c", "ab c", "pässwd"] {
            let bad = SERIAL.replace("00000000", password);
            let err = ReaderConfig::from_toml_str(&bad).unwrap_err();
            assert!(format!("{:#}", err).contains("Bad password for meter 13491"));
        }

        let wide_id = SERIAL.replace("13491", "1234567890123");
        assert!(ReaderConfig::from_toml_str(&wide_id).is_err());

        let duplicate = format!("{}\n[[meters]]\nid = 13491\n", SERIAL);
        assert!(ReaderConfig::from_toml_str(&duplicate).is_err());

        let unknown_kind = SERIAL.replace("\"serial\"", "\"modem\"");
        assert!(ReaderConfig::from_toml_str(&unknown_kind).is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ekm.toml");
        std::fs::write(&path, SERIAL).unwrap();
        assert!(ReaderConfig::from_file(&path).is_ok());

        let err = ReaderConfig::from_file(&dir.path().join("missing.toml")).unwrap_err();
        assert!(err.to_string().contains("missing.toml"));
    }
}
