//! One polling cycle per meter
//!
//! # Cycle
//! ```text
//! Open -> [drift >= tolerance] Authenticate -> Set-Clock
//!      -> [trigger file present] Read-History
//!      -> Close (always)
//! ```
//!
//! A failed open or a failed authentication abandons the meter for this
//! cycle. Nothing is retried; the next tick starts over.

use crate::config::{MeterConfig, ReaderConfig};
use chrono::{DateTime, Local};
use ekm_core::{EkmError, EkmResult, MeterHistory, MeterId, MeterSnapshot};
use ekm_session::MeterSession;
use ekm_transport::Channel;
use serde::Serialize;

/// Result of one successful cycle against one meter
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    pub meter: MeterId,
    /// Local time taken right after the open response arrived
    pub polled_at: DateTime<Local>,
    pub snapshot: MeterSnapshot,
    /// Present when a history read was requested and succeeded
    pub history: Option<MeterHistory>,
    pub clock_set: bool,
}

/// Runs polling cycles with the settings of a reader configuration
pub struct Poller<'a> {
    config: &'a ReaderConfig,
    clock: fn() -> DateTime<Local>,
}

impl<'a> Poller<'a> {
    pub fn new(config: &'a ReaderConfig) -> Self {
        Self {
            config,
            clock: Local::now,
        }
    }

    /// Replace the wall clock used for drift and timestamps
    pub fn with_clock(mut self, clock: fn() -> DateTime<Local>) -> Self {
        self.clock = clock;
        self
    }

    /// Poll every configured meter in turn
    pub fn poll_all<C: Channel + ?Sized>(
        &self,
        channel: &mut C,
    ) -> Vec<(MeterId, EkmResult<CycleReport>)> {
        self.config
            .meters
            .iter()
            .map(|meter| (meter.id, self.poll_meter(channel, meter)))
            .collect()
    }

    /// Run one cycle against `meter`; Close is sent whatever happens
    pub fn poll_meter<C: Channel + ?Sized>(
        &self,
        channel: &mut C,
        meter: &MeterConfig,
    ) -> EkmResult<CycleReport> {
        let mut session = MeterSession::new(channel).with_timeout(self.config.read_timeout());
        let result = self.run_cycle(&mut session, meter);

        if let Err(e) = session.close() {
            log::warn!("Failed to close meter {}: {}", meter.id, e);
        }
        log::debug!("Meter {} statistics: {:?}", meter.id, session.statistics());
        result
    }

    fn run_cycle<C: Channel + ?Sized>(
        &self,
        session: &mut MeterSession<'_, C>,
        meter: &MeterConfig,
    ) -> EkmResult<CycleReport> {
        let snapshot = session.open(meter.id).inspect_err(|e| match e {
            EkmError::ChecksumMismatch { .. } => log::warn!("Bad CRC on meter {}", meter.id),
            EkmError::ReadTimeout => log::warn!("Read timed out on meter {}", meter.id),
            other => log::warn!("Open failed on meter {}: {}", meter.id, other),
        })?;
        let polled_at = (self.clock)();

        let drift = snapshot.clock_drift(polled_at.naive_local());
        let clock_set = if drift.unsigned_abs() >= self.config.clock_tolerance_secs {
            log::info!("Meter {} clock drift too large {}", meter.id, drift);
            self.sync_clock(session, meter)?
        } else {
            false
        };

        let history = self.read_requested_history(session, meter.id);

        Ok(CycleReport {
            meter: meter.id,
            polled_at,
            snapshot,
            history,
            clock_set,
        })
    }

    fn sync_clock<C: Channel + ?Sized>(
        &self,
        session: &mut MeterSession<'_, C>,
        meter: &MeterConfig,
    ) -> EkmResult<bool> {
        match session.authenticate(&meter.password) {
            Ok(true) => {}
            Ok(false) => {
                log::warn!("Wrong password for meter {}", meter.id);
                return Err(EkmError::AuthRejected);
            }
            Err(EkmError::ReadTimeout) => {
                log::warn!("Read timed out on meter {}", meter.id);
                return Err(EkmError::ReadTimeout);
            }
            Err(e) => return Err(e),
        }

        match session.set_clock_at((self.clock)().naive_local()) {
            Ok(true) => Ok(true),
            Ok(false) => {
                log::warn!("Meter {} refused the new time", meter.id);
                Ok(false)
            }
            Err(e) if e.is_transient() => {
                log::warn!("Setting time on meter {} failed: {}", meter.id, e);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    fn read_requested_history<C: Channel + ?Sized>(
        &self,
        session: &mut MeterSession<'_, C>,
        meter: MeterId,
    ) -> Option<MeterHistory> {
        let trigger = self.config.history_trigger(meter);
        if !trigger.exists() {
            return None;
        }

        match session.read_history() {
            Ok(history) => {
                if let Err(e) = std::fs::remove_file(&trigger) {
                    log::warn!("Failed to remove {}: {}", trigger.display(), e);
                }
                log::info!("Read history of meter {}", meter);
                Some(history)
            }
            Err(e) => {
                log::warn!("History read failed on meter {}: {}", meter, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransportConfig;
    use chrono::TimeZone;
    use ekm_session::checksum::checksum;
    use ekm_session::frame::{ACK, CLOSE_FRAME, NAK, RESPONSE_LENGTH};
    use ekm_transport::MemoryChannel;
    use std::path::Path;

    const PASSWORD_PREFIX: &[u8] = b"\x01P1";
    const TIME_PREFIX: &[u8] = b"\x01W1";

    fn seal(frame: &mut [u8]) {
        let end = frame.len() - 2;
        let crc = checksum(&frame[1..end]);
        frame[end..].copy_from_slice(&crc.to_be_bytes());
    }

    fn blank() -> Vec<u8> {
        let mut frame = vec![b'0'; RESPONSE_LENGTH];
        frame[0] = 0x02;
        frame[RESPONSE_LENGTH - 3] = 0x03;
        frame
    }

    /// Open response for meter 13491, forward 100.0 kWh, clock 2021-03-14 15:30:07
    fn open_frame() -> Vec<u8> {
        let mut frame = blank();
        frame[4..16].copy_from_slice(b"000000013491");
        frame[16..24].copy_from_slice(b"00001000");
        for i in 0..3 {
            frame[151 + 4 * i] = b'L';
        }
        frame[171] = b'1';
        frame[172..186].copy_from_slice(b"21031401153007");
        seal(&mut frame);
        frame
    }

    fn history_frame(tenths: u64) -> Vec<u8> {
        let mut frame = blank();
        for m in 0..6 {
            let at = 6 + m * 40;
            frame[at..at + 8].copy_from_slice(format!("{:08}", tenths).as_bytes());
        }
        seal(&mut frame);
        frame
    }

    fn in_sync() -> DateTime<Local> {
        Local.with_ymd_and_hms(2021, 3, 14, 15, 30, 8).unwrap()
    }

    fn drifted() -> DateTime<Local> {
        Local.with_ymd_and_hms(2021, 3, 14, 15, 31, 0).unwrap()
    }

    fn config(workdir: &Path) -> ReaderConfig {
        ReaderConfig {
            transport: TransportConfig::Tcp {
                address: "127.0.0.1".to_string(),
            },
            meters: vec![MeterConfig {
                id: MeterId::new(13491).unwrap(),
                password: "00000000".to_string(),
            }],
            workdir: workdir.to_path_buf(),
            log_name: "ekm.pending".to_string(),
            poll_interval_secs: 1,
            read_timeout_ms: 50,
            clock_tolerance_secs: 3,
        }
    }

    fn channel_with_open() -> MemoryChannel {
        let mut channel = MemoryChannel::new();
        channel.respond_to(b"/?", open_frame());
        channel
    }

    #[test]
    fn test_in_sync_meter_is_not_touched() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let mut channel = channel_with_open();

        let report = Poller::new(&config)
            .with_clock(in_sync)
            .poll_meter(&mut channel, &config.meters[0])
            .unwrap();
        assert!(!report.clock_set);
        assert!(report.history.is_none());
        assert!((report.snapshot.forward.total - 100.0).abs() < 1e-9);
        assert_eq!(channel.writes_starting_with(PASSWORD_PREFIX), 0);
        assert_eq!(channel.written().last().unwrap(), CLOSE_FRAME);
    }

    #[test]
    fn test_drift_sets_clock() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let mut channel = channel_with_open();
        channel
            .respond_to(PASSWORD_PREFIX, vec![ACK])
            .respond_to(TIME_PREFIX, vec![ACK]);

        let report = Poller::new(&config)
            .with_clock(drifted)
            .poll_meter(&mut channel, &config.meters[0])
            .unwrap();
        assert!(report.clock_set);
        assert_eq!(channel.writes_starting_with(TIME_PREFIX), 1);
        assert!(channel.written().iter().any(|w| w.starts_with(b"\x01W1\x020060(21031401153100)")));
    }

    #[test]
    fn test_wrong_password_abandons_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let mut channel = channel_with_open();
        channel.respond_to(PASSWORD_PREFIX, vec![NAK]);

        let result = Poller::new(&config)
            .with_clock(drifted)
            .poll_meter(&mut channel, &config.meters[0]);
        assert!(matches!(result, Err(EkmError::AuthRejected)));
        assert_eq!(channel.writes_starting_with(TIME_PREFIX), 0);
        assert_eq!(channel.written().last().unwrap(), CLOSE_FRAME);
    }

    #[test]
    fn test_silent_password_is_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let mut channel = channel_with_open();

        let result = Poller::new(&config)
            .with_clock(drifted)
            .poll_meter(&mut channel, &config.meters[0]);
        assert!(matches!(result, Err(EkmError::ReadTimeout)));
    }

    #[test]
    fn test_failed_open_still_closes() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let mut channel = MemoryChannel::new();

        let results = Poller::new(&config).with_clock(in_sync).poll_all(&mut channel);
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0].1, Err(EkmError::ReadTimeout)));
        assert_eq!(channel.written().last().unwrap(), CLOSE_FRAME);
    }

    #[test]
    fn test_history_trigger_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let trigger = config.history_trigger(config.meters[0].id);
        std::fs::write(&trigger, b"").unwrap();

        let mut channel = channel_with_open();
        channel
            .respond_to(b"\x01R1\x020011", history_frame(600))
            .respond_to(b"\x01R1\x020012", history_frame(0));

        let report = Poller::new(&config)
            .with_clock(in_sync)
            .poll_meter(&mut channel, &config.meters[0])
            .unwrap();
        let history = report.history.unwrap();
        assert!((history.forward[0].total - 60.0).abs() < 1e-9);
        assert!(!trigger.exists());
    }

    #[test]
    fn test_failed_history_keeps_trigger() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let trigger = config.history_trigger(config.meters[0].id);
        std::fs::write(&trigger, b"").unwrap();

        let mut channel = channel_with_open();
        let report = Poller::new(&config)
            .with_clock(in_sync)
            .poll_meter(&mut channel, &config.meters[0])
            .unwrap();
        assert!(report.history.is_none());
        assert!(trigger.exists());
    }
}
