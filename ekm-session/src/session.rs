//! Meter session: the request/response exchanges with one meter
//!
//! A session borrows a channel and walks the meter through
//! `Idle -> Opened -> (Authenticated) -> Idle`. Every operation checks the
//! state first and fails with `InvalidState` before touching the wire.

use crate::frame::{build_request, validate_response, Command, PeriodTableBlock, ACK, RESPONSE_LENGTH};
use crate::layout::{decode_history_table, decode_holidays, decode_snapshot};
use crate::reader::{read_exact_timeout, DEFAULT_READ_TIMEOUT};
use crate::state::SessionState;
use crate::statistics::SessionStatistics;
use chrono::{Local, NaiveDateTime};
use ekm_core::{EkmError, EkmResult, HolidayTable, MeterHistory, MeterId, MeterSnapshot};
use ekm_transport::Channel;
use std::time::Duration;

/// Protocol session with a single meter over a borrowed channel
pub struct MeterSession<'a, C: Channel + ?Sized> {
    channel: &'a mut C,
    state: SessionState,
    meter: Option<MeterId>,
    timeout: Duration,
    statistics: SessionStatistics,
}

impl<'a, C: Channel + ?Sized> MeterSession<'a, C> {
    /// Create an idle session on `channel`
    pub fn new(channel: &'a mut C) -> Self {
        Self {
            channel,
            state: SessionState::Idle,
            meter: None,
            timeout: DEFAULT_READ_TIMEOUT,
            statistics: SessionStatistics::new(),
        }
    }

    /// Set the per-attempt read timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Get current session state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Meter selected by the last successful open
    pub fn meter(&self) -> Option<MeterId> {
        self.meter
    }

    /// Get session statistics
    pub fn statistics(&self) -> &SessionStatistics {
        &self.statistics
    }

    fn transition_to(&mut self, new_state: SessionState) -> EkmResult<()> {
        self.state.validate_transition(new_state)?;
        log::debug!("Session {} -> {}", self.state.as_str(), new_state.as_str());
        self.state = new_state;
        if new_state == SessionState::Idle {
            self.meter = None;
        }
        Ok(())
    }

    fn require(&self, allowed: bool, operation: &str) -> EkmResult<()> {
        if allowed {
            Ok(())
        } else {
            Err(EkmError::InvalidState(format!(
                "Cannot {} while session is {}",
                operation,
                self.state.as_str()
            )))
        }
    }

    fn send(&mut self, command: &Command<'_>) -> EkmResult<()> {
        let request = build_request(command)?;
        log::debug!("Sending {} ({} bytes)", command, request.len());
        self.channel.write_all(&request)?;
        self.channel.flush()?;
        self.statistics.increment_frames_sent();
        Ok(())
    }

    fn receive_frame(&mut self) -> EkmResult<Vec<u8>> {
        let mut frame = vec![0u8; RESPONSE_LENGTH];
        let result = read_exact_timeout(&mut *self.channel, &mut frame, self.timeout)
            .and_then(|()| validate_response(&frame, RESPONSE_LENGTH));
        match result {
            Ok(()) => {
                self.statistics.increment_frames_received();
                Ok(frame)
            }
            Err(e) => {
                self.statistics.record_error(&e);
                Err(e)
            }
        }
    }

    /// Send `command` and wait for a full validated response
    fn exchange(&mut self, command: &Command<'_>) -> EkmResult<Vec<u8>> {
        self.send(command)?;
        self.receive_frame()
    }

    /// Send `command` and read the single-byte acknowledgement
    fn acknowledged(&mut self, command: &Command<'_>) -> EkmResult<bool> {
        self.send(command)?;
        let mut ack = [0u8; 1];
        if let Err(e) = read_exact_timeout(&mut *self.channel, &mut ack, self.timeout) {
            self.statistics.record_error(&e);
            return Err(e);
        }
        self.statistics.increment_frames_received();
        if ack[0] == ACK {
            Ok(true)
        } else {
            log::debug!("{} answered with 0x{:02X}", command, ack[0]);
            self.statistics.increment_rejected_acks();
            Ok(false)
        }
    }

    /// Open a meter and read its live snapshot
    ///
    /// # Process
    /// 1. Drop whatever is left in the input buffer
    /// 2. Send Close, in case an earlier run left the meter selected
    /// 3. Send Open and read the 255-byte response
    /// 4. Validate and decode it
    ///
    /// # Error Handling
    /// Any failure discards input, sends Close and leaves the session `Idle`.
    /// No partial snapshot is returned.
    pub fn open(&mut self, meter_id: MeterId) -> EkmResult<MeterSnapshot> {
        self.require(!self.state.is_open(), "open")?;

        match self.try_open(meter_id) {
            Ok(snapshot) => {
                if snapshot.address != meter_id {
                    log::warn!("Meter {} answered with address {}", meter_id, snapshot.address);
                }
                self.transition_to(SessionState::Opened)?;
                self.meter = Some(meter_id);
                Ok(snapshot)
            }
            Err(e) => {
                log::debug!("Open of meter {} failed: {}", meter_id, e);
                self.abandon();
                Err(e)
            }
        }
    }

    fn try_open(&mut self, meter_id: MeterId) -> EkmResult<MeterSnapshot> {
        self.channel.discard_input()?;
        self.send(&Command::Close)?;
        let frame = self.exchange(&Command::Open(meter_id))?;
        decode_snapshot(&frame)
    }

    /// Best-effort cleanup after a failed open
    fn abandon(&mut self) {
        if let Err(e) = self.channel.discard_input() {
            log::debug!("Discard after failed open: {}", e);
        }
        if let Err(e) = self.send(&Command::Close) {
            log::debug!("Close after failed open: {}", e);
        }
        self.state = SessionState::Idle;
        self.meter = None;
    }

    /// Send the password
    ///
    /// # Returns
    /// `Ok(true)` if the meter acknowledged it, `Ok(false)` for any other
    /// reply byte, `Err(ReadTimeout)` if the meter stayed silent.
    pub fn authenticate(&mut self, password: &str) -> EkmResult<bool> {
        self.require(self.state == SessionState::Opened, "authenticate")?;

        let accepted = self.acknowledged(&Command::Password(password))?;
        if accepted {
            self.transition_to(SessionState::Authenticated)?;
        }
        Ok(accepted)
    }

    /// Set the meter clock to the local time
    pub fn set_clock(&mut self) -> EkmResult<bool> {
        self.set_clock_at(Local::now().naive_local())
    }

    /// Set the meter clock to `time`
    ///
    /// Same acknowledgement convention as `authenticate`.
    pub fn set_clock_at(&mut self, time: NaiveDateTime) -> EkmResult<bool> {
        self.require(self.state.can_write(), "set clock")?;
        self.acknowledged(&Command::SetTime(time))
    }

    /// Read six months of forward and reverse totals
    ///
    /// Forward comes back net of reverse. Nothing is returned unless both
    /// tables validate.
    pub fn read_history(&mut self) -> EkmResult<MeterHistory> {
        self.require(self.state.is_open(), "read history")?;

        let forward = self.exchange(&Command::HistoryForward)?;
        let forward = decode_history_table(&forward)?;
        let reverse = self.exchange(&Command::HistoryReverse)?;
        let reverse = decode_history_table(&reverse)?;
        Ok(MeterHistory::from_raw(forward, reverse))
    }

    /// Read the holiday calendar
    pub fn read_holidays(&mut self) -> EkmResult<HolidayTable> {
        self.require(self.state.is_open(), "read holidays")?;
        let frame = self.exchange(&Command::Holidays)?;
        decode_holidays(&frame)
    }

    /// Read one half of the tariff period tables as a validated raw frame
    pub fn read_period_table(&mut self, block: PeriodTableBlock) -> EkmResult<Vec<u8>> {
        self.require(self.state.is_open(), "read period table")?;
        self.exchange(&Command::PeriodTable(block))
    }

    /// Send Close and return to `Idle`
    ///
    /// The meter does not answer Close. The state is reset even if the
    /// write fails.
    pub fn close(&mut self) -> EkmResult<()> {
        self.transition_to(SessionState::Idle)?;
        self.send(&Command::Close)
    }
}
