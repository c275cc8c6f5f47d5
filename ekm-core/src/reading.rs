//! Decoded meter readings
//!
//! These are the unit-converted results of one request/response exchange.
//! They are built fresh for every exchange and never cached.

use crate::meter_id::MeterId;
use chrono::NaiveDateTime;
use serde::Serialize;
use std::ops::Sub;

/// Number of time-of-use tariff registers
pub const TOU_PERIODS: usize = 4;

/// Number of phases reported by the meter
pub const PHASES: usize = 3;

/// Number of months held in the history tables
pub const HISTORY_MONTHS: usize = 6;

/// Number of holiday slots in the holiday table
pub const HOLIDAY_SLOTS: usize = 20;

/// Energy total in kWh split across the time-of-use registers
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct TouTotals {
    pub total: f64,
    pub tou: [f64; TOU_PERIODS],
}

impl TouTotals {
    /// Subtract the reverse (exported) totals, register by register
    pub fn net_of(&self, reverse: &TouTotals) -> TouTotals {
        *self - *reverse
    }
}

impl Sub for TouTotals {
    type Output = TouTotals;

    fn sub(self, rhs: TouTotals) -> TouTotals {
        let mut tou = self.tou;
        for (value, other) in tou.iter_mut().zip(rhs.tou.iter()) {
            *value -= other;
        }
        TouTotals {
            total: self.total - rhs.total,
            tou,
        }
    }
}

/// Per-phase live values
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct PhaseReading {
    /// Volts
    pub volts: f64,
    /// Amps
    pub amps: f64,
    /// Watts
    pub power: u64,
    /// Negative when capacitive
    pub power_factor: f64,
    pub pulse_count: u64,
    pub pulse_ratio: u64,
    /// Raw pulse input level byte
    pub pulse_trigger: u8,
}

/// Live snapshot returned by the open command
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeterSnapshot {
    pub address: MeterId,
    pub model: [u8; 2],
    pub firmware: u8,
    /// Net of reverse
    pub forward: TouTotals,
    pub reverse: TouTotals,
    pub phases: [PhaseReading; PHASES],
    pub total_power: u64,
    pub ct_size: u64,
    pub max_demand: u64,
    /// Demand interval code as sent by the meter
    pub demand_period: u8,
    /// Meter clock, naive local time
    pub meter_time: NaiveDateTime,
}

impl MeterSnapshot {
    /// Seconds the meter clock lags behind `now` (negative when ahead)
    pub fn clock_drift(&self, now: NaiveDateTime) -> i64 {
        now.signed_duration_since(self.meter_time).num_seconds()
    }
}

/// Six months of monthly closing totals, most recent month first
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct MeterHistory {
    /// Net of reverse, per month
    pub forward: [TouTotals; HISTORY_MONTHS],
    pub reverse: [TouTotals; HISTORY_MONTHS],
}

impl MeterHistory {
    /// Build a history from raw tables, netting forward by reverse per month
    pub fn from_raw(
        forward: [TouTotals; HISTORY_MONTHS],
        reverse: [TouTotals; HISTORY_MONTHS],
    ) -> Self {
        let mut net = forward;
        for (month, rev) in net.iter_mut().zip(reverse.iter()) {
            *month = month.net_of(rev);
        }
        Self {
            forward: net,
            reverse,
        }
    }

    /// Energy used between the close of `month` and the live snapshot
    ///
    /// Returns `(forward, reverse)` usage, or `None` if `month` is out of range.
    pub fn usage_since(
        &self,
        snapshot: &MeterSnapshot,
        month: usize,
    ) -> Option<(TouTotals, TouTotals)> {
        let forward = self.forward.get(month)?;
        let reverse = self.reverse.get(month)?;
        Some((snapshot.forward - *forward, snapshot.reverse - *reverse))
    }
}

/// A holiday date in the tariff calendar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Holiday {
    pub month: u8,
    pub day: u8,
}

/// Holiday calendar and the schedules used on weekends and holidays
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HolidayTable {
    /// Unused slots are `None`
    pub holidays: [Option<Holiday>; HOLIDAY_SLOTS],
    pub weekend_schedule: u8,
    pub holiday_schedule: u8,
}

impl HolidayTable {
    /// Iterate over the configured holidays
    pub fn configured(&self) -> impl Iterator<Item = &Holiday> {
        self.holidays.iter().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn totals(total: f64, tou: [f64; 4]) -> TouTotals {
        TouTotals { total, tou }
    }

    fn snapshot(forward: TouTotals, reverse: TouTotals) -> MeterSnapshot {
        MeterSnapshot {
            address: MeterId::new(13491).unwrap(),
            model: *b"10",
            firmware: 0x15,
            forward,
            reverse,
            phases: [PhaseReading::default(); PHASES],
            total_power: 0,
            ct_size: 200,
            max_demand: 0,
            demand_period: b'1',
            meter_time: NaiveDate::from_ymd_opt(2021, 3, 14)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap(),
        }
    }

    #[test]
    fn test_net_of_reverse() {
        let fwd = totals(100.0, [40.0, 30.0, 20.0, 10.0]);
        let rev = totals(20.0, [5.0, 5.0, 5.0, 5.0]);
        let net = fwd.net_of(&rev);
        assert_eq!(net.total, 80.0);
        assert_eq!(net.tou, [35.0, 25.0, 15.0, 5.0]);
    }

    #[test]
    fn test_history_from_raw_nets_each_month() {
        let mut forward = [TouTotals::default(); HISTORY_MONTHS];
        let mut reverse = [TouTotals::default(); HISTORY_MONTHS];
        forward[0] = totals(100.0, [0.0; 4]);
        reverse[0] = totals(20.0, [0.0; 4]);
        forward[5] = totals(50.0, [10.0; 4]);
        reverse[5] = totals(5.0, [1.0; 4]);

        let history = MeterHistory::from_raw(forward, reverse);
        assert_eq!(history.forward[0].total, 80.0);
        assert_eq!(history.forward[5].total, 45.0);
        assert_eq!(history.forward[5].tou, [9.0; 4]);
        assert_eq!(history.reverse[0].total, 20.0);
    }

    #[test]
    fn test_usage_since() {
        let history = MeterHistory::from_raw(
            [totals(100.0, [0.0; 4]); HISTORY_MONTHS],
            [totals(10.0, [0.0; 4]); HISTORY_MONTHS],
        );
        let snap = snapshot(totals(120.0, [0.0; 4]), totals(12.0, [0.0; 4]));
        let (fwd, rev) = history.usage_since(&snap, 0).unwrap();
        assert_eq!(fwd.total, 30.0);
        assert_eq!(rev.total, 2.0);
        assert!(history.usage_since(&snap, HISTORY_MONTHS).is_none());
    }

    #[test]
    fn test_clock_drift() {
        let snap = snapshot(TouTotals::default(), TouTotals::default());
        let now = snap.meter_time + chrono::Duration::seconds(5);
        assert_eq!(snap.clock_drift(now), 5);
        assert_eq!(snap.clock_drift(snap.meter_time - chrono::Duration::seconds(2)), -2);
    }
}
