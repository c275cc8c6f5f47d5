//! Text report appended to the pending log
//!
//! One record per meter per cycle, in the plain line format the graphing
//! scripts consume.

use crate::poller::CycleReport;
use anyhow::{Context, Result};
use ekm_core::reading::{PHASES, TouTotals};
use std::fmt::Write as _;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Number of history months listed in a record
const HISTORY_LINES: usize = 5;

/// Appends records to the report log
#[derive(Debug, Clone)]
pub struct ReportWriter {
    path: PathBuf,
}

impl ReportWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append the records of one cycle in a single write
    pub fn append(&self, reports: &[CycleReport]) -> Result<()> {
        if reports.is_empty() {
            return Ok(());
        }
        let text: String = reports.iter().map(format_record).collect();

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open report log {}", self.path.display()))?;
        file.write_all(text.as_bytes())
            .with_context(|| format!("Failed to write report log {}", self.path.display()))?;
        Ok(())
    }
}

fn usage_line(out: &mut String, label: &str, usage: &TouTotals) {
    let values = std::iter::once(usage.total)
        .chain(usage.tou.iter().copied())
        .map(|v| format!("{:<8.1}", v))
        .collect::<Vec<_>>()
        .join(" ");
    let _ = writeln!(out, "{}{}", label, values);
}

/// Render one cycle as a report record
pub fn format_record(report: &CycleReport) -> String {
    let snapshot = &report.snapshot;
    let mut out = String::new();

    let _ = writeln!(out, "{}", report.polled_at.timestamp());
    let _ = writeln!(out, "meter: {} {}", report.meter, snapshot.firmware);
    for i in 0..PHASES {
        let _ = writeln!(out, "L{} Volts: {:<5.1}", i + 1, snapshot.phases[i].volts);
    }
    for i in 0..PHASES {
        let _ = writeln!(out, "L{} Amps: {:<6.1}", i + 1, snapshot.phases[i].amps);
    }
    for i in 0..PHASES {
        let _ = writeln!(out, "L{} Power: {:<8}", i + 1, snapshot.phases[i].power);
    }
    for i in 0..PHASES {
        let _ = writeln!(out, "L{} PF: {:4.2}", i + 1, snapshot.phases[i].power_factor);
    }
    let _ = writeln!(out, "CT Size: {}", snapshot.ct_size);
    let _ = writeln!(out, "Frw kWh: {:<9.1}", snapshot.forward.total);
    let _ = writeln!(out, "Rev kWh: {:<9.1}", snapshot.reverse.total);
    let _ = writeln!(out, "Demand: {:<9}", snapshot.max_demand);
    let _ = writeln!(out, "Demand Period: {}", snapshot.demand_period as char);

    if let Some(history) = &report.history {
        // "Current" is usage since the close of the most recent month.
        if let Some((fwd, rev)) = history.usage_since(snapshot, 0) {
            usage_line(&mut out, "Current fwd:    ", &fwd);
            usage_line(&mut out, "Current rev:    ", &rev);
        }
        for month in 0..HISTORY_LINES {
            if let Some((fwd, rev)) = history.usage_since(snapshot, month) {
                usage_line(&mut out, &format!("History fwd -{}: ", month + 1), &fwd);
                usage_line(&mut out, &format!("History rev -{}: ", month + 1), &rev);
            }
        }
    }
    out
}
