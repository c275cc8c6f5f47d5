//! Reader daemon: polls every configured meter once per tick
//!
//! The protocol engine blocks, so each cycle runs on tokio's blocking pool.
//! The transport is moved into the blocking task and handed back when the
//! cycle ends, which keeps exactly one cycle on the wire at a time.

use anyhow::{Context, Result};
use ekm_client::{ChannelBuilder, CycleReport, Poller, ReaderConfig, ReportWriter};
use ekm_core::EkmError;
use ekm_transport::Transport;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};

/// Outcome of one tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleSummary {
    /// Meters that produced a report record
    pub recorded: usize,
    /// Meters abandoned this cycle
    pub failed: usize,
}

/// Periodic meter reader
pub struct Reader {
    config: Arc<ReaderConfig>,
    transport: Option<Box<dyn Transport>>,
    writer: ReportWriter,
}

impl Reader {
    /// Create a reader with the transport named in the configuration
    ///
    /// The transport is opened lazily on the first cycle.
    pub fn new(config: ReaderConfig) -> Result<Self> {
        let transport = ChannelBuilder::from_config(&config.transport)
            .build()
            .context("Failed to build transport")?;
        Ok(Self::with_transport(config, transport))
    }

    /// Create a reader over an existing transport
    pub fn with_transport(config: ReaderConfig, transport: Box<dyn Transport>) -> Self {
        let writer = ReportWriter::new(config.log_path());
        Self {
            config: Arc::new(config),
            transport: Some(transport),
            writer,
        }
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    /// Run one polling cycle on the blocking pool
    ///
    /// A transport lost to a panicked cycle is rebuilt from the configuration.
    pub async fn run_cycle(&mut self) -> Result<CycleSummary> {
        let transport = match self.transport.take() {
            Some(transport) => transport,
            None => {
                log::warn!("Rebuilding transport lost by an earlier cycle");
                ChannelBuilder::from_config(&self.config.transport)
                    .build()
                    .context("Failed to rebuild transport")?
            }
        };
        let config = Arc::clone(&self.config);
        let writer = self.writer.clone();

        let (transport, outcome) = tokio::task::spawn_blocking(move || {
            let mut transport = transport;
            let outcome = poll_and_record(&config, &writer, transport.as_mut());
            (transport, outcome)
        })
        .await
        .context("Polling task panicked")?;

        self.transport = Some(transport);
        outcome
    }

    /// Tick until `shutdown` resolves
    ///
    /// Ticks that fall due while a cycle is still running are skipped and
    /// reported.
    pub async fn run_until<F: Future<Output = ()>>(mut self, shutdown: F) -> Result<()> {
        let period = self.config.poll_interval();
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_tick: Option<Instant> = None;

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                tick = interval.tick() => {
                    if let Some(previous) = last_tick {
                        let missed = missed_ticks(tick.duration_since(previous), period);
                        if missed > 0 {
                            log::warn!("Missed {} events", missed);
                        }
                    }
                    last_tick = Some(tick);
                    self.tick().await;
                }
                _ = &mut shutdown => {
                    log::info!("Shutting down");
                    break;
                }
            }
        }

        self.shutdown()
    }

    async fn tick(&mut self) {
        match self.run_cycle().await {
            Ok(summary) => log::debug!(
                "Cycle done: {} recorded, {} failed",
                summary.recorded,
                summary.failed
            ),
            Err(e) => log::error!("Cycle failed: {:#}", e),
        }
    }

    /// Close the transport
    pub fn shutdown(mut self) -> Result<()> {
        if let Some(mut transport) = self.transport.take() {
            transport.close().context("Failed to close transport")?;
        }
        Ok(())
    }
}

fn missed_ticks(gap: Duration, period: Duration) -> u128 {
    if period.is_zero() {
        return 0;
    }
    (gap.as_millis() / period.as_millis().max(1)).saturating_sub(1)
}

/// One blocking cycle: reopen if needed, poll, append the report
fn poll_and_record(
    config: &ReaderConfig,
    writer: &ReportWriter,
    transport: &mut dyn Transport,
) -> Result<CycleSummary> {
    if transport.is_closed() {
        transport.open().context("Failed to open transport")?;
        log::info!("Transport opened");
    }

    let results = Poller::new(config).poll_all(transport);
    let mut summary = CycleSummary::default();
    let mut reports: Vec<CycleReport> = Vec::with_capacity(results.len());
    let mut link_lost = false;

    for (meter, result) in results {
        match result {
            Ok(report) => {
                if report.clock_set {
                    log::info!("Set clock on meter {}", meter);
                }
                reports.push(report);
                summary.recorded += 1;
            }
            Err(e) => {
                if matches!(e, EkmError::Connection(_)) {
                    link_lost = true;
                }
                if e.is_transient() {
                    log::debug!("Meter {} skipped: {}", meter, e);
                } else {
                    log::warn!("Meter {} skipped: {}", meter, e);
                }
                summary.failed += 1;
            }
        }
    }

    // Reopen on the next tick.
    if link_lost {
        log::warn!("Transport error, closing link");
        if let Err(e) = transport.close() {
            log::debug!("Close after transport error: {}", e);
        }
    }

    writer.append(&reports)?;
    Ok(summary)
}
