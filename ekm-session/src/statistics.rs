//! Session statistics collection

use ekm_core::EkmError;

/// Meter session statistics
///
/// Updated by the session on every exchange. Useful to tell a noisy line
/// (checksum errors, short reads) from a dead one (timeouts).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStatistics {
    /// Total number of requests sent
    pub frames_sent: u64,
    /// Total number of complete, valid responses received
    pub frames_received: u64,
    /// Responses whose trailing checksum did not match
    pub checksum_errors: u64,
    /// Responses that stopped part way through
    pub short_reads: u64,
    /// Requests that got no answer at all
    pub timeouts: u64,
    /// Single-byte acknowledgements other than ACK
    pub rejected_acks: u64,
}

impl SessionStatistics {
    /// Create new statistics with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all statistics counters
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn increment_frames_sent(&mut self) {
        self.frames_sent += 1;
    }

    pub fn increment_frames_received(&mut self) {
        self.frames_received += 1;
    }

    pub fn increment_rejected_acks(&mut self) {
        self.rejected_acks += 1;
    }

    /// Count a failed read under the matching counter
    pub fn record_error(&mut self, err: &EkmError) {
        match err {
            EkmError::ChecksumMismatch { .. } => self.checksum_errors += 1,
            EkmError::ShortRead { .. } => self.short_reads += 1,
            EkmError::ReadTimeout => self.timeouts += 1,
            _ => {}
        }
    }

    /// Get error rate as a percentage of requests sent
    ///
    /// Returns 0.0 if nothing has been sent.
    pub fn error_rate(&self) -> f64 {
        let total_errors =
            self.checksum_errors + self.short_reads + self.timeouts + self.rejected_acks;
        if self.frames_sent == 0 {
            0.0
        } else {
            (total_errors as f64 / self.frames_sent as f64) * 100.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_error() {
        let mut stats = SessionStatistics::new();
        stats.record_error(&EkmError::ReadTimeout);
        stats.record_error(&EkmError::ShortRead { expected: 255, received: 10 });
        stats.record_error(&EkmError::ChecksumMismatch { computed: 1, received: 2 });
        stats.record_error(&EkmError::AuthRejected);
        assert_eq!(stats.timeouts, 1);
        assert_eq!(stats.short_reads, 1);
        assert_eq!(stats.checksum_errors, 1);
        assert_eq!(stats.rejected_acks, 0);
    }

    #[test]
    fn test_error_rate() {
        let mut stats = SessionStatistics::new();
        assert_eq!(stats.error_rate(), 0.0);
        for _ in 0..4 {
            stats.increment_frames_sent();
        }
        stats.increment_rejected_acks();
        assert_eq!(stats.error_rate(), 25.0);
        stats.clear();
        assert_eq!(stats, SessionStatistics::default());
    }
}
