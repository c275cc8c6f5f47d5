//! Timed exact reads
//!
//! The meter answers in one burst, but serial drivers and bridges hand the
//! burst over in pieces. `read_exact_timeout` keeps reading until the buffer
//! is full or the line has been quiet for a whole timeout window.

use ekm_core::{EkmError, EkmResult};
use ekm_transport::Channel;
use std::io::ErrorKind;
use std::time::{Duration, Instant};

/// Per-attempt read timeout used unless the session is told otherwise
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Pause before retrying a not-ready channel
const RETRY_PAUSE: Duration = Duration::from_millis(5);

fn is_not_ready(err: &EkmError) -> bool {
    matches!(
        err,
        EkmError::Connection(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted)
    )
}

/// Fill `buf` completely from `channel`
///
/// The timeout restarts whenever new bytes arrive.
///
/// # Errors
///
/// `ReadTimeout` if nothing at all arrived, `ShortRead` if the line went
/// quiet part way through, or the channel's own error.
pub fn read_exact_timeout<C: Channel + ?Sized>(
    channel: &mut C,
    buf: &mut [u8],
    timeout: Duration,
) -> EkmResult<()> {
    let mut filled = 0;
    let mut last_progress = Instant::now();

    while filled < buf.len() {
        let remaining = timeout.saturating_sub(last_progress.elapsed());
        if remaining.is_zero() {
            return Err(quiet(filled, buf.len()));
        }

        match channel.read_timeout(&mut buf[filled..], remaining) {
            Ok(0) => return Err(quiet(filled, buf.len())),
            Ok(n) => {
                filled += n;
                last_progress = Instant::now();
            }
            Err(e) if is_not_ready(&e) => std::thread::sleep(RETRY_PAUSE.min(remaining)),
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

fn quiet(filled: usize, expected: usize) -> EkmError {
    if filled == 0 {
        EkmError::ReadTimeout
    } else {
        EkmError::ShortRead {
            expected,
            received: filled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ekm_transport::MemoryChannel;

    /// Fails with a not-ready error a few times before each byte
    struct Stuttering {
        data: Vec<u8>,
        stalls: usize,
        until_ready: usize,
    }

    impl Channel for Stuttering {
        fn read_timeout(&mut self, buf: &mut [u8], _timeout: Duration) -> EkmResult<usize> {
            if self.until_ready > 0 {
                self.until_ready -= 1;
                return Err(std::io::Error::from(ErrorKind::WouldBlock).into());
            }
            if self.data.is_empty() {
                return Ok(0);
            }
            self.until_ready = self.stalls;
            buf[0] = self.data.remove(0);
            Ok(1)
        }

        fn write(&mut self, buf: &[u8]) -> EkmResult<usize> {
            Ok(buf.len())
        }

        fn flush(&mut self) -> EkmResult<()> {
            Ok(())
        }

        fn discard_input(&mut self) -> EkmResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_reassembles_chunks() {
        let mut channel = MemoryChannel::new().with_max_chunk(7);
        channel.preload(&[0x41; 100]);
        let mut buf = [0u8; 100];
        read_exact_timeout(&mut channel, &mut buf, DEFAULT_READ_TIMEOUT).unwrap();
        assert!(buf.iter().all(|&b| b == 0x41));
    }

    #[test]
    fn test_nothing_is_timeout_partial_is_short() {
        let mut channel = MemoryChannel::new();
        let mut buf = [0u8; 4];
        assert!(matches!(
            read_exact_timeout(&mut channel, &mut buf, DEFAULT_READ_TIMEOUT),
            Err(EkmError::ReadTimeout)
        ));

        channel.preload(b"ab");
        assert!(matches!(
            read_exact_timeout(&mut channel, &mut buf, DEFAULT_READ_TIMEOUT),
            Err(EkmError::ShortRead { expected: 4, received: 2 })
        ));
    }

    #[test]
    fn test_retries_not_ready() {
        let mut channel = Stuttering {
            data: b"\x06ok".to_vec(),
            stalls: 2,
            until_ready: 3,
        };
        let mut buf = [0u8; 3];
        read_exact_timeout(&mut channel, &mut buf, DEFAULT_READ_TIMEOUT).unwrap();
        assert_eq!(&buf, b"\x06ok");
    }

    #[test]
    fn test_not_ready_forever_times_out() {
        let mut channel = Stuttering {
            data: Vec::new(),
            stalls: 0,
            until_ready: usize::MAX,
        };
        let mut buf = [0u8; 1];
        assert!(matches!(
            read_exact_timeout(&mut channel, &mut buf, Duration::from_millis(30)),
            Err(EkmError::ReadTimeout)
        ));
    }
}
