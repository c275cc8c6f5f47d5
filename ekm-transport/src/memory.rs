//! In-memory channel
//!
//! A scripted stand-in for a meter. Replies are registered against the
//! leading bytes of the request that triggers them; each write that matches
//! queues the next reply for reading. Every write is recorded so callers can
//! check exactly what went out on the wire.

use crate::stream::Channel;
use ekm_core::EkmResult;
use std::collections::VecDeque;
use std::time::Duration;

#[derive(Debug)]
struct Script {
    prefix: Vec<u8>,
    replies: VecDeque<Vec<u8>>,
}

/// Scripted in-memory channel
#[derive(Debug, Default)]
pub struct MemoryChannel {
    scripts: Vec<Script>,
    pending: VecDeque<u8>,
    written: Vec<Vec<u8>>,
    max_chunk: Option<usize>,
    discarded: usize,
}

impl MemoryChannel {
    /// Create an empty channel; reads time out until a reply is scripted
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `reply` for the next write that starts with `prefix`
    pub fn respond_to(&mut self, prefix: &[u8], reply: impl Into<Vec<u8>>) -> &mut Self {
        let reply = reply.into();
        match self.scripts.iter_mut().find(|s| s.prefix == prefix) {
            Some(script) => script.replies.push_back(reply),
            None => self.scripts.push(Script {
                prefix: prefix.to_vec(),
                replies: VecDeque::from([reply]),
            }),
        }
        self
    }

    /// Make bytes readable immediately, as if left over from an earlier exchange
    pub fn preload(&mut self, bytes: &[u8]) -> &mut Self {
        self.pending.extend(bytes);
        self
    }

    /// Hand out at most `max` bytes per read to exercise partial reads
    pub fn with_max_chunk(mut self, max: usize) -> Self {
        self.max_chunk = Some(max.max(1));
        self
    }

    /// Every frame written so far, in order
    pub fn written(&self) -> &[Vec<u8>] {
        &self.written
    }

    /// Number of writes that started with `prefix`
    pub fn writes_starting_with(&self, prefix: &[u8]) -> usize {
        self.written.iter().filter(|w| w.starts_with(prefix)).count()
    }

    /// Bytes thrown away by `discard_input`
    pub fn discarded(&self) -> usize {
        self.discarded
    }

    /// Bytes queued but not yet read
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

impl Channel for MemoryChannel {
    fn read_timeout(&mut self, buf: &mut [u8], _timeout: Duration) -> EkmResult<usize> {
        let limit = self.max_chunk.unwrap_or(buf.len()).min(buf.len());
        let n = limit.min(self.pending.len());
        for (slot, byte) in buf.iter_mut().zip(self.pending.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> EkmResult<usize> {
        self.written.push(buf.to_vec());
        if let Some(script) = self
            .scripts
            .iter_mut()
            .find(|s| buf.starts_with(&s.prefix) && !s.replies.is_empty())
        {
            if let Some(reply) = script.replies.pop_front() {
                self.pending.extend(reply);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> EkmResult<()> {
        Ok(())
    }

    fn discard_input(&mut self) -> EkmResult<()> {
        self.discarded += self.pending.len();
        self.pending.clear();
        Ok(())
    }
}
