//! Request id generation.
//!
//! Ids follow a snowflake layout so they are unique across processes that use
//! distinct worker ids and strictly increasing within one generator:
//!
//! ```text
//! | 41 bits: ms since EPOCH_MS | 10 bits: worker id | 12 bits: sequence |
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use super::RequestId;

/// Custom epoch (2024-01-01T00:00:00Z) in Unix milliseconds.
pub const EPOCH_MS: u64 = 1_704_067_200_000;

const WORKER_BITS: u32 = 10;
const SEQUENCE_BITS: u32 = 12;

pub const MAX_WORKER_ID: u16 = (1 << WORKER_BITS) - 1;
const SEQUENCE_MASK: u64 = (1 << SEQUENCE_BITS) - 1;
const WORKER_SHIFT: u32 = SEQUENCE_BITS;
const TIMESTAMP_SHIFT: u32 = SEQUENCE_BITS + WORKER_BITS;

/// Generator for globally unique, monotonically increasing request ids.
///
/// The generator is an explicitly owned component: the orchestrator receives
/// one at construction instead of reaching for a process-wide singleton.
/// Issuing an id is lock-free.
#[derive(Debug)]
pub struct IdGenerator {
    worker_id: u64,
    /// Last id handed out; the next id is derived from it with a CAS loop.
    last: AtomicU64,
}

impl IdGenerator {
    /// Creates a generator for `worker_id`, masked to 10 bits.
    pub fn new(worker_id: u16) -> Self {
        Self {
            worker_id: u64::from(worker_id & MAX_WORKER_ID),
            last: AtomicU64::new(0),
        }
    }

    pub fn worker_id(&self) -> u16 {
        self.worker_id as u16
    }

    /// Issues the next id.
    ///
    /// When the 12-bit sequence of the current millisecond is exhausted the
    /// generator moves on to the following millisecond instead of spilling
    /// into the worker bits.
    pub fn next_id(&self) -> RequestId {
        let now = current_millis();

        loop {
            let last = self.last.load(Ordering::Acquire);
            let last_ts = last >> TIMESTAMP_SHIFT;
            let last_seq = last & SEQUENCE_MASK;

            let next = if now > last_ts {
                self.compose(now, 0)
            } else if last_seq < SEQUENCE_MASK {
                self.compose(last_ts, last_seq + 1)
            } else {
                self.compose(last_ts + 1, 0)
            };

            match self
                .last
                .compare_exchange_weak(last, next, Ordering::SeqCst, Ordering::Acquire)
            {
                Ok(_) => return next,
                Err(_) => continue,
            }
        }
    }

    fn compose(&self, timestamp: u64, sequence: u64) -> u64 {
        (timestamp << TIMESTAMP_SHIFT) | (self.worker_id << WORKER_SHIFT) | sequence
    }

    /// Splits an id into `(timestamp_ms_since_epoch, worker_id, sequence)`.
    pub fn decompose(id: RequestId) -> (u64, u16, u16) {
        (
            id >> TIMESTAMP_SHIFT,
            ((id >> WORKER_SHIFT) & u64::from(MAX_WORKER_ID)) as u16,
            (id & SEQUENCE_MASK) as u16,
        )
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new(0)
    }
}

fn current_millis() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(EPOCH_MS)
        .saturating_sub(EPOCH_MS)
}
