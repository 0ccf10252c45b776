//! Immediate context buffer
//!
//! Bounded FIFO for the hottest conversational context. Eviction is strictly
//! oldest-first: an add at capacity discards the head. Expiration is lazy,
//! on read and on metrics collection rather than on a background timer,
//! which bounds per-operation work at O(k) for k expired entries at the
//! head.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use strata_core::types::ContextItem;

/// Buffer metrics snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferMetrics {
    /// Live entries after lazy expiry
    pub current_size: usize,
    /// Configured capacity
    pub max_size: usize,
    /// Total adds since construction
    pub total_adds: u64,
    /// Total capacity evictions since construction
    pub total_evictions: u64,
    /// Configured TTL in seconds (0 disables TTL)
    pub ttl_seconds: u64,
    /// Age of the oldest live entry in seconds
    pub oldest_age_seconds: Option<f64>,
    /// Age of the newest live entry in seconds
    pub newest_age_seconds: Option<f64>,
}

/// Bounded FIFO hot cache with TTL
pub struct ImmediateBuffer {
    max_size: usize,
    ttl_seconds: u64,
    buffer: Mutex<VecDeque<ContextItem>>,
    total_adds: AtomicU64,
    total_evictions: AtomicU64,
}

impl ImmediateBuffer {
    /// Create a buffer with the given capacity and TTL (0 disables TTL)
    #[must_use]
    pub fn new(max_size: usize, ttl_seconds: u64) -> Self {
        debug!(max_size, ttl_seconds, "immediate buffer created");
        Self {
            max_size,
            ttl_seconds,
            buffer: Mutex::new(VecDeque::with_capacity(max_size)),
            total_adds: AtomicU64::new(0),
            total_evictions: AtomicU64::new(0),
        }
    }

    /// Append an item; at capacity the oldest entry is discarded
    ///
    /// Always succeeds.
    pub fn add(&self, item: ContextItem) {
        let mut buffer = self.buffer.lock();
        if buffer.len() >= self.max_size {
            buffer.pop_front();
            self.total_evictions.fetch_add(1, Ordering::Relaxed);
            trace!("evicted oldest entry at capacity");
        }
        trace!(id = %item.id, "added to immediate buffer");
        buffer.push_back(item);
        self.total_adds.fetch_add(1, Ordering::Relaxed);
    }

    /// Return up to `max_items` entries, newest first
    ///
    /// Expired entries are dropped first; returned entries are marked
    /// accessed. `conversation_id` restricts the result to one conversation.
    pub fn get_recent(
        &self,
        max_items: usize,
        conversation_id: Option<&str>,
    ) -> Vec<ContextItem> {
        let now = Utc::now();
        let mut buffer = self.buffer.lock();
        Self::drop_expired(&mut buffer, self.ttl_seconds);

        let mut results = Vec::new();
        for item in buffer.iter_mut().rev() {
            if results.len() >= max_items {
                break;
            }
            if item.is_expired(now) {
                continue;
            }
            if let Some(cid) = conversation_id {
                if item.conversation_id.as_deref() != Some(cid) {
                    continue;
                }
            }
            item.mark_accessed();
            results.push(item.clone());
        }
        results
    }

    /// Drop everything, or only one conversation's entries
    pub fn clear(&self, conversation_id: Option<&str>) {
        let mut buffer = self.buffer.lock();
        match conversation_id {
            Some(cid) => {
                buffer.retain(|item| item.conversation_id.as_deref() != Some(cid));
                debug!(conversation_id = cid, "cleared conversation from buffer");
            }
            None => {
                buffer.clear();
                debug!("cleared immediate buffer");
            }
        }
    }

    /// Current number of live entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.lock().len()
    }

    /// Whether the buffer holds no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.lock().is_empty()
    }

    /// Whether the buffer is at capacity
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.buffer.lock().len() >= self.max_size
    }

    /// Metrics snapshot, taken after lazy expiry
    #[must_use]
    pub fn metrics(&self) -> BufferMetrics {
        let now = Utc::now();
        let mut buffer = self.buffer.lock();
        Self::drop_expired(&mut buffer, self.ttl_seconds);

        let age_of = |item: &ContextItem| {
            #[allow(clippy::cast_precision_loss)]
            let millis = (now - item.timestamp).num_milliseconds() as f64;
            millis / 1000.0
        };

        BufferMetrics {
            current_size: buffer.len(),
            max_size: self.max_size,
            total_adds: self.total_adds.load(Ordering::Relaxed),
            total_evictions: self.total_evictions.load(Ordering::Relaxed),
            ttl_seconds: self.ttl_seconds,
            oldest_age_seconds: buffer.front().map(age_of),
            newest_age_seconds: buffer.back().map(age_of),
        }
    }

    /// Drop TTL-expired entries from the head (insertion order == age order)
    fn drop_expired(buffer: &mut VecDeque<ContextItem>, ttl_seconds: u64) {
        if ttl_seconds == 0 {
            return;
        }
        #[allow(clippy::cast_possible_wrap)]
        let cutoff = Utc::now() - Duration::seconds(ttl_seconds as i64);
        while buffer
            .front()
            .is_some_and(|item| item.timestamp < cutoff)
        {
            let dropped = buffer.pop_front();
            if let Some(item) = dropped {
                trace!(id = %item.id, "dropped TTL-expired entry");
            }
        }
    }
}
