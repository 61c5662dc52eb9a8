//! Packet-budgeted batching of high-cardinality entity state.
//!
//! Entries are sized by their encoded length; every batch is sized so that
//! `BATCH_HEADER_LEN + count * largest_entry` fits the budget.

use serde::Serialize;
use tandem_net::messages::{BATCH_HEADER_LEN, encoded_len};

/// Result of [`plan_batches`].
#[derive(Debug, Clone, PartialEq)]
pub struct BatchPlan<T> {
    /// Consecutive chunks, one packet each. Never contains an empty chunk.
    pub batches: Vec<Vec<T>>,
    /// Entries dropped because they alone exceed the budget.
    pub skipped: usize,
    /// Entries per packet used for chunking.
    pub per_packet: usize,
}

impl<T> BatchPlan<T> {
    fn empty() -> Self {
        Self {
            batches: Vec::new(),
            skipped: 0,
            per_packet: 0,
        }
    }
}

/// Split `entries` into batches that fit `budget` bytes each.
pub fn plan_batches<T: Serialize>(entries: Vec<T>, budget: usize) -> BatchPlan<T> {
    if entries.is_empty() {
        return BatchPlan::empty();
    }
    let room = budget.saturating_sub(BATCH_HEADER_LEN);

    let mut skipped = 0;
    let mut largest = 0;
    let mut fitting = Vec::with_capacity(entries.len());
    for entry in entries {
        let len = encoded_len(&entry);
        if len > room {
            skipped += 1;
            continue;
        }
        largest = largest.max(len);
        fitting.push(entry);
    }
    if skipped > 0 {
        tracing::warn!("{skipped} snapshot entries exceed the {budget} byte budget, skipped");
    }
    if fitting.is_empty() {
        return BatchPlan {
            skipped,
            ..BatchPlan::empty()
        };
    }

    let per_packet = (room / largest.max(1)).max(1);
    let mut batches = Vec::with_capacity(fitting.len().div_ceil(per_packet));
    let mut iter = fitting.into_iter().peekable();
    while iter.peek().is_some() {
        batches.push(iter.by_ref().take(per_packet).collect());
    }

    BatchPlan {
        batches,
        skipped,
        per_packet,
    }
}
