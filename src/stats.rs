//! Decode-run counters
//!
//! Tracks throughput and per-example anomalies over a decode run:
//! processed examples, buffer flushes, attention-guided UNK
//! replacements, and OOV-overflow fallbacks in the token resolver.
//! Anomalies degrade gracefully and never abort a batch, so counting
//! them here is the only way they are observable.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Shared counters for one decode run
///
/// Cloning shares the underlying counters; one instance belongs to one
/// pipeline. The pipeline itself is single-threaded, the atomics exist
/// so the resolver, post-processor, and emitter can share the counters
/// without threading `&mut` through every call.
#[derive(Debug, Clone, Default)]
pub struct DecodeStats {
    /// Examples fully processed
    examples: Arc<AtomicUsize>,
    /// Buffer flushes performed
    flushes: Arc<AtomicUsize>,
    /// UNK tokens replaced from source via attention
    unk_replacements: Arc<AtomicUsize>,
    /// Extended ids that fell outside the example's OOV list
    oov_overflows: Arc<AtomicUsize>,
}

/// Point-in-time snapshot of [`DecodeStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Examples fully processed
    pub examples: usize,
    /// Buffer flushes performed
    pub flushes: usize,
    /// UNK tokens replaced from source via attention
    pub unk_replacements: usize,
    /// Extended ids that fell outside the example's OOV list
    pub oov_overflows: usize,
}

impl DecodeStats {
    /// Create a fresh set of counters
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one fully processed example
    pub fn record_example(&self) {
        self.examples.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one buffer flush
    pub fn record_flush(&self) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one attention-guided UNK replacement
    pub fn record_unk_replacement(&self) {
        self.unk_replacements.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one out-of-range extended id resolved to the UNK marker
    pub fn record_oov_overflow(&self) {
        self.oov_overflows.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of examples processed so far
    #[must_use]
    pub fn examples(&self) -> usize {
        self.examples.load(Ordering::Relaxed)
    }

    /// Number of flushes performed so far
    #[must_use]
    pub fn flushes(&self) -> usize {
        self.flushes.load(Ordering::Relaxed)
    }

    /// Take a snapshot of all counters
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            examples: self.examples.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            unk_replacements: self.unk_replacements.load(Ordering::Relaxed),
            oov_overflows: self.oov_overflows.load(Ordering::Relaxed),
        }
    }
}
