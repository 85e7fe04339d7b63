//! Token resolution: mapping emitted extended ids back to surface text
//!
//! Reverses the copy operation. Ids below the vocabulary size resolve
//! through the base vocabulary; ids at or above it index into the
//! example's OOV list. A beam can legally emit an extended id that
//! belongs to another example's wider OOV padding; that id is out of
//! range for this example and resolves to the `UNK` marker (counted,
//! never an error).

use crate::stats::DecodeStats;
use crate::vocab::{OovList, Vocabulary, UNK};

/// Resolves extended ids to surface tokens for one decode run
///
/// Borrows the run's vocabulary; per-example OOV lists are supplied at
/// each call since they differ across the batch.
#[derive(Debug)]
pub struct Resolver<'v> {
    vocab: &'v Vocabulary,
    stats: DecodeStats,
}

impl<'v> Resolver<'v> {
    /// Create a resolver over a vocabulary, reporting anomalies to `stats`
    #[must_use]
    pub fn new(vocab: &'v Vocabulary, stats: DecodeStats) -> Self {
        Self { vocab, stats }
    }

    /// Resolve one extended id against one example's OOV list
    ///
    /// Never fails: unknown base ids and out-of-range OOV indices both
    /// fall back to the `UNK` marker, the latter incrementing the
    /// OOV-overflow counter.
    #[must_use]
    pub fn resolve<'s>(&'s self, id: u32, oov: &'s OovList) -> &'s str {
        let vocab_size = self.vocab.size() as u32;
        if id < vocab_size {
            return self.vocab.get_token(id).unwrap_or(UNK);
        }
        let idx = (id - vocab_size) as usize;
        match oov.get(idx) {
            Some(token) => token,
            None => {
                self.stats.record_oov_overflow();
                UNK
            },
        }
    }

    /// Resolve a full emitted sequence for one example
    #[must_use]
    pub fn resolve_sequence(&self, ids: &[u32], oov: &OovList) -> Vec<String> {
        ids.iter()
            .map(|&id| self.resolve(id, oov).to_string())
            .collect()
    }
}
