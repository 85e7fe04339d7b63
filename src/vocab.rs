//! Vocabulary and per-example OOV registry
//!
//! The fixed vocabulary maps surface tokens to base ids and carries the
//! reserved start/end/unknown markers. Each example additionally owns an
//! ordered list of its out-of-vocabulary source tokens; the token at OOV
//! position `i` is addressable during that example's lifetime under the
//! extended id `vocab_size + i`. OOV lists are built once per example at
//! input-encoding time and never mutated afterwards.

use std::collections::HashMap;

use crate::error::{ApuntarError, Result};

/// Reserved marker emitted before the first real token of a sequence
pub const SEQUENCE_START: &str = "SEQUENCE_START";
/// Reserved marker terminating a sequence
pub const SEQUENCE_END: &str = "SEQUENCE_END";
/// Reserved marker for unknown tokens
pub const UNK: &str = "UNK";

/// Fixed vocabulary with reserved start/end/unknown markers
///
/// Immutable for the duration of a run. The reserved markers are
/// appended after the supplied tokens when absent, so `size()` always
/// covers them.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    /// Token to ID mapping
    token_to_id: HashMap<String, u32>,
    /// ID to token mapping
    id_to_token: HashMap<u32, String>,
    /// ID of `SEQUENCE_START`
    start_id: u32,
    /// ID of `SEQUENCE_END`
    end_id: u32,
    /// ID of `UNK`
    unk_id: u32,
}

impl Vocabulary {
    /// Create a vocabulary from an ordered token list (index = token ID)
    ///
    /// Reserved markers not present in `tokens` are appended at the
    /// tail, in `SEQUENCE_START`, `SEQUENCE_END`, `UNK` order.
    ///
    /// # Errors
    ///
    /// Returns error if the token list is empty or contains duplicates.
    pub fn from_tokens(tokens: Vec<String>) -> Result<Self> {
        if tokens.is_empty() {
            return Err(ApuntarError::UnsupportedOperation {
                operation: "create_vocabulary".to_string(),
                reason: "Vocabulary cannot be empty".to_string(),
            });
        }

        fn insert(
            token_to_id: &mut HashMap<String, u32>,
            id_to_token: &mut HashMap<u32, String>,
            token: String,
            id: u32,
        ) -> Result<()> {
            if token_to_id.contains_key(&token) {
                return Err(ApuntarError::UnsupportedOperation {
                    operation: "create_vocabulary".to_string(),
                    reason: format!("Duplicate token: {token}"),
                });
            }
            token_to_id.insert(token.clone(), id);
            id_to_token.insert(id, token);
            Ok(())
        }

        let mut token_to_id = HashMap::new();
        let mut id_to_token = HashMap::new();

        let mut next_id = 0u32;
        for token in tokens {
            insert(&mut token_to_id, &mut id_to_token, token, next_id)?;
            next_id += 1;
        }
        for marker in [SEQUENCE_START, SEQUENCE_END, UNK] {
            if !token_to_id.contains_key(marker) {
                insert(&mut token_to_id, &mut id_to_token, marker.to_string(), next_id)?;
                next_id += 1;
            }
        }

        let start_id = token_to_id[SEQUENCE_START];
        let end_id = token_to_id[SEQUENCE_END];
        let unk_id = token_to_id[UNK];

        Ok(Self {
            token_to_id,
            id_to_token,
            start_id,
            end_id,
            unk_id,
        })
    }

    /// Get token ID for a token
    ///
    /// Returns `None` if token not in vocabulary
    #[must_use]
    pub fn get_id(&self, token: &str) -> Option<u32> {
        self.token_to_id.get(token).copied()
    }

    /// Get token ID for a token, or the unknown-token ID
    #[must_use]
    pub fn id_or_unk(&self, token: &str) -> u32 {
        self.get_id(token).unwrap_or(self.unk_id)
    }

    /// Get token for a token ID
    ///
    /// Returns `None` if ID not in vocabulary
    #[must_use]
    pub fn get_token(&self, id: u32) -> Option<&str> {
        self.id_to_token.get(&id).map(String::as_str)
    }

    /// Vocabulary size `V`, reserved markers included
    #[must_use]
    pub fn size(&self) -> usize {
        self.token_to_id.len()
    }

    /// ID of the `SEQUENCE_START` marker
    #[must_use]
    pub fn start_id(&self) -> u32 {
        self.start_id
    }

    /// ID of the `SEQUENCE_END` marker
    #[must_use]
    pub fn end_id(&self) -> u32 {
        self.end_id
    }

    /// ID of the `UNK` marker
    #[must_use]
    pub fn unk_id(&self) -> u32 {
        self.unk_id
    }
}

/// Ordered out-of-vocabulary tokens of one example
///
/// Tokens appear in first-occurrence order; position `i` corresponds to
/// extended id `vocab_size + i`. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OovList {
    tokens: Vec<String>,
}

impl OovList {
    /// Build from pre-deduplicated tokens (first-occurrence order)
    #[must_use]
    pub fn from_tokens(tokens: Vec<String>) -> Self {
        Self { tokens }
    }

    /// Token at OOV position `idx`, if in range
    #[must_use]
    pub fn get(&self, idx: usize) -> Option<&str> {
        self.tokens.get(idx).map(String::as_str)
    }

    /// Number of OOV tokens
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Whether the example had no OOV tokens
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Iterate over the OOV tokens in order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.tokens.iter().map(String::as_str)
    }
}

/// One example's source tokens encoded against a vocabulary
///
/// `ids` holds base ids with OOV positions collapsed to `UNK`;
/// `extended_ids` is the source-id map used by the scatter step, with
/// OOV positions pointing into the extended range `V + oov_index`.
#[derive(Debug, Clone)]
pub struct SourceEncoding {
    /// Base vocabulary ids, OOV positions mapped to the unknown id
    pub ids: Vec<u32>,
    /// Extended ids, OOV positions mapped to `V + oov_index`
    pub extended_ids: Vec<u32>,
    /// This example's OOV registry
    pub oov: OovList,
}

impl SourceEncoding {
    /// Encode source tokens, building the OOV registry in one pass
    ///
    /// Duplicate OOV tokens share one registry slot (and therefore one
    /// extended id), so repeated copies of the same unknown word
    /// accumulate under a single distribution entry.
    #[must_use]
    pub fn encode(vocab: &Vocabulary, source_tokens: &[String]) -> Self {
        let vocab_size = vocab.size() as u32;
        let mut ids = Vec::with_capacity(source_tokens.len());
        let mut extended_ids = Vec::with_capacity(source_tokens.len());
        let mut oov_tokens: Vec<String> = Vec::new();
        let mut oov_index: HashMap<&str, usize> = HashMap::new();

        for token in source_tokens {
            match vocab.get_id(token) {
                Some(id) => {
                    ids.push(id);
                    extended_ids.push(id);
                },
                None => {
                    ids.push(vocab.unk_id());
                    let idx = *oov_index.entry(token.as_str()).or_insert_with(|| {
                        oov_tokens.push(token.clone());
                        oov_tokens.len() - 1
                    });
                    extended_ids.push(vocab_size + idx as u32);
                },
            }
        }

        Self {
            ids,
            extended_ids,
            oov: OovList::from_tokens(oov_tokens),
        }
    }

    /// Source length for this encoding
    #[must_use]
    pub fn len(&self) -> usize {
        self.extended_ids.len()
    }

    /// Whether the source was empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.extended_ids.is_empty()
    }
}

/// Extended vocabulary size for one batch
///
/// `V + max(len(oov[e]))` over the batch; the widest OOV set dictates
/// the padding every example's final distribution is sized to.
#[must_use]
pub fn extended_vocab_size(vocab_size: usize, encodings: &[SourceEncoding]) -> usize {
    let max_oov = encodings.iter().map(|e| e.oov.len()).max().unwrap_or(0);
    vocab_size + max_oov
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_vocab() -> Vocabulary {
        // 7 real tokens + 3 reserved markers appended -> V = 10
        let tokens = ["我", "爱", "中国", "北京", "是", "首都", "的"];
        Vocabulary::from_tokens(tokens.iter().map(ToString::to_string).collect()).unwrap()
    }

    #[test]
    fn test_from_tokens_appends_markers() {
        let vocab = test_vocab();
        assert_eq!(vocab.size(), 10);
        assert_eq!(vocab.get_token(vocab.start_id()), Some(SEQUENCE_START));
        assert_eq!(vocab.get_token(vocab.end_id()), Some(SEQUENCE_END));
        assert_eq!(vocab.get_token(vocab.unk_id()), Some(UNK));
    }

    #[test]
    fn test_from_tokens_keeps_existing_markers() {
        let tokens = vec![UNK.to_string(), "a".to_string()];
        let vocab = Vocabulary::from_tokens(tokens).unwrap();
        assert_eq!(vocab.unk_id(), 0);
        // SEQUENCE_START and SEQUENCE_END appended after "a"
        assert_eq!(vocab.size(), 4);
    }

    #[test]
    fn test_from_tokens_rejects_empty() {
        assert!(Vocabulary::from_tokens(vec![]).is_err());
    }

    #[test]
    fn test_from_tokens_rejects_duplicates() {
        let tokens = vec!["a".to_string(), "a".to_string()];
        assert!(Vocabulary::from_tokens(tokens).is_err());
    }

    #[test]
    fn test_id_or_unk() {
        let vocab = test_vocab();
        assert_eq!(vocab.id_or_unk("我"), 0);
        assert_eq!(vocab.id_or_unk("遵义"), vocab.unk_id());
    }

    #[test]
    fn test_encode_source_in_vocab_only() {
        let vocab = test_vocab();
        let tokens: Vec<String> = ["北京", "是", "首都"].iter().map(ToString::to_string).collect();
        let enc = SourceEncoding::encode(&vocab, &tokens);
        assert_eq!(enc.ids, enc.extended_ids);
        assert!(enc.oov.is_empty());
        assert_eq!(enc.len(), 3);
    }

    #[test]
    fn test_encode_source_assigns_extended_ids() {
        let vocab = test_vocab();
        let tokens: Vec<String> = ["贵州", "的", "遵义"].iter().map(ToString::to_string).collect();
        let enc = SourceEncoding::encode(&vocab, &tokens);

        assert_eq!(enc.oov.len(), 2);
        assert_eq!(enc.oov.get(0), Some("贵州"));
        assert_eq!(enc.oov.get(1), Some("遵义"));
        // V = 10: OOVs get 10 and 11, in-vocab "的" keeps its base id
        assert_eq!(enc.extended_ids, vec![10, vocab.get_id("的").unwrap(), 11]);
        assert_eq!(enc.ids[0], vocab.unk_id());
        assert_eq!(enc.ids[2], vocab.unk_id());
    }

    #[test]
    fn test_encode_source_duplicate_oov_shares_slot() {
        let vocab = test_vocab();
        let tokens: Vec<String> = ["遵义", "的", "遵义"].iter().map(ToString::to_string).collect();
        let enc = SourceEncoding::encode(&vocab, &tokens);

        assert_eq!(enc.oov.len(), 1);
        assert_eq!(enc.extended_ids[0], 10);
        assert_eq!(enc.extended_ids[2], 10);
    }

    #[test]
    fn test_extended_vocab_size_batch_max() {
        let vocab = test_vocab();
        let a = SourceEncoding::encode(
            &vocab,
            &["贵州".to_string(), "遵义".to_string()],
        );
        let b = SourceEncoding::encode(&vocab, &["北京".to_string()]);
        assert_eq!(extended_vocab_size(vocab.size(), &[a, b]), 12);
    }

    #[test]
    fn test_extended_vocab_size_no_oov() {
        let vocab = test_vocab();
        let b = SourceEncoding::encode(&vocab, &["北京".to_string()]);
        assert_eq!(extended_vocab_size(vocab.size(), &[b]), 10);
        assert_eq!(extended_vocab_size(vocab.size(), &[]), 10);
    }
}
