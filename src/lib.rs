//! # Apuntar
//!
//! Pointer-generator copy-distribution engine for sequence decoding.
//!
//! Apuntar (Spanish: "to point") implements the parts of a
//! pointer-generator decoder where correctness actually lives: merging
//! a fixed-vocabulary generation distribution with an attention (copy)
//! distribution defined over a different index space, reconciling
//! per-example out-of-vocabulary token sets inside one batch, mapping
//! emitted extended ids back to surface text, attention-guided UNK
//! replacement, and resilient buffered output writing during
//! long-running batch decoding.
//!
//! The sequence model itself (encoder/decoder network, embeddings,
//! beam-search expansion, training loop) is an external collaborator:
//! its per-step outputs — generation distribution, attention weights,
//! gate value — are inputs here, never computed here.
//!
//! ## Example
//!
//! ```rust
//! use apuntar::{extended_vocab_size, merge_step, SourceEncoding, Vocabulary};
//!
//! let vocab = Vocabulary::from_tokens(vec![
//!     "the".to_string(),
//!     "capital".to_string(),
//! ]).unwrap();
//!
//! // "guizhou" is out of vocabulary and gets extended id V + 0
//! let source: Vec<String> = ["the", "guizhou"]
//!     .iter().map(ToString::to_string).collect();
//! let encoding = SourceEncoding::encode(&vocab, &source);
//! assert_eq!(encoding.oov.get(0), Some("guizhou"));
//!
//! let v = vocab.size();
//! let extended = extended_vocab_size(v, std::slice::from_ref(&encoding));
//!
//! // one decode step: 70% generate, 30% copy
//! let generation = vec![1.0 / v as f32; v];
//! let attention = vec![0.4, 0.6];
//! let dist = merge_step(
//!     0.7, &generation, &attention, &encoding.extended_ids, 2, extended,
//! ).unwrap();
//! assert_eq!(dist.len(), extended);
//! ```
//!
//! ## Pipeline
//!
//! Training/scoring: `vocab` → `distribution` → `loss`.
//! Inference: `vocab` → `resolve` → `decode` → `emitter`.

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_precision_loss)] // usize -> f32 for probability math
#![allow(clippy::cast_possible_truncation)] // OOV indices are far below u32::MAX
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::float_cmp)] // exact comparisons in tests

/// Decode configuration surface and UNK-mapping loader
pub mod config;
/// Truncation, UNK replacement, beam assembly, pipeline front
pub mod decode;
/// Pointer-generator merge into extended-vocabulary space
pub mod distribution;
/// Buffered append-mode output emission
pub mod emitter;
pub mod error;
/// Masked sequence loss over stacked distributions
pub mod loss;
/// Extended-id to surface-token resolution (copy reversal)
pub mod resolve;
/// Decode-run counters
pub mod stats;
pub mod tensor;
/// Vocabulary and per-example OOV registry
pub mod vocab;

pub use config::{load_unk_mapping, DecodeConfig};
pub use decode::{
    truncate_at_end, AttentionRecord, BeamCandidate, DecodeText, DecodedExample, ExampleOutput,
    PostProcessor, PostprocFn, PostprocRegistry,
};
pub use distribution::{merge_step, scatter_attention, EPSILON};
pub use emitter::BufferedEmitter;
pub use error::{ApuntarError, Result};
pub use loss::{sequence_loss, SequenceLoss};
pub use resolve::Resolver;
pub use stats::{DecodeStats, StatsSnapshot};
pub use tensor::Tensor;
pub use vocab::{
    extended_vocab_size, OovList, SourceEncoding, Vocabulary, SEQUENCE_END, SEQUENCE_START, UNK,
};
