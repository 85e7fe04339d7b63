//! Decode post-processing: truncation, UNK replacement, beam assembly
//!
//! Runs once per example after all decode steps are available. Each
//! beam candidate is truncated at the first `SEQUENCE_END`, optionally
//! has its `UNK` tokens replaced by the source token with the highest
//! attention weight (or its mapped translation), is joined with the
//! configured delimiter, and optionally passed through a registered
//! text transform. The assembled text block and the cropped attention
//! records go to the buffered emitter.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::config::{load_unk_mapping, DecodeConfig};
use crate::emitter::BufferedEmitter;
use crate::error::{ApuntarError, Result};
use crate::stats::{DecodeStats, StatsSnapshot};
use crate::tensor::Tensor;
use crate::vocab::{SEQUENCE_END, UNK};

/// A text transform applied to each joined candidate line
pub type PostprocFn = fn(&str) -> String;

fn postproc_strip(text: &str) -> String {
    text.trim().to_string()
}

fn postproc_remove_spaces(text: &str) -> String {
    text.split_whitespace().collect()
}

/// Named registry of post-processing transforms
///
/// Transforms are selected by configuration key and resolved once at
/// pipeline construction; an unknown key is a configuration error, not
/// a per-call lookup failure.
#[derive(Debug, Clone)]
pub struct PostprocRegistry {
    transforms: HashMap<&'static str, PostprocFn>,
}

impl Default for PostprocRegistry {
    fn default() -> Self {
        let mut transforms: HashMap<&'static str, PostprocFn> = HashMap::new();
        transforms.insert("strip", postproc_strip);
        transforms.insert("remove_spaces", postproc_remove_spaces);
        Self { transforms }
    }
}

impl PostprocRegistry {
    /// Create the registry with the built-in transforms
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an additional transform under `name`
    pub fn register(&mut self, name: &'static str, transform: PostprocFn) {
        self.transforms.insert(name, transform);
    }

    /// Resolve a configured identifier; empty means no transform
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if the identifier is not registered.
    pub fn resolve(&self, name: &str) -> Result<Option<PostprocFn>> {
        if name.is_empty() {
            return Ok(None);
        }
        self.transforms.get(name).copied().map(Some).ok_or_else(|| {
            ApuntarError::InvalidConfiguration {
                reason: format!("postproc_fn not found: {name}"),
            }
        })
    }
}

/// One ranked output sequence of an example
///
/// Tokens have already been through the resolver (copy reversal
/// applied). The attention matrix is `[steps, source_width]` for this
/// beam; it is required when UNK replacement or the attention dump is
/// enabled, otherwise optional.
#[derive(Debug, Clone)]
pub struct BeamCandidate {
    /// Resolved surface tokens, in emission order
    pub tokens: Vec<String>,
    /// Cumulative score assigned by the search
    pub score: f32,
    /// Per-step attention over source positions
    pub attention: Option<Tensor<f32>>,
}

/// One example's decoded beams ready for post-processing
#[derive(Debug, Clone)]
pub struct DecodedExample {
    /// Source tokens, padded; `source_len` marks the true extent
    pub source_tokens: Vec<String>,
    /// True source length (including the trailing end marker)
    pub source_len: usize,
    /// Beam candidates in rank order (at least one)
    pub beams: Vec<BeamCandidate>,
}

/// Attention-dump record for one beam candidate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttentionRecord {
    /// Source tokens up to (excluding) the end marker
    pub source_tokens: Vec<String>,
    /// Final predicted tokens of this candidate
    pub pred_tokens: Vec<String>,
    /// Attention matrix cropped to `[pred_len, source_len]`
    pub attn_score: Tensor<f32>,
}

/// Post-processed output of one example
#[derive(Debug, Clone)]
pub struct ExampleOutput {
    /// `source_line\n<candidate lines>\n\n`
    pub text_block: String,
    /// One record per beam, present when dumping is enabled
    pub attn_records: Vec<AttentionRecord>,
}

/// Truncate a resolved sequence at the first end marker, inclusive
///
/// Returns the whole sequence when no marker is present.
#[must_use]
pub fn truncate_at_end(tokens: &[String]) -> &[String] {
    match tokens.iter().position(|t| t == SEQUENCE_END) {
        Some(pos) => &tokens[..=pos],
        None => tokens,
    }
}

/// Per-example post-processor
///
/// Holds the decode-time options resolved at construction: delimiter,
/// UNK replacement mode and mapping table, the optional text transform,
/// and whether attention records are assembled.
#[derive(Debug)]
pub struct PostProcessor {
    delimiter: String,
    unk_replace: bool,
    unk_mapping: Option<HashMap<String, String>>,
    postproc: Option<PostprocFn>,
    dump_attn: bool,
    stats: DecodeStats,
}

impl PostProcessor {
    /// Build a post-processor from a validated configuration
    ///
    /// Loads the UNK mapping table and resolves the post-processing
    /// transform eagerly, so a bad path or identifier fails here,
    /// before any batch runs.
    ///
    /// # Errors
    ///
    /// Returns `Err` on an invalid configuration, an unreadable or
    /// malformed mapping file, or an unknown transform identifier.
    pub fn from_config(
        config: &DecodeConfig,
        registry: &PostprocRegistry,
        stats: DecodeStats,
    ) -> Result<Self> {
        config.validate()?;

        let unk_mapping = match &config.unk_mapping {
            Some(path) => Some(load_unk_mapping(path)?),
            None => None,
        };
        let postproc = registry.resolve(&config.postproc_fn)?;

        Ok(Self {
            delimiter: config.delimiter.clone(),
            unk_replace: config.unk_replace,
            unk_mapping,
            postproc,
            dump_attn: config.dump_attn_scores,
            stats,
        })
    }

    /// Replace UNK tokens from the source, guided by attention
    ///
    /// For each UNK position the source position with maximum attention
    /// inside `[0, window)` is chosen; the window excludes the source's
    /// trailing end marker so an UNK is never replaced by
    /// `SEQUENCE_END`. A zero-width window leaves the token untouched.
    fn replace_unks(
        &self,
        source_tokens: &[String],
        tokens: &[String],
        attention: &Tensor<f32>,
        window: usize,
    ) -> Result<Vec<String>> {
        let mut result = Vec::with_capacity(tokens.len());
        for (step, token) in tokens.iter().enumerate() {
            if token != UNK || window == 0 {
                result.push(token.clone());
                continue;
            }
            let scores = attention.row(step)?;
            let width = window.min(scores.len()).min(source_tokens.len());
            let best = scores[..width]
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
                .map(|(idx, _)| idx);

            match best {
                Some(idx) => {
                    let chosen = &source_tokens[idx];
                    let replacement = self
                        .unk_mapping
                        .as_ref()
                        .and_then(|m| m.get(chosen))
                        .unwrap_or(chosen);
                    self.stats.record_unk_replacement();
                    result.push(replacement.clone());
                },
                None => result.push(token.clone()),
            }
        }
        Ok(result)
    }

    /// Post-process one example into its output block
    ///
    /// # Errors
    ///
    /// Returns `Err` if the example has no beams, or UNK replacement /
    /// the attention dump is enabled but a beam carries no attention
    /// matrix.
    pub fn process(&self, example: &DecodedExample) -> Result<ExampleOutput> {
        if example.beams.is_empty() {
            return Err(ApuntarError::InvalidShape {
                reason: "example has no beam candidates".to_string(),
            });
        }

        // Source line, stripped of padding and the trailing end marker.
        let actual_source: Vec<&str> = example.source_tokens
            [..example.source_len.min(example.source_tokens.len())]
            .iter()
            .map(String::as_str)
            .take_while(|&t| t != SEQUENCE_END)
            .collect();
        let source_line = actual_source.join(self.delimiter.as_str());

        let unk_window = example.source_len.saturating_sub(1);

        let mut candidate_lines = Vec::with_capacity(example.beams.len());
        let mut attn_records = Vec::new();

        for beam in &example.beams {
            let truncated = truncate_at_end(&beam.tokens);
            // The end marker is kept by truncation but never printed.
            let visible = match truncated.last() {
                Some(last) if last == SEQUENCE_END => &truncated[..truncated.len() - 1],
                _ => truncated,
            };

            let needs_attention = self.unk_replace || self.dump_attn;
            if needs_attention && beam.attention.is_none() && !visible.is_empty() {
                return Err(ApuntarError::UnsupportedOperation {
                    operation: "postprocess_beam".to_string(),
                    reason: "UNK replacement or attention dump enabled but the beam \
                             carries no attention matrix"
                        .to_string(),
                });
            }

            let pred_tokens = if self.unk_replace && !visible.is_empty() {
                let attention = beam.attention.as_ref().ok_or_else(|| {
                    ApuntarError::UnsupportedOperation {
                        operation: "postprocess_beam".to_string(),
                        reason: "missing attention matrix".to_string(),
                    }
                })?;
                self.replace_unks(
                    &example.source_tokens,
                    visible,
                    attention,
                    unk_window,
                )?
            } else {
                visible.to_vec()
            };

            let mut line = pred_tokens.join(self.delimiter.as_str());
            if let Some(transform) = self.postproc {
                line = transform(&line);
            }
            let line = line.trim().to_string();

            if self.dump_attn && !pred_tokens.is_empty() && !actual_source.is_empty() {
                let attention = beam.attention.as_ref().ok_or_else(|| {
                    ApuntarError::UnsupportedOperation {
                        operation: "dump_attention".to_string(),
                        reason: "missing attention matrix".to_string(),
                    }
                })?;
                attn_records.push(AttentionRecord {
                    source_tokens: actual_source.iter().map(ToString::to_string).collect(),
                    pred_tokens: pred_tokens.clone(),
                    attn_score: attention.crop(pred_tokens.len(), actual_source.len())?,
                });
            }

            candidate_lines.push(line);
        }

        let text_block = format!("{source_line}\n{}\n\n", candidate_lines.join("\n"));
        Ok(ExampleOutput {
            text_block,
            attn_records,
        })
    }
}

/// Front of the inference pipeline: post-processor plus emitter
///
/// Mirrors the lifecycle of the original decode task: construction
/// resolves and validates everything (fail fast), `process` handles one
/// example, `finish` performs the final flush exactly once.
#[derive(Debug)]
pub struct DecodeText {
    postprocessor: PostProcessor,
    emitter: BufferedEmitter,
    stats: DecodeStats,
}

impl DecodeText {
    /// Build the pipeline from a configuration and transform registry
    ///
    /// # Errors
    ///
    /// Returns `Err` on any configuration inconsistency, unreadable
    /// mapping file, unknown transform, or uncreatable attention
    /// directory.
    pub fn new(config: &DecodeConfig, registry: &PostprocRegistry) -> Result<Self> {
        let stats = DecodeStats::new();
        let postprocessor = PostProcessor::from_config(config, registry, stats.clone())?;
        let emitter = BufferedEmitter::new(config, stats.clone())?;
        Ok(Self {
            postprocessor,
            emitter,
            stats,
        })
    }

    /// Post-process one example and hand it to the emitter
    ///
    /// # Errors
    ///
    /// Returns `Err` on post-processing contract violations or a failed
    /// periodic flush.
    pub fn process(&mut self, example: &DecodedExample) -> Result<()> {
        let output = self.postprocessor.process(example)?;
        self.emitter.emit(output)
    }

    /// Flush the remainder and close the run
    ///
    /// # Errors
    ///
    /// Returns `Err` if the final flush fails; handles are released
    /// either way.
    pub fn finish(&mut self) -> Result<StatsSnapshot> {
        self.emitter.finish()?;
        Ok(self.stats.snapshot())
    }

    /// Counters for this run
    #[must_use]
    pub fn stats(&self) -> &DecodeStats {
        &self.stats
    }
}
