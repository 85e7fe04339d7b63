//! Extended-distribution builder for the pointer-generator merge
//!
//! Per decode step and example, the generation distribution (length
//! `V`) and the attention distribution (over source positions) live in
//! different index spaces. This module merges them into one
//! distribution over the extended vocabulary: the generation side is
//! scaled by `p_gen` and zero-padded past `V`, the attention side is
//! scaled by `1 - p_gen` and scatter-added through the source-id map.
//! Two source positions carrying the same extended id (a repeated
//! in-vocabulary word, or a repeated OOV word sharing one registry
//! slot) must have their attention mass summed, never overwritten.

use crate::error::{ApuntarError, Result};

/// Floor added to every entry of a merged distribution
///
/// Guards downstream `ln()` against exact zeros. Far below any true
/// probability, so mass-conservation checks see
/// `1 + extended_vocab_size * EPSILON`.
pub const EPSILON: f32 = 1e-12;

fn validate_step(
    p_gen: f32,
    generation_dist: &[f32],
    attention_weights: &[f32],
    source_id_map: &[u32],
    source_len: usize,
    extended_vocab_size: usize,
) -> Result<()> {
    if source_len == 0 {
        return Err(ApuntarError::InvalidShape {
            reason: "source length cannot be zero".to_string(),
        });
    }
    if !(0.0..=1.0).contains(&p_gen) {
        return Err(ApuntarError::InvalidShape {
            reason: format!("p_gen must be in [0, 1], got {p_gen}"),
        });
    }
    if generation_dist.is_empty() {
        return Err(ApuntarError::InvalidShape {
            reason: "generation distribution cannot be empty".to_string(),
        });
    }
    if extended_vocab_size < generation_dist.len() {
        return Err(ApuntarError::InvalidShape {
            reason: format!(
                "extended vocab size {extended_vocab_size} smaller than vocab size {}",
                generation_dist.len()
            ),
        });
    }
    if attention_weights.len() < source_len {
        return Err(ApuntarError::InvalidShape {
            reason: format!(
                "attention weights cover {} positions, source length is {source_len}",
                attention_weights.len()
            ),
        });
    }
    if source_id_map.len() < source_len {
        return Err(ApuntarError::InvalidShape {
            reason: format!(
                "source id map covers {} positions, source length is {source_len}",
                source_id_map.len()
            ),
        });
    }
    if let Some(&bad) = source_id_map[..source_len]
        .iter()
        .find(|&&id| id as usize >= extended_vocab_size)
    {
        return Err(ApuntarError::InvalidShape {
            reason: format!("source id {bad} outside extended vocab size {extended_vocab_size}"),
        });
    }
    Ok(())
}

/// Scatter-add scaled attention mass into extended-vocabulary space
///
/// Only positions `0..source_len` contribute; batch padding past the
/// true source length never receives mass. Duplicate extended ids
/// accumulate by summation.
///
/// # Errors
///
/// Returns `Err` on any step-contract violation (zero source length,
/// `p_gen` outside `[0, 1]`, extended size below `V`, short attention
/// or id-map slices, id outside the extended range).
pub fn scatter_attention(
    p_gen: f32,
    generation_dist: &[f32],
    attention_weights: &[f32],
    source_id_map: &[u32],
    source_len: usize,
    extended_vocab_size: usize,
) -> Result<Vec<f32>> {
    validate_step(
        p_gen,
        generation_dist,
        attention_weights,
        source_id_map,
        source_len,
        extended_vocab_size,
    )?;

    let copy_weight = 1.0 - p_gen;
    let mut projected = vec![0.0f32; extended_vocab_size];
    for pos in 0..source_len {
        projected[source_id_map[pos] as usize] += copy_weight * attention_weights[pos];
    }
    Ok(projected)
}

/// Merge one step's generation and attention distributions
///
/// Implements the pointer-generator merge for a single decode step of
/// a single example:
///
/// 1. scale generation by `p_gen`, attention by `1 - p_gen`
/// 2. zero-extend the generation side to `extended_vocab_size`
/// 3. scatter-add the attention side through `source_id_map`
/// 4. sum, then add [`EPSILON`] to every entry
///
/// # Errors
///
/// Returns `Err` on any step-contract violation; see
/// [`scatter_attention`].
pub fn merge_step(
    p_gen: f32,
    generation_dist: &[f32],
    attention_weights: &[f32],
    source_id_map: &[u32],
    source_len: usize,
    extended_vocab_size: usize,
) -> Result<Vec<f32>> {
    let mut final_dist = scatter_attention(
        p_gen,
        generation_dist,
        attention_weights,
        source_id_map,
        source_len,
        extended_vocab_size,
    )?;

    for (slot, &p) in final_dist.iter_mut().zip(generation_dist.iter()) {
        *slot += p_gen * p;
    }
    for slot in &mut final_dist {
        *slot += EPSILON;
    }
    Ok(final_dist)
}
