//! Masked sequence loss over extended-vocabulary distributions
//!
//! Consumes the per-step final distributions stacked time-major
//! `[steps, batch, extended_vocab]` together with target ids expressed
//! in extended-vocabulary space, so a copied target points at its OOV
//! extended id rather than at `UNK`. The start marker at target
//! position 0 is excluded: step `t` of example `b` scores target
//! `targets[b][t + 1]` and contributes only while
//! `t < target_len[b] - 1`. Probabilities are clamped to the merge
//! epsilon before the logarithm.

use crate::distribution::EPSILON;
use crate::error::{ApuntarError, Result};
use crate::tensor::Tensor;

/// Per-token losses plus the batch aggregate
#[derive(Debug, Clone)]
pub struct SequenceLoss {
    /// Negative log-likelihood per `[step, example]`; masked steps are 0
    pub losses: Tensor<f32>,
    /// Sum of all unmasked per-token losses
    pub total: f32,
    /// Number of unmasked target tokens, `sum(target_len - 1)`
    pub denom: usize,
    /// `total / denom`
    pub mean: f32,
}

/// Compute masked token-level negative log-likelihood
///
/// # Arguments
///
/// * `final_dists` - stacked distributions, shape `[steps, batch, extended_vocab]`
/// * `targets` - per example, target ids in extended space, start marker included at position 0
/// * `target_lens` - per example, true target length counting the start marker
///
/// # Errors
///
/// Returns `Err` if the stack is not 3-D, the batch dimensions
/// disagree, a target length exceeds what the stack or the target row
/// covers, or a scored target id falls outside the extended vocabulary.
pub fn sequence_loss(
    final_dists: &Tensor<f32>,
    targets: &[Vec<u32>],
    target_lens: &[usize],
) -> Result<SequenceLoss> {
    if final_dists.ndim() != 3 {
        return Err(ApuntarError::InvalidShape {
            reason: format!(
                "expected stacked distributions [steps, batch, vocab], got {}-D",
                final_dists.ndim()
            ),
        });
    }
    let steps = final_dists.shape()[0];
    let batch = final_dists.shape()[1];
    let extended_vocab = final_dists.shape()[2];

    if targets.len() != batch || target_lens.len() != batch {
        return Err(ApuntarError::InvalidShape {
            reason: format!(
                "batch size mismatch: {batch} distributions, {} target rows, {} lengths",
                targets.len(),
                target_lens.len()
            ),
        });
    }

    for (b, (&len, row)) in target_lens.iter().zip(targets.iter()).enumerate() {
        if len > row.len() {
            return Err(ApuntarError::InvalidShape {
                reason: format!(
                    "example {b}: target length {len} exceeds target row of {}",
                    row.len()
                ),
            });
        }
        if len > 0 && len - 1 > steps {
            return Err(ApuntarError::InvalidShape {
                reason: format!(
                    "example {b}: target length {len} needs {} steps, stack has {steps}",
                    len - 1
                ),
            });
        }
    }

    let mut losses = vec![0.0f32; steps * batch];
    let mut total = 0.0f32;
    let mut denom = 0usize;

    for b in 0..batch {
        let scored_steps = target_lens[b].saturating_sub(1);
        denom += scored_steps;
        for t in 0..scored_steps {
            let target = targets[b][t + 1] as usize;
            if target >= extended_vocab {
                return Err(ApuntarError::InvalidShape {
                    reason: format!(
                        "example {b} step {t}: target id {target} outside extended vocab \
                         size {extended_vocab}"
                    ),
                });
            }
            let p = final_dists.at3(t, b, target)?.max(EPSILON);
            let nll = -p.ln();
            losses[t * batch + b] = nll;
            total += nll;
        }
    }

    let mean = if denom == 0 { 0.0 } else { total / denom as f32 };
    Ok(SequenceLoss {
        losses: Tensor::from_vec(vec![steps, batch], losses)?,
        total,
        denom,
        mean,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f32 = 1e-5;

    /// Stack where step t of example b puts probability `p` on id
    /// `target` and spreads the rest uniformly.
    fn stack_peaked(steps: usize, batch: usize, vocab: usize, peak: f32) -> Tensor<f32> {
        let rest = (1.0 - peak) / (vocab - 1) as f32;
        let mut data = Vec::with_capacity(steps * batch * vocab);
        for _ in 0..steps * batch {
            data.push(peak);
            data.extend(std::iter::repeat(rest).take(vocab - 1));
        }
        Tensor::from_vec(vec![steps, batch, vocab], data).unwrap()
    }

    #[test]
    fn test_loss_masking_counts_only_true_steps() {
        // target_len 4 (start marker included) in a 6-step stack:
        // exactly 3 steps score, denominator 3.
        let dists = stack_peaked(6, 1, 5, 0.5);
        let targets = vec![vec![0u32; 7]];
        let loss = sequence_loss(&dists, &targets, &[4]).unwrap();

        assert_eq!(loss.denom, 3);
        let expected_step = -(0.5f32.ln());
        assert!((loss.total - 3.0 * expected_step).abs() < TOL);
        assert!((loss.mean - expected_step).abs() < TOL);
        // steps past the mask contribute nothing
        assert_eq!(loss.losses.row(4).unwrap(), &[0.0]);
        assert_eq!(loss.losses.row(5).unwrap(), &[0.0]);
    }

    #[test]
    fn test_loss_start_marker_excluded() {
        // Step 0 scores targets[1], never targets[0].
        let vocab = 4;
        let mut data = vec![0.0f32; vocab];
        data[2] = 1.0;
        let dists = Tensor::from_vec(vec![1, 1, vocab], data).unwrap();
        // start marker id 0 at position 0, real target 2 at position 1
        let targets = vec![vec![0u32, 2]];
        let loss = sequence_loss(&dists, &targets, &[2]).unwrap();

        assert_eq!(loss.denom, 1);
        assert!(loss.total.abs() < TOL, "p=1 target gives zero loss");
    }

    #[test]
    fn test_loss_mixed_lengths() {
        let dists = stack_peaked(4, 2, 5, 0.5);
        let targets = vec![vec![0u32; 5], vec![0u32; 5]];
        let loss = sequence_loss(&dists, &targets, &[5, 2]).unwrap();

        // example 0 scores 4 steps, example 1 scores 1
        assert_eq!(loss.denom, 5);
        let step_loss = -(0.5f32.ln());
        assert!((loss.total - 5.0 * step_loss).abs() < TOL);
        assert!((loss.mean - step_loss).abs() < TOL);
    }

    #[test]
    fn test_loss_zero_probability_clamped() {
        // An exact zero on the target must hit the epsilon floor, not inf.
        let vocab = 3;
        let data = vec![1.0f32, 0.0, 0.0];
        let dists = Tensor::from_vec(vec![1, 1, vocab], data).unwrap();
        let targets = vec![vec![0u32, 1]];
        let loss = sequence_loss(&dists, &targets, &[2]).unwrap();

        assert!(loss.total.is_finite());
        assert!((loss.total - (-EPSILON.ln())).abs() < 1.0);
    }

    #[test]
    fn test_loss_copied_target_scores_extended_slot() {
        // Extended vocab 6 over base 4: target id 5 is an OOV slot.
        let mut data = vec![0.0f32; 6];
        data[5] = 1.0;
        let dists = Tensor::from_vec(vec![1, 1, 6], data).unwrap();
        let targets = vec![vec![0u32, 5]];
        let loss = sequence_loss(&dists, &targets, &[2]).unwrap();
        assert!(loss.total.abs() < TOL);
    }

    #[test]
    fn test_loss_empty_mask_gives_zero_mean() {
        let dists = stack_peaked(2, 1, 4, 0.5);
        let targets = vec![vec![0u32; 3]];
        let loss = sequence_loss(&dists, &targets, &[1]).unwrap();
        assert_eq!(loss.denom, 0);
        assert_eq!(loss.mean, 0.0);
    }

    #[test]
    fn test_loss_rejects_batch_mismatch() {
        let dists = stack_peaked(2, 2, 4, 0.5);
        let targets = vec![vec![0u32; 3]];
        assert!(sequence_loss(&dists, &targets, &[2]).is_err());
    }

    #[test]
    fn test_loss_rejects_length_beyond_stack() {
        let dists = stack_peaked(2, 1, 4, 0.5);
        let targets = vec![vec![0u32; 6]];
        assert!(sequence_loss(&dists, &targets, &[5]).is_err());
    }

    #[test]
    fn test_loss_rejects_target_outside_vocab() {
        let dists = stack_peaked(2, 1, 4, 0.5);
        let targets = vec![vec![0u32, 9, 0]];
        assert!(sequence_loss(&dists, &targets, &[3]).is_err());
    }
}
