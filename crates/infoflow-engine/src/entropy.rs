//! Discrete transfer entropy with history length 1.
//!
//! For binary series `x` (source) and `y` (target) of length `n`:
//!
//! ```text
//! TE(x -> y) = sum p(y[t+1], y[t], x[t]) * log2( p(y[t+1] | y[t], x[t]) / p(y[t+1] | y[t]) )
//! ```
//!
//! estimated from plug-in frequencies over the `n - 1` transitions
//! `t = 0..n-2`. The result is in bits.

use crate::error::{FlowError, FlowResult};

/// Transfer entropy from `source` to `target`.
///
/// Series shorter than 2 points carry no transitions and yield 0. Any nonzero
/// value counts as an active bucket.
pub fn transfer_entropy(source: &[u8], target: &[u8]) -> FlowResult<f64> {
    if source.len() != target.len() {
        return Err(FlowError::SeriesLengthMismatch {
            source_len: source.len(),
            target_len: target.len(),
        });
    }
    let n = target.len();
    if n < 2 {
        return Ok(0.0);
    }

    // Index bits: future << 2 | history << 1 | source.
    let mut joint = [0u64; 8];
    for t in 0..n - 1 {
        let future = usize::from(target[t + 1] != 0);
        let history = usize::from(target[t] != 0);
        let src = usize::from(source[t] != 0);
        joint[future << 2 | history << 1 | src] += 1;
    }

    let mut hist = [0u64; 2];
    let mut hist_src = [0u64; 4];
    let mut future_hist = [0u64; 4];
    for (idx, &count) in joint.iter().enumerate() {
        let (future, history, src) = (idx >> 2 & 1, idx >> 1 & 1, idx & 1);
        hist[history] += count;
        hist_src[history << 1 | src] += count;
        future_hist[future << 1 | history] += count;
    }

    let transitions = (n - 1) as f64;
    let mut te = 0.0;
    for (idx, &count) in joint.iter().enumerate() {
        if count == 0 {
            continue;
        }
        let (future, history, src) = (idx >> 2 & 1, idx >> 1 & 1, idx & 1);
        let numerator = count as f64 * hist[history] as f64;
        let denominator = hist_src[history << 1 | src] as f64 * future_hist[future << 1 | history] as f64;
        te += count as f64 / transitions * (numerator / denominator).log2();
    }

    Ok(te.max(0.0))
}
