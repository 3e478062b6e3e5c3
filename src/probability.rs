use anyhow::{Context, Result, bail};
use rand::{
    Rng,
    distributions::{Distribution, WeightedIndex},
};

/// Largest deviation from 1 a distribution may have and still be sampled from.
/// This is sqrt(f64::EPSILON), the same tolerance numpy's `random.choice` applies to `p`.
const SUM_TOLERANCE: f64 = 1.4901161193847656e-8;

fn round_to_thousandths(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Rescales a raw character distribution so it can be sampled from.
///
/// Each entry is divided by the total and rounded to three decimals. The rounding error is
/// then pushed into a single entry so the vector sums to one:
///
/// - if the entries before the last sum to at most one, the last entry (the padding
///   character) becomes whatever remains;
/// - otherwise the overshoot is subtracted from the first entry, in order, that is larger
///   than it.
///
/// The second branch leaves the last entry at its rounded value, so the result sums to
/// `1 + last` and only reaches one when the last entry rounded to zero. When no entry is
/// large enough to absorb the overshoot the rounded vector is returned as is. In both cases
/// [`sample_index`] rejects the result.
pub fn create_relative_probabilities(char_dist: &[f64]) -> Vec<f64> {
    let total: f64 = char_dist.iter().sum();
    let mut proportions: Vec<f64> = char_dist
        .iter()
        .map(|value| round_to_thousandths(value / total))
        .collect();
    if proportions.is_empty() {
        return proportions;
    }

    let last = proportions.len() - 1;
    let difference = 1.0 - proportions[..last].iter().sum::<f64>();
    if difference >= 0.0 {
        proportions[last] = difference;
    } else if let Some(absorber) = proportions
        .iter_mut()
        .find(|proportion| **proportion > difference.abs())
    {
        *absorber += difference;
    }
    proportions
}

/// Draws one index from `probabilities`. The weights must already sum to one.
pub fn sample_index<R: Rng + ?Sized>(probabilities: &[f64], rng: &mut R) -> Result<usize> {
    let total: f64 = probabilities.iter().sum();
    if !((total - 1.0).abs() <= SUM_TOLERANCE) {
        bail!("probabilities do not sum to 1 (sum = {})", total);
    }
    let distribution = WeightedIndex::new(probabilities)
        .with_context(|| format!("invalid probability vector: {:?}", probabilities))?;
    Ok(distribution.sample(rng))
}
