// Noise floor estimate: trailing percentile of recent bins, in dB
//
// The metric engine takes the floor as an input; this is the estimator the
// coordinator uses to produce it.

use crate::spectrum::wideband::{power_to_db, DB_FLOOR};

/// Percentile of the linear-power bins, returned in dB
///
/// # Arguments
/// * `powers` - linear power, any order
/// * `percentile` - in [0, 1]; 0.2 picks the 20th percentile
///
/// # Returns
/// Power in dB at the nearest-rank percentile, or `DB_FLOOR` when there is
/// no finite bin to rank
pub fn percentile_db(powers: &[f64], percentile: f64) -> f64 {
    let mut sorted: Vec<f64> = powers.iter().copied().filter(|p| p.is_finite()).collect();
    if sorted.is_empty() {
        return DB_FLOOR;
    }
    sorted.sort_by(f64::total_cmp);

    let p = percentile.clamp(0.0, 1.0);
    let index = (p * (sorted.len() - 1) as f64).round() as usize;
    power_to_db(sorted[index])
}
