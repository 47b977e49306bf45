// Peak picking on a dB spectrum
//
// Greedy: take the strongest remaining bin, mask `min_separation` bins on
// either side, repeat. Used for the CLI report of strongest emissions.

/// Indices of up to `count` strongest bins, at least `min_separation + 1`
/// bins apart, returned in ascending (frequency) order
pub fn find_peaks(db: &[f64], count: usize, min_separation: usize) -> Vec<usize> {
    let mut used = vec![false; db.len()];
    let mut peaks = Vec::with_capacity(count);

    for _ in 0..count {
        let best = db
            .iter()
            .enumerate()
            .filter(|(i, v)| !used[*i] && v.is_finite())
            .max_by(|a, b| a.1.total_cmp(b.1).then(b.0.cmp(&a.0)));
        let Some((i, _)) = best else {
            break;
        };

        peaks.push(i);
        let lo = i.saturating_sub(min_separation);
        let hi = (i + min_separation + 1).min(db.len());
        used[lo..hi].iter_mut().for_each(|u| *u = true);
    }

    peaks.sort_unstable();
    peaks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peaks_respect_separation() {
        let mut db = vec![-100.0; 64];
        db[10] = -20.0;
        db[12] = -25.0; // masked by the peak at 10
        db[40] = -30.0;
        db[60] = -50.0;
        assert_eq!(find_peaks(&db, 3, 4), vec![10, 40, 60]);
    }

    #[test]
    fn test_peaks_sorted_by_frequency() {
        let db = vec![-10.0, -90.0, -90.0, -90.0, -5.0];
        assert_eq!(find_peaks(&db, 2, 1), vec![0, 4]);
    }

    #[test]
    fn test_fewer_candidates_than_requested() {
        let db = vec![-40.0; 5];
        // First pick masks everything
        assert_eq!(find_peaks(&db, 5, 8), vec![0]);
        assert!(find_peaks(&[], 3, 1).is_empty());
    }
}
