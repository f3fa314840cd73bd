//! Small numeric helpers shared by the store, the probes and the classifier.

/// Index of the `rank` percentile in a sorted slice of `count` values:
/// `floor(rank * count)` clamped to `[0, count - 1]`.
pub fn percentile_index(rank: f64, count: usize) -> usize {
    if count == 0 {
        return 0;
    }
    let idx = (rank * count as f64).floor();
    if idx <= 0.0 {
        0
    } else {
        (idx as usize).min(count - 1)
    }
}

/// Percentile of an already sorted slice; `0.0` when empty.
pub fn percentile(sorted: &[f64], rank: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    sorted[percentile_index(rank, sorted.len())]
}

/// Returns a sorted copy of `values` using a total order over floats.
pub fn sorted_copy(values: impl IntoIterator<Item = f64>) -> Vec<f64> {
    let mut out: Vec<f64> = values.into_iter().collect();
    out.sort_by(f64::total_cmp);
    out
}

/// Median of a short list (≤ 16 CHG trials), sorting it in place with a
/// selection sort. Odd count: middle element. Even count: mean of the two
/// middle elements. Empty: `0.0`.
pub fn selection_median(values: &mut [f64]) -> f64 {
    let n = values.len();
    if n == 0 {
        return 0.0;
    }
    for i in 0..n {
        let mut min = i;
        for j in (i + 1)..n {
            if values[j] < values[min] {
                min = j;
            }
        }
        values.swap(i, min);
    }
    if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    }
}

/// Median of an already sorted slice with the same odd/even rule.
pub fn sorted_median(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    match n {
        0 => 0.0,
        _ if n % 2 == 1 => sorted[n / 2],
        _ => (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0,
    }
}

/// `part / total * 100`, or `0.0` for an empty total.
pub fn pct(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 * 100.0 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_index_clamps() {
        assert_eq!(percentile_index(0.5, 0), 0);
        assert_eq!(percentile_index(0.5, 1), 0);
        assert_eq!(percentile_index(0.99, 1), 0);
        assert_eq!(percentile_index(0.5, 4), 2);
        assert_eq!(percentile_index(0.95, 10), 9);
        assert_eq!(percentile_index(0.99, 100), 99);
        assert_eq!(percentile_index(0.95, 100), 95);
    }

    #[test]
    fn percentile_on_sorted_values() {
        let sorted: Vec<f64> = (1..=20).map(f64::from).collect();
        assert_eq!(percentile(&sorted, 0.5), 11.0);
        assert_eq!(percentile(&sorted, 0.95), 20.0);
        assert_eq!(percentile(&[], 0.95), 0.0);
    }

    #[test]
    fn selection_median_odd_and_even() {
        let mut odd = [5.0, 1.0, 3.0];
        assert_eq!(selection_median(&mut odd), 3.0);
        assert_eq!(odd, [1.0, 3.0, 5.0]);

        let mut even = [8.0, 2.0, 4.0, 6.0];
        assert_eq!(selection_median(&mut even), 5.0);

        assert_eq!(selection_median(&mut []), 0.0);
        assert_eq!(selection_median(&mut [42.0]), 42.0);
    }

    #[test]
    fn sorted_median_matches_selection_median() {
        let mut values = [9.5, 0.25, 3.0, 7.75, 1.5, 6.0];
        let sorted = sorted_copy(values);
        assert_eq!(sorted_median(&sorted), selection_median(&mut values));
    }

    #[test]
    fn pct_handles_zero_total() {
        assert_eq!(pct(0, 0), 0.0);
        assert_eq!(pct(1, 4), 25.0);
    }
}
