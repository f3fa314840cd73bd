use backhaul_monitor::stats::{percentile_index, selection_median};
use proptest::prelude::*;

fn reference_median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

proptest! {
    #[test]
    fn selection_median_matches_sort(values in prop::collection::vec(-1.0e6f64..1.0e6, 1..=16)) {
        let expected = reference_median(&values);
        let mut scratch = values.clone();
        prop_assert_eq!(selection_median(&mut scratch), expected);
    }

    #[test]
    fn percentile_index_in_bounds(rank in 0.0f64..=1.0, count in 1usize..1000) {
        prop_assert!(percentile_index(rank, count) < count);
    }
}
