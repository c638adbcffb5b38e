use std::collections::BTreeMap;

/// Free-form key/value data attached to metric samples and audit entries.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Nearest-rank percentile of `sorted`, which must be in ascending order.
///
/// The rank is `ceil(percentile / 100 * n) - 1`, clamped to the bounds of the slice. Returns
/// `None` for an empty slice.
pub(crate) fn nearest_rank(sorted: &[f64], percentile: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let n = sorted.len();
    let rank = (percentile / 100.0 * n as f64).ceil() as i64 - 1;
    let index = rank.clamp(0, n as i64 - 1) as usize;
    Some(sorted[index])
}

#[cfg(test)]
mod tests {
    use super::*;
    use spectral::prelude::*;
    use test_case::test_case;

    #[test_case(50.0, 50.0)]
    #[test_case(95.0, 95.0)]
    #[test_case(99.0, 99.0)]
    #[test_case(100.0, 100.0)]
    #[test_case(0.0, 1.0)]
    fn percentiles_of_one_to_hundred(percentile: f64, expected: f64) {
        let durations: Vec<f64> = (1..=100).map(f64::from).collect();
        assert_that!(nearest_rank(&durations, percentile)).contains_value(expected);
    }

    #[test]
    fn small_sets_clamp_to_bounds() {
        assert_that!(nearest_rank(&[7.0], 99.0)).contains_value(7.0);
        assert_that!(nearest_rank(&[1.0, 2.0, 3.0], 50.0)).contains_value(2.0);
        assert_that!(nearest_rank(&[1.0, 2.0, 3.0], 150.0)).contains_value(3.0);
        assert_that!(nearest_rank(&[], 50.0)).is_none();
    }
}
