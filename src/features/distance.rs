//! Bounded squared-Euclidean distance for float descriptors.

use crate::features::base::FeatureError;

/// Squared Euclidean distance between two descriptors, giving up early once
/// the running sum exceeds `bound`.
///
/// Values are accumulated four at a time. When the sum passes `bound` after
/// a chunk the partial sum is returned; it is always greater than `bound` but
/// is not the full distance, so callers may only read it as "not better than
/// `bound`". Pass `f64::INFINITY` for the exact distance.
pub fn distance(a: &[f32], b: &[f32], bound: f64) -> Result<f64, FeatureError> {
    if a.len() != b.len() {
        return Err(FeatureError::InvalidInput(format!(
            "descriptor lengths differ: {} vs {}",
            a.len(),
            b.len()
        )));
    }
    if a.len() % 4 != 0 {
        return Err(FeatureError::InvalidInput(format!(
            "descriptor length {} is not a multiple of 4",
            a.len()
        )));
    }
    Ok(bounded_distance(a, b, bound))
}

/// Unchecked variant of [`distance`] for callers that validated lengths once
/// per match call.
#[inline]
pub(crate) fn bounded_distance(a: &[f32], b: &[f32], bound: f64) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    let mut total = 0.0f64;
    for (x, y) in a.chunks_exact(4).zip(b.chunks_exact(4)) {
        let t0 = (x[0] - y[0]) as f64;
        let t1 = (x[1] - y[1]) as f64;
        let t2 = (x[2] - y[2]) as f64;
        let t3 = (x[3] - y[3]) as f64;
        total += t0 * t0 + t1 * t1 + t2 * t2 + t3 * t3;
        if total > bound {
            break;
        }
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(len: usize, seed: f32) -> Vec<f32> {
        (0..len).map(|i| ((i as f32 + seed) * 0.37).sin()).collect()
    }

    #[test]
    fn test_identity_and_symmetry() {
        let a = pattern(64, 1.0);
        let b = pattern(64, 7.0);

        assert_eq!(distance(&a, &a, f64::INFINITY).unwrap(), 0.0);
        assert_eq!(
            distance(&a, &b, f64::INFINITY).unwrap(),
            distance(&b, &a, f64::INFINITY).unwrap()
        );
    }

    #[test]
    fn test_known_value() {
        let a = [0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0];
        let b = [1.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 3.0];
        assert_eq!(distance(&a, &b, f64::INFINITY).unwrap(), 5.0);
    }

    #[test]
    fn test_early_exit_stays_above_bound() {
        let a = pattern(128, 0.0);
        let b = pattern(128, 11.0);
        let exact = distance(&a, &b, f64::INFINITY).unwrap();
        assert!(exact > 0.0);

        for fraction in [0.0, 0.1, 0.25, 0.5, 0.9] {
            let bound = exact * fraction;
            let bounded = distance(&a, &b, bound).unwrap();
            assert!(bounded > bound, "bound {bound} gave {bounded}");
            assert!(bounded <= exact);
        }
    }

    #[test]
    fn test_bound_at_or_above_exact_is_exact() {
        let a = pattern(32, 3.0);
        let b = pattern(32, 5.0);
        let exact = distance(&a, &b, f64::INFINITY).unwrap();

        assert_eq!(distance(&a, &b, exact).unwrap(), exact);
        assert_eq!(distance(&a, &b, exact * 2.0).unwrap(), exact);
    }

    #[test]
    fn test_early_exit_stops_at_first_chunk() {
        let a = [10.0, 0.0, 0.0, 0.0, 10.0, 0.0, 0.0, 0.0];
        let b = [0.0; 8];
        // The first chunk already contributes 100 > 50.
        assert_eq!(distance(&a, &b, 50.0).unwrap(), 100.0);
    }

    #[test]
    fn test_invalid_lengths() {
        assert!(matches!(
            distance(&[0.0; 8], &[0.0; 4], f64::INFINITY),
            Err(FeatureError::InvalidInput(_))
        ));
        assert!(matches!(
            distance(&[0.0; 6], &[0.0; 6], f64::INFINITY),
            Err(FeatureError::InvalidInput(_))
        ));
    }
}
