//! Rating-weighted user query vector

use ndarray::{Array1, ArrayView1};

/// Weight of a rated interaction in the user vector
///
/// Missing and out-of-range ratings count as neutral.
pub fn rating_weight(rating: Option<i64>) -> f32 {
    match rating {
        Some(5) => 1.5,
        Some(4) => 1.2,
        Some(3) => 1.0,
        Some(2) => 0.8,
        Some(1) => 0.5,
        _ => 1.0,
    }
}

/// Weighted mean of item vectors
///
/// Vectors whose length differs from `dimension` are ignored. Returns `None`
/// when nothing usable remains, so callers never divide by zero.
pub fn weighted_query_vector<'a, I>(rated: I, dimension: usize) -> Option<Vec<f32>>
where
    I: IntoIterator<Item = (&'a [f32], Option<i64>)>,
{
    let mut sum = Array1::<f32>::zeros(dimension);
    let mut total_weight = 0.0f32;

    for (vector, rating) in rated {
        if vector.len() != dimension {
            tracing::debug!(
                "Skipping {}D vector in {}D query",
                vector.len(),
                dimension
            );
            continue;
        }
        let weight = rating_weight(rating);
        sum.scaled_add(weight, &ArrayView1::from(vector));
        total_weight += weight;
    }

    if total_weight == 0.0 {
        return None;
    }

    Some((sum / total_weight).to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rating_weights() {
        assert_eq!(rating_weight(Some(5)), 1.5);
        assert_eq!(rating_weight(Some(4)), 1.2);
        assert_eq!(rating_weight(Some(3)), 1.0);
        assert_eq!(rating_weight(Some(2)), 0.8);
        assert_eq!(rating_weight(Some(1)), 0.5);
        assert_eq!(rating_weight(None), 1.0);
        assert_eq!(rating_weight(Some(0)), 1.0);
        assert_eq!(rating_weight(Some(9)), 1.0);
    }

    #[test]
    fn test_weighted_mean() {
        let a = [1.0f32, 0.0];
        let b = [0.0f32, 1.0];
        let query = weighted_query_vector([(&a[..], Some(5)), (&b[..], Some(1))], 2).unwrap();
        assert_eq!(query, vec![0.75, 0.25]);
    }

    #[test]
    fn test_unrated_is_plain_mean() {
        let a = [2.0f32, 0.0];
        let b = [0.0f32, 4.0];
        let query = weighted_query_vector([(&a[..], None), (&b[..], None)], 2).unwrap();
        assert_eq!(query, vec![1.0, 2.0]);
    }

    #[test]
    fn test_no_usable_vectors() {
        assert!(weighted_query_vector(std::iter::empty(), 3).is_none());

        let wrong = [1.0f32, 2.0];
        assert!(weighted_query_vector([(&wrong[..], Some(5))], 3).is_none());
    }

    #[test]
    fn test_mismatched_vectors_are_ignored() {
        let good = [3.0f32, 3.0, 3.0];
        let bad = [100.0f32];
        let query = weighted_query_vector([(&bad[..], Some(5)), (&good[..], Some(2))], 3).unwrap();
        assert_eq!(query, vec![3.0, 3.0, 3.0]);
    }
}
