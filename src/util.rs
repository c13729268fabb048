/*!
Miscellaneous utilities for `vixburn`
*/

use num::Float;

/// Clip a value within an absolute value range
#[inline]
pub fn clip<F: Float>(value: F, range: F) -> F {
    value.max(-range).min(range)
}

/// Check that every value yielded by an iterator is finite
pub fn all_finite<'a, F, I>(values: I) -> bool
where
    F: Float + 'a,
    I: IntoIterator<Item = &'a F>,
{
    values.into_iter().all(|v| v.is_finite())
}

/// Half the squared error between a prediction and its target
#[inline]
pub fn half_squared_error<F: Float>(predicted: F, actual: F) -> F {
    let diff = predicted - actual;
    diff * diff / (F::one() + F::one())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clip_bounds_values() {
        assert_eq!(clip(3.0, 1.0), 1.0);
        assert_eq!(clip(-3.0, 1.0), -1.0);
        assert_eq!(clip(0.25f32, 1.0), 0.25);
        assert_eq!(clip(clip(7.5, 2.0), 2.0), 2.0);
    }

    #[test]
    fn finite_checks() {
        assert!(all_finite(&[1.0, -2.0, 0.0]));
        assert!(!all_finite(&[1.0, f64::NAN]));
        assert!(!all_finite(&[f64::INFINITY]));
        assert!(all_finite::<f64, _>(&[]));
    }

    #[test]
    fn half_squared_error_is_symmetric() {
        assert_eq!(half_squared_error(3.0, 1.0), 2.0);
        assert_eq!(half_squared_error(1.0, 3.0), 2.0);
    }
}
