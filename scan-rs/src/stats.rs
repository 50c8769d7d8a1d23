use anyhow::{bail, Error};
use ndarray::prelude::*;
use ndarray::DataMut;
use noisy_float::prelude::*;
use num_traits::FromPrimitive;
use scan_types::ExprMatrix;
use std::ops::{Add, Div};

/// Return the median. Sorts its argument in place.
pub fn median_mut<S, T>(xs: &mut ArrayBase<S, Ix1>) -> Result<T, Error>
where
    S: DataMut<Elem = T>,
    T: Clone + Copy + Ord + FromPrimitive + Add<Output = T> + Div<Output = T>,
{
    if xs.is_empty() {
        bail!("median of an empty array");
    }
    match xs.as_slice_mut() {
        Some(vector) => vector.sort_unstable(),
        None => bail!("median requires contiguous data"),
    }
    let n = xs.len();
    Ok(if n % 2 == 0 {
        match T::from_u64(2) {
            Some(two) => (xs[n / 2] + xs[n / 2 - 1]) / two,
            None => bail!("cannot represent 2 in the element type"),
        }
    } else {
        xs[n / 2]
    })
}

/// Median of the strictly positive values, or None if there are none. NaN values are skipped.
pub fn median_positive(values: &[f64]) -> Option<f64> {
    let mut positive = values
        .iter()
        .filter(|v| **v > 0.0)
        .map(|&v| n64(v))
        .collect::<Array1<N64>>();
    median_mut(&mut positive).ok().map(|m| m.raw())
}

/// Per-feature mean and sample variance (ddof 1) of `f(x)` over all observations, computed
/// column-parallel. Zeros of a sparse matrix are transformed too, so `f(0)` needs no special care.
pub fn column_mean_var(x: &ExprMatrix, f: impl Fn(f64) -> f64 + Sync + Send) -> (Vec<f64>, Vec<f64>) {
    let n = x.rows() as f64;
    x.par_map_columns(|_, col| {
        let mean = col.iter().map(|&v| f(v)).sum::<f64>() / n;
        let ss = col.iter().map(|&v| (f(v) - mean).powi(2)).sum::<f64>();
        (mean, ss / (n - 1.0))
    })
    .into_iter()
    .unzip()
}

#[cfg(test)]
mod test_stats {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use ndarray::prelude::array;

    #[test]
    fn test_median_mut() {
        assert!(median_mut(&mut Array::<usize, Ix1>::from(vec![])).is_err());
        assert_eq!(median_mut(&mut array![1]).unwrap(), 1);
        assert_eq!(median_mut(&mut array![10, 1]).unwrap(), 5);
        assert_eq!(median_mut(&mut array![1, 100, 10]).unwrap(), 10);

        assert_eq!(median_mut(&mut array![1., 10.].mapv(n64)).unwrap(), n64(5.5));
        assert_eq!(median_mut(&mut array![1000., 1., 100., 10.].mapv(n64)).unwrap(), n64(55.0));
    }

    #[test]
    fn test_median_positive() {
        assert_eq!(median_positive(&[0.0, 4.0, 2.0, 0.0, 9.0]), Some(4.0));
        assert_eq!(median_positive(&[0.0, 3.0, 1.0]), Some(2.0));
        assert_eq!(median_positive(&[0.0, 0.0]), None);
    }

    #[test]
    fn test_column_mean_var() {
        let x = ExprMatrix::Dense(array![[1.0, 0.0], [2.0, 0.0], [3.0, 6.0]]);
        let (mean, var) = column_mean_var(&x, |v| v);
        assert_approx_eq!(mean[0], 2.0);
        assert_approx_eq!(var[0], 1.0);
        assert_approx_eq!(mean[1], 2.0);
        assert_approx_eq!(var[1], 12.0);

        let (mean, _) = column_mean_var(&x, |v| 2.0 * v + 1.0);
        assert_approx_eq!(mean[1], 5.0);
    }
}
