/*!
Input data scaling
*/
use crate::{CpuFloat, Error, Result};
use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

/// Per-column standardization to zero mean and unit variance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler<F = CpuFloat> {
    /// The mean of each column
    pub mean: Vec<F>,
    /// The (population) standard deviation of each column
    pub std: Vec<F>,
}

impl StandardScaler {
    /// Fit a scaler to the columns of a (rows x columns) matrix
    pub fn fit(data: ArrayView2<CpuFloat>) -> Result<StandardScaler> {
        if data.nrows() == 0 {
            return Err(Error::EmptySeries);
        }
        let mean = data.mean_axis(Axis(0)).ok_or(Error::EmptySeries)?;
        let std = data.std_axis(Axis(0), 0.0);
        Ok(StandardScaler {
            mean: mean.to_vec(),
            std: std.to_vec(),
        })
    }

    /// The number of columns this scaler was fit to
    pub fn width(&self) -> usize {
        self.mean.len()
    }

    /// Scale a single value of a column. Constant columns scale to zero.
    #[inline]
    pub fn scale(&self, column: usize, value: CpuFloat) -> CpuFloat {
        let std = self.std[column];
        if std == 0.0 {
            return 0.0;
        }
        (value - self.mean[column]) / std
    }

    /// Undo the scaling of a single value of a column
    #[inline]
    pub fn unscale(&self, column: usize, value: CpuFloat) -> CpuFloat {
        value * self.std[column] + self.mean[column]
    }

    /// Scale every column of a matrix
    pub fn transform(&self, data: ArrayView2<CpuFloat>) -> Result<Array2<CpuFloat>> {
        if data.ncols() != self.width() {
            return Err(Error::DimensionMismatch {
                what: "scaled columns",
                expected: self.width(),
                found: data.ncols(),
            });
        }
        let mut scaled = data.to_owned();
        for (column, mut values) in scaled.axis_iter_mut(Axis(1)).enumerate() {
            values.mapv_inplace(|value| self.scale(column, value));
        }
        Ok(scaled)
    }

    /// Undo the scaling of a vector of values from one column
    pub fn inverse_column(&self, column: usize, values: &Array1<CpuFloat>) -> Array1<CpuFloat> {
        values.mapv(|value| self.unscale(column, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, arr2};

    #[test]
    fn standardizes_columns() {
        let data = arr2(&[[1.0, 10.0], [3.0, 10.0], [5.0, 10.0]]);
        let scaler = StandardScaler::fit(data.view()).unwrap();
        assert_eq!(scaler.mean, vec![3.0, 10.0]);
        assert_eq!(scaler.std[1], 0.0);
        let scaled = scaler.transform(data.view()).unwrap();
        assert_eq!(scaled.column(1).to_vec(), vec![0.0, 0.0, 0.0]);
        assert!((scaled.column(0).sum()).abs() < 1e-12);
        assert!((scaled[[2, 0]] - 1.224744871391589).abs() < 1e-12);
        let restored = scaler.inverse_column(0, &scaled.column(0).to_owned());
        for (r, o) in restored.iter().zip(&[1.0, 3.0, 5.0]) {
            assert!((r - o).abs() < 1e-12);
        }
        assert_eq!(scaler.inverse_column(1, &arr1(&[0.0])), arr1(&[10.0]));
    }

    #[test]
    fn width_mismatch() {
        let scaler = StandardScaler::fit(arr2(&[[1.0], [2.0]]).view()).unwrap();
        assert!(scaler.transform(arr2(&[[1.0, 2.0]]).view()).is_err());
        assert!(StandardScaler::fit(Array2::<f64>::zeros((0, 2)).view()).is_err());
    }
}
