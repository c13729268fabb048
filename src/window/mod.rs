/*!
Turning a series into supervised (window, next value) samples
*/
use crate::{CpuFloat, Error, Result};
use ndarray::{s, Array2, ArrayView1, ArrayView2, Axis};
use rand::seq::SliceRandom;
use rand::Rng;

/// A window of consecutive rows of a series, labelled with the target value of the row right after it
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// The index of the window's first row within the series
    pub start: usize,
    /// The window itself, as a (window size x features) matrix
    pub inputs: Array2<CpuFloat>,
    /// The target value at row `start + window size`
    pub label: CpuFloat,
}

/// An ordered collection of samples sharing a window size and feature count
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    window_size: usize,
    features: usize,
    samples: Vec<Sample>,
}

/// Build a sample for every window of `window_size` consecutive rows of `series`, in order.
///
/// `series` has one row per timestep and one column per feature; labels are read from column `target`.
pub fn make_windows(series: ArrayView2<CpuFloat>, window_size: usize, target: usize) -> Result<Dataset> {
    if window_size == 0 {
        return Err(Error::InvalidConfig("window size must be at least 1".to_owned()));
    }
    let (len, features) = series.dim();
    if target >= features {
        return Err(Error::DimensionMismatch {
            what: "target column",
            expected: features,
            found: target,
        });
    }
    if len <= window_size {
        return Err(Error::InsufficientData { len, window_size });
    }
    let samples = (0..len - window_size)
        .map(|start| Sample {
            start,
            inputs: series.slice(s![start..start + window_size, ..]).to_owned(),
            label: series[[start + window_size, target]],
        })
        .collect();
    Ok(Dataset {
        window_size,
        features,
        samples,
    })
}

/// Build windows over a single-feature series
pub fn make_scalar_windows(series: &[CpuFloat], window_size: usize) -> Result<Dataset> {
    make_windows(
        ArrayView1::from(series).insert_axis(Axis(1)),
        window_size,
        0,
    )
}

impl Dataset {
    /// The number of rows in each window
    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// The number of features per row
    pub fn features(&self) -> usize {
        self.features
    }

    /// The number of samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether there are no samples
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// The samples, in their current order
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Iterate over the samples in their current order
    pub fn iter(&self) -> std::slice::Iter<'_, Sample> {
        self.samples.iter()
    }

    /// Reorder the samples uniformly at random
    pub fn shuffle<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.samples.shuffle(rng)
    }

    /// Split into the first `index` samples and the rest. An index past the end keeps everything in the prefix.
    pub fn split_at(mut self, index: usize) -> (Dataset, Dataset) {
        let index = index.min(self.samples.len());
        let suffix = self.samples.split_off(index);
        let suffix = Dataset {
            window_size: self.window_size,
            features: self.features,
            samples: suffix,
        };
        (self, suffix)
    }

    /// Split so the prefix holds `ratio` of the samples, rounded down
    pub fn split_ratio(self, ratio: f64) -> Result<(Dataset, Dataset)> {
        if !(0.0..=1.0).contains(&ratio) {
            return Err(Error::InvalidConfig(format!(
                "split ratio must lie in [0, 1], got {}",
                ratio
            )));
        }
        let index = (self.samples.len() as f64 * ratio) as usize;
        Ok(self.split_at(index))
    }
}

impl<'a> IntoIterator for &'a Dataset {
    type Item = &'a Sample;
    type IntoIter = std::slice::Iter<'a, Sample>;
    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
