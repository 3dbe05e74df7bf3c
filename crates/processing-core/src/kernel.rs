//! Convolution kernels.
//!
//! Kernels are stored row-major in a fixed `MAX_KERNEL_SIZE x MAX_KERNEL_SIZE`
//! block regardless of their effective size. Weight `(row, col)` lives at
//! `row * MAX_KERNEL_SIZE + col`; entries outside `size x size` are zero.
//! The convolution shader reads the same layout.

use clipfx_common::{FxError, FxResult};

pub use clipfx_project_model::MAX_KERNEL_SIZE;

/// Number of weights in a padded kernel.
pub const KERNEL_LEN: usize = MAX_KERNEL_SIZE * MAX_KERNEL_SIZE;

/// A square convolution kernel with an odd effective size.
#[derive(Debug, Clone, PartialEq)]
pub struct KernelSpec {
    values: [f32; KERNEL_LEN],
    size: usize,
}

impl KernelSpec {
    /// Build a kernel from padded values.
    pub fn new(values: [f32; KERNEL_LEN], size: usize) -> FxResult<Self> {
        validate_size(size)?;
        Ok(Self { values, size })
    }

    /// Build a kernel from `size * size` compact row-major weights.
    pub fn from_compact(size: usize, weights: &[f32]) -> FxResult<Self> {
        validate_size(size)?;
        if weights.len() != size * size {
            return Err(FxError::config(format!(
                "kernel of size {size} needs {} weights, got {}",
                size * size,
                weights.len()
            )));
        }
        let mut values = [0.0; KERNEL_LEN];
        for (i, w) in weights.iter().enumerate() {
            values[(i / size) * MAX_KERNEL_SIZE + i % size] = *w;
        }
        Ok(Self { values, size })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Padded weights, `KERNEL_LEN` long.
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.values[row * MAX_KERNEL_SIZE + col]
    }

    /// Sum of the effective weights, accumulated in f64.
    pub fn sum(&self) -> f64 {
        (0..self.size)
            .flat_map(|row| (0..self.size).map(move |col| (row, col)))
            .map(|(row, col)| f64::from(self.get(row, col)))
            .sum()
    }

    /// Quick equality probe: same size and equal values at flat indices
    /// `i * i` for `i < size`. Kernels from the same generator with the same
    /// parameters always match; different parameters almost never do.
    pub fn probe_matches(&self, other: &KernelSpec) -> bool {
        self.size == other.size
            && (0..self.size).all(|i| self.values[i * i] == other.values[i * i])
    }
}

fn validate_size(size: usize) -> FxResult<()> {
    if size == 0 || size % 2 == 0 || size > MAX_KERNEL_SIZE {
        return Err(FxError::config(format!(
            "kernel size {size} must be odd and within 1..={MAX_KERNEL_SIZE}"
        )));
    }
    Ok(())
}

/// Box blur kernel, every weight `1 / size²`.
pub fn mean_kernel(size: usize) -> FxResult<KernelSpec> {
    validate_size(size)?;
    let weight = 1.0 / (size * size) as f32;
    KernelSpec::from_compact(size, &vec![weight; size * size])
}

/// Normalized 2-D Gaussian kernel.
pub fn gaussian_kernel(size: usize, sigma: f64) -> FxResult<KernelSpec> {
    validate_size(size)?;
    if !(sigma > 0.0 && sigma.is_finite()) {
        return Err(FxError::config(format!(
            "gaussian sigma {sigma} must be positive"
        )));
    }

    let center = (size / 2) as f64;
    let inv_two_sigma2 = 1.0 / (2.0 * sigma * sigma);
    let raw: Vec<f64> = (0..size * size)
        .map(|i| {
            let x = (i % size) as f64 - center;
            let y = (i / size) as f64 - center;
            (-(x * x + y * y) * inv_two_sigma2).exp()
        })
        .collect();
    let sum: f64 = raw.iter().sum();
    let weights: Vec<f32> = raw.iter().map(|w| (w / sum) as f32).collect();

    KernelSpec::from_compact(size, &weights)
}

/// Laplacian kernel.
///
/// Sizes up to 3 produce the 4-neighbour cross: neighbours `-1` around a
/// centre of `5` (sharpen), or `1` around `-4` when `edge` is set. Larger
/// sizes produce the 5x5 sharpen ring of `-2` around `17`; `edge` has no
/// effect there.
pub fn laplacian_kernel(size: usize, edge: bool) -> KernelSpec {
    if size <= 3 {
        let (n, c) = if edge { (1.0, -4.0) } else { (-1.0, 5.0) };
        #[rustfmt::skip]
        let weights = [
            0.0, n, 0.0,
            n,   c, n,
            0.0, n, 0.0,
        ];
        fixed_kernel(3, &weights)
    } else {
        #[rustfmt::skip]
        let weights = [
            0.0,  0.0,  -2.0, 0.0,  0.0,
            0.0,  -2.0, 0.0,  -2.0, 0.0,
            -2.0, 0.0,  17.0, 0.0,  -2.0,
            0.0,  -2.0, 0.0,  -2.0, 0.0,
            0.0,  0.0,  -2.0, 0.0,  0.0,
        ];
        fixed_kernel(5, &weights)
    }
}

fn fixed_kernel(size: usize, weights: &[f32]) -> KernelSpec {
    let mut values = [0.0; KERNEL_LEN];
    for (i, w) in weights.iter().enumerate() {
        values[(i / size) * MAX_KERNEL_SIZE + i % size] = *w;
    }
    KernelSpec { values, size }
}
