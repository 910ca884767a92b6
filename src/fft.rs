//! FFT wrapper for 2D transforms using rustfft
//!
//! Provides 2D FFT/IFFT and spectrum-shift operations compatible with
//! NumPy's `fft2`/`fftshift` conventions, as used for k-space image
//! reconstruction. Arrays are row-major: index = row * nx + col.

use num_complex::Complex64;
use rustfft::{Fft, FftDirection, FftPlanner};
use std::sync::Arc;

/// FFT workspace that caches plans and scratch buffers for reuse
/// across the frames of an acquisition (all frames share one size).
pub struct Fft2dWorkspace {
    ny: usize,
    nx: usize,
    // Forward FFT plans
    fft_row: Arc<dyn Fft<f64>>,
    fft_col: Arc<dyn Fft<f64>>,
    // Inverse FFT plans
    ifft_row: Arc<dyn Fft<f64>>,
    ifft_col: Arc<dyn Fft<f64>>,
    // Scratch buffers
    scratch_row: Vec<Complex64>,
    scratch_col: Vec<Complex64>,
    buffer_col: Vec<Complex64>,
}

impl Fft2dWorkspace {
    /// Create a new FFT workspace for frames of `ny` rows by `nx` columns
    pub fn new(ny: usize, nx: usize) -> Self {
        let mut planner = FftPlanner::new();

        let fft_row = planner.plan_fft(nx, FftDirection::Forward);
        let fft_col = planner.plan_fft(ny, FftDirection::Forward);
        let ifft_row = planner.plan_fft(nx, FftDirection::Inverse);
        let ifft_col = planner.plan_fft(ny, FftDirection::Inverse);

        let scratch_row = vec![
            Complex64::new(0.0, 0.0);
            fft_row
                .get_inplace_scratch_len()
                .max(ifft_row.get_inplace_scratch_len())
        ];
        let scratch_col = vec![
            Complex64::new(0.0, 0.0);
            fft_col
                .get_inplace_scratch_len()
                .max(ifft_col.get_inplace_scratch_len())
        ];

        Self {
            ny,
            nx,
            fft_row,
            fft_col,
            ifft_row,
            ifft_col,
            scratch_row,
            scratch_col,
            buffer_col: vec![Complex64::new(0.0, 0.0); ny],
        }
    }

    /// In-place forward 2D FFT
    pub fn fft2d(&mut self, data: &mut [Complex64]) {
        let (ny, nx) = (self.ny, self.nx);
        debug_assert_eq!(data.len(), ny * nx);

        // Transform along rows
        for j in 0..ny {
            let start = j * nx;
            self.fft_row
                .process_with_scratch(&mut data[start..start + nx], &mut self.scratch_row);
        }

        // Transform along columns
        for i in 0..nx {
            for j in 0..ny {
                self.buffer_col[j] = data[j * nx + i];
            }
            self.fft_col
                .process_with_scratch(&mut self.buffer_col, &mut self.scratch_col);
            for j in 0..ny {
                data[j * nx + i] = self.buffer_col[j];
            }
        }
    }

    /// In-place inverse 2D FFT (with normalization)
    pub fn ifft2d(&mut self, data: &mut [Complex64]) {
        let (ny, nx) = (self.ny, self.nx);
        debug_assert_eq!(data.len(), ny * nx);

        for j in 0..ny {
            let start = j * nx;
            self.ifft_row
                .process_with_scratch(&mut data[start..start + nx], &mut self.scratch_row);
        }

        for i in 0..nx {
            for j in 0..ny {
                self.buffer_col[j] = data[j * nx + i];
            }
            self.ifft_col
                .process_with_scratch(&mut self.buffer_col, &mut self.scratch_col);
            for j in 0..ny {
                data[j * nx + i] = self.buffer_col[j];
            }
        }

        let n_total = (ny * nx) as f64;
        for val in data.iter_mut() {
            *val /= n_total;
        }
    }
}

/// Cyclic shift moving the zero-frequency component to the array center
/// (NumPy `fftshift`): each axis is rotated by floor(n/2).
pub fn fftshift2d(data: &[Complex64], ny: usize, nx: usize) -> Vec<Complex64> {
    shift2d(data, ny, nx, ny / 2, nx / 2)
}

/// Inverse of [`fftshift2d`]: each axis is rotated by ceil(n/2).
/// Identical to `fftshift2d` for even dimensions.
pub fn ifftshift2d(data: &[Complex64], ny: usize, nx: usize) -> Vec<Complex64> {
    shift2d(data, ny, nx, ny - ny / 2, nx - nx / 2)
}

fn shift2d(
    data: &[Complex64],
    ny: usize,
    nx: usize,
    shift_y: usize,
    shift_x: usize,
) -> Vec<Complex64> {
    let mut out = vec![Complex64::new(0.0, 0.0); ny * nx];
    for j in 0..ny {
        let jj = (j + shift_y) % ny;
        for i in 0..nx {
            let ii = (i + shift_x) % nx;
            out[jj * nx + ii] = data[j * nx + i];
        }
    }
    out
}
