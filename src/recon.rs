//! k-space frame to magnitude image reconstruction
//!
//! A frame becomes an image via 2D FFT, fftshift (the zero-frequency bin
//! otherwise lands in a corner), a fixed flip-both-axes + transpose to
//! match the scanner console's display orientation, and element-wise
//! magnitude. Pure and deterministic: the same frame always reconstructs
//! to the bit-identical image.

use crate::fft::{fftshift2d, Fft2dWorkspace};
use crate::kspace::FrameStack;
use num_complex::Complex64;

/// Real-valued 2D array: a magnitude image or a parametric map.
/// Row-major, index = row * nx + col.
#[derive(Clone, Debug, PartialEq)]
pub struct Image {
    pub data: Vec<f64>,
    pub ny: usize,
    pub nx: usize,
}

impl Image {
    pub fn zeros(ny: usize, nx: usize) -> Self {
        Self {
            data: vec![0.0; ny * nx],
            ny,
            nx,
        }
    }

    #[inline]
    pub fn at(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.nx + col]
    }

    /// Largest element, 0.0 for an empty image
    pub fn max(&self) -> f64 {
        self.data.iter().cloned().fold(0.0_f64, f64::max)
    }
}

/// Reconstruct one `ny * nx` k-space frame into its magnitude image.
/// The flip + transpose swaps the axes, so the image is `nx` rows by
/// `ny` columns.
pub fn reconstruct(ws: &mut Fft2dWorkspace, frame: &[Complex64], ny: usize, nx: usize) -> Image {
    let mut spectrum = frame.to_vec();
    ws.fft2d(&mut spectrum);
    let shifted = fftshift2d(&spectrum, ny, nx);

    // out[a, b] = |shifted[ny-1-b, nx-1-a]|  (flip both axes, then transpose)
    let mut out = Image::zeros(nx, ny);
    for a in 0..nx {
        for b in 0..ny {
            out.data[a * ny + b] = shifted[(ny - 1 - b) * nx + (nx - 1 - a)].norm();
        }
    }
    out
}

/// Reconstruct every frame of a stack, reusing one FFT workspace.
/// Frame order is preserved.
pub fn reconstruct_stack(stack: &FrameStack) -> Vec<Image> {
    let mut ws = Fft2dWorkspace::new(stack.ny, stack.nx);
    stack
        .frames
        .iter()
        .map(|frame| reconstruct(&mut ws, frame, stack.ny, stack.nx))
        .collect()
}
