//! Common test utilities: synthetic phantom construction
//!
//! Builds raw acquisitions whose reconstruction is a known magnitude
//! image, by running the reconstruction transform backwards (inverse
//! geometric transform, inverse fftshift, inverse FFT) and re-applying
//! the scanner's row interleaving.

use num_complex::Complex64;
use relax_core::fft::{ifftshift2d, Fft2dWorkspace};
use relax_core::kspace::{RawSignalSet, ReorderScheme};
use relax_core::recon::Image;

/// k-space frame whose reconstruction equals `target` up to FFT rounding.
/// `target` must be non-negative with dimensions (nx, ny), since the
/// reconstruction transposes the frame axes.
pub fn frame_for_image(target: &Image, ny: usize, nx: usize) -> Vec<Complex64> {
    assert_eq!(
        (target.ny, target.nx),
        (nx, ny),
        "target dims must be the transpose of the frame dims"
    );

    // Undo flip + transpose
    let mut shifted = vec![Complex64::new(0.0, 0.0); ny * nx];
    for a in 0..nx {
        for b in 0..ny {
            shifted[(ny - 1 - b) * nx + (nx - 1 - a)] =
                Complex64::new(target.data[a * ny + b], 0.0);
        }
    }

    // Undo fftshift, then undo the forward FFT
    let mut frame = ifftshift2d(&shifted, ny, nx);
    let mut ws = Fft2dWorkspace::new(ny, nx);
    ws.ifft2d(&mut frame);
    frame
}

/// Interleave logical slice-major frames into a flat raw matrix the way
/// the scanner writes it: acquisition position of logical (slice s,
/// timepoint t) is `t * n_slices + s` for a block-interleaved series and
/// `s * n_timepoints + t` otherwise, and raw row `r` comes from frame
/// `r % n_frames`, frame row `r / n_frames`.
pub fn interleave(
    logical_frames: &[Vec<Complex64>],
    n_timepoints: usize,
    ny: usize,
    nx: usize,
    scheme: ReorderScheme,
) -> RawSignalSet {
    let n_frames = logical_frames.len();
    assert_eq!(n_frames % n_timepoints, 0);
    let n_slices = n_frames / n_timepoints;

    let mut acq_order: Vec<&Vec<Complex64>> = Vec::with_capacity(n_frames);
    match scheme {
        ReorderScheme::BlockInterleaved => {
            for t in 0..n_timepoints {
                for s in 0..n_slices {
                    acq_order.push(&logical_frames[s * n_timepoints + t]);
                }
            }
        }
        ReorderScheme::Interleaved => {
            acq_order.extend(logical_frames.iter());
        }
    }

    let n_rows = n_frames * ny;
    let mut data = vec![Complex64::new(0.0, 0.0); n_rows * nx];
    for r in 0..n_rows {
        let frame = acq_order[r % n_frames];
        let row = r / n_frames;
        data[r * nx..(r + 1) * nx].copy_from_slice(&frame[row * nx..(row + 1) * nx]);
    }

    RawSignalSet::new(data, n_rows, nx).expect("phantom dimensions are consistent")
}

/// Constant image with the given (row, col) dimensions
pub fn const_image(value: f64, ny: usize, nx: usize) -> Image {
    Image {
        data: vec![value; ny * nx],
        ny,
        nx,
    }
}
