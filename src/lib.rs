//! relax-core: quantitative T1/T2 relaxometry and synthetic MRI contrast
//!
//! Reconstructs magnitude images from two raw k-space acquisitions of the
//! same slices (an inversion-recovery TI series and a multi-echo TE series),
//! fits per-pixel relaxation models to obtain T1, T2, Mo and offset maps,
//! and synthesizes theoretical images at arbitrary (TI, TE) combinations
//! that were never physically acquired.
//!
//! # Modules
//! - `fft`: 2D FFT operations using rustfft
//! - `kspace`: raw-signal de-interleaving into per-(slice, timepoint) frames
//! - `recon`: k-space frame to magnitude image reconstruction
//! - `fitting`: relaxation signal models and per-pixel curve fitting
//! - `solvers`: bounded Levenberg-Marquardt least squares
//! - `maps`: parametric map assembly across slices and pixels
//! - `synth`: combined forward model and synthetic image output
//! - `pipeline`: end-to-end orchestration and input validation

// Core modules
pub mod fft;
pub mod kspace;
pub mod recon;

// Fitting
pub mod fitting;
pub mod maps;
pub mod solvers;

// Synthesis and orchestration
pub mod pipeline;
pub mod synth;

mod error;

pub use error::Error;
