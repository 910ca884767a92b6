//! Parametric map assembly
//!
//! Runs the per-pixel curve fitter over every pixel of every slice of a
//! reconstructed track and reassembles the fitted scalars into 2D maps.
//! Pixel fits are independent and share no mutable state, so the results
//! are identical whether they run sequentially or on a worker pool. The
//! pool is built inside [`calculate_maps`] and dropped before it returns;
//! no fit workers outlive the stage.

use crate::fitting::{fit_pixel, RelaxModel};
use crate::recon::Image;
use crate::Error;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;

/// How per-pixel fits are dispatched
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FitBackend {
    /// Fit pixels one after another on the calling thread
    Sequential,
    /// Fit pixels on a rayon pool with this many threads (0 = rayon default)
    Parallel(usize),
}

/// One acquisition track's fitted maps: per-slice relaxation time
/// (T1 or T2), equilibrium magnetization Mo, and baseline offset C.
/// All images share the spatial dimensions of the reconstructed input.
#[derive(Clone, Debug)]
pub struct MapSet {
    pub relax: Vec<Image>,
    pub mo: Vec<Image>,
    pub c: Vec<Image>,
}

/// Fit relaxation maps for one track.
///
/// # Arguments
/// * `images` - Reconstructed magnitude images, slice-major: `train.len()`
///   consecutive timepoint images per slice
/// * `train` - TI or TE values (ms), one per timepoint
/// * `model` - Curve family for this track
/// * `backend` - Sequential or pooled dispatch
///
/// # Returns
/// One [`MapSet`] covering all slices. Fit failures appear as the
/// fitter's sentinel values; every pixel of every map is populated.
pub fn calculate_maps(
    images: &[Image],
    train: &[f64],
    model: RelaxModel,
    backend: FitBackend,
) -> Result<MapSet, Error> {
    let n_t = train.len();
    if n_t == 0 {
        return Err(Error::ShapeMismatch(
            "timepoint train is empty".to_string(),
        ));
    }
    if images.is_empty() || images.len() % n_t != 0 {
        return Err(Error::ShapeMismatch(format!(
            "{} images cannot be grouped into {} timepoints per slice",
            images.len(),
            n_t
        )));
    }
    let (ny, nx) = (images[0].ny, images[0].nx);
    if images.iter().any(|im| im.ny != ny || im.nx != nx) {
        return Err(Error::ShapeMismatch(
            "reconstructed images differ in dimensions within one track".to_string(),
        ));
    }

    let n_slices = images.len() / n_t;
    let n_pix = ny * nx;

    // Pool lives for this call only; dropping it joins the workers.
    let pool = match backend {
        FitBackend::Sequential => None,
        FitBackend::Parallel(threads) => {
            Some(ThreadPoolBuilder::new().num_threads(threads).build()?)
        }
    };

    let mut maps = MapSet {
        relax: Vec::with_capacity(n_slices),
        mo: Vec::with_capacity(n_slices),
        c: Vec::with_capacity(n_slices),
    };

    for s in 0..n_slices {
        let slice_imgs = &images[s * n_t..(s + 1) * n_t];

        let fit_one = |idx: usize| -> Vec<f64> {
            let signal: Vec<f64> = slice_imgs.iter().map(|im| im.data[idx]).collect();
            fit_pixel(model, train, &signal)
        };

        let fitted: Vec<Vec<f64>> = match &pool {
            Some(pool) => pool.install(|| (0..n_pix).into_par_iter().map(fit_one).collect()),
            None => (0..n_pix).map(fit_one).collect(),
        };

        let mut relax = Image::zeros(ny, nx);
        let mut mo = Image::zeros(ny, nx);
        let mut c = Image::zeros(ny, nx);
        for (idx, params) in fitted.iter().enumerate() {
            // the IR model's fitted inversion efficiency, when present,
            // is not carried into any downstream map
            relax.data[idx] = params[0];
            mo.data[idx] = params[1];
            c.data[idx] = params[2];
        }
        maps.relax.push(relax);
        maps.mo.push(mo);
        maps.c.push(c);
    }

    Ok(maps)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Slice-major image stack where pixel (row, col) of every timepoint
    /// follows a clean T2 decay with slice/pixel dependent parameters.
    fn decay_stack(n_slices: usize, train: &[f64], ny: usize, nx: usize) -> Vec<Image> {
        let mut images = Vec::new();
        for s in 0..n_slices {
            for &te in train {
                let mut img = Image::zeros(ny, nx);
                for idx in 0..ny * nx {
                    let t2 = 40.0 + 10.0 * s as f64 + idx as f64;
                    let mo = 1000.0 + idx as f64;
                    img.data[idx] = mo * (-te / t2).exp();
                }
                images.push(img);
            }
        }
        images
    }

    #[test]
    fn test_maps_preserve_spatial_layout() {
        let train = [5.0, 10.0, 20.0, 40.0, 80.0];
        let images = decay_stack(2, &train, 3, 4);

        let maps =
            calculate_maps(&images, &train, RelaxModel::EchoDecay, FitBackend::Sequential)
                .unwrap();

        assert_eq!(maps.relax.len(), 2);
        for s in 0..2 {
            assert_eq!((maps.relax[s].ny, maps.relax[s].nx), (3, 4));
            for idx in 0..12 {
                let want_t2 = 40.0 + 10.0 * s as f64 + idx as f64;
                let got = maps.relax[s].data[idx];
                assert!(
                    (got - want_t2).abs() / want_t2 < 1e-2,
                    "slice {} pixel {}: T2 {} vs {}",
                    s,
                    idx,
                    got,
                    want_t2
                );
            }
        }
    }

    #[test]
    fn test_zero_pixels_carry_sentinel_without_holes() {
        let train = [5.0, 20.0, 80.0];
        let mut images = decay_stack(1, &train, 2, 2);
        // Kill pixel 3 across all timepoints
        for img in images.iter_mut() {
            img.data[3] = 0.0;
        }

        let maps =
            calculate_maps(&images, &train, RelaxModel::EchoDecay, FitBackend::Sequential)
                .unwrap();

        assert_eq!(maps.relax[0].data[3], crate::fitting::FALLBACK_RELAX_TIME);
        assert_eq!(maps.mo[0].data[3], 0.0);
        assert_eq!(maps.c[0].data[3], 0.0);
        // Neighboring pixels fit normally
        assert!(maps.relax[0].data[0] > 1.0);
    }

    #[test]
    fn test_sequential_and_parallel_agree() {
        let train = [5.0, 10.0, 20.0, 40.0];
        let images = decay_stack(1, &train, 4, 4);

        let seq =
            calculate_maps(&images, &train, RelaxModel::EchoDecay, FitBackend::Sequential)
                .unwrap();
        let par =
            calculate_maps(&images, &train, RelaxModel::EchoDecay, FitBackend::Parallel(2))
                .unwrap();

        assert_eq!(seq.relax[0].data, par.relax[0].data);
        assert_eq!(seq.mo[0].data, par.mo[0].data);
        assert_eq!(seq.c[0].data, par.c[0].data);
    }

    #[test]
    fn test_indivisible_stack_rejected() {
        let train = [5.0, 20.0];
        let images = decay_stack(1, &[5.0, 20.0, 80.0], 2, 2);
        assert!(matches!(
            calculate_maps(&images, &train, RelaxModel::EchoDecay, FitBackend::Sequential),
            Err(Error::ShapeMismatch(_))
        ));
    }
}
