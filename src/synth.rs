//! Synthetic image generation from fitted parameter maps
//!
//! Evaluates the combined relaxation forward model
//! SI(TI, TE) = |Mo * (1 - 2 * exp(-TI/T1)) + C1| * exp(-TE/T2) + C2
//! at every requested (TI, TE) pair, per slice. The inversion efficiency
//! is the fixed ideal value 2 here, not the per-pixel `a` the T1 fit
//! produced: synthesis assumes a perfect 180-degree inversion while the
//! fit absorbs hardware imperfection. Returned images keep physical
//! scale; only the persisted PNGs are normalized to [0, 255].

use crate::recon::Image;
use crate::Error;
use image::GrayImage;
use std::fs;
use std::path::Path;

/// Ideal inversion efficiency assumed for synthesis (see module docs)
pub const INVERSION_EFFICIENCY: f64 = 2.0;

/// One synthesized image at a requested (TI, TE), for one slice
#[derive(Clone, Debug)]
pub struct SyntheticImage {
    /// Position in the slice selection (not the scanner slice number)
    pub slice: usize,
    /// Inversion time (ms)
    pub ti: f64,
    /// Echo time (ms)
    pub te: f64,
    pub image: Image,
}

/// Combined forward model for a single pixel
#[inline]
pub fn forward_model(ti: f64, te: f64, t1: f64, t2: f64, mo: f64, c1: f64, c2: f64) -> f64 {
    (mo * (1.0 - INVERSION_EFFICIENCY * (-ti / t1).exp()) + c1).abs() * (-te / t2).exp() + c2
}

/// Synthesize one image per (TI, TE, slice) triple.
///
/// Output order is an external contract (it drives file naming): TI values
/// outermost, then TE values, then slices.
///
/// # Arguments
/// * `ti_wish`, `te_wish` - Requested TI and TE values (ms)
/// * `t1_maps`, `t2_maps`, `mo_maps`, `c1_maps`, `c2_maps` - Per-slice
///   fitted maps; `mo_maps` is the average of the two tracks' Mo fits
/// * `out_dir` - When given, the directory is removed and recreated, and
///   each image is written as `slice_{j}_TI_{ti}ms_TE_{te}ms.png`,
///   normalized to the [0, 255] display range
pub fn synthesize(
    ti_wish: &[f64],
    te_wish: &[f64],
    t1_maps: &[Image],
    t2_maps: &[Image],
    mo_maps: &[Image],
    c1_maps: &[Image],
    c2_maps: &[Image],
    out_dir: Option<&Path>,
) -> Result<Vec<SyntheticImage>, Error> {
    let n_slices = mo_maps.len();
    for (name, stack) in [
        ("T1", t1_maps),
        ("T2", t2_maps),
        ("C1", c1_maps),
        ("C2", c2_maps),
    ] {
        if stack.len() != n_slices {
            return Err(Error::ShapeMismatch(format!(
                "{} map stack holds {} slices, expected {}",
                name,
                stack.len(),
                n_slices
            )));
        }
    }

    if let Some(dir) = out_dir {
        // Stale outputs from a previous run must not survive
        let _ = fs::remove_dir_all(dir);
        fs::create_dir_all(dir)?;
    }

    let mut out = Vec::with_capacity(ti_wish.len() * te_wish.len() * n_slices);

    for &ti in ti_wish {
        for &te in te_wish {
            for j in 0..n_slices {
                let (ny, nx) = (mo_maps[j].ny, mo_maps[j].nx);
                let mut image = Image::zeros(ny, nx);
                for idx in 0..ny * nx {
                    image.data[idx] = forward_model(
                        ti,
                        te,
                        t1_maps[j].data[idx],
                        t2_maps[j].data[idx],
                        mo_maps[j].data[idx],
                        c1_maps[j].data[idx],
                        c2_maps[j].data[idx],
                    );
                }

                if let Some(dir) = out_dir {
                    let name = format!("slice_{}_TI_{}ms_TE_{}ms.png", j, ti, te);
                    save_display_png(&image, &dir.join(name))?;
                }

                out.push(SyntheticImage {
                    slice: j,
                    ti,
                    te,
                    image,
                });
            }
        }
    }

    Ok(out)
}

/// Write a grayscale PNG scaled so the image maximum maps to 255.
/// The caller's image is untouched; the normalization exists only for
/// display.
fn save_display_png(image: &Image, path: &Path) -> Result<(), Error> {
    let max = image.max();
    let scale = if max > 0.0 { 255.0 / max } else { 0.0 };
    let pixels: Vec<u8> = image
        .data
        .iter()
        .map(|&v| (v * scale).round().clamp(0.0, 255.0) as u8)
        .collect();

    // from_raw only fails on a length mismatch, which zeros() rules out
    let png = GrayImage::from_raw(image.nx as u32, image.ny as u32, pixels).ok_or_else(|| {
        Error::ShapeMismatch(format!("image buffer does not match {}x{}", image.nx, image.ny))
    })?;
    png.save(path)?;
    Ok(())
}
