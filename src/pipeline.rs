//! End-to-end orchestration
//!
//! Validates the two acquisitions, reconstructs both tracks, fits the
//! relaxation maps, averages the equilibrium-magnetization maps, and
//! synthesizes the requested theoretical images. All run-level knobs
//! live in an immutable [`PipelineConfig`].

use crate::fitting::RelaxModel;
use crate::kspace::{self, RawSignalSet, ReorderScheme};
use crate::maps::{calculate_maps, FitBackend, MapSet};
use crate::recon::{reconstruct_stack, Image};
use crate::synth::{synthesize, SyntheticImage};
use crate::Error;
use log::info;
use std::path::PathBuf;

/// Sequence layout expected for the inversion-recovery (TI) track
pub const IR_LAYOUT: &str = "sems";
/// Sequence layout expected for the multi-echo (TE) track
pub const ME_LAYOUT: &str = "mems";

/// One raw acquisition plus the metadata the pipeline needs.
/// The signal data and train are consumed read-only.
#[derive(Clone, Debug)]
pub struct Acquisition {
    pub raw: RawSignalSet,
    /// Scanner-reported trace count; the meaning differs per scheme
    /// (see [`Acquisition::n_frames`])
    pub traces: usize,
    /// TI or TE values in milliseconds, one per timepoint
    pub train: Vec<f64>,
    pub scheme: ReorderScheme,
    /// Sequence family from the acquisition metadata
    pub layout: String,
    /// Whether inversion recovery was enabled
    pub inversion_recovery: bool,
}

impl Acquisition {
    /// Total frame count in the raw matrix. Block-interleaved series
    /// report traces per timepoint, interleaved series report the total.
    pub fn n_frames(&self) -> usize {
        match self.scheme {
            ReorderScheme::BlockInterleaved => self.traces * self.train.len(),
            ReorderScheme::Interleaved => self.traces,
        }
    }
}

/// Parse a metadata value train (numeric strings) into milliseconds.
/// `scale` converts the stored unit (inversion times ship in seconds,
/// so the TI track passes 1000.0; echo times are already ms).
pub fn parse_train<S: AsRef<str>>(values: &[S], scale: f64) -> Result<Vec<f64>, Error> {
    values
        .iter()
        .map(|v| {
            v.as_ref()
                .trim()
                .parse::<f64>()
                .map(|x| x * scale)
                .map_err(|source| Error::BadTrainValue {
                    value: v.as_ref().to_string(),
                    source,
                })
        })
        .collect()
}

/// Which in-memory artifacts [`run`] returns besides the images
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReturnMaps {
    ImagesOnly,
    ImagesAndMaps,
}

/// Immutable run configuration
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Slices to take from the inversion-recovery acquisition, in output order
    pub slices_ir: Vec<usize>,
    /// Corresponding slices of the multi-echo acquisition: element i names
    /// the same physical slice as `slices_ir[i]`
    pub slices_me: Vec<usize>,
    /// Requested inversion times (ms) for synthesis
    pub ti_wish: Vec<f64>,
    /// Requested echo times (ms) for synthesis
    pub te_wish: Vec<f64>,
    /// Where the PNG renderings go; None skips persistence
    pub output_dir: Option<PathBuf>,
    pub return_maps: ReturnMaps,
    pub backend: FitBackend,
}

/// Everything a run produces. Synthetic images keep physical scale and
/// follow the TI-outer / TE-middle / slice-inner ordering.
#[derive(Clone, Debug)]
pub struct PipelineOutput {
    pub images: Vec<SyntheticImage>,
    pub t1_maps: Option<Vec<Image>>,
    pub t2_maps: Option<Vec<Image>>,
    /// Pixelwise mean of the two tracks' Mo maps
    pub mo_maps: Option<Vec<Image>>,
}

fn validate(config: &PipelineConfig, ir: &Acquisition, me: &Acquisition) -> Result<(), Error> {
    let mut problems = Vec::new();
    if ir.layout != IR_LAYOUT || !ir.inversion_recovery {
        problems.push(format!(
            "TI track is not a {} inversion-recovery series (layout {:?}, ir {})",
            IR_LAYOUT, ir.layout, ir.inversion_recovery
        ));
    }
    if me.layout != ME_LAYOUT || me.inversion_recovery {
        problems.push(format!(
            "TE track is not a {} multi-echo series (layout {:?}, ir {})",
            ME_LAYOUT, me.layout, me.inversion_recovery
        ));
    }
    if !problems.is_empty() {
        return Err(Error::Validation(problems.join("; ")));
    }

    if config.slices_ir.len() != config.slices_me.len() {
        return Err(Error::ShapeMismatch(format!(
            "slice selections differ in length: {} (TI track) vs {} (TE track)",
            config.slices_ir.len(),
            config.slices_me.len()
        )));
    }
    if config.slices_ir.is_empty() {
        return Err(Error::ShapeMismatch("empty slice selection".to_string()));
    }
    if ir.train.is_empty() {
        return Err(Error::EmptyTrain("TI"));
    }
    if me.train.is_empty() {
        return Err(Error::EmptyTrain("TE"));
    }
    if config.ti_wish.is_empty() || config.te_wish.is_empty() {
        return Err(Error::ShapeMismatch(
            "TI/TE wish lists must each hold at least one value".to_string(),
        ));
    }
    Ok(())
}

/// Reorder, reconstruct and fit one acquisition track.
fn fit_track(
    acq: &Acquisition,
    selection: &[usize],
    model: RelaxModel,
    backend: FitBackend,
) -> Result<MapSet, Error> {
    let stack = kspace::reorder(
        &acq.raw,
        acq.n_frames(),
        acq.train.len(),
        acq.scheme,
        selection,
    )?;
    let images = reconstruct_stack(&stack);
    calculate_maps(&images, &acq.train, model, backend)
}

/// Run the full pipeline: two validated acquisitions in, synthetic
/// images (and optionally the fitted map stacks) out.
///
/// Validation failures abort before any reconstruction or fitting; the
/// per-pixel fit never fails a run (see `fitting`).
pub fn run(
    config: &PipelineConfig,
    ir: &Acquisition,
    me: &Acquisition,
) -> Result<PipelineOutput, Error> {
    validate(config, ir, me)?;
    info!("recognized {} (TI) and {} (TE) acquisitions", IR_LAYOUT, ME_LAYOUT);

    info!("fitting T1 track: {} slices", config.slices_ir.len());
    let t1_fit = fit_track(ir, &config.slices_ir, RelaxModel::InversionRecovery, config.backend)?;

    info!("fitting T2 track: {} slices", config.slices_me.len());
    let t2_fit = fit_track(me, &config.slices_me, RelaxModel::EchoDecay, config.backend)?;

    let (ny, nx) = (t1_fit.relax[0].ny, t1_fit.relax[0].nx);
    if t2_fit.relax[0].ny != ny || t2_fit.relax[0].nx != nx {
        return Err(Error::ShapeMismatch(format!(
            "track image dimensions disagree: {}x{} (TI) vs {}x{} (TE)",
            ny, nx, t2_fit.relax[0].ny, t2_fit.relax[0].nx
        )));
    }

    // Mean equilibrium magnetization across the two tracks
    let mo_mean: Vec<Image> = t1_fit
        .mo
        .iter()
        .zip(t2_fit.mo.iter())
        .map(|(a, b)| {
            let mut m = Image::zeros(ny, nx);
            for idx in 0..ny * nx {
                m.data[idx] = 0.5 * (a.data[idx] + b.data[idx]);
            }
            m
        })
        .collect();

    info!(
        "synthesizing {} x {} x {} theoretical images",
        config.ti_wish.len(),
        config.te_wish.len(),
        mo_mean.len()
    );
    let images = synthesize(
        &config.ti_wish,
        &config.te_wish,
        &t1_fit.relax,
        &t2_fit.relax,
        &mo_mean,
        &t1_fit.c,
        &t2_fit.c,
        config.output_dir.as_deref(),
    )?;

    Ok(match config.return_maps {
        ReturnMaps::ImagesOnly => PipelineOutput {
            images,
            t1_maps: None,
            t2_maps: None,
            mo_maps: None,
        },
        ReturnMaps::ImagesAndMaps => PipelineOutput {
            images,
            t1_maps: Some(t1_fit.relax),
            t2_maps: Some(t2_fit.relax),
            mo_maps: Some(mo_mean),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_complex::Complex64;

    fn dummy_acq(layout: &str, ir: bool, scheme: ReorderScheme) -> Acquisition {
        let n_frames = 2;
        let (ny, nx) = (2, 2);
        let raw = RawSignalSet::new(
            vec![Complex64::new(1.0, 0.0); n_frames * ny * nx],
            n_frames * ny,
            nx,
        )
        .unwrap();
        Acquisition {
            raw,
            traces: if scheme == ReorderScheme::BlockInterleaved { 1 } else { 2 },
            train: vec![5.0, 20.0],
            scheme,
            layout: layout.to_string(),
            inversion_recovery: ir,
        }
    }

    fn config() -> PipelineConfig {
        PipelineConfig {
            slices_ir: vec![0],
            slices_me: vec![0],
            ti_wish: vec![100.0],
            te_wish: vec![10.0],
            output_dir: None,
            return_maps: ReturnMaps::ImagesOnly,
            backend: FitBackend::Sequential,
        }
    }

    #[test]
    fn test_validation_rejects_wrong_sequences() {
        let ir = dummy_acq("mems", false, ReorderScheme::BlockInterleaved);
        let me = dummy_acq("sems", true, ReorderScheme::Interleaved);
        let err = run(&config(), &ir, &me).unwrap_err();
        match err {
            Error::Validation(msg) => {
                // Both tracks reported distinctly
                assert!(msg.contains("TI track"), "missing TI diagnostic: {}", msg);
                assert!(msg.contains("TE track"), "missing TE diagnostic: {}", msg);
            }
            other => panic!("expected Validation, got {:?}", other),
        }
    }

    #[test]
    fn test_validation_rejects_unequal_selections() {
        let ir = dummy_acq(IR_LAYOUT, true, ReorderScheme::BlockInterleaved);
        let me = dummy_acq(ME_LAYOUT, false, ReorderScheme::Interleaved);
        let mut cfg = config();
        cfg.slices_me = vec![0, 1];
        assert!(matches!(
            run(&cfg, &ir, &me),
            Err(Error::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_parse_train_scales() {
        let train = parse_train(&["0.05", "0.5", "1.5"], 1000.0).unwrap();
        assert_eq!(train, vec![50.0, 500.0, 1500.0]);

        let err = parse_train(&["5", "abc"], 1.0).unwrap_err();
        assert!(matches!(err, Error::BadTrainValue { .. }));
    }

    #[test]
    fn test_n_frames_per_scheme() {
        let ir = dummy_acq(IR_LAYOUT, true, ReorderScheme::BlockInterleaved);
        assert_eq!(ir.n_frames(), 2); // traces(1) * timepoints(2)
        let me = dummy_acq(ME_LAYOUT, false, ReorderScheme::Interleaved);
        assert_eq!(me.n_frames(), 2); // traces alone
    }
}
