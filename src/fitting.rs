//! Relaxation signal models and per-pixel curve fitting
//!
//! Two model families are supported:
//! - inversion recovery: SI(TI) = |Mo * (1 - a * exp(-TI/T1)) + C|,
//!   with the inversion efficiency `a` fitted freely near 2
//! - spin-echo decay: SI(TE) = Mo * exp(-TE/T2) + C
//!
//! Parameter boxes are recomputed per pixel from that pixel's own peak
//! signal, and a fit that fails (budget exhausted, degenerate system, or
//! a signal with no measurable amplitude) degrades to a fixed sentinel
//! instead of raising, so map assembly never sees a hole.
//!
//! The inversion-recovery model is overparameterized: the curve depends
//! only on T1 and the combinations Mo + C and Mo * a, so noiseless data
//! pins T1 but not Mo, C and a individually. Any least-squares solution
//! on that manifold is a valid fit; the bounds keep Mo, C and a near
//! their physical ranges, and downstream synthesis is insensitive to the
//! split because it uses the fixed ideal efficiency of 2.

use crate::solvers::{levmar_fit, LevMarOptions};

/// Residual-evaluation cap per pixel
pub const MAX_FEVAL: usize = 1000;

/// Sentinel relaxation time for unfittable pixels ("no measurable signal")
pub const FALLBACK_RELAX_TIME: f64 = 1e-6;

/// Which relaxation curve a track fits
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelaxModel {
    /// T1 via inversion recovery; parameters (T1, Mo, C, a)
    InversionRecovery,
    /// T2 via spin-echo decay; parameters (T2, Mo, C)
    EchoDecay,
}

impl RelaxModel {
    pub fn n_params(&self) -> usize {
        match self {
            RelaxModel::InversionRecovery => 4,
            RelaxModel::EchoDecay => 3,
        }
    }

    /// Signal intensity at timepoint `t` (TI or TE, ms) for parameters `p`
    #[inline]
    pub fn evaluate(&self, t: f64, p: &[f64]) -> f64 {
        match self {
            RelaxModel::InversionRecovery => {
                (p[1] * (1.0 - p[3] * (-t / p[0]).exp()) + p[2]).abs()
            }
            RelaxModel::EchoDecay => p[1] * (-t / p[0]).exp() + p[2],
        }
    }

    /// Per-pixel parameter box, derived from the pixel's peak signal:
    /// Mo in [0.9 max, 2 max + 1], C in ±(max/100 + 1), T1 in
    /// (0.001, 7000], T2 in (0.001, 4000], and a in [1.85, 2.05].
    fn bounds(&self, smax: f64) -> (Vec<f64>, Vec<f64>) {
        let mo_lo = 0.9 * smax;
        let mo_hi = 2.0 * smax + 1.0;
        let c_hi = smax / 100.0 + 1.0;
        match self {
            RelaxModel::InversionRecovery => (
                vec![0.001, mo_lo, -c_hi, 1.85],
                vec![7000.0, mo_hi, c_hi, 2.05],
            ),
            RelaxModel::EchoDecay => (vec![0.001, mo_lo, -c_hi], vec![4000.0, mo_hi, c_hi]),
        }
    }

    fn initial_guess(&self, train: &[f64], smax: f64) -> Vec<f64> {
        let t_mid = train.iter().sum::<f64>() / train.len() as f64;
        match self {
            RelaxModel::InversionRecovery => vec![t_mid, smax, 0.0, 2.0],
            RelaxModel::EchoDecay => vec![t_mid, smax, 0.0],
        }
    }

    /// Degenerate parameters returned when fitting is impossible:
    /// near-zero relaxation time, Mo pinned to the observed peak, no
    /// offset, ideal inversion.
    pub fn sentinel(&self, smax: f64) -> Vec<f64> {
        match self {
            RelaxModel::InversionRecovery => vec![FALLBACK_RELAX_TIME, smax, 0.0, 2.0],
            RelaxModel::EchoDecay => vec![FALLBACK_RELAX_TIME, smax, 0.0],
        }
    }
}

/// Fit one pixel's signal-vs-timepoint curve.
///
/// # Arguments
/// * `model` - Curve family to fit
/// * `train` - TI or TE values (ms), one per timepoint
/// * `signal` - Observed magnitudes at this pixel, same length as `train`
///
/// # Returns
/// Fitted parameters (T, Mo, C[, a]) inside the model's box; the sentinel
/// on any failure. Never panics for equal-length, finite inputs.
pub fn fit_pixel(model: RelaxModel, train: &[f64], signal: &[f64]) -> Vec<f64> {
    debug_assert_eq!(train.len(), signal.len());

    let smax = signal.iter().cloned().fold(0.0_f64, f64::max);
    if smax <= 0.0 || !smax.is_finite() {
        return model.sentinel(smax.max(0.0));
    }

    let (lower, upper) = model.bounds(smax);
    let x0 = model.initial_guess(train, smax);
    let opts = LevMarOptions {
        max_feval: MAX_FEVAL,
        ..Default::default()
    };

    let residuals = |p: &[f64]| -> Vec<f64> {
        train
            .iter()
            .zip(signal.iter())
            .map(|(&t, &y)| model.evaluate(t, p) - y)
            .collect()
    };

    match levmar_fit(residuals, &x0, &lower, &upper, &opts) {
        Ok(params) => params,
        Err(_) => model.sentinel(smax),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synth_signal(model: RelaxModel, train: &[f64], p: &[f64]) -> Vec<f64> {
        train.iter().map(|&t| model.evaluate(t, p)).collect()
    }

    #[test]
    fn test_t1_ground_truth_recovery() {
        let train = [50.0, 200.0, 500.0, 1000.0, 1500.0, 3000.0];
        let truth = [800.0, 1000.0, 3.0, 2.0];
        let signal = synth_signal(RelaxModel::InversionRecovery, &train, &truth);

        let fit = fit_pixel(RelaxModel::InversionRecovery, &train, &signal);

        // Mo, C and a are only identifiable through Mo + C and Mo * a
        // (see module docs), so assert T1 pointwise and the combinations.
        let rel_t1 = (fit[0] - truth[0]).abs() / truth[0];
        assert!(rel_t1 < 1e-2, "T1: got {}, want {}", fit[0], truth[0]);

        let (got_sum, want_sum) = (fit[1] + fit[2], truth[1] + truth[2]);
        let rel_sum = (got_sum - want_sum).abs() / want_sum;
        assert!(rel_sum < 1e-2, "Mo + C: got {}, want {}", got_sum, want_sum);

        let (got_prod, want_prod) = (fit[1] * fit[3], truth[1] * truth[3]);
        let rel_prod = (got_prod - want_prod).abs() / want_prod;
        assert!(
            rel_prod < 1e-2,
            "Mo * a: got {}, want {}",
            got_prod,
            want_prod
        );

        // The fitted parameters must reproduce the observed curve
        for (&t, &y) in train.iter().zip(signal.iter()) {
            let y_fit = RelaxModel::InversionRecovery.evaluate(t, &fit);
            assert!(
                (y_fit - y).abs() / y.abs().max(1.0) < 1e-2,
                "curve mismatch at TI {}: {} vs {}",
                t,
                y_fit,
                y
            );
        }
    }

    #[test]
    fn test_t2_ground_truth_recovery() {
        let train = [5.0, 10.0, 20.0, 40.0, 80.0, 160.0];
        let truth = [80.0, 1500.0, 10.0];
        let signal = synth_signal(RelaxModel::EchoDecay, &train, &truth);

        let fit = fit_pixel(RelaxModel::EchoDecay, &train, &signal);
        for (i, (&got, &want)) in fit.iter().zip(truth.iter()).enumerate() {
            let rel = (got - want).abs() / want.abs().max(10.0);
            assert!(rel < 1e-2, "param {}: got {}, want {}", i, got, want);
        }
    }

    #[test]
    fn test_all_zero_signal_falls_back_to_sentinel() {
        let train = [5.0, 20.0, 80.0];
        let signal = [0.0, 0.0, 0.0];

        let fit = fit_pixel(RelaxModel::EchoDecay, &train, &signal);
        assert_eq!(fit, vec![FALLBACK_RELAX_TIME, 0.0, 0.0]);

        let fit = fit_pixel(RelaxModel::InversionRecovery, &train, &signal);
        assert_eq!(fit, vec![FALLBACK_RELAX_TIME, 0.0, 0.0, 2.0]);
    }

    #[test]
    fn test_fit_respects_bounds_on_perturbed_signal() {
        // Model-shaped signal with deterministic perturbations on top
        let train = [50.0, 500.0, 1500.0, 2500.0];
        let truth = [600.0, 100.0, 0.5, 1.95];
        let noise = [1.0, -1.0, 0.5, -0.5];
        let signal: Vec<f64> = synth_signal(RelaxModel::InversionRecovery, &train, &truth)
            .iter()
            .zip(noise.iter())
            .map(|(&y, &n)| (y + n).max(0.0))
            .collect();
        let smax = signal.iter().cloned().fold(0.0_f64, f64::max);

        let fit = fit_pixel(RelaxModel::InversionRecovery, &train, &signal);
        if fit == RelaxModel::InversionRecovery.sentinel(smax) {
            // Budget exhaustion is a legal outcome; the sentinel is the
            // documented degenerate answer
            return;
        }
        assert!(fit[0] >= 0.001 && fit[0] <= 7000.0, "T1: {}", fit[0]);
        assert!(
            fit[1] >= 0.9 * smax && fit[1] <= 2.0 * smax + 1.0,
            "Mo: {}",
            fit[1]
        );
        assert!(fit[2].abs() <= smax / 100.0 + 1.0, "C: {}", fit[2]);
        assert!(fit[3] >= 1.85 && fit[3] <= 2.05, "a: {}", fit[3]);
    }

    #[test]
    fn test_fit_never_panics_on_nonfinite_signal() {
        let train = [5.0, 20.0, 80.0];
        let signal = [f64::NAN, 10.0, 5.0];
        let fit = fit_pixel(RelaxModel::EchoDecay, &train, &signal);
        assert_eq!(fit.len(), 3);
    }
}
