//! Bounded Levenberg-Marquardt solver
//!
//! Minimizes ||r(x)||² over a box lb ≤ x ≤ ub, with a numerical
//! forward-difference Jacobian and a hard cap on residual-function
//! evaluations. Steps are projected back onto the box, which is adequate
//! for the small (3-4 parameter) relaxation-model fits this crate runs
//! per pixel.
//!
//! Reference:
//! Madsen, Nielsen & Tingleff, "Methods for Non-Linear Least Squares
//! Problems", IMM DTU 2004.

/// The solver ran out of its function-evaluation budget (or hit a
/// degenerate system) before converging.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NoConvergence;

/// Solver tuning knobs
#[derive(Clone, Copy, Debug)]
pub struct LevMarOptions {
    /// Hard cap on residual evaluations (Jacobian columns included)
    pub max_feval: usize,
    /// Relative step-size tolerance
    pub xtol: f64,
    /// Relative cost-reduction tolerance
    pub ftol: f64,
}

impl Default for LevMarOptions {
    fn default() -> Self {
        Self {
            max_feval: 1000,
            xtol: 1e-8,
            ftol: 1e-8,
        }
    }
}

/// Bounded Levenberg-Marquardt least squares
///
/// # Arguments
/// * `residuals` - Closure computing the residual vector r(x)
/// * `x0` - Initial guess (clamped into the box before the first evaluation)
/// * `lower`, `upper` - Box bounds, one pair per parameter
/// * `opts` - Tolerances and evaluation budget
///
/// # Returns
/// The minimizing parameter vector, or [`NoConvergence`] if the budget is
/// exhausted first. The returned vector always satisfies the bounds.
pub fn levmar_fit<F>(
    residuals: F,
    x0: &[f64],
    lower: &[f64],
    upper: &[f64],
    opts: &LevMarOptions,
) -> Result<Vec<f64>, NoConvergence>
where
    F: Fn(&[f64]) -> Vec<f64>,
{
    let n = x0.len();
    debug_assert_eq!(lower.len(), n);
    debug_assert_eq!(upper.len(), n);

    let clamp = |x: &mut [f64]| {
        for i in 0..n {
            x[i] = x[i].max(lower[i]).min(upper[i]);
        }
    };

    let mut x = x0.to_vec();
    clamp(&mut x);

    let mut nfev = 0usize;
    let eval = |x: &[f64], nfev: &mut usize| -> Option<Vec<f64>> {
        if *nfev >= opts.max_feval {
            return None;
        }
        *nfev += 1;
        let r = residuals(x);
        if r.iter().all(|v| v.is_finite()) {
            Some(r)
        } else {
            None
        }
    };

    let mut r = eval(&x, &mut nfev).ok_or(NoConvergence)?;
    let m = r.len();
    let mut cost = dot(&r, &r);
    if cost == 0.0 {
        return Ok(x);
    }

    let mut lambda = 1e-3;
    let mut jac = vec![0.0; m * n];

    loop {
        // Forward-difference Jacobian, stepping inward at the upper bound
        for k in 0..n {
            let h = 1e-8 * x[k].abs().max(1.0);
            let mut xh = x.clone();
            let forward = x[k] + h <= upper[k];
            xh[k] = if forward { x[k] + h } else { x[k] - h };
            let rh = eval(&xh, &mut nfev).ok_or(NoConvergence)?;
            let sign = if forward { 1.0 } else { -1.0 };
            for i in 0..m {
                jac[i * n + k] = sign * (rh[i] - r[i]) / h;
            }
        }

        // Normal equations: (JᵀJ + λ diag(JᵀJ)) δ = -Jᵀr
        let mut jtj = vec![0.0; n * n];
        let mut jtr = vec![0.0; n];
        for i in 0..m {
            for a in 0..n {
                jtr[a] += jac[i * n + a] * r[i];
                for b in a..n {
                    jtj[a * n + b] += jac[i * n + a] * jac[i * n + b];
                }
            }
        }
        for a in 0..n {
            for b in 0..a {
                jtj[a * n + b] = jtj[b * n + a];
            }
        }

        // Inner loop: grow λ until a step reduces the cost
        loop {
            let mut aug = jtj.clone();
            for a in 0..n {
                // small floor keeps the system solvable when a column is flat
                aug[a * n + a] += lambda * jtj[a * n + a].max(1e-12);
            }
            let mut rhs: Vec<f64> = jtr.iter().map(|v| -v).collect();

            let Some(delta) = solve_dense(&mut aug, &mut rhs, n) else {
                return Err(NoConvergence);
            };

            let mut x_new = vec![0.0; n];
            for a in 0..n {
                x_new[a] = x[a] + delta[a];
            }
            clamp(&mut x_new);

            let step: f64 = (0..n).map(|a| (x_new[a] - x[a]).powi(2)).sum::<f64>().sqrt();
            let xnorm: f64 = dot(&x, &x).sqrt();

            match eval(&x_new, &mut nfev) {
                Some(r_new) => {
                    let cost_new = dot(&r_new, &r_new);
                    if cost_new < cost {
                        let reduction = cost - cost_new;
                        x = x_new;
                        r = r_new;
                        cost = cost_new;
                        lambda = (lambda * 0.1).max(1e-12);

                        if reduction <= opts.ftol * cost.max(opts.ftol)
                            || step <= opts.xtol * (xnorm + opts.xtol)
                        {
                            return Ok(x);
                        }
                        break; // recompute Jacobian at the new point
                    }

                    // Rejected step; a vanishing projected step means the
                    // solver is pinned (typically against the bounds).
                    if step <= opts.xtol * (xnorm + opts.xtol) {
                        return Ok(x);
                    }
                    lambda *= 10.0;
                    if lambda > 1e14 {
                        return Ok(x);
                    }
                }
                None => return Err(NoConvergence),
            }
        }
    }
}

#[inline]
fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Gaussian elimination with partial pivoting for the (tiny) n x n
/// normal-equation system. Returns None on a numerically singular pivot.
fn solve_dense(a: &mut [f64], b: &mut [f64], n: usize) -> Option<Vec<f64>> {
    for col in 0..n {
        let mut pivot = col;
        for row in col + 1..n {
            if a[row * n + col].abs() > a[pivot * n + col].abs() {
                pivot = row;
            }
        }
        if a[pivot * n + col].abs() < 1e-300 {
            return None;
        }
        if pivot != col {
            for k in 0..n {
                a.swap(col * n + k, pivot * n + k);
            }
            b.swap(col, pivot);
        }
        for row in col + 1..n {
            let factor = a[row * n + col] / a[col * n + col];
            for k in col..n {
                a[row * n + k] -= factor * a[col * n + k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for col in (0..n).rev() {
        let mut sum = b[col];
        for k in col + 1..n {
            sum -= a[col * n + k] * x[k];
        }
        x[col] = sum / a[col * n + col];
    }
    Some(x)
}
