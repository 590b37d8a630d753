//! Conjugate gradient least squares (CGLS).
//!
//! Minimizes ‖A x − b‖² by running conjugate gradient on the normal equations
//! Aᵀ A x = Aᵀ b without ever forming Aᵀ A. The iterate starts at zero, so
//! unknowns no row touches stay at zero.

use log::{debug, trace, warn};

use super::{SolverError, SparseMatrix};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverSettings {
    pub max_iterations: usize,
    /// Stop once ‖Aᵀ(b − A x)‖ ≤ tolerance · ‖Aᵀ b‖.
    pub tolerance: f32,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            max_iterations: 10_000,
            tolerance: 0.01,
        }
    }
}

/// Outcome of a solve. Hitting the iteration cap is reported here, not as an error.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolveReport {
    pub iterations: usize,
    pub relative_residual: f64,
    pub converged: bool,
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

pub fn solve_least_squares(
    a: &SparseMatrix,
    b: &[f32],
    settings: &SolverSettings,
) -> Result<(Vec<f32>, SolveReport), SolverError> {
    if b.len() != a.rows() {
        return Err(SolverError::DimensionMismatch {
            what: "least squares target",
            expected: a.rows(),
            got: b.len(),
        });
    }

    let n = a.cols();
    let mut x = vec![0.0f64; n];
    let mut r: Vec<f64> = b.iter().map(|&v| v as f64).collect();
    let mut s = vec![0.0f64; n];
    let mut q = vec![0.0f64; a.rows()];

    a.mul_transpose_vec(&r, &mut s)?;

    let mut p = s.clone();
    let mut gamma = dot(&s, &s);
    let norm0 = gamma.sqrt();
    let threshold = settings.tolerance as f64 * norm0;

    let mut report = SolveReport {
        iterations: 0,
        relative_residual: 0.0,
        converged: true,
    };

    if norm0 == 0.0 {
        debug!("least squares: right-hand side is orthogonal to the column space");
        return Ok((vec![0.0; n], report));
    }

    report.converged = false;
    report.relative_residual = 1.0;
    while report.iterations < settings.max_iterations {
        a.mul_vec(&p, &mut q)?;
        let delta = dot(&q, &q);
        if delta == 0.0 {
            break;
        }

        let alpha = gamma / delta;
        x.iter_mut().zip(p.iter()).for_each(|(xv, pv)| *xv += alpha * pv);
        r.iter_mut().zip(q.iter()).for_each(|(rv, qv)| *rv -= alpha * qv);

        a.mul_transpose_vec(&r, &mut s)?;
        let gamma_new = dot(&s, &s);
        report.iterations += 1;
        report.relative_residual = gamma_new.sqrt() / norm0;

        if report.iterations % 100 == 0 {
            trace!(
                "cgls iteration {}: relative residual {:.6}",
                report.iterations,
                report.relative_residual
            );
        }

        if gamma_new.sqrt() <= threshold {
            report.converged = true;
            break;
        }

        let beta = gamma_new / gamma;
        p.iter_mut().zip(s.iter()).for_each(|(pv, sv)| *pv = sv + beta * *pv);
        gamma = gamma_new;
    }

    if report.converged {
        debug!(
            "cgls converged after {} iterations (relative residual {:.6})",
            report.iterations, report.relative_residual
        );
    } else {
        warn!(
            "cgls stopped after {} iterations without reaching tolerance {} (relative residual {:.6})",
            report.iterations, settings.tolerance, report.relative_residual
        );
    }

    Ok((x.into_iter().map(|v| v as f32).collect(), report))
}
