// src/processing/baseline.rs
// 非对称最小二乘 (ASLS) 基线估计
use log::{debug, warn};
use ndarray::Array1;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AslsParams {
    pub lambda: f64,
    pub p: f64,
    pub max_iter: usize,
    pub tol: f64,
}

impl Default for AslsParams {
    fn default() -> Self {
        Self {
            lambda: 1e6,
            p: 0.01,
            max_iter: 50,
            tol: 1e-3,
        }
    }
}

/// Symmetric pentadiagonal matrix `W + λ·DᵀD` held as three bands.
struct Pentadiagonal {
    diag: Vec<f64>,
    off1: Vec<f64>,
    off2: Vec<f64>,
}

impl Pentadiagonal {
    /// `λ·DᵀD` for the second-difference operator `D`.
    fn second_difference_penalty(n: usize, lambda: f64) -> Self {
        let mut m = Self {
            diag: vec![0.0; n],
            off1: vec![0.0; n.saturating_sub(1)],
            off2: vec![0.0; n.saturating_sub(2)],
        };
        let stencil = [1.0, -2.0, 1.0];
        for r in 0..n.saturating_sub(2) {
            for a in 0..3 {
                m.diag[r + a] += lambda * stencil[a] * stencil[a];
                for b in a + 1..3 {
                    let v = lambda * stencil[a] * stencil[b];
                    match b - a {
                        1 => m.off1[r + a] += v,
                        _ => m.off2[r + a] += v,
                    }
                }
            }
        }
        m
    }

    /// Banded Cholesky solve of `(self + diag(w)) · z = rhs`.
    fn solve_with_weights(&self, w: &Array1<f64>, rhs: &Array1<f64>) -> Option<Array1<f64>> {
        let n = rhs.len();
        let mut l0 = vec![0.0; n];
        let mut l1 = vec![0.0; n];
        let mut l2 = vec![0.0; n];
        for i in 0..n {
            if i >= 2 {
                l2[i] = self.off2[i - 2] / l0[i - 2];
            }
            if i >= 1 {
                l1[i] = (self.off1[i - 1] - l2[i] * l1[i - 1]) / l0[i - 1];
            }
            let d = self.diag[i] + w[i] - l1[i] * l1[i] - l2[i] * l2[i];
            if !(d > 0.0) {
                return None;
            }
            l0[i] = d.sqrt();
        }
        let mut y = Array1::zeros(n);
        for i in 0..n {
            let mut acc = rhs[i];
            if i >= 1 {
                acc -= l1[i] * y[i - 1];
            }
            if i >= 2 {
                acc -= l2[i] * y[i - 2];
            }
            y[i] = acc / l0[i];
        }
        let mut z = Array1::zeros(n);
        for i in (0..n).rev() {
            let mut acc = y[i];
            if i + 1 < n {
                acc -= l1[i + 1] * z[i + 1];
            }
            if i + 2 < n {
                acc -= l2[i + 2] * z[i + 2];
            }
            z[i] = acc / l0[i];
        }
        Some(z)
    }
}

/// Estimates the baseline of `y`. Points above the current estimate get
/// weight `p`, points below `1 − p`; iteration stops once the relative
/// weight change drops under `tol`.
pub fn asls_baseline(y: &[f64], params: &AslsParams) -> Option<Vec<f64>> {
    let n = y.len();
    if n < 3 {
        return Some(y.to_vec());
    }
    let penalty = Pentadiagonal::second_difference_penalty(n, params.lambda);
    let y = Array1::from(y.to_vec());
    let mut w = Array1::from_elem(n, 1.0);
    let mut baseline = y.clone();
    for iteration in 0..params.max_iter.max(1) {
        baseline = penalty.solve_with_weights(&w, &(&w * &y))?;
        let next = y
            .iter()
            .zip(baseline.iter())
            .map(|(v, z)| if v > z { params.p } else { 1.0 - params.p })
            .collect::<Array1<f64>>();
        let change = (&next - &w).mapv(|d| d * d).sum().sqrt();
        let norm = w.mapv(|v| v * v).sum().sqrt().max(f64::EPSILON);
        w = next;
        if change / norm < params.tol {
            debug!("asls converged after {} iterations", iteration + 1);
            break;
        }
    }
    Some(baseline.to_vec())
}

/// `y − baseline(y)`; leaves `y` untouched when the solve breaks down.
pub fn remove_baseline(y: &[f64], params: &AslsParams) -> Vec<f64> {
    match asls_baseline(y, params) {
        Some(baseline) => y.iter().zip(baseline).map(|(v, b)| v - b).collect(),
        None => {
            warn!("baseline estimation failed; intensities left unchanged");
            y.to_vec()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn penalty_bands_match_second_difference() {
        let m = Pentadiagonal::second_difference_penalty(6, 1.0);
        assert_eq!(m.diag, vec![1.0, 5.0, 6.0, 6.0, 5.0, 1.0]);
        assert_eq!(m.off1, vec![-2.0, -4.0, -4.0, -4.0, -2.0]);
        assert_eq!(m.off2, vec![1.0; 4]);
    }

    #[test]
    fn zero_penalty_solve_returns_input() {
        let m = Pentadiagonal::second_difference_penalty(5, 0.0);
        let w = Array1::from_elem(5, 2.0);
        let rhs = Array1::from(vec![2.0, 4.0, 6.0, 8.0, 10.0]);
        let z = m.solve_with_weights(&w, &rhs).unwrap();
        for (got, want) in z.iter().zip([1.0, 2.0, 3.0, 4.0, 5.0]) {
            assert!((got - want).abs() < 1e-12, "{got} != {want}");
        }
    }

    #[test]
    fn removes_sloped_background_under_peak() {
        let n = 400;
        let y: Vec<f64> = (0..n)
            .map(|i| {
                let x = i as f64;
                let background = 50.0 + 0.2 * x;
                let z = (x - 200.0) / 5.0;
                background + 100.0 * (-0.5 * z * z).exp()
            })
            .collect();
        let corrected = remove_baseline(&y, &AslsParams::default());
        assert!(corrected[200] > 80.0);
        assert!(corrected[20].abs() < 10.0);
        assert!(corrected[380].abs() < 10.0);
    }
}
