// src/processing/linalg.rs
// 小型稠密线性代数：最小二乘多项式拟合
use ndarray::{Array1, Array2};

const PIVOT_EPS: f64 = 1e-12;

/// Solves `a · x = b` by Gaussian elimination with partial pivoting.
/// Returns `None` for a singular (or numerically singular) system.
pub fn solve(mut a: Array2<f64>, mut b: Array1<f64>) -> Option<Array1<f64>> {
    let n = b.len();
    if a.nrows() != n || a.ncols() != n {
        return None;
    }
    let scale = a.iter().fold(0.0f64, |m, v| m.max(v.abs())).max(1.0);
    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| a[[i, col]].abs().total_cmp(&a[[j, col]].abs()))?;
        if a[[pivot, col]].abs() <= PIVOT_EPS * scale {
            return None;
        }
        if pivot != col {
            for k in 0..n {
                a.swap([pivot, k], [col, k]);
            }
            b.swap(pivot, col);
        }
        for row in col + 1..n {
            let factor = a[[row, col]] / a[[col, col]];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[[row, k]] -= factor * a[[col, k]];
            }
            b[row] -= factor * b[col];
        }
    }
    let mut x = Array1::zeros(n);
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[[row, k]] * x[k]).sum();
        x[row] = (b[row] - tail) / a[[row, row]];
    }
    x.iter().all(|v: &f64| v.is_finite()).then_some(x)
}

/// Vandermonde design matrix, columns `t^0 .. t^degree`.
pub fn vandermonde(t: &[f64], degree: usize) -> Array2<f64> {
    Array2::from_shape_fn((t.len(), degree + 1), |(i, j)| t[i].powi(j as i32))
}

/// Least-squares coefficients (lowest power first) of `y ≈ Σ c_j t^j`
/// via the normal equations.
pub fn least_squares(t: &[f64], y: &[f64], degree: usize) -> Option<Vec<f64>> {
    if t.len() != y.len() || t.len() <= degree {
        return None;
    }
    let a = vandermonde(t, degree);
    let ata = a.t().dot(&a);
    let aty = a.t().dot(&Array1::from(y.to_vec()));
    solve(ata, aty).map(|c| c.to_vec())
}

/// Polynomial fit in the style of `polyfit`: coefficients highest power first.
///
/// The abscissae are centred and scaled before solving and the result is
/// expanded back, which keeps the normal equations well conditioned for
/// axis values in the thousands.
pub fn polyfit(x: &[f64], y: &[f64], degree: usize) -> Option<Vec<f64>> {
    if x.is_empty() {
        return None;
    }
    let mean = x.iter().sum::<f64>() / x.len() as f64;
    let spread = x.iter().fold(0.0f64, |m, v| m.max((v - mean).abs()));
    let scale = if spread > 0.0 { spread } else { 1.0 };
    let t: Vec<f64> = x.iter().map(|v| (v - mean) / scale).collect();
    let scaled = least_squares(&t, y, degree)?;

    // Horner expansion of Σ c_j ((x - mean) / scale)^j, lowest power first.
    let mut out = vec![0.0; degree + 1];
    for &c in scaled.iter().rev() {
        let mut next = vec![0.0; degree + 1];
        for (k, &v) in out.iter().enumerate() {
            if k < degree {
                next[k + 1] += v / scale;
            }
            next[k] -= v * mean / scale;
        }
        next[0] += c;
        out = next;
    }
    out.reverse();
    out.iter().all(|v| v.is_finite()).then_some(out)
}

/// Evaluates highest-power-first coefficients at `x`.
pub fn polyval(coeffs: &[f64], x: f64) -> f64 {
    coeffs.iter().fold(0.0, |acc, c| acc * x + c)
}
