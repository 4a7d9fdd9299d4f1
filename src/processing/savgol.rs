// src/processing/savgol.rs
// Savitzky-Golay 平滑，边缘用窗口内多项式插值
use ndarray::Array1;

use crate::error::ConfigError;
use crate::processing::linalg::{least_squares, solve, vandermonde};

/// Checks a window/order pair against a spectrum of `len` samples.
pub fn validate(window: usize, poly_order: usize, len: usize) -> Result<(), ConfigError> {
    if window == 0 || window % 2 == 0 {
        return Err(ConfigError::EvenWindow(window));
    }
    if poly_order >= window {
        return Err(ConfigError::PolyOrderTooLarge { window, poly_order });
    }
    if window > len {
        return Err(ConfigError::WindowTooLong { window, len });
    }
    Ok(())
}

/// Convolution weights that evaluate the local fit at the window centre.
fn centre_weights(window: usize, poly_order: usize) -> Option<Vec<f64>> {
    let half = (window / 2) as f64;
    let t: Vec<f64> = (0..window).map(|i| i as f64 - half).collect();
    let a = vandermonde(&t, poly_order);
    let mut e0 = Array1::zeros(poly_order + 1);
    e0[0] = 1.0;
    let x = solve(a.t().dot(&a), e0)?;
    Some(a.dot(&x).to_vec())
}

fn eval_low_first(coeffs: &[f64], t: f64) -> f64 {
    coeffs.iter().rev().fold(0.0, |acc, c| acc * t + c)
}

/// Smooths `y`. The first and last `window / 2` samples come from a
/// polynomial fitted over the first and last full window.
pub fn savgol_filter(y: &[f64], window: usize, poly_order: usize) -> Result<Vec<f64>, ConfigError> {
    validate(window, poly_order, y.len())?;
    if window == 1 {
        return Ok(y.to_vec());
    }
    let weights = centre_weights(window, poly_order).ok_or(ConfigError::PolyOrderTooLarge { window, poly_order })?;
    let n = y.len();
    let half = window / 2;
    let mut out = y.to_vec();
    for i in half..n - half {
        out[i] = weights
            .iter()
            .zip(&y[i - half..=i + half])
            .map(|(w, v)| w * v)
            .sum();
    }

    let t: Vec<f64> = (0..window).map(|i| i as f64).collect();
    let ok = || ConfigError::PolyOrderTooLarge { window, poly_order };
    let head = least_squares(&t, &y[..window], poly_order).ok_or_else(ok)?;
    for (i, slot) in out.iter_mut().take(half).enumerate() {
        *slot = eval_low_first(&head, i as f64);
    }
    let tail = least_squares(&t, &y[n - window..], poly_order).ok_or_else(ok)?;
    for k in 0..half {
        let idx = n - half + k;
        out[idx] = eval_low_first(&tail, (window - half + k) as f64);
    }
    Ok(out)
}
