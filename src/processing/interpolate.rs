// src/processing/interpolate.rs

/// `n` evenly spaced points from `start` to `end`, both inclusive.
pub fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            let mut out: Vec<f64> = (0..n).map(|i| start + step * i as f64).collect();
            out[n - 1] = end;
            out
        }
    }
}

/// Linear interpolation of `(xp, fp)` at each `x`, extrapolating linearly from
/// the outermost segments. `xp` must be strictly monotonic in either direction.
pub fn interp_linear(x: &[f64], xp: &[f64], fp: &[f64]) -> Vec<f64> {
    if xp.is_empty() || xp.len() != fp.len() {
        return vec![f64::NAN; x.len()];
    }
    if xp.len() == 1 {
        return vec![fp[0]; x.len()];
    }
    let (xs, ys): (Vec<f64>, Vec<f64>) = if xp[1] < xp[0] {
        (xp.iter().rev().copied().collect(), fp.iter().rev().copied().collect())
    } else {
        (xp.to_vec(), fp.to_vec())
    };
    let last = xs.len() - 1;
    x.iter()
        .map(|&v| {
            // index of the segment [i, i+1] used for v
            let i = xs.partition_point(|&p| p <= v).saturating_sub(1).min(last - 1);
            let (x0, x1) = (xs[i], xs[i + 1]);
            let (y0, y1) = (ys[i], ys[i + 1]);
            y0 + (v - x0) * (y1 - y0) / (x1 - x0)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linspace_hits_both_endpoints() {
        let axis = linspace(796.0, 1119.0, 2048);
        assert_eq!(axis.len(), 2048);
        assert_eq!(axis[0], 796.0);
        assert_eq!(axis[2047], 1119.0);
        assert!(axis.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn interpolates_and_extrapolates() {
        let xp = [0.0, 1.0, 2.0];
        let fp = [0.0, 10.0, 30.0];
        let out = interp_linear(&[-1.0, 0.5, 1.0, 1.5, 3.0], &xp, &fp);
        assert_eq!(out, vec![-10.0, 5.0, 10.0, 20.0, 50.0]);
    }

    #[test]
    fn decreasing_source_axis() {
        let out = interp_linear(&[0.5, 1.5], &[2.0, 1.0, 0.0], &[30.0, 10.0, 0.0]);
        assert_eq!(out, vec![5.0, 20.0]);
    }
}
