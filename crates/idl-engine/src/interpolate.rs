// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use idl_core::{IdealizeError, TraceView};

/// Upsampled trace produced by [`interpolate`].
#[derive(Clone, Debug, PartialEq)]
pub struct Resampled {
    pub signal: Vec<f64>,
    pub time: Vec<f64>,
}

/// Resamples a trace with a natural cubic spline onto `(N - 1) * factor + 1`
/// points, keeping every original sample.
pub fn interpolate(trace: &TraceView<'_>, factor: usize) -> Result<Resampled, IdealizeError> {
    if factor == 0 {
        return Err(IdealizeError::invalid_input(
            "interpolation_factor must be >= 1; got 0",
        ));
    }
    if factor == 1 || trace.len() < 2 {
        return Ok(Resampled {
            signal: trace.signal.to_vec(),
            time: trace.time.to_vec(),
        });
    }

    let x = trace.time;
    let y = trace.signal;
    let second = natural_second_derivatives(x, y);

    let n_out = (x.len() - 1) * factor + 1;
    let mut signal = Vec::with_capacity(n_out);
    let mut time = Vec::with_capacity(n_out);
    for i in 0..x.len() - 1 {
        let h = x[i + 1] - x[i];
        for step in 0..factor {
            let t = x[i] + h * step as f64 / factor as f64;
            let a = x[i + 1] - t;
            let b = t - x[i];
            let value = second[i] * a * a * a / (6.0 * h)
                + second[i + 1] * b * b * b / (6.0 * h)
                + (y[i] / h - second[i] * h / 6.0) * a
                + (y[i + 1] / h - second[i + 1] * h / 6.0) * b;
            time.push(t);
            signal.push(if step == 0 { y[i] } else { value });
        }
    }
    time.push(x[x.len() - 1]);
    signal.push(y[y.len() - 1]);

    Ok(Resampled { signal, time })
}

/// Second derivatives at the knots with zero curvature at both ends,
/// solved with the Thomas algorithm.
fn natural_second_derivatives(x: &[f64], y: &[f64]) -> Vec<f64> {
    let n = x.len();
    let mut second = vec![0.0; n];
    if n < 3 {
        return second;
    }

    let interior = n - 2;
    let mut diag = vec![0.0; interior];
    let mut upper = vec![0.0; interior];
    let mut rhs = vec![0.0; interior];
    for row in 0..interior {
        let i = row + 1;
        let h_prev = x[i] - x[i - 1];
        let h_next = x[i + 1] - x[i];
        diag[row] = 2.0 * (h_prev + h_next);
        upper[row] = h_next;
        rhs[row] = 6.0 * ((y[i + 1] - y[i]) / h_next - (y[i] - y[i - 1]) / h_prev);
    }

    // Forward sweep; the sub-diagonal entry of row r is h_prev of knot r + 1.
    for row in 1..interior {
        let lower = x[row + 1] - x[row];
        let w = lower / diag[row - 1];
        diag[row] -= w * upper[row - 1];
        rhs[row] -= w * rhs[row - 1];
    }

    second[interior] = rhs[interior - 1] / diag[interior - 1];
    for row in (0..interior - 1).rev() {
        second[row + 1] = (rhs[row] - upper[row] * second[row + 2]) / diag[row];
    }
    second
}

#[cfg(test)]
mod tests {
    use super::interpolate;
    use idl_core::TraceView;

    #[test]
    fn factor_one_is_identity() {
        let signal = [0.0, 2.0, 1.0];
        let time = [0.0, 1.0, 2.0];
        let trace = TraceView::new(&signal, &time).expect("trace");
        let out = interpolate(&trace, 1).expect("interpolate");
        assert_eq!(out.signal, signal.to_vec());
        assert_eq!(out.time, time.to_vec());
    }

    #[test]
    fn output_length_and_knots_are_preserved() {
        let signal = [0.0, 1.0, 0.0, -1.0, 0.0];
        let time = [0.0, 0.1, 0.2, 0.3, 0.4];
        let trace = TraceView::new(&signal, &time).expect("trace");
        let out = interpolate(&trace, 4).expect("interpolate");

        assert_eq!(out.signal.len(), 17);
        assert_eq!(out.time.len(), 17);
        for (k, &v) in signal.iter().enumerate() {
            assert_eq!(out.signal[k * 4], v);
        }
        assert!(out.time.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn linear_data_stays_linear() {
        let signal = [1.0, 3.0, 5.0, 7.0];
        let time = [0.0, 1.0, 2.0, 3.0];
        let trace = TraceView::new(&signal, &time).expect("trace");
        let out = interpolate(&trace, 2).expect("interpolate");
        for (&t, &v) in out.time.iter().zip(&out.signal) {
            assert!((v - (1.0 + 2.0 * t)).abs() < 1e-12, "t={t} v={v}");
        }
    }

    #[test]
    fn matches_hand_computed_spline_midpoint() {
        // Knots (0,0), (1,1), (2,0): M1 = -3, so S(0.5) = 0.6875.
        let signal = [0.0, 1.0, 0.0];
        let time = [0.0, 1.0, 2.0];
        let trace = TraceView::new(&signal, &time).expect("trace");
        let out = interpolate(&trace, 2).expect("interpolate");
        assert!((out.signal[1] - 0.6875).abs() < 1e-12);
        assert!((out.signal[3] - 0.6875).abs() < 1e-12);
    }

    #[test]
    fn zero_factor_is_rejected() {
        let trace = TraceView::new(&[1.0, 2.0], &[0.0, 1.0]).expect("trace");
        assert!(interpolate(&trace, 0).is_err());
    }
}
