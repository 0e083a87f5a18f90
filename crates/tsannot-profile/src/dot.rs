//! Sliding dot products

use realfft::RealFftPlanner;
use tsannot_core::{Error, Result};

/// Above this `n * m` the FFT path is cheaper than the direct sum
const FFT_THRESHOLD: usize = 256 * 1024;

/// Dot product of `q` with every length-`q.len()` window of `ts`
pub fn sliding_dot_product(q: &[f64], ts: &[f64]) -> Result<Vec<f64>> {
    if q.is_empty() || ts.len() < q.len() {
        return Err(Error::window(
            q.len(),
            ts.len(),
            "query must be non-empty and no longer than the series",
        ));
    }
    if ts.len() * q.len() > FFT_THRESHOLD {
        sliding_dot_product_fft(q, ts)
    } else {
        Ok(sliding_dot_product_naive(q, ts))
    }
}

pub fn sliding_dot_product_naive(q: &[f64], ts: &[f64]) -> Vec<f64> {
    let m = q.len();
    let n_subs = ts.len() + 1 - m;
    (0..n_subs)
        .map(|i| q.iter().zip(&ts[i..i + m]).map(|(a, b)| a * b).sum())
        .collect()
}

/// Convolution through a zero-padded real FFT
pub fn sliding_dot_product_fft(q: &[f64], ts: &[f64]) -> Result<Vec<f64>> {
    let m = q.len();
    let n = ts.len();
    let n_subs = n + 1 - m;
    let fft_len = (n + m - 1).next_power_of_two();

    let mut planner = RealFftPlanner::<f64>::new();
    let forward = planner.plan_fft_forward(fft_len);
    let inverse = planner.plan_fft_inverse(fft_len);

    let mut q_padded = vec![0.0; fft_len];
    for (dst, src) in q_padded.iter_mut().zip(q.iter().rev()) {
        *dst = *src;
    }
    let mut ts_padded = vec![0.0; fft_len];
    ts_padded[..n].copy_from_slice(ts);

    let fft_err = |e: realfft::FftError| Error::Computation(format!("FFT failed: {e}"));

    let mut q_spectrum = forward.make_output_vec();
    let mut ts_spectrum = forward.make_output_vec();
    forward.process(&mut q_padded, &mut q_spectrum).map_err(fft_err)?;
    forward.process(&mut ts_padded, &mut ts_spectrum).map_err(fft_err)?;

    for (qv, tv) in q_spectrum.iter_mut().zip(ts_spectrum.iter()) {
        *qv *= tv;
    }
    // DC and Nyquist bins of a real signal are real
    if let Some(first) = q_spectrum.first_mut() {
        first.im = 0.0;
    }
    if let Some(last) = q_spectrum.last_mut() {
        last.im = 0.0;
    }

    let mut out = inverse.make_output_vec();
    inverse.process(&mut q_spectrum, &mut out).map_err(fft_err)?;

    let norm = 1.0 / fft_len as f64;
    Ok(out[m - 1..m - 1 + n_subs].iter().map(|&x| x * norm).collect())
}
