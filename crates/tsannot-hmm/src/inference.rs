//! Log-space forward-backward and Viterbi recursions
//!
//! All tables are indexed `[t][state]`. Emission log-likelihoods `log_b`
//! are computed by the caller, so the recursions are shared by every
//! emission family and by [`crate::FixedHmm`].

use tsannot_core::math::{logsumexp, safe_ln};
use tsannot_core::utils::argmax;
use tsannot_core::{Error, Result};

/// Posterior quantities of one E-step
#[derive(Debug, Clone)]
pub(crate) struct Posterior {
    /// `gamma[t][k] = P(z_t = k | x)`
    pub gamma: Vec<Vec<f64>>,
    /// `xi_sum[i][j] = Σ_t P(z_t = i, z_{t+1} = j | x)`
    pub xi_sum: Vec<Vec<f64>>,
    pub log_likelihood: f64,
}

/// Most likely state path
#[derive(Debug, Clone, PartialEq)]
pub struct ViterbiPath {
    pub labels: Vec<usize>,
    /// Log-probability of the path jointly with the observations
    pub log_prob: f64,
    /// `false` when every path has zero probability; `labels` then follow
    /// state 0 back-pointers and carry no information
    pub feasible: bool,
}

pub(crate) fn ln_matrix(m: &[Vec<f64>]) -> Vec<Vec<f64>> {
    m.iter()
        .map(|row| row.iter().map(|&p| safe_ln(p)).collect())
        .collect()
}

pub(crate) fn forward(log_start: &[f64], log_trans: &[Vec<f64>], log_b: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let k = log_start.len();
    let mut alpha: Vec<Vec<f64>> = Vec::with_capacity(log_b.len());
    alpha.push(log_start.iter().zip(&log_b[0]).map(|(s, b)| s + b).collect());

    let mut scratch = vec![0.0; k];
    for b in &log_b[1..] {
        let prev = &alpha[alpha.len() - 1];
        let row = (0..k)
            .map(|j| {
                for (i, s) in scratch.iter_mut().enumerate() {
                    *s = prev[i] + log_trans[i][j];
                }
                logsumexp(&scratch) + b[j]
            })
            .collect();
        alpha.push(row);
    }
    alpha
}

pub(crate) fn backward(log_trans: &[Vec<f64>], log_b: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let t_len = log_b.len();
    let k = log_trans.len();
    let mut beta = vec![vec![0.0; k]; t_len];
    let mut scratch = vec![0.0; k];
    for t in (0..t_len.saturating_sub(1)).rev() {
        for i in 0..k {
            for (j, s) in scratch.iter_mut().enumerate() {
                *s = log_trans[i][j] + log_b[t + 1][j] + beta[t + 1][j];
            }
            beta[t][i] = logsumexp(&scratch);
        }
    }
    beta
}

/// Forward-backward pass producing state and transition posteriors
pub(crate) fn posterior(start: &[f64], transitions: &[Vec<f64>], log_b: &[Vec<f64>]) -> Result<Posterior> {
    let log_start: Vec<f64> = start.iter().map(|&p| safe_ln(p)).collect();
    let log_trans = ln_matrix(transitions);
    let alpha = forward(&log_start, &log_trans, log_b);
    let beta = backward(&log_trans, log_b);

    let log_likelihood = logsumexp(&alpha[alpha.len() - 1]);
    if !log_likelihood.is_finite() {
        return Err(Error::Computation(
            "observation sequence has zero likelihood under the model".to_string(),
        ));
    }

    let gamma: Vec<Vec<f64>> = alpha
        .iter()
        .zip(&beta)
        .map(|(a, b)| {
            a.iter()
                .zip(b)
                .map(|(x, y)| (x + y - log_likelihood).exp())
                .collect()
        })
        .collect();

    let k = start.len();
    let mut xi_sum = vec![vec![0.0; k]; k];
    for t in 0..log_b.len().saturating_sub(1) {
        for i in 0..k {
            if alpha[t][i] == f64::NEG_INFINITY {
                continue;
            }
            for j in 0..k {
                let log_xi = alpha[t][i] + log_trans[i][j] + log_b[t + 1][j] + beta[t + 1][j]
                    - log_likelihood;
                xi_sum[i][j] += log_xi.exp();
            }
        }
    }

    Ok(Posterior {
        gamma,
        xi_sum,
        log_likelihood,
    })
}

/// Log-likelihood of the observations, `-inf` if impossible
pub(crate) fn log_likelihood(start: &[f64], transitions: &[Vec<f64>], log_b: &[Vec<f64>]) -> f64 {
    let log_start: Vec<f64> = start.iter().map(|&p| safe_ln(p)).collect();
    let alpha = forward(&log_start, &ln_matrix(transitions), log_b);
    logsumexp(&alpha[alpha.len() - 1])
}

/// Viterbi decoding; ties go to the lowest state index
pub(crate) fn viterbi(log_start: &[f64], log_trans: &[Vec<f64>], log_b: &[Vec<f64>]) -> ViterbiPath {
    let t_len = log_b.len();
    let k = log_start.len();

    let mut delta: Vec<f64> = log_start.iter().zip(&log_b[0]).map(|(s, b)| s + b).collect();
    let mut back = vec![vec![0usize; k]; t_len];
    let mut next = vec![0.0; k];

    for t in 1..t_len {
        for j in 0..k {
            let mut best = (0, f64::NEG_INFINITY);
            for (i, &d) in delta.iter().enumerate() {
                let v = d + log_trans[i][j];
                if v > best.1 {
                    best = (i, v);
                }
            }
            back[t][j] = best.0;
            next[j] = best.1 + log_b[t][j];
        }
        std::mem::swap(&mut delta, &mut next);
    }

    let last = argmax(&delta).unwrap_or(0);
    let log_prob = delta.get(last).copied().unwrap_or(f64::NEG_INFINITY);

    let mut labels = vec![0; t_len];
    labels[t_len - 1] = last;
    for t in (1..t_len).rev() {
        labels[t - 1] = back[t][labels[t]];
    }

    ViterbiPath {
        labels,
        log_prob,
        feasible: log_prob > f64::NEG_INFINITY,
    }
}
