//! Posterior summaries and MCMC convergence statistics.
//!
//! Inputs are per-chain draw sequences of one scalar quantity. Convergence
//! statistics follow the rank-normalised split-chain definitions (bulk and
//! tail effective sample size, split R-hat). Quantities that are undefined
//! for the input (too few draws, zero variance) are NaN.

use statrs::distribution::{ContinuousCDF, Normal};

/// Summary of one scalar parameter element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterSummary {
    pub mean: f64,
    pub sd: f64,
    pub hdi_low: f64,
    pub hdi_high: f64,
    pub mcse_mean: f64,
    pub ess_bulk: f64,
    pub ess_tail: f64,
    pub r_hat: f64,
}

/// Summarise a parameter from its chains.
pub fn summarize(chains: &[Vec<f64>], hdi_prob: f64) -> ParameterSummary {
    let pooled: Vec<f64> = chains.iter().flatten().copied().collect();
    let (mean, sd) = mean_sd(&pooled);
    let (hdi_low, hdi_high) = hdi(&pooled, hdi_prob);
    let ess_mean = ess_mean(chains);
    ParameterSummary {
        mean,
        sd,
        hdi_low,
        hdi_high,
        mcse_mean: sd / ess_mean.sqrt(),
        ess_bulk: ess_bulk(chains),
        ess_tail: ess_tail(chains),
        r_hat: rhat(chains),
    }
}

/// Mean and sample standard deviation (n - 1 denominator).
pub fn mean_sd(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (f64::NAN, f64::NAN);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if values.len() < 2 {
        return (mean, f64::NAN);
    }
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, var.sqrt())
}

/// Shortest interval containing `prob` of the draws.
pub fn hdi(values: &[f64], prob: f64) -> (f64, f64) {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if sorted.is_empty() {
        return (f64::NAN, f64::NAN);
    }
    sorted.sort_by(f64::total_cmp);
    let n = sorted.len();
    let inc = ((prob * n as f64).floor() as usize).min(n - 1);
    let n_intervals = n - inc;
    let mut best = 0;
    let mut best_width = f64::INFINITY;
    for i in 0..n_intervals {
        let width = sorted[i + inc] - sorted[i];
        if width < best_width {
            best_width = width;
            best = i;
        }
    }
    (sorted[best], sorted[best + inc])
}

/// Linear-interpolation quantile of unsorted values.
pub fn quantile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

/// Halve every chain, dropping the middle draw of odd-length chains.
pub fn split_chains(chains: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let mut out = Vec::with_capacity(chains.len() * 2);
    for chain in chains {
        let half = chain.len() / 2;
        out.push(chain[..half].to_vec());
        out.push(chain[chain.len() - half..].to_vec());
    }
    out
}

/// Replace draws by normal scores of their pooled average ranks.
pub fn rank_normalize(chains: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let pooled: Vec<f64> = chains.iter().flatten().copied().collect();
    let ranks = average_ranks(&pooled);
    let size = pooled.len() as f64;
    let normal = Normal::new(0.0, 1.0).ok();
    let scores: Vec<f64> = ranks
        .iter()
        .map(|r| {
            let p = (r - 0.375) / (size + 0.25);
            normal.as_ref().map_or(f64::NAN, |d| d.inverse_cdf(p))
        })
        .collect();
    let mut out = Vec::with_capacity(chains.len());
    let mut offset = 0;
    for chain in chains {
        out.push(scores[offset..offset + chain.len()].to_vec());
        offset += chain.len();
    }
    out
}

fn average_ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|a, b| values[*a].total_cmp(&values[*b]));
    let mut ranks = vec![0.0; values.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && values[order[j + 1]] == values[order[i]] {
            j += 1;
        }
        let avg = (i + j) as f64 / 2.0 + 1.0;
        for k in i..=j {
            ranks[order[k]] = avg;
        }
        i = j + 1;
    }
    ranks
}

fn is_degenerate(chains: &[Vec<f64>]) -> bool {
    let mut iter = chains.iter().flatten();
    let Some(first) = iter.next() else {
        return true;
    };
    chains.iter().any(|c| c.len() < 4)
        || iter.all(|v| v == first)
        || chains.iter().flatten().any(|v| !v.is_finite())
}

/// Rank-normalised split R-hat (maximum of bulk and folded versions).
pub fn rhat(chains: &[Vec<f64>]) -> f64 {
    if is_degenerate(chains) {
        return f64::NAN;
    }
    let split = split_chains(chains);
    let bulk = rhat_raw(&rank_normalize(&split));
    let pooled: Vec<f64> = split.iter().flatten().copied().collect();
    let median = quantile(&pooled, 0.5);
    let folded: Vec<Vec<f64>> = split
        .iter()
        .map(|c| c.iter().map(|v| (v - median).abs()).collect())
        .collect();
    let tail = rhat_raw(&rank_normalize(&folded));
    bulk.max(tail)
}

fn rhat_raw(chains: &[Vec<f64>]) -> f64 {
    let n = chains.first().map_or(0, Vec::len);
    if chains.len() < 2 || n < 2 {
        return f64::NAN;
    }
    let stats: Vec<(f64, f64)> = chains.iter().map(|c| mean_sd(c)).collect();
    let means: Vec<f64> = stats.iter().map(|s| s.0).collect();
    let within = stats.iter().map(|s| s.1 * s.1).sum::<f64>() / stats.len() as f64;
    let (_, sd_means) = mean_sd(&means);
    let between = n as f64 * sd_means * sd_means;
    if within <= 0.0 {
        return f64::NAN;
    }
    let n = n as f64;
    let var_hat = (n - 1.0) / n * within + between / n;
    (var_hat / within).sqrt()
}

/// Bulk effective sample size.
pub fn ess_bulk(chains: &[Vec<f64>]) -> f64 {
    if is_degenerate(chains) {
        return f64::NAN;
    }
    ess_raw(&rank_normalize(&split_chains(chains)))
}

/// Tail effective sample size: the smaller of the 5% and 95% quantile ESS.
pub fn ess_tail(chains: &[Vec<f64>]) -> f64 {
    if is_degenerate(chains) {
        return f64::NAN;
    }
    let split = split_chains(chains);
    let pooled: Vec<f64> = split.iter().flatten().copied().collect();
    let mut out = f64::INFINITY;
    for q in [0.05, 0.95] {
        let cut = quantile(&pooled, q);
        let indicator: Vec<Vec<f64>> = split
            .iter()
            .map(|c| c.iter().map(|v| if *v <= cut { 1.0 } else { 0.0 }).collect())
            .collect();
        out = out.min(ess_raw(&indicator));
    }
    out
}

/// Effective sample size of the mean (split chains, no rank transform).
pub fn ess_mean(chains: &[Vec<f64>]) -> f64 {
    if is_degenerate(chains) {
        return f64::NAN;
    }
    ess_raw(&split_chains(chains))
}

/// Geyer initial-monotone-sequence ESS over equal-length chains.
fn ess_raw(chains: &[Vec<f64>]) -> f64 {
    let m = chains.len();
    let n = chains.first().map_or(0, Vec::len);
    if m == 0 || n < 4 || chains.iter().any(|c| c.len() != n) {
        return f64::NAN;
    }
    let nf = n as f64;
    let means: Vec<f64> = chains.iter().map(|c| c.iter().sum::<f64>() / nf).collect();
    let acov = |lag: usize| -> f64 {
        chains
            .iter()
            .zip(&means)
            .map(|(c, mu)| {
                (0..n - lag)
                    .map(|i| (c[i] - mu) * (c[i + lag] - mu))
                    .sum::<f64>()
                    / nf
            })
            .sum::<f64>()
            / m as f64
    };
    let mean_var = acov(0) * nf / (nf - 1.0);
    let mut var_plus = mean_var * (nf - 1.0) / nf;
    if m > 1 {
        let (_, sd_means) = mean_sd(&means);
        var_plus += sd_means * sd_means;
    }
    if var_plus.is_nan() || var_plus <= 0.0 {
        return f64::NAN;
    }

    let mut rho = vec![0.0; n];
    rho[0] = 1.0;
    let mut rho_even = 1.0;
    let mut rho_odd = 1.0 - (mean_var - acov(1)) / var_plus;
    rho[1] = rho_odd;
    let mut t = 1;
    while t < n - 3 && rho_even + rho_odd > 0.0 {
        rho_even = 1.0 - (mean_var - acov(t + 1)) / var_plus;
        rho_odd = 1.0 - (mean_var - acov(t + 2)) / var_plus;
        if rho_even + rho_odd >= 0.0 {
            rho[t + 1] = rho_even;
            rho[t + 2] = rho_odd;
        }
        t += 2;
    }
    let max_t = t.saturating_sub(2);
    if rho_even > 0.0 {
        rho[max_t + 1] = rho_even;
    }

    // initial monotone sequence
    let mut t = 1;
    while t + 2 <= max_t {
        if rho[t + 1] + rho[t + 2] > rho[t - 1] + rho[t] {
            rho[t + 1] = (rho[t - 1] + rho[t]) / 2.0;
            rho[t + 2] = rho[t + 1];
        }
        t += 2;
    }

    let total = (m * n) as f64;
    let tau = -1.0 + 2.0 * rho[..=max_t].iter().sum::<f64>() + rho[max_t + 1];
    let tau = tau.max(1.0 / total.log10());
    total / tau
}
