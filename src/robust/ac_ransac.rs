//! A contrario RANSAC: the inlier threshold is not given but selected per model by minimizing
//! the number of false alarms (NFA) of the sorted residuals.

use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Model estimation problem seen by [`ac_ransac`].
pub trait AcRansacKernel: Sync {
    type Model: Clone + Send + Sync;

    /// Size of a minimal sample.
    const MINIMUM_SAMPLES: usize;
    /// Maximum number of models returned by one call of [`AcRansacKernel::fit`].
    const MAX_MODELS: usize;

    fn num_samples(&self) -> usize;
    fn fit(&self, sample: &[usize]) -> Vec<Self::Model>;
    /// Squared residual of datum `index`.
    fn error(&self, index: usize, model: &Self::Model) -> f64;
    /// log10 of the probability that a random datum has a residual below 1.
    fn log_alpha0(&self) -> f64;
    /// Exponent turning the residual into a probability scale (0.5 for squared distances).
    fn mult_error(&self) -> f64;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AcRansacOptions {
    pub max_iterations: usize,
    /// Upper bound on the selected threshold, in units of the square root of the kernel error.
    pub max_threshold: Option<f64>,
    pub seed: u64,
}

impl Default for AcRansacOptions {
    fn default() -> Self {
        AcRansacOptions {
            max_iterations: 256,
            max_threshold: None,
            seed: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AcRansacOutput<M> {
    pub model: M,
    pub inliers: Vec<usize>,
    /// Selected squared residual threshold.
    pub threshold: f64,
    pub log_nfa: f64,
    pub iterations: usize,
}

/// Best `(log_nfa, inlier count, threshold)` of one model.
#[derive(Debug, Clone, Copy)]
struct NfaScore {
    log_nfa: f64,
    k: usize,
    threshold: f64,
}

/// Best hypothesis seen so far, threaded through the trial loop.
#[derive(Debug, Clone)]
struct Best<M> {
    model: M,
    score: NfaScore,
    inliers: Vec<usize>,
}

/// `log10 C(n, k)` for `k = 0..=n`.
fn log_combi_n(n: usize) -> Vec<f64> {
    let mut l = vec![0.0; n + 1];
    for k in 1..=n {
        l[k] = l[k - 1] + ((n - k + 1) as f64).log10() - (k as f64).log10();
    }
    l
}

/// `log10 C(k, s)` for `k = 0..=n`, zero below `s`.
fn log_combi_k(s: usize, n: usize) -> Vec<f64> {
    let mut l = vec![0.0; n + 1];
    for k in (s + 1)..=n {
        l[k] = l[k - 1] + (k as f64).log10() - ((k - s) as f64).log10();
    }
    l
}

struct NfaTables {
    log_e0: f64,
    log_c_n: Vec<f64>,
    log_c_k: Vec<f64>,
}

impl NfaTables {
    fn new(n: usize, s: usize, max_models: usize) -> NfaTables {
        NfaTables {
            log_e0: ((max_models * (n - s)) as f64).log10(),
            log_c_n: log_combi_n(n),
            log_c_k: log_combi_k(s, n),
        }
    }

    /// Minimizes the NFA over the inlier count on residuals sorted ascending.
    fn best_nfa<K: AcRansacKernel>(&self, kernel: &K, sorted: &[(f64, usize)], max_threshold: f64) -> Option<NfaScore> {
        let s = K::MINIMUM_SAMPLES;
        let mut best: Option<NfaScore> = None;
        for k in (s + 1)..=sorted.len() {
            let err = sorted[k - 1].0;
            if !err.is_finite() || err > max_threshold {
                break;
            }
            let log_alpha = kernel.log_alpha0() + kernel.mult_error() * (err + f32::EPSILON as f64).log10();
            let log_nfa = self.log_e0 + log_alpha * (k - s) as f64 + self.log_c_n[k] + self.log_c_k[k];
            if best.is_none_or(|b| log_nfa < b.log_nfa) {
                best = Some(NfaScore {
                    log_nfa,
                    k,
                    threshold: err,
                });
            }
        }
        best
    }
}

/// Runs AC-RANSAC for at most `options.max_iterations` trials.
///
/// A tenth of the budget is kept in reserve. Once a meaningful model (log NFA < 0) is found,
/// samples are drawn only among its inliers and the reserve trials are the last ones run.
/// Returns `None` if no meaningful model exists.
pub fn ac_ransac<K: AcRansacKernel, R: Rng>(kernel: &K, options: &AcRansacOptions, rng: &mut R) -> Option<AcRansacOutput<K::Model>> {
    let n = kernel.num_samples();
    let s = K::MINIMUM_SAMPLES;
    if n <= s || options.max_iterations == 0 {
        return None;
    }
    let tables = NfaTables::new(n, s, K::MAX_MODELS);
    let max_threshold = options.max_threshold.map_or(f64::INFINITY, |t| t * t);

    let mut reserve = options.max_iterations / 10;
    let mut n_iter = options.max_iterations - reserve;
    let mut pool: Vec<usize> = (0..n).collect();
    let mut best: Option<Best<K::Model>> = None;
    let mut iter = 0;

    while iter < n_iter {
        let sample: Vec<usize> = rand::seq::index::sample(rng, pool.len(), s)
            .iter()
            .map(|p| pool[p])
            .collect();

        let mut improved = false;
        for model in kernel.fit(&sample) {
            let mut residuals: Vec<(f64, usize)> = (0..n)
                .into_par_iter()
                .map(|i| (kernel.error(i, &model), i))
                .collect();
            residuals.sort_by(|a, b| a.0.total_cmp(&b.0));

            let Some(score) = tables.best_nfa(kernel, &residuals, max_threshold) else {
                continue;
            };
            if best.as_ref().is_none_or(|b| score.log_nfa < b.score.log_nfa) {
                let inliers = residuals[..score.k].iter().map(|r| r.1).collect();
                best = Some(Best {
                    model,
                    score,
                    inliers,
                });
                improved = true;
            }
        }

        let meaningful = best.as_ref().is_some_and(|b| b.score.log_nfa < 0.0);
        if (improved && meaningful) || (iter + 1 == n_iter && reserve > 0) {
            match &best {
                None => {
                    // nothing fitted yet, spend the reserve as regular trials
                    n_iter += 1;
                    reserve -= 1;
                }
                Some(b) => {
                    pool = b.inliers.clone();
                    if reserve > 0 {
                        n_iter = iter + 1 + reserve;
                        reserve = 0;
                    }
                }
            }
        }
        iter += 1;
    }

    let best = best?;
    log::debug!(
        "ac-ransac: log10(nfa) {:.3}, {} inliers, threshold {:.4e} after {} trials",
        best.score.log_nfa,
        best.inliers.len(),
        best.score.threshold,
        iter
    );
    if best.score.log_nfa >= 0.0 {
        return None;
    }
    let mut inliers = best.inliers;
    inliers.sort_unstable();
    Some(AcRansacOutput {
        model: best.model,
        inliers,
        threshold: best.score.threshold,
        log_nfa: best.score.log_nfa,
        iterations: iter,
    })
}
