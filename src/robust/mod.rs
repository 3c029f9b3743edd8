extern crate rand;

use log::debug;
use rand::seq::SliceRandom;

use crate::Float;

pub mod kernels;

/**
 * One estimation problem: a minimal solver, a per-correspondence error and
 * the normalization bracket around both. Stateless with respect to the
 * estimator; owns only the (optionally normalized) correspondence arrays.
 */
pub trait Kernel {
    type Model: Clone;

    /// Minimal sample size of the wrapped solver.
    fn minimum_samples(&self) -> usize;
    /// Upper bound on models returned by one fit call.
    fn max_models(&self) -> usize;
    /// Number of correspondences.
    fn num_samples(&self) -> usize;
    /// Candidate models from a minimal sample (0..max_models entries).
    fn fit(&self, sample: &[usize]) -> Vec<Self::Model>;
    /// Squared residual of one correspondence in the kernel's working frame.
    fn error(&self, index: usize, model: &Self::Model) -> Float;
    /// Meaningfulness constant making the NFA invariant to image size and
    /// error type (point-to-line vs point-to-point).
    fn log_alpha0(&self) -> Float;
    /// 0.5 for point-to-line errors, 1.0 for point-to-point.
    fn mult_error(&self) -> Float;
    /// Maps a model from the working frame back to pixel/world coordinates.
    fn unnormalize(&self, model: &Self::Model) -> Self::Model;
    /// Maps a squared working-frame error to a pixel distance.
    fn unnormalize_error(&self, squared_error: Float) -> Float;
    /// Scale mapping a squared pixel precision into the working frame.
    fn threshold_scale(&self) -> Float;
}

/**
 * Outcome of one a-contrario estimation. A missing model (and empty inlier
 * list) is the normal representation of statistical failure, not an error.
 */
#[derive(Debug, Clone)]
pub struct AcResult<M> {
    pub model: Option<M>,
    pub inliers: Vec<usize>,
    /// Pixel-frame error threshold implied by the best inlier count.
    pub threshold: Float,
    pub nfa: Float
}

impl<M> AcResult<M> {
    fn failure() -> AcResult<M> {
        AcResult{model: None, inliers: Vec::new(), threshold: 0.0, nfa: crate::float::INFINITY}
    }

    pub fn found(&self) -> bool {
        self.model.is_some()
    }
}

fn log_combi(k: usize, n: usize) -> Float {
    if k >= n || k == 0 {
        return 0.0;
    }
    let k = k.min(n - k);
    let mut r = 0.0;
    let mut n_i = n as Float;
    for i in 1..=k {
        r += n_i.log10() - (i as Float).log10();
        n_i -= 1.0;
    }
    r
}

/// log10 C(n,k) for all k in 0..=n.
fn make_log_combi_n(n: usize) -> Vec<Float> {
    (0..=n).map(|k| log_combi(k, n)).collect::<Vec<Float>>()
}

/// log10 C(i,k) for all i in 0..=n, fixed k.
fn make_log_combi_k(k: usize, n: usize) -> Vec<Float> {
    (0..=n).map(|i| log_combi(k, i)).collect::<Vec<Float>>()
}

/**
 * Scans the sorted residual list for the inlier count k minimizing
 * NFA(k) = loge0 + logalpha(e_k)*(k - sample_size) + log C(n,k) + log C(k,sample_size).
 * Only residuals below max_threshold participate; ties keep the first
 * (lowest-k) minimum.
 */
fn best_nfa(
    sample_size: usize,
    log_alpha0: Float,
    sorted_residuals: &[(Float, usize)],
    loge0: Float,
    max_threshold: Float,
    logc_n: &[Float],
    logc_k: &[Float],
    mult_error: Float
) -> (Float, usize) {
    let n = sorted_residuals.len();
    let mut best = (crate::float::INFINITY, sample_size);
    let mut k = sample_size + 1;
    while k <= n && sorted_residuals[k - 1].0 <= max_threshold {
        let log_alpha = log_alpha0 + mult_error * (sorted_residuals[k - 1].0 + crate::float::EPSILON).log10();
        let nfa = loge0 + log_alpha * ((k - sample_size) as Float) + logc_n[k] + logc_k[k];
        if nfa < best.0 {
            best = (nfa, k);
        }
        k += 1;
    }
    best
}

/**
 * A-contrario RANSAC. Draws uniform minimal samples from the active index
 * pool, scores every candidate model by its best NFA over the sorted
 * residuals and keeps the most meaningful one. Once a model with NFA < 0
 * exists (or on the reserved final 10% of iterations when none was found)
 * sampling narrows to the current best inlier set. A run where no
 * configuration reached NFA < 0 reports an empty inlier set.
 *
 * precision, when given, is an upper bound on the pixel error a correspondence
 * may have and still count as inlier.
 */
pub fn acransac<K: Kernel>(kernel: &K, max_iterations: usize, precision: Option<Float>) -> AcResult<K::Model> {
    let sample_size = kernel.minimum_samples();
    let n = kernel.num_samples();
    if n <= sample_size {
        return AcResult::failure();
    }

    let max_threshold = match precision {
        Some(p) => p * p * kernel.threshold_scale(),
        None => crate::float::INFINITY
    };

    let logc_n = make_log_combi_n(n);
    let logc_k = make_log_combi_k(sample_size, n);
    let loge0 = ((kernel.max_models() * (n - sample_size)) as Float).log10();

    let mut pool = (0..n).collect::<Vec<usize>>();
    let mut residuals = vec![(0.0 as Float, 0usize); n];

    let mut min_nfa = crate::float::INFINITY;
    let mut best_model: Option<K::Model> = None;
    let mut inliers = Vec::<usize>::new();
    let mut error_max = crate::float::INFINITY;

    let mut rng = rand::thread_rng();
    let mut iterations = max_iterations.max(1);
    let mut reserve = iterations / 10;
    iterations -= reserve;

    let mut iter = 0;
    while iter < iterations {
        let sample = pool.choose_multiple(&mut rng, sample_size).copied().collect::<Vec<usize>>();
        let models = kernel.fit(&sample);

        let mut better = false;
        for model in &models {
            for i in 0..n {
                residuals[i] = (kernel.error(i, model), i);
            }
            residuals.sort_unstable_by(|a, b| a.0.partial_cmp(&b.0).expect("acransac: residual not comparable"));

            let (nfa, k_best) = best_nfa(sample_size, kernel.log_alpha0(), &residuals, loge0, max_threshold, &logc_n, &logc_k, kernel.mult_error());
            if nfa < min_nfa {
                better = true;
                min_nfa = nfa;
                inliers = residuals[0..k_best].iter().map(|&(_, i)| i).collect::<Vec<usize>>();
                error_max = residuals[k_best - 1].0;
                best_model = Some(model.clone());
            }
        }

        // Refocus sampling on the best inlier set; a run that never found
        // anything spends its reserve widening the search instead.
        if (better && min_nfa < 0.0) || (iter + 1 == iterations && reserve > 0) {
            if inliers.is_empty() {
                iterations += 1;
                reserve -= 1;
            } else {
                pool = inliers.clone();
                if reserve > 0 {
                    iterations = iter + 1 + reserve;
                    reserve = 0;
                }
            }
        }
        iter += 1;
    }

    if min_nfa >= 0.0 {
        debug!("acransac: no meaningful model over {} correspondences", n);
        return AcResult::failure();
    }

    let model = best_model.map(|m| kernel.unnormalize(&m));
    let threshold = kernel.unnormalize_error(error_max);
    debug!("acransac: nfa {:.2}, {} of {} inliers, threshold {:.3}", min_nfa, inliers.len(), n, threshold);
    AcResult{model, inliers, threshold, nfa: min_nfa}
}
