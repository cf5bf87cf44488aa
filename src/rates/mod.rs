use std::fmt;

use anyhow::bail;
use log::{debug, info, warn};

use crate::gamma::DiscreteGamma;
use crate::likelihood::{column_log_likelihood, TransitionCache};
use crate::phylo_info::PhyloInfo;
use crate::substitution_models::SubstitutionModel;
use crate::Result;

/// Estimates of alpha above this value are treated as an alignment with a constant rate.
pub const MAX_ALPHA: f64 = 40.0;
/// Change in log marginal likelihood below which EM stops.
pub const EM_CONVERGENCE: f64 = 100.0;
/// Rate of columns with at most one informative residue, the prior mean for alpha = beta.
pub const FALLBACK_RATE: f64 = 1.0;
pub const DEFAULT_CATEGORIES: usize = 16;
pub const DEFAULT_MAX_ITERATIONS: usize = 100;

#[derive(Debug, Clone, PartialEq)]
pub enum EstimatorError {
    Alpha(f64),
    Categories(usize),
}

impl fmt::Display for EstimatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EstimatorError::Alpha(alpha) => write!(
                f,
                "alpha must be 0 (estimate) or in (0, {MAX_ALPHA}), got {alpha}"
            ),
            EstimatorError::Categories(k) => {
                write!(f, "At least 2 rate categories are needed, got {k}")
            }
        }
    }
}

impl std::error::Error for EstimatorError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Alpha was given, rates come from a single E-step.
    FixedAlpha,
    /// The log marginal likelihood changed by less than [`EM_CONVERGENCE`].
    Converged,
    /// The estimate of alpha went above [`MAX_ALPHA`].
    AlphaCeiling,
    /// Fewer than two columns could be used to estimate alpha.
    TooFewInformativeColumns,
    IterationCap,
    TooFewSequences,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            StopReason::FixedAlpha => "fixed alpha",
            StopReason::Converged => "converged",
            StopReason::AlphaCeiling => "alpha above ceiling",
            StopReason::TooFewInformativeColumns => "too few informative columns",
            StopReason::IterationCap => "iteration cap reached",
            StopReason::TooFewSequences => "too few sequences",
        };
        write!(f, "{reason}")
    }
}

/// Outcome of [`RateEstimator::estimate`].
#[derive(Debug, Clone, PartialEq)]
pub struct RateEstimates {
    /// Posterior mean rate of every column.
    pub rates: Vec<f64>,
    /// Alpha (= beta) of the prior the rates were computed with.
    pub alpha: f64,
    pub log_marginal: f64,
    /// Number of E-steps run.
    pub iterations: usize,
    pub stop: StopReason,
}

impl RateEstimates {
    /// Conservation score of every column, the negated posterior mean rate, so higher scores
    /// mean more conserved columns.
    pub fn scores(&self) -> Vec<f64> {
        self.rates.iter().map(|rate| -rate).collect()
    }
}

/// Result of one E-step under a fixed prior.
struct EStep {
    rates: Vec<f64>,
    log_marginal: f64,
    alpha_estimate: Option<f64>,
}

/// Empirical Bayes estimator of per column evolutionary rates with a discrete gamma prior.
///
/// Every column gets the posterior mean of its rate given the tree and the substitution
/// model. Unless alpha is fixed, the shape of the prior is refitted with EM: alpha (= beta) is
/// re-estimated as one over the variance of the posterior means until the log marginal
/// likelihood of the alignment settles.
///
/// # Example
/// ```
/// use phylo_rates::alignment::Alignment;
/// use phylo_rates::phylo_info::PhyloInfo;
/// use phylo_rates::rates::{RateEstimator, StopReason};
/// use phylo_rates::substitution_models::SubstitutionModel;
/// use phylo_rates::{record_wo_desc as record, tree};
/// let msa = Alignment::new(vec![
///     record!("A", b"AAW-"),
///     record!("B", b"ARY-"),
///     record!("C", b"ANV-"),
///     record!("D", b"ADCL"),
/// ])
/// .unwrap();
/// let info = PhyloInfo::new(msa, tree!("((A:0.1,B:0.2):0.1,(C:0.3,D:0.1):0.2);")).unwrap();
/// let estimator = RateEstimator::new(SubstitutionModel::poisson().unwrap(), 1.0, 8).unwrap();
/// let estimates = estimator.estimate(&info).unwrap();
/// assert_eq!(estimates.stop, StopReason::FixedAlpha);
/// assert!(estimates.rates[0] < estimates.rates[2]);
/// assert_eq!(estimates.rates[3], 1.0);
/// ```
#[derive(Debug, Clone)]
pub struct RateEstimator {
    model: SubstitutionModel,
    alpha: f64,
    categories: usize,
    max_iterations: usize,
}

impl RateEstimator {
    /// Creates an estimator. `alpha == 0.0` estimates alpha from the data starting at
    /// alpha = beta = 1, any other value in `(0, MAX_ALPHA)` fixes the prior.
    pub fn new(model: SubstitutionModel, alpha: f64, categories: usize) -> Result<Self> {
        if !(0.0..MAX_ALPHA).contains(&alpha) {
            bail!(EstimatorError::Alpha(alpha));
        }
        if categories < 2 {
            bail!(EstimatorError::Categories(categories));
        }
        Ok(Self {
            model,
            alpha,
            categories,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        })
    }

    /// Caps the number of E-steps of the empirical Bayes loop, at least one is always run.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    pub fn model(&self) -> &SubstitutionModel {
        &self.model
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn categories(&self) -> usize {
        self.categories
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    fn fixed_alpha(&self) -> bool {
        self.alpha != 0.0
    }

    /// Runs [`RateEstimator::estimate`] and returns [`RateEstimates::scores`].
    pub fn score(&self, info: &PhyloInfo) -> Result<Vec<f64>> {
        Ok(self.estimate(info)?.scores())
    }

    pub fn estimate(&self, info: &PhyloInfo) -> Result<RateEstimates> {
        let initial_alpha = if self.fixed_alpha() { self.alpha } else { 1.0 };
        if info.msa.seq_count() < 2 {
            warn!("Fewer than 2 sequences, every column gets rate {FALLBACK_RATE}");
            return Ok(RateEstimates {
                rates: vec![FALLBACK_RATE; info.msa_length()],
                alpha: initial_alpha,
                log_marginal: 0.0,
                iterations: 0,
                stop: StopReason::TooFewSequences,
            });
        }

        let mut alpha = initial_alpha;
        let mut step = self.e_step(info, alpha)?;
        let mut iterations = 1;
        if self.fixed_alpha() {
            return Ok(step.finish(alpha, iterations, StopReason::FixedAlpha));
        }

        let mut prev_log_marginal: Option<f64> = None;
        let stop = loop {
            let Some(alpha_estimate) = step.alpha_estimate else {
                break StopReason::TooFewInformativeColumns;
            };
            if alpha_estimate.is_nan() || alpha_estimate > MAX_ALPHA {
                break StopReason::AlphaCeiling;
            }
            if let Some(prev) = prev_log_marginal {
                if (step.log_marginal - prev).abs() <= EM_CONVERGENCE {
                    break StopReason::Converged;
                }
            }
            if iterations >= self.max_iterations {
                break StopReason::IterationCap;
            }
            prev_log_marginal = Some(step.log_marginal);
            alpha = alpha_estimate;
            step = self.e_step(info, alpha)?;
            iterations += 1;
        };

        match stop {
            StopReason::AlphaCeiling => warn!(
                "Alpha estimate went above {MAX_ALPHA}, keeping the rates for alpha = {alpha}"
            ),
            StopReason::IterationCap => {
                warn!("Stopped after {iterations} EM iterations without converging")
            }
            StopReason::TooFewInformativeColumns => {
                warn!("Too few informative columns to estimate alpha")
            }
            _ => (),
        }
        info!("Rate estimation finished after {iterations} iteration(s): {stop}, alpha = {alpha}");
        Ok(step.finish(alpha, iterations, stop))
    }

    /// Posterior mean rates of all columns under a Gamma(alpha, alpha) prior, with the total log
    /// marginal likelihood of the informative columns and the next estimate of alpha.
    fn e_step(&self, info: &PhyloInfo, alpha: f64) -> Result<EStep> {
        let prior = DiscreteGamma::new(alpha, alpha, self.categories)?;
        let cache = TransitionCache::new(&info.tree, prior.rates(), &self.model)?;

        let mut rates = Vec::with_capacity(info.msa_length());
        let mut sample = Vec::with_capacity(info.msa_length());
        let mut log_marginal = 0.0;
        for site in 0..info.msa_length() {
            let posterior = if info.msa.informative_count(site) > 1 {
                column_posterior(info, &cache, &info.msa.column(site))
            } else {
                None
            };
            match posterior {
                Some((rate, column_log_marginal)) => {
                    sample.push(rate);
                    log_marginal += column_log_marginal;
                    rates.push(rate);
                }
                None => rates.push(FALLBACK_RATE),
            }
        }

        let alpha_estimate = if sample.len() < 2 {
            None
        } else {
            Some(1.0 / variance(&sample))
        };
        debug!(
            "E-step with alpha = {alpha}: log marginal {log_marginal}, {} informative columns, next alpha {alpha_estimate:?}",
            sample.len()
        );
        Ok(EStep {
            rates,
            log_marginal,
            alpha_estimate,
        })
    }
}

impl EStep {
    fn finish(self, alpha: f64, iterations: usize, stop: StopReason) -> RateEstimates {
        RateEstimates {
            rates: self.rates,
            alpha,
            log_marginal: self.log_marginal,
            iterations,
            stop,
        }
    }
}

/// Posterior mean rate of a column and the log of its summed likelihood over all categories.
/// The prior weights of the categories are equal, so they cancel in the mean.
///
/// None if the column has no likelihood at any rate, which happens when informative leaves
/// disagree across zero length branches.
fn column_posterior(
    info: &PhyloInfo,
    cache: &TransitionCache,
    column: &[u8],
) -> Option<(f64, f64)> {
    let log_likelihoods = (0..cache.rates().len())
        .map(|rate_idx| column_log_likelihood(info, cache, rate_idx, column))
        .collect::<Option<Vec<_>>>()?;
    let max = log_likelihoods
        .iter()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        warn!("Column has zero likelihood at every rate, using the fallback rate");
        return None;
    }
    let weights = log_likelihoods
        .iter()
        .map(|logl| (logl - max).exp())
        .collect::<Vec<_>>();
    let total = weights.iter().sum::<f64>();
    let mean = cache
        .rates()
        .iter()
        .zip(weights.iter())
        .map(|(rate, weight)| rate * weight)
        .sum::<f64>()
        / total;
    Some((mean, max + total.ln()))
}

/// Population variance.
fn variance(sample: &[f64]) -> f64 {
    let n = sample.len() as f64;
    let mean = sample.iter().sum::<f64>() / n;
    sample.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n
}

#[cfg(test)]
#[cfg_attr(coverage, coverage(off))]
mod tests;
