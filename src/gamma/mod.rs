use std::fmt;

use anyhow::bail;
use log::debug;
use statrs::distribution::{ContinuousCDF, Gamma};

use crate::Result;

/// Largest rate covered by the bins. The last bin ends here instead of at infinity so that the
/// inverse of the incomplete gamma function stays finite.
pub const MAX_RATE: f64 = 20.0;

const MAX_BISECTIONS: usize = 2000;
const BISECTION_TOLERANCE: f64 = 1e-15;

#[derive(Debug, Clone, PartialEq)]
pub enum GammaError {
    Alpha(f64),
    Beta(f64),
    Categories(usize),
}

impl fmt::Display for GammaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GammaError::Alpha(alpha) => write!(f, "alpha = {alpha} <= 0"),
            GammaError::Beta(beta) => write!(f, "beta = {beta} <= 0"),
            GammaError::Categories(k) => write!(f, "Too few categories: {k}"),
        }
    }
}

impl std::error::Error for GammaError {}

/// Discrete approximation of a Gamma(alpha, beta) distribution of rates with `K` categories of
/// equal probability mass.
///
/// Category `k` covers the rates between its lower and upper bound, every category holds
/// `1/K` of the mass of the distribution restricted to `[0, MAX_RATE]`. The rate that
/// represents a category is the mean of the distribution restricted to the category, computed
/// with the identity `r * f(r; alpha, beta) = alpha / beta * f(r; alpha + 1, beta)`.
///
/// # Example
/// ```
/// use phylo_rates::gamma::DiscreteGamma;
/// let gamma = DiscreteGamma::new(1.0, 1.0, 4).unwrap();
/// assert_eq!(gamma.rates().len(), 4);
/// assert!((gamma.rates()[2] - 1.0).abs() < 1e-6);
/// assert_eq!(gamma.probs(), &[0.25; 4]);
/// ```
#[derive(Debug, Clone)]
pub struct DiscreteGamma {
    alpha: f64,
    beta: f64,
    rates: Vec<f64>,
    probs: Vec<f64>,
    upper_bounds: Vec<f64>,
}

impl DiscreteGamma {
    pub fn new(alpha: f64, beta: f64, categories: usize) -> Result<Self> {
        if !(alpha > 0.0 && alpha.is_finite()) {
            bail!(GammaError::Alpha(alpha));
        }
        if !(beta > 0.0 && beta.is_finite()) {
            bail!(GammaError::Beta(beta));
        }
        if categories < 1 {
            bail!(GammaError::Categories(categories));
        }

        let shape = Gamma::new(alpha, 1.0)?;
        let shifted = Gamma::new(alpha + 1.0, 1.0)?;
        let max_x = beta * MAX_RATE;
        let max_prob = shape.cdf(max_x);
        let bin_prob = max_prob / categories as f64;

        let mut upper_bounds = (1..categories)
            .map(|k| inverse_cdf(&shape, k as f64 * bin_prob, max_x) / beta)
            .collect::<Vec<_>>();
        upper_bounds.push(MAX_RATE);

        let mut lower = 0.0;
        let mut rates = Vec::with_capacity(categories);
        for &upper in upper_bounds.iter() {
            let mass = shifted.cdf(upper * beta) - shifted.cdf(lower * beta);
            rates.push(alpha / beta * mass / bin_prob);
            lower = upper;
        }
        debug!("Discrete gamma alpha={alpha} beta={beta} rates: {rates:?}");

        Ok(Self {
            alpha,
            beta,
            rates,
            probs: vec![1.0 / categories as f64; categories],
            upper_bounds,
        })
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn beta(&self) -> f64 {
        self.beta
    }

    pub fn categories(&self) -> usize {
        self.rates.len()
    }

    /// Representative rate of each category, in increasing order.
    pub fn rates(&self) -> &[f64] {
        &self.rates
    }

    pub fn probs(&self) -> &[f64] {
        &self.probs
    }

    pub fn upper_bounds(&self) -> &[f64] {
        &self.upper_bounds
    }
}

/// Finds `x` in `[0, max_x]` with `cdf(x) = prob` by bisection.
fn inverse_cdf(distribution: &Gamma, prob: f64, max_x: f64) -> f64 {
    let (mut lo, mut hi) = (0.0, max_x);
    for _ in 0..MAX_BISECTIONS {
        let mid = 0.5 * (lo + hi);
        if mid <= lo || mid >= hi || hi - lo <= BISECTION_TOLERANCE * hi {
            break;
        }
        if distribution.cdf(mid) < prob {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    0.5 * (lo + hi)
}
