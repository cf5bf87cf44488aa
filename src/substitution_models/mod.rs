use std::fmt;

use anyhow::bail;
use log::{debug, info};
use nalgebra::{DMatrix, DVector, SymmetricEigen};

use crate::alphabets::N;
use crate::Result;

pub mod paml;

pub type SubstMatrix = DMatrix<f64>;
pub type FreqVector = DVector<f64>;

/// Tolerance of the checks run when a model is built.
pub const PRECISION: f64 = 1e-5;

#[derive(Debug, Clone, PartialEq)]
pub enum ModelError {
    RowLength {
        row: usize,
        expected: usize,
        found: usize,
    },
    Shape {
        rows: usize,
        cols: usize,
    },
    MissingSeparator,
    MissingFrequencies,
    FrequencyCount {
        found: usize,
    },
    BadNumber {
        line: usize,
        token: String,
    },
    FrequencySum {
        sum: f64,
    },
    NonPositiveFrequency {
        state: usize,
        value: f64,
    },
    Normalisation {
        total: f64,
    },
    Eigendecomposition {
        deviation: f64,
    },
    Stationarity {
        deviation: f64,
    },
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::RowLength {
                row,
                expected,
                found,
            } => write!(
                f,
                "Bad input rate matrix, must be in PAML format: row {row} has {found} values, expected {expected}"
            ),
            ModelError::Shape { rows, cols } => write!(
                f,
                "Exchangeability matrix must be {N}x{N}, got {rows}x{cols}"
            ),
            ModelError::MissingSeparator => write!(
                f,
                "Bad input rate matrix, must be in PAML format: no blank line after the exchangeabilities"
            ),
            ModelError::MissingFrequencies => write!(
                f,
                "Bad input equilibrium distribution, must be in PAML format: no frequency line"
            ),
            ModelError::FrequencyCount { found } => write!(
                f,
                "Bad input equilibrium distribution, must be in PAML format: {found} values, expected {N}"
            ),
            ModelError::BadNumber { line, token } => {
                write!(f, "Cannot read number {token:?} on line {line}")
            }
            ModelError::FrequencySum { sum } => {
                write!(f, "Stationary frequencies sum to {sum} != 1")
            }
            ModelError::NonPositiveFrequency { state, value } => {
                write!(f, "Stationary frequency of state {state} is {value}, must be positive")
            }
            ModelError::Normalisation { total } => {
                write!(f, "sum_i sum_(j!=i) q_ij * freqs_i = {total} != 1")
            }
            ModelError::Eigendecomposition { deviation } => write!(
                f,
                "Eigendecomposition does not reconstruct the symmetrised matrix, max deviation {deviation}"
            ),
            ModelError::Stationarity { deviation } => {
                write!(f, "pi * P != pi, max deviation {deviation}")
            }
        }
    }
}

impl std::error::Error for ModelError {}

/// Reversible amino acid substitution model given by an exchangeability matrix `S` and a
/// stationary distribution `pi`, with rate matrix `Q = S * diag(pi)`.
///
/// Transition probabilities `P(t) = e^(Qt)` are computed from the spectral decomposition of the
/// symmetric matrix `A = diag(pi)^(1/2) * S * diag(pi)^(1/2)`, which is done once when the model
/// is built:
/// `P(t) = diag(pi)^(-1/2) * V * diag(e^(lambda * t)) * V^T * diag(pi)^(1/2)`.
#[derive(Debug, Clone)]
pub struct SubstitutionModel {
    exchangeability: SubstMatrix,
    freqs: FreqVector,
    q: SubstMatrix,
    eigenvalues: DVector<f64>,
    p_left: SubstMatrix,
    p_right: SubstMatrix,
}

impl SubstitutionModel {
    /// Builds a model from a 20x20 exchangeability matrix and 20 stationary frequencies.
    ///
    /// Only the strictly lower triangle of `exchangeability` is read, the upper triangle is
    /// mirrored from it and the diagonal is set so that the rows of `Q` sum to zero.
    /// Bails if the frequencies are not a positive distribution, if `Q` is not normalised to one
    /// expected substitution per unit time or if the decomposition fails its checks.
    pub fn new(exchangeability: SubstMatrix, freqs: FreqVector) -> Result<Self> {
        if exchangeability.nrows() != N || exchangeability.ncols() != N {
            bail!(ModelError::Shape {
                rows: exchangeability.nrows(),
                cols: exchangeability.ncols(),
            });
        }
        validate_freqs(&freqs)?;

        let mut s = SubstMatrix::zeros(N, N);
        for i in 0..N {
            for j in 0..i {
                s[(i, j)] = exchangeability[(i, j)];
                s[(j, i)] = exchangeability[(i, j)];
            }
        }
        for j in 0..N {
            let off_diagonal = (0..N)
                .filter(|&k| k != j)
                .map(|k| s[(j, k)] * freqs[k])
                .sum::<f64>();
            s[(j, j)] = -off_diagonal / freqs[j];
        }

        let q = &s * SubstMatrix::from_diagonal(&freqs);
        let total = (0..N)
            .map(|i| freqs[i] * (q.row(i).sum() - q[(i, i)]))
            .sum::<f64>();
        if (total - 1.0).abs() > PRECISION {
            bail!(ModelError::Normalisation { total });
        }

        let sqrt_freqs = freqs.map(f64::sqrt);
        let pi_pos_half = SubstMatrix::from_diagonal(&sqrt_freqs);
        let pi_neg_half = SubstMatrix::from_diagonal(&sqrt_freqs.map(|x| 1.0 / x));
        let a = &pi_pos_half * &s * &pi_pos_half;
        let SymmetricEigen {
            eigenvectors,
            eigenvalues,
        } = SymmetricEigen::new(a.clone());

        let reconstructed =
            &eigenvectors * SubstMatrix::from_diagonal(&eigenvalues) * eigenvectors.transpose();
        let deviation = (reconstructed - a).amax();
        if deviation > PRECISION {
            bail!(ModelError::Eigendecomposition { deviation });
        }

        let model = Self {
            p_left: pi_neg_half * &eigenvectors,
            p_right: eigenvectors.transpose() * pi_pos_half,
            exchangeability: s,
            freqs,
            q,
            eigenvalues,
        };

        let deviation = (model.freqs.transpose() * model.p(1.0) - model.freqs.transpose()).amax();
        if deviation > PRECISION {
            bail!(ModelError::Stationarity { deviation });
        }
        debug!(
            "Rate matrix eigenvalues range from {} to {}",
            model.eigenvalues.min(),
            model.eigenvalues.max()
        );
        info!("Substitution model built successfully");
        Ok(model)
    }

    /// Parses a model from the PAML text format, see [`paml::parse`].
    ///
    /// # Example
    /// ```
    /// use phylo_rates::substitution_models::SubstitutionModel;
    /// let model = SubstitutionModel::poisson().unwrap();
    /// let reread = SubstitutionModel::from_paml_str(&model.to_paml_string()).unwrap();
    /// assert!((reread.q() - model.q()).amax() < 1e-10);
    /// ```
    pub fn from_paml_str(text: &str) -> Result<Self> {
        let (exchangeability, freqs) = paml::parse(text)?;
        Self::new(exchangeability, freqs)
    }

    /// Model with equal exchangeabilities and uniform stationary frequencies, where every
    /// substitution happens at the same rate.
    pub fn poisson() -> Result<Self> {
        let rate = N as f64 / (N as f64 - 1.0);
        Self::new(
            SubstMatrix::from_element(N, N, rate),
            FreqVector::from_element(N, 1.0 / N as f64),
        )
    }

    /// Exchangeabilities, with the diagonal set so that the rows of `Q` sum to zero.
    pub fn exchangeability(&self) -> &SubstMatrix {
        &self.exchangeability
    }

    pub fn freqs(&self) -> &FreqVector {
        &self.freqs
    }

    pub fn q(&self) -> &SubstMatrix {
        &self.q
    }

    /// Transition probabilities over time `time`, `P[(i, j)]` is the probability of state `j`
    /// at the end of a branch given state `i` at its start.
    ///
    /// # Example
    /// ```
    /// use phylo_rates::substitution_models::SubstitutionModel;
    /// let model = SubstitutionModel::poisson().unwrap();
    /// let p = model.p(0.5);
    /// for row in p.row_iter() {
    ///     assert!((row.sum() - 1.0).abs() < 1e-10);
    /// }
    /// ```
    pub fn p(&self, time: f64) -> SubstMatrix {
        let mut scaled = self.p_left.clone();
        for (mut column, lambda) in scaled.column_iter_mut().zip(self.eigenvalues.iter()) {
            column *= (lambda * time).exp();
        }
        scaled * &self.p_right
    }

    /// Writes the model in the PAML text format, see [`paml::format`].
    pub fn to_paml_string(&self) -> String {
        paml::format(&self.exchangeability, &self.freqs)
    }
}

fn validate_freqs(freqs: &FreqVector) -> Result<()> {
    if freqs.len() != N {
        bail!(ModelError::FrequencyCount { found: freqs.len() });
    }
    if let Some(state) = freqs.iter().position(|f| *f <= 0.0 || f.is_nan()) {
        bail!(ModelError::NonPositiveFrequency {
            state,
            value: freqs[state],
        });
    }
    let sum = freqs.sum();
    if (sum - 1.0).abs() > PRECISION {
        bail!(ModelError::FrequencySum { sum });
    }
    Ok(())
}
