use approx::assert_relative_eq;
use assert_matches::assert_matches;
use rstest::rstest;

use crate::alignment::Alignment;
use crate::gamma::DiscreteGamma;
use crate::phylo_info::PhyloInfo;
use crate::rates::{
    EstimatorError, RateEstimator, StopReason, DEFAULT_CATEGORIES, DEFAULT_MAX_ITERATIONS,
    FALLBACK_RATE,
};
use crate::substitution_models::SubstitutionModel;
use crate::{record_wo_desc as record, tree};

fn estimator(alpha: f64) -> RateEstimator {
    RateEstimator::new(
        SubstitutionModel::poisson().unwrap(),
        alpha,
        DEFAULT_CATEGORIES,
    )
    .unwrap()
}

fn star_info(columns: &[&[u8; 3]]) -> PhyloInfo {
    let rows = (0..3)
        .map(|row| columns.iter().map(|col| col[row]).collect::<Vec<u8>>())
        .collect::<Vec<_>>();
    let msa = Alignment::new(vec![
        record!("A", &rows[0]),
        record!("B", &rows[1]),
        record!("C", &rows[2]),
    ])
    .unwrap();
    PhyloInfo::new(msa, tree!("(A:1,B:1,C:1);")).unwrap()
}

fn mixed_info() -> PhyloInfo {
    let msa = Alignment::new(vec![
        record!("S1", b"AAAAAWAVKLC"),
        record!("S2", b"AAAAARNDPQ-"),
        record!("S3", b"AAAAACQEGH-"),
        record!("S4", b"AAAAAILKMF-"),
        record!("S5", b"AAAAAPSTWY-"),
        record!("S6", b"AAAAAVGHED-"),
    ])
    .unwrap();
    PhyloInfo::new(
        msa,
        tree!("((S1:0.2,S2:0.3):0.1,(S3:0.25,S4:0.15):0.2,(S5:0.3,S6:0.1):0.15);"),
    )
    .unwrap()
}

#[rstest]
#[case::fixed(1.0)]
#[case::empirical(0.0)]
fn conserved_column_is_slower(#[case] alpha: f64) {
    let info = star_info(&[b"AAA", b"ARN"]);
    let rates = estimator(alpha).estimate(&info).unwrap().rates;
    assert!(rates[0] < rates[1]);
    let scores = estimator(alpha).score(&info).unwrap();
    assert!(scores[0] > scores[1]);
}

#[test]
fn posterior_mean_of_cherry() {
    let msa = Alignment::new(vec![record!("A", b"AA"), record!("B", b"RA")]).unwrap();
    let info = PhyloInfo::new(msa, tree!("(A:0.3,B:0.2);")).unwrap();
    let estimator = RateEstimator::new(SubstitutionModel::poisson().unwrap(), 2.0, 4).unwrap();
    let estimates = estimator.estimate(&info).unwrap();

    let prior = DiscreteGamma::new(2.0, 2.0, 4).unwrap();
    let posterior_mean = |same: bool| {
        let likelihoods = prior
            .rates()
            .iter()
            .map(|r| {
                let decay = (-20.0 / 19.0 * 0.5 * r).exp();
                if same {
                    0.05 * (0.05 + 0.95 * decay)
                } else {
                    0.05 * (0.05 - 0.05 * decay)
                }
            })
            .collect::<Vec<_>>();
        let total = likelihoods.iter().sum::<f64>();
        let mean = prior
            .rates()
            .iter()
            .zip(likelihoods.iter())
            .map(|(r, l)| r * l)
            .sum::<f64>()
            / total;
        (mean, total.ln())
    };
    let (different, different_logl) = posterior_mean(false);
    let (same, same_logl) = posterior_mean(true);
    assert_relative_eq!(estimates.rates[0], different, epsilon = 1e-10);
    assert_relative_eq!(estimates.rates[1], same, epsilon = 1e-10);
    assert_relative_eq!(
        estimates.log_marginal,
        different_logl + same_logl,
        epsilon = 1e-10
    );
    assert_eq!(estimates.stop, StopReason::FixedAlpha);
    assert_eq!(estimates.iterations, 1);
    assert_eq!(estimates.alpha, 2.0);
}

#[rstest]
#[case::fixed(0.7)]
#[case::empirical(0.0)]
fn sparse_columns_get_fallback_rate(#[case] alpha: f64) {
    let info = star_info(&[b"A--", b"---", b"-X-", b"ARN", b"AAA", b"WWA"]);
    let rates = estimator(alpha).estimate(&info).unwrap().rates;
    assert_eq!(rates[0], FALLBACK_RATE);
    assert_eq!(rates[1], FALLBACK_RATE);
    assert_eq!(rates[2], FALLBACK_RATE);
    assert!(rates[3..].iter().all(|&r| r != FALLBACK_RATE));
}

#[test]
fn single_sequence_gives_flat_scores() {
    let msa = Alignment::new(vec![record!("A", b"ARND-")]).unwrap();
    let info = PhyloInfo::new(msa, tree!("A:0.1;")).unwrap();
    let estimates = estimator(0.0).estimate(&info).unwrap();
    assert_eq!(estimates.stop, StopReason::TooFewSequences);
    assert_eq!(estimates.iterations, 0);
    assert_eq!(estimator(0.0).score(&info).unwrap(), vec![-1.0; 5]);
}

#[test]
fn identical_columns_hit_alpha_ceiling() {
    let info = star_info(&[b"AAA", b"AAA", b"AAA", b"AAA"]);
    let estimates = estimator(0.0).estimate(&info).unwrap();
    assert_eq!(estimates.stop, StopReason::AlphaCeiling);
    assert_eq!(estimates.iterations, 1);
    assert_eq!(estimates.alpha, 1.0);
    let first = estimates.rates[0];
    assert!(estimates.rates.iter().all(|&r| r == first));
}

#[test]
fn one_informative_column_cannot_estimate_alpha() {
    let info = star_info(&[b"ARN", b"A--", b"---"]);
    let estimates = estimator(0.0).estimate(&info).unwrap();
    assert_eq!(estimates.stop, StopReason::TooFewInformativeColumns);
    assert_eq!(estimates.iterations, 1);
    assert_eq!(estimates.alpha, 1.0);
}

#[test]
fn empirical_bayes_converges() {
    let info = mixed_info();
    let estimates = estimator(0.0).estimate(&info).unwrap();
    assert_eq!(estimates.stop, StopReason::Converged);
    assert_eq!(estimates.iterations, 2);
    assert!(estimates.alpha > 0.0 && estimates.alpha < 40.0);
    assert_ne!(estimates.alpha, 1.0);
    assert_eq!(estimates.rates[10], FALLBACK_RATE);
    let conserved = estimates.rates[0];
    assert!(estimates.rates[..5].iter().all(|&r| r == conserved));
    assert!(estimates.rates[5..10].iter().all(|&r| r > conserved));
    assert!(estimates.log_marginal.is_finite() && estimates.log_marginal < 0.0);
}

#[test]
fn empirical_bayes_iteration_cap() {
    let info = mixed_info();
    let estimates = estimator(0.0)
        .with_max_iterations(1)
        .estimate(&info)
        .unwrap();
    assert_eq!(estimates.stop, StopReason::IterationCap);
    assert_eq!(estimates.iterations, 1);
    assert_eq!(estimates.alpha, 1.0);
    let fixed = estimator(1.0).estimate(&info).unwrap();
    assert_eq!(estimates.rates, fixed.rates);
}

#[rstest]
#[case::fixed(0.8)]
#[case::empirical(0.0)]
fn scores_are_negated_rates(#[case] alpha: f64) {
    let info = mixed_info();
    let estimates = estimator(alpha).estimate(&info).unwrap();
    let scores = estimates.scores();
    assert_eq!(scores.len(), estimates.rates.len());
    for (score, rate) in scores.iter().zip(estimates.rates.iter()) {
        assert_eq!(*score, -rate);
    }
    assert_eq!(estimator(alpha).score(&info).unwrap(), scores);
}

#[test]
fn estimation_is_deterministic() {
    let info = mixed_info();
    let first = estimator(0.0).estimate(&info).unwrap();
    let second = estimator(0.0).estimate(&info).unwrap();
    assert_eq!(first, second);
}

#[test]
fn estimator_settings() {
    let estimator = estimator(0.0);
    assert_eq!(estimator.alpha(), 0.0);
    assert_eq!(estimator.categories(), DEFAULT_CATEGORIES);
    assert_eq!(estimator.max_iterations(), DEFAULT_MAX_ITERATIONS);
    assert_eq!(estimator.clone().with_max_iterations(0).max_iterations(), 1);
    assert_eq!(estimator.model().freqs().len(), 20);
}

#[rstest]
#[case::negative(-0.5)]
#[case::ceiling(40.0)]
#[case::nan(f64::NAN)]
fn invalid_alpha(#[case] alpha: f64) {
    let err =
        RateEstimator::new(SubstitutionModel::poisson().unwrap(), alpha, 4).unwrap_err();
    assert_matches!(
        err.downcast_ref::<EstimatorError>(),
        Some(EstimatorError::Alpha(_))
    );
}

#[test]
fn invalid_categories() {
    let err = RateEstimator::new(SubstitutionModel::poisson().unwrap(), 0.0, 1).unwrap_err();
    assert_eq!(
        err.downcast_ref::<EstimatorError>(),
        Some(&EstimatorError::Categories(1))
    );
}
