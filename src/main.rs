use std::result::Result::Ok;

use anyhow::{anyhow, bail, Error};
use clap::Parser;
use ftail::Ftail;
use log::{info, LevelFilter};

use phylo_rates::io::{read_substitution_model, write_scores_to_file};
use phylo_rates::phylo_info::PhyloInfoBuilder;
use phylo_rates::rates::RateEstimator;

mod cli;
use crate::cli::{Cli, ConfigBuilder};

type Result<T> = std::result::Result<T, Error>;

fn main() -> Result<()> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(error) => {
            bail!("Unable to parse command line arguments: \n {}", error)
        }
    };
    let cfg_build: ConfigBuilder = cli.into();
    let cfg = cfg_build.setup()?;

    Ftail::new()
        .console(LevelFilter::from(cfg.log_level))
        .init()
        .map_err(|e| anyhow!("Unable to set up logging: {:?}", e))?;

    info!("Rate estimation run started.");
    info!("{}", cfg);

    let info = PhyloInfoBuilder::with_attrs(cfg.seq_file.clone(), cfg.tree_file.clone()).build()?;
    let model = read_substitution_model(&cfg.model_file)?;
    let estimator =
        RateEstimator::new(model, cfg.alpha, cfg.categories)?.with_max_iterations(cfg.max_iterations);

    let estimates = estimator.estimate(&info)?;
    info!(
        "Estimated rates with alpha = {} after {} iteration(s), stopped on {}.",
        estimates.alpha, estimates.iterations, estimates.stop
    );
    let scores = estimates.scores();

    info!("Putting scores in {}", cfg.out_file.display());
    write_scores_to_file(
        &cfg.out_file,
        &cfg.seq_file.display().to_string(),
        &info.msa,
        &scores,
        &estimator,
    )?;

    Ok(())
}
