use std::fmt::Display;
use std::path::PathBuf;

use anyhow::bail;
use clap::{Parser, ValueEnum};
use log::LevelFilter;

use phylo_rates::rates::{DEFAULT_CATEGORIES, DEFAULT_MAX_ITERATIONS, MAX_ALPHA};

use crate::Result;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub(super) struct Cli {
    /// Aligned protein sequences in fasta format
    #[arg(short, long, value_name = "SEQ_FILE")]
    pub(super) seq_file: PathBuf,

    /// Tree file in newick format, only the first tree is used
    #[arg(short, long, value_name = "TREE_FILE")]
    pub(super) tree_file: PathBuf,

    /// Substitution model in PAML format, exchangeabilities followed by frequencies
    #[arg(short, long, value_name = "MODEL_FILE")]
    pub(super) model_file: PathBuf,

    /// Shape of the gamma prior, 0 estimates it from the data
    #[arg(short, long, value_name = "ALPHA", default_value_t = 0.0)]
    pub(super) alpha: f64,

    /// Number of discrete gamma rate categories
    #[arg(short = 'k', long, value_name = "CATEGORIES", default_value_t = DEFAULT_CATEGORIES)]
    pub(super) categories: usize,

    /// Maximum number of EM iterations when alpha is estimated
    #[arg(short = 'i', long, value_name = "MAX_ITERS", default_value_t = DEFAULT_MAX_ITERATIONS)]
    pub(super) max_iterations: usize,

    /// Output score file, defaults to the sequence file with a .scores extension
    #[arg(short, long, value_name = "OUTPUT_FILE")]
    pub(super) out_file: Option<PathBuf>,

    /// Logging verbosity
    #[arg(short, long, value_enum, default_value_t = LogLevel::Info)]
    pub(super) log_level: LogLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(super) enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

pub(super) struct ConfigBuilder {
    seq_file: PathBuf,
    tree_file: PathBuf,
    model_file: PathBuf,
    alpha: f64,
    categories: usize,
    max_iterations: usize,
    out_file: Option<PathBuf>,
    log_level: LogLevel,
}

impl From<Cli> for ConfigBuilder {
    fn from(cli: Cli) -> Self {
        ConfigBuilder {
            seq_file: cli.seq_file,
            tree_file: cli.tree_file,
            model_file: cli.model_file,
            alpha: cli.alpha,
            categories: cli.categories,
            max_iterations: cli.max_iterations,
            out_file: cli.out_file,
            log_level: cli.log_level,
        }
    }
}

impl ConfigBuilder {
    /// Checks the run settings and fills in the default output file.
    pub(super) fn setup(self) -> Result<Config> {
        if !(0.0..MAX_ALPHA).contains(&self.alpha) {
            bail!(
                "Alpha must be 0 (estimate) or in (0, {}), got {}",
                MAX_ALPHA,
                self.alpha
            );
        }
        if self.categories < 2 {
            bail!(
                "At least 2 rate categories are needed, got {}",
                self.categories
            );
        }
        if self.max_iterations == 0 {
            bail!("At least one EM iteration is needed");
        }
        for (what, path) in [
            ("Sequence", &self.seq_file),
            ("Tree", &self.tree_file),
            ("Model", &self.model_file),
        ] {
            if !path.is_file() {
                bail!("{} file {} does not exist", what, path.display());
            }
        }
        let out_file = self
            .out_file
            .unwrap_or_else(|| self.seq_file.with_extension("scores"));
        if out_file.exists() {
            bail!("Output file {} already exists", out_file.display());
        }
        Ok(Config {
            seq_file: self.seq_file,
            tree_file: self.tree_file,
            model_file: self.model_file,
            alpha: self.alpha,
            categories: self.categories,
            max_iterations: self.max_iterations,
            out_file,
            log_level: self.log_level,
        })
    }
}

#[derive(Debug)]
pub(super) struct Config {
    pub(super) seq_file: PathBuf,
    pub(super) tree_file: PathBuf,
    pub(super) model_file: PathBuf,
    pub(super) alpha: f64,
    pub(super) categories: usize,
    pub(super) max_iterations: usize,
    pub(super) out_file: PathBuf,
    pub(super) log_level: LogLevel,
}

impl Display for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Run configuration:")?;
        writeln!(f, "  sequences: {}", self.seq_file.display())?;
        writeln!(f, "  tree: {}", self.tree_file.display())?;
        writeln!(f, "  model: {}", self.model_file.display())?;
        if self.alpha == 0.0 {
            writeln!(
                f,
                "  alpha: estimated, at most {} EM iterations",
                self.max_iterations
            )?;
        } else {
            writeln!(f, "  alpha: {}", self.alpha)?;
        }
        writeln!(f, "  rate categories: {}", self.categories)?;
        write!(f, "  output: {}", self.out_file.display())
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use clap::Parser;
    use tempfile::tempdir;

    use super::{Cli, ConfigBuilder, LogLevel};

    fn args(extra: &[&str]) -> Vec<String> {
        let mut args = vec![
            "phylo-rates",
            "-s",
            "./data/sequences_protein_small.fasta",
            "-t",
            "./data/tree_protein_small.newick",
            "-m",
            "./data/models/poisson.PAML.txt",
        ];
        args.extend_from_slice(extra);
        args.into_iter().map(String::from).collect()
    }

    #[test]
    fn defaults() {
        let cli = Cli::try_parse_from(args(&[])).unwrap();
        assert_eq!(cli.alpha, 0.0);
        assert_eq!(cli.categories, 16);
        assert_eq!(cli.max_iterations, 100);
        assert_eq!(cli.log_level, LogLevel::Info);
        assert!(cli.out_file.is_none());
        let builder: ConfigBuilder = cli.into();
        assert_eq!(
            builder.seq_file.with_extension("scores"),
            PathBuf::from("./data/sequences_protein_small.scores")
        );
    }

    #[test]
    fn explicit_settings() {
        let temp_dir = tempdir().unwrap();
        let out = temp_dir.path().join("out.scores");
        let cli = Cli::try_parse_from(args(&[
            "-a",
            "0.5",
            "-k",
            "8",
            "--max-iterations",
            "3",
            "-o",
            out.to_str().unwrap(),
            "-l",
            "debug",
        ]))
        .unwrap();
        let cfg = ConfigBuilder::from(cli).setup().unwrap();
        assert_eq!(cfg.alpha, 0.5);
        assert_eq!(cfg.categories, 8);
        assert_eq!(cfg.max_iterations, 3);
        assert_eq!(cfg.out_file, out);
        assert_eq!(cfg.log_level, LogLevel::Debug);
        assert!(cfg.to_string().contains("alpha: 0.5"));
    }

    #[test]
    fn invalid_settings() {
        let temp_dir = tempdir().unwrap();
        let out = temp_dir.path().join("out.scores");
        let out = out.to_str().unwrap();
        for extra in [
            vec!["-a", "40", "-o", out],
            vec!["--alpha=-1", "-o", out],
            vec!["-k", "1", "-o", out],
            vec!["--max-iterations", "0", "-o", out],
            vec!["-o", "./data/scores_small.txt"],
        ] {
            let cli = Cli::try_parse_from(args(&extra)).unwrap();
            assert!(ConfigBuilder::from(cli).setup().is_err());
        }
    }

    #[test]
    fn missing_input_file() {
        let cli = Cli::try_parse_from([
            "phylo-rates",
            "-s",
            "./data/nonexistent.fasta",
            "-t",
            "./data/tree_protein_small.newick",
            "-m",
            "./data/models/poisson.PAML.txt",
        ])
        .unwrap();
        let err = ConfigBuilder::from(cli).setup().unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn missing_required_arguments() {
        assert!(Cli::try_parse_from(["phylo-rates", "-s", "seqs.fasta"]).is_err());
    }
}
