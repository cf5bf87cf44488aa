use std::error::Error;
use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::bail;
use bio::io::fasta::{Reader, Record};
use log::info;

use crate::alignment::Alignment;
use crate::alphabets::clean_residues;
use crate::rates::RateEstimator;
use crate::substitution_models::SubstitutionModel;
use crate::tree::{tree_parser, Tree};
use crate::Result;

/// Name of the scorer in score file headers.
pub const SCORER_NAME: &str = "rate4site_eb";

pub struct DataError {
    pub message: String,
}
impl fmt::Debug for DataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}
impl fmt::Display for DataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}
impl Error for DataError {}

fn refuse_existing(path: &Path) -> Result<()> {
    if path.exists() {
        bail!(DataError {
            message: format!("File {} already exists", path.display())
        });
    }
    Ok(())
}

/// Reads protein sequences from a fasta file, returning a vector of fasta records.
///
/// Residues are converted to uppercase, B is read as D and Z as Q, every other symbol that is
/// not one of the 20 amino acids becomes a gap.
///
/// # Arguments
/// * `path` - Path to the fasta file.
///
/// # Example
/// ```
/// use phylo_rates::io::read_sequences;
/// use std::path::PathBuf;
/// let records = read_sequences(&PathBuf::from("./data/sequences_protein_small.fasta")).unwrap();
/// # assert_eq!(records.len(), 6);
/// # for rec in records {
/// #    assert_eq!(rec.seq(), rec.seq().to_ascii_uppercase());
/// # }
/// ```
pub fn read_sequences(path: &Path) -> Result<Vec<Record>> {
    info!("Reading sequences from file {}", path.display());
    let reader = Reader::from_file(path)?;
    let mut sequences = Vec::new();

    for result in reader.records() {
        let rec = result?;
        if let Err(e) = rec.check() {
            bail!(DataError {
                message: e.to_string()
            });
        }
        sequences.push(Record::with_attrs(
            rec.id(),
            rec.desc(),
            &clean_residues(rec.seq()),
        ));
    }
    if sequences.is_empty() {
        bail!(DataError {
            message: String::from("No sequences found in file")
        });
    }

    info!("Read {} sequences successfully", sequences.len());
    Ok(sequences)
}

/// Reads newick trees from a file, returning a vector of trees.
///
/// Unrooted trees keep their top level multifurcation as the root.
///
/// # Example
/// ```
/// use phylo_rates::io::read_newick_from_file;
/// use std::path::PathBuf;
/// let trees = read_newick_from_file(&PathBuf::from("./data/tree_protein_small.newick")).unwrap();
/// # assert_eq!(trees.len(), 1);
/// # assert_eq!(trees[0].leaves().len(), 6);
/// ```
pub fn read_newick_from_file(path: &Path) -> Result<Vec<Tree>> {
    info!("Reading newick trees from file {}", path.display());
    let newick = fs::read_to_string(path)?;
    info!("Read file successfully");
    tree_parser::from_newick(&newick)
}

/// Reads a substitution model from a PAML formatted rate matrix file.
///
/// # Example
/// ```
/// use phylo_rates::io::read_substitution_model;
/// use std::path::PathBuf;
/// let model = read_substitution_model(&PathBuf::from("./data/models/poisson.PAML.txt")).unwrap();
/// # assert!((model.q()[(0, 0)] + 1.0).abs() < 1e-12);
/// ```
pub fn read_substitution_model(path: &Path) -> Result<SubstitutionModel> {
    info!("Reading rate matrix from file {}", path.display());
    let text = fs::read_to_string(path)?;
    SubstitutionModel::from_paml_str(&text)
}

/// Writes a substitution model in the PAML format. Will return an error if the file already
/// exists.
pub fn write_substitution_model_to_file(model: &SubstitutionModel, path: &Path) -> Result<()> {
    info!("Writing rate matrix to file {}", path.display());
    refuse_existing(path)?;
    fs::write(path, model.to_paml_string())?;
    info!("Finished writing successfully");
    Ok(())
}

/// Writes conservation scores as a tab separated table with one row per column: position
/// (from 1), the residues of the column and the score rounded to 4 decimals.
/// Will return an error if the file already exists or if there is not one score per column.
///
/// # Arguments
/// * `path` - Output file path.
/// * `alignment_name` - Name written to the header, usually the path of the alignment file.
/// * `msa` - Scored alignment.
/// * `scores` - One score per alignment column.
/// * `estimator` - Estimator that produced the scores, its settings are written to the header.
pub fn write_scores_to_file(
    path: &Path,
    alignment_name: &str,
    msa: &Alignment,
    scores: &[f64],
    estimator: &RateEstimator,
) -> Result<()> {
    info!("Writing scores to file {}", path.display());
    if scores.len() != msa.len() {
        bail!(DataError {
            message: format!(
                "Got {} scores for an alignment with {} columns",
                scores.len(),
                msa.len()
            )
        });
    }
    refuse_existing(path)?;
    let mut writer = BufWriter::new(File::create(path)?);
    writeln!(writer, "# Alignment: {alignment_name}")?;
    writeln!(writer, "# Num sites: {}", msa.len())?;
    writeln!(writer, "# Num sequences: {}", msa.seq_count())?;
    writeln!(writer)?;
    writeln!(writer, "# Scorer: {SCORER_NAME}")?;
    writeln!(writer, "# \talpha: {}", estimator.alpha())?;
    writeln!(writer, "# \tK: {}", estimator.categories())?;
    writeln!(writer)?;
    writeln!(writer, "# i\tcolumn\t{SCORER_NAME}")?;
    for (site, score) in scores.iter().enumerate() {
        let column = String::from_utf8_lossy(&msa.column(site)).into_owned();
        writeln!(writer, "{}\t{}\t{}", site + 1, column, format_score(*score))?;
    }
    writer.flush()?;
    info!("Finished writing successfully");
    Ok(())
}

fn format_score(score: f64) -> String {
    if score.is_nan() {
        String::from("-")
    } else {
        format!("{}", (score * 1e4).round() / 1e4)
    }
}

/// Reads the scores of a file written by [`write_scores_to_file`], one entry per row.
/// Comment and blank lines are skipped, a `-` score is read as None.
///
/// # Example
/// ```
/// use phylo_rates::io::read_scores;
/// use std::path::PathBuf;
/// let scores = read_scores(&PathBuf::from("./data/scores_small.txt")).unwrap();
/// assert_eq!(scores, vec![Some(-0.1234), Some(-2.5), None, Some(-1.0)]);
/// ```
pub fn read_scores(path: &Path) -> Result<Vec<Option<f64>>> {
    info!("Reading scores from file {}", path.display());
    let text = fs::read_to_string(path)?;
    let mut scores = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let score = match line.split_whitespace().nth(2) {
            Some("-") => None,
            Some(field) => match field.parse::<f64>() {
                Ok(score) => Some(score),
                Err(_) => bail!(DataError {
                    message: format!("Cannot read score {field:?} on line {}", line_no + 1)
                }),
            },
            None => bail!(DataError {
                message: format!("Missing score on line {}", line_no + 1)
            }),
        };
        scores.push(score);
    }
    info!("Read {} scores successfully", scores.len());
    Ok(scores)
}
