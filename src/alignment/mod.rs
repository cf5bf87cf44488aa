use std::collections::HashSet;
use std::fmt;

use anyhow::bail;
use bio::io::fasta::Record;

use crate::alphabets::is_informative;
use crate::Result;

#[derive(Debug, Clone, PartialEq)]
pub enum AlignmentError {
    NoSequences,
    UnequalLength {
        id: String,
        expected: usize,
        found: usize,
    },
    DuplicateId(String),
}

impl fmt::Display for AlignmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlignmentError::NoSequences => write!(f, "Alignment must contain at least one sequence"),
            AlignmentError::UnequalLength {
                id,
                expected,
                found,
            } => write!(
                f,
                "Sequences are not aligned: {id} has length {found}, expected {expected}"
            ),
            AlignmentError::DuplicateId(id) => write!(f, "Duplicate sequence id {id}"),
        }
    }
}

impl std::error::Error for AlignmentError {}

/// Multiple sequence alignment of protein sequences.
///
/// Rows keep the order in which they were given, columns are indexed from 0.
#[derive(Debug, Clone)]
pub struct Alignment {
    pub seqs: Vec<Record>,
}

impl Alignment {
    /// Creates an alignment from fasta records.
    /// Bails if there are no records, if the records differ in length or if an id is repeated.
    ///
    /// # Example
    /// ```
    /// use phylo_rates::alignment::Alignment;
    /// use phylo_rates::record_wo_desc as record;
    /// let msa = Alignment::new(vec![record!("A", b"AR-D"), record!("B", b"ARND")]).unwrap();
    /// assert_eq!(msa.len(), 4);
    /// assert_eq!(msa.seq_count(), 2);
    /// assert_eq!(msa.column(2), b"-N".to_vec());
    /// assert_eq!(msa.informative_count(2), 1);
    /// ```
    pub fn new(seqs: Vec<Record>) -> Result<Self> {
        let Some(first) = seqs.first() else {
            bail!(AlignmentError::NoSequences);
        };
        let expected = first.seq().len();
        let mut ids = HashSet::with_capacity(seqs.len());
        for rec in seqs.iter() {
            if rec.seq().len() != expected {
                bail!(AlignmentError::UnequalLength {
                    id: rec.id().to_string(),
                    expected,
                    found: rec.seq().len(),
                });
            }
            if !ids.insert(rec.id()) {
                bail!(AlignmentError::DuplicateId(rec.id().to_string()));
            }
        }
        Ok(Self { seqs })
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.seqs.first().map(|rec| rec.seq().len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn seq_count(&self) -> usize {
        self.seqs.len()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.seqs.iter().map(|rec| rec.id())
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.seqs.iter().position(|rec| rec.id() == id)
    }

    /// Residues of all sequences at column `site`, in row order.
    pub fn column(&self, site: usize) -> Vec<u8> {
        self.seqs.iter().map(|rec| rec.seq()[site]).collect()
    }

    /// Number of residues at column `site` that are amino acids rather than gaps.
    pub fn informative_count(&self, site: usize) -> usize {
        self.seqs
            .iter()
            .filter(|rec| is_informative(rec.seq()[site]))
            .count()
    }
}
