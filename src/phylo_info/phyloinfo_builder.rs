use std::path::PathBuf;

use anyhow::bail;
use log::{info, warn};

use crate::alignment::Alignment;
use crate::io;
use crate::phylo_info::{InfoError, PhyloInfo};
use crate::tree::Tree;
use crate::Result;

pub struct PhyloInfoBuilder {
    sequence_file: PathBuf,
    tree_file: PathBuf,
}

impl PhyloInfoBuilder {
    /// Creates a new PhyloInfoBuilder struct with the sequence and tree file paths set.
    ///
    /// # Arguments
    /// * `sequence_file` - File path to the aligned sequence fasta file.
    /// * `tree_file` - File path to the tree newick file.
    pub fn with_attrs(sequence_file: PathBuf, tree_file: PathBuf) -> PhyloInfoBuilder {
        PhyloInfoBuilder {
            sequence_file,
            tree_file,
        }
    }

    /// Sets the tree file path for the PhyloInfoBuilder struct.
    pub fn tree_file(mut self, path: PathBuf) -> PhyloInfoBuilder {
        self.tree_file = path;
        self
    }

    /// Builds the PhyloInfo struct from the sequence file and the tree file.
    /// If the provided tree file has more than one tree, only the first tree will be processed.
    /// Bails if no sequences are provided, if the sequences are not aligned or if the IDs of the
    /// tree leaves and the sequences do not match.
    ///
    /// # Example
    /// ```
    /// use std::path::PathBuf;
    /// use phylo_rates::phylo_info::PhyloInfoBuilder;
    /// let info = PhyloInfoBuilder::with_attrs(
    ///     PathBuf::from("./data/sequences_protein_small.fasta"),
    ///     PathBuf::from("./data/tree_protein_small.newick"))
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(info.msa.seq_count(), 6);
    /// assert_eq!(info.tree.leaves().len(), 6);
    /// ```
    pub fn build(self) -> Result<PhyloInfo> {
        let msa = Alignment::new(io::read_sequences(&self.sequence_file)?)?;
        info!(
            "{} aligned sequence(s) of length {} read successfully",
            msa.seq_count(),
            msa.len()
        );
        let tree = self.read_tree()?;
        PhyloInfo::new(msa, tree)
    }

    fn read_tree(&self) -> Result<Tree> {
        let mut trees = io::read_newick_from_file(&self.tree_file)?;
        info!("{} tree(s) read successfully", trees.len());
        check_tree_number(&trees)?;
        Ok(trees.remove(0))
    }
}

/// Checks that there is at least one tree in the vector, bails with an error otherwise.
/// Prints a warning if there is more than one tree because only the first tree will be processed.
fn check_tree_number(trees: &[Tree]) -> Result<()> {
    if trees.is_empty() {
        bail!(InfoError::NoTrees);
    }
    if trees.len() > 1 {
        warn!("More than one tree in the tree file, only the first tree will be processed");
    }
    Ok(())
}

#[cfg(test)]
#[cfg_attr(coverage, coverage(off))]
pub mod private_tests {
    use std::path::PathBuf;

    use super::PhyloInfoBuilder as PIB;

    #[test]
    fn builder_setters() {
        let fasta = PathBuf::from("./data/sequences_protein_small.fasta");
        let newick = PathBuf::from("./data/tree_protein_small.newick");
        let other = PathBuf::from("./data/tree_multiple.newick");

        let builder = PIB::with_attrs(fasta.clone(), newick.clone());
        assert_eq!(builder.sequence_file, fasta);
        assert_eq!(builder.tree_file, newick);
        let builder = builder.tree_file(other.clone());
        assert_eq!(builder.tree_file, other);
    }
}
