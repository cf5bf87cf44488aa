use std::collections::HashSet;
use std::fmt;

use anyhow::bail;
use log::info;

use crate::alignment::Alignment;
use crate::tree::{NodeIdx, Tree};
use crate::Result;

mod phyloinfo_builder;
pub use phyloinfo_builder::*;

#[derive(Debug, Clone, PartialEq)]
pub enum InfoError {
    /// Sequence ids that have no matching tree tip.
    MissingTips(Vec<String>),
    /// Tree tip ids that have no matching sequence.
    MissingSequences(Vec<String>),
    DuplicateTip(String),
    NegativeBranch { node: NodeIdx, blen: f64 },
    NoTrees,
}

impl fmt::Display for InfoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InfoError::MissingTips(ids) => {
                write!(f, "Mismatched IDs found, missing tree tip IDs: {ids:?}")
            }
            InfoError::MissingSequences(ids) => {
                write!(f, "Mismatched IDs found, missing sequence IDs: {ids:?}")
            }
            InfoError::DuplicateTip(id) => write!(f, "Tree tip ID {id} appears more than once"),
            InfoError::NegativeBranch { node, blen } => {
                write!(f, "Negative branch length {blen} above {node}")
            }
            InfoError::NoTrees => write!(f, "No trees in the tree file, aborting"),
        }
    }
}

impl std::error::Error for InfoError {}

/// Alignment and tree that have been checked against each other.
///
/// Every tree tip carries the id of exactly one alignment row and vice versa, and all branch
/// lengths are non-negative. `leaf_rows` maps the arena index of each leaf to its alignment row.
#[derive(Debug, Clone)]
pub struct PhyloInfo {
    pub msa: Alignment,
    pub tree: Tree,
    leaf_rows: Vec<Option<usize>>,
}

impl PhyloInfo {
    /// Pairs an alignment with a tree.
    /// Bails if the tip ids and the sequence ids differ, if a tip id repeats or if a branch
    /// length is negative.
    ///
    /// # Example
    /// ```
    /// use phylo_rates::alignment::Alignment;
    /// use phylo_rates::phylo_info::PhyloInfo;
    /// use phylo_rates::{record_wo_desc as record, tree};
    /// let msa = Alignment::new(vec![
    ///     record!("A", b"ARND"),
    ///     record!("B", b"ARNE"),
    ///     record!("C", b"-RNQ"),
    /// ])
    /// .unwrap();
    /// let info = PhyloInfo::new(msa, tree!("((A:0.1,B:0.2):0.1,C:0.3);")).unwrap();
    /// assert_eq!(info.msa_length(), 4);
    /// assert!(PhyloInfo::new(info.msa.clone(), tree!("(A:0.1,B:0.2);")).is_err());
    /// ```
    pub fn new(msa: Alignment, tree: Tree) -> Result<Self> {
        validate_taxa_ids(&tree, &msa)?;
        validate_branch_lengths(&tree)?;
        let leaf_rows = tree
            .iter()
            .map(|node| {
                if node.is_leaf() {
                    msa.index_of(&node.id)
                } else {
                    None
                }
            })
            .collect();
        Ok(Self {
            msa,
            tree,
            leaf_rows,
        })
    }

    /// Returns the number of sites in the alignment.
    pub fn msa_length(&self) -> usize {
        self.msa.len()
    }

    /// Alignment row holding the sequence of leaf `idx`.
    pub fn leaf_row(&self, idx: &NodeIdx) -> Option<usize> {
        self.leaf_rows
            .get(usize::from(idx))
            .copied()
            .flatten()
    }
}

/// Checks that the ids of the tree leaves and the sequences match, bails with an error otherwise.
fn validate_taxa_ids(tree: &Tree, msa: &Alignment) -> Result<()> {
    info!("Checking that tree tip and sequence IDs match");
    let mut tip_ids = HashSet::with_capacity(tree.leaf_ids().len());
    for id in tree.leaf_ids() {
        if !tip_ids.insert(id.as_str()) {
            bail!(InfoError::DuplicateTip(id.clone()));
        }
    }
    let sequence_ids: HashSet<&str> = msa.ids().collect();
    let mut missing_tips = sequence_ids
        .difference(&tip_ids)
        .map(|id| id.to_string())
        .collect::<Vec<_>>();
    if !missing_tips.is_empty() {
        missing_tips.sort();
        bail!(InfoError::MissingTips(missing_tips));
    }
    let mut missing_seqs = tip_ids
        .difference(&sequence_ids)
        .map(|id| id.to_string())
        .collect::<Vec<_>>();
    if !missing_seqs.is_empty() {
        missing_seqs.sort();
        bail!(InfoError::MissingSequences(missing_seqs));
    }
    Ok(())
}

fn validate_branch_lengths(tree: &Tree) -> Result<()> {
    for node in tree.iter().filter(|node| node.idx != tree.root) {
        if node.blen < 0.0 || node.blen.is_nan() {
            bail!(InfoError::NegativeBranch {
                node: node.idx,
                blen: node.blen,
            });
        }
    }
    Ok(())
}
