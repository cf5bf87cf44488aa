use anyhow::bail;
use log::debug;

use crate::alphabets::{residue_index, N};
use crate::phylo_info::PhyloInfo;
use crate::substitution_models::{FreqVector, SubstMatrix, SubstitutionModel};
use crate::tree::{NodeIdx, NodeIdx::Internal as Int, NodeIdx::Leaf, Tree};
use crate::Result;

/// Per node entry of the [`TransitionCache`].
#[derive(Debug, Clone, PartialEq)]
pub enum BranchProbs {
    /// Stationary distribution, the probability of each state at the root.
    Root(FreqVector),
    /// `P(rate * blen)` of the branch above a non-root node.
    Branch(SubstMatrix),
}

/// Transition probabilities of every branch of a tree for a fixed set of rates.
///
/// Entries are indexed by rate index and arena index of the node, they only depend on the tree,
/// the rates and the model, so one cache serves every column of an alignment.
#[derive(Debug, Clone)]
pub struct TransitionCache {
    rates: Vec<f64>,
    probs: Vec<Vec<BranchProbs>>,
}

impl TransitionCache {
    /// Bails if `rates` is empty.
    pub fn new(tree: &Tree, rates: &[f64], model: &SubstitutionModel) -> Result<Self> {
        if rates.is_empty() {
            bail!("Cannot cache transition probabilities without rates");
        }
        let probs = rates
            .iter()
            .map(|&rate| {
                tree.iter()
                    .map(|node| {
                        if node.idx == tree.root {
                            BranchProbs::Root(model.freqs().clone())
                        } else {
                            BranchProbs::Branch(model.p(rate * node.blen))
                        }
                    })
                    .collect()
            })
            .collect();
        debug!(
            "Cached transition probabilities for {} rates and {} nodes",
            rates.len(),
            tree.len()
        );
        Ok(Self {
            rates: rates.to_vec(),
            probs,
        })
    }

    pub fn rates(&self) -> &[f64] {
        &self.rates
    }

    pub fn probs(&self, rate_idx: usize, node: &NodeIdx) -> &BranchProbs {
        &self.probs[rate_idx][usize::from(node)]
    }
}

/// Likelihood vector kept as `values * exp(log_scale)` so that deep trees do not underflow.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialLikelihood {
    pub values: FreqVector,
    pub log_scale: f64,
}

impl PartialLikelihood {
    fn new(values: FreqVector, log_scale: f64) -> Self {
        let max = values.max();
        if max > 0.0 && max.is_finite() {
            Self {
                values: values / max,
                log_scale: log_scale + max.ln(),
            }
        } else {
            Self { values, log_scale }
        }
    }

    /// Unscaled values.
    pub fn likelihoods(&self) -> FreqVector {
        &self.values * self.log_scale.exp()
    }
}

/// Result of pruning the subtree below a node.
#[derive(Debug, Clone, PartialEq)]
pub enum SubtreeLikelihood {
    /// Probability of the leaves below a non-root node given each state of its parent.
    Branch(PartialLikelihood),
    /// Log likelihood of all leaves of the tree.
    Root(f64),
}

/// Prunes the subtree rooted at `node` for one alignment column at the rate with index
/// `rate_idx`.
///
/// Leaves with a gap (or any residue outside the alphabet) carry no information and are skipped,
/// so are internal nodes with only such leaves below them. Returns None when every leaf below
/// `node` is uninformative.
pub fn site_likelihood(
    info: &PhyloInfo,
    cache: &TransitionCache,
    rate_idx: usize,
    node: NodeIdx,
    column: &[u8],
) -> Option<SubtreeLikelihood> {
    let mut order = info.tree.preorder_subroot(node);
    order.reverse();
    prune(info, cache, rate_idx, &order, column)
}

/// Log likelihood of one alignment column at the rate with index `rate_idx`, None if the column
/// has no informative residue.
pub fn column_log_likelihood(
    info: &PhyloInfo,
    cache: &TransitionCache,
    rate_idx: usize,
    column: &[u8],
) -> Option<f64> {
    match prune(info, cache, rate_idx, &info.tree.postorder, column)? {
        SubtreeLikelihood::Root(logl) => Some(logl),
        SubtreeLikelihood::Branch(_) => None,
    }
}

fn prune(
    info: &PhyloInfo,
    cache: &TransitionCache,
    rate_idx: usize,
    order: &[NodeIdx],
    column: &[u8],
) -> Option<SubtreeLikelihood> {
    let mut below: Vec<Option<PartialLikelihood>> = vec![None; info.tree.len()];
    let mut last = None;
    for node_idx in order {
        let product = match node_idx {
            Leaf(_) => leaf_indicator(info, node_idx, column),
            Int(_) => children_product(&below, info.tree.children(node_idx)),
        };
        let result = product.map(|product| propagate(cache.probs(rate_idx, node_idx), product));
        last = match result {
            Some(SubtreeLikelihood::Branch(partial)) => {
                below[usize::from(node_idx)] = Some(partial.clone());
                Some(SubtreeLikelihood::Branch(partial))
            }
            other => other,
        };
    }
    last
}

fn leaf_indicator(info: &PhyloInfo, leaf: &NodeIdx, column: &[u8]) -> Option<PartialLikelihood> {
    let row = info.leaf_row(leaf)?;
    let state = residue_index(*column.get(row)?)?;
    let mut values = FreqVector::zeros(N);
    values[state] = 1.0;
    Some(PartialLikelihood {
        values,
        log_scale: 0.0,
    })
}

fn children_product(
    below: &[Option<PartialLikelihood>],
    children: &[NodeIdx],
) -> Option<PartialLikelihood> {
    children
        .iter()
        .filter_map(|child| below[usize::from(child)].as_ref())
        .fold(None, |product: Option<PartialLikelihood>, child| {
            Some(match product {
                None => child.clone(),
                Some(product) => PartialLikelihood {
                    values: product.values.component_mul(&child.values),
                    log_scale: product.log_scale + child.log_scale,
                },
            })
        })
}

fn propagate(probs: &BranchProbs, below: PartialLikelihood) -> SubtreeLikelihood {
    match probs {
        BranchProbs::Branch(p) => {
            SubtreeLikelihood::Branch(PartialLikelihood::new(p * below.values, below.log_scale))
        }
        BranchProbs::Root(freqs) => {
            SubtreeLikelihood::Root(freqs.dot(&below.values).ln() + below.log_scale)
        }
    }
}
