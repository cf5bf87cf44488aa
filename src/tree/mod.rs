use std::fmt::Display;

use anyhow::bail;

use crate::Result;
use NodeIdx::{Internal as Int, Leaf};

mod tree_node;
pub mod tree_parser;

pub use tree_node::Node;

/// Position of a node in the tree arena, tagged with the kind of node stored there.
#[derive(Debug, PartialEq, Clone, Copy, PartialOrd, Eq, Ord, Hash)]
pub enum NodeIdx {
    Internal(usize),
    Leaf(usize),
}

impl Display for NodeIdx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Int(idx) => write!(f, "internal node {idx}"),
            Leaf(idx) => write!(f, "leaf node {idx}"),
        }
    }
}

impl From<NodeIdx> for usize {
    fn from(node_idx: NodeIdx) -> usize {
        match node_idx {
            Int(idx) => idx,
            Leaf(idx) => idx,
        }
    }
}

impl From<&NodeIdx> for usize {
    fn from(node_idx: &NodeIdx) -> usize {
        usize::from(*node_idx)
    }
}

/// Rooted phylogenetic tree stored as an arena of nodes.
///
/// Nodes refer to their parent and children by [`NodeIdx`], the arena index of a node is the
/// number inside its [`NodeIdx`]. Internal nodes may have any number (>= 2) of children, so
/// unrooted trees read from newick keep their top level multifurcation as the root.
#[derive(Debug, Clone)]
pub struct Tree {
    pub root: NodeIdx,
    pub nodes: Vec<Node>,
    pub postorder: Vec<NodeIdx>,
    pub preorder: Vec<NodeIdx>,
    /// Sum of the branch lengths of all non-root nodes.
    pub length: f64,
    leaf_ids: Vec<String>,
}

impl Display for Tree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_newick())
    }
}

impl Tree {
    pub(crate) fn from_nodes(root: NodeIdx, nodes: Vec<Node>) -> Self {
        let mut tree = Self {
            root,
            nodes,
            postorder: Vec::new(),
            preorder: Vec::new(),
            length: 0.0,
            leaf_ids: Vec::new(),
        };
        tree.complete();
        tree
    }

    fn complete(&mut self) {
        self.compute_postorder();
        self.compute_preorder();
        self.length = self
            .nodes
            .iter()
            .filter(|n| n.idx != self.root)
            .map(|n| n.blen)
            .sum();
        self.leaf_ids = self
            .nodes
            .iter()
            .filter(|n| n.is_leaf())
            .map(|n| n.id.clone())
            .collect();
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    pub fn leaves(&self) -> Vec<&Node> {
        self.nodes.iter().filter(|n| n.is_leaf()).collect()
    }

    pub fn internals(&self) -> Vec<&Node> {
        self.nodes.iter().filter(|n| !n.is_leaf()).collect()
    }

    /// Ids of the leaves, in arena order.
    pub fn leaf_ids(&self) -> &[String] {
        &self.leaf_ids
    }

    pub fn node(&self, idx: &NodeIdx) -> &Node {
        &self.nodes[usize::from(idx)]
    }

    pub fn node_id(&self, idx: &NodeIdx) -> &str {
        &self.nodes[usize::from(idx)].id
    }

    pub fn blen(&self, idx: &NodeIdx) -> f64 {
        self.nodes[usize::from(idx)].blen
    }

    pub fn children(&self, idx: &NodeIdx) -> &[NodeIdx] {
        &self.nodes[usize::from(idx)].children
    }

    pub fn idx(&self, id: &str) -> Result<NodeIdx> {
        match self.nodes.iter().find(|node| node.id == id) {
            Some(node) => Ok(node.idx),
            None => bail!("No node with id {id} found in the tree"),
        }
    }

    pub fn by_id(&self, id: &str) -> Result<&Node> {
        Ok(self.node(&self.idx(id)?))
    }

    pub fn compute_postorder(&mut self) {
        let mut order = Vec::<NodeIdx>::with_capacity(self.nodes.len());
        let mut stack = vec![self.root];
        while let Some(cur) = stack.pop() {
            order.push(cur);
            stack.extend(self.children(&cur).iter().copied());
        }
        order.reverse();
        self.postorder = order;
    }

    pub fn compute_preorder(&mut self) {
        self.preorder = self.preorder_subroot(self.root);
    }

    pub fn preorder_subroot(&self, subroot_idx: NodeIdx) -> Vec<NodeIdx> {
        let mut order = Vec::<NodeIdx>::with_capacity(self.nodes.len());
        let mut stack = vec![subroot_idx];
        while let Some(cur) = stack.pop() {
            order.push(cur);
            stack.extend(self.children(&cur).iter().rev().copied());
        }
        order
    }

    pub fn to_newick(&self) -> String {
        let root = self.node(&self.root);
        let mut newick = self.subtree_to_newick(&self.root);
        if root.blen != 0.0 {
            newick.push_str(&format!(":{}", root.blen));
        }
        newick.push(';');
        newick
    }

    fn subtree_to_newick(&self, idx: &NodeIdx) -> String {
        let node = self.node(idx);
        match idx {
            Leaf(_) => node.id.clone(),
            Int(_) => {
                let children = node
                    .children
                    .iter()
                    .map(|child| {
                        format!("{}:{}", self.subtree_to_newick(child), self.blen(child))
                    })
                    .collect::<Vec<_>>()
                    .join(",");
                format!("({}){}", children, node.id)
            }
        }
    }
}
