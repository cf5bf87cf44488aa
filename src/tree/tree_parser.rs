use std::fmt;

use anyhow::bail;
use log::info;
use pest::{error::Error as PestError, iterators::Pair, Parser};
use pest_derive::Parser;

use crate::tree::{
    Node,
    NodeIdx::{self, Internal as Int, Leaf},
    Tree,
};
use crate::Result;

#[derive(Parser)]
#[grammar = "./tree/newick.pest"]
pub struct NewickParser;

#[derive(Debug)]
pub struct ParsingError(pub Box<PestError<Rule>>);

impl fmt::Display for ParsingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Malformed newick string")?;
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ParsingError {}

/// Parses all `;` terminated trees in a newick string.
///
/// Missing branch lengths are read as 0, quoted labels lose their quotes and `[...]` comments
/// are skipped. Nodes are numbered in the order they appear in the string, so the root is
/// always the first node of the arena.
///
/// # Example
/// ```
/// use phylo_rates::tree::tree_parser::from_newick;
/// use phylo_rates::tree::NodeIdx::{Internal, Leaf};
/// let trees = from_newick("((A:0.1,B:0.2)AB:0.3,C:0.4);(X,Y);").unwrap();
/// assert_eq!(trees.len(), 2);
/// assert_eq!(trees[0].root, Internal(0));
/// assert_eq!(trees[0].idx("C").unwrap(), Leaf(4));
/// assert_eq!(trees[1].leaf_ids(), &["X".to_string(), "Y".to_string()]);
/// ```
pub fn from_newick(newick_string: &str) -> Result<Vec<Tree>> {
    info!("Parsing newick trees.");
    let mut pairs = match NewickParser::parse(Rule::newick, newick_string) {
        Ok(pairs) => pairs,
        Err(e) => bail!(ParsingError(Box::new(e))),
    };
    let mut trees = Vec::new();
    if let Some(newick_rule) = pairs.next() {
        for tree_rule in newick_rule.into_inner() {
            if tree_rule.as_rule() != Rule::tree {
                continue;
            }
            if let Some(root_rule) = tree_rule.into_inner().next() {
                trees.push(parse_tree(root_rule));
            }
        }
    }
    info!("Finished parsing {} newick tree(s) successfully.", trees.len());
    Ok(trees)
}

fn parse_tree(root_rule: Pair<Rule>) -> Tree {
    let mut nodes = Vec::new();
    let root = parse_node(&mut nodes, root_rule, None);
    Tree::from_nodes(root, nodes)
}

fn parse_node(nodes: &mut Vec<Node>, rule: Pair<Rule>, parent: Option<NodeIdx>) -> NodeIdx {
    match rule.as_rule() {
        Rule::internal => parse_internal(nodes, rule, parent),
        _ => parse_leaf(nodes, rule, parent),
    }
}

fn parse_internal(nodes: &mut Vec<Node>, rule: Pair<Rule>, parent: Option<NodeIdx>) -> NodeIdx {
    let idx = nodes.len();
    nodes.push(Node::new_empty_internal(idx, parent));
    let mut children = Vec::new();
    for inner in rule.into_inner() {
        match inner.as_rule() {
            Rule::internal | Rule::leaf => {
                children.push(parse_node(nodes, inner, Some(Int(idx))));
            }
            Rule::label => nodes[idx].id = parse_label(inner),
            Rule::branch_length => nodes[idx].blen = parse_branch_length(inner),
            _ => unreachable!(),
        }
    }
    nodes[idx].children = children;
    Int(idx)
}

fn parse_leaf(nodes: &mut Vec<Node>, rule: Pair<Rule>, parent: Option<NodeIdx>) -> NodeIdx {
    let idx = nodes.len();
    let mut id = String::new();
    let mut blen = 0.0;
    for inner in rule.into_inner() {
        match inner.as_rule() {
            Rule::label => id = parse_label(inner),
            Rule::branch_length => blen = parse_branch_length(inner),
            _ => unreachable!(),
        }
    }
    nodes.push(Node::new_leaf(idx, parent, blen, id));
    Leaf(idx)
}

fn parse_label(rule: Pair<Rule>) -> String {
    rule.as_str().trim_matches('\'').to_string()
}

fn parse_branch_length(rule: Pair<Rule>) -> f64 {
    rule.into_inner()
        .next()
        .map(|float| float.as_str().trim().parse::<f64>().unwrap_or_default())
        .unwrap_or_default()
}
