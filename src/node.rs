//! Expression trees: derivations of a [`Grammar`](crate::Grammar).

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::grammar::RuleId;

/// Identifies the production that built a node.
///
/// Grammar rules are referred to by their stable arena handle. Bound
/// variables have no home in the arena; they are identified by the index of
/// the lambda scope that introduced them, counted from the root of the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleRef {
    Grammar(RuleId),
    Bound(usize),
}

/// One node of an expression tree.
///
/// `children` is `None` for terminals and `Some` for applied rules. A
/// zero-argument application (a thunk) is `Some(vec![])`, which is distinct
/// from a terminal in printing and evaluation. An applied node always has
/// exactly as many children as its rule has argument types, each child's
/// `nonterminal` matching the corresponding argument type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub rule: RuleRef,
    pub nonterminal: String,
    pub name: String,
    pub children: Option<Vec<Node>>,
    /// Log-probability of the rule choice made at this node during
    /// generation.
    pub logprob: f64,
}

impl Node {
    /// Whether this node is a terminal (as opposed to an applied rule,
    /// including zero-argument thunks).
    pub fn is_terminal(&self) -> bool {
        self.children.is_none()
    }
    /// The number of nodes in this subtree.
    pub fn len(&self) -> usize {
        1 + self
            .children
            .iter()
            .flatten()
            .map(|c| c.len())
            .sum::<usize>()
    }
    pub fn is_empty(&self) -> bool {
        false
    }
    /// The height of this subtree. A lone node has depth 0.
    pub fn depth(&self) -> usize {
        self.children
            .iter()
            .flatten()
            .map(|c| 1 + c.depth())
            .max()
            .unwrap_or(0)
    }
    /// The log-probability with which generation produced this tree: the sum
    /// over all nodes of the rule-choice log-probability recorded there.
    ///
    /// [`Grammar::log_probability`](crate::Grammar::log_probability)
    /// recomputes the same quantity from scratch.
    pub fn generation_log_probability(&self) -> f64 {
        self.logprob
            + self
                .children
                .iter()
                .flatten()
                .map(|c| c.generation_log_probability())
                .sum::<f64>()
    }
    /// The node at `path`, a sequence of child indices from this node.
    pub fn at_path(&self, path: &[usize]) -> Option<&Node> {
        match path.split_first() {
            None => Some(self),
            Some((&i, rest)) => self.children.as_ref()?.get(i)?.at_path(rest),
        }
    }
    pub fn at_path_mut(&mut self, path: &[usize]) -> Option<&mut Node> {
        match path.split_first() {
            None => Some(self),
            Some((&i, rest)) => self.children.as_mut()?.get_mut(i)?.at_path_mut(rest),
        }
    }
    /// Splice `new` in at `path`, returning the subtree it displaced.
    pub fn replace_at(&mut self, path: &[usize], new: Node) -> Option<Node> {
        let target = self.at_path_mut(path)?;
        Some(std::mem::replace(target, new))
    }
    /// Evaluate this tree against an [`Evaluator`] back end.
    ///
    /// Terminals go through [`Evaluator::symbol`]; applications (thunks
    /// included) evaluate their children first and go through
    /// [`Evaluator::apply`]. Pass-through nodes (empty-name rules) evaluate
    /// to their sole child. Bound variables are presented by display name;
    /// back ends that maintain an environment resolve them there.
    pub fn eval<E: Evaluator>(&self, ev: &mut E) -> Result<E::Value, E::Error> {
        match &self.children {
            None => ev.symbol(&self.name),
            Some(children) if self.name.is_empty() => match children.first() {
                Some(c) => c.eval(ev),
                None => ev.symbol(""),
            },
            Some(children) => {
                let args = children
                    .iter()
                    .map(|c| c.eval(ev))
                    .collect::<Result<Vec<_>, _>>()?;
                ev.apply(&self.name, &args)
            }
        }
    }
}

/// Equality is structural and ignores the cached log-probabilities, so a
/// parsed tree compares equal to the generated tree it prints as.
impl PartialEq for Node {
    fn eq(&self, other: &Node) -> bool {
        self.rule == other.rule
            && self.nonterminal == other.nonterminal
            && self.name == other.name
            && self.children == other.children
    }
}
impl Eq for Node {}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.children {
            None => write!(f, "{}", self.name),
            // pass-through rules print without parentheses
            Some(children) if self.name.is_empty() => {
                write!(f, "{}", children.iter().join(","))
            }
            Some(children) => write!(f, "{}({})", self.name, children.iter().join(",")),
        }
    }
}

/// An evaluation back end for expression trees.
///
/// The grammar only specifies how trees are generated, scored, and mutated;
/// what a primitive *does* is delegated here.
pub trait Evaluator {
    type Value;
    type Error;
    /// The value of a terminal.
    fn symbol(&mut self, name: &str) -> Result<Self::Value, Self::Error>;
    /// The value of an applied rule, given its evaluated arguments. Thunks
    /// arrive with an empty argument slice.
    fn apply(&mut self, name: &str, args: &[Self::Value]) -> Result<Self::Value, Self::Error>;
}
