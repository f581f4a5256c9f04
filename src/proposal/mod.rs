//! Proposal kernels for Metropolis-Hastings search over expression trees.
//!
//! Every kernel reports, alongside the proposed tree, the exact
//! log-probability of the forward move and of the reverse move; the sampler
//! needs both to preserve detailed balance.

mod insert_delete;
mod regeneration;

pub use self::insert_delete::InsertDeleteProposal;
pub use self::regeneration::RegenerationProposal;

use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use std::fmt;

use crate::grammar::Grammar;
use crate::node::{Node, RuleRef};

/// A proposed tree along with the log-probabilities of proposing it and of
/// proposing the original from it.
#[derive(Debug, Clone)]
pub struct Proposal {
    pub value: Node,
    pub forward: f64,
    pub backward: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProposalError {
    /// No well-formed proposal was found this time; retry with a fresh
    /// random choice.
    Failed,
    /// Every retry failed. The grammar cannot produce proposals from the
    /// current state; a configuration bug, not a transient condition.
    Exhausted { tries: usize },
    /// The grammar itself is misconfigured (e.g. a closure violation
    /// surfaced mid-proposal).
    Grammar(crate::grammar::GrammarError),
}

impl fmt::Display for ProposalError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ProposalError::Failed => write!(f, "no well-formed proposal found"),
            ProposalError::Exhausted { tries } => {
                write!(f, "no well-formed proposal found after {} tries", tries)
            }
            ProposalError::Grammar(err) => write!(f, "proposal hit grammar error: {}", err),
        }
    }
}
impl std::error::Error for ProposalError {}

impl From<crate::grammar::GrammarError> for ProposalError {
    fn from(err: crate::grammar::GrammarError) -> Self {
        if err.is_recoverable() {
            ProposalError::Failed
        } else {
            ProposalError::Grammar(err)
        }
    }
}

/// A strategy producing candidate trees from a current tree.
pub trait Proposer {
    fn propose_value<R: Rng>(
        &self,
        grammar: &Grammar,
        root: &Node,
        rng: &mut R,
    ) -> Result<Proposal, ProposalError>;
}

/// How proposal sites are chosen within a tree.
///
/// Uniform selection is the baseline; resample-weighted selection biases
/// toward rules with a higher `resample_weight` (bound-variable nodes use
/// the grammar's `bv_resample_weight`). Either way the forward and backward
/// site probabilities are normalized over the tree in hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeSelection {
    Uniform,
    ResampleWeighted,
}

impl Default for NodeSelection {
    fn default() -> Self {
        NodeSelection::Uniform
    }
}

/// A proposal site: a node identified by its path from the root, with its
/// unnormalized selection weight.
#[derive(Debug, Clone)]
pub(crate) struct Site {
    pub path: Vec<usize>,
    pub weight: f64,
}

/// All proposal sites of `root` under `selection`.
pub(crate) fn sites(grammar: &Grammar, root: &Node, selection: NodeSelection) -> Vec<Site> {
    let mut out = Vec::with_capacity(root.len());
    collect_sites(grammar, root, selection, &mut Vec::new(), &mut out);
    out
}

fn collect_sites(
    grammar: &Grammar,
    node: &Node,
    selection: NodeSelection,
    path: &mut Vec<usize>,
    out: &mut Vec<Site>,
) {
    let weight = match selection {
        NodeSelection::Uniform => 1.0,
        NodeSelection::ResampleWeighted => match node.rule {
            RuleRef::Grammar(id) => grammar
                .rule(id)
                .map_or(1.0, |r| r.resample_weight),
            RuleRef::Bound(_) => grammar.bv_resample_weight,
        },
    };
    out.push(Site {
        path: path.clone(),
        weight,
    });
    for (i, child) in node.children.iter().flatten().enumerate() {
        path.push(i);
        collect_sites(grammar, child, selection, path, out);
        path.pop();
    }
}

/// Pick a site proportional to weight; returns its index and the
/// log-probability of the pick.
pub(crate) fn choose_site<R: Rng>(
    sites: &[Site],
    rng: &mut R,
) -> Result<(usize, f64), ProposalError> {
    let total: f64 = sites.iter().map(|s| s.weight).sum();
    let dist =
        WeightedIndex::new(sites.iter().map(|s| s.weight)).map_err(|_| ProposalError::Failed)?;
    let index = dist.sample(rng);
    Ok((index, (sites[index].weight / total).ln()))
}

/// The log-probability that site selection lands on `path` in the tree the
/// given sites were collected from.
pub(crate) fn site_logprob(sites: &[Site], path: &[usize]) -> Result<f64, ProposalError> {
    let total: f64 = sites.iter().map(|s| s.weight).sum();
    sites
        .iter()
        .find(|s| s.path == path)
        .map(|s| (s.weight / total).ln())
        .ok_or(ProposalError::Failed)
}

/// Mixture kernel: regenerate a subtree with probability `p_regenerate`,
/// otherwise insert or delete a unary wrapper. Forward/backward
/// probabilities are those of the kernel that fired.
#[derive(Debug, Clone)]
pub struct IdrProposal {
    pub p_regenerate: f64,
    pub regeneration: RegenerationProposal,
    pub insert_delete: InsertDeleteProposal,
}

impl Default for IdrProposal {
    fn default() -> Self {
        IdrProposal {
            p_regenerate: 0.5,
            regeneration: RegenerationProposal::default(),
            insert_delete: InsertDeleteProposal::default(),
        }
    }
}

impl Proposer for IdrProposal {
    fn propose_value<R: Rng>(
        &self,
        grammar: &Grammar,
        root: &Node,
        rng: &mut R,
    ) -> Result<Proposal, ProposalError> {
        if rng.gen::<f64>() < self.p_regenerate {
            self.regeneration.propose_value(grammar, root, rng)
        } else {
            self.insert_delete.propose_value(grammar, root, rng)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::Grammar;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    #[test]
    fn sites_cover_every_node_once() {
        let mut g = Grammar::new();
        g.add_rule("BOOL", "x", None, 2.0).unwrap();
        g.add_rule("BOOL", "and_", Some(&["BOOL", "BOOL"]), 1.0).unwrap();
        let tree = g.parse("and_(x,and_(x,x))", "BOOL").unwrap();
        let sites = sites(&g, &tree, NodeSelection::Uniform);
        assert_eq!(sites.len(), tree.len());
        for s in &sites {
            assert!(tree.at_path(&s.path).is_some());
        }
    }

    #[test]
    fn weighted_site_choice_normalizes() {
        let mut g = Grammar::new();
        g.add_rule("BOOL", "x", None, 2.0).unwrap();
        g.insert(
            crate::grammar::Rule::new("BOOL", "and_", Some(&["BOOL", "BOOL"]), 1.0)
                .with_resample_weight(3.0),
        )
        .unwrap();
        let tree = g.parse("and_(x,x)", "BOOL").unwrap();
        let sites = sites(&g, &tree, NodeSelection::ResampleWeighted);
        // root weighs 3, each leaf 1
        assert!((site_logprob(&sites, &[]).unwrap() - (3f64 / 5f64).ln()).abs() < 1e-12);
        assert!((site_logprob(&sites, &[0]).unwrap() - (1f64 / 5f64).ln()).abs() < 1e-12);

        let mut rng = SmallRng::seed_from_u64(1);
        let (_, lp) = choose_site(&sites, &mut rng).unwrap();
        assert!(lp <= 0.0);
    }
}
