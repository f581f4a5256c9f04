use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;

use super::{Proposal, ProposalError, Proposer};
use crate::grammar::{GenerationLimits, Grammar, RuleId};
use crate::node::{Node, RuleRef};

/// Propose by inserting or deleting a unary wrapper node.
///
/// An insertion wraps a node in a unary rule whose argument type equals its
/// own nonterminal; a deletion removes such a wrapper, promoting its child.
/// Binding rules are never used as wrappers: inserting or removing one would
/// renumber the scopes of bound variables below the splice point. When the
/// chosen move has no candidate, the proposal fails and the caller retries.
#[derive(Debug, Clone, Default)]
pub struct InsertDeleteProposal {
    pub limits: GenerationLimits,
}

/// Unary same-type non-binding rules usable as wrappers at `nonterminal`.
fn wrapper_rules(grammar: &Grammar, nonterminal: &str) -> Vec<(RuleId, f64)> {
    grammar
        .rule_ids(nonterminal)
        .iter()
        .copied()
        .filter_map(|id| {
            let r = grammar.rule(id)?;
            match &r.argument_types {
                Some(args)
                    if args.len() == 1 && args[0] == *nonterminal && r.bound_var.is_none() =>
                {
                    Some((id, r.weight))
                }
                _ => None,
            }
        })
        .collect()
}

fn is_deletable(grammar: &Grammar, node: &Node) -> bool {
    match node.rule {
        RuleRef::Grammar(id) => grammar.rule(id).is_some_and(|r| {
            r.bound_var.is_none()
                && matches!(&r.argument_types,
                    Some(args) if args.len() == 1 && args[0] == node.nonterminal)
        }),
        RuleRef::Bound(_) => false,
    }
}

fn collect_paths(
    grammar: &Grammar,
    node: &Node,
    keep: &impl Fn(&Grammar, &Node) -> bool,
    path: &mut Vec<usize>,
    out: &mut Vec<Vec<usize>>,
) {
    if keep(grammar, node) {
        out.push(path.clone());
    }
    for (i, child) in node.children.iter().flatten().enumerate() {
        path.push(i);
        collect_paths(grammar, child, keep, path, out);
        path.pop();
    }
}

fn wrappable_paths(grammar: &Grammar, root: &Node) -> Vec<Vec<usize>> {
    let mut out = Vec::new();
    collect_paths(
        grammar,
        root,
        &|g, n| !wrapper_rules(g, &n.nonterminal).is_empty(),
        &mut Vec::new(),
        &mut out,
    );
    out
}

fn deletable_paths(grammar: &Grammar, root: &Node) -> Vec<Vec<usize>> {
    let mut out = Vec::new();
    collect_paths(grammar, root, &is_deletable, &mut Vec::new(), &mut out);
    out
}

impl Proposer for InsertDeleteProposal {
    fn propose_value<R: Rng>(
        &self,
        grammar: &Grammar,
        root: &Node,
        rng: &mut R,
    ) -> Result<Proposal, ProposalError> {
        let ln_half = 0.5f64.ln();
        if rng.gen::<f64>() < 0.5 {
            // insert
            if root.len() + 1 > self.limits.max_nodes {
                return Err(ProposalError::Failed);
            }
            let candidates = wrappable_paths(grammar, root);
            if candidates.is_empty() {
                return Err(ProposalError::Failed);
            }
            let path = candidates[rng.gen_range(0..candidates.len())].clone();
            let site_fwd = -(candidates.len() as f64).ln();

            let (scopes, target) = grammar.scopes_at(root, &path)?;
            let wrappers = wrapper_rules(grammar, &target.nonterminal);
            let total: f64 = wrappers.iter().map(|&(_, w)| w).sum();
            let dist = WeightedIndex::new(wrappers.iter().map(|&(_, w)| w))
                .map_err(|_| ProposalError::Failed)?;
            let (id, weight) = wrappers[dist.sample(rng)];
            let rule_fwd = (weight / total).ln();

            let logprob =
                grammar.choice_logprob(&target.nonterminal, &scopes, RuleRef::Grammar(id))?;
            let name = grammar
                .rule(id)
                .map(|r| r.name.clone())
                .ok_or(ProposalError::Failed)?;
            let wrapper = Node {
                rule: RuleRef::Grammar(id),
                nonterminal: target.nonterminal.clone(),
                name,
                children: Some(vec![target.clone()]),
                logprob,
            };
            let mut value = root.clone();
            value.replace_at(&path, wrapper);

            // reversed by deleting the wrapper we just inserted
            let n_deletable = deletable_paths(grammar, &value).len() as f64;
            Ok(Proposal {
                forward: ln_half + site_fwd + rule_fwd,
                backward: ln_half - n_deletable.ln(),
                value,
            })
        } else {
            // delete
            let candidates = deletable_paths(grammar, root);
            if candidates.is_empty() {
                return Err(ProposalError::Failed);
            }
            let path = candidates[rng.gen_range(0..candidates.len())].clone();
            let forward = ln_half - (candidates.len() as f64).ln();

            let target = root.at_path(&path).ok_or(ProposalError::Failed)?;
            let id = match target.rule {
                RuleRef::Grammar(id) => id,
                RuleRef::Bound(_) => return Err(ProposalError::Failed),
            };
            let child = target
                .children
                .as_ref()
                .and_then(|cs| cs.first())
                .cloned()
                .ok_or(ProposalError::Failed)?;
            let nonterminal = target.nonterminal.clone();

            let mut value = root.clone();
            value.replace_at(&path, child);

            // reversed by re-inserting the deleted wrapper at the same site
            let wrappable = wrappable_paths(grammar, &value);
            let site_bwd = -(wrappable.len() as f64).ln();
            let wrappers = wrapper_rules(grammar, &nonterminal);
            let total: f64 = wrappers.iter().map(|&(_, w)| w).sum();
            let weight = wrappers
                .iter()
                .find(|&&(wid, _)| wid == id)
                .map(|&(_, w)| w)
                .ok_or(ProposalError::Failed)?;
            let rule_bwd = (weight / total).ln();

            Ok(Proposal {
                forward,
                backward: ln_half + site_bwd + rule_bwd,
                value,
            })
        }
    }
}
