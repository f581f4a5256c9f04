const BUDGET_INCREMENT: f64 = 2.0;
const MAX_DEPTH: usize = 256;

use std::collections::VecDeque;

use super::{BoundVarSpec, Grammar, Scopes};
use crate::node::{Node, RuleRef};

/// One choice at a choice point, with the rule data already resolved.
struct Candidate {
    rule: RuleRef,
    /// raw weight at first, normalized logprob once all choices are known
    weight: f64,
    name: String,
    args: Option<Vec<String>>,
    spec: Option<BoundVarSpec>,
}

pub fn run<F>(g: &Grammar, nonterminal: &str, termination_condition: &mut F)
where
    F: FnMut(Node, f64) -> bool,
{
    let scopes = Scopes::default();
    let cb = &mut |expr, logprior| !termination_condition(expr, logprior);
    (0..)
        .map(|n| BUDGET_INCREMENT * f64::from(n))
        .all(|offset| {
            enumerate(
                g,
                nonterminal,
                &scopes,
                (offset, offset + BUDGET_INCREMENT),
                0,
                cb,
            )
        });
}

/// returns whether the caller should continue enumerating
fn enumerate(
    g: &Grammar,
    nonterminal: &str,
    scopes: &Scopes,
    budget: (f64, f64),
    depth: usize,
    cb: &mut dyn FnMut(Node, f64) -> bool,
) -> bool {
    if budget.1 <= 0f64 || depth > MAX_DEPTH {
        return true;
    }
    // resolve each choice up front so bound rules travel with their weight
    let mut candidates: Vec<Candidate> = g
        .rule_ids(nonterminal)
        .iter()
        .map(|&id| {
            let r = &g.arena[id.0];
            Candidate {
                rule: RuleRef::Grammar(id),
                weight: r.weight,
                name: r.name.clone(),
                args: r.argument_types.clone(),
                spec: r.bound_var.clone(),
            }
        })
        .chain(
            scopes
                .iter()
                .filter(|(_, br)| br.nonterminal == nonterminal)
                .map(|(index, br)| Candidate {
                    rule: RuleRef::Bound(index),
                    weight: br.weight,
                    name: br.name.clone(),
                    args: br.argument_types.clone(),
                    spec: None,
                }),
        )
        .collect();
    let total: f64 = candidates.iter().map(|c| c.weight).sum();
    for c in &mut candidates {
        c.weight = (c.weight / total).ln();
    }
    candidates
        .sort_by(|a, b| b.weight.partial_cmp(&a.weight).unwrap_or(std::cmp::Ordering::Equal));
    candidates
        .into_iter()
        .filter(|c| -c.weight <= budget.1)
        .all(|Candidate { rule, weight: logprob, name, args, spec }| {
            let node = Node {
                rule,
                nonterminal: nonterminal.to_owned(),
                name,
                children: args.as_ref().map(|_| Vec::new()),
                logprob,
            };
            let arg_tps: VecDeque<String> = args.unwrap_or_default().into_iter().collect();
            let budget = (budget.0 + logprob, budget.1 + logprob);
            let child_scopes = match &spec {
                None => scopes.clone(),
                Some(spec) => {
                    let mut s = scopes.clone();
                    s.push_spec(g, spec);
                    s
                }
            };
            enumerate_many(g, node, arg_tps, &child_scopes, budget, logprob, depth + 1, cb)
        })
}

#[allow(clippy::too_many_arguments)]
fn enumerate_many(
    g: &Grammar,
    node: Node,
    mut arg_tps: VecDeque<String>,
    scopes: &Scopes,
    budget: (f64, f64),
    offset: f64,
    depth: usize,
    cb: &mut dyn FnMut(Node, f64) -> bool,
) -> bool {
    if let Some(arg_tp) = arg_tps.pop_front() {
        let cb = &mut |arg: Node, ll: f64| {
            let mut node = node.clone();
            if let Some(children) = node.children.as_mut() {
                children.push(arg);
            }
            let arg_tps = arg_tps.clone();
            let budget = (budget.0 + ll, budget.1 + ll);
            let offset = offset + ll;
            enumerate_many(g, node, arg_tps, scopes, budget, offset, depth, cb)
        };
        enumerate(g, &arg_tp, scopes, (0f64, budget.1), depth, cb)
    } else if budget.0 < 0f64 && 0f64 <= budget.1 {
        cb(node, offset)
    } else {
        true
    }
}
