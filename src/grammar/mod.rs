//! Weighted production-rule grammars with bound-variable scoping.
//!
//! A [`Grammar`] maps nonterminal symbols to weighted [`Rule`]s and knows how
//! to generate random expression trees, rescore existing trees, enumerate
//! trees in order of probability, and parse printed trees back. Rules that
//! carry a [`BoundVarSpec`] introduce a transient bound-variable rule that is
//! selectable only within their expansion subtree.
//!
//! # Examples
//!
//! ```
//! use lotinduction::Grammar;
//! use rand::{rngs::SmallRng, SeedableRng};
//!
//! let mut g = Grammar::new();
//! g.add_rule("BOOL", "x", None, 2.0).unwrap();
//! g.add_rule("BOOL", "and_", Some(&["BOOL", "BOOL"]), 1.0).unwrap();
//!
//! let mut rng = SmallRng::seed_from_u64(0);
//! let tree = g.generate("BOOL", &mut rng).unwrap();
//! let lp = g.log_probability(&tree).unwrap();
//! assert!((lp - tree.generation_log_probability()).abs() < 1e-9);
//! ```

mod enumerator;
mod parser;
pub use self::parser::ParseError;

use crossbeam_channel::bounded;
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use rayon::spawn;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::node::{Node, RuleRef};

/// A stable handle to a rule in a grammar's arena.
///
/// Handles identify rules for removal-free lookup where the original model
/// relied on object identity. They are never reused or invalidated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RuleId(pub(crate) usize);

/// Declares that expanding a rule introduces a bound variable, visible as an
/// additional rule of type `introduced_type` anywhere within the expansion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundVarSpec {
    /// The nonterminal the bound variable can stand in for.
    pub introduced_type: String,
    /// Argument types if the bound variable is itself function-valued;
    /// `None` for a plain terminal variable.
    pub introduced_arg_types: Option<Vec<String>>,
    /// Display prefix; the variable prints as the prefix followed by its
    /// introduction index (`y1`, `y2`, ...).
    pub prefix: String,
    /// Weight override for the introduced rule; `None` uses the grammar's
    /// [`bv_default_weight`](Grammar::bv_default_weight).
    pub weight: Option<f64>,
}

impl BoundVarSpec {
    pub fn new(introduced_type: &str, introduced_arg_types: Option<&[&str]>) -> Self {
        BoundVarSpec {
            introduced_type: introduced_type.to_owned(),
            introduced_arg_types: introduced_arg_types
                .map(|args| args.iter().map(|&a| a.to_owned()).collect()),
            prefix: "y".to_owned(),
            weight: None,
        }
    }
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = prefix.to_owned();
        self
    }
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = Some(weight);
        self
    }
}

/// A weighted production for a nonterminal.
///
/// `argument_types: None` makes a terminal; `Some(vec![])` makes a thunk, a
/// zero-argument application that prints as `name()` and evaluates as a
/// call. A rule with an empty name must have exactly one argument and acts
/// as a pass-through that prints without parentheses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub nonterminal: String,
    pub name: String,
    pub argument_types: Option<Vec<String>>,
    /// Unnormalized selection weight. Probabilities are normalized over the
    /// set of rules in scope at each choice point, which may include bound
    /// variables.
    pub weight: f64,
    /// Unnormalized weight for being chosen as a proposal site.
    pub resample_weight: f64,
    pub bound_var: Option<BoundVarSpec>,
}

impl Rule {
    pub fn new(nonterminal: &str, name: &str, argument_types: Option<&[&str]>, weight: f64) -> Self {
        Rule {
            nonterminal: nonterminal.to_owned(),
            name: name.to_owned(),
            argument_types: argument_types
                .map(|args| args.iter().map(|&a| a.to_owned()).collect()),
            weight,
            resample_weight: 1.0,
            bound_var: None,
        }
    }
    pub fn with_resample_weight(mut self, weight: f64) -> Self {
        self.resample_weight = weight;
        self
    }
    pub fn with_bound_var(mut self, spec: BoundVarSpec) -> Self {
        self.bound_var = Some(spec);
        self
    }
    pub fn is_terminal(&self) -> bool {
        self.argument_types.is_none()
    }
    pub fn arity(&self) -> usize {
        self.argument_types.as_ref().map_or(0, Vec::len)
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} -> {}", self.nonterminal, self.name)?;
        if let Some(args) = &self.argument_types {
            write!(f, "({})", args.join(","))?;
        }
        write!(f, "\tw/ p={}, resample_p={}", self.weight, self.resample_weight)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GrammarError {
    /// An invariant was violated at configuration time. Fatal.
    MalformedRule(String),
    /// Generation reached a nonterminal with no rules in scope. Fatal:
    /// a grammar-closure bug, not a proposal failure.
    UndefinedNonterminal(String),
    /// A tree referenced a rule that is not in scope for its nonterminal.
    UnknownRule { nonterminal: String },
    /// A generation depth bound was exceeded. Recoverable: retry.
    TooDeep { limit: usize },
    /// A generation size bound was exceeded. Recoverable: retry.
    TooLarge { limit: usize },
}

impl GrammarError {
    /// Whether this error is of the proposal-failure class, where the caller
    /// should retry with a fresh random choice.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, GrammarError::TooDeep { .. } | GrammarError::TooLarge { .. })
    }
}

impl fmt::Display for GrammarError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            GrammarError::MalformedRule(msg) => write!(f, "malformed rule: {}", msg),
            GrammarError::UndefinedNonterminal(nt) => {
                write!(f, "no rules in scope for nonterminal {}", nt)
            }
            GrammarError::UnknownRule { nonterminal } => {
                write!(f, "rule not in scope for nonterminal {}", nonterminal)
            }
            GrammarError::TooDeep { limit } => write!(f, "exceeded depth limit {}", limit),
            GrammarError::TooLarge { limit } => write!(f, "exceeded node limit {}", limit),
        }
    }
}
impl std::error::Error for GrammarError {}

/// Bounds enforced during generation and regeneration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationLimits {
    pub max_depth: usize,
    pub max_nodes: usize,
}

impl Default for GenerationLimits {
    fn default() -> Self {
        GenerationLimits {
            max_depth: 64,
            max_nodes: 512,
        }
    }
}

/// A bound-variable rule in scope: the transient production a lambda rule
/// introduces for the extent of its children.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct BoundRule {
    pub nonterminal: String,
    pub name: String,
    pub argument_types: Option<Vec<String>>,
    pub weight: f64,
    pub resample_weight: f64,
}

/// The stack of bound-variable rules currently in scope.
///
/// Scope is threaded through generation and scoring explicitly instead of
/// mutating the grammar's rule table; pushes and pops are paired in
/// [`Scopes::with`], so no exit path (including error returns) can leak a
/// transient rule, and nested lambdas of the same type unwind in reverse
/// order of introduction.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Scopes {
    stack: Vec<BoundRule>,
}

impl Scopes {
    pub fn len(&self) -> usize {
        self.stack.len()
    }
    pub fn get(&self, index: usize) -> Option<&BoundRule> {
        self.stack.get(index)
    }
    pub fn iter(&self) -> impl Iterator<Item = (usize, &BoundRule)> {
        self.stack.iter().enumerate()
    }
    /// The in-scope bound rule named `name` expanding `nonterminal`, if any.
    pub fn find_name(&self, nonterminal: &str, name: &str) -> Option<(usize, &BoundRule)> {
        self.iter()
            .find(|(_, br)| br.nonterminal == nonterminal && br.name == name)
    }
    pub fn push_spec(&mut self, grammar: &Grammar, spec: &BoundVarSpec) {
        let name = format!("{}{}", spec.prefix, self.stack.len() + 1);
        self.stack.push(BoundRule {
            nonterminal: spec.introduced_type.clone(),
            name,
            argument_types: spec.introduced_arg_types.clone(),
            weight: spec.weight.unwrap_or(grammar.bv_default_weight),
            resample_weight: grammar.bv_resample_weight,
        });
    }
    /// Run `f` with `spec` (if any) pushed, popping it again on the way out.
    pub fn with<T>(
        &mut self,
        grammar: &Grammar,
        spec: Option<&BoundVarSpec>,
        f: impl FnOnce(&mut Scopes) -> T,
    ) -> T {
        match spec {
            None => f(self),
            Some(spec) => {
                self.push_spec(grammar, spec);
                let out = f(self);
                self.stack.pop();
                out
            }
        }
    }
}

/// A probabilistic grammar over named nonterminal symbols.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Grammar {
    arena: Vec<Rule>,
    table: HashMap<String, Vec<RuleId>>,
    /// Selection weight given to bound-variable rules that do not declare an
    /// override.
    pub bv_default_weight: f64,
    /// Resample weight of bound-variable nodes under weighted node
    /// selection.
    pub bv_resample_weight: f64,
}

impl Default for Grammar {
    fn default() -> Self {
        Grammar::new()
    }
}

impl Grammar {
    pub fn new() -> Self {
        Grammar {
            arena: Vec::new(),
            table: HashMap::new(),
            bv_default_weight: 1.0,
            bv_resample_weight: 1.0,
        }
    }
    /// Add a production for `nonterminal`. `argument_types: None` makes a
    /// terminal, `Some(&[])` a thunk.
    pub fn add_rule(
        &mut self,
        nonterminal: &str,
        name: &str,
        argument_types: Option<&[&str]>,
        weight: f64,
    ) -> Result<RuleId, GrammarError> {
        self.insert(Rule::new(nonterminal, name, argument_types, weight))
    }
    /// Add a production that introduces a bound variable for the extent of
    /// its expansion.
    pub fn add_binding_rule(
        &mut self,
        nonterminal: &str,
        name: &str,
        argument_types: Option<&[&str]>,
        weight: f64,
        spec: BoundVarSpec,
    ) -> Result<RuleId, GrammarError> {
        self.insert(Rule::new(nonterminal, name, argument_types, weight).with_bound_var(spec))
    }
    /// Add a fully specified rule, validating its invariants.
    pub fn insert(&mut self, rule: Rule) -> Result<RuleId, GrammarError> {
        if !(rule.weight.is_finite() && rule.weight > 0.0) {
            return Err(GrammarError::MalformedRule(format!(
                "rule {} has non-positive weight",
                rule.name
            )));
        }
        if !(rule.resample_weight.is_finite() && rule.resample_weight > 0.0) {
            return Err(GrammarError::MalformedRule(format!(
                "rule {} has non-positive resample weight",
                rule.name
            )));
        }
        if rule.name.is_empty() && rule.arity() != 1 {
            return Err(GrammarError::MalformedRule(format!(
                "pass-through rule for {} must have exactly one argument",
                rule.nonterminal
            )));
        }
        if let Some(spec) = &rule.bound_var {
            if let Some(w) = spec.weight {
                if !(w.is_finite() && w > 0.0) {
                    return Err(GrammarError::MalformedRule(format!(
                        "bound variable of {} has non-positive weight",
                        rule.name
                    )));
                }
            }
            if rule.is_terminal() {
                return Err(GrammarError::MalformedRule(format!(
                    "terminal rule {} cannot introduce a bound variable",
                    rule.name
                )));
            }
        }
        let id = RuleId(self.arena.len());
        self.table
            .entry(rule.nonterminal.clone())
            .or_default()
            .push(id);
        self.arena.push(rule);
        Ok(id)
    }
    pub fn rule(&self, id: RuleId) -> Option<&Rule> {
        self.arena.get(id.0)
    }
    /// The rules applicable to `nonterminal`, in insertion order.
    pub fn rule_ids(&self, nonterminal: &str) -> &[RuleId] {
        self.table.get(nonterminal).map_or(&[], Vec::as_slice)
    }
    pub fn nonterminals(&self) -> impl Iterator<Item = &str> {
        self.table.keys().map(String::as_str)
    }

    /// Sample a random expression tree for `nonterminal` under the default
    /// [`GenerationLimits`].
    pub fn generate<R: Rng>(&self, nonterminal: &str, rng: &mut R) -> Result<Node, GrammarError> {
        self.generate_limited(nonterminal, GenerationLimits::default(), rng)
    }
    /// Sample a random expression tree, treating limit violations as
    /// recoverable errors.
    pub fn generate_limited<R: Rng>(
        &self,
        nonterminal: &str,
        limits: GenerationLimits,
        rng: &mut R,
    ) -> Result<Node, GrammarError> {
        let mut scopes = Scopes::default();
        self.generate_scoped(nonterminal, &mut scopes, limits, rng)
    }
    /// Sample a tree for `nonterminal` with the given bound variables
    /// already in scope, as when regenerating a subtree beneath lambda
    /// ancestors.
    pub(crate) fn generate_scoped<R: Rng>(
        &self,
        nonterminal: &str,
        scopes: &mut Scopes,
        limits: GenerationLimits,
        rng: &mut R,
    ) -> Result<Node, GrammarError> {
        let mut budget = limits.max_nodes;
        self.generate_in_scope(nonterminal, scopes, 0, &mut budget, &limits, rng)
    }

    fn generate_in_scope<R: Rng>(
        &self,
        nonterminal: &str,
        scopes: &mut Scopes,
        depth: usize,
        budget: &mut usize,
        limits: &GenerationLimits,
        rng: &mut R,
    ) -> Result<Node, GrammarError> {
        if depth > limits.max_depth {
            return Err(GrammarError::TooDeep {
                limit: limits.max_depth,
            });
        }
        if *budget == 0 {
            return Err(GrammarError::TooLarge {
                limit: limits.max_nodes,
            });
        }
        *budget -= 1;

        let candidates = self.candidates(nonterminal, scopes);
        if candidates.is_empty() {
            return Err(GrammarError::UndefinedNonterminal(nonterminal.to_owned()));
        }
        let total: f64 = candidates.iter().map(|&(_, w)| w).sum();
        let dist = WeightedIndex::new(candidates.iter().map(|&(_, w)| w)).map_err(|_| {
            GrammarError::MalformedRule(format!("invalid weights for nonterminal {}", nonterminal))
        })?;
        let (rule, weight) = candidates[dist.sample(rng)];
        let logprob = (weight / total).ln();

        match rule {
            RuleRef::Grammar(id) => {
                let r = &self.arena[id.0];
                let children = match &r.argument_types {
                    None => None,
                    Some(args) => {
                        let children = scopes.with(self, r.bound_var.as_ref(), |scopes| {
                            args.iter()
                                .map(|arg| {
                                    self.generate_in_scope(
                                        arg,
                                        scopes,
                                        depth + 1,
                                        budget,
                                        limits,
                                        rng,
                                    )
                                })
                                .collect::<Result<Vec<_>, _>>()
                        })?;
                        Some(children)
                    }
                };
                Ok(Node {
                    rule,
                    nonterminal: nonterminal.to_owned(),
                    name: r.name.clone(),
                    children,
                    logprob,
                })
            }
            RuleRef::Bound(index) => {
                let (name, args) = {
                    let br = &scopes.stack[index];
                    (br.name.clone(), br.argument_types.clone())
                };
                let children = match args {
                    None => None,
                    Some(args) => Some(
                        args.iter()
                            .map(|arg| {
                                self.generate_in_scope(arg, scopes, depth + 1, budget, limits, rng)
                            })
                            .collect::<Result<Vec<_>, _>>()?,
                    ),
                };
                Ok(Node {
                    rule,
                    nonterminal: nonterminal.to_owned(),
                    name,
                    children,
                    logprob,
                })
            }
        }
    }

    /// The log-probability of generating `tree` from this grammar: the same
    /// additive decomposition as [`generate`](Grammar::generate), recomputed
    /// by re-deriving scope along the walk. Total for any well-formed tree,
    /// including trees this grammar did not produce.
    pub fn log_probability(&self, tree: &Node) -> Result<f64, GrammarError> {
        let mut scopes = Scopes::default();
        self.score_scoped(tree, &mut scopes)
    }

    pub(crate) fn score_scoped(
        &self,
        node: &Node,
        scopes: &mut Scopes,
    ) -> Result<f64, GrammarError> {
        let mut logprob = self.choice_logprob(&node.nonterminal, scopes, node.rule)?;
        let arity = match node.rule {
            RuleRef::Grammar(id) => self.arena[id.0].arity(),
            RuleRef::Bound(index) => scopes.stack[index]
                .argument_types
                .as_ref()
                .map_or(0, Vec::len),
        };
        match &node.children {
            None => {}
            Some(children) => {
                if children.len() != arity {
                    return Err(GrammarError::UnknownRule {
                        nonterminal: node.nonterminal.clone(),
                    });
                }
                let spec = match node.rule {
                    RuleRef::Grammar(id) => self.arena[id.0].bound_var.as_ref(),
                    RuleRef::Bound(_) => None,
                };
                logprob += scopes.with(self, spec, |scopes| {
                    children
                        .iter()
                        .map(|c| self.score_scoped(c, scopes))
                        .sum::<Result<f64, _>>()
                })?;
            }
        }
        Ok(logprob)
    }

    /// Rules selectable for `nonterminal` in the current scope, with their
    /// unnormalized weights.
    pub(crate) fn candidates(&self, nonterminal: &str, scopes: &Scopes) -> Vec<(RuleRef, f64)> {
        let mut candidates: Vec<(RuleRef, f64)> = self
            .rule_ids(nonterminal)
            .iter()
            .map(|&id| (RuleRef::Grammar(id), self.arena[id.0].weight))
            .collect();
        for (index, br) in scopes.iter() {
            if br.nonterminal == nonterminal {
                candidates.push((RuleRef::Bound(index), br.weight));
            }
        }
        candidates
    }

    /// The log-probability of choosing `rule` among everything in scope for
    /// `nonterminal`.
    pub(crate) fn choice_logprob(
        &self,
        nonterminal: &str,
        scopes: &Scopes,
        rule: RuleRef,
    ) -> Result<f64, GrammarError> {
        let candidates = self.candidates(nonterminal, scopes);
        let total: f64 = candidates.iter().map(|&(_, w)| w).sum();
        let weight = candidates
            .iter()
            .find(|&&(r, _)| r == rule)
            .map(|&(_, w)| w)
            .ok_or_else(|| GrammarError::UnknownRule {
                nonterminal: nonterminal.to_owned(),
            })?;
        // verify node-level consistency for bound references
        if let RuleRef::Bound(index) = rule {
            match scopes.get(index) {
                Some(br) if br.nonterminal == nonterminal => {}
                _ => {
                    return Err(GrammarError::UnknownRule {
                        nonterminal: nonterminal.to_owned(),
                    })
                }
            }
        }
        Ok((weight / total).ln())
    }

    /// Walk `root` along `path`, accumulating the bound-variable scope its
    /// ancestors introduce, and return that scope with the target node.
    pub(crate) fn scopes_at<'t>(
        &self,
        root: &'t Node,
        path: &[usize],
    ) -> Result<(Scopes, &'t Node), GrammarError> {
        let mut scopes = Scopes::default();
        let mut node = root;
        for &i in path {
            if let RuleRef::Grammar(id) = node.rule {
                if let Some(spec) = self.arena[id.0].bound_var.as_ref() {
                    scopes.push_spec(self, spec);
                }
            }
            node = node
                .children
                .as_ref()
                .and_then(|cs| cs.get(i))
                .ok_or_else(|| GrammarError::UnknownRule {
                    nonterminal: node.nonterminal.clone(),
                })?;
        }
        Ok((scopes, node))
    }

    /// Enumerate trees for `nonterminal` lazily, in widening bands of
    /// nonincreasing probability, with their log-probabilities.
    pub fn enumerate(&self, nonterminal: &str) -> Box<dyn Iterator<Item = (Node, f64)>> {
        let (tx, rx) = bounded(1);
        let g = self.clone();
        let nt = nonterminal.to_owned();
        spawn(move || {
            let termination_condition = &mut |expr, logprior| tx.send((expr, logprior)).is_err();
            enumerator::run(&g, &nt, termination_condition)
        });
        Box::new(rx.into_iter())
    }

    /// Parse a printed tree, the inverse of the tree's `Display`.
    pub fn parse(&self, input: &str, nonterminal: &str) -> Result<Node, ParseError> {
        parser::parse(self, input, nonterminal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fol() -> Grammar {
        let mut g = Grammar::new();
        g.add_rule("BOOL", "x", None, 2.0).unwrap();
        g.add_rule("BOOL", "and_", Some(&["BOOL", "BOOL"]), 1.0).unwrap();
        g.add_rule("BOOL", "exists_", Some(&["FUNCTION", "SET"]), 0.5)
            .unwrap();
        g.add_rule("SET", "S", None, 1.0).unwrap();
        g.add_binding_rule(
            "FUNCTION",
            "lambda",
            Some(&["BOOL"]),
            1.0,
            BoundVarSpec::new("BOOL", None),
        )
        .unwrap();
        g
    }

    #[test]
    fn rejects_malformed_rules() {
        let mut g = Grammar::new();
        assert!(matches!(
            g.add_rule("A", "", Some(&["A", "A"]), 1.0),
            Err(GrammarError::MalformedRule(_))
        ));
        assert!(matches!(
            g.add_rule("A", "f", None, 0.0),
            Err(GrammarError::MalformedRule(_))
        ));
        assert!(matches!(
            g.add_rule("A", "f", None, f64::NAN),
            Err(GrammarError::MalformedRule(_))
        ));
        assert!(matches!(
            g.add_binding_rule("A", "lambda", None, 1.0, BoundVarSpec::new("A", None)),
            Err(GrammarError::MalformedRule(_))
        ));
        // a pass-through with exactly one argument is fine
        g.add_rule("A", "a", None, 1.0).unwrap();
        g.add_rule("B", "", Some(&["A"]), 1.0).unwrap();
    }

    #[test]
    fn nested_same_type_lambdas_stack_and_unwind() {
        let g = fol();
        let spec = BoundVarSpec::new("BOOL", None);
        let mut scopes = Scopes::default();
        scopes.with(&g, Some(&spec), |scopes| {
            assert_eq!(scopes.len(), 1);
            assert_eq!(scopes.get(0).unwrap().name, "y1");
            scopes.with(&g, Some(&spec), |scopes| {
                assert_eq!(scopes.len(), 2);
                assert_eq!(scopes.get(1).unwrap().name, "y2");
                // both are selectable for BOOL while in scope
                let bound: Vec<_> = g
                    .candidates("BOOL", scopes)
                    .into_iter()
                    .filter(|(r, _)| matches!(r, RuleRef::Bound(_)))
                    .collect();
                assert_eq!(bound.len(), 2);
            });
            assert_eq!(scopes.len(), 1);
        });
        assert_eq!(scopes.len(), 0);
    }

    #[test]
    fn bound_weight_override_and_default() {
        let mut g = fol();
        g.bv_default_weight = 2.0;
        let mut scopes = Scopes::default();
        scopes.push_spec(&g, &BoundVarSpec::new("BOOL", None));
        assert_eq!(scopes.get(0).unwrap().weight, 2.0);
        scopes.push_spec(&g, &BoundVarSpec::new("BOOL", None).with_weight(7.0));
        assert_eq!(scopes.get(1).unwrap().weight, 7.0);
    }

    #[test]
    fn scoring_rejects_out_of_scope_bound_use() {
        let g = fol();
        let node = Node {
            rule: RuleRef::Bound(0),
            nonterminal: "BOOL".to_owned(),
            name: "y1".to_owned(),
            children: None,
            logprob: 0.0,
        };
        assert!(matches!(
            g.log_probability(&node),
            Err(GrammarError::UnknownRule { .. })
        ));
    }

    #[test]
    fn undefined_nonterminal_is_a_distinct_error() {
        let mut g = Grammar::new();
        g.add_rule("A", "f", Some(&["MISSING"]), 1.0).unwrap();
        let mut rng = rand::thread_rng();
        match g.generate("A", &mut rng) {
            Err(GrammarError::UndefinedNonterminal(nt)) => assert_eq!(nt, "MISSING"),
            other => panic!("expected closure violation, got {:?}", other),
        }
    }
}
