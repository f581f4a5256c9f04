//! Bayesable hypotheses: a value, a prior from the grammar, and a likelihood
//! over observed data.
//!
//! The pieces compose rather than subclass: [`LotHypothesis`] pairs an
//! expression tree with any [`LikelihoodModel`] and any
//! [`Proposer`](crate::proposal::Proposer), and the sampler in
//! [`mcmc`](crate::mcmc) works against the [`MCMCable`] trait alone.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f64::NEG_INFINITY;
use std::fmt;
use std::marker::PhantomData;

use crate::grammar::{GenerationLimits, Grammar};
use crate::node::Node;
use crate::proposal::{Proposer, ProposalError};
use crate::utils::f64_eq;

/// How many consecutive recoverable proposal failures are tolerated before a
/// propose call reports [`ProposalError::Exhausted`].
pub const MAX_PROPOSAL_RETRIES: usize = 100;

/// Cached prior, likelihood, and posterior of a hypothesis.
#[derive(Copy, Clone, Debug, Serialize, Deserialize)]
pub struct BayesScore {
    pub prior: f64,
    pub likelihood: f64,
    pub posterior: f64,
}

impl Default for BayesScore {
    fn default() -> Self {
        BayesScore {
            prior: f64::NAN,
            likelihood: f64::NAN,
            posterior: f64::NAN,
        }
    }
}

impl PartialEq for BayesScore {
    fn eq(&self, other: &Self) -> bool {
        f64_eq(self.prior, other.prior)
            && f64_eq(self.likelihood, other.likelihood)
            && f64_eq(self.posterior, other.posterior)
    }
}
impl Eq for BayesScore {}

/// A single observation: an input and what was observed for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Datum<V> {
    pub input: V,
    pub output: Observation<V>,
}

/// What was observed for a datum's input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Observation<V> {
    /// A single observed output value.
    Value(V),
    /// Observed output values with their (possibly fractional) counts.
    Counts(Vec<(V, f64)>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LikelihoodError(pub String);

impl fmt::Display for LikelihoodError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "likelihood failed: {}", self.0)
    }
}
impl std::error::Error for LikelihoodError {}

/// Scores a tree against one datum.
pub trait LikelihoodModel {
    type Value;
    fn score(
        &self,
        grammar: &Grammar,
        tree: &Node,
        datum: &Datum<Self::Value>,
    ) -> Result<f64, LikelihoodError>;
}

/// Noisy-channel likelihood for single observed outputs.
///
/// With probability `alpha` the observation reflects the tree's prediction;
/// otherwise it is a coin flip. A hit scores `alpha + (1 - alpha) / 2`, a
/// miss `(1 - alpha) / 2`, so no datum ever has zero probability.
#[derive(Debug, Clone)]
pub struct BinaryLikelihood<F, V> {
    pub alpha: f64,
    pub evaluate: F,
    value: PhantomData<fn() -> V>,
}

impl<F, V> BinaryLikelihood<F, V> {
    pub fn new(alpha: f64, evaluate: F) -> Self {
        BinaryLikelihood {
            alpha,
            evaluate,
            value: PhantomData,
        }
    }
}

impl<V, F> LikelihoodModel for BinaryLikelihood<F, V>
where
    V: PartialEq,
    F: Fn(&Grammar, &Node, &V) -> Result<V, LikelihoodError>,
{
    type Value = V;
    fn score(
        &self,
        grammar: &Grammar,
        tree: &Node,
        datum: &Datum<V>,
    ) -> Result<f64, LikelihoodError> {
        let predicted = (self.evaluate)(grammar, tree, &datum.input)?;
        let noise = (1.0 - self.alpha) * 0.5;
        let p_hit = (self.alpha + noise).ln();
        let p_miss = noise.ln();
        match &datum.output {
            Observation::Value(v) => Ok(if *v == predicted { p_hit } else { p_miss }),
            Observation::Counts(counts) => Ok(counts
                .iter()
                .map(|(v, c)| c * if *v == predicted { p_hit } else { p_miss })
                .sum()),
        }
    }
}

/// Multinomial likelihood against a simulated output distribution.
///
/// `simulate` produces the tree's predicted distribution over outputs as
/// `(value, log-probability)` pairs; observed values absent from it score the
/// `outlier` log-probability instead of negative infinity.
#[derive(Debug, Clone)]
pub struct MultinomialLikelihood<F, V> {
    pub outlier: f64,
    pub simulate: F,
    value: PhantomData<fn() -> V>,
}

impl<F, V> MultinomialLikelihood<F, V> {
    pub fn new(outlier: f64, simulate: F) -> Self {
        MultinomialLikelihood {
            outlier,
            simulate,
            value: PhantomData,
        }
    }
}

impl<V, F> LikelihoodModel for MultinomialLikelihood<F, V>
where
    V: PartialEq,
    F: Fn(&Grammar, &Node, &V) -> Result<Vec<(V, f64)>, LikelihoodError>,
{
    type Value = V;
    fn score(
        &self,
        grammar: &Grammar,
        tree: &Node,
        datum: &Datum<V>,
    ) -> Result<f64, LikelihoodError> {
        let predicted = (self.simulate)(grammar, tree, &datum.input)?;
        let lookup = |v: &V| {
            predicted
                .iter()
                .find(|(pv, _)| pv == v)
                .map_or(self.outlier, |&(_, lp)| lp)
        };
        match &datum.output {
            Observation::Value(v) => Ok(lookup(v)),
            Observation::Counts(counts) => {
                Ok(counts.iter().map(|(v, c)| c * lookup(v)).sum())
            }
        }
    }
}

/// Things that can be scored against data.
pub trait Bayesable: Sized {
    type Datum;
    fn bayes_score(&self) -> &BayesScore;
    fn bayes_score_mut(&mut self) -> &mut BayesScore;
    /// Compute, cache, and return the log prior.
    fn compute_prior(&mut self) -> f64;
    fn compute_single_likelihood(&mut self, datum: &Self::Datum) -> Result<f64, LikelihoodError>;
    /// Compute, cache, and return the log likelihood of `data`.
    ///
    /// If `breakout` is given and the running sum falls below it, scoring
    /// stops early and returns negative infinity: the hypothesis is already
    /// worse than whatever the breakout came from.
    fn compute_likelihood(
        &mut self,
        data: &[Self::Datum],
        breakout: Option<f64>,
    ) -> Result<f64, LikelihoodError> {
        let mut likelihood = 0.0;
        for datum in data {
            likelihood += self.compute_single_likelihood(datum)?;
            if let Some(breakout) = breakout {
                if likelihood < breakout {
                    likelihood = NEG_INFINITY;
                    break;
                }
            }
        }
        self.bayes_score_mut().likelihood = likelihood;
        Ok(likelihood)
    }
    /// Compute, cache, and return the log posterior (prior + likelihood).
    fn compute_posterior(
        &mut self,
        data: &[Self::Datum],
        breakout: Option<f64>,
    ) -> Result<f64, LikelihoodError> {
        let prior = self.compute_prior();
        let likelihood = if prior == NEG_INFINITY {
            self.bayes_score_mut().likelihood = NEG_INFINITY;
            NEG_INFINITY
        } else {
            self.compute_likelihood(data, breakout)?
        };
        let score = self.bayes_score_mut();
        score.posterior = prior + likelihood;
        Ok(score.posterior)
    }
}

/// Posterior with the likelihood tempered; `t = 1` is the plain posterior.
pub trait Temperable {
    fn at_temperature(&self, t: f64) -> f64;
}

impl<B: Bayesable> Temperable for B {
    fn at_temperature(&self, t: f64) -> f64 {
        let score = self.bayes_score();
        score.prior + score.likelihood / t
    }
}

/// Things that can be searched over with Metropolis-Hastings.
pub trait MCMCable: Bayesable + Clone + PartialEq + fmt::Display {
    /// Propose a nearby hypothesis; the `f64` is the proposal correction
    /// `forward - backward` in log space.
    fn propose<R: Rng>(&mut self, rng: &mut R) -> Result<(Self, f64), ProposalError>;
    /// A fresh hypothesis from the prior, for chain restarts.
    fn restart<R: Rng>(&mut self, rng: &mut R) -> Self;
    /// Adopt cached scores from an identical hypothesis.
    fn replicate(&mut self, other: &Self) {
        *self.bayes_score_mut() = *other.bayes_score();
    }
}

/// A single-expression hypothesis: one tree, a grammar prior, and an
/// injected likelihood and proposer.
#[derive(Debug, Clone)]
pub struct LotHypothesis<'g, L, P> {
    grammar: &'g Grammar,
    start: String,
    value: Node,
    likelihood: L,
    proposer: P,
    limits: GenerationLimits,
    /// Trees larger than this take a prior of negative infinity.
    pub max_nodes: usize,
    score: BayesScore,
}

impl<'g, L, P> LotHypothesis<'g, L, P>
where
    P: Proposer,
{
    /// A hypothesis with a freshly sampled value.
    pub fn new<R: Rng>(
        grammar: &'g Grammar,
        start: &str,
        likelihood: L,
        proposer: P,
        rng: &mut R,
    ) -> Result<Self, crate::grammar::GrammarError> {
        let limits = GenerationLimits::default();
        let value = sample_value(grammar, start, limits, rng)?;
        Ok(LotHypothesis {
            grammar,
            start: start.to_owned(),
            value,
            likelihood,
            proposer,
            limits,
            max_nodes: 50,
            score: BayesScore::default(),
        })
    }

    pub fn from_value(grammar: &'g Grammar, start: &str, value: Node, likelihood: L, proposer: P) -> Self {
        LotHypothesis {
            grammar,
            start: start.to_owned(),
            value,
            likelihood,
            proposer,
            limits: GenerationLimits::default(),
            max_nodes: 50,
            score: BayesScore::default(),
        }
    }

    pub fn grammar(&self) -> &'g Grammar {
        self.grammar
    }
    pub fn value(&self) -> &Node {
        &self.value
    }
    /// Replace the value, invalidating all cached scores.
    pub fn set_value(&mut self, value: Node) {
        self.value = value;
        self.score = BayesScore::default();
    }
}

/// Sample from the grammar, retrying recoverable failures.
pub(crate) fn sample_value<R: Rng>(
    grammar: &Grammar,
    start: &str,
    limits: GenerationLimits,
    rng: &mut R,
) -> Result<Node, crate::grammar::GrammarError> {
    let mut last = None;
    for _ in 0..MAX_PROPOSAL_RETRIES {
        match grammar.generate_limited(start, limits, rng) {
            Ok(value) => return Ok(value),
            Err(e) if e.is_recoverable() => last = Some(e),
            Err(e) => return Err(e),
        }
    }
    Err(last.unwrap_or(crate::grammar::GrammarError::TooDeep {
        limit: limits.max_depth,
    }))
}

impl<'g, L, P> PartialEq for LotHypothesis<'g, L, P> {
    fn eq(&self, other: &Self) -> bool {
        self.start == other.start && self.value == other.value
    }
}

impl<'g, L, P> fmt::Display for LotHypothesis<'g, L, P> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl<'g, L, P> Bayesable for LotHypothesis<'g, L, P>
where
    L: LikelihoodModel + Clone,
    P: Proposer + Clone,
{
    type Datum = Datum<L::Value>;
    fn bayes_score(&self) -> &BayesScore {
        &self.score
    }
    fn bayes_score_mut(&mut self) -> &mut BayesScore {
        &mut self.score
    }
    fn compute_prior(&mut self) -> f64 {
        let prior = if self.value.len() > self.max_nodes {
            NEG_INFINITY
        } else {
            match self.grammar.log_probability(&self.value) {
                Ok(lp) => lp,
                Err(_) => NEG_INFINITY,
            }
        };
        self.score.prior = prior;
        prior
    }
    fn compute_single_likelihood(&mut self, datum: &Self::Datum) -> Result<f64, LikelihoodError> {
        self.likelihood.score(self.grammar, &self.value, datum)
    }
}

impl<'g, L, P> MCMCable for LotHypothesis<'g, L, P>
where
    L: LikelihoodModel + Clone,
    L::Value: Clone + PartialEq,
    P: Proposer + Clone,
{
    fn propose<R: Rng>(&mut self, rng: &mut R) -> Result<(Self, f64), ProposalError> {
        for _ in 0..MAX_PROPOSAL_RETRIES {
            match self.proposer.propose_value(self.grammar, &self.value, rng) {
                Ok(proposal) => {
                    let mut next = self.clone();
                    next.set_value(proposal.value);
                    return Ok((next, proposal.forward - proposal.backward));
                }
                Err(ProposalError::Failed) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(ProposalError::Exhausted {
            tries: MAX_PROPOSAL_RETRIES,
        })
    }

    fn restart<R: Rng>(&mut self, rng: &mut R) -> Self {
        let mut next = self.clone();
        if let Ok(value) = sample_value(self.grammar, &self.start, self.limits, rng) {
            next.set_value(value);
        }
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proposal::RegenerationProposal;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn bool_grammar() -> Grammar {
        let mut g = Grammar::new();
        g.add_rule("BOOL", "true_", None, 2.0).unwrap();
        g.add_rule("BOOL", "not_", Some(&["BOOL"]), 1.0).unwrap();
        g
    }

    fn eval(_: &Grammar, tree: &Node, _: &bool) -> Result<bool, LikelihoodError> {
        // odd number of not_ wrappers flips the terminal
        let mut v = true;
        let mut node = tree;
        while let Some(children) = &node.children {
            v = !v;
            node = &children[0];
        }
        Ok(v)
    }

    #[test]
    fn binary_likelihood_scores_hits_and_misses() {
        let g = bool_grammar();
        let tree = g.parse("not_(true_)", "BOOL").unwrap();
        let model = BinaryLikelihood::new(0.9, eval);
        let hit = Datum {
            input: true,
            output: Observation::Value(false),
        };
        let miss = Datum {
            input: true,
            output: Observation::Value(true),
        };
        let lp_hit = model.score(&g, &tree, &hit).unwrap();
        let lp_miss = model.score(&g, &tree, &miss).unwrap();
        assert!((lp_hit - 0.95f64.ln()).abs() < 1e-12);
        assert!((lp_miss - 0.05f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn posterior_combines_prior_and_likelihood() {
        let g = bool_grammar();
        let tree = g.parse("true_", "BOOL").unwrap();
        let mut h = LotHypothesis::from_value(
            &g,
            "BOOL",
            tree,
            BinaryLikelihood::new(0.9, eval),
            RegenerationProposal::default(),
        );
        let data = vec![Datum {
            input: true,
            output: Observation::Value(true),
        }];
        let posterior = h.compute_posterior(&data, None).unwrap();
        let expected = (2f64 / 3f64).ln() + 0.95f64.ln();
        assert!((posterior - expected).abs() < 1e-12);
        assert!((h.at_temperature(1.0) - posterior).abs() < 1e-12);
        // tempering scales only the likelihood
        let tempered = (2f64 / 3f64).ln() + 0.95f64.ln() / 2.0;
        assert!((h.at_temperature(2.0) - tempered).abs() < 1e-12);
    }

    #[test]
    fn oversized_values_take_an_impossible_prior() {
        let g = bool_grammar();
        let tree = g.parse("not_(not_(true_))", "BOOL").unwrap();
        let mut h = LotHypothesis::from_value(
            &g,
            "BOOL",
            tree,
            BinaryLikelihood::new(0.9, eval),
            RegenerationProposal::default(),
        );
        h.max_nodes = 2;
        assert_eq!(h.compute_prior(), NEG_INFINITY);
        // the likelihood is skipped entirely
        let posterior = h.compute_posterior(&[], None).unwrap();
        assert_eq!(posterior, NEG_INFINITY);
    }

    #[test]
    fn likelihood_breakout_stops_early() {
        let g = bool_grammar();
        let tree = g.parse("true_", "BOOL").unwrap();
        let mut h = LotHypothesis::from_value(
            &g,
            "BOOL",
            tree,
            BinaryLikelihood::new(0.9, eval),
            RegenerationProposal::default(),
        );
        let miss = Datum {
            input: true,
            output: Observation::Value(false),
        };
        let data = vec![miss.clone(), miss.clone(), miss];
        let ll = h.compute_likelihood(&data, Some(-4.0)).unwrap();
        assert_eq!(ll, NEG_INFINITY);
    }

    #[test]
    fn proposals_report_the_correction_term() {
        let g = bool_grammar();
        let mut rng = SmallRng::seed_from_u64(13);
        let mut h = LotHypothesis::new(
            &g,
            "BOOL",
            BinaryLikelihood::new(0.9, eval),
            RegenerationProposal::default(),
            &mut rng,
        )
        .unwrap();
        let (next, fb) = h.propose(&mut rng).unwrap();
        assert!(fb.is_finite());
        assert!(next.bayes_score().posterior.is_nan());
        assert_eq!(next.value().nonterminal, "BOOL");
    }
}
