//! Multi-word lexicon hypotheses with depth-bounded mutual recursion.
//!
//! A [`Lexicon`] holds several expression trees ("words") drawn from one
//! grammar. Words may call each other through a [`Dispatch`], which charges
//! every cross-word call against a shared budget; when the budget runs out
//! the call yields the value type's default instead of diverging, so any
//! lexicon (mutually recursive ones included) evaluates in bounded time.

use rand::Rng;
use std::collections::HashMap;
use std::f64::NEG_INFINITY;
use std::fmt;
use std::hash::Hash;

use crate::grammar::{GenerationLimits, Grammar, GrammarError};
use crate::hypothesis::{
    sample_value, Bayesable, BayesScore, Datum, LikelihoodError, MCMCable, Observation,
    MAX_PROPOSAL_RETRIES,
};
use crate::node::Node;
use crate::proposal::{ProposalError, Proposer};

/// An evaluation back end for lexicon words.
///
/// Unlike [`Evaluator`](crate::node::Evaluator), `apply` receives a
/// [`Dispatch`] so that primitives can invoke other words of the same
/// lexicon. Implementations may be stochastic; [`Lexicon::simulate`] builds
/// an output distribution by repeated evaluation.
pub trait WordEvaluator {
    type Value: Clone + Default + Eq + Hash;
    type Error: fmt::Display;
    /// Called once before each evaluation with the datum's input.
    fn prepare(&mut self, _input: &Self::Value) {}
    fn symbol(&mut self, name: &str) -> Result<Self::Value, Self::Error>;
    fn apply(
        &mut self,
        name: &str,
        args: &[Self::Value],
        calls: &mut Dispatch,
    ) -> Result<Self::Value, Self::Error>;
}

/// Routes cross-word calls during one evaluation, charging each against a
/// total call budget.
pub struct Dispatch<'l> {
    words: &'l [Node],
    bound: usize,
    calls: usize,
}

impl<'l> Dispatch<'l> {
    /// Evaluate word `index`. An exhausted budget or a missing word yields
    /// the default value rather than an error, so deep mutual recursion
    /// bottoms out instead of diverging.
    pub fn call_word<E: WordEvaluator>(
        &mut self,
        index: usize,
        ev: &mut E,
    ) -> Result<E::Value, E::Error> {
        if self.calls >= self.bound {
            return Ok(E::Value::default());
        }
        let word = match self.words.get(index) {
            Some(word) => word,
            None => return Ok(E::Value::default()),
        };
        self.calls += 1;
        eval_word(word, ev, self)
    }
    /// Calls charged so far.
    pub fn calls(&self) -> usize {
        self.calls
    }
}

/// Evaluate one word tree against a [`WordEvaluator`], threading `calls`
/// through so applications can dispatch to other words.
pub fn eval_word<E: WordEvaluator>(
    node: &Node,
    ev: &mut E,
    calls: &mut Dispatch,
) -> Result<E::Value, E::Error> {
    match &node.children {
        None => ev.symbol(&node.name),
        Some(children) if node.name.is_empty() => match children.first() {
            Some(c) => eval_word(c, ev, calls),
            None => ev.symbol(""),
        },
        Some(children) => {
            let args = children
                .iter()
                .map(|c| eval_word(c, ev, calls))
                .collect::<Result<Vec<_>, _>>()?;
            ev.apply(&node.name, &args, calls)
        }
    }
}

/// A hypothesis made of several words drawn from one grammar.
///
/// The prior is the sum of the words' generation log-probabilities; the
/// likelihood simulates the final word and scores observations against the
/// resulting output distribution, with an `outlier` floor for outputs the
/// simulation never produced.
#[derive(Debug, Clone)]
pub struct Lexicon<'g, P, E> {
    grammar: &'g Grammar,
    start: String,
    words: Vec<Node>,
    proposer: P,
    evaluator: E,
    score: BayesScore,
    limits: GenerationLimits,
    /// Total cross-word calls allowed per evaluation.
    pub recursion_bound: usize,
    /// Per-word size cap; larger words take a prior of negative infinity.
    pub max_nodes: usize,
    /// Log-probability assigned to observed outputs the simulation never
    /// produced.
    pub outlier: f64,
    /// Evaluations per simulated output distribution.
    pub n_simulations: usize,
}

impl<'g, P, E> Lexicon<'g, P, E>
where
    P: Proposer,
    E: WordEvaluator,
{
    /// A lexicon of `n_words` freshly sampled words.
    pub fn new<R: Rng>(
        grammar: &'g Grammar,
        start: &str,
        n_words: usize,
        proposer: P,
        evaluator: E,
        rng: &mut R,
    ) -> Result<Self, GrammarError> {
        let limits = GenerationLimits::default();
        let words = (0..n_words)
            .map(|_| sample_value(grammar, start, limits, rng))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Lexicon {
            grammar,
            start: start.to_owned(),
            words,
            proposer,
            evaluator,
            score: BayesScore::default(),
            limits,
            recursion_bound: 5,
            max_nodes: 50,
            outlier: -100.0,
            n_simulations: 1024,
        })
    }

    pub fn from_words(
        grammar: &'g Grammar,
        start: &str,
        words: Vec<Node>,
        proposer: P,
        evaluator: E,
    ) -> Self {
        Lexicon {
            grammar,
            start: start.to_owned(),
            words,
            proposer,
            evaluator,
            score: BayesScore::default(),
            limits: GenerationLimits::default(),
            recursion_bound: 5,
            max_nodes: 50,
            outlier: -100.0,
            n_simulations: 1024,
        }
    }

    pub fn grammar(&self) -> &'g Grammar {
        self.grammar
    }
    pub fn len(&self) -> usize {
        self.words.len()
    }
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
    pub fn word(&self, index: usize) -> Option<&Node> {
        self.words.get(index)
    }
    /// Replace word `index`, invalidating all cached scores.
    pub fn set_word(&mut self, index: usize, word: Node) {
        self.words[index] = word;
        self.score = BayesScore::default();
    }
    /// Append a freshly sampled word.
    pub fn add_word<R: Rng>(&mut self, rng: &mut R) -> Result<(), GrammarError> {
        let word = sample_value(self.grammar, &self.start, self.limits, rng)?;
        self.words.push(word);
        self.score = BayesScore::default();
        Ok(())
    }

    /// Evaluate word `index` on `input` once, under the recursion bound.
    pub fn evaluate(&mut self, index: usize, input: &E::Value) -> Result<E::Value, LikelihoodError> {
        let word = self
            .words
            .get(index)
            .ok_or_else(|| LikelihoodError(format!("no word at index {}", index)))?;
        self.evaluator.prepare(input);
        let mut calls = Dispatch {
            words: &self.words,
            bound: self.recursion_bound,
            calls: 0,
        };
        eval_word(word, &mut self.evaluator, &mut calls)
            .map_err(|e| LikelihoodError(e.to_string()))
    }

    /// Simulate word `index` on `input` repeatedly and return the empirical
    /// output distribution as `(value, log-probability)` pairs.
    pub fn simulate(
        &mut self,
        index: usize,
        input: &E::Value,
    ) -> Result<Vec<(E::Value, f64)>, LikelihoodError> {
        let n = self.n_simulations;
        let mut counts: HashMap<E::Value, usize> = HashMap::new();
        for _ in 0..n {
            let value = self.evaluate(index, input)?;
            *counts.entry(value).or_insert(0) += 1;
        }
        Ok(counts
            .into_iter()
            .map(|(value, count)| (value, (count as f64 / n as f64).ln()))
            .collect())
    }
}

impl<'g, P, E> PartialEq for Lexicon<'g, P, E> {
    fn eq(&self, other: &Self) -> bool {
        self.start == other.start && self.words == other.words
    }
}

impl<'g, P, E> fmt::Display for Lexicon<'g, P, E> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, word) in self.words.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "w{}: {}", i, word)?;
        }
        Ok(())
    }
}

impl<'g, P, E> Bayesable for Lexicon<'g, P, E>
where
    P: Proposer + Clone,
    E: WordEvaluator + Clone,
{
    type Datum = Datum<E::Value>;
    fn bayes_score(&self) -> &BayesScore {
        &self.score
    }
    fn bayes_score_mut(&mut self) -> &mut BayesScore {
        &mut self.score
    }
    fn compute_prior(&mut self) -> f64 {
        let mut prior = 0.0;
        for word in &self.words {
            if word.len() > self.max_nodes {
                prior = NEG_INFINITY;
                break;
            }
            match self.grammar.log_probability(word) {
                Ok(lp) => prior += lp,
                Err(_) => {
                    prior = NEG_INFINITY;
                    break;
                }
            }
        }
        self.score.prior = prior;
        prior
    }
    fn compute_single_likelihood(&mut self, datum: &Self::Datum) -> Result<f64, LikelihoodError> {
        let outlier = self.outlier;
        let index = self
            .words
            .len()
            .checked_sub(1)
            .ok_or_else(|| LikelihoodError("empty lexicon".to_owned()))?;
        let predicted = self.simulate(index, &datum.input)?;
        let lookup = |v: &E::Value| {
            predicted
                .iter()
                .find(|(pv, _)| pv == v)
                .map_or(outlier, |&(_, lp)| lp)
        };
        match &datum.output {
            Observation::Value(v) => Ok(lookup(v)),
            Observation::Counts(counts) => Ok(counts.iter().map(|(v, c)| c * lookup(v)).sum()),
        }
    }
}

impl<'g, P, E> MCMCable for Lexicon<'g, P, E>
where
    P: Proposer + Clone,
    E: WordEvaluator + Clone,
{
    fn propose<R: Rng>(&mut self, rng: &mut R) -> Result<(Self, f64), ProposalError> {
        // no word to regenerate; retrying cannot help
        if self.words.is_empty() {
            return Err(ProposalError::Exhausted { tries: 0 });
        }
        for _ in 0..MAX_PROPOSAL_RETRIES {
            let index = rng.gen_range(0..self.words.len());
            match self
                .proposer
                .propose_value(self.grammar, &self.words[index], rng)
            {
                Ok(proposal) => {
                    let mut next = self.clone();
                    next.set_word(index, proposal.value);
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
        for index in 0..next.words.len() {
            if let Ok(word) = sample_value(self.grammar, &self.start, self.limits, rng) {
                next.words[index] = word;
            }
        }
        next.score = BayesScore::default();
        next
    }
}
